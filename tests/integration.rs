use formbody::{Error, Field, File, FormConfig, FormHandler, FormParser};
use rand::Rng;

#[derive(Debug, Default)]
struct Collect {
    fields: Vec<Field>,
    files: Vec<File>,
    ended: bool,
}

impl FormHandler for Collect {
    fn on_field(&mut self, field: Field) -> formbody::Result<()> {
        self.fields.push(field);
        Ok(())
    }

    fn on_file(&mut self, file: File) -> formbody::Result<()> {
        self.files.push(file);
        Ok(())
    }

    fn on_end(&mut self) -> formbody::Result<()> {
        self.ended = true;
        Ok(())
    }
}

fn parse(content_type: &str, config: FormConfig, chunks: &[&[u8]]) -> formbody::Result<Collect> {
    let mut parser = FormParser::new(content_type, config, Collect::default())?;
    for chunk in chunks {
        parser.write(chunk)?;
    }
    parser.finalize()?;
    Ok(parser.close())
}

fn field_pairs(collected: &Collect) -> Vec<(String, Vec<u8>)> {
    collected
        .fields
        .iter()
        .map(|f| (f.name().unwrap_or("").to_owned(), f.value().to_vec()))
        .collect()
}

#[test]
fn test_multipart_basic() {
    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";

    let collected = parse(
        "multipart/form-data; boundary=X-BOUNDARY",
        FormConfig::default(),
        &[data.as_bytes()],
    )
    .unwrap();

    assert!(collected.ended);
    assert_eq!(collected.fields.len(), 1);
    assert_eq!(collected.files.len(), 1);

    let field = &collected.fields[0];
    assert_eq!(field.name(), Some("My Field"));
    assert_eq!(field.index(), 0);
    assert_eq!(field.text(), "abcd");

    let file = &collected.files[0];
    assert_eq!(file.field_name(), Some("File Field"));
    assert_eq!(file.file_name(), Some("a-text-file.txt"));
    assert_eq!(file.content_type(), Some(&mime::TEXT_PLAIN));
    assert_eq!(file.index(), 1);
    assert!(file.in_memory());
    assert_eq!(file.bytes(), Some(&b"Hello world\nHello\r\nWorld\rAgain"[..]));
}

#[test]
fn test_multipart_byte_at_a_time() {
    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
    let chunks: Vec<&[u8]> = data.as_bytes().chunks(1).collect();

    let collected = parse("multipart/form-data; boundary=X-BOUNDARY", FormConfig::default(), &chunks).unwrap();

    assert_eq!(field_pairs(&collected), vec![("my_text_field".to_owned(), b"abcd".to_vec())]);
}

#[test]
fn test_multipart_boundary_exactness_every_split() {
    let data =
        b"--boundary\r\nContent-Disposition: form-data; name=\"field\"\r\n\r\nvalue\r\n--boundary--\r\n";

    for split in 0..=data.len() {
        let collected = parse(
            "multipart/form-data; boundary=boundary",
            FormConfig::default(),
            &[&data[..split], &data[split..]],
        )
        .unwrap();

        assert_eq!(
            field_pairs(&collected),
            vec![("field".to_owned(), b"value".to_vec())],
            "split at {}",
            split
        );
    }
}

#[test]
fn test_querystring_reassembly() {
    let data = b"foo=bar&baz=qux";
    let expected = vec![
        ("foo".to_owned(), b"bar".to_vec()),
        ("baz".to_owned(), b"qux".to_vec()),
    ];

    let one = parse("application/x-www-form-urlencoded", FormConfig::default(), &[data]).unwrap();
    assert_eq!(field_pairs(&one), expected);
    assert!(one.ended);

    let two = parse(
        "application/x-www-form-urlencoded",
        FormConfig::default(),
        &[b"foo=", b"bar&baz=qux"],
    )
    .unwrap();
    assert_eq!(field_pairs(&two), expected);

    let chunks: Vec<&[u8]> = data.chunks(1).collect();
    let bytewise = parse("application/x-www-form-urlencoded", FormConfig::default(), &chunks).unwrap();
    assert_eq!(field_pairs(&bytewise), expected);
}

#[test]
fn test_random_chunking_reassembly() {
    let data = b"--AaB03x\r\nContent-Disposition: form-data; name=\"notes\"\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\nfoo=3Dbar and=\r\nmore\r\n--AaB03x\r\nContent-Disposition: form-data; name=\"blob\"; filename=\"b.bin\"\r\nContent-Transfer-Encoding: base64\r\n\r\nZm9vYmFy\r\n--AaB03x--\r\n";

    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let mut chunks: Vec<&[u8]> = Vec::new();
        let mut rest: &[u8] = data;
        while !rest.is_empty() {
            let take = rng.gen_range(1..=rest.len());
            chunks.push(&rest[..take]);
            rest = &rest[take..];
        }

        let collected = parse("multipart/form-data; boundary=AaB03x", FormConfig::default(), &chunks).unwrap();

        assert_eq!(collected.fields.len(), 1);
        assert_eq!(collected.fields[0].value(), b"foo=bar andmore");
        assert_eq!(collected.files.len(), 1);
        assert_eq!(collected.files[0].bytes(), Some(&b"foobar"[..]));
    }
}

#[test]
fn test_field_size_limit_is_fatal() {
    let data = b"--b\r\nContent-Disposition: form-data; name=\"big\"\r\n\r\n0123456789abcdef\r\n--b--\r\n";

    let mut parser = FormParser::new(
        "multipart/form-data; boundary=b",
        FormConfig::default().max_field_size(8),
        Collect::default(),
    )
    .unwrap();

    let err = parser
        .write(data)
        .and_then(|_| parser.finalize())
        .unwrap_err();

    assert_eq!(
        err,
        Error::FieldSizeExceeded {
            limit: 8,
            field_name: Some("big".to_owned()),
        }
    );
}

#[test]
fn test_storage_migration_transparency() {
    let dir = tempfile::tempdir().unwrap();
    let payload: Vec<u8> = (0..64u8).cycle().take(1000).collect();

    let mut body = b"--b\r\nContent-Disposition: form-data; name=\"up\"; filename=\"data.bin\"\r\n\r\n".to_vec();
    body.extend_from_slice(&payload);
    body.extend_from_slice(b"\r\n--b--\r\n");

    // Whatever the chunking relative to the crossing point, the read-back
    // equals the concatenation of all writes.
    for chunk_size in [1, 7, 100, body.len()] {
        let chunks: Vec<&[u8]> = body.chunks(chunk_size).collect();
        let collected = parse(
            "multipart/form-data; boundary=b",
            FormConfig::default().upload_dir(dir.path()).max_memory_file_size(256),
            &chunks,
        )
        .unwrap();

        assert_eq!(collected.files.len(), 1);
        let file = &collected.files[0];
        assert!(!file.in_memory());
        assert_eq!(file.size(), 1000);
        assert_eq!(file.contents().unwrap(), payload, "chunk size {}", chunk_size);
    }
}

#[test]
fn test_octet_stream() {
    let collected_via = |chunks: &[&[u8]]| {
        let mut parser = FormParser::with_file_name(
            "application/octet-stream",
            Some("raw.bin"),
            FormConfig::default(),
            Collect::default(),
        )
        .unwrap();
        for chunk in chunks {
            parser.write(chunk).unwrap();
        }
        parser.finalize().unwrap();
        parser.close()
    };

    let collected = collected_via(&[b"hello ", b"octet ", b"world"]);
    assert_eq!(collected.files.len(), 1);
    assert_eq!(collected.files[0].file_name(), Some("raw.bin"));
    assert_eq!(collected.files[0].bytes(), Some(&b"hello octet world"[..]));
    assert!(collected.ended);
}

#[test]
fn test_unsupported_content_type_rejected_at_construction() {
    let err = FormParser::new("text/plain", FormConfig::default(), Collect::default()).unwrap_err();
    assert_eq!(
        err,
        Error::UnsupportedContentType {
            content_type: "text/plain".to_owned(),
        }
    );

    let err = FormParser::new("multipart/form-data", FormConfig::default(), Collect::default()).unwrap_err();
    assert_eq!(err, Error::NoBoundary);
}

#[test]
fn test_emitted_parts_survive_later_failure() {
    // The line after the second delimiter diverges from a valid boundary
    // tail; both already-delivered fields must remain retrievable.
    let data = b"--b\r\nContent-Disposition: form-data; name=\"ok\"\r\n\r\nfine\r\n--b\r\nContent-Disposition: form-data; name=\"bad\"\r\n\r\nv\r\n--bJUNK\r\n";

    let mut parser = FormParser::new("multipart/form-data; boundary=b", FormConfig::default(), Collect::default())
        .unwrap();
    assert_eq!(parser.write(data).unwrap_err(), Error::MalformedBoundary);

    // The failure is terminal; later calls replay it instead of parsing.
    assert_eq!(parser.write(b"more bytes").unwrap_err(), Error::MalformedBoundary);
    assert_eq!(parser.finalize().unwrap_err(), Error::MalformedBoundary);

    let collected = parser.close();
    assert_eq!(
        field_pairs(&collected),
        vec![
            ("ok".to_owned(), b"fine".to_vec()),
            ("bad".to_owned(), b"v".to_vec()),
        ]
    );
    assert!(!collected.ended);
}

#[test]
fn test_querystring_error_latches_parser() {
    let mut parser = FormParser::new(
        "application/x-www-form-urlencoded",
        FormConfig::default().max_field_size(4),
        Collect::default(),
    )
    .unwrap();

    let expected = Error::FieldSizeExceeded {
        limit: 4,
        field_name: Some("big".to_owned()),
    };

    assert_eq!(parser.write(b"big=0123456789&").unwrap_err(), expected);

    // A later well-formed write must not resume parsing or emit fields.
    assert_eq!(parser.write(b"ok=1&").unwrap_err(), expected);
    assert_eq!(parser.finalize().unwrap_err(), expected);

    let collected = parser.close();
    assert!(collected.fields.is_empty());
    assert!(!collected.ended);
}

#[test]
fn test_querystring_unterminated_pair_is_bounded() {
    let mut parser = FormParser::new(
        "application/x-www-form-urlencoded",
        FormConfig::default().max_field_size(16),
        Collect::default(),
    )
    .unwrap();

    // No separator ever arrives; the buffered pair must hit the field limit
    // instead of growing with each write.
    let chunk = [b'a'; 1024];
    let err = (0..1000)
        .try_for_each(|_| parser.write(&chunk).map(|_| ()))
        .unwrap_err();

    assert_eq!(
        err,
        Error::FieldSizeExceeded {
            limit: 16,
            field_name: None,
        }
    );
    assert_eq!(parser.finalize().unwrap_err(), err);
    assert!(parser.close().fields.is_empty());
}

#[test]
fn test_close_removes_in_progress_spill() {
    let dir = tempfile::tempdir().unwrap();

    // A file part that spills to disk but whose body never terminates.
    let mut body = b"--b\r\nContent-Disposition: form-data; name=\"up\"; filename=\"x.bin\"\r\n\r\n".to_vec();
    body.extend_from_slice(&[b'z'; 512]);

    let mut parser = FormParser::new(
        "multipart/form-data; boundary=b",
        FormConfig::default().upload_dir(dir.path()).max_memory_file_size(64),
        Collect::default(),
    )
    .unwrap();
    parser.write(&body).unwrap();

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    let collected = parser.close();
    assert!(collected.files.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_keep_extensions_naming() {
    let dir = tempfile::tempdir().unwrap();

    let mut body = b"--b\r\nContent-Disposition: form-data; name=\"up\"; filename=\"../shady/pic.png\"\r\n\r\n".to_vec();
    body.extend_from_slice(&[1u8; 300]);
    body.extend_from_slice(b"\r\n--b--\r\n");

    let collected = parse(
        "multipart/form-data; boundary=b",
        FormConfig::default()
            .upload_dir(dir.path())
            .max_memory_file_size(128)
            .keep_extensions(true),
        &[&body],
    )
    .unwrap();

    let file = &collected.files[0];
    let path = file.path().unwrap();
    assert_eq!(path.parent().unwrap(), dir.path());
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.ends_with(".png"));
    assert_ne!(name, "pic.png");
}
