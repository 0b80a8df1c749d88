use log::trace;

use crate::config::FormConfig;
use crate::field::{Field, File};
use crate::handler::{FormHandler, PartInfo, PartSink};
use crate::multipart::MultipartParser;
use crate::octet_stream::OctetStreamParser;
use crate::querystring::QuerystringParser;

/// The content parser selected once at construction from the content type.
#[derive(Debug)]
enum ContentParser {
    Querystring(QuerystringParser),
    OctetStream(OctetStreamParser),
    Multipart(MultipartParser),
}

/// Incremental request-body parser.
///
/// Inspects the declared content type once, at construction, and routes every
/// [`write`](FormParser::write) through the matching content parser:
/// `application/x-www-form-urlencoded` (and the legacy
/// `application/x-url-encoded`), `application/octet-stream`, or
/// `multipart/form-data` (which requires a `boundary` parameter). Completed
/// fields and files are delivered to the supplied [`FormHandler`].
///
/// The parser is fully synchronous and single-owner: every call completes
/// before returning and the only physical I/O is the spill write of an
/// oversized file part. Call [`finalize`](FormParser::finalize) at
/// end-of-input, and guarantee [`close`](FormParser::close) on every exit
/// path so an in-progress spilled upload file is never leaked.
///
/// # Examples
///
/// ```
/// use formbody::{Field, FormConfig, FormHandler, FormParser};
///
/// #[derive(Default)]
/// struct Collect(Vec<(String, String)>);
///
/// impl FormHandler for Collect {
///     fn on_field(&mut self, field: Field) -> formbody::Result<()> {
///         self.0.push((field.name().unwrap_or("").to_owned(), field.text()));
///         Ok(())
///     }
/// }
///
/// # fn run() -> formbody::Result<()> {
/// let mut parser = FormParser::new(
///     "application/x-www-form-urlencoded",
///     FormConfig::default(),
///     Collect::default(),
/// )?;
///
/// parser.write(b"foo=bar&baz")?;
/// parser.write(b"=qux")?;
/// parser.finalize()?;
///
/// let handler = parser.close();
/// assert_eq!(handler.0.len(), 2);
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
#[derive(Debug)]
pub struct FormParser<H: FormHandler> {
    parser: ContentParser,
    accumulator: Accumulator<H>,
    /// Set on the first fatal error; replayed by every later call.
    failed: Option<crate::Error>,
}

impl<H: FormHandler> FormParser<H> {
    /// Constructs a parser for the given `Content-Type` header value.
    ///
    /// All configuration errors — an unparseable or unsupported content type,
    /// a multipart type without a `boundary` parameter — surface here, before
    /// any byte is processed.
    pub fn new(content_type: &str, config: FormConfig, handler: H) -> crate::Result<FormParser<H>> {
        FormParser::with_file_name(content_type, None, config, handler)
    }

    /// Like [`new`](FormParser::new), but carries an externally supplied file
    /// name (e.g. from a request header) for an `application/octet-stream`
    /// body.
    pub fn with_file_name(
        content_type: &str,
        file_name: Option<&str>,
        config: FormConfig,
        handler: H,
    ) -> crate::Result<FormParser<H>> {
        let m = content_type
            .parse::<mime::Mime>()
            .map_err(crate::Error::DecodeContentType)?;

        let parser = if m.type_() == mime::APPLICATION
            && (m.subtype() == mime::WWW_FORM_URLENCODED || m.subtype().as_str() == "x-url-encoded")
        {
            ContentParser::Querystring(QuerystringParser::new(config.max_field_size))
        } else if m.type_() == mime::APPLICATION && m.subtype() == mime::OCTET_STREAM {
            ContentParser::OctetStream(OctetStreamParser::new(file_name.map(str::to_owned)))
        } else if m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA {
            let boundary = m.get_param(mime::BOUNDARY).ok_or(crate::Error::NoBoundary)?;
            ContentParser::Multipart(MultipartParser::new(boundary.as_str()))
        } else {
            return Err(crate::Error::UnsupportedContentType {
                content_type: content_type.to_owned(),
            });
        };

        trace!("form parser selected for content type: {}", m);

        Ok(FormParser {
            parser,
            accumulator: Accumulator {
                handler,
                config,
                current: None,
                next_idx: 0,
            },
            failed: None,
        })
    }

    /// Feeds one chunk of body bytes, returning how many were consumed.
    ///
    /// The chunk may be sliced anywhere — inside a boundary, an escape, or an
    /// encoded group — and is not retained past the call. An error is
    /// terminal: the parse stops making progress and every later `write` or
    /// [`finalize`](FormParser::finalize) returns the same error again.
    /// Fields and files already emitted stay valid.
    pub fn write(&mut self, data: &[u8]) -> crate::Result<usize> {
        if let Some(err) = &self.failed {
            return Err(err.replay());
        }

        let result = match &mut self.parser {
            ContentParser::Querystring(parser) => parser.write(data, &mut self.accumulator),
            ContentParser::OctetStream(parser) => parser.write(data, &mut self.accumulator),
            ContentParser::Multipart(parser) => parser.write(data, &mut self.accumulator),
        };

        self.latch(result)
    }

    /// Signals end-of-input: flushes trailing state, verifies the body is
    /// complete and fires [`FormHandler::on_end`].
    pub fn finalize(&mut self) -> crate::Result<()> {
        if let Some(err) = &self.failed {
            return Err(err.replay());
        }

        let result = match &mut self.parser {
            ContentParser::Querystring(parser) => parser.finalize(&mut self.accumulator),
            ContentParser::OctetStream(parser) => parser.finalize(&mut self.accumulator),
            ContentParser::Multipart(parser) => parser.finalize(&mut self.accumulator),
        };
        let result = result.and_then(|_| self.accumulator.handler.on_end());

        self.latch(result)
    }

    fn latch<T>(&mut self, result: crate::Result<T>) -> crate::Result<T> {
        if let Err(err) = &result {
            self.failed = Some(err.replay());
        }
        result
    }

    /// Releases parser resources and returns the handler.
    ///
    /// Removes the upload file backing a part that was cut off mid-stream, so
    /// an aborted request never leaks temp files. Must run on every exit
    /// path: normal completion, error, or abandonment.
    pub fn close(mut self) -> H {
        self.discard_current();
        self.accumulator.handler
    }

    /// Read access to the handler, e.g. to inspect collected fields before
    /// closing.
    pub fn handler(&self) -> &H {
        &self.accumulator.handler
    }

    fn discard_current(&mut self) {
        if let Some(CurrentPart::File(file)) = self.accumulator.current.take() {
            file.discard();
        }
        self.accumulator.current = None;
    }
}

#[derive(Debug)]
enum CurrentPart {
    Field(Field),
    File(File),
}

/// The built-in [`PartSink`] that applies the storage policy and hands
/// finished values to the user handler.
#[derive(Debug)]
struct Accumulator<H: FormHandler> {
    handler: H,
    config: FormConfig,
    current: Option<CurrentPart>,
    next_idx: usize,
}

impl<H: FormHandler> PartSink for Accumulator<H> {
    fn on_part_begin(&mut self, info: PartInfo) -> crate::Result<()> {
        let idx = self.next_idx;
        self.next_idx += 1;

        self.current = Some(if info.is_file {
            CurrentPart::File(File::new(&info, idx))
        } else {
            CurrentPart::Field(Field::new(&info, idx))
        });

        Ok(())
    }

    fn on_part_data(&mut self, data: &[u8]) -> crate::Result<()> {
        match &mut self.current {
            Some(CurrentPart::Field(field)) => field.append(data, self.config.max_field_size),
            Some(CurrentPart::File(file)) => file.append(data, &self.config),
            None => Ok(()),
        }
    }

    fn on_part_end(&mut self) -> crate::Result<()> {
        match self.current.take() {
            Some(CurrentPart::Field(field)) => self.handler.on_field(field),
            Some(CurrentPart::File(mut file)) => {
                file.flush()?;
                self.handler.on_file(file)
            }
            None => Ok(()),
        }
    }
}
