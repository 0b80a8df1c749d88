use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use http::header::HeaderMap;
use log::debug;

use crate::config::FormConfig;
use crate::handler::PartInfo;

/// A complete textual form field.
///
/// Accumulates in memory only; its size is capped by
/// [`max_field_size`](crate::FormConfig::max_field_size) and exceeding the cap
/// aborts the whole parse. Once emitted to the handler the value is final.
#[derive(Debug)]
pub struct Field {
    name: Option<String>,
    value: BytesMut,
    content_type: Option<mime::Mime>,
    headers: HeaderMap,
    idx: usize,
}

impl Field {
    pub(crate) fn new(info: &PartInfo, idx: usize) -> Field {
        Field {
            name: info.field_name.clone(),
            value: BytesMut::new(),
            content_type: info.content_type.clone(),
            headers: info.headers.clone(),
            idx,
        }
    }

    pub(crate) fn append(&mut self, data: &[u8], max_field_size: u64) -> crate::Result<()> {
        if (self.value.len() + data.len()) as u64 > max_field_size {
            return Err(crate::Error::FieldSizeExceeded {
                limit: max_field_size,
                field_name: self.name.clone(),
            });
        }

        self.value.extend_from_slice(data);
        Ok(())
    }

    /// The field name from the `Content-Disposition` header, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The accumulated raw value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Consumes the field, returning its value.
    pub fn into_bytes(self) -> Bytes {
        self.value.freeze()
    }

    /// The part's own `Content-Type`, if one was declared.
    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.content_type.as_ref()
    }

    /// The full part headers (empty for non-multipart sources).
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Zero-based position of this part within the body.
    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// The value decoded as text, defaulting to UTF-8.
    pub fn text(&self) -> String {
        self.text_with_charset("utf-8")
    }

    /// The value decoded as text using the part's declared charset, falling
    /// back to `default_encoding`.
    pub fn text_with_charset(&self, default_encoding: &str) -> String {
        let encoding_name = self
            .content_type
            .as_ref()
            .and_then(|mime| mime.get_param(mime::CHARSET))
            .map(|charset| charset.as_str())
            .unwrap_or(default_encoding);

        let encoding = Encoding::for_label(encoding_name.as_bytes()).unwrap_or(UTF_8);

        let (text, _, _) = encoding.decode(&self.value);

        match text {
            Cow::Owned(s) => s,
            Cow::Borrowed(s) => String::from(s),
        }
    }
}

#[derive(Debug)]
enum FileStorage {
    Memory(BytesMut),
    Disk { file: fs::File, path: PathBuf },
}

/// A complete uploaded file.
///
/// Bytes accumulate in memory until
/// [`max_memory_file_size`](crate::FormConfig::max_memory_file_size) is
/// crossed, at which point they migrate once, irreversibly, to a file under
/// the configured upload directory. The handler that receives an emitted
/// `File` owns the backing file and is responsible for removing it, e.g. via
/// [`cleanup`](File::cleanup).
#[derive(Debug)]
pub struct File {
    field_name: Option<String>,
    file_name: Option<String>,
    content_type: Option<mime::Mime>,
    headers: HeaderMap,
    storage: FileStorage,
    size: u64,
    idx: usize,
}

impl File {
    pub(crate) fn new(info: &PartInfo, idx: usize) -> File {
        File {
            field_name: info.field_name.clone(),
            file_name: info.file_name.clone(),
            content_type: info.content_type.clone(),
            headers: info.headers.clone(),
            storage: FileStorage::Memory(BytesMut::new()),
            size: 0,
            idx,
        }
    }

    pub(crate) fn append(&mut self, data: &[u8], config: &FormConfig) -> crate::Result<()> {
        let needs_spill = match &self.storage {
            FileStorage::Memory(buf) => buf.len() + data.len() > config.max_memory_file_size,
            FileStorage::Disk { .. } => false,
        };

        if needs_spill {
            let (mut file, path) = config.open_upload_file(self.file_name.as_deref())?;
            debug!(
                "file part '{}' exceeded {} bytes in memory, spilling to {}",
                self.field_name.as_deref().unwrap_or("<unknown>"),
                config.max_memory_file_size,
                path.display()
            );

            if let FileStorage::Memory(buf) = &self.storage {
                file.write_all(buf)?;
            }
            file.write_all(data)?;
            self.storage = FileStorage::Disk { file, path };
        } else {
            match &mut self.storage {
                FileStorage::Memory(buf) => buf.extend_from_slice(data),
                FileStorage::Disk { file, .. } => file.write_all(data)?,
            }
        }

        self.size += data.len() as u64;
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> crate::Result<()> {
        if let FileStorage::Disk { file, .. } = &mut self.storage {
            file.flush()?;
        }
        Ok(())
    }

    /// The field name from the `Content-Disposition` header, if any.
    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    /// The client-declared file name, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// The part's own `Content-Type`, if one was declared.
    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.content_type.as_ref()
    }

    /// The full part headers (empty for non-multipart sources).
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Total number of content bytes written to this file.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Zero-based position of this part within the body.
    pub fn index(&self) -> usize {
        self.idx
    }

    /// Whether the content still lives in memory (i.e. never spilled).
    pub fn in_memory(&self) -> bool {
        matches!(self.storage, FileStorage::Memory(_))
    }

    /// The in-memory content, or `None` once the file was spilled to disk.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.storage {
            FileStorage::Memory(buf) => Some(buf),
            FileStorage::Disk { .. } => None,
        }
    }

    /// The on-disk path, or `None` while the content is in memory.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            FileStorage::Memory(_) => None,
            FileStorage::Disk { path, .. } => Some(path),
        }
    }

    /// The full content, read back from disk if the file was spilled.
    pub fn contents(&self) -> std::io::Result<Vec<u8>> {
        match &self.storage {
            FileStorage::Memory(buf) => Ok(buf.to_vec()),
            FileStorage::Disk { path, .. } => fs::read(path),
        }
    }

    /// Removes the backing upload file, if any.
    pub fn cleanup(self) -> std::io::Result<()> {
        match self.storage {
            FileStorage::Memory(_) => Ok(()),
            FileStorage::Disk { file, path } => {
                drop(file);
                fs::remove_file(path)
            }
        }
    }

    /// Removes the backing file of a part that will never be emitted.
    pub(crate) fn discard(self) {
        if let FileStorage::Disk { file, path } = self.storage {
            drop(file);
            if let Err(err) = fs::remove_file(&path) {
                log::error!("failed to remove abandoned upload file {}: {}", path.display(), err);
            }
        }
    }
}
