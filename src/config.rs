use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::constants;

/// Parser configuration consumed at construction time.
///
/// Controls the storage policy for uploaded files and the hard size limit on
/// textual fields. The record is immutable once a parser is built from it.
///
/// # Examples
///
/// ```
/// use formbody::FormConfig;
///
/// let config = FormConfig::default()
///     .max_memory_file_size(64 * 1024)
///     .keep_extensions(true);
/// ```
#[derive(Debug, Clone)]
pub struct FormConfig {
    pub(crate) max_memory_file_size: usize,
    pub(crate) max_field_size: u64,
    pub(crate) upload_dir: PathBuf,
    pub(crate) keep_filename: bool,
    pub(crate) keep_extensions: bool,
}

impl FormConfig {
    pub fn new() -> FormConfig {
        FormConfig::default()
    }

    /// Sets the number of bytes a file is buffered in memory before it is
    /// spilled to a file under the upload directory.
    pub fn max_memory_file_size(mut self, limit: usize) -> FormConfig {
        self.max_memory_file_size = limit;
        self
    }

    /// Sets the hard size limit for a single field. Exceeding it aborts the
    /// whole parse.
    pub fn max_field_size(mut self, limit: u64) -> FormConfig {
        self.max_field_size = limit;
        self
    }

    /// Sets the directory spilled upload files are created in.
    pub fn upload_dir<P: Into<PathBuf>>(mut self, dir: P) -> FormConfig {
        self.upload_dir = dir.into();
        self
    }

    /// Uses the client-declared file name (path components stripped) for
    /// spilled files instead of a random one.
    pub fn keep_filename(mut self, keep: bool) -> FormConfig {
        self.keep_filename = keep;
        self
    }

    /// Preserves the declared file extension on randomly named spill files.
    pub fn keep_extensions(mut self, keep: bool) -> FormConfig {
        self.keep_extensions = keep;
        self
    }

    /// Opens the on-disk target for a spilling file, applying the naming
    /// policy to the client-declared name.
    pub(crate) fn open_upload_file(&self, declared: Option<&str>) -> std::io::Result<(fs::File, PathBuf)> {
        if self.keep_filename {
            if let Some(name) = declared.map(sanitize_file_name).filter(|name| !name.is_empty()) {
                let path = self.upload_dir.join(name);
                let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
                return Ok((file, path));
            }
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("upload_");

        let ext = if self.keep_extensions {
            declared.and_then(file_extension)
        } else {
            None
        };
        let suffix = ext.map(|ext| format!(".{}", ext));
        if let Some(suffix) = &suffix {
            builder.suffix(suffix.as_str());
        }

        let temp: NamedTempFile = builder.tempfile_in(&self.upload_dir)?;
        // The parser hands the file to the caller, so disable auto-delete.
        let (file, path) = temp.keep().map_err(|err| err.error)?;
        Ok((file, path))
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        FormConfig {
            max_memory_file_size: constants::DEFAULT_MAX_MEMORY_FILE_SIZE,
            max_field_size: constants::DEFAULT_MAX_FIELD_SIZE,
            upload_dir: std::env::temp_dir(),
            keep_filename: false,
            keep_extensions: false,
        }
    }
}

/// Strips any path components from a client-declared file name.
fn sanitize_file_name(name: &str) -> String {
    name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("").to_owned()
}

/// Extracts an extension safe to re-append to a random file name.
fn file_extension(name: &str) -> Option<String> {
    let ext = Path::new(sanitize_file_name(name).as_str())
        .extension()?
        .to_str()?
        .to_owned();

    if !ext.is_empty() && ext.len() <= 10 && ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Some(ext)
    } else {
        None
    }
}
