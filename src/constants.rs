use lazy_static::lazy_static;
use regex::Regex;

pub(crate) const DEFAULT_MAX_MEMORY_FILE_SIZE: usize = 8 * 1024;
pub(crate) const DEFAULT_MAX_FIELD_SIZE: u64 = 16 * 1024 * 1024;

pub(crate) const MAX_HEADERS: usize = 32;
pub(crate) const MAX_PART_HEADERS_SIZE: usize = 16 * 1024;
pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';
pub(crate) const CRLF: &str = "\r\n";
pub(crate) const CRLF_CRLF: &str = "\r\n\r\n";

lazy_static! {
    pub(crate) static ref CONTENT_DISPOSITION_FIELD_NAME_RE: Regex = Regex::new(r#"name="([^"]*)""#).unwrap();
    pub(crate) static ref CONTENT_DISPOSITION_FILE_NAME_RE: Regex = Regex::new(r#"filename="([^"]*)""#).unwrap();
}
