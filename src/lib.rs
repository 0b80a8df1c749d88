//! An incremental, push-based parser for HTTP request bodies.
//!
//! `formbody` turns a sequence of arbitrarily sized byte chunks into a stream
//! of structured field and file events for the three classic form encodings:
//! `application/x-www-form-urlencoded`, `application/octet-stream` and
//! `multipart/form-data` (including `base64` and `quoted-printable` part
//! encodings). Boundaries, escapes and encoded groups may be split anywhere
//! across writes; the parser never blocks, never over-reads and never
//! delivers delimiter bytes as payload.
//!
//! # Examples
//!
//! ```
//! use formbody::{Field, File, FormConfig, FormHandler, FormParser};
//!
//! #[derive(Default)]
//! struct Collect {
//!     fields: Vec<Field>,
//!     files: Vec<File>,
//! }
//!
//! impl FormHandler for Collect {
//!     fn on_field(&mut self, field: Field) -> formbody::Result<()> {
//!         self.fields.push(field);
//!         Ok(())
//!     }
//!
//!     fn on_file(&mut self, file: File) -> formbody::Result<()> {
//!         self.files.push(file);
//!         Ok(())
//!     }
//! }
//!
//! # fn run() -> formbody::Result<()> {
//! let body = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
//!
//! let mut parser = FormParser::new(
//!     "multipart/form-data; boundary=X-BOUNDARY",
//!     FormConfig::default(),
//!     Collect::default(),
//! )?;
//!
//! // Chunk sizes are up to the transport; one byte at a time works too.
//! for chunk in body.as_bytes().chunks(7) {
//!     parser.write(chunk)?;
//! }
//! parser.finalize()?;
//!
//! let collected = parser.close();
//! assert_eq!(collected.fields[0].text(), "abcd");
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

pub use config::FormConfig;
pub use error::Error;
pub use field::{Field, File};
pub use form::FormParser;
pub use handler::FormHandler;

mod config;
mod constants;
mod content_disposition;
mod decoder;
mod error;
mod field;
mod form;
mod handler;
mod helpers;
mod multipart;
mod octet_stream;
mod querystring;

/// A Result type often returned from methods that can have `formbody` errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the multipart boundary value.
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> crate::Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(crate::Error::DecodeContentType)?;

    if !(m.type_() == mime::MULTIPART_FORM_DATA.type_() && m.subtype() == mime::MULTIPART_FORM_DATA.subtype()) {
        return Err(crate::Error::NoMultipart);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(crate::Error::NoBoundary)
}
