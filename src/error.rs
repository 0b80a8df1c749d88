use std::fmt::{self, Debug, Display, Formatter};
use std::io;

use derive_more::Display;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while parsing a request body and in other
/// operations.
#[derive(Display)]
#[non_exhaustive]
pub enum Error {
    /// The `Content-Type` is not one of the supported body encodings.
    #[display(fmt = "unsupported content type: {}", content_type)]
    UnsupportedContentType { content_type: String },

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[display(fmt = "failed to convert Content-Type to `mime::Mime` type: {}", _0)]
    DecodeContentType(mime::FromStrError),

    /// The `Content-Type` header is not `multipart/form-data`.
    #[display(fmt = "Content-Type is not multipart/form-data")]
    NoMultipart,

    /// No boundary found in `Content-Type` header.
    #[display(fmt = "multipart boundary not found in Content-Type")]
    NoBoundary,

    /// A boundary line diverged from the expected boundary bytes.
    #[display(fmt = "malformed multipart boundary line")]
    MalformedBoundary,

    /// The multipart body ended before the terminal boundary was seen.
    #[display(fmt = "incomplete multipart stream")]
    IncompleteStream,

    /// Couldn't read the part headers completely.
    #[display(fmt = "failed to read complete part headers")]
    IncompleteHeaders,

    /// Failed to parse the part headers.
    #[display(fmt = "failed to read headers: {}", _0)]
    ReadHeaderFailed(httparse::Error),

    /// Failed to decode a raw part header name to
    /// [`HeaderName`](http::header::HeaderName) type.
    #[display(fmt = "failed to decode part's raw header name: {:?} {}", name, cause)]
    DecodeHeaderName { name: String, cause: BoxError },

    /// Failed to decode a raw part header value to
    /// [`HeaderValue`](http::header::HeaderValue) type.
    #[display(fmt = "failed to decode part's raw header value: {}", cause)]
    DecodeHeaderValue { value: Vec<u8>, cause: BoxError },

    /// A part declared a `Content-Transfer-Encoding` this parser doesn't know.
    #[display(fmt = "unknown content-transfer-encoding: {}", encoding)]
    UnknownTransferEncoding { encoding: String },

    /// A base64 part ended with a single dangling character, which cannot
    /// encode any byte.
    #[display(fmt = "truncated base64 data at end of input")]
    TruncatedBase64,

    /// A quoted-printable part ended with an unresolvable `=` escape.
    #[display(fmt = "dangling quoted-printable escape at end of input")]
    DanglingEscape,

    /// An incoming field exceeded the maximum size limit.
    #[display(
        fmt = "field '{}' exceeded the maximum size limit: {} bytes",
        "field_name.as_deref().unwrap_or(\"<unknown>\")",
        limit
    )]
    FieldSizeExceeded { limit: u64, field_name: Option<String> },

    /// Writing or creating an upload file failed.
    #[display(fmt = "upload file i/o failed: {}", _0)]
    Io(io::Error),
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl Error {
    /// Reproduces the error so a failed parser can return it again on every
    /// later call. Causes that cannot be shared are carried as messages.
    pub(crate) fn replay(&self) -> Error {
        use Error::*;

        match self {
            UnsupportedContentType { content_type } => UnsupportedContentType {
                content_type: content_type.clone(),
            },
            NoMultipart => NoMultipart,
            NoBoundary => NoBoundary,
            MalformedBoundary => MalformedBoundary,
            IncompleteStream => IncompleteStream,
            IncompleteHeaders => IncompleteHeaders,
            ReadHeaderFailed(err) => ReadHeaderFailed(*err),
            DecodeHeaderName { name, cause } => DecodeHeaderName {
                name: name.clone(),
                cause: cause.to_string().into(),
            },
            DecodeHeaderValue { value, cause } => DecodeHeaderValue {
                value: value.clone(),
                cause: cause.to_string().into(),
            },
            UnknownTransferEncoding { encoding } => UnknownTransferEncoding {
                encoding: encoding.clone(),
            },
            TruncatedBase64 => TruncatedBase64,
            DanglingEscape => DanglingEscape,
            FieldSizeExceeded { limit, field_name } => FieldSizeExceeded {
                limit: *limit,
                field_name: field_name.clone(),
            },
            Io(err) => Io(io::Error::new(err.kind(), err.to_string())),
            // Construction-time errors never reach a live parser.
            other => Io(io::Error::new(io::ErrorKind::Other, other.to_string())),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_preserves_message() {
        let err = Error::FieldSizeExceeded {
            limit: 8,
            field_name: Some("a".to_owned()),
        };
        assert_eq!(err.replay(), err);

        let err = Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(err.replay(), err);
        assert_eq!(err.replay().replay(), err);
    }
}
