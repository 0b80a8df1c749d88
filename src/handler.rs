use http::header::HeaderMap;

use crate::{Field, File};

/// Receives the structured events produced by a [`FormParser`](crate::FormParser).
///
/// All methods have no-op defaults, so a consumer only implements the events
/// it cares about. Returning an error from any callback halts the parse and
/// propagates the error to the `write`/`finalize` caller.
pub trait FormHandler {
    /// A complete, finalized field was parsed.
    fn on_field(&mut self, field: Field) -> crate::Result<()> {
        let _ = field;
        Ok(())
    }

    /// A complete, finalized file was parsed. The handler owns the `File`
    /// and its backing upload file, if it was spilled to disk.
    fn on_file(&mut self, file: File) -> crate::Result<()> {
        let _ = file;
        Ok(())
    }

    /// The whole body was parsed successfully.
    fn on_end(&mut self) -> crate::Result<()> {
        Ok(())
    }
}

/// Metadata describing one part, settled when its headers are complete.
#[derive(Debug, Clone)]
pub struct PartInfo {
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
    pub(crate) content_type: Option<mime::Mime>,
    pub(crate) headers: HeaderMap,
    pub(crate) is_file: bool,
}

impl PartInfo {
    pub(crate) fn field(field_name: Option<String>) -> PartInfo {
        PartInfo {
            field_name,
            file_name: None,
            content_type: None,
            headers: HeaderMap::new(),
            is_file: false,
        }
    }

    pub(crate) fn file(field_name: Option<String>, file_name: Option<String>) -> PartInfo {
        PartInfo {
            field_name,
            file_name,
            content_type: None,
            headers: HeaderMap::new(),
            is_file: true,
        }
    }
}

/// The low-level begin/data/end surface the content parsers push into.
///
/// Parsers take the sink as a per-call argument, push-parser style, so no
/// callback state is stored inside them.
pub(crate) trait PartSink {
    fn on_part_begin(&mut self, info: PartInfo) -> crate::Result<()>;
    fn on_part_data(&mut self, data: &[u8]) -> crate::Result<()>;
    fn on_part_end(&mut self) -> crate::Result<()>;
}
