use crate::handler::{PartInfo, PartSink};

/// Parser for `application/octet-stream` bodies.
///
/// The whole body is one anonymous file stream: an implicit begin on the
/// first write, data per write, end on `finalize`. No delimiter detection is
/// involved.
#[derive(Debug)]
pub(crate) struct OctetStreamParser {
    file_name: Option<String>,
    started: bool,
}

impl OctetStreamParser {
    pub(crate) fn new(file_name: Option<String>) -> OctetStreamParser {
        OctetStreamParser {
            file_name,
            started: false,
        }
    }

    pub(crate) fn write(&mut self, data: &[u8], sink: &mut dyn PartSink) -> crate::Result<usize> {
        if !self.started {
            self.started = true;
            sink.on_part_begin(PartInfo::file(None, self.file_name.clone()))?;
        }

        sink.on_part_data(data)?;
        Ok(data.len())
    }

    pub(crate) fn finalize(&mut self, sink: &mut dyn PartSink) -> crate::Result<()> {
        if self.started {
            sink.on_part_end()?;
        }
        Ok(())
    }
}
