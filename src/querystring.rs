use bytes::{Buf, BytesMut};
use memchr::memchr2;

use crate::handler::{PartInfo, PartSink};

/// Incremental parser for `application/x-www-form-urlencoded` bodies.
///
/// Streams `name=value` pairs split on `&` or `;`. A pair cut off by a chunk
/// boundary is buffered and resumed on the next write; percent-decoding
/// happens only once the full pair is known. Every pair, name included,
/// counts against `max_pair_size`, so a separator-free body cannot grow the
/// buffer without bound.
#[derive(Debug)]
pub(crate) struct QuerystringParser {
    pending: BytesMut,
    max_pair_size: u64,
}

impl QuerystringParser {
    pub(crate) fn new(max_pair_size: u64) -> QuerystringParser {
        QuerystringParser {
            pending: BytesMut::new(),
            max_pair_size,
        }
    }

    pub(crate) fn write(&mut self, data: &[u8], sink: &mut dyn PartSink) -> crate::Result<usize> {
        self.pending.extend_from_slice(data);

        while let Some(idx) = memchr2(b'&', b';', &self.pending) {
            if idx as u64 > self.max_pair_size {
                return Err(self.oversized(&self.pending[..idx]));
            }
            let pair = self.pending.split_to(idx);
            self.pending.advance(1);
            emit_pair(&pair, sink)?;
        }

        if self.pending.len() as u64 > self.max_pair_size {
            return Err(self.oversized(&self.pending));
        }

        Ok(data.len())
    }

    /// Flushes the trailing pair; a body ending exactly at the end of a field
    /// still emits that field.
    pub(crate) fn finalize(&mut self, sink: &mut dyn PartSink) -> crate::Result<()> {
        let pair = self.pending.split();
        emit_pair(&pair, sink)
    }

    fn oversized(&self, pair: &[u8]) -> crate::Error {
        let field_name = memchr::memchr(b'=', pair)
            .map(|idx| String::from_utf8_lossy(&url_decode(&pair[..idx])).into_owned());

        crate::Error::FieldSizeExceeded {
            limit: self.max_pair_size,
            field_name,
        }
    }
}

fn emit_pair(pair: &[u8], sink: &mut dyn PartSink) -> crate::Result<()> {
    if pair.is_empty() {
        return Ok(());
    }

    let (name, value) = match memchr::memchr(b'=', pair) {
        Some(idx) => (&pair[..idx], &pair[idx + 1..]),
        None => (pair, &pair[..0]),
    };

    let name = String::from_utf8_lossy(&url_decode(name)).into_owned();

    sink.on_part_begin(PartInfo::field(Some(name)))?;
    sink.on_part_data(&url_decode(value))?;
    sink.on_part_end()
}

/// Form-style URL decoding: `+` means space, then percent escapes.
fn url_decode(input: &[u8]) -> Vec<u8> {
    let plus_decoded: Vec<u8> = input.iter().map(|&b| if b == b'+' { b' ' } else { b }).collect();
    urlencoding::decode_binary(&plus_decoded).into_owned()
}
