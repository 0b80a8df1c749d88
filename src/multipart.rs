//! The `multipart/form-data` boundary state machine (RFC 2046).
//!
//! A push parser: `write` appends the chunk to an internal buffer and drains
//! as many complete stage transitions as the buffered bytes allow. Anything
//! unresolved at the end of a chunk — most importantly a partially matched
//! boundary delimiter — stays in the buffer and is re-evaluated on the next
//! write, so a delimiter split across arbitrarily many chunks is never
//! misdelivered as part payload.

use bytes::{Buf, BytesMut};
use http::header::{self, HeaderMap};
use log::trace;
use memchr::memmem;

use crate::constants;
use crate::content_disposition::ContentDisposition;
use crate::decoder::TransferDecoder;
use crate::handler::{PartInfo, PartSink};
use crate::helpers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamingStage {
    FindingFirstBoundary,
    DeterminingBoundaryType,
    ReadingTransportPadding,
    ReadingFieldHeaders,
    ReadingFieldData,
    Epilogue,
}

#[derive(Debug)]
pub(crate) struct MultipartParser {
    /// `--<boundary>`, the form of the very first delimiter line.
    first_marker: Vec<u8>,
    /// `\n--<boundary>`, the preamble-tolerant delimiter search key.
    lf_marker: Vec<u8>,
    /// `\r\n--<boundary>`, the in-body delimiter.
    delim_marker: Vec<u8>,
    buf: BytesMut,
    stage: StreamingStage,
    /// True until the first byte of the stream has been consumed or
    /// discarded; only then may a boundary match at offset zero.
    at_start: bool,
    decoder: TransferDecoder,
    scratch: BytesMut,
}

impl MultipartParser {
    pub(crate) fn new(boundary: &str) -> MultipartParser {
        MultipartParser {
            first_marker: format!("{}{}", constants::BOUNDARY_EXT, boundary).into_bytes(),
            lf_marker: format!("\n{}{}", constants::BOUNDARY_EXT, boundary).into_bytes(),
            delim_marker: format!("{}{}{}", constants::CRLF, constants::BOUNDARY_EXT, boundary).into_bytes(),
            buf: BytesMut::new(),
            stage: StreamingStage::FindingFirstBoundary,
            at_start: true,
            decoder: TransferDecoder::Identity,
            scratch: BytesMut::new(),
        }
    }

    pub(crate) fn write(&mut self, data: &[u8], sink: &mut dyn PartSink) -> crate::Result<usize> {
        self.buf.extend_from_slice(data);
        self.drain(sink)?;
        Ok(data.len())
    }

    pub(crate) fn finalize(&mut self, _sink: &mut dyn PartSink) -> crate::Result<()> {
        match self.stage {
            StreamingStage::Epilogue => Ok(()),
            _ => Err(crate::Error::IncompleteStream),
        }
    }

    /// Runs stage transitions until no further progress is possible with the
    /// currently buffered bytes.
    fn drain(&mut self, sink: &mut dyn PartSink) -> crate::Result<()> {
        loop {
            match self.stage {
                StreamingStage::FindingFirstBoundary => {
                    if !self.find_first_boundary() {
                        return Ok(());
                    }
                }
                StreamingStage::DeterminingBoundaryType => {
                    if self.buf.len() < 2 {
                        return Ok(());
                    }

                    if &self.buf[..2] == constants::BOUNDARY_EXT.as_bytes() {
                        trace!("terminal boundary reached");
                        self.buf.clear();
                        self.set_stage(StreamingStage::Epilogue);
                    } else {
                        self.set_stage(StreamingStage::ReadingTransportPadding);
                    }
                }
                StreamingStage::ReadingTransportPadding => {
                    while let Some(&b) = self.buf.first() {
                        if b == b' ' || b == b'\t' {
                            self.buf.advance(1);
                        } else {
                            break;
                        }
                    }

                    match self.buf.first() {
                        None => return Ok(()),
                        Some(&constants::CR) => {
                            if self.buf.len() < 2 {
                                return Ok(());
                            }
                            if self.buf[1] != constants::LF {
                                return Err(crate::Error::MalformedBoundary);
                            }
                            self.buf.advance(2);
                            self.set_stage(StreamingStage::ReadingFieldHeaders);
                        }
                        Some(_) => return Err(crate::Error::MalformedBoundary),
                    }
                }
                StreamingStage::ReadingFieldHeaders => {
                    let block_len = if self.buf.starts_with(constants::CRLF.as_bytes()) {
                        // A part with no headers at all: the blank line alone.
                        Some(2)
                    } else {
                        memmem::find(&self.buf, constants::CRLF_CRLF.as_bytes()).map(|idx| idx + 4)
                    };

                    let block_len = match block_len {
                        Some(len) => len,
                        None => {
                            if self.buf.len() > constants::MAX_PART_HEADERS_SIZE {
                                return Err(crate::Error::IncompleteHeaders);
                            }
                            return Ok(());
                        }
                    };

                    let header_bytes = self.buf.split_to(block_len);
                    let headers = if block_len == 2 {
                        HeaderMap::new()
                    } else {
                        parse_part_headers(&header_bytes)?
                    };

                    let content_disposition = ContentDisposition::parse(&headers);
                    let content_type = headers
                        .get(header::CONTENT_TYPE)
                        .and_then(|val| val.to_str().ok())
                        .and_then(|val| val.parse::<mime::Mime>().ok());
                    let transfer_encoding = headers
                        .get("content-transfer-encoding")
                        .and_then(|val| val.to_str().ok());

                    self.decoder = TransferDecoder::for_encoding(transfer_encoding)?;

                    let is_file = content_disposition.is_file();
                    let info = PartInfo {
                        field_name: content_disposition.field_name,
                        file_name: content_disposition.file_name,
                        content_type,
                        headers,
                        is_file,
                    };

                    sink.on_part_begin(info)?;
                    self.set_stage(StreamingStage::ReadingFieldData);
                }
                StreamingStage::ReadingFieldData => match memmem::find(&self.buf, &self.delim_marker) {
                    Some(idx) => {
                        self.emit_part_data(idx, sink)?;
                        self.buf.advance(self.delim_marker.len());

                        self.scratch.clear();
                        self.decoder.finalize(&mut self.scratch)?;
                        if !self.scratch.is_empty() {
                            sink.on_part_data(&self.scratch)?;
                        }

                        sink.on_part_end()?;
                        self.set_stage(StreamingStage::DeterminingBoundaryType);
                    }
                    None => {
                        // Hold back the longest buffer suffix that could still
                        // grow into the delimiter. Retaining the longest
                        // suffix-prefix is exactly the earliest-starting
                        // candidate, with ties broken to the longest match.
                        let keep = partial_match_len(&self.buf, &self.delim_marker);
                        let deliverable = self.buf.len() - keep;
                        self.emit_part_data(deliverable, sink)?;
                        return Ok(());
                    }
                },
                StreamingStage::Epilogue => {
                    // Everything after the terminal boundary is ignorable.
                    self.buf.clear();
                    return Ok(());
                }
            }
        }
    }

    /// Scans the preamble for the first boundary line. Returns false when
    /// more bytes are needed.
    fn find_first_boundary(&mut self) -> bool {
        if self.at_start {
            if self.buf.len() >= self.first_marker.len() {
                self.at_start = false;
                if self.buf.starts_with(&self.first_marker) {
                    self.buf.advance(self.first_marker.len());
                    self.set_stage(StreamingStage::DeterminingBoundaryType);
                    return true;
                }
            } else if self.first_marker.starts_with(&self.buf) {
                // Could still become the opening boundary line.
                return false;
            } else {
                self.at_start = false;
            }
        }

        match memmem::find(&self.buf, &self.lf_marker) {
            Some(idx) => {
                self.buf.advance(idx + self.lf_marker.len());
                self.set_stage(StreamingStage::DeterminingBoundaryType);
                true
            }
            None => {
                // Discard preamble noise, keeping only a possible partial
                // match at the buffer's trailing edge.
                let keep = partial_match_len(&self.buf, &self.lf_marker);
                let discard = self.buf.len() - keep;
                self.buf.advance(discard);
                false
            }
        }
    }

    /// Routes `len` buffered bytes through the part's transfer decoder to the
    /// sink and consumes them.
    fn emit_part_data(&mut self, len: usize, sink: &mut dyn PartSink) -> crate::Result<()> {
        if len == 0 {
            return Ok(());
        }

        let data = self.buf.split_to(len);
        self.scratch.clear();
        self.decoder.write(&data, &mut self.scratch)?;
        if !self.scratch.is_empty() {
            sink.on_part_data(&self.scratch)?;
        }
        Ok(())
    }

    fn set_stage(&mut self, stage: StreamingStage) {
        trace!("multipart stage: {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }
}

fn parse_part_headers(header_bytes: &[u8]) -> crate::Result<HeaderMap> {
    let mut headers = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

    match httparse::parse_headers(header_bytes, &mut headers) {
        Ok(httparse::Status::Complete((_, raw_headers))) => helpers::convert_raw_headers_to_header_map(raw_headers),
        Ok(httparse::Status::Partial) => Err(crate::Error::IncompleteHeaders),
        Err(err) => Err(crate::Error::ReadHeaderFailed(err)),
    }
}

/// Length of the longest proper suffix of `haystack` that is a prefix of
/// `needle`.
fn partial_match_len(haystack: &[u8], needle: &[u8]) -> usize {
    let max = haystack.len().min(needle.len() - 1);
    for len in (1..=max).rev() {
        if haystack[haystack.len() - len..] == needle[..len] {
            return len;
        }
    }
    0
}
