//! Streaming decoders for part `Content-Transfer-Encoding`s (RFC 2045).
//!
//! Each decoder is a plain state machine: `write` is a transition over
//! `(state, input)` appending decoded bytes to `out`, and any encoded unit
//! left incomplete at the end of a chunk is carried as residue into the next
//! call. `finalize` must be called at end-of-input to flush or reject the
//! residue.

use bytes::BytesMut;
use memchr::memchr;

const BASE64_DECODE: [i8; 256] = {
    let mut t = [-1i8; 256];
    let mut i = 0u8;
    while i < 26 {
        t[(b'A' + i) as usize] = i as i8;
        t[(b'a' + i) as usize] = (26 + i) as i8;
        i += 1;
    }
    let mut i = 0u8;
    while i < 10 {
        t[(b'0' + i) as usize] = (52 + i) as i8;
        i += 1;
    }
    t[b'+' as usize] = 62;
    t[b'/' as usize] = 63;
    t
};

const HEX_DECODE: [i8; 256] = {
    let mut t = [-1i8; 256];
    let mut i = 0u8;
    while i < 10 {
        t[(b'0' + i) as usize] = i as i8;
        i += 1;
    }
    let mut i = 0u8;
    while i < 6 {
        t[(b'A' + i) as usize] = (10 + i) as i8;
        t[(b'a' + i) as usize] = (10 + i) as i8;
        i += 1;
    }
    t
};

/// The decoder attached to one part, chosen from its
/// `Content-Transfer-Encoding` header.
#[derive(Debug)]
pub(crate) enum TransferDecoder {
    Identity,
    Base64(Base64Decoder),
    QuotedPrintable(QuotedPrintableDecoder),
}

impl TransferDecoder {
    pub(crate) fn for_encoding(encoding: Option<&str>) -> crate::Result<TransferDecoder> {
        let encoding = match encoding {
            Some(encoding) => encoding.trim(),
            None => return Ok(TransferDecoder::Identity),
        };

        if encoding.eq_ignore_ascii_case("base64") {
            Ok(TransferDecoder::Base64(Base64Decoder::new()))
        } else if encoding.eq_ignore_ascii_case("quoted-printable") {
            Ok(TransferDecoder::QuotedPrintable(QuotedPrintableDecoder::new()))
        } else if encoding.eq_ignore_ascii_case("7bit")
            || encoding.eq_ignore_ascii_case("8bit")
            || encoding.eq_ignore_ascii_case("binary")
        {
            Ok(TransferDecoder::Identity)
        } else {
            Err(crate::Error::UnknownTransferEncoding {
                encoding: encoding.to_owned(),
            })
        }
    }

    pub(crate) fn write(&mut self, input: &[u8], out: &mut BytesMut) -> crate::Result<()> {
        match self {
            TransferDecoder::Identity => {
                out.extend_from_slice(input);
                Ok(())
            }
            TransferDecoder::Base64(decoder) => decoder.write(input, out),
            TransferDecoder::QuotedPrintable(decoder) => decoder.write(input, out),
        }
    }

    pub(crate) fn finalize(&mut self, out: &mut BytesMut) -> crate::Result<()> {
        match self {
            TransferDecoder::Identity => Ok(()),
            TransferDecoder::Base64(decoder) => decoder.finalize(out),
            TransferDecoder::QuotedPrintable(decoder) => decoder.finalize(out),
        }
    }
}

/// Incremental base64 decoder (RFC 2045 §6.8).
///
/// Consumes 4-character quanta; bytes outside the base64 alphabet (line
/// breaks, whitespace) are skipped per the RFC. A write leaving 1–3 residual
/// characters buffers them for the next call, so `finalize` is mandatory:
/// without it up to 3 trailing characters would be dropped.
#[derive(Debug)]
pub(crate) struct Base64Decoder {
    quantum: [u8; 4],
    quantum_len: usize,
}

impl Base64Decoder {
    pub(crate) fn new() -> Base64Decoder {
        Base64Decoder {
            quantum: [0; 4],
            quantum_len: 0,
        }
    }

    pub(crate) fn write(&mut self, input: &[u8], out: &mut BytesMut) -> crate::Result<()> {
        for &b in input {
            if b != b'=' && BASE64_DECODE[b as usize] < 0 {
                continue;
            }

            self.quantum[self.quantum_len] = b;
            self.quantum_len += 1;

            if self.quantum_len == 4 {
                self.quantum_len = 0;
                self.decode_quantum(4, out)?;
            }
        }

        Ok(())
    }

    pub(crate) fn finalize(&mut self, out: &mut BytesMut) -> crate::Result<()> {
        let len = self.quantum_len;
        self.quantum_len = 0;
        self.decode_quantum(len, out)
    }

    fn decode_quantum(&self, len: usize, out: &mut BytesMut) -> crate::Result<()> {
        // Padding only ever appears at the tail of a quantum.
        let significant = self.quantum[..len].iter().position(|&b| b == b'=').unwrap_or(len);

        let mut vals = [0u8; 4];
        for (val, &b) in vals.iter_mut().zip(&self.quantum[..significant]) {
            *val = BASE64_DECODE[b as usize] as u8;
        }

        match significant {
            0 => Ok(()),
            1 => Err(crate::Error::TruncatedBase64),
            2 => {
                out.extend_from_slice(&[(vals[0] << 2) | (vals[1] >> 4)]);
                Ok(())
            }
            3 => {
                out.extend_from_slice(&[(vals[0] << 2) | (vals[1] >> 4), (vals[1] << 4) | (vals[2] >> 2)]);
                Ok(())
            }
            _ => {
                out.extend_from_slice(&[
                    (vals[0] << 2) | (vals[1] >> 4),
                    (vals[1] << 4) | (vals[2] >> 2),
                    (vals[2] << 6) | vals[3],
                ]);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QpState {
    /// Plain passthrough.
    Text,
    /// A `=` was the last byte of the previous chunk.
    SeenEquals,
    /// `=X` seen with one valid hex digit.
    SeenHex(u8),
    /// `=\r` seen, awaiting the `\n` of a soft break.
    SeenCr,
}

/// Incremental quoted-printable decoder (RFC 2045 §6.7).
///
/// Copies bytes through unchanged except `=XX` escapes and the soft line
/// breaks `=\r\n` / `=\n`, which decode to nothing. An escape split across
/// chunks is carried as state; a dangling escape at true end-of-input is a
/// parse failure rather than a silent passthrough.
#[derive(Debug)]
pub(crate) struct QuotedPrintableDecoder {
    state: QpState,
}

impl QuotedPrintableDecoder {
    pub(crate) fn new() -> QuotedPrintableDecoder {
        QuotedPrintableDecoder { state: QpState::Text }
    }

    pub(crate) fn write(&mut self, input: &[u8], out: &mut BytesMut) -> crate::Result<()> {
        let mut pos = 0;

        while pos < input.len() {
            match self.state {
                QpState::Text => match memchr(b'=', &input[pos..]) {
                    Some(rel) => {
                        out.extend_from_slice(&input[pos..pos + rel]);
                        pos += rel + 1;
                        self.state = QpState::SeenEquals;
                    }
                    None => {
                        out.extend_from_slice(&input[pos..]);
                        pos = input.len();
                    }
                },
                QpState::SeenEquals => {
                    let b = input[pos];
                    if HEX_DECODE[b as usize] >= 0 {
                        self.state = QpState::SeenHex(b);
                        pos += 1;
                    } else if b == b'\r' {
                        self.state = QpState::SeenCr;
                        pos += 1;
                    } else if b == b'\n' {
                        // Soft break with a bare LF.
                        self.state = QpState::Text;
                        pos += 1;
                    } else {
                        // Invalid escape: the `=` passes through literally and
                        // the current byte is re-examined as text.
                        out.extend_from_slice(b"=");
                        self.state = QpState::Text;
                    }
                }
                QpState::SeenHex(h1) => {
                    let b = input[pos];
                    let v2 = HEX_DECODE[b as usize];
                    if v2 >= 0 {
                        let v1 = HEX_DECODE[h1 as usize] as u8;
                        out.extend_from_slice(&[(v1 << 4) | v2 as u8]);
                        pos += 1;
                    } else {
                        out.extend_from_slice(&[b'=', h1]);
                    }
                    self.state = QpState::Text;
                }
                QpState::SeenCr => {
                    let b = input[pos];
                    if b == b'\n' {
                        pos += 1;
                    } else {
                        out.extend_from_slice(b"=\r");
                    }
                    self.state = QpState::Text;
                }
            }
        }

        Ok(())
    }

    pub(crate) fn finalize(&mut self, _out: &mut BytesMut) -> crate::Result<()> {
        if self.state == QpState::Text {
            Ok(())
        } else {
            Err(crate::Error::DanglingEscape)
        }
    }
}
