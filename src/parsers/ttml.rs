//! DVB TTML subtitling segments (ETSI EN 303 560)
//!
//! PES data field: data_identifier 0x20, subtitle_stream_id, then segments
//! of `0x0F | segment_type | reserved(4) compression_type(4) |
//! segment_length(16) | payload | CRC_32`, closed by 0xFF. segment_length
//! counts the payload and the CRC; the CRC covers sync byte to payload end.

use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};
use serde::Serialize;

use crate::error::EsError;
use crate::psi::section::CRC_MPEG;

pub const DATA_IDENTIFIER: u8 = 0x20;
const SYNC_BYTE: u8 = 0x0F;
const END_OF_PES_DATA: u8 = 0xFF;
const HEADER_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compression {
    None,
    Zlib,
    Gzip,
    Reserved(u8),
}

impl From<u8> for Compression {
    fn from(v: u8) -> Self {
        match v {
            0 => Compression::None,
            1 => Compression::Zlib,
            2 => Compression::Gzip,
            other => Compression::Reserved(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TtmlPes {
    pub subtitle_stream_id: u8,
    pub segments: Vec<TtmlSegment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TtmlSegment {
    pub offset: usize,
    pub segment_type: u8,
    pub compression: Compression,
    pub payload_length: usize,
    /// Decoded document text; absent when the payload could not be
    /// decompressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl TtmlSegment {
    pub fn type_name(&self) -> &'static str {
        match self.segment_type {
            0x01 => "TTML document",
            0x02 => "font download",
            _ => "reserved",
        }
    }
}

fn decompress(compression: Compression, payload: &[u8]) -> Result<Vec<u8>, EsError> {
    let mut out = Vec::new();
    let result = match compression {
        Compression::None => return Ok(payload.to_vec()),
        Compression::Zlib => ZlibDecoder::new(payload).read_to_end(&mut out),
        Compression::Gzip => GzDecoder::new(payload).read_to_end(&mut out),
        Compression::Reserved(v) => {
            return Err(EsError::Decompress(format!("reserved compression_type {}", v)));
        }
    };
    result.map_err(|e| EsError::Decompress(e.to_string()))?;
    Ok(out)
}

pub fn parse_ttml(data: &[u8]) -> (Option<TtmlPes>, Vec<EsError>) {
    let mut errors = Vec::new();
    if data.len() < 2 || data[0] != DATA_IDENTIFIER {
        errors.push(EsError::BadSync {
            expected: DATA_IDENTIFIER as u32,
            found: data.first().copied().unwrap_or(0) as u32,
            offset: 0,
        });
        return (None, errors);
    }
    let mut pes = TtmlPes {
        subtitle_stream_id: data[1],
        segments: Vec::new(),
    };
    let mut pos = 2;
    while pos < data.len() {
        match data[pos] {
            SYNC_BYTE => {}
            END_OF_PES_DATA => break,
            other => {
                errors.push(EsError::BadSync {
                    expected: SYNC_BYTE as u32,
                    found: other as u32,
                    offset: pos,
                });
                break;
            }
        }
        if pos + HEADER_SIZE > data.len() {
            errors.push(EsError::Overrun {
                offset: pos,
                needed: HEADER_SIZE,
                available: data.len() - pos,
            });
            break;
        }
        let segment_type = data[pos + 1];
        let compression = Compression::from(data[pos + 2] & 0x0F);
        let length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        let start = pos + HEADER_SIZE;
        if length < 4 || start + length > data.len() {
            errors.push(EsError::Overrun {
                offset: pos,
                needed: length.max(4),
                available: data.len() - start,
            });
            break;
        }
        let payload_end = start + length - 4;
        let carried = u32::from_be_bytes([
            data[payload_end],
            data[payload_end + 1],
            data[payload_end + 2],
            data[payload_end + 3],
        ]);
        let next = start + length;
        if CRC_MPEG.checksum(&data[pos..payload_end]) != carried {
            errors.push(EsError::Crc(pos));
            pos = next;
            continue;
        }
        let payload = &data[start..payload_end];
        let document = match decompress(compression, payload) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                errors.push(e);
                None
            }
        };
        pes.segments.push(TtmlSegment {
            offset: pos,
            segment_type,
            compression,
            payload_length: payload.len(),
            document,
        });
        pos = next;
    }
    (Some(pes), errors)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use flate2::write::{GzEncoder, ZlibEncoder};

    use super::*;

    pub(crate) fn segment(compression: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![SYNC_BYTE, 0x01, compression];
        out.extend(((payload.len() + 4) as u16).to_be_bytes());
        out.extend(payload);
        let crc = CRC_MPEG.checksum(&out);
        out.extend(crc.to_be_bytes());
        out
    }

    const DOC: &str = r#"<tt xmlns="http://www.w3.org/ns/ttml"><body><div><p>Hi</p></div></body></tt>"#;

    #[test]
    fn test_plain_and_compressed_documents() {
        let mut zlib = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(DOC.as_bytes()).unwrap();
        let zlib = zlib.finish().unwrap();
        let mut gzip = GzEncoder::new(Vec::new(), flate2::Compression::fast());
        gzip.write_all(DOC.as_bytes()).unwrap();
        let gzip = gzip.finish().unwrap();

        let mut data = vec![0x20, 0x00];
        data.extend(segment(0, DOC.as_bytes()));
        data.extend(segment(1, &zlib));
        data.extend(segment(2, &gzip));
        data.push(0xFF);

        let (pes, errors) = parse_ttml(&data);
        assert!(errors.is_empty(), "{:?}", errors);
        let pes = pes.unwrap();
        assert_eq!(pes.segments.len(), 3);
        assert_eq!(pes.segments[1].compression, Compression::Zlib);
        assert_eq!(pes.segments[2].compression, Compression::Gzip);
        for s in &pes.segments {
            assert_eq!(s.document.as_deref(), Some(DOC));
            assert_eq!(s.type_name(), "TTML document");
        }
    }

    #[test]
    fn test_crc_mismatch_skips_segment() {
        let mut data = vec![0x20, 0x00];
        let mut bad = segment(0, b"<tt/>");
        bad[6] ^= 0xFF;
        data.extend(bad);
        data.extend(segment(0, b"<tt></tt>"));
        let (pes, errors) = parse_ttml(&data);
        assert_eq!(errors, vec![EsError::Crc(2)]);
        let pes = pes.unwrap();
        assert_eq!(pes.segments.len(), 1);
        assert_eq!(pes.segments[0].document.as_deref(), Some("<tt></tt>"));
    }

    #[test]
    fn test_corrupt_zlib_reported() {
        let mut data = vec![0x20, 0x00];
        data.extend(segment(1, b"not zlib"));
        let (pes, errors) = parse_ttml(&data);
        assert!(matches!(errors[0], EsError::Decompress(_)));
        assert!(pes.unwrap().segments[0].document.is_none());
    }
}
