// psi/section.rs
//! PSI / SI section framing: per-PID reassembly across packets, header
//! parsing and CRC-32 (MPEG-2) validation.

use bytes::Bytes;
use crc::{Crc, CRC_32_MPEG_2};
use serde::Serialize;

use crate::constants::table_id;
use crate::error::SectionError;

pub const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

const SHORT_HEADER: usize = 3;
const LONG_HEADER: usize = 8;

/// One complete section as carried on a PID.
#[derive(Debug, Clone, Serialize)]
pub struct PsiSection {
    pub pid: u16,
    pub first_packet: u64,
    pub table_id: u8,
    pub syntax_indicator: bool,
    pub private_indicator: bool,
    pub section_length: u16,
    pub table_id_extension: u16,
    pub version_number: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub crc32: Option<u32>,
    #[serde(skip)]
    raw: Bytes,
}

impl PsiSection {
    /// Validates length and (when present) CRC-32 of a reassembled section.
    pub fn parse(raw: Bytes, pid: u16, first_packet: u64) -> Result<Self, SectionError> {
        if raw.len() < SHORT_HEADER {
            return Err(SectionError::TooShort(raw.len()));
        }
        let tid = raw[0];
        let syntax_indicator = raw[1] & 0x80 != 0;
        let private_indicator = raw[1] & 0x40 != 0;
        let section_length = ((raw[1] as u16 & 0x0F) << 8) | raw[2] as u16;
        let end = SHORT_HEADER + section_length as usize;
        if end > raw.len() {
            return Err(SectionError::Truncated {
                declared: end,
                available: raw.len(),
            });
        }
        let raw = raw.slice(..end);

        let has_crc = syntax_indicator || tid == table_id::TOT;
        let crc32 = if has_crc {
            if end < SHORT_HEADER + 4 {
                return Err(SectionError::TooShort(end));
            }
            let carried = u32::from_be_bytes([raw[end - 4], raw[end - 3], raw[end - 2], raw[end - 1]]);
            let computed = CRC_MPEG.checksum(&raw[..end - 4]);
            if carried != computed {
                return Err(SectionError::CrcMismatch { carried, computed });
            }
            Some(carried)
        } else {
            None
        };

        let mut s = PsiSection {
            pid,
            first_packet,
            table_id: tid,
            syntax_indicator,
            private_indicator,
            section_length,
            table_id_extension: 0,
            version_number: 0,
            current_next: true,
            section_number: 0,
            last_section_number: 0,
            crc32,
            raw,
        };
        if syntax_indicator {
            if end < LONG_HEADER + 4 {
                return Err(SectionError::TooShort(end));
            }
            s.table_id_extension = u16::from_be_bytes([s.raw[3], s.raw[4]]);
            s.version_number = (s.raw[5] & 0x3E) >> 1;
            s.current_next = s.raw[5] & 0x01 != 0;
            s.section_number = s.raw[6];
            s.last_section_number = s.raw[7];
            if s.section_number > s.last_section_number {
                return Err(SectionError::SectionNumberOutOfRange {
                    section_number: s.section_number,
                    last_section_number: s.last_section_number,
                });
            }
        }
        Ok(s)
    }

    /// Whole section, header through CRC.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Bytes between the fixed header and the CRC.
    pub fn body(&self) -> Bytes {
        let start = if self.syntax_indicator { LONG_HEADER } else { SHORT_HEADER };
        let end = self.raw.len() - if self.crc32.is_some() { 4 } else { 0 };
        self.raw.slice(start.min(end)..end)
    }
}

/// Per-PID section accumulator.
///
/// Bytes before the pointer field finish the pending section; the pending
/// section is discarded if they do not complete it.
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buf: Vec<u8>,
    first_packet: u64,
    active: bool,
    /// Sections dropped because they were never completed.
    pub discarded: u64,
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops any pending bytes (continuity error or cancellation).
    pub fn reset(&mut self) {
        if self.active {
            self.discarded += 1;
        }
        self.buf.clear();
        self.active = false;
    }

    pub fn is_pending(&self) -> bool {
        self.active
    }

    /// Feeds one packet payload; completed sections are appended to `out`
    /// with the index of the packet their first byte arrived in.
    pub fn push(&mut self, payload: &[u8], unit_start: bool, packet_index: u64, out: &mut Vec<(Bytes, u64)>) {
        if !unit_start {
            if self.active {
                self.buf.extend_from_slice(payload);
                self.try_complete(out);
            }
            return;
        }

        let Some(&pointer) = payload.first() else {
            return;
        };
        let pointer = pointer as usize;
        if payload.len() < 1 + pointer {
            self.reset();
            return;
        }
        if self.active {
            self.buf.extend_from_slice(&payload[1..1 + pointer]);
            self.try_complete(out);
            if self.active {
                self.reset();
            }
        }

        let mut rest = &payload[1 + pointer..];
        while let Some(&tid) = rest.first() {
            if tid == table_id::STUFFING {
                break;
            }
            if rest.len() < SHORT_HEADER {
                self.begin(rest, packet_index);
                break;
            }
            let total = SHORT_HEADER + (((rest[1] as usize) & 0x0F) << 8 | rest[2] as usize);
            if rest.len() >= total {
                out.push((Bytes::copy_from_slice(&rest[..total]), packet_index));
                rest = &rest[total..];
            } else {
                self.begin(rest, packet_index);
                break;
            }
        }
    }

    fn begin(&mut self, bytes: &[u8], packet_index: u64) {
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.first_packet = packet_index;
        self.active = true;
    }

    fn try_complete(&mut self, out: &mut Vec<(Bytes, u64)>) {
        if self.buf.len() < SHORT_HEADER {
            return;
        }
        let total = SHORT_HEADER + (((self.buf[1] as usize) & 0x0F) << 8 | self.buf[2] as usize);
        if self.buf.len() >= total {
            self.buf.truncate(total);
            let section = std::mem::take(&mut self.buf);
            out.push((Bytes::from(section), self.first_packet));
            self.active = false;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a long-form section with a valid CRC.
    pub(crate) fn long_section(tid: u8, ext: u16, version: u8, number: u8, last: u8, body: &[u8]) -> Vec<u8> {
        let len = 5 + body.len() + 4;
        let mut v = vec![
            tid,
            0xB0 | ((len >> 8) as u8 & 0x0F),
            len as u8,
            (ext >> 8) as u8,
            ext as u8,
            0xC1 | (version << 1),
            number,
            last,
        ];
        v.extend_from_slice(body);
        let crc = CRC_MPEG.checksum(&v);
        v.extend_from_slice(&crc.to_be_bytes());
        v
    }

    #[test]
    fn test_parse_long_section() {
        let raw = long_section(0x00, 0x1234, 3, 0, 1, &[0x00, 0x01, 0xE1, 0x00]);
        let s = PsiSection::parse(Bytes::from(raw), 0, 7).unwrap();
        assert_eq!(s.table_id_extension, 0x1234);
        assert_eq!(s.version_number, 3);
        assert!(s.current_next);
        assert_eq!(s.last_section_number, 1);
        assert_eq!(s.body().as_ref(), &[0x00, 0x01, 0xE1, 0x00]);
        assert_eq!(s.first_packet, 7);
    }

    #[test]
    fn test_single_byte_corruption_fails_crc() {
        let raw = long_section(0x02, 1, 0, 0, 0, &[0xE1, 0x00, 0xF0, 0x00]);
        for i in 3..raw.len() {
            let mut bad = raw.clone();
            bad[i] ^= 0x01;
            let err = PsiSection::parse(Bytes::from(bad), 0x100, 0).unwrap_err();
            assert!(matches!(err, SectionError::CrcMismatch { .. }), "byte {}", i);
        }
    }

    #[test]
    fn test_section_number_beyond_last() {
        let raw = long_section(0x42, 1, 0, 2, 1, &[0xFF, 0xFF, 0xFF]);
        assert_eq!(
            PsiSection::parse(Bytes::from(raw), 0x11, 0).unwrap_err(),
            SectionError::SectionNumberOutOfRange {
                section_number: 2,
                last_section_number: 1
            }
        );
    }

    #[test]
    fn test_assembler_spans_packets_and_stuffing() {
        let section = long_section(0x00, 1, 0, 0, 0, &[0u8; 200]);
        let mut asm = SectionAssembler::new();
        let mut out = Vec::new();

        let mut first = vec![0x00];
        first.extend_from_slice(&section[..183]);
        asm.push(&first, true, 0, &mut out);
        assert!(out.is_empty());
        assert!(asm.is_pending());

        let mut second = section[183..].to_vec();
        second.resize(184, 0xFF);
        asm.push(&second, false, 1, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.as_ref(), section.as_slice());
        assert_eq!(out[0].1, 0);
    }

    #[test]
    fn test_assembler_multiple_sections_and_pointer() {
        let a = long_section(0x00, 1, 0, 0, 0, &[1, 2, 3, 4]);
        let b = long_section(0x02, 1, 0, 0, 0, &[0xE1, 0x00, 0xF0, 0x00]);
        let mut payload = vec![0x00];
        payload.extend_from_slice(&a);
        payload.extend_from_slice(&b);
        payload.resize(184, 0xFF);
        let mut asm = SectionAssembler::new();
        let mut out = Vec::new();
        asm.push(&payload, true, 5, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].0.as_ref(), b.as_slice());
    }

    #[test]
    fn test_incomplete_pending_section_is_discarded_on_new_start() {
        let a = long_section(0x00, 1, 0, 0, 0, &[0u8; 300]);
        let b = long_section(0x00, 1, 1, 0, 0, &[1, 2, 3, 4]);
        let mut asm = SectionAssembler::new();
        let mut out = Vec::new();
        let mut p1 = vec![0x00];
        p1.extend_from_slice(&a[..183]);
        asm.push(&p1, true, 0, &mut out);
        // next start carries two stray bytes of `a`, then `b`
        let mut p2 = vec![0x02, a[183], a[184]];
        p2.extend_from_slice(&b);
        asm.push(&p2, true, 1, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.as_ref(), b.as_slice());
        assert_eq!(asm.discarded, 1);
    }
}
