//! PES reassembly and header parsing (ISO/IEC 13818-1 2.4.3.6).

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::bits::BitCursor;
use crate::constants::{PES_START_CODE, PTS_CLOCK_HZ};
use crate::error::EsError;
use crate::packet::read_timestamp_tail;
use crate::parsers::EsContent;

const PES_PREFIX: usize = 6;

pub mod stream_id {
    pub const PROGRAM_STREAM_MAP: u8 = 0xBC;
    pub const PRIVATE_STREAM_1: u8 = 0xBD;
    pub const PADDING: u8 = 0xBE;
    pub const PRIVATE_STREAM_2: u8 = 0xBF;
    pub const ECM: u8 = 0xF0;
    pub const EMM: u8 = 0xF1;
    pub const DSMCC: u8 = 0xF2;
    pub const H222_1_TYPE_E: u8 = 0xF8;
    pub const PROGRAM_STREAM_DIRECTORY: u8 = 0xFF;
}

/// Streams without the optional PES header.
pub fn has_optional_header(id: u8) -> bool {
    use stream_id::*;
    !matches!(
        id,
        PROGRAM_STREAM_MAP | PADDING | PRIVATE_STREAM_2 | ECM | EMM | DSMCC | H222_1_TYPE_E | PROGRAM_STREAM_DIRECTORY
    )
}

/// The optional PES header.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PesHeader {
    pub scrambling_control: u8,
    pub priority: bool,
    pub data_alignment: bool,
    pub copyright: bool,
    pub original: bool,
    pub header_data_length: u8,
    /// 90 kHz units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dts: Option<u64>,
    /// 27 MHz units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escr: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub es_rate: Option<u32>,
    pub dsm_trick_mode: bool,
    pub additional_copy_info: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_crc: Option<u16>,
    pub extension: bool,
}

impl PesHeader {
    /// Parses the header starting after PES_packet_length. Returns the header
    /// and the number of bytes it occupies.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), EsError> {
        let mut r = BitCursor::new(data);
        let marker = r.read(2)?;
        if marker != 0b10 {
            return Err(EsError::Malformed(format!("PES header marker bits {:02b}", marker)));
        }
        let mut h = PesHeader {
            scrambling_control: r.read(2)? as u8,
            priority: r.read_bool()?,
            data_alignment: r.read_bool()?,
            copyright: r.read_bool()?,
            original: r.read_bool()?,
            ..Default::default()
        };
        let pts_dts = r.read(2)?;
        let escr_flag = r.read_bool()?;
        let es_rate_flag = r.read_bool()?;
        h.dsm_trick_mode = r.read_bool()?;
        h.additional_copy_info = r.read_bool()?;
        let crc_flag = r.read_bool()?;
        h.extension = r.read_bool()?;
        h.header_data_length = r.read_u8()?;
        let end = 3 + h.header_data_length as usize;
        if end > data.len() {
            return Err(EsError::Overrun {
                offset: PES_PREFIX + 3,
                needed: h.header_data_length as usize,
                available: data.len() - 3,
            });
        }

        // The optional fields must fit inside header_data_length.
        let mut f = BitCursor::new(&data[3..end]);
        if pts_dts & 0b10 != 0 {
            f.skip(4)?;
            h.pts = Some(read_timestamp_tail(&mut f)?);
        }
        if pts_dts == 0b11 {
            f.skip(4)?;
            h.dts = Some(read_timestamp_tail(&mut f)?);
        }
        if escr_flag {
            f.skip(2)?;
            let hi = f.read(3)? as u64;
            f.skip(1)?;
            let mid = f.read(15)? as u64;
            f.skip(1)?;
            let lo = f.read(15)? as u64;
            f.skip(1)?;
            let ext = f.read(9)? as u64;
            f.skip(1)?;
            h.escr = Some(((hi << 30) | (mid << 15) | lo) * 300 + ext);
        }
        if es_rate_flag {
            f.skip(1)?;
            h.es_rate = Some(f.read(22)?);
            f.skip(1)?;
        }
        if h.dsm_trick_mode {
            f.skip(8)?;
        }
        if h.additional_copy_info {
            f.skip(8)?;
        }
        if crc_flag {
            h.previous_crc = Some(f.read_u16()?);
        }
        Ok((h, end))
    }
}

/// A reassembled PES packet.
#[derive(Debug, Clone, Serialize)]
pub struct PesPacket {
    pub pid: u16,
    pub stream_id: u8,
    /// PES_packet_length; 0 means unbounded.
    pub declared_length: u16,
    pub first_packet: u64,
    pub packet_count: u32,
    /// The next start (or end of data) arrived before the declared length.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<PesHeader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<EsContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub es_errors: Vec<String>,
    #[serde(skip)]
    raw: Bytes,
    #[serde(skip)]
    payload_offset: usize,
}

impl PesPacket {
    fn build(pid: u16, raw: Bytes, first_packet: u64, packet_count: u32, truncated: bool) -> Self {
        let stream_id = raw[3];
        let declared_length = u16::from_be_bytes([raw[4], raw[5]]);
        let mut pes = PesPacket {
            pid,
            stream_id,
            declared_length,
            first_packet,
            packet_count,
            truncated,
            header: None,
            header_error: None,
            content: None,
            es_errors: Vec::new(),
            payload_offset: PES_PREFIX,
            raw,
        };
        if has_optional_header(stream_id) {
            match PesHeader::parse(&pes.raw[PES_PREFIX..]) {
                Ok((header, len)) => {
                    pes.header = Some(header);
                    pes.payload_offset = PES_PREFIX + len;
                }
                Err(e) => {
                    pes.header_error = Some(e.to_string());
                    pes.payload_offset = pes.raw.len();
                }
            }
        }
        pes
    }

    /// Whole packet from the start code.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Elementary-stream bytes after the header.
    pub fn payload(&self) -> Bytes {
        self.raw.slice(self.payload_offset.min(self.raw.len())..)
    }

    pub fn pts(&self) -> Option<u64> {
        self.header.as_ref().and_then(|h| h.pts)
    }

    pub fn pts_seconds(&self) -> Option<f64> {
        self.pts().map(|p| p as f64 / PTS_CLOCK_HZ as f64)
    }

    /// Drops the retained bytes; header fields and decoded content stay.
    pub fn release_payload(&mut self) {
        self.raw = Bytes::new();
        self.payload_offset = 0;
    }
}

/// Per-PID PES accumulator.
#[derive(Debug, Default)]
pub struct PesAssembler {
    pid: u16,
    buf: BytesMut,
    first_packet: u64,
    packet_count: u32,
    active: bool,
    /// Total bytes expected (prefix included); 0 when unbounded.
    expected: usize,
    /// Start packets without the 0x000001 prefix.
    pub start_code_errors: u64,
    /// Accumulations dropped by a reset or left unbounded at the end.
    pub discarded: u64,
}

impl PesAssembler {
    pub fn new(pid: u16) -> Self {
        PesAssembler {
            pid,
            ..Default::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.active
    }

    /// Drops the pending accumulation.
    pub fn reset(&mut self) {
        if self.active {
            self.discarded += 1;
        }
        self.active = false;
        self.buf.clear();
    }

    fn emit(&mut self, truncated: bool, out: &mut Vec<PesPacket>) {
        let mut raw = std::mem::take(&mut self.buf).freeze();
        if self.expected != 0 && raw.len() > self.expected {
            raw.truncate(self.expected);
        }
        out.push(PesPacket::build(self.pid, raw, self.first_packet, self.packet_count, truncated));
        self.active = false;
    }

    pub fn push(&mut self, payload: &[u8], unit_start: bool, packet_index: u64, out: &mut Vec<PesPacket>) {
        if unit_start {
            if self.active {
                // unbounded packets end here; bounded ones were cut short
                let truncated = self.expected != 0;
                self.emit(truncated, out);
            }
            if payload.len() < PES_PREFIX || payload[..3] != PES_START_CODE {
                self.start_code_errors += 1;
                return;
            }
            let declared = u16::from_be_bytes([payload[4], payload[5]]) as usize;
            self.expected = if declared == 0 { 0 } else { PES_PREFIX + declared };
            self.first_packet = packet_index;
            self.packet_count = 0;
            self.active = true;
        } else if !self.active {
            return;
        }
        self.buf.extend_from_slice(payload);
        self.packet_count += 1;
        if self.expected != 0 && self.buf.len() >= self.expected {
            self.emit(false, out);
        }
    }

    /// End of data: bounded packets are emitted as truncated, unbounded
    /// ones are discarded since their end cannot be known.
    pub fn finish(&mut self, out: &mut Vec<PesPacket>) {
        if !self.active {
            return;
        }
        if self.expected != 0 {
            self.emit(true, out);
        } else {
            self.reset();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// PES with a PTS-only header.
    pub(crate) fn pes_with_pts(stream_id: u8, pts: u64, payload: &[u8], bounded: bool) -> Vec<u8> {
        let mut p = vec![0x00, 0x00, 0x01, stream_id, 0, 0, 0x80, 0x80, 5];
        p.push(0x21 | ((pts >> 29) & 0x0E) as u8);
        p.push((pts >> 22) as u8);
        p.push(0x01 | ((pts >> 14) & 0xFE) as u8);
        p.push((pts >> 7) as u8);
        p.push(0x01 | ((pts << 1) & 0xFE) as u8);
        p.extend_from_slice(payload);
        if bounded {
            let len = (p.len() - 6) as u16;
            p[4..6].copy_from_slice(&len.to_be_bytes());
        }
        p
    }

    #[test]
    fn test_bounded_pes_completes_at_declared_length() {
        let pes = pes_with_pts(0xE0, 900_000, &[0xAB; 300], true);
        let mut asm = PesAssembler::new(0x100);
        let mut out = Vec::new();
        asm.push(&pes[..184], true, 0, &mut out);
        assert!(out.is_empty());
        asm.push(&pes[184..], false, 1, &mut out);
        assert_eq!(out.len(), 1);
        let p = &out[0];
        assert!(!p.truncated);
        assert_eq!(p.packet_count, 2);
        assert_eq!(p.pts(), Some(900_000));
        assert_eq!(p.pts_seconds(), Some(10.0));
        assert_eq!(p.payload().len(), 300);
        assert!(!asm.is_pending());
    }

    #[test]
    fn test_unbounded_pes_ends_exactly_at_next_start() {
        let a = pes_with_pts(0xE0, 1, &[1; 100], false);
        let b = pes_with_pts(0xE0, 2, &[2; 10], false);
        let mut asm = PesAssembler::new(0x100);
        let mut out = Vec::new();
        asm.push(&a, true, 0, &mut out);
        asm.push(&[3; 50], false, 1, &mut out);
        asm.push(&b, true, 2, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw().len(), a.len() + 50);
        assert!(!out[0].truncated);
        asm.finish(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(asm.discarded, 1);
    }

    #[test]
    fn test_bounded_pes_cut_short_is_truncated() {
        let a = pes_with_pts(0xC0, 1, &[1; 400], true);
        let mut asm = PesAssembler::new(0x101);
        let mut out = Vec::new();
        asm.push(&a[..184], true, 0, &mut out);
        asm.push(&pes_with_pts(0xC0, 2, &[], true), true, 1, &mut out);
        assert_eq!(out.len(), 2);
        assert!(out[0].truncated);
        assert!(!out[1].truncated);
    }

    #[test]
    fn test_start_without_prefix_is_counted() {
        let mut asm = PesAssembler::new(0x100);
        let mut out = Vec::new();
        asm.push(&[0x00, 0x00, 0x02, 0xE0, 0, 0], true, 0, &mut out);
        asm.push(&[1, 2, 3], false, 1, &mut out);
        assert_eq!(asm.start_code_errors, 1);
        assert!(out.is_empty());
        assert!(!asm.is_pending());
    }

    #[test]
    fn test_padding_stream_has_no_header() {
        let mut asm = PesAssembler::new(0x100);
        let mut out = Vec::new();
        asm.push(&[0x00, 0x00, 0x01, 0xBE, 0x00, 0x02, 0xFF, 0xFF], true, 0, &mut out);
        assert!(out[0].header.is_none());
        assert_eq!(out[0].payload().len(), 2);
    }
}
