//! Transport packets: the fixed 4-byte header, the adaptation field and the
//! payload slice. Packets keep a cheap `Bytes` handle onto the source buffer.

pub mod framer;

use bytes::Bytes;
use serde::Serialize;

use crate::bits::BitCursor;
use crate::constants::{PCR_CLOCK_HZ, TS_HEADER_SIZE, TS_PACKET_SIZE};
use crate::descriptors::as_hex;
use crate::error::BitError;

pub use framer::{probe, Framer, Framing};

/// One 188-byte transport packet.
#[derive(Debug, Clone, Serialize)]
pub struct TsPacket {
    /// Ordinal in the stream, counting from 0.
    pub index: u64,
    /// Byte offset of the sync byte in the source.
    pub offset: u64,
    /// Leading 4-byte timestamp of 192/208-byte packets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_timestamp: Option<u32>,
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_control: u8,
    pub continuity_counter: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptation_field: Option<AdaptationField>,
    /// Set when the adaptation field could not be parsed; the payload is then dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptation_error: Option<String>,
    #[serde(skip)]
    raw: Bytes,
    #[serde(skip)]
    payload_offset: Option<usize>,
}

impl TsPacket {
    /// Parses a packet from exactly 188 bytes starting at the sync byte.
    pub fn parse(raw: Bytes, index: u64, offset: u64, prefix_timestamp: Option<u32>) -> Self {
        debug_assert_eq!(raw.len(), TS_PACKET_SIZE);
        let b1 = raw[1];
        let b3 = raw[3];
        let adaptation_field_control = (b3 >> 4) & 0x03;
        let mut pkt = TsPacket {
            index,
            offset,
            prefix_timestamp,
            transport_error: b1 & 0x80 != 0,
            payload_unit_start: b1 & 0x40 != 0,
            transport_priority: b1 & 0x20 != 0,
            pid: ((b1 as u16 & 0x1F) << 8) | raw[2] as u16,
            scrambling_control: b3 >> 6,
            adaptation_field_control,
            continuity_counter: b3 & 0x0F,
            adaptation_field: None,
            adaptation_error: None,
            raw,
            payload_offset: None,
        };

        let mut start = TS_HEADER_SIZE;
        if pkt.has_adaptation_field() {
            let len = pkt.raw[TS_HEADER_SIZE] as usize;
            // 183 with payload, 183 without: one byte for the length itself
            if TS_HEADER_SIZE + 1 + len > TS_PACKET_SIZE {
                pkt.adaptation_error = Some(format!("adaptation_field_length {} exceeds packet", len));
                return pkt;
            }
            match AdaptationField::parse(&pkt.raw[TS_HEADER_SIZE + 1..TS_HEADER_SIZE + 1 + len]) {
                Ok(af) => pkt.adaptation_field = Some(af),
                Err(e) => {
                    pkt.adaptation_error = Some(e.to_string());
                    return pkt;
                }
            }
            start += 1 + len;
        }
        if pkt.has_payload() && start < TS_PACKET_SIZE {
            pkt.payload_offset = Some(start);
        }
        pkt
    }

    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0x01 != 0
    }

    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0x02 != 0
    }

    /// The full 188 bytes.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Payload bytes, empty when the packet carries none.
    pub fn payload(&self) -> Bytes {
        match self.payload_offset {
            Some(off) => self.raw.slice(off..),
            None => Bytes::new(),
        }
    }

    pub fn discontinuity(&self) -> bool {
        self.adaptation_field.as_ref().is_some_and(|af| af.discontinuity)
    }

    pub fn pcr(&self) -> Option<u64> {
        self.adaptation_field.as_ref().and_then(|af| af.pcr)
    }
}

/// Adaptation field (ISO/IEC 13818-1 2.4.3.4), without the length byte.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdaptationField {
    pub length: u8,
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    /// 27 MHz units (base * 300 + extension).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcr: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opcr: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splice_countdown: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_hex")]
    pub private_data: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<AdaptationExtension>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AdaptationExtension {
    /// (ltw_valid_flag, ltw_offset)
    pub legal_time_window: Option<(bool, u16)>,
    pub piecewise_rate: Option<u32>,
    pub seamless_splice: Option<SeamlessSplice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeamlessSplice {
    pub splice_type: u8,
    pub dts_next_au: u64,
}

fn opt_hex<S: serde::Serializer>(v: &Option<Bytes>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(b) => as_hex(b, s),
        None => s.serialize_none(),
    }
}

impl AdaptationField {
    pub fn parse(data: &[u8]) -> Result<Self, BitError> {
        let mut af = AdaptationField {
            length: data.len() as u8,
            ..Default::default()
        };
        if data.is_empty() {
            return Ok(af);
        }
        let mut r = BitCursor::new(data);
        af.discontinuity = r.read_bool()?;
        af.random_access = r.read_bool()?;
        af.es_priority = r.read_bool()?;
        let pcr_flag = r.read_bool()?;
        let opcr_flag = r.read_bool()?;
        let splicing_point_flag = r.read_bool()?;
        let private_data_flag = r.read_bool()?;
        let extension_flag = r.read_bool()?;

        if pcr_flag {
            af.pcr = Some(read_pcr(&mut r)?);
        }
        if opcr_flag {
            af.opcr = Some(read_pcr(&mut r)?);
        }
        if splicing_point_flag {
            af.splice_countdown = Some(r.read_u8()? as i8);
        }
        if private_data_flag {
            let len = r.read_u8()? as usize;
            af.private_data = Some(Bytes::copy_from_slice(r.read_bytes(len)?));
        }
        if extension_flag {
            let len = r.read_u8()? as usize;
            af.extension = Some(parse_extension(r.read_bytes(len)?)?);
        }
        // remaining bytes are stuffing
        Ok(af)
    }
}

fn read_pcr(r: &mut BitCursor<'_>) -> Result<u64, BitError> {
    let base = r.read_u64(33)?;
    r.skip(6)?;
    let ext = r.read(9)? as u64;
    Ok(base * 300 + ext)
}

fn parse_extension(data: &[u8]) -> Result<AdaptationExtension, BitError> {
    let mut ext = AdaptationExtension::default();
    if data.is_empty() {
        return Ok(ext);
    }
    let mut r = BitCursor::new(data);
    let ltw_flag = r.read_bool()?;
    let piecewise_rate_flag = r.read_bool()?;
    let seamless_splice_flag = r.read_bool()?;
    r.skip(5)?;
    if ltw_flag {
        let valid = r.read_bool()?;
        ext.legal_time_window = Some((valid, r.read(15)? as u16));
    }
    if piecewise_rate_flag {
        r.skip(2)?;
        ext.piecewise_rate = Some(r.read(22)?);
    }
    if seamless_splice_flag {
        let splice_type = r.read(4)? as u8;
        ext.seamless_splice = Some(SeamlessSplice {
            splice_type,
            dts_next_au: read_timestamp_tail(&mut r)?,
        });
    }
    Ok(ext)
}

/// The 33-bit marker-separated timestamp body shared by PES PTS/DTS and
/// DTS_next_AU, after the leading 4-bit prefix has been consumed.
pub(crate) fn read_timestamp_tail(r: &mut BitCursor<'_>) -> Result<u64, BitError> {
    let hi = r.read(3)? as u64;
    r.skip(1)?;
    let mid = r.read(15)? as u64;
    r.skip(1)?;
    let lo = r.read(15)? as u64;
    r.skip(1)?;
    Ok((hi << 30) | (mid << 15) | lo)
}

/// PCR in seconds.
pub fn pcr_seconds(pcr: u64) -> f64 {
    pcr as f64 / PCR_CLOCK_HZ
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a 188-byte packet; payload is padded with 0xFF.
    pub(crate) fn packet(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
        let mut p = vec![0x47, (if pusi { 0x40 } else { 0 }) | (pid >> 8) as u8, pid as u8, 0x10 | (cc & 0x0F)];
        p.extend_from_slice(payload);
        p.resize(TS_PACKET_SIZE, 0xFF);
        p
    }

    #[test]
    fn test_header_fields() {
        let pkt = TsPacket::parse(Bytes::from(packet(0x1234 & 0x1FFF, true, 7, &[1, 2, 3])), 3, 564, None);
        assert_eq!(pkt.pid, 0x1234);
        assert!(pkt.payload_unit_start);
        assert_eq!(pkt.continuity_counter, 7);
        assert_eq!(pkt.payload().len(), 184);
        assert_eq!(&pkt.payload()[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_adaptation_field_with_pcr() {
        let mut p = vec![0x47, 0x01, 0x00, 0x30, 7, 0x50];
        // base = 1, ext = 2
        p.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0xFE, 0x02]);
        p.resize(TS_PACKET_SIZE, 0xAA);
        let pkt = TsPacket::parse(Bytes::from(p), 0, 0, None);
        let af = pkt.adaptation_field.as_ref().unwrap();
        assert!(af.random_access);
        assert_eq!(af.pcr, Some(302));
        assert_eq!(pkt.payload().len(), 188 - 12);
    }

    #[test]
    fn test_oversized_adaptation_field_drops_payload() {
        let mut p = vec![0x47, 0x01, 0x00, 0x30, 200];
        p.resize(TS_PACKET_SIZE, 0);
        let pkt = TsPacket::parse(Bytes::from(p), 0, 0, None);
        assert!(pkt.adaptation_error.is_some());
        assert!(pkt.payload().is_empty());
    }

    #[test]
    fn test_adaptation_only_packet_has_no_payload() {
        let mut p = vec![0x47, 0x01, 0x00, 0x20, 183, 0x80];
        p.resize(TS_PACKET_SIZE, 0xFF);
        let pkt = TsPacket::parse(Bytes::from(p), 0, 0, None);
        assert!(pkt.discontinuity());
        assert!(!pkt.has_payload());
        assert!(pkt.payload().is_empty());
    }
}
