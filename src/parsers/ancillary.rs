//! SMPTE ST 2038 ancillary data packets carried in PES

use serde::Serialize;

use crate::bits::BitCursor;
use crate::error::{BitError, EsError};

#[derive(Debug, Clone, Serialize)]
pub struct AncillaryPacket {
    pub c_not_y: bool,
    pub line_number: u16,
    pub horizontal_offset: u16,
    pub did: u8,
    pub sdid: u8,
    /// Low 8 bits of each user data word.
    #[serde(serialize_with = "crate::descriptors::as_hex")]
    pub user_data: Vec<u8>,
    pub checksum_ok: bool,
}

impl AncillaryPacket {
    pub fn name(&self) -> &'static str {
        did_name(self.did, self.sdid)
    }
}

pub fn did_name(did: u8, sdid: u8) -> &'static str {
    match (did, sdid) {
        (0x41, 0x05) => "AFD and bar data",
        (0x41, 0x06) => "pan-scan data",
        (0x41, 0x07) => "SCTE 104 messages",
        (0x41, 0x08) => "DVB/SCTE VBI data",
        (0x43, 0x02) => "OP-47 subtitling distribution packet",
        (0x43, 0x03) => "OP-47 VANC multipacket",
        (0x45, _) => "audio metadata",
        (0x60, 0x60) => "ancillary time code",
        (0x61, 0x01) => "CEA-708 caption distribution packet",
        (0x61, 0x02) => "CEA-608 closed captions",
        (0x62, 0x01) => "program description",
        (0x62, 0x02) => "data broadcast",
        (0x62, 0x03) => "VBI data",
        _ => "unknown",
    }
}

fn read_word(r: &mut BitCursor<'_>, sum: &mut u32) -> Result<u16, BitError> {
    let word = r.read(10)? as u16;
    *sum += (word & 0x1FF) as u32;
    Ok(word)
}

fn parse_packet(r: &mut BitCursor<'_>) -> Result<AncillaryPacket, BitError> {
    r.skip(6)?;
    let c_not_y = r.read_bool()?;
    let line_number = r.read(11)? as u16;
    let horizontal_offset = r.read(12)? as u16;
    let mut sum = 0;
    let did = read_word(r, &mut sum)?;
    let sdid = read_word(r, &mut sum)?;
    let data_count = read_word(r, &mut sum)? & 0xFF;
    let mut user_data = Vec::with_capacity(data_count as usize);
    for _ in 0..data_count {
        user_data.push(read_word(r, &mut sum)? as u8);
    }
    let checksum = r.read(10)?;
    while !r.is_aligned() {
        r.skip(1)?;
    }
    Ok(AncillaryPacket {
        c_not_y,
        line_number,
        horizontal_offset,
        did: did as u8,
        sdid: sdid as u8,
        user_data,
        checksum_ok: checksum & 0x1FF == sum & 0x1FF,
    })
}

/// Parses consecutive ANC_data_packets until the data ends or stuffing
/// (a non-zero leading field) begins.
pub fn parse_ancillary(data: &[u8]) -> (Vec<AncillaryPacket>, Vec<EsError>) {
    let mut packets = Vec::new();
    let mut errors = Vec::new();
    let mut r = BitCursor::new(data);
    while r.bits_remaining() >= 72 {
        let offset = (r.position() / 8) as usize;
        if data[offset] >> 2 != 0 {
            break;
        }
        match parse_packet(&mut r) {
            Ok(p) => {
                if !p.checksum_ok {
                    errors.push(EsError::Malformed(format!(
                        "ancillary packet checksum mismatch at offset {}",
                        offset
                    )));
                }
                packets.push(p);
            }
            Err(e) => {
                errors.push(EsError::Malformed(format!("ancillary packet at offset {}: {}", offset, e)));
                break;
            }
        }
    }
    (packets, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    fn word(v: u8) -> u32 {
        let parity = v.count_ones() % 2;
        (v as u32) | (parity << 8) | ((parity ^ 1) << 9)
    }

    fn packet(w: &mut BitWriter, did: u8, sdid: u8, udw: &[u8], corrupt: bool) {
        w.write(6, 0).unwrap();
        w.write_bool(false).unwrap();
        w.write(11, 9).unwrap();
        w.write(12, 0xFFF).unwrap();
        let mut words = vec![word(did), word(sdid), word(udw.len() as u8)];
        words.extend(udw.iter().map(|&b| word(b)));
        let sum: u32 = words.iter().map(|w| w & 0x1FF).sum::<u32>() & 0x1FF;
        for v in &words {
            w.write(10, *v).unwrap();
        }
        let checksum = if corrupt { sum ^ 1 } else { sum };
        w.write(10, checksum | ((!checksum >> 8 & 1) << 9)).unwrap();
        while !w.is_aligned() {
            w.write_bool(true).unwrap();
        }
    }

    #[test]
    fn test_packets_with_stuffing() {
        let mut w = BitWriter::new();
        packet(&mut w, 0x61, 0x01, &[0x96, 0x69, 0x10], false);
        packet(&mut w, 0x41, 0x07, &[0x00], true);
        let mut data = w.finish().unwrap();
        data.extend([0xFF; 4]);

        let (packets, errors) = parse_ancillary(&data);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].name(), "CEA-708 caption distribution packet");
        assert_eq!(packets[0].line_number, 9);
        assert_eq!(packets[0].horizontal_offset, 0xFFF);
        assert_eq!(packets[0].user_data, vec![0x96, 0x69, 0x10]);
        assert!(packets[0].checksum_ok);
        assert!(!packets[1].checksum_ok);
        assert_eq!(errors.len(), 1);
    }
}
