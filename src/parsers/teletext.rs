//! EBU teletext carried in PES (ETSI EN 300 472, ETS 300 706)
//!
//! Data units are bit-reversed on the wire. Pages are rebuilt per magazine:
//! a page header closes the page previously open in its magazine (or in
//! every magazine when the header signals serial transmission).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::EsError;

const DATA_UNIT_SIZE: usize = 44;
const FRAMING_CODE: u8 = 0xE4;

/// Hamming 8/4 codewords for data values 0..=15, LSB-first bit order.
const HAMMING_8_4: [u8; 16] = [
    0x15, 0x02, 0x49, 0x5E, 0x64, 0x73, 0x38, 0x2F, 0xD0, 0xC7, 0x8C, 0x9B, 0xA1, 0xB6, 0xFD, 0xEA,
];

/// Decodes one Hamming 8/4 byte, correcting a single bit error.
pub fn unham_8_4(byte: u8) -> Option<u8> {
    HAMMING_8_4
        .iter()
        .position(|&cw| (cw ^ byte).count_ones() <= 1)
        .map(|v| v as u8)
}

/// Odd-parity 7-bit character; `None` on a parity failure.
pub fn odd_parity(byte: u8) -> Option<u8> {
    (byte.count_ones() % 2 == 1).then_some(byte & 0x7F)
}

/// English G0 national option subset.
fn g0_char(code: u8) -> char {
    match code {
        0x00..=0x1F => ' ',
        0x23 => '£',
        0x5B => '←',
        0x5C => '½',
        0x5D => '→',
        0x5E => '↑',
        0x5F => '#',
        0x60 => '\u{2014}',
        0x7B => '¼',
        0x7C => '\u{2016}',
        0x7D => '¾',
        0x7E => '÷',
        0x7F => '\u{25A0}',
        c => c as char,
    }
}

fn decode_text(bytes: &[u8], parity_errors: &mut usize) -> String {
    bytes
        .iter()
        .map(|&b| match odd_parity(b) {
            Some(c) => g0_char(c),
            None => {
                *parity_errors += 1;
                ' '
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct TeletextUnit {
    pub data_unit_id: u8,
    pub field_parity: bool,
    pub line_offset: u8,
    pub magazine: u8,
    pub packet: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeletextPage {
    pub magazine: u8,
    /// Page number within the magazine as transmitted (tens/units nibbles).
    pub page: u8,
    pub subcode: u16,
    pub erase: bool,
    pub newsflash: bool,
    pub subtitle: bool,
    pub serial: bool,
    /// C7..C14 as transmitted (C7 in bit 0).
    pub control_bits: u8,
    pub national_option: u8,
    pub header: String,
    pub rows: BTreeMap<u8, String>,
}

impl TeletextPage {
    /// Page number as shown to viewers, e.g. "888".
    pub fn number(&self) -> String {
        format!("{}{:02X}", self.magazine, self.page)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeletextPes {
    pub data_identifier: u8,
    pub units: Vec<TeletextUnit>,
    /// Pages completed while decoding this PES packet.
    pub pages: Vec<TeletextPage>,
    pub parity_errors: usize,
}

/// Pages under construction, carried between PES packets of one PID.
#[derive(Debug, Default)]
pub struct TeletextState {
    open: [Option<TeletextPage>; 8],
}

impl TeletextState {
    pub fn new() -> Self {
        Self::default()
    }

    fn close(&mut self, magazine: u8, out: &mut Vec<TeletextPage>) {
        if let Some(page) = self.open[(magazine - 1) as usize].take() {
            out.push(page);
        }
    }

    /// Closes every open page.
    pub fn flush(&mut self) -> Vec<TeletextPage> {
        let mut out = Vec::new();
        for m in 1..=8 {
            self.close(m, &mut out);
        }
        out
    }

    pub fn decode(&mut self, data: &[u8]) -> (Option<TeletextPes>, Vec<EsError>) {
        let mut errors = Vec::new();
        let Some(&data_identifier) = data.first() else {
            return (None, errors);
        };
        if !(0x10..=0x1F).contains(&data_identifier) {
            errors.push(EsError::BadSync {
                expected: 0x10,
                found: data_identifier as u32,
                offset: 0,
            });
            return (None, errors);
        }
        let mut pes = TeletextPes {
            data_identifier,
            ..Default::default()
        };
        let mut pos = 1;
        while pos + 2 <= data.len() {
            let data_unit_id = data[pos];
            let len = data[pos + 1] as usize;
            let start = pos + 2;
            if start + len > data.len() {
                errors.push(EsError::Overrun {
                    offset: pos,
                    needed: len,
                    available: data.len() - start,
                });
                break;
            }
            if matches!(data_unit_id, 0x02 | 0x03) && len == DATA_UNIT_SIZE {
                if let Err(e) = self.unit(data_unit_id, pos, &data[start..start + len], &mut pes) {
                    errors.push(e);
                }
            }
            pos = start + len;
        }
        (Some(pes), errors)
    }

    fn unit(&mut self, data_unit_id: u8, offset: usize, unit: &[u8], pes: &mut TeletextPes) -> Result<(), EsError> {
        let field_parity = unit[0] & 0x20 != 0;
        let line_offset = unit[0] & 0x1F;
        if unit[1] != FRAMING_CODE {
            return Err(EsError::BadSync {
                expected: FRAMING_CODE as u32,
                found: unit[1] as u32,
                offset: offset + 3,
            });
        }
        let bytes: Vec<u8> = unit[2..].iter().map(|b| b.reverse_bits()).collect();
        let hamming = |i: usize| {
            unham_8_4(bytes[i])
                .ok_or_else(|| EsError::Malformed(format!("uncorrectable Hamming byte in teletext unit at offset {}", offset)))
        };
        let address = hamming(0)? | (hamming(1)? << 4);
        let magazine = match address & 0x07 {
            0 => 8,
            m => m,
        };
        let packet = address >> 3;
        pes.units.push(TeletextUnit {
            data_unit_id,
            field_parity,
            line_offset,
            magazine,
            packet,
        });
        let block = &bytes[2..];
        let slot = (magazine - 1) as usize;
        match packet {
            0 => {
                let h = |i: usize| {
                    unham_8_4(block[i]).ok_or_else(|| {
                        EsError::Malformed(format!("uncorrectable page header in teletext unit at offset {}", offset))
                    })
                };
                let page = h(0)? | (h(1)? << 4);
                let s1 = h(2)? as u16;
                let s2 = h(3)?;
                let s3 = h(4)? as u16;
                let s4 = h(5)?;
                let c7_10 = h(6)?;
                let c11_14 = h(7)?;
                let serial = c11_14 & 0x01 != 0;
                if serial {
                    for m in 1..=8 {
                        self.close(m, &mut pes.pages);
                    }
                } else {
                    self.close(magazine, &mut pes.pages);
                }
                // page 0xFF is a time-filling header and opens no page
                if page != 0xFF {
                    self.open[slot] = Some(TeletextPage {
                        magazine,
                        page,
                        subcode: s1 | ((s2 as u16 & 0x07) << 4) | (s3 << 7) | ((s4 as u16 & 0x03) << 11),
                        erase: s2 & 0x08 != 0,
                        newsflash: s4 & 0x04 != 0,
                        subtitle: s4 & 0x08 != 0,
                        serial,
                        control_bits: c7_10 | (c11_14 << 4),
                        national_option: (c11_14 >> 1) & 0x07,
                        header: decode_text(&block[8..], &mut pes.parity_errors),
                        rows: BTreeMap::new(),
                    });
                }
            }
            1..=24 => {
                let text = decode_text(block, &mut pes.parity_errors);
                if let Some(page) = self.open[slot].as_mut() {
                    page.rows.insert(packet, text);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn ham(v: u8) -> u8 {
        HAMMING_8_4[v as usize]
    }

    fn parity(c: u8) -> u8 {
        if c.count_ones() % 2 == 0 { c | 0x80 } else { c }
    }

    /// Builds one 46-byte data unit (id, length, payload) in wire bit order.
    pub(crate) fn unit(magazine: u8, packet: u8, block: [u8; 40]) -> Vec<u8> {
        let address = (magazine & 0x07) | (packet << 3);
        let mut body = vec![ham(address & 0x0F), ham(address >> 4)];
        body.extend(block);
        let mut out = vec![0x03, 44, 0x20 | 21, FRAMING_CODE];
        out.extend(body.iter().map(|b| b.reverse_bits()));
        out
    }

    pub(crate) fn header(magazine: u8, page: u8, subtitle: bool, text: &str) -> Vec<u8> {
        let mut block = [parity(b' '); 40];
        block[0] = ham(page & 0x0F);
        block[1] = ham(page >> 4);
        for i in 2..8 {
            block[i] = ham(0);
        }
        if subtitle {
            block[5] = ham(0x08);
        }
        for (i, c) in text.bytes().take(32).enumerate() {
            block[8 + i] = parity(c);
        }
        unit(magazine, 0, block)
    }

    pub(crate) fn row(magazine: u8, packet: u8, text: &str) -> Vec<u8> {
        let mut block = [parity(b' '); 40];
        for (i, c) in text.bytes().take(40).enumerate() {
            block[i] = parity(c);
        }
        unit(magazine, packet, block)
    }

    #[test]
    fn test_hamming_corrects_single_bit() {
        for v in 0..16u8 {
            assert_eq!(unham_8_4(ham(v)), Some(v));
            assert_eq!(unham_8_4(ham(v) ^ 0x10), Some(v));
        }
        assert_eq!(unham_8_4(ham(3) ^ 0x03), None);
    }

    #[test]
    fn test_page_spans_pes_packets() {
        let mut state = TeletextState::new();
        let mut first = vec![0x10];
        first.extend(header(8, 0x88, true, "SUBTITLES"));
        first.extend(row(8, 22, "Hello world"));
        let (pes, errors) = state.decode(&first);
        assert!(errors.is_empty(), "{:?}", errors);
        let pes = pes.unwrap();
        assert_eq!(pes.units.len(), 2);
        assert_eq!(pes.units[0].magazine, 8);
        assert!(pes.pages.is_empty());

        let mut second = vec![0x10];
        second.extend(row(8, 23, "second line"));
        second.extend(header(8, 0x89, false, ""));
        let (pes, errors) = state.decode(&second);
        assert!(errors.is_empty(), "{:?}", errors);
        let pages = pes.unwrap().pages;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number(), "888");
        assert!(pages[0].subtitle);
        assert!(pages[0].header.starts_with("SUBTITLES"));
        assert_eq!(pages[0].rows[&22].trim_end(), "Hello world");
        assert_eq!(pages[0].rows[&23].trim_end(), "second line");

        let rest = state.flush();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].number(), "889");
    }

    #[test]
    fn test_parity_errors_counted() {
        let mut state = TeletextState::new();
        let mut data = vec![0x10];
        data.extend(header(1, 0x00, false, ""));
        let mut bad = row(1, 1, "A");
        // flip one bit of the first character (wire byte 6)
        bad[6] ^= 0x01;
        data.extend(bad);
        let (pes, _) = state.decode(&data);
        assert_eq!(pes.unwrap().parity_errors, 1);
    }

    #[test]
    fn test_bad_framing_code() {
        let mut state = TeletextState::new();
        let mut data = vec![0x10];
        let mut u = row(1, 1, "x");
        u[3] = 0x27;
        data.extend(u);
        let (pes, errors) = state.decode(&data);
        assert!(pes.unwrap().units.is_empty());
        assert!(matches!(errors[0], EsError::BadSync { expected: 0xE4, found: 0x27, .. }));
    }
}
