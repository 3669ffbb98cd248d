//! DVB string decoding (EN 300 468 Annex A).
//!
//! The first byte of a text field may select a character table; without a
//! selector the configured default applies (ISO/IEC 6937 unless overridden).

use std::borrow::Cow;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

/// Character table used when a string carries no selector byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Charset {
    #[default]
    Iso6937,
    Iso8859(u8),
    Utf8,
}

impl Charset {
    /// Parses CLI-style names: `6937`, `8859-1` .. `8859-16`, `utf-8`.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let lower = lower.trim_start_matches("iso").trim_start_matches(['-', '_']);
        match lower {
            "6937" => Some(Charset::Iso6937),
            "utf8" | "utf-8" => Some(Charset::Utf8),
            other => {
                let n = other.strip_prefix("8859-")?.parse::<u8>().ok()?;
                (1..=16).contains(&n).then_some(Charset::Iso8859(n))
            }
        }
    }
}

const EMPHASIS_ON: char = '\u{E086}';
const EMPHASIS_OFF: char = '\u{E087}';
const CR_LF: char = '\u{E08A}';

/// Decodes a DVB text field.
pub fn decode(bytes: &[u8], default: Charset) -> String {
    let Some(&first) = bytes.first() else {
        return String::new();
    };
    let (charset, body): (Table, &[u8]) = match first {
        0x01..=0x0B => (Table::Iso8859(first + 4), &bytes[1..]),
        0x10 if bytes.len() >= 3 => (Table::Iso8859(bytes[2]), &bytes[3..]),
        0x11 => (Table::Ucs2, &bytes[1..]),
        0x12 => (Table::Named(encoding_rs::EUC_KR), &bytes[1..]),
        0x13 => (Table::Named(encoding_rs::GBK), &bytes[1..]),
        0x14 => (Table::Named(encoding_rs::BIG5), &bytes[1..]),
        0x15 => (Table::Utf8, &bytes[1..]),
        0x1F if bytes.len() >= 2 => (Table::from(default), &bytes[2..]),
        0x00..=0x1F => (Table::from(default), &bytes[1..]),
        _ => (Table::from(default), bytes),
    };
    charset.decode(body)
}

enum Table {
    Iso6937,
    Iso8859(u8),
    Ucs2,
    Utf8,
    Named(&'static Encoding),
}

impl From<Charset> for Table {
    fn from(c: Charset) -> Self {
        match c {
            Charset::Iso6937 => Table::Iso6937,
            Charset::Iso8859(n) => Table::Iso8859(n),
            Charset::Utf8 => Table::Utf8,
        }
    }
}

impl Table {
    fn decode(&self, body: &[u8]) -> String {
        match self {
            Table::Iso6937 => decode_6937(body),
            Table::Iso8859(n) => {
                let filtered = single_byte_controls(body);
                let enc = iso8859(*n);
                enc.decode_without_bom_handling(&filtered).0.into_owned()
            }
            Table::Ucs2 => clean_multibyte(encoding_rs::UTF_16BE.decode_without_bom_handling(body).0),
            Table::Utf8 => clean_multibyte(String::from_utf8_lossy(body)),
            Table::Named(enc) => clean_multibyte(enc.decode_without_bom_handling(body).0),
        }
    }
}

fn iso8859(n: u8) -> &'static Encoding {
    match n {
        2 => encoding_rs::ISO_8859_2,
        3 => encoding_rs::ISO_8859_3,
        4 => encoding_rs::ISO_8859_4,
        5 => encoding_rs::ISO_8859_5,
        6 => encoding_rs::ISO_8859_6,
        7 => encoding_rs::ISO_8859_7,
        8 => encoding_rs::ISO_8859_8,
        9 => encoding_rs::WINDOWS_1254,
        10 => encoding_rs::ISO_8859_10,
        11 => encoding_rs::WINDOWS_874,
        13 => encoding_rs::ISO_8859_13,
        14 => encoding_rs::ISO_8859_14,
        15 => encoding_rs::ISO_8859_15,
        16 => encoding_rs::ISO_8859_16,
        _ => encoding_rs::WINDOWS_1252,
    }
}

/// C1 range of single-byte tables: 0x8A is a line break, the rest is dropped.
fn single_byte_controls(body: &[u8]) -> Vec<u8> {
    body.iter()
        .filter_map(|&b| match b {
            0x8A => Some(b'\n'),
            0x80..=0x9F => None,
            _ => Some(b),
        })
        .collect()
}

fn clean_multibyte(s: Cow<'_, str>) -> String {
    s.chars()
        .filter_map(|c| match c {
            CR_LF => Some('\n'),
            EMPHASIS_ON | EMPHASIS_OFF => None,
            c => Some(c),
        })
        .collect()
}

fn decode_6937(body: &[u8]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut pending_mark: Option<char> = None;
    for &b in body {
        if let Some(mark) = combining_mark(b) {
            pending_mark = Some(mark);
            continue;
        }
        let ch = match b {
            0x8A => Some('\n'),
            0x00..=0x1F | 0x7F..=0x9F => None,
            0x20..=0x7E => Some(b as char),
            _ => upper_6937(b),
        };
        if let Some(ch) = ch {
            out.push(ch);
            if let Some(mark) = pending_mark.take() {
                out.push(mark);
            }
        }
    }
    out
}

fn combining_mark(b: u8) -> Option<char> {
    Some(match b {
        0xC1 => '\u{0300}',
        0xC2 => '\u{0301}',
        0xC3 => '\u{0302}',
        0xC4 => '\u{0303}',
        0xC5 => '\u{0304}',
        0xC6 => '\u{0306}',
        0xC7 => '\u{0307}',
        0xC8 => '\u{0308}',
        0xCA => '\u{030A}',
        0xCB => '\u{0327}',
        0xCD => '\u{030B}',
        0xCE => '\u{0328}',
        0xCF => '\u{030C}',
        _ => return None,
    })
}

fn upper_6937(b: u8) -> Option<char> {
    let c = match b {
        0xA0 => '\u{00A0}',
        0xA1 => '¡',
        0xA2 => '¢',
        0xA3 => '£',
        0xA5 => '¥',
        0xA7 => '§',
        0xA8 => '¤',
        0xA9 => '‘',
        0xAA => '“',
        0xAB => '«',
        0xAC => '←',
        0xAD => '↑',
        0xAE => '→',
        0xAF => '↓',
        0xB0 => '°',
        0xB1 => '±',
        0xB2 => '²',
        0xB3 => '³',
        0xB4 => '×',
        0xB5 => 'µ',
        0xB6 => '¶',
        0xB7 => '·',
        0xB8 => '÷',
        0xB9 => '’',
        0xBA => '”',
        0xBB => '»',
        0xBC => '¼',
        0xBD => '½',
        0xBE => '¾',
        0xBF => '¿',
        0xD0 => '―',
        0xD1 => '¹',
        0xD2 => '®',
        0xD3 => '©',
        0xD4 => '™',
        0xD5 => '♪',
        0xD6 => '¬',
        0xD7 => '¦',
        0xDC => '⅛',
        0xDD => '⅜',
        0xDE => '⅝',
        0xDF => '⅞',
        0xE0 => 'Ω',
        0xE1 => 'Æ',
        0xE2 => 'Đ',
        0xE3 => 'ª',
        0xE4 => 'Ħ',
        0xE6 => 'Ĳ',
        0xE7 => 'Ŀ',
        0xE8 => 'Ł',
        0xE9 => 'Ø',
        0xEA => 'Œ',
        0xEB => 'º',
        0xEC => 'Þ',
        0xED => 'Ŧ',
        0xEE => 'Ŋ',
        0xEF => 'ŉ',
        0xF0 => 'ĸ',
        0xF1 => 'æ',
        0xF2 => 'đ',
        0xF3 => 'ð',
        0xF4 => 'ħ',
        0xF5 => 'ı',
        0xF6 => 'ĳ',
        0xF7 => 'ŀ',
        0xF8 => 'ł',
        0xF9 => 'ø',
        0xFA => 'œ',
        0xFB => 'ß',
        0xFC => 'þ',
        0xFD => 'ŧ',
        0xFE => 'ŋ',
        0xFF => '\u{00AD}',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_6937_with_controls() {
        let s = decode(b"BBC \x86One\x87\x8Aline", Charset::Iso6937);
        assert_eq!(s, "BBC One\nline");
        // acute accent precedes its base letter
        assert_eq!(decode(&[b'C', b'a', b'f', 0xC2, b'e'], Charset::Iso6937), "Cafe\u{301}");
    }

    #[test]
    fn selector_bytes_switch_tables() {
        // 0x05 -> ISO 8859-9
        assert_eq!(decode(&[0x05, 0xDD], Charset::Iso6937), "İ");
        // 0x10 0x00 0x02 -> ISO 8859-2
        assert_eq!(decode(&[0x10, 0x00, 0x02, 0xB1], Charset::Iso6937), "ą");
        // 0x15 -> UTF-8
        assert_eq!(decode("\u{15}Ünïcode".as_bytes(), Charset::Iso6937), "Ünïcode");
        // 0x11 -> UCS-2 big endian
        assert_eq!(decode(&[0x11, 0x00, 0x41, 0xE0, 0x8A, 0x00, 0x42], Charset::Iso6937), "A\nB");
    }

    #[test]
    fn configured_default_applies_without_selector() {
        assert_eq!(decode(&[0xE9], Charset::Iso8859(1)), "é");
        assert_eq!(decode(&[], Charset::Iso8859(1)), "");
    }

    #[test]
    fn charset_names() {
        assert_eq!(Charset::from_name("8859-15"), Some(Charset::Iso8859(15)));
        assert_eq!(Charset::from_name("ISO-6937"), Some(Charset::Iso6937));
        assert_eq!(Charset::from_name("utf-8"), Some(Charset::Utf8));
        assert_eq!(Charset::from_name("8859-99"), None);
    }
}
