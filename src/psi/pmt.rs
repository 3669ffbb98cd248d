use serde::Serialize;

use super::{require_long, DecodeContext, PsiSection};
use crate::bits::BitCursor;
use crate::descriptors::{decode_loop, loop_slice, Descriptor, DescriptorKind, TableKind};
use crate::error::SectionError;

/// ─────────── PMT ───────────
#[derive(Debug, Clone, Serialize)]
pub struct PmtSection {
    pub program_number: u16,
    pub pcr_pid: u16,
    pub descriptors: Vec<Descriptor>,
    pub streams: Vec<EsInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EsInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

impl EsInfo {
    pub fn descriptor(&self, pred: impl Fn(&DescriptorKind) -> bool) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| pred(&d.kind))
    }

    pub fn has_tag(&self, tag: u8) -> bool {
        self.descriptors.iter().any(|d| d.tag == tag)
    }

    /// ISO 639 code from the language, subtitling or teletext descriptor.
    pub fn language(&self) -> Option<&str> {
        self.descriptors.iter().find_map(|d| match &d.kind {
            DescriptorKind::Iso639Language(l) => l.entries.first().map(|e| e.language.as_str()),
            DescriptorKind::Subtitling(s) => s.entries.first().map(|e| e.language.as_str()),
            DescriptorKind::Teletext(t) | DescriptorKind::VbiTeletext(t) => {
                t.entries.first().map(|e| e.language.as_str())
            }
            _ => None,
        })
    }
}

/// Human-readable stream_type (ISO/IEC 13818-1 table 2-34, common values).
pub fn stream_type_name(stream_type: u8) -> &'static str {
    match stream_type {
        0x01 => "MPEG-1 video",
        0x02 => "MPEG-2 video",
        0x03 => "MPEG-1 audio",
        0x04 => "MPEG-2 audio",
        0x05 => "private sections",
        0x06 => "PES private data",
        0x0B => "DSM-CC U-N messages",
        0x0D => "DSM-CC sections",
        0x0F => "AAC ADTS audio",
        0x10 => "MPEG-4 visual",
        0x11 => "AAC LATM audio",
        0x15 => "metadata in PES",
        0x1B => "H.264 video",
        0x24 => "H.265 video",
        0x81 => "AC-3 audio",
        0x86 => "SCTE-35 splice info",
        0x87 => "E-AC-3 audio",
        0x80..=0xFF => "user private",
        _ => "reserved",
    }
}

pub fn parse_pmt(section: &PsiSection, ctx: &DecodeContext<'_>) -> Result<PmtSection, SectionError> {
    require_long(section)?;
    let body = section.body();
    let mut r = BitCursor::new(&body);
    let env = ctx.env(TableKind::Pmt);

    /* ── fixed header inside the body ── */
    r.skip(3)?;
    let pcr_pid = r.read(13)? as u16;
    r.skip(4)?;
    let info_len = r.read(12)? as usize;
    let descriptors = decode_loop(&loop_slice(&body, 4, info_len)?, &env);
    r.skip(info_len as u64 * 8)?;

    /* ── ES loop ── */
    let mut streams = Vec::new();
    while !r.is_empty() {
        let stream_type = r.read_u8()?;
        r.skip(3)?;
        let elementary_pid = r.read(13)? as u16;
        r.skip(4)?;
        let es_len = r.read(12)? as usize;
        let offset = (r.position() / 8) as usize;
        let descriptors = decode_loop(&loop_slice(&body, offset, es_len)?, &env);
        r.skip(es_len as u64 * 8)?;
        streams.push(EsInfo {
            stream_type,
            elementary_pid,
            descriptors,
        });
    }

    Ok(PmtSection {
        program_number: section.table_id_extension,
        pcr_pid,
        descriptors,
        streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::section::tests::long_section;
    use crate::psi::NoTables;
    use bytes::Bytes;

    #[test]
    fn test_parse_pmt_streams_and_descriptors() {
        let body = [
            0xE1, 0x00, // PCR PID 0x100
            0xF0, 0x06, 0x09, 0x04, 0x0B, 0x00, 0xE1, 0x23, // CA descriptor
            0x1B, 0xE1, 0x00, 0xF0, 0x00, // H.264, no descriptors
            0x06, 0xE1, 0x01, 0xF0, 0x0A, 0x59, 0x08, b'e', b'n', b'g', 0x10, 0x00, 0x01, 0x00, 0x01,
        ];
        let raw = long_section(0x02, 7, 1, 0, 0, &body);
        let section = PsiSection::parse(Bytes::from(raw), 0x1000, 0).unwrap();
        let pmt = parse_pmt(&section, &DecodeContext::new(&NoTables)).unwrap();
        assert_eq!(pmt.program_number, 7);
        assert_eq!(pmt.pcr_pid, 0x100);
        assert_eq!(pmt.descriptors.len(), 1);
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[0].stream_type, 0x1B);
        assert_eq!(stream_type_name(pmt.streams[0].stream_type), "H.264 video");
        assert_eq!(pmt.streams[1].elementary_pid, 0x101);
        assert!(pmt.streams[1].has_tag(0x59));
        assert_eq!(pmt.streams[1].language(), Some("eng"));
    }

    #[test]
    fn test_es_info_length_past_end_is_malformed() {
        let body = [0xE1, 0x00, 0xF0, 0x00, 0x1B, 0xE1, 0x00, 0xF0, 0x20];
        let raw = long_section(0x02, 7, 1, 0, 0, &body);
        let section = PsiSection::parse(Bytes::from(raw), 0x1000, 0).unwrap();
        assert!(matches!(
            parse_pmt(&section, &DecodeContext::new(&NoTables)),
            Err(SectionError::Malformed(_))
        ));
    }
}
