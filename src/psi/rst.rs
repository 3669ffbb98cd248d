//! Running status (0x71) and discontinuity information (0x7E) tables. Both
//! are short-form sections.

use serde::Serialize;

use super::PsiSection;
use crate::bits::BitCursor;
use crate::error::SectionError;

#[derive(Debug, Clone, Serialize)]
pub struct RstSection {
    pub entries: Vec<RstEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RstEntry {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub service_id: u16,
    pub event_id: u16,
    pub running_status: u8,
}

pub fn parse_rst(section: &PsiSection) -> Result<RstSection, SectionError> {
    let body = section.body();
    if body.len() % 9 != 0 {
        return Err(SectionError::Malformed(format!("RST body of {} bytes", body.len())));
    }
    let mut r = BitCursor::new(&body);
    let mut entries = Vec::with_capacity(body.len() / 9);
    while !r.is_empty() {
        let transport_stream_id = r.read_u16()?;
        let original_network_id = r.read_u16()?;
        let service_id = r.read_u16()?;
        let event_id = r.read_u16()?;
        r.skip(5)?;
        let running_status = r.read(3)? as u8;
        entries.push(RstEntry {
            transport_stream_id,
            original_network_id,
            service_id,
            event_id,
            running_status,
        });
    }
    Ok(RstSection { entries })
}

#[derive(Debug, Clone, Serialize)]
pub struct DitSection {
    pub transition: bool,
}

pub fn parse_dit(section: &PsiSection) -> Result<DitSection, SectionError> {
    let body = section.body();
    let mut r = BitCursor::new(&body);
    Ok(DitSection {
        transition: r.read_bool()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn short(tid: u8, body: &[u8]) -> PsiSection {
        let mut raw = vec![tid, 0x70 | (body.len() >> 8) as u8, body.len() as u8];
        raw.extend_from_slice(body);
        PsiSection::parse(Bytes::from(raw), 0x13, 0).unwrap()
    }

    #[test]
    fn test_parse_rst_entries() {
        let s = short(0x71, &[0, 1, 0, 2, 0, 3, 0, 4, 0xFC]);
        let rst = parse_rst(&s).unwrap();
        assert_eq!(rst.entries.len(), 1);
        assert_eq!(rst.entries[0].service_id, 3);
        assert_eq!(rst.entries[0].running_status, 4);
    }

    #[test]
    fn test_rst_partial_entry_is_malformed() {
        let s = short(0x71, &[0, 1, 0, 2]);
        assert!(matches!(parse_rst(&s), Err(SectionError::Malformed(_))));
    }

    #[test]
    fn test_parse_dit() {
        assert!(parse_dit(&short(0x7E, &[0x80])).unwrap().transition);
        assert!(parse_dit(&short(0x7E, &[])).is_err());
    }
}
