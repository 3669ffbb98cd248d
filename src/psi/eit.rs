//! EIT present/following (0x4E/0x4F) and schedule (0x50..0x6F).

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::tdt::{decode_bcd_duration, read_utc};
use super::{require_long, DecodeContext, PsiSection};
use crate::bits::BitCursor;
use crate::descriptors::{decode_loop, loop_slice, Descriptor, DescriptorKind, TableKind};
use crate::error::SectionError;

#[derive(Debug, Clone, Serialize)]
pub struct EitSection {
    pub service_id: u16,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub segment_last_section_number: u8,
    pub last_table_id: u8,
    pub events: Vec<EitEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EitEvent {
    pub event_id: u16,
    pub start_time: Option<DateTime<Utc>>,
    /// Seconds.
    pub duration: u32,
    pub running_status: u8,
    pub free_ca_mode: bool,
    pub descriptors: Vec<Descriptor>,
}

impl EitEvent {
    /// Event name from the first short_event descriptor.
    pub fn title(&self) -> Option<&str> {
        self.descriptors.iter().find_map(|d| match &d.kind {
            DescriptorKind::ShortEvent(e) => Some(e.event_name.as_str()),
            _ => None,
        })
    }
}

pub fn parse_eit(section: &PsiSection, ctx: &DecodeContext<'_>) -> Result<EitSection, SectionError> {
    require_long(section)?;
    let body = section.body();
    let mut r = BitCursor::new(&body);
    let transport_stream_id = r.read_u16()?;
    let original_network_id = r.read_u16()?;
    let segment_last_section_number = r.read_u8()?;
    let last_table_id = r.read_u8()?;

    let env = ctx
        .env(TableKind::Eit)
        .with_origin(original_network_id, transport_stream_id);
    let mut events = Vec::new();
    while !r.is_empty() {
        let event_id = r.read_u16()?;
        let start_time = read_utc(&mut r)?;
        let duration = decode_bcd_duration(r.read_u24()?);
        let running_status = r.read(3)? as u8;
        let free_ca_mode = r.read_bool()?;
        let len = r.read(12)? as usize;
        let offset = (r.position() / 8) as usize;
        let descriptors = decode_loop(&loop_slice(&body, offset, len)?, &env);
        r.skip(len as u64 * 8)?;
        events.push(EitEvent {
            event_id,
            start_time,
            duration,
            running_status,
            free_ca_mode,
            descriptors,
        });
    }

    Ok(EitSection {
        service_id: section.table_id_extension,
        transport_stream_id,
        original_network_id,
        segment_last_section_number,
        last_table_id,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::section::tests::long_section;
    use crate::psi::NoTables;
    use bytes::Bytes;
    use chrono::Timelike;

    #[test]
    fn test_parse_eit_event() {
        let body = [
            0x00, 0x05, 0x00, 0x01, 0x00, 0x4E, // tsid 5, onid 1, segment_last 0, last tid
            0x12, 0x34, 0xC0, 0x79, 0x12, 0x45, 0x00, 0x01, 0x30, 0x00, // id, start, 1h30
            0x80, 0x0B, // running, 11 bytes
            0x4D, 0x09, b'e', b'n', b'g', 0x04, b'N', b'e', b'w', b's', 0x00,
        ];
        let raw = long_section(0x4E, 0x000A, 3, 0, 1, &body);
        let section = PsiSection::parse(Bytes::from(raw), 0x12, 0).unwrap();
        let eit = parse_eit(&section, &DecodeContext::new(&NoTables)).unwrap();
        assert_eq!(eit.service_id, 10);
        assert_eq!(eit.transport_stream_id, 5);
        let event = &eit.events[0];
        assert_eq!(event.event_id, 0x1234);
        assert_eq!(event.duration, 5400);
        assert_eq!(event.running_status, 4);
        assert_eq!(event.start_time.map(|t| t.hour()), Some(12));
        assert_eq!(event.title(), Some("News"));
    }
}
