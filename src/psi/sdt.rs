use serde::Serialize;

use super::{require_long, DecodeContext, PsiSection};
use crate::bits::BitCursor;
use crate::descriptors::{decode_loop, loop_slice, Descriptor, DescriptorKind, TableKind};
use crate::error::SectionError;

/// ─────────── SDT ───────────
#[derive(Debug, Clone, Serialize)]
pub struct SdtSection {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub services: Vec<SdtService>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SdtService {
    pub service_id: u16,
    pub eit_schedule: bool,
    pub eit_present_following: bool,
    pub running_status: u8,
    pub free_ca_mode: bool,
    pub descriptors: Vec<Descriptor>,
}

impl SdtService {
    /// (provider, name, service_type) from the service descriptor.
    pub fn identity(&self) -> Option<(&str, &str, u8)> {
        self.descriptors.iter().find_map(|d| match &d.kind {
            DescriptorKind::Service(s) => Some((s.provider_name.as_str(), s.service_name.as_str(), s.service_type)),
            _ => None,
        })
    }
}

pub fn running_status_name(status: u8) -> &'static str {
    match status {
        0 => "undefined",
        1 => "not running",
        2 => "starts in a few seconds",
        3 => "pausing",
        4 => "running",
        5 => "service off-air",
        _ => "reserved",
    }
}

pub fn parse_sdt(section: &PsiSection, ctx: &DecodeContext<'_>) -> Result<SdtSection, SectionError> {
    require_long(section)?;
    let body = section.body();
    let mut r = BitCursor::new(&body);
    let original_network_id = r.read_u16()?;
    r.skip(8)?;

    let env = ctx
        .env(TableKind::Sdt)
        .with_origin(original_network_id, section.table_id_extension);
    let mut services = Vec::new();
    while !r.is_empty() {
        let service_id = r.read_u16()?;
        r.skip(6)?;
        let eit_schedule = r.read_bool()?;
        let eit_present_following = r.read_bool()?;
        let running_status = r.read(3)? as u8;
        let free_ca_mode = r.read_bool()?;
        let len = r.read(12)? as usize;
        let offset = (r.position() / 8) as usize;
        let descriptors = decode_loop(&loop_slice(&body, offset, len)?, &env);
        r.skip(len as u64 * 8)?;
        services.push(SdtService {
            service_id,
            eit_schedule,
            eit_present_following,
            running_status,
            free_ca_mode,
            descriptors,
        });
    }

    Ok(SdtSection {
        transport_stream_id: section.table_id_extension,
        original_network_id,
        services,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::section::tests::long_section;
    use crate::psi::NoTables;
    use bytes::Bytes;

    #[test]
    fn test_parse_sdt_service() {
        let body = [
            0x00, 0x01, 0xFF, // onid 1
            0x00, 0x0A, 0xFF, 0x80, 0x0B, // sid 10, schedule+pf, running, 11 bytes
            0x48, 0x09, 0x01, 0x03, b'P', b'r', b'v', 0x03, b'O', b'n', b'e',
        ];
        let raw = long_section(0x42, 0x0005, 0, 0, 0, &body);
        let section = PsiSection::parse(Bytes::from(raw), 0x11, 0).unwrap();
        let sdt = parse_sdt(&section, &DecodeContext::new(&NoTables)).unwrap();
        assert_eq!(sdt.transport_stream_id, 5);
        assert_eq!(sdt.original_network_id, 1);
        let svc = &sdt.services[0];
        assert!(svc.eit_schedule && svc.eit_present_following);
        assert_eq!(running_status_name(svc.running_status), "running");
        assert!(!svc.free_ca_mode);
        assert_eq!(svc.identity(), Some(("Prv", "One", 1)));
    }
}
