//! NIT (0x40/0x41), BAT (0x4A) and the fastscan network table (0xBC), which
//! all share the network-descriptors + transport-stream-loop layout.

use serde::Serialize;

use super::{require_long, DecodeContext, PsiSection};
use crate::bits::BitCursor;
use crate::descriptors::{decode_loop, loop_slice, Descriptor, DescriptorKind, TableKind};
use crate::error::SectionError;

#[derive(Debug, Clone, Serialize)]
pub struct NitSection {
    /// network_id, bouquet_id or operator_network_id depending on the table.
    pub id: u16,
    pub descriptors: Vec<Descriptor>,
    pub transport_streams: Vec<TransportStreamEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransportStreamEntry {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub descriptors: Vec<Descriptor>,
}

impl NitSection {
    /// network_name or bouquet_name descriptor text.
    pub fn name(&self) -> Option<&str> {
        self.descriptors.iter().find_map(|d| match &d.kind {
            DescriptorKind::NetworkName(n) | DescriptorKind::BouquetName(n) => Some(n.name.as_str()),
            _ => None,
        })
    }
}

pub fn parse_nit(section: &PsiSection, ctx: &DecodeContext<'_>, kind: TableKind) -> Result<NitSection, SectionError> {
    require_long(section)?;
    let body = section.body();
    let env = ctx.env(kind);
    let mut r = BitCursor::new(&body);

    r.skip(4)?;
    let net_len = r.read(12)? as usize;
    let descriptors = decode_loop(&loop_slice(&body, 2, net_len)?, &env);
    r.skip(net_len as u64 * 8)?;

    r.skip(4)?;
    let ts_loop_len = r.read(12)? as usize;
    let loop_end = 4 + net_len + ts_loop_len;
    if loop_end > body.len() {
        return Err(SectionError::Malformed(format!(
            "transport_stream_loop_length {} overruns section",
            ts_loop_len
        )));
    }

    let mut transport_streams = Vec::new();
    while (r.position() / 8) < loop_end as u64 {
        let transport_stream_id = r.read_u16()?;
        let original_network_id = r.read_u16()?;
        r.skip(4)?;
        let len = r.read(12)? as usize;
        let offset = (r.position() / 8) as usize;
        let ts_env = env.with_origin(original_network_id, transport_stream_id);
        let descriptors = decode_loop(&loop_slice(&body, offset, len)?, &ts_env);
        r.skip(len as u64 * 8)?;
        transport_streams.push(TransportStreamEntry {
            transport_stream_id,
            original_network_id,
            descriptors,
        });
    }

    Ok(NitSection {
        id: section.table_id_extension,
        descriptors,
        transport_streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::section::tests::long_section;
    use crate::psi::NoTables;
    use bytes::Bytes;

    #[test]
    fn test_parse_nit_with_pds_scoped_lcn() {
        let body = [
            0xF0, 0x05, 0x40, 0x03, b'N', b'e', b't', // network name
            0xF0, 0x14, // ts loop length 20
            0x00, 0x01, 0x22, 0xD5, 0xF0, 0x0E, // tsid 1, onid 0x22D5, 14 bytes
            0x5F, 0x04, 0x00, 0x00, 0x00, 0x29, // NorDig
            0x83, 0x04, 0x00, 0x0A, 0x80, 0x01, // service 10 -> LCN 1
            0x41, 0x00,
        ];
        let raw = long_section(0x40, 0x3001, 2, 0, 0, &body);
        let section = PsiSection::parse(Bytes::from(raw), 0x10, 0).unwrap();
        let nit = parse_nit(&section, &DecodeContext::new(&NoTables), TableKind::Nit).unwrap();
        assert_eq!(nit.id, 0x3001);
        assert_eq!(nit.name(), Some("Net"));
        let ts = &nit.transport_streams[0];
        assert_eq!(ts.original_network_id, 0x22D5);
        match &ts.descriptors[1].kind {
            DescriptorKind::LogicalChannel(l) => assert_eq!(l.entries[0].logical_channel_number, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ts.descriptors.len(), 3);
    }
}
