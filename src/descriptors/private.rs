//! Descriptors in the user-defined range 0x80..0xFE.
//!
//! Their meaning depends on the private_data_specifier in force, or, for the
//! fastscan tables, on the table itself.

use serde::Serialize;

use super::{read_lang, read_len_text, DecodeEnv, DecodeFn, DescriptorContext, DescriptorKind, TableKind};
use crate::bits::BitCursor;
use crate::constants::pds;
use crate::error::DescriptorError;

type Res = Result<DescriptorKind, DescriptorError>;

pub(super) fn decoder(tag: u8, ctx: &DescriptorContext) -> Option<(&'static str, DecodeFn)> {
    let entry: (&'static str, DecodeFn) = match (ctx.private_data_specifier, tag) {
        (Some(pds::EACEM), 0x83) => ("EACEM logical_channel_descriptor", eacem_lcn),
        (Some(pds::EACEM), 0x84) => ("EACEM preferred_name_list_descriptor", preferred_name_list),
        (Some(pds::EACEM), 0x85) => ("EACEM preferred_name_identifier_descriptor", preferred_name_identifier),
        (Some(pds::EACEM), 0x86) => ("EACEM stream_identifier_descriptor", eacem_stream_identifier),
        (Some(pds::EACEM), 0x88) => ("EACEM HD_simulcast_logical_channel_descriptor", hd_simulcast_lcn),
        (Some(pds::NORDIG), 0x83) => ("NorDig logical_channel_descriptor v1", nordig_lcn_v1),
        (Some(pds::NORDIG), 0x87) => ("NorDig logical_channel_descriptor v2", nordig_lcn_v2),
        (Some(pds::BSKYB), 0xB1) => ("BSkyB logical_channel_descriptor", sky_lcn),
        (None, 0x83) if matches!(ctx.table, TableKind::FastscanNetwork | TableKind::FastscanServices) => {
            ("M7 fastscan logical_channel_descriptor", fastscan_lcn)
        }
        _ => return None,
    };
    Some(entry)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LcnFlavor {
    Eacem,
    NordigV1,
    HdSimulcast,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalChannelEntry {
    pub service_id: u16,
    pub visible: bool,
    pub logical_channel_number: u16,
    /// Resolved from the SDT when the enclosing transport stream is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalChannelDescriptor {
    pub flavor: LcnFlavor,
    pub entries: Vec<LogicalChannelEntry>,
}

fn resolve_name(env: &DecodeEnv<'_>, service_id: u16) -> Option<String> {
    let (onid, tsid) = match env.origin {
        Some((onid, tsid)) => (Some(onid), Some(tsid)),
        None => (None, None),
    };
    env.tables.service_name(onid, tsid, service_id)
}

/// Fills entries whose service name was unknown when the descriptor was decoded.
pub fn fill_service_names(kind: &mut DescriptorKind, mut lookup: impl FnMut(u16) -> Option<String>) {
    let lists: Vec<&mut Vec<LogicalChannelEntry>> = match kind {
        DescriptorKind::LogicalChannel(l) | DescriptorKind::HdSimulcastLogicalChannel(l) => vec![&mut l.entries],
        DescriptorKind::NordigLogicalChannelV2(l) => l.lists.iter_mut().map(|list| &mut list.entries).collect(),
        _ => return,
    };
    for entry in lists.into_iter().flatten() {
        if entry.service_name.is_none() {
            entry.service_name = lookup(entry.service_id);
        }
    }
}

fn lcn_entries(data: &[u8], env: &DecodeEnv<'_>, lcn_bits: u32) -> Result<Vec<LogicalChannelEntry>, DescriptorError> {
    if data.len() % 4 != 0 {
        return Err(DescriptorError::invalid("logical_channel", format!("length {} not a multiple of 4", data.len())));
    }
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        let service_id = r.read_u16()?;
        let visible = r.read_bool()?;
        r.skip((15 - lcn_bits) as u64)?;
        let logical_channel_number = r.read(lcn_bits)? as u16;
        entries.push(LogicalChannelEntry {
            service_id,
            visible,
            logical_channel_number,
            service_name: resolve_name(env, service_id),
        });
    }
    Ok(entries)
}

fn eacem_lcn(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::LogicalChannel(LogicalChannelDescriptor {
        flavor: LcnFlavor::Eacem,
        entries: lcn_entries(data, env, 10)?,
    }))
}

fn hd_simulcast_lcn(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::HdSimulcastLogicalChannel(LogicalChannelDescriptor {
        flavor: LcnFlavor::HdSimulcast,
        entries: lcn_entries(data, env, 10)?,
    }))
}

fn nordig_lcn_v1(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::LogicalChannel(LogicalChannelDescriptor {
        flavor: LcnFlavor::NordigV1,
        entries: lcn_entries(data, env, 14)?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NordigChannelList {
    pub channel_list_id: u8,
    pub channel_list_name: String,
    pub country_code: String,
    pub entries: Vec<LogicalChannelEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NordigLogicalChannelV2Descriptor {
    pub lists: Vec<NordigChannelList>,
}

fn nordig_lcn_v2(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let mut lists = Vec::new();
    while !r.is_empty() {
        let channel_list_id = r.read_u8()?;
        let channel_list_name = read_len_text(&mut r, env)?;
        let country_code = read_lang(&mut r)?;
        let len = r.read_u8()? as usize;
        let entries = lcn_entries(r.read_bytes(len)?, env, 10)?;
        lists.push(NordigChannelList {
            channel_list_id,
            channel_list_name,
            country_code,
            entries,
        });
    }
    Ok(DescriptorKind::NordigLogicalChannelV2(NordigLogicalChannelV2Descriptor { lists }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferredName {
    pub name_id: u8,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferredNameLanguage {
    pub language: String,
    pub names: Vec<PreferredName>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferredNameListDescriptor {
    pub languages: Vec<PreferredNameLanguage>,
}

fn preferred_name_list(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let mut languages = Vec::new();
    while !r.is_empty() {
        let language = read_lang(&mut r)?;
        let count = r.read_u8()?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            names.push(PreferredName {
                name_id: r.read_u8()?,
                name: read_len_text(&mut r, env)?,
            });
        }
        languages.push(PreferredNameLanguage { language, names });
    }
    Ok(DescriptorKind::PreferredNameList(PreferredNameListDescriptor { languages }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferredNameIdentifierDescriptor {
    pub name_id: u8,
}

fn preferred_name_identifier(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::PreferredNameIdentifier(PreferredNameIdentifierDescriptor {
        name_id: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EacemStreamIdentifierDescriptor {
    pub version_byte: u8,
}

fn eacem_stream_identifier(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::EacemStreamIdentifier(EacemStreamIdentifierDescriptor {
        version_byte: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkyChannel {
    pub service_id: u16,
    pub service_type: u8,
    pub channel_id: u16,
    pub logical_channel_number: u16,
    pub sky_id: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkyLogicalChannelDescriptor {
    pub region_id: u16,
    pub channels: Vec<SkyChannel>,
}

fn sky_lcn(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() < 2 || (data.len() - 2) % 9 != 0 {
        return Err(DescriptorError::invalid("BSkyB LCN", format!("length {} is not 2 + 9n", data.len())));
    }
    let mut r = BitCursor::new(data);
    let region_id = r.read_u16()?;
    let mut channels = Vec::new();
    while !r.is_empty() {
        channels.push(SkyChannel {
            service_id: r.read_u16()?,
            service_type: r.read_u8()?,
            channel_id: r.read_u16()?,
            logical_channel_number: r.read_u16()?,
            sky_id: r.read_u16()?,
        });
    }
    Ok(DescriptorKind::SkyLogicalChannel(SkyLogicalChannelDescriptor { region_id, channels }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FastscanChannel {
    pub service_id: u16,
    pub hidden: bool,
    pub logical_channel_number: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FastscanLogicalChannelDescriptor {
    pub channels: Vec<FastscanChannel>,
}

fn fastscan_lcn(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() % 4 != 0 {
        return Err(DescriptorError::invalid("fastscan LCN", format!("length {} not a multiple of 4", data.len())));
    }
    let mut r = BitCursor::new(data);
    let mut channels = Vec::new();
    while !r.is_empty() {
        let service_id = r.read_u16()?;
        let hidden = r.read_bool()?;
        r.skip(1)?;
        channels.push(FastscanChannel {
            service_id,
            hidden,
            logical_channel_number: r.read(14)? as u16,
        });
    }
    Ok(DescriptorKind::FastscanLogicalChannel(FastscanLogicalChannelDescriptor { channels }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{decode_descriptor, Charset};
    use crate::psi::store::TableView;
    use bytes::Bytes;

    struct OneService;

    impl TableView for OneService {
        fn service_name(&self, onid: Option<u16>, tsid: Option<u16>, service_id: u16) -> Option<String> {
            (onid == Some(1) && tsid == Some(2) && service_id == 0x10).then(|| "One".to_string())
        }

        fn logical_channel_number(&self, _: u16) -> Option<u16> {
            None
        }
    }

    #[test]
    fn test_nordig_v1_uses_fourteen_bits() {
        let env = DecodeEnv::new(TableKind::Nit, &OneService, Charset::default(), Some(pds::NORDIG)).with_origin(1, 2);
        let d = decode_descriptor(Bytes::from_static(&[0x83, 0x04, 0x00, 0x10, 0xC4, 0x00]), &env);
        match d.kind {
            DescriptorKind::LogicalChannel(l) => {
                assert_eq!(l.flavor, LcnFlavor::NordigV1);
                assert_eq!(l.entries[0].logical_channel_number, 0x0400);
                assert!(l.entries[0].visible);
                assert_eq!(l.entries[0].service_name.as_deref(), Some("One"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_eacem_lcn_masks_to_ten_bits() {
        let env = DecodeEnv::new(TableKind::Nit, &OneService, Charset::default(), Some(pds::EACEM));
        let d = decode_descriptor(Bytes::from_static(&[0x83, 0x04, 0x00, 0x10, 0xC4, 0x00]), &env);
        match d.kind {
            DescriptorKind::LogicalChannel(l) => {
                assert_eq!(l.entries[0].logical_channel_number, 0);
                assert_eq!(l.entries[0].service_name, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fastscan_context_without_specifier() {
        let env = DecodeEnv::new(TableKind::FastscanServices, &OneService, Charset::default(), None);
        let d = decode_descriptor(Bytes::from_static(&[0x83, 0x04, 0x00, 0x10, 0x80, 0x65]), &env);
        match d.kind {
            DescriptorKind::FastscanLogicalChannel(f) => {
                assert!(f.channels[0].hidden);
                assert_eq!(f.channels[0].logical_channel_number, 101);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sky_lcn_length_check() {
        let env = DecodeEnv::new(TableKind::Bat, &OneService, Charset::default(), Some(pds::BSKYB));
        let d = decode_descriptor(Bytes::from_static(&[0xB1, 0x03, 0x00, 0x01, 0x02]), &env);
        assert!(d.is_raw());
        assert!(d.error.is_some());
    }
}
