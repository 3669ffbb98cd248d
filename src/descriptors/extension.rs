//! DVB extension descriptors (tag 0x7F), dispatched on descriptor_tag_extension.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{as_hex, read_lang, read_len_text, DecodeEnv, DescriptorKind};
use crate::bits::{bcd, BitCursor};
use crate::error::DescriptorError;
use crate::psi::tdt::decode_mjd_utc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionDescriptor {
    pub tag_extension: u8,
    pub name: &'static str,
    pub kind: ExtensionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExtensionKind {
    T2Delivery(T2DeliveryDescriptor),
    SupplementaryAudio(SupplementaryAudioDescriptor),
    NetworkChangeNotify(NetworkChangeNotifyDescriptor),
    Message(MessageDescriptor),
    TargetRegion(TargetRegionDescriptor),
    TargetRegionName(TargetRegionNameDescriptor),
    ServiceRelocated(ServiceRelocatedDescriptor),
    C2Delivery(C2DeliveryDescriptor),
    T2mi(T2miDescriptor),
    UriLinkage(UriLinkageDescriptor),
    Ac4(Ac4Descriptor),
    TtmlSubtitling(TtmlSubtitlingDescriptor),
    Unknown {
        #[serde(serialize_with = "as_hex")]
        bytes: Vec<u8>,
    },
}

pub fn extension_name(tag: u8) -> &'static str {
    match tag {
        0x00 => "image_icon_descriptor",
        0x01 => "cpcm_delivery_signalling_descriptor",
        0x02 => "CP_descriptor",
        0x03 => "CP_identifier_descriptor",
        0x04 => "T2_delivery_system_descriptor",
        0x05 => "SH_delivery_system_descriptor",
        0x06 => "supplementary_audio_descriptor",
        0x07 => "network_change_notify_descriptor",
        0x08 => "message_descriptor",
        0x09 => "target_region_descriptor",
        0x0A => "target_region_name_descriptor",
        0x0B => "service_relocated_descriptor",
        0x0C => "XAIT_PID_descriptor",
        0x0D => "C2_delivery_system_descriptor",
        0x0E => "DTS-HD_audio_stream_descriptor",
        0x0F => "DTS_Neural_descriptor",
        0x10 => "video_depth_range_descriptor",
        0x11 => "T2MI_descriptor",
        0x13 => "URI_linkage_descriptor",
        0x14 => "CI_ancillary_data_descriptor",
        0x15 => "AC-4_descriptor",
        0x16 => "C2_bundle_delivery_system_descriptor",
        0x17 => "S2X_satellite_delivery_system_descriptor",
        0x18 => "protection_message_descriptor",
        0x19 => "audio_preselection_descriptor",
        0x20 => "TTML_subtitling_descriptor",
        _ => "reserved",
    }
}

type ExtFn = fn(&mut BitCursor<'_>, &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError>;

fn extension_decoder(tag: u8) -> Option<ExtFn> {
    Some(match tag {
        0x04 => t2_delivery,
        0x06 => supplementary_audio,
        0x07 => network_change_notify,
        0x08 => message,
        0x09 => target_region,
        0x0A => target_region_name,
        0x0B => service_relocated,
        0x0D => c2_delivery,
        0x11 => t2mi,
        0x13 => uri_linkage,
        0x15 => ac4,
        0x20 => ttml_subtitling,
        _ => return None,
    })
}

pub(super) fn decode(data: &[u8], env: &DecodeEnv<'_>) -> Result<DescriptorKind, DescriptorError> {
    let mut r = BitCursor::new(data);
    let tag_extension = r.read_u8()?;
    let kind = match extension_decoder(tag_extension) {
        Some(f) => f(&mut r, env)?,
        None => ExtensionKind::Unknown {
            bytes: r.rest()?.to_vec(),
        },
    };
    Ok(DescriptorKind::Extension(ExtensionDescriptor {
        tag_extension,
        name: extension_name(tag_extension),
        kind,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct T2Cell {
    pub cell_id: u16,
    pub frequencies_hz: Vec<u64>,
    pub transposers: Vec<(u8, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct T2DeliveryDescriptor {
    pub plp_id: u8,
    pub t2_system_id: u16,
    pub siso_miso: Option<u8>,
    pub bandwidth: Option<u8>,
    pub guard_interval: Option<u8>,
    pub transmission_mode: Option<u8>,
    pub other_frequency: bool,
    pub tfs: bool,
    pub cells: Vec<T2Cell>,
}

fn t2_delivery(r: &mut BitCursor<'_>, _: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    let plp_id = r.read_u8()?;
    let t2_system_id = r.read_u16()?;
    let mut d = T2DeliveryDescriptor {
        plp_id,
        t2_system_id,
        siso_miso: None,
        bandwidth: None,
        guard_interval: None,
        transmission_mode: None,
        other_frequency: false,
        tfs: false,
        cells: Vec::new(),
    };
    if r.is_empty() {
        return Ok(ExtensionKind::T2Delivery(d));
    }
    d.siso_miso = Some(r.read(2)? as u8);
    d.bandwidth = Some(r.read(4)? as u8);
    r.skip(2)?;
    d.guard_interval = Some(r.read(3)? as u8);
    d.transmission_mode = Some(r.read(3)? as u8);
    d.other_frequency = r.read_bool()?;
    d.tfs = r.read_bool()?;
    while !r.is_empty() {
        let cell_id = r.read_u16()?;
        let mut frequencies_hz = Vec::new();
        if d.tfs {
            let n = r.read_u8()? as usize / 4;
            for _ in 0..n {
                frequencies_hz.push(r.read_u32()? as u64 * 10);
            }
        } else {
            frequencies_hz.push(r.read_u32()? as u64 * 10);
        }
        let n = r.read_u8()? as usize / 5;
        let mut transposers = Vec::with_capacity(n);
        for _ in 0..n {
            transposers.push((r.read_u8()?, r.read_u32()? as u64 * 10));
        }
        d.cells.push(T2Cell {
            cell_id,
            frequencies_hz,
            transposers,
        });
    }
    Ok(ExtensionKind::T2Delivery(d))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplementaryAudioDescriptor {
    pub mix_type: u8,
    pub editorial_classification: u8,
    pub language: Option<String>,
    #[serde(serialize_with = "as_hex")]
    pub private_data: Vec<u8>,
}

fn supplementary_audio(r: &mut BitCursor<'_>, _: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    let mix_type = r.read(1)? as u8;
    let editorial_classification = r.read(5)? as u8;
    r.skip(1)?;
    let has_lang = r.read_bool()?;
    let language = if has_lang { Some(read_lang(r)?) } else { None };
    Ok(ExtensionKind::SupplementaryAudio(SupplementaryAudioDescriptor {
        mix_type,
        editorial_classification,
        language,
        private_data: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkChange {
    pub network_change_id: u8,
    pub network_change_version: u8,
    pub start_time_of_change: Option<DateTime<Utc>>,
    /// seconds
    pub change_duration: u32,
    pub receiver_category: u8,
    pub change_type: u8,
    pub message_id: u8,
    pub invariant_ts: Option<(u16, u16)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkChangeCell {
    pub cell_id: u16,
    pub changes: Vec<NetworkChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkChangeNotifyDescriptor {
    pub cells: Vec<NetworkChangeCell>,
}

fn network_change_notify(r: &mut BitCursor<'_>, _: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    let mut cells = Vec::new();
    while !r.is_empty() {
        let cell_id = r.read_u16()?;
        let len = r.read_u8()? as usize;
        let mut lr = BitCursor::new(r.read_bytes(len)?);
        let mut changes = Vec::new();
        while !lr.is_empty() {
            let network_change_id = lr.read_u8()?;
            let network_change_version = lr.read_u8()?;
            let mjd = lr.read_u16()?;
            let hms = lr.read_u24()?;
            let dur = bcd(lr.read_u24()? as u64, 6);
            let receiver_category = lr.read(3)? as u8;
            let invariant_present = lr.read_bool()?;
            let change_type = lr.read(4)? as u8;
            let message_id = lr.read_u8()?;
            let invariant_ts = if invariant_present {
                Some((lr.read_u16()?, lr.read_u16()?))
            } else {
                None
            };
            changes.push(NetworkChange {
                network_change_id,
                network_change_version,
                start_time_of_change: decode_mjd_utc(mjd, hms),
                change_duration: (dur / 10000 * 3600 + (dur / 100 % 100) * 60 + dur % 100) as u32,
                receiver_category,
                change_type,
                message_id,
                invariant_ts,
            });
        }
        cells.push(NetworkChangeCell { cell_id, changes });
    }
    Ok(ExtensionKind::NetworkChangeNotify(NetworkChangeNotifyDescriptor { cells }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageDescriptor {
    pub message_id: u8,
    pub language: String,
    pub text: String,
}

fn message(r: &mut BitCursor<'_>, env: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    let message_id = r.read_u8()?;
    let language = read_lang(r)?;
    let text = env.text(r.rest()?);
    Ok(ExtensionKind::Message(MessageDescriptor {
        message_id,
        language,
        text,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetRegion {
    pub country_code: Option<String>,
    pub primary: Option<u8>,
    pub secondary: Option<u8>,
    pub tertiary: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetRegionDescriptor {
    pub country_code: String,
    pub regions: Vec<TargetRegion>,
}

fn region_codes(r: &mut BitCursor<'_>, depth: u8) -> Result<(Option<u8>, Option<u8>, Option<u16>), DescriptorError> {
    let primary = if depth >= 1 { Some(r.read_u8()?) } else { None };
    let secondary = if depth >= 2 { Some(r.read_u8()?) } else { None };
    let tertiary = if depth >= 3 { Some(r.read_u16()?) } else { None };
    Ok((primary, secondary, tertiary))
}

fn target_region(r: &mut BitCursor<'_>, _: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    let country_code = read_lang(r)?;
    let mut regions = Vec::new();
    while !r.is_empty() {
        r.skip(5)?;
        let has_country = r.read_bool()?;
        let depth = r.read(2)? as u8;
        let country = if has_country { Some(read_lang(r)?) } else { None };
        let (primary, secondary, tertiary) = region_codes(r, depth)?;
        regions.push(TargetRegion {
            country_code: country,
            primary,
            secondary,
            tertiary,
        });
    }
    Ok(ExtensionKind::TargetRegion(TargetRegionDescriptor { country_code, regions }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionName {
    pub name: String,
    pub primary: Option<u8>,
    pub secondary: Option<u8>,
    pub tertiary: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetRegionNameDescriptor {
    pub country_code: String,
    pub language: String,
    pub regions: Vec<RegionName>,
}

fn target_region_name(r: &mut BitCursor<'_>, env: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    let country_code = read_lang(r)?;
    let language = read_lang(r)?;
    let mut regions = Vec::new();
    while !r.is_empty() {
        let depth = r.read(2)? as u8;
        let len = r.read(6)? as usize;
        let name = env.text(r.read_bytes(len)?);
        let (primary, secondary, tertiary) = region_codes(r, depth)?;
        regions.push(RegionName {
            name,
            primary,
            secondary,
            tertiary,
        });
    }
    Ok(ExtensionKind::TargetRegionName(TargetRegionNameDescriptor {
        country_code,
        language,
        regions,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRelocatedDescriptor {
    pub old_original_network_id: u16,
    pub old_transport_stream_id: u16,
    pub old_service_id: u16,
}

fn service_relocated(r: &mut BitCursor<'_>, _: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    Ok(ExtensionKind::ServiceRelocated(ServiceRelocatedDescriptor {
        old_original_network_id: r.read_u16()?,
        old_transport_stream_id: r.read_u16()?,
        old_service_id: r.read_u16()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct C2DeliveryDescriptor {
    pub plp_id: u8,
    pub data_slice_id: u8,
    pub tuning_frequency_hz: u64,
    pub tuning_frequency_type: u8,
    pub active_ofdm_symbol_duration: u8,
    pub guard_interval: u8,
}

fn c2_delivery(r: &mut BitCursor<'_>, _: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    Ok(ExtensionKind::C2Delivery(C2DeliveryDescriptor {
        plp_id: r.read_u8()?,
        data_slice_id: r.read_u8()?,
        tuning_frequency_hz: r.read_u32()? as u64,
        tuning_frequency_type: r.read(2)? as u8,
        active_ofdm_symbol_duration: r.read(3)? as u8,
        guard_interval: r.read(3)? as u8,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct T2miDescriptor {
    pub t2mi_stream_id: u8,
    pub num_t2mi_streams: u8,
    pub pcr_iscr_common_clock: bool,
}

fn t2mi(r: &mut BitCursor<'_>, _: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    r.skip(5)?;
    let t2mi_stream_id = r.read(3)? as u8;
    r.skip(5)?;
    let num_t2mi_streams = r.read(3)? as u8 + 1;
    r.skip(7)?;
    Ok(ExtensionKind::T2mi(T2miDescriptor {
        t2mi_stream_id,
        num_t2mi_streams,
        pcr_iscr_common_clock: r.read_bool()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UriLinkageDescriptor {
    pub uri_linkage_type: u8,
    pub uri: String,
    pub min_polling_interval: Option<u16>,
    #[serde(serialize_with = "as_hex")]
    pub private_data: Vec<u8>,
}

fn uri_linkage(r: &mut BitCursor<'_>, _: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    let uri_linkage_type = r.read_u8()?;
    let n = r.read_u8()? as usize;
    let uri = String::from_utf8_lossy(r.read_bytes(n)?).into_owned();
    let min_polling_interval = if uri_linkage_type <= 1 { Some(r.read_u16()?) } else { None };
    Ok(ExtensionKind::UriLinkage(UriLinkageDescriptor {
        uri_linkage_type,
        uri,
        min_polling_interval,
        private_data: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ac4Descriptor {
    pub dialog_enhancement_enabled: Option<bool>,
    pub channel_mode: Option<u8>,
    #[serde(serialize_with = "as_hex")]
    pub toc: Vec<u8>,
    #[serde(serialize_with = "as_hex")]
    pub additional_info: Vec<u8>,
}

fn ac4(r: &mut BitCursor<'_>, _: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    let config = r.read_bool()?;
    let toc_flag = r.read_bool()?;
    r.skip(6)?;
    let (mut dialog_enhancement_enabled, mut channel_mode) = (None, None);
    if config {
        dialog_enhancement_enabled = Some(r.read_bool()?);
        channel_mode = Some(r.read(2)? as u8);
        r.skip(5)?;
    }
    let toc = if toc_flag {
        let n = r.read_u8()? as usize;
        r.read_bytes(n)?.to_vec()
    } else {
        Vec::new()
    };
    Ok(ExtensionKind::Ac4(Ac4Descriptor {
        dialog_enhancement_enabled,
        channel_mode,
        toc,
        additional_info: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TtmlSubtitlingDescriptor {
    pub language: String,
    pub subtitle_purpose: u8,
    pub tts_suitability: u8,
    pub essential_font_usage: bool,
    pub profiles: Vec<u8>,
    pub qualifier: Option<u32>,
    pub font_ids: Vec<u8>,
    pub service_name: String,
}

fn ttml_subtitling(r: &mut BitCursor<'_>, env: &DecodeEnv<'_>) -> Result<ExtensionKind, DescriptorError> {
    let language = read_lang(r)?;
    let subtitle_purpose = r.read(6)? as u8;
    let tts_suitability = r.read(2)? as u8;
    let essential_font_usage = r.read_bool()?;
    let qualifier_present = r.read_bool()?;
    r.skip(2)?;
    let profile_count = r.read(4)? as usize;
    let profiles = r.read_bytes(profile_count)?.to_vec();
    let qualifier = if qualifier_present { Some(r.read_u32()?) } else { None };
    let mut font_ids = Vec::new();
    if essential_font_usage {
        let n = r.read_u8()? as usize;
        font_ids = r.read_bytes(n)?.iter().map(|b| b & 0x7F).collect();
    }
    let service_name = read_len_text(r, env)?;
    Ok(ExtensionKind::TtmlSubtitling(TtmlSubtitlingDescriptor {
        language,
        subtitle_purpose,
        tts_suitability,
        essential_font_usage,
        profiles,
        qualifier,
        font_ids,
        service_name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{decode_descriptor, Charset, TableKind};
    use crate::psi::store::NoTables;
    use bytes::Bytes;

    fn decode(raw: &'static [u8]) -> ExtensionDescriptor {
        let env = DecodeEnv::new(TableKind::Pmt, &NoTables, Charset::default(), None);
        match decode_descriptor(Bytes::from_static(raw), &env).kind {
            DescriptorKind::Extension(e) => e,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ttml_subtitling() {
        let e = decode(&[0x7F, 0x0C, 0x20, b'e', b'n', b'g', 0x04, 0x01, 0x01, 0x04, b'S', b'u', b'b', b's']);
        assert_eq!(e.name, "TTML_subtitling_descriptor");
        match e.kind {
            ExtensionKind::TtmlSubtitling(t) => {
                assert_eq!(t.language, "eng");
                assert_eq!(t.subtitle_purpose, 1);
                assert_eq!(t.profiles, vec![1]);
                assert_eq!(t.service_name, "Subs");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_supplementary_audio_with_language() {
        let e = decode(&[0x7F, 0x05, 0x06, 0x85, b'f', b'r', b'a']);
        match e.kind {
            ExtensionKind::SupplementaryAudio(s) => {
                assert_eq!(s.mix_type, 1);
                assert_eq!(s.editorial_classification, 1);
                assert_eq!(s.language.as_deref(), Some("fra"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_target_region_depths() {
        let e = decode(&[0x7F, 0x07, 0x09, b'G', b'B', b'R', 0x02, 0x01, 0x02]);
        match e.kind {
            ExtensionKind::TargetRegion(t) => {
                assert_eq!(t.country_code, "GBR");
                assert_eq!(t.regions.len(), 1);
                assert_eq!(t.regions[0].primary, Some(1));
                assert_eq!(t.regions[0].secondary, Some(2));
                assert_eq!(t.regions[0].tertiary, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
