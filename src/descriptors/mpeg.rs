//! ISO/IEC 13818-1 descriptors (tags 0x02..0x3F).

use serde::Serialize;

use super::{as_hex, read_lang, DecodeEnv, DecodeFn, DescriptorKind, TableKind};
use crate::bits::BitCursor;
use crate::error::DescriptorError;

type Res = Result<DescriptorKind, DescriptorError>;

pub(super) fn decoder(tag: u8) -> Option<(&'static str, DecodeFn)> {
    let entry: (&'static str, DecodeFn) = match tag {
        0x02 => ("video_stream_descriptor", video_stream),
        0x03 => ("audio_stream_descriptor", audio_stream),
        0x04 => ("hierarchy_descriptor", hierarchy),
        0x05 => ("registration_descriptor", registration),
        0x06 => ("data_stream_alignment_descriptor", data_stream_alignment),
        0x07 => ("target_background_grid_descriptor", target_background_grid),
        0x08 => ("video_window_descriptor", video_window),
        0x09 => ("CA_descriptor", ca),
        0x0A => ("ISO_639_language_descriptor", iso_639_language),
        0x0B => ("system_clock_descriptor", system_clock),
        0x0C => ("multiplex_buffer_utilization_descriptor", multiplex_buffer_utilization),
        0x0D => ("copyright_descriptor", copyright),
        0x0E => ("maximum_bitrate_descriptor", maximum_bitrate),
        0x0F => ("private_data_indicator_descriptor", private_data_indicator),
        0x10 => ("smoothing_buffer_descriptor", smoothing_buffer),
        0x11 => ("STD_descriptor", std_descriptor),
        0x12 => ("IBP_descriptor", ibp),
        0x13 => ("carousel_identifier_descriptor", carousel_identifier),
        0x14 => ("association_tag_descriptor", association_tag),
        0x1B => ("MPEG-4_video_descriptor", mpeg4_video),
        0x1C => ("MPEG-4_audio_descriptor", mpeg4_audio),
        0x28 => ("AVC_video_descriptor", avc_video),
        0x2A => ("AVC_timing_and_HRD_descriptor", avc_timing_hrd),
        0x2B => ("MPEG-2_AAC_audio_descriptor", mpeg2_aac_audio),
        0x38 => ("HEVC_video_descriptor", hevc_video),
        0x3F => ("extension_descriptor", mpeg_extension),
        _ => return None,
    };
    Some(entry)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoStreamDescriptor {
    pub multiple_frame_rate: bool,
    pub frame_rate_code: u8,
    pub mpeg1_only: bool,
    pub constrained_parameter: bool,
    pub still_picture: bool,
    pub profile_and_level_indication: Option<u8>,
    pub chroma_format: Option<u8>,
    pub frame_rate_extension: Option<bool>,
}

fn video_stream(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let multiple_frame_rate = r.read_bool()?;
    let frame_rate_code = r.read(4)? as u8;
    let mpeg1_only = r.read_bool()?;
    let constrained_parameter = r.read_bool()?;
    let still_picture = r.read_bool()?;
    let (mut pli, mut chroma, mut ext) = (None, None, None);
    if !mpeg1_only {
        pli = Some(r.read_u8()?);
        chroma = Some(r.read(2)? as u8);
        ext = Some(r.read_bool()?);
    }
    Ok(DescriptorKind::VideoStream(VideoStreamDescriptor {
        multiple_frame_rate,
        frame_rate_code,
        mpeg1_only,
        constrained_parameter,
        still_picture,
        profile_and_level_indication: pli,
        chroma_format: chroma,
        frame_rate_extension: ext,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioStreamDescriptor {
    pub free_format: bool,
    pub id: u8,
    pub layer: u8,
    pub variable_rate_audio: bool,
}

fn audio_stream(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::AudioStream(AudioStreamDescriptor {
        free_format: r.read_bool()?,
        id: r.read(1)? as u8,
        layer: r.read(2)? as u8,
        variable_rate_audio: r.read_bool()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyDescriptor {
    pub no_view_scalability: bool,
    pub no_temporal_scalability: bool,
    pub no_spatial_scalability: bool,
    pub no_quality_scalability: bool,
    pub hierarchy_type: u8,
    pub layer_index: u8,
    pub tref_present: bool,
    pub embedded_layer_index: u8,
    pub channel: u8,
}

fn hierarchy(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let no_view_scalability = r.read_bool()?;
    let no_temporal_scalability = r.read_bool()?;
    let no_spatial_scalability = r.read_bool()?;
    let no_quality_scalability = r.read_bool()?;
    let hierarchy_type = r.read(4)? as u8;
    r.skip(2)?;
    let layer_index = r.read(6)? as u8;
    let tref_present = r.read_bool()?;
    r.skip(1)?;
    let embedded_layer_index = r.read(6)? as u8;
    r.skip(2)?;
    let channel = r.read(6)? as u8;
    Ok(DescriptorKind::Hierarchy(HierarchyDescriptor {
        no_view_scalability,
        no_temporal_scalability,
        no_spatial_scalability,
        no_quality_scalability,
        hierarchy_type,
        layer_index,
        tref_present,
        embedded_layer_index,
        channel,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationDescriptor {
    pub format_identifier: u32,
    #[serde(serialize_with = "as_hex")]
    pub additional_info: Vec<u8>,
}

impl RegistrationDescriptor {
    /// Four-character form (`"HEVC"`, `"VANC"`, ...) when printable.
    pub fn fourcc(&self) -> Option<String> {
        let b = self.format_identifier.to_be_bytes();
        b.iter()
            .all(|c| c.is_ascii_graphic() || *c == b' ')
            .then(|| b.iter().map(|&c| c as char).collect())
    }
}

fn registration(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::Registration(RegistrationDescriptor {
        format_identifier: r.read_u32()?,
        additional_info: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataStreamAlignmentDescriptor {
    pub alignment_type: u8,
}

fn data_stream_alignment(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::DataStreamAlignment(DataStreamAlignmentDescriptor {
        alignment_type: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetBackgroundGridDescriptor {
    pub horizontal_size: u16,
    pub vertical_size: u16,
    pub aspect_ratio_information: u8,
}

fn target_background_grid(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::TargetBackgroundGrid(TargetBackgroundGridDescriptor {
        horizontal_size: r.read(14)? as u16,
        vertical_size: r.read(14)? as u16,
        aspect_ratio_information: r.read(4)? as u8,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoWindowDescriptor {
    pub horizontal_offset: u16,
    pub vertical_offset: u16,
    pub window_priority: u8,
}

fn video_window(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::VideoWindow(VideoWindowDescriptor {
        horizontal_offset: r.read(14)? as u16,
        vertical_offset: r.read(14)? as u16,
        window_priority: r.read(4)? as u8,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaPidKind {
    Ecm,
    Emm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaDescriptor {
    pub ca_system_id: u16,
    pub ca_pid: u16,
    /// ECM in PMT context, EMM in CAT context.
    pub pid_kind: CaPidKind,
    #[serde(serialize_with = "as_hex")]
    pub private_data: Vec<u8>,
}

fn ca(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let ca_system_id = r.read_u16()?;
    r.skip(3)?;
    let ca_pid = r.read(13)? as u16;
    let pid_kind = match env.context.table {
        TableKind::Cat => CaPidKind::Emm,
        _ => CaPidKind::Ecm,
    };
    Ok(DescriptorKind::Ca(CaDescriptor {
        ca_system_id,
        ca_pid,
        pid_kind,
        private_data: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageEntry {
    pub language: String,
    pub audio_type: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Iso639LanguageDescriptor {
    pub entries: Vec<LanguageEntry>,
}

fn iso_639_language(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() % 4 != 0 {
        return Err(DescriptorError::invalid("ISO_639_language", format!("length {} not a multiple of 4", data.len())));
    }
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        entries.push(LanguageEntry {
            language: read_lang(&mut r)?,
            audio_type: r.read_u8()?,
        });
    }
    Ok(DescriptorKind::Iso639Language(Iso639LanguageDescriptor { entries }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemClockDescriptor {
    pub external_clock_reference: bool,
    pub clock_accuracy_integer: u8,
    pub clock_accuracy_exponent: u8,
}

fn system_clock(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let external_clock_reference = r.read_bool()?;
    r.skip(1)?;
    let clock_accuracy_integer = r.read(6)? as u8;
    let clock_accuracy_exponent = r.read(3)? as u8;
    Ok(DescriptorKind::SystemClock(SystemClockDescriptor {
        external_clock_reference,
        clock_accuracy_integer,
        clock_accuracy_exponent,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiplexBufferUtilizationDescriptor {
    pub bound_valid: bool,
    pub ltw_offset_lower_bound: u16,
    pub ltw_offset_upper_bound: u16,
}

fn multiplex_buffer_utilization(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let bound_valid = r.read_bool()?;
    let ltw_offset_lower_bound = r.read(15)? as u16;
    r.skip(1)?;
    let ltw_offset_upper_bound = r.read(15)? as u16;
    Ok(DescriptorKind::MultiplexBufferUtilization(MultiplexBufferUtilizationDescriptor {
        bound_valid,
        ltw_offset_lower_bound,
        ltw_offset_upper_bound,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopyrightDescriptor {
    pub copyright_identifier: u32,
    #[serde(serialize_with = "as_hex")]
    pub additional_info: Vec<u8>,
}

fn copyright(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::Copyright(CopyrightDescriptor {
        copyright_identifier: r.read_u32()?,
        additional_info: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaximumBitrateDescriptor {
    /// Units of 50 bytes/s.
    pub maximum_bitrate: u32,
}

impl MaximumBitrateDescriptor {
    pub fn bits_per_second(&self) -> u64 {
        self.maximum_bitrate as u64 * 50 * 8
    }
}

fn maximum_bitrate(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    r.skip(2)?;
    Ok(DescriptorKind::MaximumBitrate(MaximumBitrateDescriptor {
        maximum_bitrate: r.read(22)?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateDataIndicatorDescriptor {
    pub private_data_indicator: u32,
}

fn private_data_indicator(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::PrivateDataIndicator(PrivateDataIndicatorDescriptor {
        private_data_indicator: r.read_u32()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmoothingBufferDescriptor {
    pub sb_leak_rate: u32,
    pub sb_size: u32,
}

fn smoothing_buffer(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    r.skip(2)?;
    let sb_leak_rate = r.read(22)?;
    r.skip(2)?;
    let sb_size = r.read(22)?;
    Ok(DescriptorKind::SmoothingBuffer(SmoothingBufferDescriptor { sb_leak_rate, sb_size }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StdDescriptor {
    pub leak_valid: bool,
}

fn std_descriptor(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    r.skip(7)?;
    Ok(DescriptorKind::Std(StdDescriptor {
        leak_valid: r.read_bool()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IbpDescriptor {
    pub closed_gop: bool,
    pub identical_gop: bool,
    pub max_gop_length: u16,
}

fn ibp(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::Ibp(IbpDescriptor {
        closed_gop: r.read_bool()?,
        identical_gop: r.read_bool()?,
        max_gop_length: r.read(14)? as u16,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarouselIdentifierDescriptor {
    pub carousel_id: u32,
    #[serde(serialize_with = "as_hex")]
    pub private_data: Vec<u8>,
}

fn carousel_identifier(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::CarouselIdentifier(CarouselIdentifierDescriptor {
        carousel_id: r.read_u32()?,
        private_data: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociationTagDescriptor {
    pub association_tag: u16,
    pub use_: u16,
    #[serde(serialize_with = "as_hex")]
    pub selector: Vec<u8>,
    #[serde(serialize_with = "as_hex")]
    pub private_data: Vec<u8>,
}

fn association_tag(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let association_tag = r.read_u16()?;
    let use_ = r.read_u16()?;
    let sel_len = r.read_u8()? as usize;
    let selector = r.read_bytes(sel_len)?.to_vec();
    Ok(DescriptorKind::AssociationTag(AssociationTagDescriptor {
        association_tag,
        use_,
        selector,
        private_data: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mpeg4VideoDescriptor {
    pub visual_profile_and_level: u8,
}

fn mpeg4_video(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::Mpeg4Video(Mpeg4VideoDescriptor {
        visual_profile_and_level: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mpeg4AudioDescriptor {
    pub audio_profile_and_level: u8,
}

fn mpeg4_audio(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::Mpeg4Audio(Mpeg4AudioDescriptor {
        audio_profile_and_level: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvcVideoDescriptor {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub avc_compatible_flags: u8,
    pub level_idc: u8,
    pub still_present: bool,
    pub picture_24_hour: bool,
    pub frame_packing_sei_not_present: bool,
}

fn avc_video(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::AvcVideo(AvcVideoDescriptor {
        profile_idc: r.read_u8()?,
        constraint_flags: r.read(6)? as u8,
        avc_compatible_flags: r.read(2)? as u8,
        level_idc: r.read_u8()?,
        still_present: r.read_bool()?,
        picture_24_hour: r.read_bool()?,
        frame_packing_sei_not_present: r.read_bool()?,
    }))
}

/// Timing block shared by the AVC and HEVC timing/HRD descriptors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PictureTiming {
    pub clock_90khz: bool,
    pub n: Option<u32>,
    pub k: Option<u32>,
    pub num_units_in_tick: u32,
}

fn picture_timing(r: &mut BitCursor<'_>) -> Result<PictureTiming, DescriptorError> {
    let clock_90khz = r.read_bool()?;
    r.skip(7)?;
    let (n, k) = if clock_90khz {
        (None, None)
    } else {
        (Some(r.read_u32()?), Some(r.read_u32()?))
    };
    Ok(PictureTiming {
        clock_90khz,
        n,
        k,
        num_units_in_tick: r.read_u32()?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvcTimingHrdDescriptor {
    pub hrd_management_valid: bool,
    pub timing: Option<PictureTiming>,
    pub fixed_frame_rate: bool,
    pub temporal_poc: bool,
    pub picture_to_display_conversion: bool,
}

fn avc_timing_hrd(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let hrd_management_valid = r.read_bool()?;
    r.skip(6)?;
    let timing = if r.read_bool()? { Some(picture_timing(&mut r)?) } else { None };
    Ok(DescriptorKind::AvcTimingHrd(AvcTimingHrdDescriptor {
        hrd_management_valid,
        timing,
        fixed_frame_rate: r.read_bool()?,
        temporal_poc: r.read_bool()?,
        picture_to_display_conversion: r.read_bool()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mpeg2AacAudioDescriptor {
    pub profile: u8,
    pub channel_configuration: u8,
    pub additional_information: u8,
}

fn mpeg2_aac_audio(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::Mpeg2AacAudio(Mpeg2AacAudioDescriptor {
        profile: r.read_u8()?,
        channel_configuration: r.read_u8()?,
        additional_information: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HevcVideoDescriptor {
    pub profile_space: u8,
    pub tier: bool,
    pub profile_idc: u8,
    pub profile_compatibility_indication: u32,
    pub progressive_source: bool,
    pub interlaced_source: bool,
    pub non_packed_constraint: bool,
    pub frame_only_constraint: bool,
    pub level_idc: u8,
    pub still_present: bool,
    pub picture_24_hour: bool,
    pub sub_pic_hrd_params_not_present: bool,
    pub hdr_wcg_idc: u8,
    pub temporal_id_min: Option<u8>,
    pub temporal_id_max: Option<u8>,
}

fn hevc_video(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let profile_space = r.read(2)? as u8;
    let tier = r.read_bool()?;
    let profile_idc = r.read(5)? as u8;
    let profile_compatibility_indication = r.read_u32()?;
    let progressive_source = r.read_bool()?;
    let interlaced_source = r.read_bool()?;
    let non_packed_constraint = r.read_bool()?;
    let frame_only_constraint = r.read_bool()?;
    r.skip(44)?;
    let level_idc = r.read_u8()?;
    let temporal_layer_subset = r.read_bool()?;
    let still_present = r.read_bool()?;
    let picture_24_hour = r.read_bool()?;
    let sub_pic_hrd_params_not_present = r.read_bool()?;
    r.skip(2)?;
    let hdr_wcg_idc = r.read(2)? as u8;
    let (mut temporal_id_min, mut temporal_id_max) = (None, None);
    if temporal_layer_subset {
        temporal_id_min = Some(r.read(3)? as u8);
        r.skip(5)?;
        temporal_id_max = Some(r.read(3)? as u8);
        r.skip(5)?;
    }
    Ok(DescriptorKind::HevcVideo(HevcVideoDescriptor {
        profile_space,
        tier,
        profile_idc,
        profile_compatibility_indication,
        progressive_source,
        interlaced_source,
        non_packed_constraint,
        frame_only_constraint,
        level_idc,
        still_present,
        picture_24_hour,
        sub_pic_hrd_params_not_present,
        hdr_wcg_idc,
        temporal_id_min,
        temporal_id_max,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MpegExtensionDescriptor {
    pub extension_tag: u8,
    pub name: &'static str,
    pub kind: MpegExtensionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MpegExtensionKind {
    HevcTimingHrd {
        hrd_management_valid: bool,
        target_schedule_idx: Option<u8>,
        timing: Option<PictureTiming>,
    },
    Unknown {
        #[serde(serialize_with = "as_hex")]
        bytes: Vec<u8>,
    },
}

fn mpeg_extension_name(tag: u8) -> &'static str {
    match tag {
        0x02 => "ODUpdate_descriptor",
        0x03 => "HEVC_timing_and_HRD_descriptor",
        0x04 => "af_extensions_descriptor",
        0x05 => "HEVC_operation_point_descriptor",
        0x06 => "HEVC_hierarchy_extension_descriptor",
        0x07 => "green_extension_descriptor",
        0x08 => "MPEG-H_3dAudio_descriptor",
        _ => "reserved",
    }
}

fn mpeg_extension(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let extension_tag = r.read_u8()?;
    let kind = match extension_tag {
        0x03 => {
            let hrd_management_valid = r.read_bool()?;
            let not_present = r.read_bool()?;
            let idx = r.read(5)? as u8;
            let timing = if r.read_bool()? { Some(picture_timing(&mut r)?) } else { None };
            MpegExtensionKind::HevcTimingHrd {
                hrd_management_valid,
                target_schedule_idx: (!not_present).then_some(idx),
                timing,
            }
        }
        _ => MpegExtensionKind::Unknown {
            bytes: r.rest()?.to_vec(),
        },
    };
    Ok(DescriptorKind::MpegExtension(MpegExtensionDescriptor {
        extension_tag,
        name: mpeg_extension_name(extension_tag),
        kind,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{decode_descriptor, Charset};
    use crate::psi::store::NoTables;
    use bytes::Bytes;

    fn decode(raw: &'static [u8], table: TableKind) -> DescriptorKind {
        let env = DecodeEnv::new(table, &NoTables, Charset::default(), None);
        decode_descriptor(Bytes::from_static(raw), &env).kind
    }

    #[test]
    fn test_ca_descriptor_pid_kind_follows_table() {
        let raw = &[0x09, 0x04, 0x0B, 0x00, 0xE1, 0x23];
        match decode(raw, TableKind::Cat) {
            DescriptorKind::Ca(ca) => {
                assert_eq!(ca.ca_system_id, 0x0B00);
                assert_eq!(ca.ca_pid, 0x0123);
                assert_eq!(ca.pid_kind, CaPidKind::Emm);
            }
            other => panic!("unexpected {:?}", other),
        }
        match decode(raw, TableKind::Pmt) {
            DescriptorKind::Ca(ca) => assert_eq!(ca.pid_kind, CaPidKind::Ecm),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_registration_fourcc() {
        match decode(&[0x05, 0x04, b'V', b'A', b'N', b'C'], TableKind::Pmt) {
            DescriptorKind::Registration(r) => assert_eq!(r.fourcc().as_deref(), Some("VANC")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_avc_video() {
        match decode(&[0x28, 0x04, 0x64, 0x00, 0x28, 0x3F], TableKind::Pmt) {
            DescriptorKind::AvcVideo(d) => {
                assert_eq!(d.profile_idc, 100);
                assert_eq!(d.level_idc, 40);
                assert!(!d.still_present);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_maximum_bitrate_units() {
        match decode(&[0x0E, 0x03, 0xC0, 0x27, 0x10], TableKind::Pmt) {
            DescriptorKind::MaximumBitrate(d) => {
                assert_eq!(d.maximum_bitrate, 10_000);
                assert_eq!(d.bits_per_second(), 4_000_000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_iso639_bad_length_is_raw() {
        assert_eq!(decode(&[0x0A, 0x03, b'e', b'n', b'g'], TableKind::Pmt), DescriptorKind::Raw);
    }
}
