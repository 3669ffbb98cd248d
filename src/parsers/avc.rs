//! H.264 / AVC NAL units (ITU-T H.264 7.3)

use serde::Serialize;

use super::utils::split_annex_b;
use crate::bits::{strip_emulation_prevention, BitCursor};
use crate::error::{BitError, EsError};

#[derive(Debug, Clone, Serialize)]
pub struct AvcNal {
    pub offset: usize,
    pub nal_ref_idc: u8,
    pub nal_unit_type: u8,
    pub name: &'static str,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<AvcNalContent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum AvcNalContent {
    Sps(AvcSps),
    Pps(AvcPps),
    Slice(AvcSliceHeader),
    AccessUnitDelimiter { primary_pic_type: u8 },
    Sei { messages: Vec<SeiMessage> },
}

pub fn nal_type_name(t: u8) -> &'static str {
    match t {
        1 => "coded slice (non-IDR)",
        2 => "slice data partition A",
        3 => "slice data partition B",
        4 => "slice data partition C",
        5 => "coded slice (IDR)",
        6 => "SEI",
        7 => "sequence parameter set",
        8 => "picture parameter set",
        9 => "access unit delimiter",
        10 => "end of sequence",
        11 => "end of stream",
        12 => "filler data",
        13 => "SPS extension",
        14 => "prefix NAL unit",
        15 => "subset SPS",
        19 => "auxiliary slice",
        20 => "slice extension",
        _ => "reserved",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AvcSps {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub scaling_matrix_present: bool,
    pub log2_max_frame_num: u32,
    pub pic_order_cnt_type: u32,
    pub max_num_ref_frames: u32,
    pub frame_mbs_only: bool,
    /// (left, right, top, bottom) in crop units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_cropping: Option<[u32; 4]>,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vui: Option<AvcVui>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AvcVui {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio_idc: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sar: Option<(u16, u16)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_format: Option<u8>,
    pub full_range: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colour_primaries: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_units_in_tick: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_scale: Option<u32>,
    pub fixed_frame_rate: bool,
}

impl AvcSps {
    pub fn profile_name(&self) -> &'static str {
        match self.profile_idc {
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4 Predictive",
            44 => "CAVLC 4:4:4 Intra",
            118 | 128 => "Multiview High",
            _ => "unknown",
        }
    }

    /// Frames per second from VUI timing (two fields per frame).
    pub fn frame_rate(&self) -> Option<f64> {
        let vui = self.vui.as_ref()?;
        let (n, t) = (vui.num_units_in_tick?, vui.time_scale?);
        (n > 0 && t > 0).then(|| t as f64 / (2.0 * n as f64))
    }
}

fn high_profile(profile_idc: u8) -> bool {
    matches!(profile_idc, 100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135)
}

/// Skips one scaling_list() of `size` coefficients.
fn skip_scaling_list(r: &mut BitCursor<'_>, size: usize) -> Result<(), BitError> {
    let mut last = 8i32;
    let mut next = 8i32;
    for _ in 0..size {
        if next != 0 {
            let delta = r.read_se()?;
            next = (last + delta + 256) % 256;
        }
        if next != 0 {
            last = next;
        }
    }
    Ok(())
}

pub fn parse_sps(rbsp: &[u8]) -> Result<AvcSps, BitError> {
    let mut r = BitCursor::new(rbsp);
    let profile_idc = r.read_u8()?;
    let constraint_flags = r.read_u8()?;
    let level_idc = r.read_u8()?;
    let seq_parameter_set_id = r.read_ue()?;

    let mut chroma_format_idc = 1;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;
    let mut scaling_matrix_present = false;
    if high_profile(profile_idc) {
        chroma_format_idc = r.read_ue()?;
        if chroma_format_idc == 3 {
            r.skip(1)?; // separate_colour_plane_flag
        }
        bit_depth_luma = 8 + r.read_ue()?;
        bit_depth_chroma = 8 + r.read_ue()?;
        r.skip(1)?; // qpprime_y_zero_transform_bypass_flag
        scaling_matrix_present = r.read_bool()?;
        if scaling_matrix_present {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for idx in 0..lists {
                if r.read_bool()? {
                    skip_scaling_list(&mut r, if idx < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num = 4 + r.read_ue()?;
    let pic_order_cnt_type = r.read_ue()?;
    match pic_order_cnt_type {
        0 => {
            r.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            r.skip(1)?; // delta_pic_order_always_zero_flag
            r.read_se()?; // offset_for_non_ref_pic
            r.read_se()?; // offset_for_top_to_bottom_field
            let n = r.read_ue()?;
            for _ in 0..n {
                r.read_se()?;
            }
        }
        _ => {}
    }
    let max_num_ref_frames = r.read_ue()?;
    r.skip(1)?; // gaps_in_frame_num_value_allowed_flag

    let width_mbs = r.read_ue()? + 1;
    let height_map_units = r.read_ue()? + 1;
    let frame_mbs_only = r.read_bool()?;
    if !frame_mbs_only {
        r.skip(1)?; // mb_adaptive_frame_field_flag
    }
    r.skip(1)?; // direct_8x8_inference_flag

    let frame_cropping = if r.read_bool()? {
        Some([r.read_ue()?, r.read_ue()?, r.read_ue()?, r.read_ue()?])
    } else {
        None
    };

    let vui = if r.read_bool()? { Some(parse_vui(&mut r)?) } else { None };

    let crop_unit_x = match chroma_format_idc {
        0 | 3 => 1,
        _ => 2,
    };
    let field_factor = 2 - frame_mbs_only as u32;
    let crop_unit_y = match chroma_format_idc {
        1 => 2 * field_factor,
        _ => field_factor,
    };
    let [l, rt, t, b] = frame_cropping.unwrap_or_default();
    let width = (width_mbs * 16).saturating_sub((l + rt) * crop_unit_x);
    let height = (height_map_units * field_factor * 16).saturating_sub((t + b) * crop_unit_y);

    Ok(AvcSps {
        profile_idc,
        constraint_flags,
        level_idc,
        seq_parameter_set_id,
        chroma_format_idc,
        bit_depth_luma,
        bit_depth_chroma,
        scaling_matrix_present,
        log2_max_frame_num,
        pic_order_cnt_type,
        max_num_ref_frames,
        frame_mbs_only,
        frame_cropping,
        width,
        height,
        vui,
    })
}

fn parse_vui(r: &mut BitCursor<'_>) -> Result<AvcVui, BitError> {
    let mut vui = AvcVui::default();
    if r.read_bool()? {
        let idc = r.read_u8()?;
        vui.aspect_ratio_idc = Some(idc);
        if idc == 255 {
            vui.sar = Some((r.read_u16()?, r.read_u16()?));
        }
    }
    if r.read_bool()? {
        r.skip(1)?; // overscan_appropriate_flag
    }
    if r.read_bool()? {
        vui.video_format = Some(r.read(3)? as u8);
        vui.full_range = r.read_bool()?;
        if r.read_bool()? {
            vui.colour_primaries = Some(r.read_u8()?);
            r.skip(16)?; // transfer_characteristics, matrix_coefficients
        }
    }
    if r.read_bool()? {
        r.read_ue()?;
        r.read_ue()?;
    }
    if r.read_bool()? {
        vui.num_units_in_tick = Some(r.read_u32()?);
        vui.time_scale = Some(r.read_u32()?);
        vui.fixed_frame_rate = r.read_bool()?;
    }
    // HRD and bitstream restriction are not needed
    Ok(vui)
}

#[derive(Debug, Clone, Serialize)]
pub struct AvcPps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub entropy_coding_mode_cabac: bool,
    pub bottom_field_pic_order_in_frame_present: bool,
    pub num_slice_groups: u32,
}

pub fn parse_pps(rbsp: &[u8]) -> Result<AvcPps, BitError> {
    let mut r = BitCursor::new(rbsp);
    Ok(AvcPps {
        pic_parameter_set_id: r.read_ue()?,
        seq_parameter_set_id: r.read_ue()?,
        entropy_coding_mode_cabac: r.read_bool()?,
        bottom_field_pic_order_in_frame_present: r.read_bool()?,
        num_slice_groups: r.read_ue()? + 1,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct AvcSliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: u32,
    pub slice_type_name: &'static str,
    pub pic_parameter_set_id: u32,
}

pub fn parse_slice_header(rbsp: &[u8]) -> Result<AvcSliceHeader, BitError> {
    let mut r = BitCursor::new(rbsp);
    let first_mb_in_slice = r.read_ue()?;
    let slice_type = r.read_ue()?;
    let slice_type_name = match slice_type % 5 {
        0 => "P",
        1 => "B",
        2 => "I",
        3 => "SP",
        _ => "SI",
    };
    Ok(AvcSliceHeader {
        first_mb_in_slice,
        slice_type,
        slice_type_name,
        pic_parameter_set_id: r.read_ue()?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeiMessage {
    pub payload_type: u32,
    pub payload_size: u32,
}

/// sei_rbsp(): payload type and size of each message. Shared with H.265.
pub fn parse_sei(rbsp: &[u8]) -> Result<Vec<SeiMessage>, BitError> {
    let mut r = BitCursor::new(rbsp);
    let mut messages = Vec::new();
    loop {
        let payload_type = read_sei_value(&mut r)?;
        let payload_size = read_sei_value(&mut r)?;
        r.skip(payload_size as u64 * 8)?;
        messages.push(SeiMessage {
            payload_type,
            payload_size,
        });
        if !r.more_rbsp_data() {
            break;
        }
    }
    Ok(messages)
}

fn read_sei_value(r: &mut BitCursor<'_>) -> Result<u32, BitError> {
    let mut value = 0u32;
    loop {
        let b = r.read_u8()?;
        value += b as u32;
        if b != 0xFF {
            return Ok(value);
        }
    }
}

/// Scans a PES payload for NAL units. Units that fail to parse are reported
/// and kept without content.
pub fn parse_nal_units(data: &[u8]) -> (Vec<AvcNal>, Vec<EsError>) {
    let mut nals = Vec::new();
    let mut errors = Vec::new();
    for (offset, unit) in split_annex_b(data) {
        let header = unit[0];
        let nal_unit_type = header & 0x1F;
        let rbsp = strip_emulation_prevention(&unit[1..]);
        let parsed = match nal_unit_type {
            1 | 5 => parse_slice_header(&rbsp).map(AvcNalContent::Slice).map(Some),
            6 => parse_sei(&rbsp).map(|messages| Some(AvcNalContent::Sei { messages })),
            7 => parse_sps(&rbsp).map(AvcNalContent::Sps).map(Some),
            8 => parse_pps(&rbsp).map(AvcNalContent::Pps).map(Some),
            9 => BitCursor::new(&rbsp)
                .read(3)
                .map(|t| Some(AvcNalContent::AccessUnitDelimiter { primary_pic_type: t as u8 })),
            _ => Ok(None),
        };
        let content = parsed.unwrap_or_else(|e| {
            errors.push(EsError::Malformed(format!("{} at offset {}: {}", nal_type_name(nal_unit_type), offset, e)));
            None
        });
        nals.push(AvcNal {
            offset,
            nal_ref_idc: (header >> 5) & 0x03,
            nal_unit_type,
            name: nal_type_name(nal_unit_type),
            size: unit.len(),
            content,
        });
    }
    (nals, errors)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bits::BitWriter;

    /// Baseline 1920x1080 SPS with cropping (1088 coded rows) and 25 fps timing.
    pub(crate) fn sps_1080p25() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write(8, 66).unwrap(); // profile_idc
        w.write(8, 0xC0).unwrap();
        w.write(8, 40).unwrap(); // level 4.0
        w.write_ue(0).unwrap(); // sps id
        w.write_ue(0).unwrap(); // log2_max_frame_num_minus4
        w.write_ue(2).unwrap(); // poc type 2
        w.write_ue(1).unwrap(); // max_num_ref_frames
        w.write_bool(false).unwrap();
        w.write_ue(119).unwrap(); // 120 MBs wide
        w.write_ue(67).unwrap(); // 68 map units high
        w.write_bool(true).unwrap(); // frame_mbs_only
        w.write_bool(true).unwrap(); // direct_8x8
        w.write_bool(true).unwrap(); // cropping
        for v in [0, 0, 0, 4] {
            w.write_ue(v).unwrap();
        }
        w.write_bool(true).unwrap(); // vui
        w.write_bool(false).unwrap(); // aspect ratio
        w.write_bool(false).unwrap(); // overscan
        w.write_bool(false).unwrap(); // video signal
        w.write_bool(false).unwrap(); // chroma loc
        w.write_bool(true).unwrap(); // timing
        w.write(32, 1).unwrap();
        w.write(32, 50).unwrap();
        w.write_bool(true).unwrap();
        w.write_bool(true).unwrap(); // rbsp stop bit
        let mut out = vec![0x00, 0x00, 0x00, 0x01, 0x67];
        out.extend(w.finish().unwrap());
        out
    }

    #[test]
    fn test_sps_dimensions_and_frame_rate() {
        let (nals, errors) = parse_nal_units(&sps_1080p25());
        assert!(errors.is_empty());
        match &nals[0].content {
            Some(AvcNalContent::Sps(sps)) => {
                assert_eq!((sps.width, sps.height), (1920, 1080));
                assert_eq!(sps.profile_name(), "Baseline");
                assert_eq!(sps.frame_rate(), Some(25.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_slice_and_aud() {
        // AUD (I picture), IDR slice: first_mb 0, slice_type 7 (I), pps 0
        let data = [0, 0, 1, 0x09, 0x10, 0, 0, 1, 0x65, 0b1000_1000, 0b0100_0000];
        let (nals, errors) = parse_nal_units(&data);
        assert!(errors.is_empty());
        assert!(matches!(
            nals[0].content,
            Some(AvcNalContent::AccessUnitDelimiter { primary_pic_type: 0 })
        ));
        match &nals[1].content {
            Some(AvcNalContent::Slice(s)) => {
                assert_eq!(s.slice_type_name, "I");
                assert_eq!(nals[1].nal_ref_idc, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_sps_is_reported_and_skipped() {
        let data = [0, 0, 1, 0x67, 0x64, 0, 0, 1, 0x09, 0xF0];
        let (nals, errors) = parse_nal_units(&data);
        assert_eq!(nals.len(), 2);
        assert!(nals[0].content.is_none());
        assert_eq!(errors.len(), 1);
        assert!(nals[1].content.is_some());
    }

    #[test]
    fn test_sei_message_sizes() {
        let msgs = parse_sei(&[0x05, 0x02, 0xAA, 0xBB, 0x80]).unwrap();
        assert_eq!(msgs, vec![SeiMessage { payload_type: 5, payload_size: 2 }]);
    }
}
