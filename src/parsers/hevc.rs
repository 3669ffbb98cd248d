//! H.265 / HEVC NAL units (ITU-T H.265 7.3)

use serde::Serialize;

use super::avc::{parse_sei, SeiMessage};
use super::utils::split_annex_b;
use crate::bits::{strip_emulation_prevention, BitCursor};
use crate::error::{BitError, EsError};

#[derive(Debug, Clone, Serialize)]
pub struct HevcNal {
    pub offset: usize,
    pub nal_unit_type: u8,
    pub name: &'static str,
    pub nuh_layer_id: u8,
    pub temporal_id: u8,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<HevcNalContent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum HevcNalContent {
    Vps(HevcVps),
    Sps(HevcSps),
    Pps(HevcPps),
    Slice(HevcSliceHeader),
    AccessUnitDelimiter { pic_type: u8 },
    Sei { messages: Vec<SeiMessage> },
}

pub fn nal_type_name(t: u8) -> &'static str {
    match t {
        0 => "TRAIL_N",
        1 => "TRAIL_R",
        2 => "TSA_N",
        3 => "TSA_R",
        4 => "STSA_N",
        5 => "STSA_R",
        6 => "RADL_N",
        7 => "RADL_R",
        8 => "RASL_N",
        9 => "RASL_R",
        16 => "BLA_W_LP",
        17 => "BLA_W_RADL",
        18 => "BLA_N_LP",
        19 => "IDR_W_RADL",
        20 => "IDR_N_LP",
        21 => "CRA",
        32 => "video parameter set",
        33 => "sequence parameter set",
        34 => "picture parameter set",
        35 => "access unit delimiter",
        36 => "end of sequence",
        37 => "end of bitstream",
        38 => "filler data",
        39 => "prefix SEI",
        40 => "suffix SEI",
        _ => "reserved",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileTierLevel {
    pub profile_space: u8,
    pub tier_high: bool,
    pub profile_idc: u8,
    pub compatibility_flags: u32,
    pub progressive_source: bool,
    pub interlaced_source: bool,
    pub level_idc: u8,
}

impl ProfileTierLevel {
    pub fn profile_name(&self) -> &'static str {
        match self.profile_idc {
            1 => "Main",
            2 => "Main 10",
            3 => "Main Still Picture",
            4 => "Range Extensions",
            _ => "unknown",
        }
    }

    /// level_idc is 30 times the level number.
    pub fn level(&self) -> f32 {
        self.level_idc as f32 / 30.0
    }
}

fn parse_profile_tier_level(r: &mut BitCursor<'_>, max_sub_layers_minus1: u32) -> Result<ProfileTierLevel, BitError> {
    let profile_space = r.read(2)? as u8;
    let tier_high = r.read_bool()?;
    let profile_idc = r.read(5)? as u8;
    let compatibility_flags = r.read_u32()?;
    let progressive_source = r.read_bool()?;
    let interlaced_source = r.read_bool()?;
    r.skip(2 + 43 + 1)?; // non_packed, frame_only, reserved/constraint bits, inbld
    let level_idc = r.read_u8()?;

    let mut sub_layers = Vec::with_capacity(max_sub_layers_minus1 as usize);
    for _ in 0..max_sub_layers_minus1 {
        sub_layers.push((r.read_bool()?, r.read_bool()?));
    }
    if max_sub_layers_minus1 > 0 {
        r.skip(2 * (8 - max_sub_layers_minus1 as u64))?;
    }
    for (profile_present, level_present) in sub_layers {
        if profile_present {
            r.skip(88)?;
        }
        if level_present {
            r.skip(8)?;
        }
    }
    Ok(ProfileTierLevel {
        profile_space,
        tier_high,
        profile_idc,
        compatibility_flags,
        progressive_source,
        interlaced_source,
        level_idc,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct HevcVps {
    pub vps_id: u8,
    pub max_layers: u8,
    pub max_sub_layers: u8,
    pub temporal_id_nesting: bool,
    pub profile_tier_level: ProfileTierLevel,
}

pub fn parse_vps(rbsp: &[u8]) -> Result<HevcVps, BitError> {
    let mut r = BitCursor::new(rbsp);
    let vps_id = r.read(4)? as u8;
    r.skip(2)?; // base_layer_internal, base_layer_available
    let max_layers = r.read(6)? as u8 + 1;
    let max_sub_layers_minus1 = r.read(3)?;
    let temporal_id_nesting = r.read_bool()?;
    r.skip(16)?; // vps_reserved_0xffff_16bits
    let profile_tier_level = parse_profile_tier_level(&mut r, max_sub_layers_minus1)?;
    Ok(HevcVps {
        vps_id,
        max_layers,
        max_sub_layers: max_sub_layers_minus1 as u8 + 1,
        temporal_id_nesting,
        profile_tier_level,
    })
}

/// One matrix of scaling_list_data().
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingList {
    pub size_id: u8,
    pub matrix_id: u8,
    /// Copied from a reference matrix (delta 0 selects the default list).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pred_matrix_id_delta: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc_coef: Option<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coefficients: Vec<u8>,
}

pub fn parse_scaling_list_data(r: &mut BitCursor<'_>) -> Result<Vec<ScalingList>, BitError> {
    let mut lists = Vec::new();
    for size_id in 0..4u8 {
        let step = if size_id == 3 { 3 } else { 1 };
        for matrix_id in (0..6u8).step_by(step) {
            let mut list = ScalingList {
                size_id,
                matrix_id,
                pred_matrix_id_delta: None,
                dc_coef: None,
                coefficients: Vec::new(),
            };
            if !r.read_bool()? {
                list.pred_matrix_id_delta = Some(r.read_ue()?);
            } else {
                let coef_num = 64.min(1usize << (4 + (size_id << 1)));
                let mut next = 8i32;
                if size_id > 1 {
                    let dc = r.read_se()? + 8;
                    list.dc_coef = Some(dc);
                    next = dc;
                }
                list.coefficients.reserve(coef_num);
                for _ in 0..coef_num {
                    let delta = r.read_se()?;
                    next = (next + delta + 256) % 256;
                    list.coefficients.push(next as u8);
                }
            }
            lists.push(list);
        }
    }
    Ok(lists)
}

#[derive(Debug, Clone, Serialize)]
pub struct HevcSps {
    pub vps_id: u8,
    pub max_sub_layers: u8,
    pub profile_tier_level: ProfileTierLevel,
    pub sps_id: u32,
    pub chroma_format_idc: u32,
    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,
    /// (left, right, top, bottom) in chroma units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conformance_window: Option<[u32; 4]>,
    pub width: u32,
    pub height: u32,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub log2_max_pic_order_cnt_lsb: u32,
    pub log2_min_luma_coding_block_size: u32,
    pub log2_max_luma_coding_block_size: u32,
    pub scaling_list_enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scaling_lists: Vec<ScalingList>,
    pub amp_enabled: bool,
    pub sample_adaptive_offset_enabled: bool,
    pub pcm_enabled: bool,
    pub num_short_term_ref_pic_sets: u32,
}

pub fn parse_sps(rbsp: &[u8]) -> Result<HevcSps, BitError> {
    let mut r = BitCursor::new(rbsp);
    let vps_id = r.read(4)? as u8;
    let max_sub_layers_minus1 = r.read(3)?;
    r.skip(1)?; // temporal_id_nesting
    let profile_tier_level = parse_profile_tier_level(&mut r, max_sub_layers_minus1)?;
    let sps_id = r.read_ue()?;
    let chroma_format_idc = r.read_ue()?;
    if chroma_format_idc == 3 {
        r.skip(1)?; // separate_colour_plane_flag
    }
    let pic_width_in_luma_samples = r.read_ue()?;
    let pic_height_in_luma_samples = r.read_ue()?;
    let conformance_window = if r.read_bool()? {
        Some([r.read_ue()?, r.read_ue()?, r.read_ue()?, r.read_ue()?])
    } else {
        None
    };
    let bit_depth_luma = 8 + r.read_ue()?;
    let bit_depth_chroma = 8 + r.read_ue()?;
    let log2_max_pic_order_cnt_lsb = 4 + r.read_ue()?;
    let ordering_info_present = r.read_bool()?;
    let first = if ordering_info_present { 0 } else { max_sub_layers_minus1 };
    for _ in first..=max_sub_layers_minus1 {
        r.read_ue()?; // max_dec_pic_buffering_minus1
        r.read_ue()?; // max_num_reorder_pics
        r.read_ue()?; // max_latency_increase_plus1
    }
    let log2_min_luma_coding_block_size = 3 + r.read_ue()?;
    let log2_max_luma_coding_block_size = log2_min_luma_coding_block_size + r.read_ue()?;
    r.read_ue()?; // log2_min_luma_transform_block_size_minus2
    r.read_ue()?; // log2_diff_max_min_luma_transform_block_size
    r.read_ue()?; // max_transform_hierarchy_depth_inter
    r.read_ue()?; // max_transform_hierarchy_depth_intra
    let scaling_list_enabled = r.read_bool()?;
    let mut scaling_lists = Vec::new();
    if scaling_list_enabled && r.read_bool()? {
        scaling_lists = parse_scaling_list_data(&mut r)?;
    }
    let amp_enabled = r.read_bool()?;
    let sample_adaptive_offset_enabled = r.read_bool()?;
    let pcm_enabled = r.read_bool()?;
    if pcm_enabled {
        r.skip(8)?; // pcm sample bit depths
        r.read_ue()?;
        r.read_ue()?;
        r.skip(1)?;
    }
    let num_short_term_ref_pic_sets = r.read_ue()?;

    let (sub_w, sub_h) = match chroma_format_idc {
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1),
    };
    let [l, rt, t, b] = conformance_window.unwrap_or_default();
    Ok(HevcSps {
        vps_id,
        max_sub_layers: max_sub_layers_minus1 as u8 + 1,
        profile_tier_level,
        sps_id,
        chroma_format_idc,
        pic_width_in_luma_samples,
        pic_height_in_luma_samples,
        conformance_window,
        width: pic_width_in_luma_samples.saturating_sub(sub_w * (l + rt)),
        height: pic_height_in_luma_samples.saturating_sub(sub_h * (t + b)),
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_pic_order_cnt_lsb,
        log2_min_luma_coding_block_size,
        log2_max_luma_coding_block_size,
        scaling_list_enabled,
        scaling_lists,
        amp_enabled,
        sample_adaptive_offset_enabled,
        pcm_enabled,
        num_short_term_ref_pic_sets,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct HevcPps {
    pub pps_id: u32,
    pub sps_id: u32,
    pub dependent_slice_segments_enabled: bool,
    pub output_flag_present: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled: bool,
    pub cabac_init_present: bool,
    pub num_ref_idx_l0_default_active: u32,
    pub num_ref_idx_l1_default_active: u32,
    pub init_qp: i32,
}

pub fn parse_pps(rbsp: &[u8]) -> Result<HevcPps, BitError> {
    let mut r = BitCursor::new(rbsp);
    Ok(HevcPps {
        pps_id: r.read_ue()?,
        sps_id: r.read_ue()?,
        dependent_slice_segments_enabled: r.read_bool()?,
        output_flag_present: r.read_bool()?,
        num_extra_slice_header_bits: r.read(3)? as u8,
        sign_data_hiding_enabled: r.read_bool()?,
        cabac_init_present: r.read_bool()?,
        num_ref_idx_l0_default_active: r.read_ue()? + 1,
        num_ref_idx_l1_default_active: r.read_ue()? + 1,
        init_qp: 26 + r.read_se()?,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct HevcSliceHeader {
    pub first_slice_segment_in_pic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_output_of_prior_pics: Option<bool>,
    pub pps_id: u32,
}

fn parse_slice_header(rbsp: &[u8], nal_unit_type: u8) -> Result<HevcSliceHeader, BitError> {
    let mut r = BitCursor::new(rbsp);
    let first_slice_segment_in_pic = r.read_bool()?;
    let no_output_of_prior_pics = if (16..=23).contains(&nal_unit_type) {
        Some(r.read_bool()?)
    } else {
        None
    };
    Ok(HevcSliceHeader {
        first_slice_segment_in_pic,
        no_output_of_prior_pics,
        pps_id: r.read_ue()?,
    })
}

pub fn parse_nal_units(data: &[u8]) -> (Vec<HevcNal>, Vec<EsError>) {
    let mut nals = Vec::new();
    let mut errors = Vec::new();
    for (offset, unit) in split_annex_b(data) {
        if unit.len() < 2 {
            errors.push(EsError::Overrun {
                offset,
                needed: 2,
                available: unit.len(),
            });
            continue;
        }
        let nal_unit_type = (unit[0] >> 1) & 0x3F;
        let nuh_layer_id = ((unit[0] & 0x01) << 5) | (unit[1] >> 3);
        let temporal_id = (unit[1] & 0x07).saturating_sub(1);
        let rbsp = strip_emulation_prevention(&unit[2..]);
        let parsed = match nal_unit_type {
            0..=9 | 16..=21 => parse_slice_header(&rbsp, nal_unit_type).map(HevcNalContent::Slice).map(Some),
            32 => parse_vps(&rbsp).map(HevcNalContent::Vps).map(Some),
            33 => parse_sps(&rbsp).map(HevcNalContent::Sps).map(Some),
            34 => parse_pps(&rbsp).map(HevcNalContent::Pps).map(Some),
            35 => BitCursor::new(&rbsp)
                .read(3)
                .map(|t| Some(HevcNalContent::AccessUnitDelimiter { pic_type: t as u8 })),
            39 | 40 => parse_sei(&rbsp).map(|messages| Some(HevcNalContent::Sei { messages })),
            _ => Ok(None),
        };
        let content = parsed.unwrap_or_else(|e| {
            errors.push(EsError::Malformed(format!("{} at offset {}: {}", nal_type_name(nal_unit_type), offset, e)));
            None
        });
        nals.push(HevcNal {
            offset,
            nal_unit_type,
            name: nal_type_name(nal_unit_type),
            nuh_layer_id,
            temporal_id,
            size: unit.len(),
            content,
        });
    }
    (nals, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    fn write_ptl(w: &mut BitWriter) {
        w.write(2, 0).unwrap();
        w.write_bool(false).unwrap();
        w.write(5, 1).unwrap(); // Main
        w.write(32, 0x6000_0000).unwrap();
        w.write_bool(true).unwrap(); // progressive
        w.write_bool(false).unwrap();
        w.write(32, 0).unwrap();
        w.write(14, 0).unwrap();
        w.write(8, 120).unwrap(); // level 4
    }

    fn sps(scaling: bool) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write(4, 0).unwrap();
        w.write(3, 0).unwrap();
        w.write_bool(true).unwrap();
        write_ptl(&mut w);
        w.write_ue(0).unwrap(); // sps id
        w.write_ue(1).unwrap(); // 4:2:0
        w.write_ue(1920).unwrap();
        w.write_ue(1088).unwrap();
        w.write_bool(true).unwrap(); // conformance window
        for v in [0, 0, 0, 4] {
            w.write_ue(v).unwrap();
        }
        w.write_ue(0).unwrap();
        w.write_ue(0).unwrap();
        w.write_ue(4).unwrap(); // poc lsb
        w.write_bool(true).unwrap();
        w.write_ue(4).unwrap();
        w.write_ue(2).unwrap();
        w.write_ue(0).unwrap();
        w.write_ue(0).unwrap(); // min cb 8
        w.write_ue(3).unwrap(); // max cb 64
        w.write_ue(0).unwrap();
        w.write_ue(3).unwrap();
        w.write_ue(0).unwrap();
        w.write_ue(0).unwrap();
        w.write_bool(scaling).unwrap();
        if scaling {
            w.write_bool(true).unwrap(); // sps_scaling_list_data_present
            for size_id in 0..4u32 {
                let count = if size_id == 3 { 2 } else { 6 };
                for m in 0..count {
                    if size_id == 0 && m == 0 {
                        // explicit 4x4 list: 16 coefficients all 16
                        w.write_bool(true).unwrap();
                        w.write_se(8).unwrap();
                        for _ in 1..16 {
                            w.write_se(0).unwrap();
                        }
                    } else {
                        w.write_bool(false).unwrap();
                        w.write_ue(0).unwrap();
                    }
                }
            }
        }
        w.write_bool(false).unwrap(); // amp
        w.write_bool(true).unwrap(); // sao
        w.write_bool(false).unwrap(); // pcm
        w.write_ue(0).unwrap();
        w.write_bool(true).unwrap();
        let mut out = vec![0, 0, 1, 0x42, 0x01];
        out.extend(w.finish().unwrap());
        out
    }

    #[test]
    fn test_sps_conformance_window() {
        let (nals, errors) = parse_nal_units(&sps(false));
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(nals[0].name, "sequence parameter set");
        match &nals[0].content {
            Some(HevcNalContent::Sps(s)) => {
                assert_eq!((s.width, s.height), (1920, 1080));
                assert_eq!(s.profile_tier_level.profile_name(), "Main");
                assert_eq!(s.profile_tier_level.level(), 4.0);
                assert_eq!(s.log2_max_luma_coding_block_size, 6);
                assert!(s.sample_adaptive_offset_enabled);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sps_scaling_list_deltas() {
        let (nals, errors) = parse_nal_units(&sps(true));
        assert!(errors.is_empty(), "{:?}", errors);
        let Some(HevcNalContent::Sps(s)) = &nals[0].content else {
            panic!("no SPS");
        };
        assert_eq!(s.scaling_lists.len(), 20);
        let explicit = &s.scaling_lists[0];
        assert_eq!((explicit.size_id, explicit.matrix_id), (0, 0));
        assert_eq!(explicit.coefficients, vec![16; 16]);
        assert_eq!(s.scaling_lists[6].pred_matrix_id_delta, Some(0));
        assert_eq!(s.scaling_lists[19].matrix_id, 3);
        assert!(!s.amp_enabled);
        assert!(s.sample_adaptive_offset_enabled);
    }

    #[test]
    fn test_idr_slice_header() {
        // IDR_W_RADL (19): header 0x26 0x01; first_slice 1, no_output 0, pps ue 0
        let (nals, _) = parse_nal_units(&[0, 0, 1, 0x26, 0x01, 0b1010_0000]);
        match &nals[0].content {
            Some(HevcNalContent::Slice(s)) => {
                assert!(s.first_slice_segment_in_pic);
                assert_eq!(s.no_output_of_prior_pics, Some(false));
                assert_eq!(s.pps_id, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(nals[0].name, "IDR_W_RADL");
    }
}
