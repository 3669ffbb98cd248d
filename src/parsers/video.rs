//! MPEG-1/2 video headers (ISO/IEC 13818-2 6.2)

use serde::Serialize;

use super::utils::start_codes;
use crate::bits::BitCursor;
use crate::error::{BitError, EsError};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum MpegVideoUnit {
    SequenceHeader(SequenceHeader),
    SequenceExtension(SequenceExtension),
    SequenceDisplayExtension { video_format: u8, display_width: u16, display_height: u16 },
    PictureCodingExtension(PictureCodingExtension),
    OtherExtension { extension_id: u8 },
    GroupOfPictures(GroupOfPictures),
    Picture(PictureHeader),
    UserData { offset: usize, length: usize },
    SequenceEnd,
}

/// Decoded headers of one PES payload. Slices are counted, not parsed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MpegVideoInfo {
    pub units: Vec<MpegVideoUnit>,
    pub slices: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceHeader {
    pub horizontal_size: u16,
    pub vertical_size: u16,
    pub aspect_ratio_information: u8,
    pub frame_rate_code: u8,
    /// Units of 400 bit/s.
    pub bit_rate_value: u32,
    pub vbv_buffer_size: u16,
    pub constrained_parameters: bool,
    pub intra_quantiser_matrix: bool,
    pub non_intra_quantiser_matrix: bool,
}

impl SequenceHeader {
    pub fn aspect_ratio(&self) -> &'static str {
        match self.aspect_ratio_information {
            1 => "1:1",
            2 => "4:3",
            3 => "16:9",
            4 => "2.21:1",
            _ => "reserved",
        }
    }

    pub fn frame_rate(&self) -> Option<f64> {
        match self.frame_rate_code {
            1 => Some(24000.0 / 1001.0),
            2 => Some(24.0),
            3 => Some(25.0),
            4 => Some(30000.0 / 1001.0),
            5 => Some(30.0),
            6 => Some(50.0),
            7 => Some(60000.0 / 1001.0),
            8 => Some(60.0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceExtension {
    pub profile_and_level: u8,
    pub progressive_sequence: bool,
    pub chroma_format: u8,
    pub horizontal_size_extension: u8,
    pub vertical_size_extension: u8,
    pub bit_rate_extension: u16,
    pub low_delay: bool,
}

impl SequenceExtension {
    pub fn chroma_name(&self) -> &'static str {
        match self.chroma_format {
            1 => "4:2:0",
            2 => "4:2:2",
            3 => "4:4:4",
            _ => "reserved",
        }
    }

    pub fn profile_name(&self) -> &'static str {
        match (self.profile_and_level >> 4) & 0x07 {
            1 => "High",
            2 => "Spatially Scalable",
            3 => "SNR Scalable",
            4 => "Main",
            5 => "Simple",
            _ => "reserved",
        }
    }

    pub fn level_name(&self) -> &'static str {
        match self.profile_and_level & 0x0F {
            4 => "High",
            6 => "High 1440",
            8 => "Main",
            10 => "Low",
            _ => "reserved",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PictureCodingExtension {
    pub f_code: [u8; 4],
    pub intra_dc_precision: u8,
    pub picture_structure: u8,
    pub top_field_first: bool,
    pub frame_pred_frame_dct: bool,
    pub concealment_motion_vectors: bool,
    pub q_scale_type: bool,
    pub intra_vlc_format: bool,
    pub alternate_scan: bool,
    pub repeat_first_field: bool,
    pub chroma_420_type: bool,
    pub progressive_frame: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupOfPictures {
    pub drop_frame: bool,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub pictures: u8,
    pub closed_gop: bool,
    pub broken_link: bool,
}

impl GroupOfPictures {
    pub fn time_code(&self) -> String {
        let sep = if self.drop_frame { ';' } else { ':' };
        format!(
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, sep, self.pictures
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PictureHeader {
    pub temporal_reference: u16,
    pub picture_coding_type: u8,
    pub vbv_delay: u16,
}

impl PictureHeader {
    pub fn coding_type_name(&self) -> &'static str {
        match self.picture_coding_type {
            1 => "I",
            2 => "P",
            3 => "B",
            4 => "D",
            _ => "reserved",
        }
    }
}

fn parse_sequence_header(r: &mut BitCursor<'_>) -> Result<SequenceHeader, BitError> {
    let horizontal_size = r.read(12)? as u16;
    let vertical_size = r.read(12)? as u16;
    let aspect_ratio_information = r.read(4)? as u8;
    let frame_rate_code = r.read(4)? as u8;
    let bit_rate_value = r.read(18)?;
    r.skip(1)?; // marker
    let vbv_buffer_size = r.read(10)? as u16;
    let constrained_parameters = r.read_bool()?;
    let intra_quantiser_matrix = r.read_bool()?;
    if intra_quantiser_matrix {
        r.skip(64 * 8)?;
    }
    let non_intra_quantiser_matrix = r.read_bool()?;
    if non_intra_quantiser_matrix {
        r.skip(64 * 8)?;
    }
    Ok(SequenceHeader {
        horizontal_size,
        vertical_size,
        aspect_ratio_information,
        frame_rate_code,
        bit_rate_value,
        vbv_buffer_size,
        constrained_parameters,
        intra_quantiser_matrix,
        non_intra_quantiser_matrix,
    })
}

fn parse_extension(r: &mut BitCursor<'_>) -> Result<MpegVideoUnit, BitError> {
    let extension_id = r.read(4)? as u8;
    Ok(match extension_id {
        1 => {
            let profile_and_level = r.read_u8()?;
            let progressive_sequence = r.read_bool()?;
            let chroma_format = r.read(2)? as u8;
            let horizontal_size_extension = r.read(2)? as u8;
            let vertical_size_extension = r.read(2)? as u8;
            let bit_rate_extension = r.read(12)? as u16;
            r.skip(1 + 8)?; // marker, vbv_buffer_size_extension
            let low_delay = r.read_bool()?;
            MpegVideoUnit::SequenceExtension(SequenceExtension {
                profile_and_level,
                progressive_sequence,
                chroma_format,
                horizontal_size_extension,
                vertical_size_extension,
                bit_rate_extension,
                low_delay,
            })
        }
        2 => {
            let video_format = r.read(3)? as u8;
            if r.read_bool()? {
                r.skip(24)?; // colour description
            }
            let display_width = r.read(14)? as u16;
            r.skip(1)?;
            let display_height = r.read(14)? as u16;
            MpegVideoUnit::SequenceDisplayExtension {
                video_format,
                display_width,
                display_height,
            }
        }
        8 => {
            let f_code = [r.read(4)? as u8, r.read(4)? as u8, r.read(4)? as u8, r.read(4)? as u8];
            MpegVideoUnit::PictureCodingExtension(PictureCodingExtension {
                f_code,
                intra_dc_precision: r.read(2)? as u8,
                picture_structure: r.read(2)? as u8,
                top_field_first: r.read_bool()?,
                frame_pred_frame_dct: r.read_bool()?,
                concealment_motion_vectors: r.read_bool()?,
                q_scale_type: r.read_bool()?,
                intra_vlc_format: r.read_bool()?,
                alternate_scan: r.read_bool()?,
                repeat_first_field: r.read_bool()?,
                chroma_420_type: r.read_bool()?,
                progressive_frame: r.read_bool()?,
            })
        }
        _ => MpegVideoUnit::OtherExtension { extension_id },
    })
}

fn parse_gop(r: &mut BitCursor<'_>) -> Result<GroupOfPictures, BitError> {
    let drop_frame = r.read_bool()?;
    let hours = r.read(5)? as u8;
    let minutes = r.read(6)? as u8;
    r.skip(1)?;
    let seconds = r.read(6)? as u8;
    let pictures = r.read(6)? as u8;
    Ok(GroupOfPictures {
        drop_frame,
        hours,
        minutes,
        seconds,
        pictures,
        closed_gop: r.read_bool()?,
        broken_link: r.read_bool()?,
    })
}

fn parse_picture(r: &mut BitCursor<'_>) -> Result<PictureHeader, BitError> {
    Ok(PictureHeader {
        temporal_reference: r.read(10)? as u16,
        picture_coding_type: r.read(3)? as u8,
        vbv_delay: r.read_u16()?,
    })
}

/// Walks the start codes of a video PES payload.
pub fn parse_video(data: &[u8]) -> (MpegVideoInfo, Vec<EsError>) {
    let mut info = MpegVideoInfo::default();
    let mut errors = Vec::new();
    let starts = start_codes(data);
    for (n, &pos) in starts.iter().enumerate() {
        let Some(&code) = data.get(pos) else {
            break;
        };
        let end = starts.get(n + 1).map_or(data.len(), |&next| next - 3);
        let body = &data[(pos + 1).min(end)..end];
        let mut r = BitCursor::new(body);
        let unit = match code {
            0x00 => parse_picture(&mut r).map(MpegVideoUnit::Picture),
            0x01..=0xAF => {
                info.slices += 1;
                continue;
            }
            0xB2 => Ok(MpegVideoUnit::UserData {
                offset: pos + 1,
                length: body.len(),
            }),
            0xB3 => parse_sequence_header(&mut r).map(MpegVideoUnit::SequenceHeader),
            0xB5 => parse_extension(&mut r),
            0xB7 => Ok(MpegVideoUnit::SequenceEnd),
            0xB8 => parse_gop(&mut r).map(MpegVideoUnit::GroupOfPictures),
            _ => continue,
        };
        match unit {
            Ok(unit) => info.units.push(unit),
            Err(e) => errors.push(EsError::Malformed(format!("start code 0x{:02X} at offset {}: {}", code, pos, e))),
        }
    }
    (info, errors)
}

impl MpegVideoInfo {
    pub fn sequence_header(&self) -> Option<&SequenceHeader> {
        self.units.iter().find_map(|u| match u {
            MpegVideoUnit::SequenceHeader(h) => Some(h),
            _ => None,
        })
    }

    /// Coded size including the MPEG-2 size extensions.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let seq = self.sequence_header()?;
        let ext = self.units.iter().find_map(|u| match u {
            MpegVideoUnit::SequenceExtension(e) => Some(e),
            _ => None,
        });
        let (hx, vx) = ext.map_or((0, 0), |e| (e.horizontal_size_extension as u32, e.vertical_size_extension as u32));
        Some(((hx << 12) | seq.horizontal_size as u32, (vx << 12) | seq.vertical_size as u32))
    }

    /// Bit rate in bit/s, combining the 18-bit value with its extension.
    pub fn bit_rate(&self) -> Option<u64> {
        let seq = self.sequence_header()?;
        let ext = self.units.iter().find_map(|u| match u {
            MpegVideoUnit::SequenceExtension(e) => Some(e.bit_rate_extension as u64),
            _ => None,
        });
        Some(((ext.unwrap_or(0) << 18) | seq.bit_rate_value as u64) * 400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut data = vec![0, 0, 1, 0xB3];
        // 720x576, 4:3, 25 fps, bit_rate_value 15000, marker, vbv 112, no matrices
        data.extend([0x2D, 0x02, 0x40, 0x23, 0x0E, 0xA6, 0x23, 0x80]);
        data.extend([0, 0, 1, 0xB5]);
        // sequence extension: Main@Main, interlaced, 4:2:0, low_delay 0
        data.extend([0x14, 0x82, 0x00, 0x01, 0x00, 0x00]);
        data.extend([0, 0, 1, 0xB8]);
        // 10:20:30:05 closed
        data.extend([0x29, 0x4B, 0xC2, 0xC0]);
        data.extend([0, 0, 1, 0x00]);
        // temporal_reference 0, I picture, vbv_delay 0xFFFF
        data.extend([0x00, 0x0F, 0xFF, 0xF8]);
        data.extend([0, 0, 1, 0x01, 0x12, 0x34]);
        data.extend([0, 0, 1, 0x02, 0x56]);
        data
    }

    #[test]
    fn test_sequence_and_picture_headers() {
        let (info, errors) = parse_video(&sample());
        assert!(errors.is_empty(), "{:?}", errors);
        let seq = info.sequence_header().unwrap();
        assert_eq!((seq.horizontal_size, seq.vertical_size), (720, 576));
        assert_eq!(seq.aspect_ratio(), "4:3");
        assert_eq!(seq.frame_rate(), Some(25.0));
        assert_eq!(seq.bit_rate_value, 15000);
        assert_eq!(info.bit_rate(), Some(6_000_000));
        assert_eq!(info.dimensions(), Some((720, 576)));
        assert_eq!(info.slices, 2);

        let ext = info.units.iter().find_map(|u| match u {
            MpegVideoUnit::SequenceExtension(e) => Some(e),
            _ => None,
        });
        let ext = ext.unwrap();
        assert_eq!(ext.profile_name(), "Main");
        assert_eq!(ext.level_name(), "Main");
        assert_eq!(ext.chroma_name(), "4:2:0");

        let gop = info.units.iter().find_map(|u| match u {
            MpegVideoUnit::GroupOfPictures(g) => Some(g),
            _ => None,
        });
        let gop = gop.unwrap();
        assert_eq!(gop.time_code(), "10:20:30:05");
        assert!(gop.closed_gop);

        let pic = info.units.iter().find_map(|u| match u {
            MpegVideoUnit::Picture(p) => Some(p),
            _ => None,
        });
        assert_eq!(pic.unwrap().coding_type_name(), "I");
    }

    #[test]
    fn test_truncated_sequence_header_is_reported() {
        let (info, errors) = parse_video(&[0, 0, 1, 0xB3, 0x2D, 0x02]);
        assert!(info.units.is_empty());
        assert_eq!(errors.len(), 1);
    }
}
