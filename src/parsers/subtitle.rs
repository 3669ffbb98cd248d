//! DVB subtitling segments (ETSI EN 300 743)

use serde::Serialize;

use crate::bits::BitCursor;
use crate::error::{BitError, EsError};

pub const DATA_IDENTIFIER: u8 = 0x20;
const SYNC_BYTE: u8 = 0x0F;
const END_OF_PES_DATA: u8 = 0xFF;

#[derive(Debug, Clone, Serialize)]
pub struct SubtitlePes {
    pub subtitle_stream_id: u8,
    pub segments: Vec<SubtitleSegment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubtitleSegment {
    pub offset: usize,
    pub segment_type: u8,
    pub page_id: u16,
    pub length: usize,
    pub body: SegmentBody,
}

impl SubtitleSegment {
    pub fn type_name(&self) -> &'static str {
        segment_type_name(self.segment_type)
    }
}

pub fn segment_type_name(t: u8) -> &'static str {
    match t {
        0x10 => "page composition",
        0x11 => "region composition",
        0x12 => "CLUT definition",
        0x13 => "object data",
        0x14 => "display definition",
        0x15 => "disparity signalling",
        0x16 => "alternative CLUT",
        0x80 => "end of display set",
        0xFF => "stuffing",
        _ => "reserved",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum SegmentBody {
    PageComposition {
        page_time_out: u8,
        page_version: u8,
        page_state: u8,
        regions: Vec<PageRegion>,
    },
    RegionComposition(RegionComposition),
    ClutDefinition {
        clut_id: u8,
        version: u8,
        entries: Vec<ClutEntry>,
    },
    ObjectData(ObjectData),
    DisplayDefinition {
        version: u8,
        width: u16,
        height: u16,
        /// (min x, max x, min y, max y)
        #[serde(skip_serializing_if = "Option::is_none")]
        window: Option<[u16; 4]>,
    },
    EndOfDisplaySet,
    Other,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageRegion {
    pub region_id: u8,
    pub horizontal_address: u16,
    pub vertical_address: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionComposition {
    pub region_id: u8,
    pub version: u8,
    pub fill: bool,
    pub width: u16,
    pub height: u16,
    pub level_of_compatibility: u8,
    pub depth: u8,
    pub clut_id: u8,
    pub objects: Vec<RegionObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionObject {
    pub object_id: u16,
    pub object_type: u8,
    pub provider_flag: u8,
    pub horizontal_position: u16,
    pub vertical_position: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colours: Option<(u8, u8)>,
}

/// A CLUT entry. Values are normalised to 8 bits when sent in reduced range.
#[derive(Debug, Clone, Serialize)]
pub struct ClutEntry {
    pub entry_id: u8,
    pub flags: u8,
    pub y: u8,
    pub cr: u8,
    pub cb: u8,
    pub t: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectData {
    pub object_id: u16,
    pub version: u8,
    pub coding_method: u8,
    pub non_modifying_colour: bool,
    /// Pixel data lengths for coding_method 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_lengths: Option<(u16, u16)>,
    /// Character codes for coding_method 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn parse_body(segment_type: u8, body: &[u8]) -> Result<SegmentBody, BitError> {
    let mut r = BitCursor::new(body);
    Ok(match segment_type {
        0x10 => {
            let page_time_out = r.read_u8()?;
            let page_version = r.read(4)? as u8;
            let page_state = r.read(2)? as u8;
            r.skip(2)?;
            let mut regions = Vec::new();
            while r.bytes_remaining() >= 6 {
                let region_id = r.read_u8()?;
                r.skip(8)?;
                regions.push(PageRegion {
                    region_id,
                    horizontal_address: r.read_u16()?,
                    vertical_address: r.read_u16()?,
                });
            }
            SegmentBody::PageComposition {
                page_time_out,
                page_version,
                page_state,
                regions,
            }
        }
        0x11 => {
            let region_id = r.read_u8()?;
            let version = r.read(4)? as u8;
            let fill = r.read_bool()?;
            r.skip(3)?;
            let width = r.read_u16()?;
            let height = r.read_u16()?;
            let level_of_compatibility = r.read(3)? as u8;
            let depth = r.read(3)? as u8;
            r.skip(2)?;
            let clut_id = r.read_u8()?;
            r.skip(16)?; // pixel codes
            let mut objects = Vec::new();
            while r.bytes_remaining() >= 6 {
                let object_id = r.read_u16()?;
                let object_type = r.read(2)? as u8;
                let provider_flag = r.read(2)? as u8;
                let horizontal_position = r.read(12)? as u16;
                r.skip(4)?;
                let vertical_position = r.read(12)? as u16;
                let colours = if object_type == 1 || object_type == 2 {
                    Some((r.read_u8()?, r.read_u8()?))
                } else {
                    None
                };
                objects.push(RegionObject {
                    object_id,
                    object_type,
                    provider_flag,
                    horizontal_position,
                    vertical_position,
                    colours,
                });
            }
            SegmentBody::RegionComposition(RegionComposition {
                region_id,
                version,
                fill,
                width,
                height,
                level_of_compatibility,
                depth,
                clut_id,
                objects,
            })
        }
        0x12 => {
            let clut_id = r.read_u8()?;
            let version = r.read(4)? as u8;
            r.skip(4)?;
            let mut entries = Vec::new();
            while r.bytes_remaining() >= 4 {
                let entry_id = r.read_u8()?;
                let flags = r.read(3)? as u8;
                r.skip(4)?;
                let full_range = r.read_bool()?;
                let (y, cr, cb, t) = if full_range {
                    (r.read_u8()?, r.read_u8()?, r.read_u8()?, r.read_u8()?)
                } else {
                    (
                        (r.read(6)? << 2) as u8,
                        (r.read(4)? << 4) as u8,
                        (r.read(4)? << 4) as u8,
                        (r.read(2)? << 6) as u8,
                    )
                };
                entries.push(ClutEntry {
                    entry_id,
                    flags,
                    y,
                    cr,
                    cb,
                    t,
                });
            }
            SegmentBody::ClutDefinition {
                clut_id,
                version,
                entries,
            }
        }
        0x13 => {
            let object_id = r.read_u16()?;
            let version = r.read(4)? as u8;
            let coding_method = r.read(2)? as u8;
            let non_modifying_colour = r.read_bool()?;
            r.skip(1)?;
            let (field_lengths, text) = match coding_method {
                0 => (Some((r.read_u16()?, r.read_u16()?)), None),
                1 => {
                    let count = r.read_u8()?;
                    let mut units = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        units.push(r.read_u16()?);
                    }
                    (None, Some(String::from_utf16_lossy(&units)))
                }
                _ => (None, None),
            };
            SegmentBody::ObjectData(ObjectData {
                object_id,
                version,
                coding_method,
                non_modifying_colour,
                field_lengths,
                text,
            })
        }
        0x14 => {
            let version = r.read(4)? as u8;
            let has_window = r.read_bool()?;
            r.skip(3)?;
            let width = r.read_u16()? + 1;
            let height = r.read_u16()? + 1;
            let window = if has_window {
                Some([r.read_u16()?, r.read_u16()?, r.read_u16()?, r.read_u16()?])
            } else {
                None
            };
            SegmentBody::DisplayDefinition {
                version,
                width,
                height,
                window,
            }
        }
        0x80 => SegmentBody::EndOfDisplaySet,
        _ => SegmentBody::Other,
    })
}

/// Parses the PES data field of a subtitling stream.
pub fn parse_subtitles(data: &[u8]) -> (Option<SubtitlePes>, Vec<EsError>) {
    let mut errors = Vec::new();
    if data.len() < 2 {
        errors.push(EsError::Overrun {
            offset: 0,
            needed: 2,
            available: data.len(),
        });
        return (None, errors);
    }
    if data[0] != DATA_IDENTIFIER {
        errors.push(EsError::BadSync {
            expected: DATA_IDENTIFIER as u32,
            found: data[0] as u32,
            offset: 0,
        });
        return (None, errors);
    }
    let mut pes = SubtitlePes {
        subtitle_stream_id: data[1],
        segments: Vec::new(),
    };
    let mut pos = 2;
    while pos < data.len() {
        match data[pos] {
            SYNC_BYTE => {}
            END_OF_PES_DATA => break,
            other => {
                errors.push(EsError::BadSync {
                    expected: SYNC_BYTE as u32,
                    found: other as u32,
                    offset: pos,
                });
                break;
            }
        }
        if pos + 6 > data.len() {
            errors.push(EsError::Overrun {
                offset: pos,
                needed: 6,
                available: data.len() - pos,
            });
            break;
        }
        let segment_type = data[pos + 1];
        let page_id = u16::from_be_bytes([data[pos + 2], data[pos + 3]]);
        let length = u16::from_be_bytes([data[pos + 4], data[pos + 5]]) as usize;
        let start = pos + 6;
        if start + length > data.len() {
            errors.push(EsError::Overrun {
                offset: pos,
                needed: length,
                available: data.len() - start,
            });
            break;
        }
        match parse_body(segment_type, &data[start..start + length]) {
            Ok(body) => pes.segments.push(SubtitleSegment {
                offset: pos,
                segment_type,
                page_id,
                length,
                body,
            }),
            Err(e) => errors.push(EsError::Malformed(format!(
                "{} segment at offset {}: {}",
                segment_type_name(segment_type),
                pos,
                e
            ))),
        }
        pos = start + length;
    }
    (Some(pes), errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(segment_type: u8, page_id: u16, body: &[u8]) -> Vec<u8> {
        let mut out = vec![SYNC_BYTE, segment_type];
        out.extend(page_id.to_be_bytes());
        out.extend((body.len() as u16).to_be_bytes());
        out.extend(body);
        out
    }

    #[test]
    fn test_display_set() {
        let mut data = vec![0x20, 0x00];
        data.extend(segment(0x14, 1, &[0x00, 0x07, 0x7F, 0x04, 0x37]));
        data.extend(segment(0x10, 1, &[0x0F, 0x14, 0x00, 0x00, 0x01, 0x68, 0x01, 0xE0]));
        data.extend(segment(0x12, 1, &[0x00, 0x00, 0x01, 0x1F, 0x10, 0x80, 0x80, 0x00, 0x02, 0x20, 0xFE, 0x21]));
        data.extend(segment(0x80, 1, &[]));
        data.push(0xFF);

        let (pes, errors) = parse_subtitles(&data);
        assert!(errors.is_empty(), "{:?}", errors);
        let pes = pes.unwrap();
        assert_eq!(pes.segments.len(), 4);
        match &pes.segments[0].body {
            SegmentBody::DisplayDefinition { width, height, window, .. } => {
                assert_eq!((*width, *height), (1920, 1080));
                assert!(window.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        match &pes.segments[1].body {
            SegmentBody::PageComposition { page_time_out, page_version, page_state, regions } => {
                assert_eq!(*page_time_out, 15);
                assert_eq!(*page_version, 1);
                assert_eq!(*page_state, 1);
                assert_eq!(regions[0].horizontal_address, 360);
                assert_eq!(regions[0].vertical_address, 480);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &pes.segments[2].body {
            SegmentBody::ClutDefinition { entries, .. } => {
                assert_eq!(entries.len(), 2);
                assert_eq!((entries[0].y, entries[0].cr, entries[0].t), (0x10, 0x80, 0x00));
                // reduced range: Y 63 -> 0xFC, Cr 8 -> 0x80, Cb 8 -> 0x80, T 1 -> 0x40
                assert_eq!((entries[1].y, entries[1].cr, entries[1].cb, entries[1].t), (0xFC, 0x80, 0x80, 0x40));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(pes.segments[3].type_name(), "end of display set");
    }

    #[test]
    fn test_bad_sync_stops_parsing() {
        let mut data = vec![0x20, 0x00];
        data.extend(segment(0x80, 1, &[]));
        data.extend([0x0E, 0x10]);
        let (pes, errors) = parse_subtitles(&data);
        assert_eq!(pes.unwrap().segments.len(), 1);
        assert!(matches!(errors[0], EsError::BadSync { expected: 0x0F, found: 0x0E, offset: 8 }));
    }

    #[test]
    fn test_segment_overrun() {
        let mut data = vec![0x20, 0x00, 0x0F, 0x13, 0x00, 0x01, 0x00, 0x20];
        data.extend([0u8; 4]);
        let (_, errors) = parse_subtitles(&data);
        assert!(matches!(errors[0], EsError::Overrun { offset: 2, needed: 32, available: 4 }));
    }

    #[test]
    fn test_wrong_data_identifier() {
        let (pes, errors) = parse_subtitles(&[0x10, 0x00]);
        assert!(pes.is_none());
        assert_eq!(errors.len(), 1);
    }
}
