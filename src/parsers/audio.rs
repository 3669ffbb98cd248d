//! Audio frame headers: MPEG-1/2 audio, ADTS and LATM AAC, AC-3 / E-AC-3

use serde::Serialize;

use super::utils::find_sync16;
use crate::bits::BitCursor;
use crate::error::{BitError, EsError};

const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Walks sync-delimited frames. `parse` returns a frame and its length in
/// bytes; bytes that do not start a frame are skipped up to the next sync.
fn walk_frames<F>(
    data: &[u8],
    mask: u16,
    sync: u16,
    mut parse: impl FnMut(usize, &[u8]) -> Result<(F, usize), EsError>,
) -> (Vec<F>, Vec<EsError>) {
    let mut frames = Vec::new();
    let mut errors = Vec::new();
    let mut pos = 0;
    while pos + 1 < data.len() {
        let Some(found) = find_sync16(data, pos, mask, sync) else {
            errors.push(EsError::BadSync {
                expected: sync as u32,
                found: u16::from_be_bytes([data[pos], data[pos + 1]]) as u32,
                offset: pos,
            });
            break;
        };
        if found != pos {
            errors.push(EsError::BadSync {
                expected: sync as u32,
                found: u16::from_be_bytes([data[pos], data[pos + 1]]) as u32,
                offset: pos,
            });
        }
        match parse(found, &data[found..]) {
            Ok((frame, len)) if len > 0 => {
                frames.push(frame);
                if found + len > data.len() {
                    errors.push(EsError::Overrun {
                        offset: found,
                        needed: len,
                        available: data.len() - found,
                    });
                    break;
                }
                pos = found + len;
            }
            Ok(_) => pos = found + 1,
            Err(e) => {
                errors.push(e);
                pos = found + 1;
            }
        }
    }
    (frames, errors)
}

fn header_error(kind: &str, offset: usize, e: BitError) -> EsError {
    EsError::Malformed(format!("{} header at offset {}: {}", kind, offset, e))
}

#[derive(Debug, Clone, Serialize)]
pub struct MpegAudioFrame {
    pub offset: usize,
    /// 1, 2 or 25 for MPEG-2.5.
    pub version: u8,
    pub layer: u8,
    pub crc_protected: bool,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: u8,
    pub frame_length: usize,
}

impl MpegAudioFrame {
    pub fn channel_mode_name(&self) -> &'static str {
        match self.channel_mode {
            0 => "stereo",
            1 => "joint stereo",
            2 => "dual channel",
            _ => "mono",
        }
    }

    pub fn channels(&self) -> u8 {
        if self.channel_mode == 3 { 1 } else { 2 }
    }
}

fn mpeg_audio_bitrate(version: u8, layer: u8, index: usize) -> u32 {
    const V1_L1: [u32; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
    const V1_L2: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
    const V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
    const V2_L1: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
    const V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];
    let table = match (version, layer) {
        (1, 1) => &V1_L1,
        (1, 2) => &V1_L2,
        (1, _) => &V1_L3,
        (_, 1) => &V2_L1,
        _ => &V2_L23,
    };
    table[index]
}

fn parse_mpeg_audio_header(offset: usize, data: &[u8]) -> Result<(MpegAudioFrame, usize), EsError> {
    let mut r = BitCursor::new(data);
    let header = |e| header_error("MPEG audio", offset, e);
    r.skip(11).map_err(header)?;
    let version = match r.read(2).map_err(header)? {
        0 => 25,
        2 => 2,
        3 => 1,
        _ => return Err(EsError::Malformed(format!("reserved MPEG audio version at offset {}", offset))),
    };
    let layer = match r.read(2).map_err(header)? {
        1 => 3,
        2 => 2,
        3 => 1,
        _ => return Err(EsError::Malformed(format!("reserved MPEG audio layer at offset {}", offset))),
    };
    let crc_protected = !r.read_bool().map_err(header)?;
    let bitrate_index = r.read(4).map_err(header)? as usize;
    let sr_index = r.read(2).map_err(header)? as usize;
    let padding = r.read_bool().map_err(header)?;
    r.skip(1).map_err(header)?;
    let channel_mode = r.read(2).map_err(header)? as u8;
    if bitrate_index == 15 || sr_index == 3 {
        return Err(EsError::Malformed(format!("invalid MPEG audio rate index at offset {}", offset)));
    }
    let base = [44100, 48000, 32000][sr_index];
    let sample_rate = match version {
        1 => base,
        2 => base / 2,
        _ => base / 4,
    };
    let bitrate_kbps = mpeg_audio_bitrate(version, layer, bitrate_index);
    let pad = padding as usize;
    // free format (index 0) has no computable length
    let frame_length = if bitrate_kbps == 0 {
        0
    } else {
        let bps = bitrate_kbps as usize * 1000;
        let sr = sample_rate as usize;
        match (layer, version) {
            (1, _) => (12 * bps / sr + pad) * 4,
            (3, 2 | 25) => 72 * bps / sr + pad,
            _ => 144 * bps / sr + pad,
        }
    };
    Ok((
        MpegAudioFrame {
            offset,
            version,
            layer,
            crc_protected,
            bitrate_kbps,
            sample_rate,
            padding,
            channel_mode,
            frame_length,
        },
        frame_length,
    ))
}

pub fn parse_mpeg_audio(data: &[u8]) -> (Vec<MpegAudioFrame>, Vec<EsError>) {
    walk_frames(data, 0xFFE0, 0xFFE0, parse_mpeg_audio_header)
}

#[derive(Debug, Clone, Serialize)]
pub struct AdtsFrame {
    pub offset: usize,
    pub mpeg2: bool,
    pub crc_protected: bool,
    /// audioObjectType - 1
    pub profile: u8,
    pub sample_rate: u32,
    pub channel_configuration: u8,
    pub frame_length: usize,
    pub buffer_fullness: u16,
    pub raw_data_blocks: u8,
}

impl AdtsFrame {
    pub fn profile_name(&self) -> &'static str {
        aac_object_type_name(self.profile + 1)
    }
}

pub fn aac_object_type_name(aot: u8) -> &'static str {
    match aot {
        1 => "Main",
        2 => "LC",
        3 => "SSR",
        4 => "LTP",
        5 => "SBR",
        29 => "PS",
        _ => "other",
    }
}

fn parse_adts_header(offset: usize, data: &[u8]) -> Result<(AdtsFrame, usize), EsError> {
    let mut r = BitCursor::new(data);
    let header = |e| header_error("ADTS", offset, e);
    r.skip(12).map_err(header)?;
    let mpeg2 = r.read_bool().map_err(header)?;
    r.skip(2).map_err(header)?; // layer
    let crc_protected = !r.read_bool().map_err(header)?;
    let profile = r.read(2).map_err(header)? as u8;
    let sf_index = r.read(4).map_err(header)? as usize;
    r.skip(1).map_err(header)?;
    let channel_configuration = r.read(3).map_err(header)? as u8;
    r.skip(4).map_err(header)?;
    let frame_length = r.read(13).map_err(header)? as usize;
    let buffer_fullness = r.read(11).map_err(header)? as u16;
    let raw_data_blocks = r.read(2).map_err(header)? as u8 + 1;
    let sample_rate = *AAC_SAMPLE_RATES
        .get(sf_index)
        .ok_or_else(|| EsError::Malformed(format!("ADTS sampling index {} at offset {}", sf_index, offset)))?;
    if frame_length < 7 {
        return Err(EsError::Malformed(format!("ADTS frame length {} at offset {}", frame_length, offset)));
    }
    Ok((
        AdtsFrame {
            offset,
            mpeg2,
            crc_protected,
            profile,
            sample_rate,
            channel_configuration,
            frame_length,
            buffer_fullness,
            raw_data_blocks,
        },
        frame_length,
    ))
}

pub fn parse_adts(data: &[u8]) -> (Vec<AdtsFrame>, Vec<EsError>) {
    walk_frames(data, 0xFFF6, 0xFFF0, parse_adts_header)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatmConfig {
    pub audio_mux_version: u8,
    pub num_sub_frames: u8,
    pub audio_object_type: u8,
    pub sample_rate: u32,
    pub channel_configuration: u8,
}

impl LatmConfig {
    pub fn profile_name(&self) -> &'static str {
        aac_object_type_name(self.audio_object_type)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LatmFrame {
    pub offset: usize,
    pub mux_length: usize,
    pub use_same_stream_mux: bool,
    /// Present when the frame carries a StreamMuxConfig for a single
    /// program and layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<LatmConfig>,
}

fn latm_get_value(r: &mut BitCursor<'_>) -> Result<u32, BitError> {
    let bytes = r.read(2)? + 1;
    r.read(8 * bytes)
}

fn parse_audio_specific_config(r: &mut BitCursor<'_>) -> Result<(u8, u32, u8), BitError> {
    let mut aot = r.read(5)? as u8;
    if aot == 31 {
        aot = 32 + r.read(6)? as u8;
    }
    let sf_index = r.read(4)? as usize;
    let sample_rate = if sf_index == 15 {
        r.read(24)?
    } else {
        AAC_SAMPLE_RATES.get(sf_index).copied().unwrap_or(0)
    };
    let channels = r.read(4)? as u8;
    Ok((aot, sample_rate, channels))
}

fn parse_stream_mux_config(r: &mut BitCursor<'_>) -> Result<Option<LatmConfig>, BitError> {
    let audio_mux_version = r.read(1)? as u8;
    let version_a = if audio_mux_version == 1 { r.read(1)? } else { 0 };
    if version_a != 0 {
        return Ok(None);
    }
    if audio_mux_version == 1 {
        latm_get_value(r)?; // taraBufferFullness
    }
    r.skip(1)?; // allStreamsSameTimeFraming
    let num_sub_frames = r.read(6)? as u8 + 1;
    let num_program = r.read(4)?;
    let num_layer = r.read(3)?;
    if num_program != 0 || num_layer != 0 {
        return Ok(None);
    }
    if audio_mux_version == 1 {
        latm_get_value(r)?; // ascLen
    }
    let (audio_object_type, sample_rate, channel_configuration) = parse_audio_specific_config(r)?;
    Ok(Some(LatmConfig {
        audio_mux_version,
        num_sub_frames,
        audio_object_type,
        sample_rate,
        channel_configuration,
    }))
}

fn parse_latm_header(offset: usize, data: &[u8]) -> Result<(LatmFrame, usize), EsError> {
    let mut r = BitCursor::new(data);
    let header = |e| header_error("LATM", offset, e);
    r.skip(11).map_err(header)?;
    let mux_length = r.read(13).map_err(header)? as usize;
    let use_same_stream_mux = r.read_bool().map_err(header)?;
    let config = if use_same_stream_mux {
        None
    } else {
        parse_stream_mux_config(&mut r).map_err(header)?
    };
    Ok((
        LatmFrame {
            offset,
            mux_length,
            use_same_stream_mux,
            config,
        },
        3 + mux_length,
    ))
}

pub fn parse_latm(data: &[u8]) -> (Vec<LatmFrame>, Vec<EsError>) {
    walk_frames(data, 0xFFE0, 0x2B7 << 5, parse_latm_header)
}

#[derive(Debug, Clone, Serialize)]
pub struct Ac3Frame {
    pub offset: usize,
    pub enhanced: bool,
    pub bsid: u8,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    pub acmod: u8,
    pub lfe: bool,
    pub frame_bytes: usize,
}

impl Ac3Frame {
    pub fn channels(&self) -> u8 {
        [2, 1, 2, 3, 3, 4, 4, 5][self.acmod as usize & 7] + self.lfe as u8
    }

    pub fn codec_name(&self) -> &'static str {
        if self.enhanced { "E-AC-3" } else { "AC-3" }
    }
}

const AC3_BITRATES: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];

fn parse_ac3_header(offset: usize, data: &[u8]) -> Result<(Ac3Frame, usize), EsError> {
    let header = |e| header_error("AC-3", offset, e);
    let bsid = data
        .get(5)
        .map(|b| b >> 3)
        .ok_or_else(|| EsError::Overrun { offset, needed: 6, available: data.len() })?;
    let mut r = BitCursor::new(data);
    r.skip(16).map_err(header)?;
    if bsid > 10 {
        let _strmtyp = r.read(2).map_err(header)?;
        let _substreamid = r.read(3).map_err(header)?;
        let frmsiz = r.read(11).map_err(header)? as usize;
        let fscod = r.read(2).map_err(header)?;
        let sample_rate = if fscod == 3 {
            [24000, 22050, 16000, 0][r.read(2).map_err(header)? as usize]
        } else {
            r.skip(2).map_err(header)?; // numblkscod
            [48000, 44100, 32000][fscod as usize]
        };
        let acmod = r.read(3).map_err(header)? as u8;
        let lfe = r.read_bool().map_err(header)?;
        let frame_bytes = (frmsiz + 1) * 2;
        return Ok((
            Ac3Frame {
                offset,
                enhanced: true,
                bsid,
                sample_rate,
                bitrate_kbps: None,
                acmod,
                lfe,
                frame_bytes,
            },
            frame_bytes,
        ));
    }

    r.skip(16).map_err(header)?; // crc1
    let fscod = r.read(2).map_err(header)? as usize;
    let frmsizecod = r.read(6).map_err(header)? as usize;
    if fscod == 3 || frmsizecod >= 38 {
        return Err(EsError::Malformed(format!(
            "AC-3 fscod {} frmsizecod {} at offset {}",
            fscod, frmsizecod, offset
        )));
    }
    r.skip(5 + 3).map_err(header)?; // bsid, bsmod
    let acmod = r.read(3).map_err(header)? as u8;
    if acmod & 1 != 0 && acmod != 1 {
        r.skip(2).map_err(header)?;
    }
    if acmod & 4 != 0 {
        r.skip(2).map_err(header)?;
    }
    if acmod == 2 {
        r.skip(2).map_err(header)?;
    }
    let lfe = r.read_bool().map_err(header)?;
    let kbps = AC3_BITRATES[frmsizecod / 2];
    let sample_rate = [48000, 44100, 32000][fscod];
    let mut words = kbps as usize * 96000 / sample_rate as usize;
    if fscod == 1 {
        words += frmsizecod & 1;
    }
    Ok((
        Ac3Frame {
            offset,
            enhanced: false,
            bsid,
            sample_rate,
            bitrate_kbps: Some(kbps),
            acmod,
            lfe,
            frame_bytes: words * 2,
        },
        words * 2,
    ))
}

pub fn parse_ac3(data: &[u8]) -> (Vec<Ac3Frame>, Vec<EsError>) {
    walk_frames(data, 0xFFFF, 0x0B77, parse_ac3_header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp2_frame() -> Vec<u8> {
        // MPEG-1 layer II, no CRC, 192 kbps, 48 kHz, stereo: 576 bytes
        let mut f = vec![0xFF, 0xFD, 0xA4, 0x00];
        f.resize(576, 0x55);
        f
    }

    #[test]
    fn test_mpeg_audio_frames_chain() {
        let mut data = mp2_frame();
        data.extend(mp2_frame());
        let (frames, errors) = parse_mpeg_audio(&data);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].offset, 576);
        assert_eq!(frames[0].layer, 2);
        assert_eq!(frames[0].bitrate_kbps, 192);
        assert_eq!(frames[0].sample_rate, 48000);
        assert_eq!(frames[0].channel_mode_name(), "stereo");
    }

    #[test]
    fn test_mpeg_audio_resync_after_junk() {
        let mut data = vec![0x12, 0x34, 0x56];
        data.extend(mp2_frame());
        let (frames, errors) = parse_mpeg_audio(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].offset, 3);
        assert!(matches!(errors[0], EsError::BadSync { offset: 0, .. }));
    }

    #[test]
    fn test_adts_header() {
        // LC, 48 kHz, 2 channels, 9-byte frame
        let frame = [0xFF, 0xF1, 0x4C, 0x80, 0x01, 0x3F, 0xFC, 0xAA, 0xBB];
        let (frames, errors) = parse_adts(&frame);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(frames[0].profile_name(), "LC");
        assert_eq!(frames[0].sample_rate, 48000);
        assert_eq!(frames[0].channel_configuration, 2);
        assert_eq!(frames[0].frame_length, 9);
        assert!(!frames[0].crc_protected);
    }

    #[test]
    fn test_latm_stream_mux_config() {
        // sync 0x2B7, length 4, useSame 0, version 0, allSame 1, subframes 0,
        // program 0, layer 0, AOT 2, index 3 (48 kHz), channels 2
        let data = [0x56, 0xE0, 0x04, 0x20, 0x00, 0x11, 0x90];
        let (frames, errors) = parse_latm(&data);
        assert!(errors.is_empty(), "{:?}", errors);
        let config = frames[0].config.as_ref().unwrap();
        assert_eq!(config.profile_name(), "LC");
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.channel_configuration, 2);
        assert_eq!(config.num_sub_frames, 1);
    }

    #[test]
    fn test_ac3_frame_size() {
        // 48 kHz, frmsizecod 30 (448 kbps), bsid 8, acmod 7 + cmixlev + surmixlev, LFE on
        let mut frame = vec![0x0B, 0x77, 0x00, 0x00, 0x1E, 0x40, 0b1110_0001];
        frame.resize(1792, 0);
        let (frames, errors) = parse_ac3(&frame);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(frames[0].frame_bytes, 1792);
        assert_eq!(frames[0].bitrate_kbps, Some(448));
        assert_eq!(frames[0].channels(), 6);
        assert_eq!(frames[0].codec_name(), "AC-3");
    }

    #[test]
    fn test_eac3_frame() {
        // strmtyp 0, substream 0, frmsiz 0x17F (768 bytes), 48 kHz, 6 blocks,
        // acmod 2, no LFE, bsid 16
        let mut frame = vec![0x0B, 0x77, 0x01, 0x7F, 0x34, 0x80];
        frame.resize(768, 0);
        let (frames, errors) = parse_ac3(&frame);
        assert!(errors.is_empty(), "{:?}", errors);
        assert!(frames[0].enhanced);
        assert_eq!(frames[0].bsid, 16);
        assert_eq!(frames[0].frame_bytes, 768);
        assert_eq!(frames[0].channels(), 2);
    }
}
