//! Elementary-stream decoders
//!
//! The decoder for a PID is chosen from its PMT stream_type and ES
//! descriptors. Each one parses the compressed-domain syntax of a PES
//! payload; unparsable units are recorded as errors on the PES packet and
//! skipped.

pub mod ancillary;
pub mod audio;
pub mod avc;
pub mod hevc;
pub mod subtitle;
pub mod teletext;
pub mod ttml;
mod utils;
pub mod video;

use serde::Serialize;

use crate::descriptors::{DescriptorKind, ExtensionKind};
use crate::pes::PesPacket;
use crate::psi::EsInfo;

pub use utils::{split_annex_b, start_codes};

/// Decoded content of one PES packet.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "codec", content = "units")]
pub enum EsContent {
    Avc(Vec<avc::AvcNal>),
    Hevc(Vec<hevc::HevcNal>),
    MpegVideo(video::MpegVideoInfo),
    MpegAudio(Vec<audio::MpegAudioFrame>),
    Adts(Vec<audio::AdtsFrame>),
    Latm(Vec<audio::LatmFrame>),
    Ac3(Vec<audio::Ac3Frame>),
    Subtitles(subtitle::SubtitlePes),
    Teletext(teletext::TeletextPes),
    Ttml(ttml::TtmlPes),
    Ancillary(Vec<ancillary::AncillaryPacket>),
}

impl EsContent {
    /// Short description used by reports, e.g. "H.264 High 1920x1080".
    pub fn summary(&self) -> Option<String> {
        match self {
            EsContent::Avc(nals) => nals.iter().find_map(|n| match &n.content {
                Some(avc::AvcNalContent::Sps(s)) => {
                    Some(format!("H.264 {} {}x{}", s.profile_name(), s.width, s.height))
                }
                _ => None,
            }),
            EsContent::Hevc(nals) => nals.iter().find_map(|n| match &n.content {
                Some(hevc::HevcNalContent::Sps(s)) => Some(format!(
                    "H.265 {} {}x{}",
                    s.profile_tier_level.profile_name(),
                    s.width,
                    s.height
                )),
                _ => None,
            }),
            EsContent::MpegVideo(info) => info
                .dimensions()
                .map(|(w, h)| format!("MPEG-2 video {}x{}", w, h)),
            EsContent::MpegAudio(frames) => frames.first().map(|f| {
                format!(
                    "MPEG-{} layer {} {} kbit/s {} Hz",
                    if f.version == 25 { "2.5".to_string() } else { f.version.to_string() },
                    f.layer,
                    f.bitrate_kbps,
                    f.sample_rate
                )
            }),
            EsContent::Adts(frames) => frames
                .first()
                .map(|f| format!("AAC {} {} Hz {} ch", f.profile_name(), f.sample_rate, f.channel_configuration)),
            EsContent::Latm(frames) => frames.iter().find_map(|f| f.config.as_ref()).map(|c| {
                format!("AAC LATM {} {} Hz {} ch", c.profile_name(), c.sample_rate, c.channel_configuration)
            }),
            EsContent::Ac3(frames) => frames
                .first()
                .map(|f| format!("{} {} Hz {} ch", f.codec_name(), f.sample_rate, f.channels())),
            EsContent::Subtitles(s) => Some(format!("DVB subtitles, {} segments", s.segments.len())),
            EsContent::Teletext(t) => Some(format!("teletext, {} data units", t.units.len())),
            EsContent::Ttml(t) => Some(format!("TTML subtitles, {} segments", t.segments.len())),
            EsContent::Ancillary(p) => Some(format!("SMPTE 2038, {} packets", p.len())),
        }
    }
}

/// Decoder families selectable for a PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EsCodec {
    Avc,
    Hevc,
    MpegVideo,
    MpegAudio,
    Adts,
    Latm,
    Ac3,
    Subtitles,
    Teletext,
    Ttml,
    Ancillary,
}

/// Chooses a decoder from the stream_type and, for private PES (0x06),
/// the ES descriptors.
pub fn select_codec(stream_type: u8, es: Option<&EsInfo>) -> Option<EsCodec> {
    match stream_type {
        0x01 | 0x02 => return Some(EsCodec::MpegVideo),
        0x03 | 0x04 => return Some(EsCodec::MpegAudio),
        0x0F => return Some(EsCodec::Adts),
        0x11 => return Some(EsCodec::Latm),
        0x1B => return Some(EsCodec::Avc),
        0x24 => return Some(EsCodec::Hevc),
        0x81 | 0x87 => return Some(EsCodec::Ac3),
        0x06 => {}
        _ => return None,
    }
    let es = es?;
    es.descriptors.iter().find_map(|d| match &d.kind {
        DescriptorKind::Subtitling(_) => Some(EsCodec::Subtitles),
        DescriptorKind::Teletext(_) | DescriptorKind::VbiTeletext(_) => Some(EsCodec::Teletext),
        DescriptorKind::Ac3(_) | DescriptorKind::EnhancedAc3(_) => Some(EsCodec::Ac3),
        DescriptorKind::Extension(ext) => match ext.kind {
            ExtensionKind::TtmlSubtitling(_) => Some(EsCodec::Ttml),
            _ => None,
        },
        DescriptorKind::Registration(reg) => match reg.fourcc().as_deref() {
            Some("VANC") => Some(EsCodec::Ancillary),
            Some("AC-3") => Some(EsCodec::Ac3),
            Some("HEVC") => Some(EsCodec::Hevc),
            _ => None,
        },
        _ => None,
    })
}

/// Per-PID decoder; teletext keeps pages open across PES packets.
#[derive(Debug)]
pub struct EsDecoder {
    codec: EsCodec,
    teletext: Option<teletext::TeletextState>,
}

fn errors_to_strings(errors: Vec<crate::error::EsError>) -> Vec<String> {
    errors.into_iter().map(|e| e.to_string()).collect()
}

impl EsDecoder {
    pub fn new(codec: EsCodec) -> Self {
        Self {
            codec,
            teletext: (codec == EsCodec::Teletext).then(teletext::TeletextState::new),
        }
    }

    pub fn codec(&self) -> EsCodec {
        self.codec
    }

    /// Decodes the payload of `pes` into its `content` and `es_errors`.
    pub fn decode(&mut self, pes: &mut PesPacket) {
        let payload = pes.payload();
        let data = &payload[..];
        let (content, errors) = match self.codec {
            EsCodec::Avc => {
                let (nals, e) = avc::parse_nal_units(data);
                (Some(EsContent::Avc(nals)), e)
            }
            EsCodec::Hevc => {
                let (nals, e) = hevc::parse_nal_units(data);
                (Some(EsContent::Hevc(nals)), e)
            }
            EsCodec::MpegVideo => {
                let (info, e) = video::parse_video(data);
                (Some(EsContent::MpegVideo(info)), e)
            }
            EsCodec::MpegAudio => {
                let (frames, e) = audio::parse_mpeg_audio(data);
                (Some(EsContent::MpegAudio(frames)), e)
            }
            EsCodec::Adts => {
                let (frames, e) = audio::parse_adts(data);
                (Some(EsContent::Adts(frames)), e)
            }
            EsCodec::Latm => {
                let (frames, e) = audio::parse_latm(data);
                (Some(EsContent::Latm(frames)), e)
            }
            EsCodec::Ac3 => {
                let (frames, e) = audio::parse_ac3(data);
                (Some(EsContent::Ac3(frames)), e)
            }
            EsCodec::Subtitles => {
                let (s, e) = subtitle::parse_subtitles(data);
                (s.map(EsContent::Subtitles), e)
            }
            EsCodec::Ttml => {
                let (t, e) = ttml::parse_ttml(data);
                (t.map(EsContent::Ttml), e)
            }
            EsCodec::Ancillary => {
                let (p, e) = ancillary::parse_ancillary(data);
                (Some(EsContent::Ancillary(p)), e)
            }
            EsCodec::Teletext => {
                let state = self.teletext.get_or_insert_with(teletext::TeletextState::new);
                let (t, e) = state.decode(data);
                (t.map(EsContent::Teletext), e)
            }
        };
        pes.content = content;
        pes.es_errors = errors_to_strings(errors);
    }

    /// Closes state that spans PES packets; pages still open are attached
    /// to the last packet of the PID.
    pub fn finish(&mut self, last: Option<&mut PesPacket>) {
        let Some(state) = self.teletext.as_mut() else {
            return;
        };
        let pages = state.flush();
        if pages.is_empty() {
            return;
        }
        if let Some(pes) = last {
            match pes.content.as_mut() {
                Some(EsContent::Teletext(t)) => t.pages.extend(pages),
                _ => {
                    pes.content = Some(EsContent::Teletext(teletext::TeletextPes {
                        pages,
                        ..Default::default()
                    }))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::descriptors::{decode_loop, DecodeEnv, TableKind};
    use crate::psi::store::NoTables;

    fn es(stream_type: u8, descriptors: &[u8]) -> EsInfo {
        let env = DecodeEnv::new(TableKind::Pmt, &NoTables, Default::default(), None);
        EsInfo {
            stream_type,
            elementary_pid: 0x100,
            descriptors: decode_loop(&Bytes::copy_from_slice(descriptors), &env),
        }
    }

    #[test]
    fn test_select_by_stream_type() {
        assert_eq!(select_codec(0x1B, None), Some(EsCodec::Avc));
        assert_eq!(select_codec(0x24, None), Some(EsCodec::Hevc));
        assert_eq!(select_codec(0x0F, None), Some(EsCodec::Adts));
        assert_eq!(select_codec(0x05, None), None);
        assert_eq!(select_codec(0x06, None), None);
    }

    #[test]
    fn test_select_private_pes_by_descriptor() {
        let subs = es(0x06, &[0x59, 0x08, b'e', b'n', b'g', 0x10, 0x00, 0x01, 0x00, 0x01]);
        assert_eq!(select_codec(0x06, Some(&subs)), Some(EsCodec::Subtitles));
        let ttx = es(0x06, &[0x56, 0x05, b'e', b'n', b'g', 0x09, 0x88]);
        assert_eq!(select_codec(0x06, Some(&ttx)), Some(EsCodec::Teletext));
        let vanc = es(0x06, &[0x05, 0x04, b'V', b'A', b'N', b'C']);
        assert_eq!(select_codec(0x06, Some(&vanc)), Some(EsCodec::Ancillary));
        let ac3 = es(0x06, &[0x6A, 0x01, 0x00]);
        assert_eq!(select_codec(0x06, Some(&ac3)), Some(EsCodec::Ac3));
    }
}
