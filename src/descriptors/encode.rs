//! Re-serialization of fixed-layout descriptor bodies.
//!
//! Only layouts where every bit is kept in the decoded form are covered;
//! anything with reserved bits, derived units or decoded text returns `None`.

use std::io;

use super::DescriptorKind;
use crate::bits::BitWriter;

impl DescriptorKind {
    pub fn encode_body(&self) -> Option<Vec<u8>> {
        let mut w = BitWriter::new();
        let written = match self {
            DescriptorKind::StreamIdentifier(d) => w.write(8, d.component_tag as u32),
            DescriptorKind::DataStreamAlignment(d) => w.write(8, d.alignment_type as u32),
            DescriptorKind::PrivateDataSpecifier(d) => w.write(32, d.specifier),
            DescriptorKind::PrivateDataIndicator(d) => w.write(32, d.private_data_indicator),
            DescriptorKind::Registration(d) => {
                w.write(32, d.format_identifier).and_then(|_| w.write_bytes(&d.additional_info))
            }
            DescriptorKind::CarouselIdentifier(d) => {
                w.write(32, d.carousel_id).and_then(|_| w.write_bytes(&d.private_data))
            }
            DescriptorKind::Mpeg4Video(d) => w.write(8, d.visual_profile_and_level as u32),
            DescriptorKind::Mpeg4Audio(d) => w.write(8, d.audio_profile_and_level as u32),
            DescriptorKind::Mpeg2AacAudio(d) => w
                .write(8, d.profile as u32)
                .and_then(|_| w.write(8, d.channel_configuration as u32))
                .and_then(|_| w.write(8, d.additional_information as u32)),
            DescriptorKind::Iso639Language(d) => d.entries.iter().try_for_each(|e| {
                write_lang(&mut w, &e.language)?;
                w.write(8, e.audio_type as u32)
            }),
            DescriptorKind::CaIdentifier(d) => d.ca_system_ids.iter().try_for_each(|id| w.write(16, *id as u32)),
            DescriptorKind::ServiceList(d) => d.services.iter().try_for_each(|s| {
                w.write(16, s.service_id as u32)?;
                w.write(8, s.service_type as u32)
            }),
            DescriptorKind::Subtitling(d) => d.entries.iter().try_for_each(|e| {
                write_lang(&mut w, &e.language)?;
                w.write(8, e.subtitling_type as u32)?;
                w.write(16, e.composition_page_id as u32)?;
                w.write(16, e.ancillary_page_id as u32)
            }),
            DescriptorKind::Teletext(d) | DescriptorKind::VbiTeletext(d) => d.entries.iter().try_for_each(|e| {
                write_lang(&mut w, &e.language)?;
                w.write(5, e.teletext_type as u32)?;
                w.write(3, e.magazine_number as u32)?;
                w.write(8, e.page_number as u32)
            }),
            DescriptorKind::Content(d) => d.entries.iter().try_for_each(|e| {
                w.write(4, e.level_1 as u32)?;
                w.write(4, e.level_2 as u32)?;
                w.write(8, e.user_byte as u32)
            }),
            DescriptorKind::ParentalRating(d) => d.entries.iter().try_for_each(|e| {
                write_lang(&mut w, &e.country)?;
                w.write(8, e.rating as u32)
            }),
            DescriptorKind::TimeShiftedService(d) => w.write(16, d.reference_service_id as u32),
            DescriptorKind::TimeShiftedEvent(d) => w
                .write(16, d.reference_service_id as u32)
                .and_then(|_| w.write(16, d.reference_event_id as u32)),
            DescriptorKind::NvodReference(d) => d.references.iter().try_for_each(|t| {
                w.write(16, t.transport_stream_id as u32)?;
                w.write(16, t.original_network_id as u32)?;
                w.write(16, t.service_id as u32)
            }),
            DescriptorKind::ServiceMove(d) => w
                .write(16, d.new_original_network_id as u32)
                .and_then(|_| w.write(16, d.new_transport_stream_id as u32))
                .and_then(|_| w.write(16, d.new_service_id as u32)),
            DescriptorKind::Scrambling(d) => w.write(8, d.scrambling_mode as u32),
            DescriptorKind::AncillaryData(d) => w.write(8, d.ancillary_data_identifier as u32),
            DescriptorKind::AdaptationFieldData(d) => w.write(8, d.identifier as u32),
            DescriptorKind::DataBroadcastId(d) => {
                w.write(16, d.data_broadcast_id as u32).and_then(|_| w.write_bytes(&d.id_selector))
            }
            _ => return None,
        };
        written.ok()?;
        w.finish().ok()
    }
}

fn write_lang(w: &mut BitWriter, code: &str) -> io::Result<()> {
    let bytes: Vec<u8> = code.chars().map(|c| c as u32 as u8).collect();
    if bytes.len() != 3 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "language code must be 3 bytes"));
    }
    w.write_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use crate::descriptors::{decode_loop, Charset, DecodeEnv, TableKind};
    use crate::psi::store::NoTables;
    use bytes::Bytes;

    #[test]
    fn test_fixed_layouts_reserialize_to_original_bytes() {
        let data = Bytes::from_static(&[
            0x52, 0x01, 0x07, //
            0x5F, 0x04, 0x00, 0x00, 0x00, 0x29, //
            0x0A, 0x04, b'e', b'n', b'g', 0x03, //
            0x59, 0x08, b'f', b'i', b'n', 0x10, 0x00, 0x01, 0x00, 0x02, //
            0x56, 0x05, b'd', b'e', b'u', 0x09, 0x00, //
            0x55, 0x04, b'F', b'R', b'A', 0x09, //
            0x53, 0x04, 0x0B, 0x00, 0x01, 0x00, //
            0x05, 0x05, b'H', b'E', b'V', b'C', 0xFF,
        ]);
        let env = DecodeEnv::new(TableKind::Pmt, &NoTables, Charset::default(), None);
        for d in decode_loop(&data, &env) {
            assert!(!d.is_raw(), "{} fell back to raw", d.name);
            assert_eq!(d.encode_body().as_deref(), Some(d.body()), "{}", d.name);
        }
    }

    #[test]
    fn test_text_layouts_are_not_encoded() {
        let data = Bytes::from_static(&[0x40, 0x03, b'N', b'e', b't']);
        let env = DecodeEnv::new(TableKind::Nit, &NoTables, Charset::default(), None);
        let list = decode_loop(&data, &env);
        assert_eq!(list[0].encode_body(), None);
    }
}
