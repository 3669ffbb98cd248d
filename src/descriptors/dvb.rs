//! EN 300 468 descriptors (tags 0x40..0x7F).

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{as_hex, read_lang, read_len_text, read_text, DecodeEnv, DecodeFn, DescriptorKind};
use crate::bits::{bcd, BitCursor};
use crate::error::DescriptorError;
use crate::psi::tdt::decode_mjd_utc;

type Res = Result<DescriptorKind, DescriptorError>;

pub(super) fn decoder(tag: u8) -> Option<(&'static str, DecodeFn)> {
    let entry: (&'static str, DecodeFn) = match tag {
        0x40 => ("network_name_descriptor", network_name),
        0x41 => ("service_list_descriptor", service_list),
        0x42 => ("stuffing_descriptor", stuffing),
        0x43 => ("satellite_delivery_system_descriptor", satellite_delivery),
        0x44 => ("cable_delivery_system_descriptor", cable_delivery),
        0x45 => ("VBI_data_descriptor", vbi_data),
        0x46 => ("VBI_teletext_descriptor", vbi_teletext),
        0x47 => ("bouquet_name_descriptor", bouquet_name),
        0x48 => ("service_descriptor", service),
        0x49 => ("country_availability_descriptor", country_availability),
        0x4A => ("linkage_descriptor", linkage),
        0x4B => ("NVOD_reference_descriptor", nvod_reference),
        0x4C => ("time_shifted_service_descriptor", time_shifted_service),
        0x4D => ("short_event_descriptor", short_event),
        0x4E => ("extended_event_descriptor", extended_event),
        0x4F => ("time_shifted_event_descriptor", time_shifted_event),
        0x50 => ("component_descriptor", component),
        0x51 => ("mosaic_descriptor", mosaic),
        0x52 => ("stream_identifier_descriptor", stream_identifier),
        0x53 => ("CA_identifier_descriptor", ca_identifier),
        0x54 => ("content_descriptor", content),
        0x55 => ("parental_rating_descriptor", parental_rating),
        0x56 => ("teletext_descriptor", teletext),
        0x57 => ("telephone_descriptor", telephone),
        0x58 => ("local_time_offset_descriptor", local_time_offset),
        0x59 => ("subtitling_descriptor", subtitling),
        0x5A => ("terrestrial_delivery_system_descriptor", terrestrial_delivery),
        0x5B => ("multilingual_network_name_descriptor", multilingual_network_name),
        0x5C => ("multilingual_bouquet_name_descriptor", multilingual_bouquet_name),
        0x5D => ("multilingual_service_name_descriptor", multilingual_service_name),
        0x5E => ("multilingual_component_descriptor", multilingual_component),
        0x5F => ("private_data_specifier_descriptor", private_data_specifier),
        0x60 => ("service_move_descriptor", service_move),
        0x61 => ("short_smoothing_buffer_descriptor", short_smoothing_buffer),
        0x62 => ("frequency_list_descriptor", frequency_list),
        0x63 => ("partial_transport_stream_descriptor", partial_transport_stream),
        0x64 => ("data_broadcast_descriptor", data_broadcast),
        0x65 => ("scrambling_descriptor", scrambling),
        0x66 => ("data_broadcast_id_descriptor", data_broadcast_id),
        0x67 => ("transport_stream_descriptor", transport_stream),
        0x68 => ("DSNG_descriptor", dsng),
        0x69 => ("PDC_descriptor", pdc),
        0x6A => ("AC-3_descriptor", ac3),
        0x6B => ("ancillary_data_descriptor", ancillary_data),
        0x6C => ("cell_list_descriptor", cell_list),
        0x6D => ("cell_frequency_link_descriptor", cell_frequency_link),
        0x6E => ("announcement_support_descriptor", announcement_support),
        0x6F => ("application_signalling_descriptor", application_signalling),
        0x70 => ("adaptation_field_data_descriptor", adaptation_field_data),
        0x71 => ("service_identifier_descriptor", service_identifier),
        0x72 => ("service_availability_descriptor", service_availability),
        0x73 => ("default_authority_descriptor", default_authority),
        0x74 => ("related_content_descriptor", related_content),
        0x75 => ("TVA_id_descriptor", tva_id),
        0x76 => ("content_identifier_descriptor", content_identifier),
        0x79 => ("S2_satellite_delivery_system_descriptor", s2_satellite_delivery),
        0x7A => ("enhanced_AC-3_descriptor", enhanced_ac3),
        0x7B => ("DTS_descriptor", dts),
        0x7C => ("AAC_descriptor", aac),
        0x7D => ("XAIT_location_descriptor", xait_location),
        0x7E => ("FTA_content_management_descriptor", fta_content_management),
        0x7F => ("extension_descriptor", super::extension::decode),
        _ => return None,
    };
    Some(entry)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameDescriptor {
    pub name: String,
}

fn network_name(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::NetworkName(NameDescriptor { name: env.text(data) }))
}

fn bouquet_name(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::BouquetName(NameDescriptor { name: env.text(data) }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceListEntry {
    pub service_id: u16,
    pub service_type: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceListDescriptor {
    pub services: Vec<ServiceListEntry>,
}

fn service_list(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() % 3 != 0 {
        return Err(DescriptorError::invalid("service_list", format!("length {} not a multiple of 3", data.len())));
    }
    let mut r = BitCursor::new(data);
    let mut services = Vec::new();
    while !r.is_empty() {
        services.push(ServiceListEntry {
            service_id: r.read_u16()?,
            service_type: r.read_u8()?,
        });
    }
    Ok(DescriptorKind::ServiceList(ServiceListDescriptor { services }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StuffingDescriptor {
    pub length: usize,
}

fn stuffing(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::Stuffing(StuffingDescriptor { length: data.len() }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SatelliteDeliveryDescriptor {
    /// kHz
    pub frequency_khz: u64,
    /// tenths of a degree
    pub orbital_position: u16,
    pub east: bool,
    pub polarization: u8,
    pub roll_off: Option<u8>,
    pub dvb_s2: bool,
    pub modulation_type: u8,
    /// symbols per second
    pub symbol_rate: u64,
    pub fec_inner: u8,
}

fn satellite_delivery(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let frequency = bcd(r.read_u32()? as u64, 8);
    let orbital_position = bcd(r.read_u16()? as u64, 4) as u16;
    let east = r.read_bool()?;
    let polarization = r.read(2)? as u8;
    let roll_off = r.read(2)? as u8;
    let dvb_s2 = r.read_bool()?;
    let modulation_type = r.read(2)? as u8;
    let symbol_rate = bcd(r.read(28)? as u64, 7);
    let fec_inner = r.read(4)? as u8;
    Ok(DescriptorKind::SatelliteDelivery(SatelliteDeliveryDescriptor {
        frequency_khz: frequency * 10,
        orbital_position,
        east,
        polarization,
        roll_off: dvb_s2.then_some(roll_off),
        dvb_s2,
        modulation_type,
        symbol_rate: symbol_rate * 100,
        fec_inner,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CableDeliveryDescriptor {
    pub frequency_khz: u64,
    pub fec_outer: u8,
    pub modulation: u8,
    pub symbol_rate: u64,
    pub fec_inner: u8,
}

fn cable_delivery(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let frequency = bcd(r.read_u32()? as u64, 8);
    r.skip(12)?;
    let fec_outer = r.read(4)? as u8;
    let modulation = r.read_u8()?;
    let symbol_rate = bcd(r.read(28)? as u64, 7);
    let fec_inner = r.read(4)? as u8;
    Ok(DescriptorKind::CableDelivery(CableDeliveryDescriptor {
        // four decimal places of MHz
        frequency_khz: frequency / 10,
        fec_outer,
        modulation,
        symbol_rate: symbol_rate * 100,
        fec_inner,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VbiLine {
    pub field_parity: bool,
    pub line_offset: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VbiService {
    pub data_service_id: u8,
    pub lines: Vec<VbiLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VbiDataDescriptor {
    pub services: Vec<VbiService>,
}

fn vbi_data(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let mut services = Vec::new();
    while !r.is_empty() {
        let data_service_id = r.read_u8()?;
        let len = r.read_u8()? as usize;
        let body = r.read_bytes(len)?;
        let mut lines = Vec::new();
        if matches!(data_service_id, 0x01..=0x07) && data_service_id != 0x03 {
            for b in body {
                lines.push(VbiLine {
                    field_parity: b & 0x20 != 0,
                    line_offset: b & 0x1F,
                });
            }
        }
        services.push(VbiService { data_service_id, lines });
    }
    Ok(DescriptorKind::VbiData(VbiDataDescriptor { services }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeletextEntry {
    pub language: String,
    pub teletext_type: u8,
    pub magazine_number: u8,
    pub page_number: u8,
}

impl TeletextEntry {
    /// Page number as shown to viewers (magazine 0 is shown as 8).
    pub fn display_page(&self) -> u16 {
        let mag = if self.magazine_number == 0 { 8 } else { self.magazine_number } as u16;
        mag * 100 + bcd(self.page_number as u64, 2) as u16
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeletextDescriptor {
    pub entries: Vec<TeletextEntry>,
}

fn teletext_entries(data: &[u8]) -> Result<TeletextDescriptor, DescriptorError> {
    if data.len() % 5 != 0 {
        return Err(DescriptorError::invalid("teletext", format!("length {} not a multiple of 5", data.len())));
    }
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        entries.push(TeletextEntry {
            language: read_lang(&mut r)?,
            teletext_type: r.read(5)? as u8,
            magazine_number: r.read(3)? as u8,
            page_number: r.read_u8()?,
        });
    }
    Ok(TeletextDescriptor { entries })
}

fn vbi_teletext(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::VbiTeletext(teletext_entries(data)?))
}

fn teletext(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::Teletext(teletext_entries(data)?))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDescriptor {
    pub service_type: u8,
    pub provider_name: String,
    pub service_name: String,
}

fn service(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let service_type = r.read_u8()?;
    let provider_name = read_len_text(&mut r, env)?;
    let service_name = read_len_text(&mut r, env)?;
    Ok(DescriptorKind::Service(ServiceDescriptor {
        service_type,
        provider_name,
        service_name,
    }))
}

/// Human-readable service_type (EN 300 468 table 87, common values).
pub fn service_type_name(service_type: u8) -> &'static str {
    match service_type {
        0x01 => "digital television",
        0x02 => "digital radio sound",
        0x03 => "teletext",
        0x04 => "NVOD reference",
        0x05 => "NVOD time-shifted",
        0x06 => "mosaic",
        0x07 => "FM radio",
        0x0A => "advanced codec digital radio sound",
        0x0C => "data broadcast",
        0x10 => "DVB MHP",
        0x11 => "MPEG-2 HD digital television",
        0x16 => "advanced codec SD digital television",
        0x19 => "advanced codec HD digital television",
        0x1F => "HEVC digital television",
        0x20 => "HEVC UHD digital television",
        0x80..=0xFE => "user defined",
        _ => "reserved",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryAvailabilityDescriptor {
    pub available: bool,
    pub countries: Vec<String>,
}

fn country_availability(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let available = r.read_bool()?;
    r.skip(7)?;
    let mut countries = Vec::new();
    while !r.is_empty() {
        countries.push(read_lang(&mut r)?);
    }
    Ok(DescriptorKind::CountryAvailability(CountryAvailabilityDescriptor { available, countries }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LinkageDetail {
    None,
    MobileHandOver {
        hand_over_type: u8,
        origin_type: u8,
        network_id: Option<u16>,
        initial_service_id: Option<u16>,
    },
    EventLinkage {
        target_event_id: u16,
        target_listed: bool,
        event_simulcast: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkageDescriptor {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub service_id: u16,
    pub linkage_type: u8,
    pub detail: LinkageDetail,
    #[serde(serialize_with = "as_hex")]
    pub private_data: Vec<u8>,
}

fn linkage(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let transport_stream_id = r.read_u16()?;
    let original_network_id = r.read_u16()?;
    let service_id = r.read_u16()?;
    let linkage_type = r.read_u8()?;
    let detail = match linkage_type {
        0x08 => {
            let hand_over_type = r.read(4)? as u8;
            r.skip(3)?;
            let origin_type = r.read(1)? as u8;
            let network_id = if (1..=3).contains(&hand_over_type) {
                Some(r.read_u16()?)
            } else {
                None
            };
            let initial_service_id = if origin_type == 0 { Some(r.read_u16()?) } else { None };
            LinkageDetail::MobileHandOver {
                hand_over_type,
                origin_type,
                network_id,
                initial_service_id,
            }
        }
        0x0D => {
            let target_event_id = r.read_u16()?;
            let target_listed = r.read_bool()?;
            let event_simulcast = r.read_bool()?;
            r.skip(6)?;
            LinkageDetail::EventLinkage {
                target_event_id,
                target_listed,
                event_simulcast,
            }
        }
        _ => LinkageDetail::None,
    };
    Ok(DescriptorKind::Linkage(LinkageDescriptor {
        transport_stream_id,
        original_network_id,
        service_id,
        linkage_type,
        detail,
        private_data: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceTriplet {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub service_id: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NvodReferenceDescriptor {
    pub references: Vec<ServiceTriplet>,
}

fn nvod_reference(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() % 6 != 0 {
        return Err(DescriptorError::invalid("NVOD_reference", format!("length {} not a multiple of 6", data.len())));
    }
    let mut r = BitCursor::new(data);
    let mut references = Vec::new();
    while !r.is_empty() {
        references.push(ServiceTriplet {
            transport_stream_id: r.read_u16()?,
            original_network_id: r.read_u16()?,
            service_id: r.read_u16()?,
        });
    }
    Ok(DescriptorKind::NvodReference(NvodReferenceDescriptor { references }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeShiftedServiceDescriptor {
    pub reference_service_id: u16,
}

fn time_shifted_service(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::TimeShiftedService(TimeShiftedServiceDescriptor {
        reference_service_id: r.read_u16()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortEventDescriptor {
    pub language: String,
    pub event_name: String,
    pub text: String,
}

fn short_event(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::ShortEvent(ShortEventDescriptor {
        language: read_lang(&mut r)?,
        event_name: read_len_text(&mut r, env)?,
        text: read_len_text(&mut r, env)?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedEventItem {
    pub description: String,
    pub item: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedEventDescriptor {
    pub descriptor_number: u8,
    pub last_descriptor_number: u8,
    pub language: String,
    pub items: Vec<ExtendedEventItem>,
    pub text: String,
}

fn extended_event(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let descriptor_number = r.read(4)? as u8;
    let last_descriptor_number = r.read(4)? as u8;
    let language = read_lang(&mut r)?;
    let items_len = r.read_u8()? as usize;
    let items_raw = r.read_bytes(items_len)?;
    let mut ir = BitCursor::new(items_raw);
    let mut items = Vec::new();
    while !ir.is_empty() {
        items.push(ExtendedEventItem {
            description: read_len_text(&mut ir, env)?,
            item: read_len_text(&mut ir, env)?,
        });
    }
    let text = read_len_text(&mut r, env)?;
    Ok(DescriptorKind::ExtendedEvent(ExtendedEventDescriptor {
        descriptor_number,
        last_descriptor_number,
        language,
        items,
        text,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeShiftedEventDescriptor {
    pub reference_service_id: u16,
    pub reference_event_id: u16,
}

fn time_shifted_event(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::TimeShiftedEvent(TimeShiftedEventDescriptor {
        reference_service_id: r.read_u16()?,
        reference_event_id: r.read_u16()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentDescriptor {
    pub stream_content_ext: u8,
    pub stream_content: u8,
    pub component_type: u8,
    pub component_tag: u8,
    pub language: String,
    pub text: String,
}

fn component(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let stream_content_ext = r.read(4)? as u8;
    let stream_content = r.read(4)? as u8;
    let component_type = r.read_u8()?;
    let component_tag = r.read_u8()?;
    let language = read_lang(&mut r)?;
    let text = env.text(r.rest()?);
    Ok(DescriptorKind::Component(ComponentDescriptor {
        stream_content_ext,
        stream_content,
        component_type,
        component_tag,
        language,
        text,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CellLinkage {
    Undefined,
    Bouquet(u16),
    Service(ServiceTriplet),
    OtherMosaic(ServiceTriplet),
    Event { service: ServiceTriplet, event_id: u16 },
    Reserved(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MosaicCell {
    pub logical_cell_id: u8,
    pub presentation_info: u8,
    pub elementary_cell_ids: Vec<u8>,
    pub linkage: CellLinkage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MosaicDescriptor {
    pub entry_point: bool,
    pub horizontal_cells: u8,
    pub vertical_cells: u8,
    pub cells: Vec<MosaicCell>,
}

fn read_triplet(r: &mut BitCursor<'_>) -> Result<ServiceTriplet, DescriptorError> {
    Ok(ServiceTriplet {
        original_network_id: r.read_u16()?,
        transport_stream_id: r.read_u16()?,
        service_id: r.read_u16()?,
    })
}

fn mosaic(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let entry_point = r.read_bool()?;
    let horizontal_cells = r.read(3)? as u8 + 1;
    r.skip(1)?;
    let vertical_cells = r.read(3)? as u8 + 1;
    let mut cells = Vec::new();
    while !r.is_empty() {
        let logical_cell_id = r.read(6)? as u8;
        r.skip(7)?;
        let presentation_info = r.read(3)? as u8;
        let n = r.read_u8()? as usize;
        let ids = r.read_bytes(n)?.iter().map(|b| b & 0x3F).collect();
        let linkage_info = r.read_u8()?;
        let linkage = match linkage_info {
            0x00 => CellLinkage::Undefined,
            0x01 => CellLinkage::Bouquet(r.read_u16()?),
            0x02 => CellLinkage::Service(read_triplet(&mut r)?),
            0x03 => CellLinkage::OtherMosaic(read_triplet(&mut r)?),
            0x04 => CellLinkage::Event {
                service: read_triplet(&mut r)?,
                event_id: r.read_u16()?,
            },
            other => CellLinkage::Reserved(other),
        };
        cells.push(MosaicCell {
            logical_cell_id,
            presentation_info,
            elementary_cell_ids: ids,
            linkage,
        });
    }
    Ok(DescriptorKind::Mosaic(MosaicDescriptor {
        entry_point,
        horizontal_cells,
        vertical_cells,
        cells,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamIdentifierDescriptor {
    pub component_tag: u8,
}

fn stream_identifier(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::StreamIdentifier(StreamIdentifierDescriptor {
        component_tag: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaIdentifierDescriptor {
    pub ca_system_ids: Vec<u16>,
}

fn ca_identifier(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() % 2 != 0 {
        return Err(DescriptorError::invalid("CA_identifier", "odd length"));
    }
    let mut r = BitCursor::new(data);
    let mut ca_system_ids = Vec::new();
    while !r.is_empty() {
        ca_system_ids.push(r.read_u16()?);
    }
    Ok(DescriptorKind::CaIdentifier(CaIdentifierDescriptor { ca_system_ids }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentEntry {
    pub level_1: u8,
    pub level_2: u8,
    pub user_byte: u8,
}

impl ContentEntry {
    /// Genre name for content_nibble_level_1.
    pub fn genre(&self) -> &'static str {
        match self.level_1 {
            0x1 => "movie/drama",
            0x2 => "news/current affairs",
            0x3 => "show/game show",
            0x4 => "sports",
            0x5 => "children's/youth programmes",
            0x6 => "music/ballet/dance",
            0x7 => "arts/culture",
            0x8 => "social/political issues/economics",
            0x9 => "education/science/factual topics",
            0xA => "leisure hobbies",
            0xB => "special characteristics",
            0xF => "user defined",
            _ => "undefined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentDescriptor {
    pub entries: Vec<ContentEntry>,
}

fn content(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() % 2 != 0 {
        return Err(DescriptorError::invalid("content", "odd length"));
    }
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        entries.push(ContentEntry {
            level_1: r.read(4)? as u8,
            level_2: r.read(4)? as u8,
            user_byte: r.read_u8()?,
        });
    }
    Ok(DescriptorKind::Content(ContentDescriptor { entries }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentalRatingEntry {
    pub country: String,
    pub rating: u8,
}

impl ParentalRatingEntry {
    /// Minimum age, when the rating is in the age range.
    pub fn minimum_age(&self) -> Option<u8> {
        (0x01..=0x0F).contains(&self.rating).then(|| self.rating + 3)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentalRatingDescriptor {
    pub entries: Vec<ParentalRatingEntry>,
}

fn parental_rating(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() % 4 != 0 {
        return Err(DescriptorError::invalid("parental_rating", format!("length {} not a multiple of 4", data.len())));
    }
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        entries.push(ParentalRatingEntry {
            country: read_lang(&mut r)?,
            rating: r.read_u8()?,
        });
    }
    Ok(DescriptorKind::ParentalRating(ParentalRatingDescriptor { entries }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelephoneDescriptor {
    pub foreign_availability: bool,
    pub connection_type: u8,
    pub country_prefix: String,
    pub international_area_code: String,
    pub operator_code: String,
    pub national_area_code: String,
    pub core_number: String,
}

fn telephone(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    r.skip(2)?;
    let foreign_availability = r.read_bool()?;
    let connection_type = r.read(5)? as u8;
    r.skip(1)?;
    let cp = r.read(2)? as usize;
    let ia = r.read(3)? as usize;
    let op = r.read(2)? as usize;
    r.skip(1)?;
    let na = r.read(3)? as usize;
    let core = r.read(4)? as usize;
    let mut ascii = |n: usize| -> Result<String, DescriptorError> {
        Ok(r.read_bytes(n)?.iter().map(|&c| c as char).collect())
    };
    Ok(DescriptorKind::Telephone(TelephoneDescriptor {
        foreign_availability,
        connection_type,
        country_prefix: ascii(cp)?,
        international_area_code: ascii(ia)?,
        operator_code: ascii(op)?,
        national_area_code: ascii(na)?,
        core_number: ascii(core)?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalTimeOffsetEntry {
    pub country: String,
    pub region_id: u8,
    /// true when the offset is negative (west of Greenwich).
    pub negative: bool,
    /// minutes
    pub local_time_offset: i32,
    pub time_of_change: Option<DateTime<Utc>>,
    pub next_time_offset: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalTimeOffsetDescriptor {
    pub entries: Vec<LocalTimeOffsetEntry>,
}

fn hhmm_minutes(raw: u16, negative: bool) -> i32 {
    let v = bcd(raw as u64, 4) as i32;
    let minutes = (v / 100) * 60 + v % 100;
    if negative { -minutes } else { minutes }
}

fn local_time_offset(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() % 13 != 0 {
        return Err(DescriptorError::invalid("local_time_offset", format!("length {} not a multiple of 13", data.len())));
    }
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        let country = read_lang(&mut r)?;
        let region_id = r.read(6)? as u8;
        r.skip(1)?;
        let negative = r.read_bool()?;
        let offset = r.read_u16()?;
        let mjd = r.read_u16()?;
        let hms = r.read_u24()?;
        let next = r.read_u16()?;
        entries.push(LocalTimeOffsetEntry {
            country,
            region_id,
            negative,
            local_time_offset: hhmm_minutes(offset, negative),
            time_of_change: decode_mjd_utc(mjd, hms),
            next_time_offset: hhmm_minutes(next, negative),
        });
    }
    Ok(DescriptorKind::LocalTimeOffset(LocalTimeOffsetDescriptor { entries }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitlingEntry {
    pub language: String,
    pub subtitling_type: u8,
    pub composition_page_id: u16,
    pub ancillary_page_id: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitlingDescriptor {
    pub entries: Vec<SubtitlingEntry>,
}

fn subtitling(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    if data.len() % 8 != 0 {
        return Err(DescriptorError::invalid("subtitling", format!("length {} not a multiple of 8", data.len())));
    }
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        entries.push(SubtitlingEntry {
            language: read_lang(&mut r)?,
            subtitling_type: r.read_u8()?,
            composition_page_id: r.read_u16()?,
            ancillary_page_id: r.read_u16()?,
        });
    }
    Ok(DescriptorKind::Subtitling(SubtitlingDescriptor { entries }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerrestrialDeliveryDescriptor {
    pub centre_frequency_hz: u64,
    pub bandwidth: u8,
    pub high_priority: bool,
    pub time_slicing: bool,
    pub mpe_fec: bool,
    pub constellation: u8,
    pub hierarchy_information: u8,
    pub code_rate_hp: u8,
    pub code_rate_lp: u8,
    pub guard_interval: u8,
    pub transmission_mode: u8,
    pub other_frequency: bool,
}

impl TerrestrialDeliveryDescriptor {
    pub fn bandwidth_mhz(&self) -> Option<u8> {
        match self.bandwidth {
            0 => Some(8),
            1 => Some(7),
            2 => Some(6),
            3 => Some(5),
            _ => None,
        }
    }
}

fn terrestrial_delivery(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let centre_frequency_hz = r.read_u32()? as u64 * 10;
    let bandwidth = r.read(3)? as u8;
    // priority=1 means HP stream
    let high_priority = r.read_bool()?;
    let time_slicing = !r.read_bool()?;
    let mpe_fec = !r.read_bool()?;
    r.skip(2)?;
    let constellation = r.read(2)? as u8;
    let hierarchy_information = r.read(3)? as u8;
    let code_rate_hp = r.read(3)? as u8;
    let code_rate_lp = r.read(3)? as u8;
    let guard_interval = r.read(2)? as u8;
    let transmission_mode = r.read(2)? as u8;
    let other_frequency = r.read_bool()?;
    Ok(DescriptorKind::TerrestrialDelivery(TerrestrialDeliveryDescriptor {
        centre_frequency_hz,
        bandwidth,
        high_priority,
        time_slicing,
        mpe_fec,
        constellation,
        hierarchy_information,
        code_rate_hp,
        code_rate_lp,
        guard_interval,
        transmission_mode,
        other_frequency,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultilingualName {
    pub language: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultilingualNameDescriptor {
    pub names: Vec<MultilingualName>,
}

fn multilingual_names(r: &mut BitCursor<'_>, env: &DecodeEnv<'_>) -> Result<Vec<MultilingualName>, DescriptorError> {
    let mut names = Vec::new();
    while !r.is_empty() {
        names.push(MultilingualName {
            language: read_lang(r)?,
            name: read_len_text(r, env)?,
        });
    }
    Ok(names)
}

fn multilingual_network_name(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::MultilingualNetworkName(MultilingualNameDescriptor {
        names: multilingual_names(&mut r, env)?,
    }))
}

fn multilingual_bouquet_name(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::MultilingualBouquetName(MultilingualNameDescriptor {
        names: multilingual_names(&mut r, env)?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultilingualServiceName {
    pub language: String,
    pub provider_name: String,
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultilingualServiceNameDescriptor {
    pub names: Vec<MultilingualServiceName>,
}

fn multilingual_service_name(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let mut names = Vec::new();
    while !r.is_empty() {
        names.push(MultilingualServiceName {
            language: read_lang(&mut r)?,
            provider_name: read_len_text(&mut r, env)?,
            service_name: read_len_text(&mut r, env)?,
        });
    }
    Ok(DescriptorKind::MultilingualServiceName(MultilingualServiceNameDescriptor { names }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultilingualComponentDescriptor {
    pub component_tag: u8,
    pub descriptions: Vec<MultilingualName>,
}

fn multilingual_component(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let component_tag = r.read_u8()?;
    Ok(DescriptorKind::MultilingualComponent(MultilingualComponentDescriptor {
        component_tag,
        descriptions: multilingual_names(&mut r, env)?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateDataSpecifierDescriptor {
    pub specifier: u32,
}

impl PrivateDataSpecifierDescriptor {
    pub fn owner(&self) -> &'static str {
        match self.specifier {
            0x0000_0002 => "BSkyB",
            0x0000_0028 => "EACEM",
            0x0000_0029 => "NorDig",
            0x0000_233A => "DTG",
            0x0000_3200 => "Australian Terrestrial Television Networks",
            _ => "unknown",
        }
    }
}

fn private_data_specifier(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::PrivateDataSpecifier(PrivateDataSpecifierDescriptor {
        specifier: r.read_u32()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMoveDescriptor {
    pub new_original_network_id: u16,
    pub new_transport_stream_id: u16,
    pub new_service_id: u16,
}

fn service_move(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::ServiceMove(ServiceMoveDescriptor {
        new_original_network_id: r.read_u16()?,
        new_transport_stream_id: r.read_u16()?,
        new_service_id: r.read_u16()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortSmoothingBufferDescriptor {
    pub sb_size: u8,
    pub sb_leak_rate: u8,
    #[serde(serialize_with = "as_hex")]
    pub private_data: Vec<u8>,
}

fn short_smoothing_buffer(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::ShortSmoothingBuffer(ShortSmoothingBufferDescriptor {
        sb_size: r.read(2)? as u8,
        sb_leak_rate: r.read(6)? as u8,
        private_data: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyListDescriptor {
    pub coding_type: u8,
    /// Raw 32-bit fields; interpretation follows `coding_type`.
    pub frequencies: Vec<u32>,
}

fn frequency_list(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    r.skip(6)?;
    let coding_type = r.read(2)? as u8;
    let mut frequencies = Vec::new();
    while !r.is_empty() {
        frequencies.push(r.read_u32()?);
    }
    Ok(DescriptorKind::FrequencyList(FrequencyListDescriptor { coding_type, frequencies }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialTransportStreamDescriptor {
    pub peak_rate: u32,
    pub minimum_overall_smoothing_rate: u32,
    pub maximum_overall_smoothing_buffer: u16,
}

fn partial_transport_stream(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    r.skip(2)?;
    let peak_rate = r.read(22)?;
    r.skip(2)?;
    let minimum_overall_smoothing_rate = r.read(22)?;
    r.skip(2)?;
    let maximum_overall_smoothing_buffer = r.read(14)? as u16;
    Ok(DescriptorKind::PartialTransportStream(PartialTransportStreamDescriptor {
        peak_rate,
        minimum_overall_smoothing_rate,
        maximum_overall_smoothing_buffer,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataBroadcastDescriptor {
    pub data_broadcast_id: u16,
    pub component_tag: u8,
    #[serde(serialize_with = "as_hex")]
    pub selector: Vec<u8>,
    pub language: String,
    pub text: String,
}

fn data_broadcast(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let data_broadcast_id = r.read_u16()?;
    let component_tag = r.read_u8()?;
    let n = r.read_u8()? as usize;
    let selector = r.read_bytes(n)?.to_vec();
    Ok(DescriptorKind::DataBroadcast(DataBroadcastDescriptor {
        data_broadcast_id,
        component_tag,
        selector,
        language: read_lang(&mut r)?,
        text: read_len_text(&mut r, env)?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScramblingDescriptor {
    pub scrambling_mode: u8,
}

fn scrambling(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::Scrambling(ScramblingDescriptor {
        scrambling_mode: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataBroadcastIdDescriptor {
    pub data_broadcast_id: u16,
    #[serde(serialize_with = "as_hex")]
    pub id_selector: Vec<u8>,
}

fn data_broadcast_id(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::DataBroadcastId(DataBroadcastIdDescriptor {
        data_broadcast_id: r.read_u16()?,
        id_selector: r.rest()?.to_vec(),
    }))
}

/// Descriptors whose body is an opaque byte string (shown as text when printable).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BytesDescriptor {
    #[serde(serialize_with = "as_hex")]
    pub bytes: Vec<u8>,
    pub text: Option<String>,
}

impl BytesDescriptor {
    fn new(data: &[u8]) -> Self {
        let printable = !data.is_empty() && data.iter().all(|c| c.is_ascii_graphic() || *c == b' ');
        Self {
            bytes: data.to_vec(),
            text: printable.then(|| data.iter().map(|&c| c as char).collect()),
        }
    }
}

fn transport_stream(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::TransportStream(BytesDescriptor::new(data)))
}

fn dsng(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::Dsng(BytesDescriptor::new(data)))
}

fn service_identifier(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::ServiceIdentifier(BytesDescriptor::new(data)))
}

fn default_authority(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::DefaultAuthority(BytesDescriptor::new(data)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdcDescriptor {
    pub day: u8,
    pub month: u8,
    pub hour: u8,
    pub minute: u8,
}

fn pdc(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    r.skip(4)?;
    Ok(DescriptorKind::Pdc(PdcDescriptor {
        day: r.read(5)? as u8,
        month: r.read(4)? as u8,
        hour: r.read(5)? as u8,
        minute: r.read(6)? as u8,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ac3Descriptor {
    pub component_type: Option<u8>,
    pub bsid: Option<u8>,
    pub mainid: Option<u8>,
    pub asvc: Option<u8>,
    #[serde(serialize_with = "as_hex")]
    pub additional_info: Vec<u8>,
}

fn optional_byte(r: &mut BitCursor<'_>, present: bool) -> Result<Option<u8>, DescriptorError> {
    Ok(if present { Some(r.read_u8()?) } else { None })
}

fn ac3(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let ct = r.read_bool()?;
    let bs = r.read_bool()?;
    let mi = r.read_bool()?;
    let asvc = r.read_bool()?;
    r.skip(4)?;
    Ok(DescriptorKind::Ac3(Ac3Descriptor {
        component_type: optional_byte(&mut r, ct)?,
        bsid: optional_byte(&mut r, bs)?,
        mainid: optional_byte(&mut r, mi)?,
        asvc: optional_byte(&mut r, asvc)?,
        additional_info: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnhancedAc3Descriptor {
    pub component_type: Option<u8>,
    pub bsid: Option<u8>,
    pub mainid: Option<u8>,
    pub asvc: Option<u8>,
    pub mix_info_exists: bool,
    pub substream1: Option<u8>,
    pub substream2: Option<u8>,
    pub substream3: Option<u8>,
    #[serde(serialize_with = "as_hex")]
    pub additional_info: Vec<u8>,
}

fn enhanced_ac3(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let ct = r.read_bool()?;
    let bs = r.read_bool()?;
    let mi = r.read_bool()?;
    let asvc = r.read_bool()?;
    let mix_info_exists = r.read_bool()?;
    let s1 = r.read_bool()?;
    let s2 = r.read_bool()?;
    let s3 = r.read_bool()?;
    Ok(DescriptorKind::EnhancedAc3(EnhancedAc3Descriptor {
        component_type: optional_byte(&mut r, ct)?,
        bsid: optional_byte(&mut r, bs)?,
        mainid: optional_byte(&mut r, mi)?,
        asvc: optional_byte(&mut r, asvc)?,
        mix_info_exists,
        substream1: optional_byte(&mut r, s1)?,
        substream2: optional_byte(&mut r, s2)?,
        substream3: optional_byte(&mut r, s3)?,
        additional_info: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AncillaryDataDescriptor {
    pub ancillary_data_identifier: u8,
}

fn ancillary_data(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::AncillaryData(AncillaryDataDescriptor {
        ancillary_data_identifier: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellArea {
    pub latitude: i16,
    pub longitude: i16,
    pub extent_of_latitude: u16,
    pub extent_of_longitude: u16,
}

fn read_area(r: &mut BitCursor<'_>) -> Result<CellArea, DescriptorError> {
    Ok(CellArea {
        latitude: r.read_u16()? as i16,
        longitude: r.read_u16()? as i16,
        extent_of_latitude: r.read(12)? as u16,
        extent_of_longitude: r.read(12)? as u16,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subcell {
    pub cell_id_extension: u8,
    pub area: CellArea,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub cell_id: u16,
    pub area: CellArea,
    pub subcells: Vec<Subcell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellListDescriptor {
    pub cells: Vec<Cell>,
}

fn cell_list(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let mut cells = Vec::new();
    while !r.is_empty() {
        let cell_id = r.read_u16()?;
        let area = read_area(&mut r)?;
        let sub_len = r.read_u8()? as usize;
        let mut sr = BitCursor::new(r.read_bytes(sub_len)?);
        let mut subcells = Vec::new();
        while !sr.is_empty() {
            subcells.push(Subcell {
                cell_id_extension: sr.read_u8()?,
                area: read_area(&mut sr)?,
            });
        }
        cells.push(Cell { cell_id, area, subcells });
    }
    Ok(DescriptorKind::CellList(CellListDescriptor { cells }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellFrequency {
    pub cell_id: u16,
    pub frequency_hz: u64,
    pub transposers: Vec<(u8, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellFrequencyLinkDescriptor {
    pub cells: Vec<CellFrequency>,
}

fn cell_frequency_link(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let mut cells = Vec::new();
    while !r.is_empty() {
        let cell_id = r.read_u16()?;
        let frequency_hz = r.read_u32()? as u64 * 10;
        let sub_len = r.read_u8()? as usize;
        let mut sr = BitCursor::new(r.read_bytes(sub_len)?);
        let mut transposers = Vec::new();
        while !sr.is_empty() {
            transposers.push((sr.read_u8()?, sr.read_u32()? as u64 * 10));
        }
        cells.push(CellFrequency {
            cell_id,
            frequency_hz,
            transposers,
        });
    }
    Ok(DescriptorKind::CellFrequencyLink(CellFrequencyLinkDescriptor { cells }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Announcement {
    pub announcement_type: u8,
    pub reference_type: u8,
    pub service: Option<ServiceTriplet>,
    pub component_tag: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnouncementSupportDescriptor {
    pub support_indicator: u16,
    pub announcements: Vec<Announcement>,
}

fn announcement_support(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let support_indicator = r.read_u16()?;
    let mut announcements = Vec::new();
    while !r.is_empty() {
        let announcement_type = r.read(4)? as u8;
        r.skip(1)?;
        let reference_type = r.read(3)? as u8;
        let (service, component_tag) = if (1..=3).contains(&reference_type) {
            (Some(read_triplet(&mut r)?), Some(r.read_u8()?))
        } else {
            (None, None)
        };
        announcements.push(Announcement {
            announcement_type,
            reference_type,
            service,
            component_tag,
        });
    }
    Ok(DescriptorKind::AnnouncementSupport(AnnouncementSupportDescriptor {
        support_indicator,
        announcements,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationSignallingEntry {
    pub application_type: u16,
    pub ait_version: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationSignallingDescriptor {
    pub entries: Vec<ApplicationSignallingEntry>,
}

fn application_signalling(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        r.skip(1)?;
        let application_type = r.read(15)? as u16;
        r.skip(3)?;
        entries.push(ApplicationSignallingEntry {
            application_type,
            ait_version: r.read(5)? as u8,
        });
    }
    Ok(DescriptorKind::ApplicationSignalling(ApplicationSignallingDescriptor { entries }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptationFieldDataDescriptor {
    pub identifier: u8,
}

fn adaptation_field_data(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::AdaptationFieldData(AdaptationFieldDataDescriptor {
        identifier: r.read_u8()?,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceAvailabilityDescriptor {
    pub available: bool,
    pub cell_ids: Vec<u16>,
}

fn service_availability(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let available = r.read_bool()?;
    r.skip(7)?;
    let mut cell_ids = Vec::new();
    while !r.is_empty() {
        cell_ids.push(r.read_u16()?);
    }
    Ok(DescriptorKind::ServiceAvailability(ServiceAvailabilityDescriptor { available, cell_ids }))
}

fn related_content(_: &[u8], _: &DecodeEnv<'_>) -> Res {
    Ok(DescriptorKind::RelatedContent)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TvaIdEntry {
    pub tva_id: u16,
    pub running_status: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TvaIdDescriptor {
    pub entries: Vec<TvaIdEntry>,
}

fn tva_id(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        let tva_id = r.read_u16()?;
        r.skip(5)?;
        entries.push(TvaIdEntry {
            tva_id,
            running_status: r.read(3)? as u8,
        });
    }
    Ok(DescriptorKind::TvaId(TvaIdDescriptor { entries }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Crid {
    Inline(String),
    Reference(u16),
    Reserved(u8),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CridEntry {
    pub crid_type: u8,
    pub crid: Crid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentIdentifierDescriptor {
    pub entries: Vec<CridEntry>,
}

fn content_identifier(data: &[u8], env: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let mut entries = Vec::new();
    while !r.is_empty() {
        let crid_type = r.read(6)? as u8;
        let location = r.read(2)? as u8;
        let crid = match location {
            0 => {
                let n = r.read_u8()? as usize;
                Crid::Inline(read_text(&mut r, n, env)?)
            }
            1 => Crid::Reference(r.read_u16()?),
            other => {
                return Err(DescriptorError::invalid("crid_location", format!("reserved value {}", other)));
            }
        };
        entries.push(CridEntry { crid_type, crid });
    }
    Ok(DescriptorKind::ContentIdentifier(ContentIdentifierDescriptor { entries }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct S2SatelliteDeliveryDescriptor {
    pub backwards_compatibility: bool,
    pub scrambling_sequence_index: Option<u32>,
    pub input_stream_identifier: Option<u8>,
}

fn s2_satellite_delivery(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let sss = r.read_bool()?;
    let mis = r.read_bool()?;
    let backwards_compatibility = r.read_bool()?;
    r.skip(5)?;
    let scrambling_sequence_index = if sss {
        r.skip(6)?;
        Some(r.read(18)?)
    } else {
        None
    };
    let input_stream_identifier = optional_byte(&mut r, mis)?;
    Ok(DescriptorKind::S2SatelliteDelivery(S2SatelliteDeliveryDescriptor {
        backwards_compatibility,
        scrambling_sequence_index,
        input_stream_identifier,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DtsDescriptor {
    pub sample_rate_code: u8,
    pub bit_rate_code: u8,
    pub nblks: u8,
    pub fsize: u16,
    pub surround_mode: u8,
    pub lfe: bool,
    pub extended_surround: u8,
    #[serde(serialize_with = "as_hex")]
    pub additional_info: Vec<u8>,
}

fn dts(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::Dts(DtsDescriptor {
        sample_rate_code: r.read(4)? as u8,
        bit_rate_code: r.read(6)? as u8,
        nblks: r.read(7)? as u8,
        fsize: r.read(14)? as u16,
        surround_mode: r.read(6)? as u8,
        lfe: r.read_bool()?,
        extended_surround: r.read(2)? as u8,
        additional_info: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AacDescriptor {
    pub profile_and_level: u8,
    pub saoc_de: bool,
    pub aac_type: Option<u8>,
    #[serde(serialize_with = "as_hex")]
    pub additional_info: Vec<u8>,
}

fn aac(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let profile_and_level = r.read_u8()?;
    let (mut saoc_de, mut aac_type) = (false, None);
    if !r.is_empty() {
        let type_flag = r.read_bool()?;
        saoc_de = r.read_bool()?;
        r.skip(6)?;
        aac_type = optional_byte(&mut r, type_flag)?;
    }
    Ok(DescriptorKind::Aac(AacDescriptor {
        profile_and_level,
        saoc_de,
        aac_type,
        additional_info: r.rest()?.to_vec(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XaitLocationDescriptor {
    pub original_network_id: u16,
    pub service_id: u16,
    pub version_number: u8,
    pub update_policy: u8,
}

fn xait_location(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    Ok(DescriptorKind::XaitLocation(XaitLocationDescriptor {
        original_network_id: r.read_u16()?,
        service_id: r.read_u16()?,
        version_number: r.read(5)? as u8,
        update_policy: r.read(3)? as u8,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FtaContentManagementDescriptor {
    pub user_defined: bool,
    pub do_not_scramble: bool,
    pub control_remote_access_over_internet: u8,
    pub do_not_apply_revocation: bool,
}

fn fta_content_management(data: &[u8], _: &DecodeEnv<'_>) -> Res {
    let mut r = BitCursor::new(data);
    let user_defined = r.read_bool()?;
    r.skip(3)?;
    Ok(DescriptorKind::FtaContentManagement(FtaContentManagementDescriptor {
        user_defined,
        do_not_scramble: r.read_bool()?,
        control_remote_access_over_internet: r.read(2)? as u8,
        do_not_apply_revocation: r.read_bool()?,
    }))
}
