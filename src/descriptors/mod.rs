//! Descriptor decoding keyed on `(tag, context)`.
//!
//! A descriptor loop is decoded one entry at a time. The registry picks a
//! decoder from the tag and the [`DescriptorContext`] in force (enclosing table
//! and current private_data_specifier). A decoder that fails leaves the entry
//! as [`DescriptorKind::Raw`] with the error message; siblings are unaffected.

pub mod dvb;
mod encode;
pub mod extension;
pub mod mpeg;
pub mod private;
pub mod text;

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::bits::BitCursor;
use crate::error::{BitError, DescriptorError};
use crate::psi::store::TableView;

pub use dvb::*;
pub use extension::{ExtensionDescriptor, ExtensionKind};
pub use mpeg::*;
pub use private::*;
pub use text::Charset;

/// Kind of table a descriptor loop sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TableKind {
    Pat,
    Cat,
    Tsdt,
    Pmt,
    Nit,
    Bat,
    Sdt,
    Eit,
    Tot,
    Sit,
    FastscanNetwork,
    FastscanServices,
    Other,
}

/// Everything besides the tag that decides how a descriptor is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DescriptorContext {
    pub table: TableKind,
    pub private_data_specifier: Option<u32>,
}

impl DescriptorContext {
    pub fn new(table: TableKind) -> Self {
        Self {
            table,
            private_data_specifier: None,
        }
    }
}

/// Read-only environment handed to every descriptor decoder.
#[derive(Clone, Copy)]
pub struct DecodeEnv<'a> {
    pub context: DescriptorContext,
    pub tables: &'a dyn TableView,
    pub charset: Charset,
    /// (original_network_id, transport_stream_id) of the enclosing transport loop.
    pub origin: Option<(u16, u16)>,
}

impl<'a> DecodeEnv<'a> {
    pub fn new(table: TableKind, tables: &'a dyn TableView, charset: Charset, pds: Option<u32>) -> Self {
        Self {
            context: DescriptorContext {
                table,
                private_data_specifier: pds,
            },
            tables,
            charset,
            origin: None,
        }
    }

    pub fn with_origin(mut self, onid: u16, tsid: u16) -> Self {
        self.origin = Some((onid, tsid));
        self
    }

    pub(crate) fn text(&self, bytes: &[u8]) -> String {
        text::decode(bytes, self.charset)
    }
}

pub type DecodeFn = fn(&[u8], &DecodeEnv<'_>) -> Result<DescriptorKind, DescriptorError>;

/// One entry of a descriptor loop.
#[derive(Debug, Clone, Serialize)]
pub struct Descriptor {
    pub tag: u8,
    pub length: u8,
    pub name: &'static str,
    pub context: DescriptorContext,
    pub kind: DescriptorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(serialize_with = "as_hex")]
    raw: Bytes,
}

impl Descriptor {
    /// Original bytes including tag and length.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Body bytes (after tag and length).
    pub fn body(&self) -> &[u8] {
        self.raw.get(2..).unwrap_or_default()
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.kind, DescriptorKind::Raw)
    }

    /// Re-serializes the decoded body. `None` for layouts with reserved or
    /// derived fields that are not kept.
    pub fn encode_body(&self) -> Option<Vec<u8>> {
        self.kind.encode_body()
    }
}

/// Decoded descriptor layouts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "fields")]
pub enum DescriptorKind {
    Raw,
    // ISO/IEC 13818-1
    VideoStream(VideoStreamDescriptor),
    AudioStream(AudioStreamDescriptor),
    Hierarchy(HierarchyDescriptor),
    Registration(RegistrationDescriptor),
    DataStreamAlignment(DataStreamAlignmentDescriptor),
    TargetBackgroundGrid(TargetBackgroundGridDescriptor),
    VideoWindow(VideoWindowDescriptor),
    Ca(CaDescriptor),
    Iso639Language(Iso639LanguageDescriptor),
    SystemClock(SystemClockDescriptor),
    MultiplexBufferUtilization(MultiplexBufferUtilizationDescriptor),
    Copyright(CopyrightDescriptor),
    MaximumBitrate(MaximumBitrateDescriptor),
    PrivateDataIndicator(PrivateDataIndicatorDescriptor),
    SmoothingBuffer(SmoothingBufferDescriptor),
    Std(StdDescriptor),
    Ibp(IbpDescriptor),
    CarouselIdentifier(CarouselIdentifierDescriptor),
    AssociationTag(AssociationTagDescriptor),
    Mpeg4Video(Mpeg4VideoDescriptor),
    Mpeg4Audio(Mpeg4AudioDescriptor),
    AvcVideo(AvcVideoDescriptor),
    AvcTimingHrd(AvcTimingHrdDescriptor),
    Mpeg2AacAudio(Mpeg2AacAudioDescriptor),
    HevcVideo(HevcVideoDescriptor),
    MpegExtension(MpegExtensionDescriptor),
    // EN 300 468
    NetworkName(NameDescriptor),
    ServiceList(ServiceListDescriptor),
    Stuffing(StuffingDescriptor),
    SatelliteDelivery(SatelliteDeliveryDescriptor),
    CableDelivery(CableDeliveryDescriptor),
    VbiData(VbiDataDescriptor),
    VbiTeletext(TeletextDescriptor),
    BouquetName(NameDescriptor),
    Service(ServiceDescriptor),
    CountryAvailability(CountryAvailabilityDescriptor),
    Linkage(LinkageDescriptor),
    NvodReference(NvodReferenceDescriptor),
    TimeShiftedService(TimeShiftedServiceDescriptor),
    ShortEvent(ShortEventDescriptor),
    ExtendedEvent(ExtendedEventDescriptor),
    TimeShiftedEvent(TimeShiftedEventDescriptor),
    Component(ComponentDescriptor),
    Mosaic(MosaicDescriptor),
    StreamIdentifier(StreamIdentifierDescriptor),
    CaIdentifier(CaIdentifierDescriptor),
    Content(ContentDescriptor),
    ParentalRating(ParentalRatingDescriptor),
    Teletext(TeletextDescriptor),
    Telephone(TelephoneDescriptor),
    LocalTimeOffset(LocalTimeOffsetDescriptor),
    Subtitling(SubtitlingDescriptor),
    TerrestrialDelivery(TerrestrialDeliveryDescriptor),
    MultilingualNetworkName(MultilingualNameDescriptor),
    MultilingualBouquetName(MultilingualNameDescriptor),
    MultilingualServiceName(MultilingualServiceNameDescriptor),
    MultilingualComponent(MultilingualComponentDescriptor),
    PrivateDataSpecifier(PrivateDataSpecifierDescriptor),
    ServiceMove(ServiceMoveDescriptor),
    ShortSmoothingBuffer(ShortSmoothingBufferDescriptor),
    FrequencyList(FrequencyListDescriptor),
    PartialTransportStream(PartialTransportStreamDescriptor),
    DataBroadcast(DataBroadcastDescriptor),
    Scrambling(ScramblingDescriptor),
    DataBroadcastId(DataBroadcastIdDescriptor),
    TransportStream(BytesDescriptor),
    Dsng(BytesDescriptor),
    Pdc(PdcDescriptor),
    Ac3(Ac3Descriptor),
    AncillaryData(AncillaryDataDescriptor),
    CellList(CellListDescriptor),
    CellFrequencyLink(CellFrequencyLinkDescriptor),
    AnnouncementSupport(AnnouncementSupportDescriptor),
    ApplicationSignalling(ApplicationSignallingDescriptor),
    AdaptationFieldData(AdaptationFieldDataDescriptor),
    ServiceIdentifier(BytesDescriptor),
    ServiceAvailability(ServiceAvailabilityDescriptor),
    DefaultAuthority(BytesDescriptor),
    RelatedContent,
    TvaId(TvaIdDescriptor),
    ContentIdentifier(ContentIdentifierDescriptor),
    S2SatelliteDelivery(S2SatelliteDeliveryDescriptor),
    EnhancedAc3(EnhancedAc3Descriptor),
    Dts(DtsDescriptor),
    Aac(AacDescriptor),
    XaitLocation(XaitLocationDescriptor),
    FtaContentManagement(FtaContentManagementDescriptor),
    Extension(ExtensionDescriptor),
    // private descriptor spaces
    LogicalChannel(LogicalChannelDescriptor),
    NordigLogicalChannelV2(NordigLogicalChannelV2Descriptor),
    HdSimulcastLogicalChannel(LogicalChannelDescriptor),
    PreferredNameList(PreferredNameListDescriptor),
    PreferredNameIdentifier(PreferredNameIdentifierDescriptor),
    EacemStreamIdentifier(EacemStreamIdentifierDescriptor),
    SkyLogicalChannel(SkyLogicalChannelDescriptor),
    FastscanLogicalChannel(FastscanLogicalChannelDescriptor),
}

/// Picks the decoder for a tag in a context.
pub fn decoder_for(tag: u8, ctx: &DescriptorContext) -> Option<(&'static str, DecodeFn)> {
    match tag {
        0x00..=0x3F => mpeg::decoder(tag),
        0x40..=0x7F => dvb::decoder(tag),
        0x80..=0xFE => private::decoder(tag, ctx),
        0xFF => None,
    }
}

/// Display name for a tag even when no decoder exists.
pub fn descriptor_name(tag: u8, ctx: &DescriptorContext) -> &'static str {
    if let Some((name, _)) = decoder_for(tag, ctx) {
        return name;
    }
    match tag {
        0x00 | 0x01 | 0xFF => "forbidden",
        0x02..=0x3F => "ISO/IEC 13818-1 reserved",
        0x40..=0x7F => "DVB reserved",
        _ => "user defined",
    }
}

/// Decodes one descriptor from its raw bytes (tag, length, body).
pub fn decode_descriptor(raw: Bytes, env: &DecodeEnv<'_>) -> Descriptor {
    let tag = raw.first().copied().unwrap_or(0);
    let length = raw.get(1).copied().unwrap_or(0);
    let name = descriptor_name(tag, &env.context);
    let body = raw.get(2..).unwrap_or_default();
    let (kind, error) = if body.len() < length as usize {
        (
            DescriptorKind::Raw,
            Some(format!("descriptor_length {} overruns loop ({} bytes left)", length, body.len())),
        )
    } else {
        match decoder_for(tag, &env.context) {
            Some((_, decode)) => match decode(body, env) {
                Ok(kind) => (kind, None),
                Err(e) => (DescriptorKind::Raw, Some(e.to_string())),
            },
            None => (DescriptorKind::Raw, None),
        }
    };
    Descriptor {
        tag,
        length,
        name,
        context: env.context,
        kind,
        error,
        raw,
    }
}

/// Decodes a whole descriptor loop. `data` must be exactly the loop bytes.
///
/// A private_data_specifier descriptor changes the context for the entries
/// that follow it within this loop only.
pub fn decode_loop(data: &Bytes, env: &DecodeEnv<'_>) -> Vec<Descriptor> {
    let mut out = Vec::new();
    let mut env = *env;
    let mut pos = 0usize;
    while pos < data.len() {
        if data.len() - pos < 2 {
            let d = decode_descriptor(data.slice(pos..), &env);
            out.push(d);
            break;
        }
        let length = data[pos + 1] as usize;
        let end = pos + 2 + length;
        if end > data.len() {
            out.push(decode_descriptor(data.slice(pos..), &env));
            break;
        }
        let d = decode_descriptor(data.slice(pos..end), &env);
        if let DescriptorKind::PrivateDataSpecifier(p) = &d.kind {
            env.context.private_data_specifier = Some(p.specifier);
        }
        out.push(d);
        pos = end;
    }
    out
}

/// Reads a 12-bit loop length, then returns exactly that many bytes of `data`
/// starting at `offset` as a descriptor loop.
pub(crate) fn loop_slice(data: &Bytes, offset: usize, len: usize) -> Result<Bytes, BitError> {
    let end = offset + len;
    if end > data.len() {
        return Err(BitError::OutOfRange {
            requested: (len as u64) * 8,
            position: (offset as u64) * 8,
            available: (data.len() as u64) * 8,
        });
    }
    Ok(data.slice(offset..end))
}

pub(crate) fn read_lang(r: &mut BitCursor<'_>) -> Result<String, BitError> {
    let code = r.read_bytes(3)?;
    Ok(code.iter().map(|&c| c as char).collect())
}

pub(crate) fn read_text(r: &mut BitCursor<'_>, len: usize, env: &DecodeEnv<'_>) -> Result<String, BitError> {
    let bytes = r.read_bytes(len)?;
    Ok(env.text(bytes))
}

/// Length byte followed by that many bytes of text.
pub(crate) fn read_len_text(r: &mut BitCursor<'_>, env: &DecodeEnv<'_>) -> Result<String, BitError> {
    let len = r.read_u8()? as usize;
    read_text(r, len, env)
}

pub(crate) fn as_hex<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    s.serialize_str(&out)
}
