//! Error kinds for every decoding layer.
//!
//! Only [`TsError`] ever aborts a scan; the other kinds are recorded on the
//! entity they affect and the decode carries on.

use thiserror::Error;

/// Fatal errors returned by the stream façade.
#[derive(Error, Debug)]
pub enum TsError {
    #[error("not an MPEG transport stream: no packet stride found in the first {probed} bytes")]
    NotMpegStream { probed: usize },

    #[error("unsupported packet size {0} (expected 188, 192, 204 or 208)")]
    UnsupportedPacketSize(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("elementary stream worker failed: {0}")]
    Worker(String),
}

/// Bounds and coding errors raised by [`crate::bits::BitCursor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitError {
    #[error("read of {requested} bits at bit {position} exceeds buffer of {available} bits")]
    OutOfRange {
        requested: u64,
        position: u64,
        available: u64,
    },

    #[error("exp-Golomb code with {0} leading zero bits")]
    InvalidExpGolomb(u32),

    #[error("byte read at unaligned bit position {0}")]
    Unaligned(u64),
}

/// Section-level errors: the section is dropped, the table stays incomplete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SectionError {
    #[error("section too short: {0} bytes")]
    TooShort(usize),

    #[error("section_length {declared} exceeds {available} available bytes")]
    Truncated { declared: usize, available: usize },

    #[error("CRC-32 mismatch: carried 0x{carried:08x}, computed 0x{computed:08x}")]
    CrcMismatch { carried: u32, computed: u32 },

    #[error("section_number {section_number} > last_section_number {last_section_number}")]
    SectionNumberOutOfRange {
        section_number: u8,
        last_section_number: u8,
    },

    #[error("last_section_number changed from {previous} to {current} within version {version}")]
    LastSectionChanged {
        version: u8,
        previous: u8,
        current: u8,
    },

    #[error("unexpected table_id 0x{0:02x} for this decoder")]
    UnexpectedTableId(u8),

    #[error("malformed table body: {0}")]
    Malformed(String),
}

impl From<BitError> for SectionError {
    fn from(e: BitError) -> Self {
        SectionError::Malformed(e.to_string())
    }
}

/// Descriptor-level errors: the descriptor is downgraded to a raw one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor body truncated: {0}")]
    Truncated(#[from] BitError),

    #[error("invalid field {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}

impl DescriptorError {
    pub fn invalid(field: &'static str, detail: impl Into<String>) -> Self {
        DescriptorError::Invalid {
            field,
            detail: detail.into(),
        }
    }
}

/// Elementary-stream errors: the offending unit is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EsError {
    #[error("bitstream error: {0}")]
    Bits(#[from] BitError),

    #[error("bad sync: expected 0x{expected:02x}, found 0x{found:02x} at offset {offset}")]
    BadSync { expected: u32, found: u32, offset: usize },

    #[error("segment at offset {offset} overruns payload ({needed} > {available})")]
    Overrun {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("CRC-32 mismatch in segment at offset {0}")]
    Crc(usize),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("{0}")]
    Malformed(String),
}
