// src/lib.rs
//! Decoder for MPEG-2 transport streams carrying DVB service information.
//!
//! [`TransportStream`] scans a buffer or file once: packets are framed and
//! demultiplexed, sections are reassembled into versioned tables, PES
//! packets are rebuilt and handed to the elementary-stream decoders. The
//! result is a read-only model queried through the stream's accessors, the
//! [`tree`] view or a [`report::Summary`].

pub mod bits;
pub mod constants;
pub mod descriptors;
pub mod error;
pub mod packet;
pub mod parsers;
pub mod pes;
pub mod processor;
pub mod psi;
pub mod report;
pub mod stats;
pub mod stream;
pub mod tree;
pub mod types;

pub use error::{BitError, DescriptorError, EsError, SectionError, TsError};
pub use psi::{TableKey, TableStore, TableView};
pub use stream::TransportStream;
pub use types::Options;
