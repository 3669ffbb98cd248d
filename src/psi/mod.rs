//! PSI / SI tables: section framing, the table store and one decoder per
//! table family.

pub mod cat;
pub mod eit;
pub mod fastscan;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod rst;
pub mod sdt;
pub mod section;
pub mod sit;
pub mod store;
pub mod tdt;

use bytes::Bytes;
use serde::Serialize;

use crate::constants::table_id;
use crate::descriptors::{as_hex, Charset, DecodeEnv, TableKind};
use crate::error::SectionError;

pub use cat::CatSection;
pub use eit::{EitEvent, EitSection};
pub use fastscan::{FstSection, FstService};
pub use nit::{NitSection, TransportStreamEntry};
pub use pat::{PatEntry, PatSection};
pub use pmt::{EsInfo, PmtSection};
pub use rst::{DitSection, RstEntry, RstSection};
pub use sdt::{SdtSection, SdtService};
pub use section::{PsiSection, SectionAssembler};
pub use sit::{SitSection, SitService};
pub use store::{InsertOutcome, NoTables, StoredSection, TableKey, TableStore, TableView};
pub use tdt::{TdtSection, TotSection};

/// Decoded body of one section.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "table")]
pub enum TableSection {
    Pat(PatSection),
    Cat(CatSection),
    Tsdt(CatSection),
    Pmt(PmtSection),
    Nit(NitSection),
    Bat(NitSection),
    Sdt(SdtSection),
    Eit(EitSection),
    Tdt(TdtSection),
    Tot(TotSection),
    Rst(RstSection),
    Sit(SitSection),
    Dit(DitSection),
    FastscanNetwork(NitSection),
    FastscanServices(FstSection),
    Opaque(OpaqueSection),
}

/// Sections of tables without a decoder.
#[derive(Debug, Clone, Serialize)]
pub struct OpaqueSection {
    pub table_id: u8,
    pub table_id_extension: u16,
    #[serde(serialize_with = "as_hex")]
    pub body: Bytes,
}

/// Everything a table decoder needs besides the section itself.
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    pub tables: &'a dyn TableView,
    pub charset: Charset,
    pub default_private_data_specifier: Option<u32>,
}

impl<'a> DecodeContext<'a> {
    pub fn new(tables: &'a dyn TableView) -> Self {
        Self {
            tables,
            charset: Charset::default(),
            default_private_data_specifier: None,
        }
    }

    pub fn env(&self, table: TableKind) -> DecodeEnv<'a> {
        DecodeEnv::new(table, self.tables, self.charset, self.default_private_data_specifier)
    }
}

/// Decodes a validated section and derives the key it is stored under.
pub fn decode_section(section: &PsiSection, ctx: &DecodeContext<'_>) -> Result<(TableKey, TableSection), SectionError> {
    let ext = section.table_id_extension;
    let tid = section.table_id;
    let decoded = match tid {
        table_id::PAT => (TableKey::Pat, TableSection::Pat(pat::parse_pat(section)?)),
        table_id::CAT => (TableKey::Cat, TableSection::Cat(cat::parse_cat(section, ctx, TableKind::Cat)?)),
        table_id::TSDT => (TableKey::Tsdt, TableSection::Tsdt(cat::parse_cat(section, ctx, TableKind::Tsdt)?)),
        table_id::PMT => (
            TableKey::Pmt { program_number: ext },
            TableSection::Pmt(pmt::parse_pmt(section, ctx)?),
        ),
        table_id::NIT_ACTUAL | table_id::NIT_OTHER => (
            TableKey::Nit {
                table_id: tid,
                network_id: ext,
            },
            TableSection::Nit(nit::parse_nit(section, ctx, TableKind::Nit)?),
        ),
        table_id::BAT => (
            TableKey::Bat { bouquet_id: ext },
            TableSection::Bat(nit::parse_nit(section, ctx, TableKind::Bat)?),
        ),
        table_id::SDT_ACTUAL | table_id::SDT_OTHER => {
            let sdt = sdt::parse_sdt(section, ctx)?;
            (
                TableKey::Sdt {
                    table_id: tid,
                    transport_stream_id: ext,
                    original_network_id: sdt.original_network_id,
                },
                TableSection::Sdt(sdt),
            )
        }
        table_id::EIT_PF_ACTUAL..=table_id::EIT_SCHEDULE_LAST => {
            let eit = eit::parse_eit(section, ctx)?;
            (
                TableKey::Eit {
                    table_id: tid,
                    service_id: ext,
                    transport_stream_id: eit.transport_stream_id,
                    original_network_id: eit.original_network_id,
                },
                TableSection::Eit(eit),
            )
        }
        table_id::TDT => (TableKey::Tdt, TableSection::Tdt(tdt::parse_tdt(section)?)),
        table_id::TOT => (TableKey::Tot, TableSection::Tot(tdt::parse_tot(section, ctx)?)),
        table_id::RST => (TableKey::Rst, TableSection::Rst(rst::parse_rst(section)?)),
        table_id::DIT => (TableKey::Dit, TableSection::Dit(rst::parse_dit(section)?)),
        table_id::SIT => (TableKey::Sit, TableSection::Sit(sit::parse_sit(section, ctx)?)),
        table_id::FASTSCAN_FNT => (
            TableKey::Fastscan {
                table_id: tid,
                operator_network_id: ext,
            },
            TableSection::FastscanNetwork(nit::parse_nit(section, ctx, TableKind::FastscanNetwork)?),
        ),
        table_id::FASTSCAN_FST => (
            TableKey::Fastscan {
                table_id: tid,
                operator_network_id: ext,
            },
            TableSection::FastscanServices(fastscan::parse_fst(section, ctx)?),
        ),
        _ => (
            TableKey::Other {
                table_id: tid,
                table_id_extension: ext,
            },
            TableSection::Opaque(OpaqueSection {
                table_id: tid,
                table_id_extension: ext,
                body: section.body(),
            }),
        ),
    };
    Ok(decoded)
}

/// Fails unless the section is long-form; most SI tables require it.
pub(crate) fn require_long(section: &PsiSection) -> Result<(), SectionError> {
    if section.syntax_indicator {
        Ok(())
    } else {
        Err(SectionError::Malformed(format!(
            "table 0x{:02x} requires section_syntax_indicator",
            section.table_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::section::tests::long_section;

    #[test]
    fn test_unknown_table_is_opaque() {
        let raw = long_section(0x90, 0x0102, 0, 0, 0, &[1, 2, 3]);
        let section = PsiSection::parse(Bytes::from(raw), 0x500, 0).unwrap();
        let (key, content) = decode_section(&section, &DecodeContext::new(&NoTables)).unwrap();
        assert_eq!(
            key,
            TableKey::Other {
                table_id: 0x90,
                table_id_extension: 0x0102
            }
        );
        match content {
            TableSection::Opaque(o) => assert_eq!(o.body.as_ref(), &[1, 2, 3]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
