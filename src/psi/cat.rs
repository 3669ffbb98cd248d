//! CAT (0x01) and TSDT (0x03): a bare descriptor loop.

use serde::Serialize;

use super::{require_long, DecodeContext, PsiSection};
use crate::descriptors::{decode_loop, CaPidKind, Descriptor, DescriptorKind, TableKind};
use crate::error::SectionError;

#[derive(Debug, Clone, Serialize)]
pub struct CatSection {
    pub descriptors: Vec<Descriptor>,
}

impl CatSection {
    /// (CA_system_ID, EMM PID) pairs.
    pub fn emm_pids(&self) -> Vec<(u16, u16)> {
        self.descriptors
            .iter()
            .filter_map(|d| match &d.kind {
                DescriptorKind::Ca(ca) if ca.pid_kind == CaPidKind::Emm => Some((ca.ca_system_id, ca.ca_pid)),
                _ => None,
            })
            .collect()
    }
}

pub fn parse_cat(section: &PsiSection, ctx: &DecodeContext<'_>, kind: TableKind) -> Result<CatSection, SectionError> {
    require_long(section)?;
    Ok(CatSection {
        descriptors: decode_loop(&section.body(), &ctx.env(kind)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::section::tests::long_section;
    use crate::psi::NoTables;
    use bytes::Bytes;

    #[test]
    fn test_cat_emm_pids() {
        let raw = long_section(0x01, 0xFFFF, 0, 0, 0, &[0x09, 0x04, 0x06, 0x04, 0xE0, 0x50]);
        let section = PsiSection::parse(Bytes::from(raw), 1, 0).unwrap();
        let cat = parse_cat(&section, &DecodeContext::new(&NoTables), TableKind::Cat).unwrap();
        assert_eq!(cat.emm_pids(), vec![(0x0604, 0x50)]);
    }
}
