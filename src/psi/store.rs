//! Versioned, keyed table store.
//!
//! Sections are stored at `table[key][section_number]`. A table becomes
//! visible only once every slot `0..=last_section_number` of one version is
//! filled; a section with a different version replaces the whole slot array.
//! EIT schedule tables are sent in segments of eight sections, and slots past
//! a segment's `segment_last_section_number` are not expected.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::{EsInfo, PmtSection, PsiSection, TableSection};
use crate::descriptors::private::fill_service_names;
use crate::descriptors::DescriptorKind;
use crate::error::SectionError;

/// Identity of a table instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TableKey {
    Pat,
    Cat,
    Tsdt,
    Pmt { program_number: u16 },
    Nit { table_id: u8, network_id: u16 },
    Bat { bouquet_id: u16 },
    Sdt { table_id: u8, transport_stream_id: u16, original_network_id: u16 },
    Eit { table_id: u8, service_id: u16, transport_stream_id: u16, original_network_id: u16 },
    Tdt,
    Tot,
    Rst,
    Sit,
    Dit,
    Fastscan { table_id: u8, operator_network_id: u16 },
    Other { table_id: u8, table_id_extension: u16 },
}

impl TableKey {
    pub fn name(&self) -> &'static str {
        match self {
            TableKey::Pat => "PAT",
            TableKey::Cat => "CAT",
            TableKey::Tsdt => "TSDT",
            TableKey::Pmt { .. } => "PMT",
            TableKey::Nit { table_id: 0x40, .. } => "NIT actual",
            TableKey::Nit { .. } => "NIT other",
            TableKey::Bat { .. } => "BAT",
            TableKey::Sdt { table_id: 0x42, .. } => "SDT actual",
            TableKey::Sdt { .. } => "SDT other",
            TableKey::Eit { table_id: 0x4E, .. } => "EIT p/f actual",
            TableKey::Eit { table_id: 0x4F, .. } => "EIT p/f other",
            TableKey::Eit { table_id: 0x50..=0x5F, .. } => "EIT schedule actual",
            TableKey::Eit { .. } => "EIT schedule other",
            TableKey::Tdt => "TDT",
            TableKey::Tot => "TOT",
            TableKey::Rst => "RST",
            TableKey::Sit => "SIT",
            TableKey::Dit => "DIT",
            TableKey::Fastscan { table_id: 0xBC, .. } => "fastscan FNT",
            TableKey::Fastscan { .. } => "fastscan FST",
            TableKey::Other { .. } => "private",
        }
    }

    /// Single-instance tables that are simply overwritten by the latest section.
    fn is_overwritten(&self) -> bool {
        matches!(self, TableKey::Tdt | TableKey::Tot | TableKey::Rst | TableKey::Dit)
    }
}

/// A section together with its decoded content.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSection {
    pub section: PsiSection,
    pub content: TableSection,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSlot {
    pub version: u8,
    pub last_section_number: u8,
    #[serde(skip)]
    sections: Vec<Option<Arc<StoredSection>>>,
    /// Slots announced as absent by an EIT schedule segment.
    #[serde(skip)]
    unused: Vec<bool>,
    pub versions_seen: u32,
    pub sections_received: u64,
    pub repetitions: u64,
}

impl TableSlot {
    fn new(version: u8, last: u8) -> Self {
        Self {
            version,
            last_section_number: last,
            sections: vec![None; last as usize + 1],
            unused: vec![false; last as usize + 1],
            versions_seen: 1,
            sections_received: 0,
            repetitions: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.sections.iter().zip(&self.unused).all(|(s, unused)| s.is_some() || *unused)
    }

    /// All sections in order, only when the table is complete.
    pub fn sections(&self) -> Option<Vec<&StoredSection>> {
        if !self.is_complete() {
            return None;
        }
        Some(self.sections.iter().filter_map(|s| s.as_deref()).collect())
    }

    /// Marks the rest of the segment holding `number` as not transmitted.
    fn close_segment(&mut self, number: u8, segment_last: u8) {
        let segment_end = (number as usize | 7).min(self.sections.len() - 1);
        let first_unused = segment_last.max(number) as usize + 1;
        for i in first_unused..=segment_end {
            if self.sections[i].is_none() {
                self.unused[i] = true;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored; the table is still missing sections.
    Partial,
    /// This section completed the table.
    Completed,
    /// Byte-identical repeat of a stored section.
    Repeat,
    /// Marked "next" (current_next_indicator = 0); not applied.
    NotCurrent,
}

/// Read-only lookups available to decoders while the scan is running.
pub trait TableView {
    /// Name from an SDT service descriptor; `None` ids match any.
    fn service_name(&self, onid: Option<u16>, tsid: Option<u16>, service_id: u16) -> Option<String>;

    /// Logical channel number from NIT/BAT descriptors.
    fn logical_channel_number(&self, service_id: u16) -> Option<u16>;
}

/// Empty view, used before any table is known and in tests.
pub struct NoTables;

impl TableView for NoTables {
    fn service_name(&self, _: Option<u16>, _: Option<u16>, _: u16) -> Option<String> {
        None
    }

    fn logical_channel_number(&self, _: u16) -> Option<u16> {
        None
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct TableStore {
    #[serde(skip)]
    tables: BTreeMap<TableKey, TableSlot>,
    pub inconsistent_sections: u64,
    pub version_changes: u64,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TableKey, section: PsiSection, content: TableSection) -> Result<InsertOutcome, SectionError> {
        if !section.current_next {
            return Ok(InsertOutcome::NotCurrent);
        }
        let version = section.version_number;
        let number = section.section_number;
        let last = section.last_section_number;
        if number > last {
            self.inconsistent_sections += 1;
            return Err(SectionError::SectionNumberOutOfRange {
                section_number: number,
                last_section_number: last,
            });
        }

        let overwritten = key.is_overwritten();
        let slot = self.tables.entry(key).or_insert_with(|| TableSlot::new(version, last));
        if slot.version != version || (overwritten && slot.last_section_number != last) {
            if !overwritten {
                debug!(table = key.name(), ?key, from = slot.version, to = version, "table version change");
                self.version_changes += 1;
            }
            let seen = slot.versions_seen + 1;
            let received = slot.sections_received;
            let repetitions = slot.repetitions;
            *slot = TableSlot::new(version, last);
            slot.versions_seen = seen;
            slot.sections_received = received;
            slot.repetitions = repetitions;
        } else if slot.last_section_number != last {
            self.inconsistent_sections += 1;
            return Err(SectionError::LastSectionChanged {
                version,
                previous: slot.last_section_number,
                current: last,
            });
        }

        slot.sections_received += 1;
        let index = number as usize;
        if let Some(existing) = &slot.sections[index] {
            if existing.section.raw() == section.raw() {
                slot.repetitions += 1;
                return Ok(InsertOutcome::Repeat);
            }
        }
        let was_complete = slot.is_complete();
        if let (TableKey::Eit { table_id: 0x50..=0x6F, .. }, TableSection::Eit(eit)) = (&key, &content) {
            slot.close_segment(number, eit.segment_last_section_number);
        }
        slot.version = version;
        slot.unused[index] = false;
        slot.sections[index] = Some(Arc::new(StoredSection { section, content }));
        if slot.is_complete() {
            if !was_complete {
                debug!(table = key.name(), ?key, version, sections = last as u32 + 1, "table complete");
            }
            Ok(InsertOutcome::Completed)
        } else {
            Ok(InsertOutcome::Partial)
        }
    }

    /// Complete sections of a table, in section order.
    pub fn get(&self, key: &TableKey) -> Option<Vec<&StoredSection>> {
        self.tables.get(key)?.sections()
    }

    pub fn slot(&self, key: &TableKey) -> Option<&TableSlot> {
        self.tables.get(key)
    }

    /// Every key that has at least one stored section.
    pub fn keys(&self) -> impl Iterator<Item = &TableKey> {
        self.tables.keys()
    }

    /// Complete tables only.
    pub fn complete_tables(&self) -> impl Iterator<Item = (&TableKey, Vec<&StoredSection>)> {
        self.tables.iter().filter_map(|(k, slot)| slot.sections().map(|s| (k, s)))
    }

    /// Fills logical channel service names of NIT/BAT entries that were
    /// decoded before the matching SDT was complete.
    pub fn resolve_channel_names(&mut self) {
        let keys: Vec<TableKey> = self
            .tables
            .keys()
            .filter(|k| matches!(k, TableKey::Nit { .. } | TableKey::Bat { .. }))
            .copied()
            .collect();
        for key in keys {
            let Some(mut slot) = self.tables.remove(&key) else {
                continue;
            };
            for stored in slot.sections.iter_mut().flatten() {
                let stored = Arc::make_mut(stored);
                let (TableSection::Nit(nit) | TableSection::Bat(nit)) = &mut stored.content else {
                    continue;
                };
                for entry in &mut nit.transport_streams {
                    let (onid, tsid) = (entry.original_network_id, entry.transport_stream_id);
                    for d in &mut entry.descriptors {
                        fill_service_names(&mut d.kind, |sid| self.service_name(Some(onid), Some(tsid), sid));
                    }
                }
            }
            self.tables.insert(key, slot);
        }
    }

    /// Decoded content of every section of every complete table of a kind.
    pub fn contents<'a>(&'a self, pred: impl Fn(&TableKey) -> bool + 'a) -> impl Iterator<Item = &'a TableSection> + 'a {
        self.complete_tables()
            .filter(move |(k, _)| pred(k))
            .flat_map(|(_, sections)| sections.into_iter().map(|s| &s.content))
    }

    /// PIDs carrying PMTs according to the complete PAT.
    pub fn pmt_pids(&self) -> Vec<(u16, u16)> {
        self.contents(|k| matches!(k, TableKey::Pat))
            .filter_map(|c| match c {
                TableSection::Pat(p) => Some(p),
                _ => None,
            })
            .flat_map(|p| p.programs.iter())
            .filter(|e| e.program_number != 0)
            .map(|e| (e.program_number, e.pid))
            .collect()
    }

    pub fn is_pmt_pid(&self, pid: u16) -> bool {
        self.pmt_pids().iter().any(|&(_, p)| p == pid)
    }

    /// Every complete PMT section.
    pub fn programs(&self) -> impl Iterator<Item = &PmtSection> {
        self.contents(|k| matches!(k, TableKey::Pmt { .. }))
            .filter_map(|c| match c {
                TableSection::Pmt(p) => Some(p),
                _ => None,
            })
    }

    /// The PMT entry mapping an elementary PID, with its program number.
    pub fn es_info(&self, pid: u16) -> Option<(u16, &EsInfo)> {
        self.programs().find_map(|p| {
            p.streams
                .iter()
                .find(|s| s.elementary_pid == pid)
                .map(|s| (p.program_number, s))
        })
    }
}

impl TableView for TableStore {
    fn service_name(&self, onid: Option<u16>, tsid: Option<u16>, service_id: u16) -> Option<String> {
        self.complete_tables()
            .filter(|(k, _)| match k {
                TableKey::Sdt {
                    transport_stream_id,
                    original_network_id,
                    ..
                } => onid.is_none_or(|o| o == *original_network_id) && tsid.is_none_or(|t| t == *transport_stream_id),
                _ => false,
            })
            .flat_map(|(_, sections)| sections.into_iter())
            .filter_map(|s| match &s.content {
                TableSection::Sdt(sdt) => Some(sdt),
                _ => None,
            })
            .flat_map(|sdt| sdt.services.iter())
            .filter(|svc| svc.service_id == service_id)
            .find_map(|svc| {
                svc.descriptors.iter().find_map(|d| match &d.kind {
                    DescriptorKind::Service(s) => Some(s.service_name.clone()),
                    _ => None,
                })
            })
    }

    fn logical_channel_number(&self, service_id: u16) -> Option<u16> {
        self.contents(|k| matches!(k, TableKey::Nit { .. } | TableKey::Bat { .. }))
            .filter_map(|c| match c {
                TableSection::Nit(n) | TableSection::Bat(n) => Some(n),
                _ => None,
            })
            .flat_map(|n| n.transport_streams.iter())
            .flat_map(|ts| ts.descriptors.iter())
            .find_map(|d| match &d.kind {
                DescriptorKind::LogicalChannel(l) => l
                    .entries
                    .iter()
                    .find(|e| e.service_id == service_id)
                    .map(|e| e.logical_channel_number),
                DescriptorKind::NordigLogicalChannelV2(l) => l
                    .lists
                    .iter()
                    .flat_map(|list| list.entries.iter())
                    .find(|e| e.service_id == service_id)
                    .map(|e| e.logical_channel_number),
                DescriptorKind::SkyLogicalChannel(l) => l
                    .channels
                    .iter()
                    .find(|c| c.service_id == service_id)
                    .map(|c| c.logical_channel_number),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::section::tests::long_section;
    use crate::psi::{decode_section, DecodeContext};
    use bytes::Bytes;

    fn feed(store: &mut TableStore, raw: Vec<u8>) -> Result<InsertOutcome, SectionError> {
        let section = PsiSection::parse(Bytes::from(raw), 0, 0)?;
        let ctx = DecodeContext::new(&NoTables);
        let (key, content) = decode_section(&section, &ctx)?;
        store.insert(key, section, content)
    }

    fn pat(version: u8, number: u8, last: u8, program: u16) -> Vec<u8> {
        let pid = 0x100 + program;
        long_section(0x00, 1, version, number, last, &[(program >> 8) as u8, program as u8, 0xE0 | (pid >> 8) as u8, pid as u8])
    }

    #[test]
    fn test_table_visible_only_when_complete() {
        let mut store = TableStore::new();
        assert_eq!(feed(&mut store, pat(0, 0, 1, 1)), Ok(InsertOutcome::Partial));
        assert!(store.get(&TableKey::Pat).is_none());
        assert_eq!(feed(&mut store, pat(0, 1, 1, 2)), Ok(InsertOutcome::Completed));
        assert_eq!(store.get(&TableKey::Pat).map(|s| s.len()), Some(2));
        assert_eq!(store.pmt_pids(), vec![(1, 0x101), (2, 0x102)]);
    }

    #[test]
    fn test_repeated_section_is_idempotent() {
        let mut store = TableStore::new();
        feed(&mut store, pat(0, 0, 0, 1)).unwrap();
        assert_eq!(feed(&mut store, pat(0, 0, 0, 1)), Ok(InsertOutcome::Repeat));
        assert_eq!(store.get(&TableKey::Pat).map(|s| s.len()), Some(1));
        assert_eq!(store.slot(&TableKey::Pat).map(|s| s.repetitions), Some(1));
    }

    #[test]
    fn test_new_version_replaces_whole_set() {
        let mut store = TableStore::new();
        feed(&mut store, pat(0, 0, 1, 1)).unwrap();
        feed(&mut store, pat(0, 1, 1, 2)).unwrap();
        // version 1, first of two sections: nothing readable until complete
        assert_eq!(feed(&mut store, pat(1, 0, 1, 3)), Ok(InsertOutcome::Partial));
        assert!(store.get(&TableKey::Pat).is_none());
        assert_eq!(feed(&mut store, pat(1, 1, 1, 4)), Ok(InsertOutcome::Completed));
        assert_eq!(store.pmt_pids(), vec![(3, 0x103), (4, 0x104)]);
        assert_eq!(store.version_changes, 1);
        assert_eq!(store.slot(&TableKey::Pat).map(|s| s.versions_seen), Some(2));
    }

    fn eit_schedule(number: u8, last: u8, segment_last: u8) -> Vec<u8> {
        long_section(0x50, 1, 0, number, last, &[0x00, 0x05, 0x00, 0x01, segment_last, 0x50])
    }

    #[test]
    fn test_eit_schedule_segments_complete_with_gaps() {
        let mut store = TableStore::new();
        assert_eq!(feed(&mut store, eit_schedule(0, 8, 0)), Ok(InsertOutcome::Partial));
        assert_eq!(feed(&mut store, eit_schedule(8, 8, 8)), Ok(InsertOutcome::Completed));
        let key = TableKey::Eit {
            table_id: 0x50,
            service_id: 1,
            transport_stream_id: 5,
            original_network_id: 1,
        };
        let numbers: Vec<u8> = store.get(&key).unwrap().iter().map(|s| s.section.section_number).collect();
        assert_eq!(numbers, vec![0, 8]);
        assert_eq!(store.complete_tables().count(), 1);
    }

    #[test]
    fn test_eit_schedule_waits_for_announced_sections() {
        let mut store = TableStore::new();
        // segment 0 announces sections 0 and 1
        feed(&mut store, eit_schedule(0, 8, 1)).unwrap();
        assert_eq!(feed(&mut store, eit_schedule(8, 8, 8)), Ok(InsertOutcome::Partial));
        assert_eq!(feed(&mut store, eit_schedule(1, 8, 1)), Ok(InsertOutcome::Completed));
    }

    #[test]
    fn test_next_section_not_applied() {
        let mut store = TableStore::new();
        let mut raw = pat(0, 0, 0, 1);
        raw[5] &= !0x01;
        let crc_at = raw.len() - 4;
        let crc = crate::psi::section::CRC_MPEG.checksum(&raw[..crc_at]);
        raw[crc_at..].copy_from_slice(&crc.to_be_bytes());
        assert_eq!(feed(&mut store, raw), Ok(InsertOutcome::NotCurrent));
        assert!(store.slot(&TableKey::Pat).is_none());
    }

    #[test]
    fn test_changed_last_section_number_is_inconsistent() {
        let mut store = TableStore::new();
        feed(&mut store, pat(0, 0, 1, 1)).unwrap();
        assert!(matches!(
            feed(&mut store, pat(0, 1, 2, 2)),
            Err(SectionError::LastSectionChanged { .. })
        ));
        assert_eq!(store.inconsistent_sections, 1);
    }
}
