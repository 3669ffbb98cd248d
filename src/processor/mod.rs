//! Per-packet demultiplexing: continuity, PID roles, section and PES
//! reassembly, table store updates.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{PES_START_CODE, PID_NULL, SYSTEM_PIDS};
use crate::error::SectionError;
use crate::packet::TsPacket;
use crate::pes::{PesAssembler, PesPacket};
use crate::psi::{decode_section, DecodeContext, InsertOutcome, PsiSection, SectionAssembler, TableKey, TableStore};
use crate::stats::{PcrTracker, StreamCounters};
use crate::types::Options;

/// What a PID carries. Set on its first unit start and fixed thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PidRole {
    #[default]
    Unclassified,
    Psi,
    Pes,
}

/// PMT stream types whose payload is carried in sections.
fn is_section_stream_type(stream_type: u8) -> bool {
    matches!(stream_type, 0x05 | 0x0A..=0x0D | 0x86)
}

/// Mutable state owned by one PID.
#[derive(Debug, Serialize)]
pub struct PidState {
    pub pid: u16,
    pub role: PidRole,
    pub packets: u64,
    pub first_packet: u64,
    pub continuity_errors: u64,
    pub duplicates: u64,
    pub transport_errors: u64,
    pub scrambled: u64,
    pub role_conflicts: u64,
    pub pcr_count: u64,
    pub sections: u64,
    pub pes_count: u64,
    /// PES packets completed beyond `max_pes_per_pid`.
    pub pes_dropped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_number: Option<u16>,
    #[serde(skip)]
    pub pes_packets: Vec<PesPacket>,
    #[serde(skip)]
    last_cc: Option<u8>,
    #[serde(skip)]
    last_raw: Option<Bytes>,
    #[serde(skip)]
    repeated: bool,
    #[serde(skip)]
    section_asm: SectionAssembler,
    #[serde(skip)]
    pes_asm: PesAssembler,
}

impl PidState {
    fn new(pid: u16, index: u64) -> Self {
        Self {
            pid,
            role: PidRole::Unclassified,
            packets: 0,
            first_packet: index,
            continuity_errors: 0,
            duplicates: 0,
            transport_errors: 0,
            scrambled: 0,
            role_conflicts: 0,
            pcr_count: 0,
            sections: 0,
            pes_count: 0,
            pes_dropped: 0,
            stream_type: None,
            program_number: None,
            pes_packets: Vec::new(),
            last_cc: None,
            last_raw: None,
            repeated: false,
            section_asm: SectionAssembler::new(),
            pes_asm: PesAssembler::new(pid),
        }
    }

    /// PES start packets that did not begin with 0x000001.
    pub fn start_code_errors(&self) -> u64 {
        self.pes_asm.start_code_errors
    }

    /// Incomplete sections and PES packets that were dropped.
    pub fn discarded(&self) -> u64 {
        self.section_asm.discarded + self.pes_asm.discarded
    }

    fn reset_accumulation(&mut self) {
        self.section_asm.reset();
        self.pes_asm.reset();
    }
}

enum Continuity {
    Ok,
    Duplicate,
    Error { expected: u8 },
}

/// Drives the per-PID state machines for a packet sequence.
pub struct PacketProcessor {
    options: Options,
    pub pids: BTreeMap<u16, PidState>,
    pub store: TableStore,
    pub counters: StreamCounters,
    pub pcr: PcrTracker,
    /// Roles implied by the PAT and PMTs, refreshed when either completes.
    known_roles: HashMap<u16, PidRole>,
    sections: Vec<(Bytes, u64)>,
    completed: Vec<PesPacket>,
}

impl PacketProcessor {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            pids: BTreeMap::new(),
            store: TableStore::new(),
            counters: StreamCounters::default(),
            pcr: PcrTracker::new(),
            known_roles: system_roles(),
            sections: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Processes one packet.
    pub fn process_packet(&mut self, packet: &TsPacket) {
        self.counters.packets += 1;
        let pid = packet.pid;
        let state = self
            .pids
            .entry(pid)
            .or_insert_with(|| PidState::new(pid, packet.index));
        state.packets += 1;
        if pid == PID_NULL {
            self.counters.null_packets += 1;
            return;
        }

        if packet.transport_error {
            self.counters.transport_errors += 1;
            state.transport_errors += 1;
            state.last_cc = None;
            state.reset_accumulation();
            return;
        }

        if let Some(af) = &packet.adaptation_field {
            if let Some(pcr) = af.pcr {
                state.pcr_count += 1;
                self.pcr.push(pid, pcr, packet.offset, af.discontinuity);
            }
            if af.discontinuity {
                state.last_cc = None;
            }
        }

        if !packet.has_payload() {
            return;
        }

        match check_continuity(state, packet) {
            Continuity::Ok => {}
            Continuity::Duplicate => {
                self.counters.duplicates += 1;
                state.duplicates += 1;
                return;
            }
            Continuity::Error { expected } => {
                self.counters.continuity_errors += 1;
                state.continuity_errors += 1;
                warn!(
                    pid,
                    packet = packet.index,
                    expected,
                    found = packet.continuity_counter,
                    "continuity error"
                );
                state.reset_accumulation();
            }
        }

        if packet.scrambling_control != 0 {
            self.counters.scrambled += 1;
            state.scrambled += 1;
            return;
        }

        let payload = packet.payload();
        if payload.is_empty() {
            return;
        }

        if packet.payload_unit_start {
            let known = self.known_roles.get(&pid).copied();
            match state.role {
                PidRole::Unclassified => {
                    state.role = known.unwrap_or_else(|| sniff_role(&payload));
                    debug!(pid, role = ?state.role, "PID classified");
                }
                role => {
                    if known.is_some_and(|k| k != role) {
                        self.counters.role_conflicts += 1;
                        state.role_conflicts += 1;
                        warn!(pid, ?role, packet = packet.index, "unit start contradicts PID role");
                        return;
                    }
                }
            }
        }

        let role = state.role;
        match role {
            PidRole::Unclassified => {}
            PidRole::Psi => {
                state
                    .section_asm
                    .push(&payload, packet.payload_unit_start, packet.index, &mut self.sections);
                if !self.sections.is_empty() {
                    let sections = std::mem::take(&mut self.sections);
                    for (raw, first) in sections {
                        self.handle_section(pid, raw, first);
                    }
                }
            }
            PidRole::Pes => {
                state
                    .pes_asm
                    .push(&payload, packet.payload_unit_start, packet.index, &mut self.completed);
                self.collect_pes(pid);
            }
        }
    }

    fn collect_pes(&mut self, pid: u16) {
        if self.completed.is_empty() {
            return;
        }
        let limit = self.options.max_pes_per_pid;
        let release = !self.options.retain_pes_payloads && !self.options.decode_elementary_streams;
        let Some(state) = self.pids.get_mut(&pid) else {
            return;
        };
        for mut pes in self.completed.drain(..) {
            self.counters.pes_packets += 1;
            state.pes_count += 1;
            if pes.header_error.is_some() || pes.truncated {
                self.counters.pes_errors += 1;
            }
            if limit.is_some_and(|max| state.pes_packets.len() >= max) {
                state.pes_dropped += 1;
                continue;
            }
            if release {
                pes.release_payload();
            }
            state.pes_packets.push(pes);
        }
    }

    fn handle_section(&mut self, pid: u16, raw: Bytes, first_packet: u64) {
        self.counters.sections += 1;
        if let Some(state) = self.pids.get_mut(&pid) {
            state.sections += 1;
        }
        let section = match PsiSection::parse(raw, pid, first_packet) {
            Ok(s) => s,
            Err(e @ SectionError::CrcMismatch { .. }) => {
                self.counters.crc_errors += 1;
                warn!(pid, packet = first_packet, "{}", e);
                return;
            }
            Err(e) => {
                self.counters.section_errors += 1;
                debug!(pid, packet = first_packet, "dropping section: {}", e);
                return;
            }
        };

        let ctx = DecodeContext {
            tables: &self.store,
            charset: self.options.default_charset,
            default_private_data_specifier: self.options.default_private_data_specifier,
        };
        let (key, content) = match decode_section(&section, &ctx) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.counters.section_errors += 1;
                debug!(pid, table_id = section.table_id, "undecodable section: {}", e);
                return;
            }
        };

        match self.store.insert(key, section, content) {
            Ok(InsertOutcome::Completed) => {
                if matches!(key, TableKey::Pat | TableKey::Pmt { .. }) {
                    self.refresh_known_roles();
                }
            }
            Ok(_) => {}
            Err(e) => {
                self.counters.inconsistent_sections = self.store.inconsistent_sections;
                warn!(pid, table = key.name(), "inconsistent section: {}", e);
            }
        }
    }

    fn refresh_known_roles(&mut self) {
        let mut roles = system_roles();
        for (_, pmt_pid) in self.store.pmt_pids() {
            roles.insert(pmt_pid, PidRole::Psi);
        }
        for pmt in self.store.programs() {
            for es in &pmt.streams {
                let role = if is_section_stream_type(es.stream_type) {
                    PidRole::Psi
                } else {
                    PidRole::Pes
                };
                roles.entry(es.elementary_pid).or_insert(role);
            }
        }
        self.known_roles = roles;
    }

    /// End of data: pending sections are dropped, bounded PES packets are
    /// emitted as truncated, and stream types are attached from the PMTs.
    pub fn finish(&mut self) {
        let pids: Vec<u16> = self.pids.keys().copied().collect();
        for pid in pids {
            if let Some(state) = self.pids.get_mut(&pid) {
                state.section_asm.reset();
                state.pes_asm.finish(&mut self.completed);
            }
            self.collect_pes(pid);
        }
        self.store.resolve_channel_names();
        self.annotate_streams();
    }

    /// Cancellation: every incomplete accumulation is discarded.
    pub fn abandon(&mut self) {
        for state in self.pids.values_mut() {
            state.reset_accumulation();
        }
        self.store.resolve_channel_names();
        self.annotate_streams();
    }

    fn annotate_streams(&mut self) {
        for pmt in self.store.programs() {
            for es in &pmt.streams {
                if let Some(state) = self.pids.get_mut(&es.elementary_pid) {
                    state.stream_type = Some(es.stream_type);
                    state.program_number = Some(pmt.program_number);
                }
            }
        }
    }

    pub fn into_parts(self) -> (BTreeMap<u16, PidState>, TableStore, StreamCounters, PcrTracker) {
        (self.pids, self.store, self.counters, self.pcr)
    }
}

fn system_roles() -> HashMap<u16, PidRole> {
    SYSTEM_PIDS.iter().map(|&p| (p, PidRole::Psi)).collect()
}

fn sniff_role(payload: &[u8]) -> PidRole {
    if payload.len() >= 3 && payload[..3] == PES_START_CODE {
        PidRole::Pes
    } else {
        PidRole::Psi
    }
}

/// Expected counter is previous + 1 mod 16. One byte-identical repeat with
/// the same counter is a tolerated duplicate; a second one is an error.
fn check_continuity(state: &mut PidState, packet: &TsPacket) -> Continuity {
    let cc = packet.continuity_counter;
    let result = match state.last_cc {
        None => Continuity::Ok,
        Some(prev) if cc == prev => {
            let identical = state.last_raw.as_ref().is_some_and(|raw| raw == packet.raw());
            if identical && !state.repeated {
                state.repeated = true;
                return Continuity::Duplicate;
            }
            Continuity::Error {
                expected: (prev + 1) & 0x0F,
            }
        }
        Some(prev) if cc == (prev + 1) & 0x0F => Continuity::Ok,
        Some(prev) => Continuity::Error {
            expected: (prev + 1) & 0x0F,
        },
    };
    state.repeated = false;
    state.last_cc = Some(cc);
    state.last_raw = Some(packet.raw().clone());
    result
}
