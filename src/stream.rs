//! The transport stream façade: owns the bytes, the scan results and the
//! table store, and answers queries about them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::constants::TS_PACKET_SIZE;
use crate::error::TsError;
use crate::packet::{probe, Framer, Framing, TsPacket};
use crate::parsers::{select_codec, EsCodec, EsDecoder};
use crate::pes::PesPacket;
use crate::processor::{PacketProcessor, PidRole, PidState};
use crate::psi::{EitEvent, EsInfo, PmtSection, SdtService, StoredSection, TableKey, TableSection, TableStore, TableView};
use crate::stats::{PcrTracker, StreamCounters};
use crate::types::Options;

/// A decoded transport stream.
pub struct TransportStream {
    data: Bytes,
    framing: Framing,
    options: Options,
    counters: StreamCounters,
    pids: BTreeMap<u16, PidState>,
    tables: Arc<TableStore>,
    pcr: PcrTracker,
    /// Packet index and sync offset wherever framing restarted.
    segments: Vec<(u64, u64)>,
    cancelled: bool,
    es_decoded: bool,
}

impl TransportStream {
    /// Scans an in-memory stream. Fails only when no packet stride is found.
    pub fn from_bytes(data: Bytes, options: Options) -> Result<Self, TsError> {
        let mut ts = Self::scan(data, options)?;
        if ts.options.decode_elementary_streams && !ts.cancelled {
            ts.decode_elementary_streams();
        }
        Ok(ts)
    }

    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self, TsError> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(Bytes::from(data), options)
    }

    /// Reads the file with tokio, scans on the blocking pool and decodes
    /// elementary streams in parallel.
    pub async fn open_async(path: impl AsRef<Path>, options: Options) -> Result<Self, TsError> {
        let data = Bytes::from(tokio::fs::read(path.as_ref()).await?);
        let decode = options.decode_elementary_streams;
        let mut ts = tokio::task::spawn_blocking(move || Self::scan(data, options))
            .await
            .map_err(|e| TsError::Worker(e.to_string()))??;
        if decode && !ts.cancelled {
            ts.decode_elementary_streams_parallel().await?;
        }
        Ok(ts)
    }

    fn scan(data: Bytes, options: Options) -> Result<Self, TsError> {
        let framing = probe(&data, options.packet_size, options.probe_window, options.min_sync_run)?;
        let mut framer = Framer::new(data.clone(), framing, options.min_sync_run);
        let mut processor = PacketProcessor::new(options.clone());
        let mut segments: Vec<(u64, u64)> = Vec::new();
        let mut expected_offset = None;
        let mut cancelled = false;
        let interval = options.cancel_check_interval.max(1);

        let mut index = 0u64;
        loop {
            if index % interval == 0 && options.is_cancelled() {
                cancelled = true;
                break;
            }
            let Some(packet) = framer.next() else {
                break;
            };
            if expected_offset != Some(packet.offset) {
                segments.push((packet.index, packet.offset));
            }
            expected_offset = Some(packet.offset + framing.stride as u64);
            processor.process_packet(&packet);
            index += 1;
        }

        if cancelled {
            warn!(packets = index, "scan cancelled");
            processor.abandon();
        } else {
            processor.finish();
        }

        let (pids, tables, mut counters, pcr) = processor.into_parts();
        counters.sync_losses = framer.sync_losses;
        counters.skipped_bytes = framer.skipped_bytes;
        counters.trailing_bytes = framer.trailing_bytes;
        counters.inconsistent_sections = tables.inconsistent_sections;

        info!(
            packets = counters.packets,
            pids = pids.len(),
            tables = tables.keys().count(),
            stride = framing.stride,
            sync_losses = counters.sync_losses,
            continuity_errors = counters.continuity_errors,
            crc_errors = counters.crc_errors,
            "scan finished"
        );

        Ok(TransportStream {
            data,
            framing,
            options,
            counters,
            pids,
            tables: Arc::new(tables),
            pcr,
            segments,
            cancelled,
            es_decoded: false,
        })
    }

    /// PIDs with PES packets and the stream type their PMT assigns.
    fn pes_pids(&self) -> Vec<(u16, u8)> {
        self.pids
            .values()
            .filter(|s| s.role == PidRole::Pes && !s.pes_packets.is_empty())
            .filter_map(|s| s.stream_type.map(|t| (s.pid, t)))
            .collect()
    }

    /// Runs the elementary-stream decoders PID by PID on this thread.
    /// Does nothing once the streams have been decoded.
    pub fn decode_elementary_streams(&mut self) {
        if self.es_decoded {
            return;
        }
        let retain = self.options.retain_pes_payloads;
        for (pid, stream_type) in self.pes_pids() {
            let codec = codec_for(&self.tables, pid, stream_type);
            if let (Some(codec), Some(state)) = (codec, self.pids.get_mut(&pid)) {
                decode_pid(pid, codec, &mut state.pes_packets, retain);
            }
        }
        self.es_decoded = true;
    }

    /// Decodes each PID in its own blocking task. Tasks own their PID's PES
    /// packets and share a read-only snapshot of the tables.
    pub async fn decode_elementary_streams_parallel(&mut self) -> Result<(), TsError> {
        if self.es_decoded {
            return Ok(());
        }
        let retain = self.options.retain_pes_payloads;
        let mut handles = Vec::new();
        for (pid, stream_type) in self.pes_pids() {
            let Some(state) = self.pids.get_mut(&pid) else {
                continue;
            };
            let mut packets = std::mem::take(&mut state.pes_packets);
            let tables = Arc::clone(&self.tables);
            handles.push(tokio::task::spawn_blocking(move || {
                if let Some(codec) = codec_for(&tables, pid, stream_type) {
                    decode_pid(pid, codec, &mut packets, retain);
                }
                (pid, packets)
            }));
        }
        for handle in handles {
            let (pid, packets) = handle.await.map_err(|e| TsError::Worker(e.to_string()))?;
            if let Some(state) = self.pids.get_mut(&pid) {
                state.pes_packets = packets;
            }
        }
        self.es_decoded = true;
        Ok(())
    }

    pub fn counters(&self) -> &StreamCounters {
        &self.counters
    }

    /// Mux rate in bit/s estimated from PCR deltas.
    pub fn bitrate(&self) -> Option<f64> {
        self.pcr.bitrate()
    }

    pub fn pcr(&self) -> &PcrTracker {
        &self.pcr
    }

    /// Physical packet stride (188, 192, 204 or 208).
    pub fn packet_size(&self) -> usize {
        self.framing.stride
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn pids(&self) -> &BTreeMap<u16, PidState> {
        &self.pids
    }

    pub fn pid(&self, pid: u16) -> Option<&PidState> {
        self.pids.get(&pid)
    }

    /// PES packets kept for a PID, in stream order.
    pub fn pes_packets(&self, pid: u16) -> &[PesPacket] {
        self.pids.get(&pid).map(|s| s.pes_packets.as_slice()).unwrap_or(&[])
    }

    /// Re-parses the packet at `index` from the underlying bytes.
    pub fn packet(&self, index: u64) -> Option<TsPacket> {
        if index >= self.counters.packets {
            return None;
        }
        let pos = self.segments.partition_point(|&(first, _)| first <= index);
        let (first, offset) = *self.segments.get(pos.checked_sub(1)?)?;
        let sync = (offset + (index - first) * self.framing.stride as u64) as usize;
        let raw = self.data.get(sync..sync + TS_PACKET_SIZE)?;
        let timestamp = match self.framing.prefix {
            0 => None,
            p => {
                let prefix = self.data.get(sync.checked_sub(p)?..sync)?;
                Some(u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]))
            }
        };
        Some(TsPacket::parse(
            self.data.slice(sync..sync + raw.len()),
            index,
            sync as u64,
            timestamp,
        ))
    }

    pub fn tables(&self) -> &TableStore {
        &self.tables
    }

    /// Shared snapshot of the tables, for readers on other threads.
    pub fn tables_snapshot(&self) -> Arc<TableStore> {
        Arc::clone(&self.tables)
    }

    /// Complete sections of one table.
    pub fn table(&self, key: &TableKey) -> Option<Vec<&StoredSection>> {
        self.tables.get(key)
    }

    /// Program number to PMT PID, from the PAT.
    pub fn programs(&self) -> Vec<(u16, u16)> {
        self.tables.pmt_pids()
    }

    pub fn pmt(&self, program_number: u16) -> Option<&PmtSection> {
        self.tables.programs().find(|p| p.program_number == program_number)
    }

    /// Elementary streams of a program.
    pub fn components(&self, program_number: u16) -> Vec<&EsInfo> {
        self.pmt(program_number)
            .map(|p| p.streams.iter().collect())
            .unwrap_or_default()
    }

    /// Program owning a PID, as elementary stream or PMT.
    pub fn program_for_pid(&self, pid: u16) -> Option<u16> {
        if let Some((program, _)) = self.tables.es_info(pid) {
            return Some(program);
        }
        self.tables
            .pmt_pids()
            .into_iter()
            .find(|&(_, pmt_pid)| pmt_pid == pid)
            .map(|(program, _)| program)
    }

    /// SDT services of a transport stream (actual and other).
    pub fn services(&self, transport_stream_id: u16) -> Vec<&SdtService> {
        self.tables
            .contents(move |k| matches!(k, TableKey::Sdt { transport_stream_id: t, .. } if *t == transport_stream_id))
            .filter_map(|c| match c {
                TableSection::Sdt(s) => Some(s),
                _ => None,
            })
            .flat_map(|s| s.services.iter())
            .collect()
    }

    pub fn service_name(&self, onid: Option<u16>, tsid: Option<u16>, service_id: u16) -> Option<String> {
        self.tables.service_name(onid, tsid, service_id)
    }

    pub fn logical_channel_number(&self, service_id: u16) -> Option<u16> {
        self.tables.logical_channel_number(service_id)
    }

    /// EIT events announced for a service, present/following first.
    pub fn events(&self, service_id: u16) -> Vec<&EitEvent> {
        let mut keyed: Vec<(u8, &EitEvent)> = self
            .tables
            .complete_tables()
            .filter_map(|(k, sections)| match k {
                TableKey::Eit { table_id, service_id: s, .. } if *s == service_id => Some((*table_id, sections)),
                _ => None,
            })
            .flat_map(|(tid, sections)| {
                sections.into_iter().filter_map(move |s| match &s.content {
                    TableSection::Eit(e) => Some(e.events.iter().map(move |ev| (tid, ev))),
                    _ => None,
                })
            })
            .flatten()
            .collect();
        keyed.sort_by_key(|(tid, ev)| (*tid, ev.start_time));
        keyed.into_iter().map(|(_, ev)| ev).collect()
    }

    /// Latest UTC time from the TDT, else the TOT.
    pub fn utc_time(&self) -> Option<DateTime<Utc>> {
        self.tables
            .contents(|k| matches!(k, TableKey::Tdt | TableKey::Tot))
            .filter_map(|c| match c {
                TableSection::Tdt(t) => t.utc_time,
                TableSection::Tot(t) => t.utc_time,
                _ => None,
            })
            .max()
    }

    /// Generic JSON view of every decoded entity.
    pub fn tree(&self) -> serde_json::Value {
        crate::tree::build(self)
    }

    /// Compact JSON summary of programs, services and counters.
    pub fn summary(&self) -> crate::report::Summary {
        crate::report::Summary::from_stream(self)
    }
}

fn codec_for(tables: &TableStore, pid: u16, stream_type: u8) -> Option<EsCodec> {
    let es = tables.es_info(pid).map(|(_, es)| es);
    select_codec(stream_type, es)
}

fn decode_pid(pid: u16, codec: EsCodec, packets: &mut [PesPacket], retain: bool) {
    debug!(pid, ?codec, packets = packets.len(), "decoding elementary stream");
    let mut decoder = EsDecoder::new(codec);
    for pes in packets.iter_mut() {
        decoder.decode(pes);
        if !retain {
            pes.release_payload();
        }
    }
    decoder.finish(packets.last_mut());
    let errors: usize = packets.iter().map(|p| p.es_errors.len()).sum();
    if errors > 0 {
        debug!(pid, ?codec, errors, "elementary stream units skipped");
    }
}
