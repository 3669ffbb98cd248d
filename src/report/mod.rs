//! Summary report of a scanned transport stream

use serde::Serialize;

use crate::descriptors::dvb::service_type_name;
use crate::psi::pmt::stream_type_name;
use crate::psi::sdt::running_status_name;
use crate::psi::{EsInfo, TableKey, TableSection};
use crate::stats::StreamCounters;
use crate::stream::TransportStream;

/// One elementary stream of a program.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub pid: u16,
    pub stream_type: u8,
    pub type_name: &'static str,
    pub packets: u64,
    pub pes_packets: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Decoder description, e.g. "H.264 High 1920x1080".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramSummary {
    pub program: u16,
    pub pmt_pid: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcr_pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmt_version: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_channel_number: Option<u16>,
    pub streams: Vec<StreamSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub original_network_id: u16,
    pub transport_stream_id: u16,
    pub service_id: u16,
    pub actual: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<&'static str>,
    pub running_status: &'static str,
    pub scrambled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: &'static str,
    pub key: TableKey,
    pub version: u8,
    pub complete: bool,
    pub sections_received: u64,
    pub versions_seen: u32,
}

/// JSON-serializable overview of a scan.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub generated: String,
    pub packet_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_time: Option<String>,
    pub cancelled: bool,
    pub counters: StreamCounters,
    pub programs: Vec<ProgramSummary>,
    pub services: Vec<ServiceSummary>,
    pub tables: Vec<TableSummary>,
}

fn stream_summary(ts: &TransportStream, es: &EsInfo) -> StreamSummary {
    let state = ts.pid(es.elementary_pid);
    let packets = state.map(|s| s.packets).unwrap_or(0);
    // share of the mux rate by packet count
    let bitrate_kbps = match (ts.bitrate(), ts.counters().packets) {
        (Some(rate), total) if total > 0 => Some(rate * packets as f64 / total as f64 / 1000.0),
        _ => None,
    };
    StreamSummary {
        pid: es.elementary_pid,
        stream_type: es.stream_type,
        type_name: stream_type_name(es.stream_type),
        packets,
        pes_packets: state.map(|s| s.pes_count).unwrap_or(0),
        language: es.language().map(str::to_string),
        codec: ts
            .pes_packets(es.elementary_pid)
            .iter()
            .filter_map(|p| p.content.as_ref())
            .find_map(|c| c.summary()),
        bitrate_kbps,
    }
}

fn services(ts: &TransportStream) -> Vec<ServiceSummary> {
    let mut out = Vec::new();
    for (key, sections) in ts.tables().complete_tables() {
        let TableKey::Sdt { table_id, .. } = key else {
            continue;
        };
        for stored in sections {
            let TableSection::Sdt(sdt) = &stored.content else {
                continue;
            };
            for svc in &sdt.services {
                let identity = svc.identity();
                out.push(ServiceSummary {
                    original_network_id: sdt.original_network_id,
                    transport_stream_id: sdt.transport_stream_id,
                    service_id: svc.service_id,
                    actual: *table_id == crate::constants::table_id::SDT_ACTUAL,
                    name: identity.map(|(_, name, _)| name.to_string()),
                    provider: identity.map(|(provider, _, _)| provider.to_string()),
                    service_type: identity.map(|(_, _, t)| service_type_name(t)),
                    running_status: running_status_name(svc.running_status),
                    scrambled: svc.free_ca_mode,
                });
            }
        }
    }
    out
}

impl Summary {
    pub fn from_stream(ts: &TransportStream) -> Self {
        let mut programs = Vec::new();
        for (program, pmt_pid) in ts.programs() {
            let pmt = ts.pmt(program);
            let pmt_version = ts
                .tables()
                .slot(&TableKey::Pmt { program_number: program })
                .map(|s| s.version);
            programs.push(ProgramSummary {
                program,
                pmt_pid,
                pcr_pid: pmt.map(|p| p.pcr_pid),
                pmt_version,
                service_name: ts.service_name(None, None, program),
                logical_channel_number: ts.logical_channel_number(program),
                streams: pmt
                    .map(|p| p.streams.iter().map(|es| stream_summary(ts, es)).collect())
                    .unwrap_or_default(),
            });
        }

        let tables = ts
            .tables()
            .keys()
            .filter_map(|key| {
                let slot = ts.tables().slot(key)?;
                Some(TableSummary {
                    name: key.name(),
                    key: *key,
                    version: slot.version,
                    complete: slot.is_complete(),
                    sections_received: slot.sections_received,
                    versions_seen: slot.versions_seen,
                })
            })
            .collect();

        Summary {
            generated: chrono::Utc::now().to_rfc3339(),
            packet_size: ts.packet_size(),
            bitrate_kbps: ts.bitrate().map(|b| b / 1000.0),
            stream_time: ts.utc_time().map(|t| t.to_rfc3339()),
            cancelled: ts.was_cancelled(),
            counters: ts.counters().clone(),
            programs,
            services: services(ts),
            tables,
        }
    }

    /// Pretty-printed JSON for the command line.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{\"error\": \"JSON serialization failed\"}".to_string())
    }
}
