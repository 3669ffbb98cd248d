//! Generic tree of every decoded entity, for renderers that walk scalar
//! fields without knowing the model.
//!
//! Sections carry `first_packet`, `length` and their bytes as `raw` hex;
//! PES packets carry `first_packet`. Packets themselves are located with
//! [`TransportStream::packet`], so a hex view needs no second decode.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::descriptors::as_hex;
use crate::processor::{PidRole, PidState};
use crate::psi::pmt::stream_type_name;
use crate::psi::{StoredSection, TableKey};
use crate::stream::TransportStream;

fn to_value<T: Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

/// Human label for a PID: its table or stream role.
pub fn pid_label(ts: &TransportStream, state: &PidState) -> String {
    let pid = state.pid;
    if let Some(program) = ts
        .programs()
        .into_iter()
        .find(|&(_, pmt_pid)| pmt_pid == pid)
        .map(|(program, _)| program)
    {
        return format!("PMT of program {}", program);
    }
    match (pid, state.stream_type) {
        (0x0000, _) => "PAT".into(),
        (0x0001, _) => "CAT".into(),
        (0x0002, _) => "TSDT".into(),
        (0x0010, _) => "NIT".into(),
        (0x0011, _) => "SDT/BAT".into(),
        (0x0012, _) => "EIT".into(),
        (0x0013, _) => "RST".into(),
        (0x0014, _) => "TDT/TOT".into(),
        (0x001E, _) => "DIT".into(),
        (0x001F, _) => "SIT".into(),
        (0x1FFF, _) => "null packets".into(),
        (_, Some(t)) => stream_type_name(t).to_string(),
        (_, None) => match state.role {
            PidRole::Psi => "private sections".into(),
            PidRole::Pes => "unreferenced PES".into(),
            PidRole::Unclassified => "unknown".into(),
        },
    }
}

fn pid_node(ts: &TransportStream, state: &PidState) -> Value {
    let mut node = match to_value(state) {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    node.insert("label".into(), Value::String(pid_label(ts, state)));
    node.insert("start_code_errors".into(), json!(state.start_code_errors()));
    node.insert("discarded".into(), json!(state.discarded()));
    if !state.pes_packets.is_empty() {
        node.insert("pes".into(), to_value(&state.pes_packets));
    }
    Value::Object(node)
}

fn section_node(stored: &StoredSection) -> Value {
    let mut node = match to_value(stored) {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    node.insert("length".into(), json!(stored.section.raw().len()));
    node.insert(
        "raw".into(),
        as_hex(stored.section.raw(), serde_json::value::Serializer).unwrap_or(Value::Null),
    );
    Value::Object(node)
}

fn table_node(ts: &TransportStream, key: &TableKey) -> Value {
    let tables = ts.tables();
    let slot = tables.slot(key).map(to_value).unwrap_or(Value::Null);
    let sections: Vec<Value> = tables
        .get(key)
        .map(|sections| sections.into_iter().map(section_node).collect())
        .unwrap_or_default();
    json!({
        "name": key.name(),
        "key": to_value(key),
        "complete": !sections.is_empty(),
        "slot": slot,
        "sections": sections,
    })
}

/// Builds the full tree: stream statistics, PIDs with their PES packets,
/// and every table with its sections and descriptors.
pub fn build(ts: &TransportStream) -> Value {
    let pids: Vec<Value> = ts.pids().values().map(|s| pid_node(ts, s)).collect();
    let tables: Vec<Value> = ts.tables().keys().map(|k| table_node(ts, k)).collect();
    json!({
        "stream": {
            "packet_size": ts.packet_size(),
            "framing": to_value(&ts.framing()),
            "bytes": ts.data().len(),
            "bitrate": ts.bitrate(),
            "pcr": to_value(ts.pcr()),
            "utc_time": ts.utc_time().map(|t| t.to_rfc3339()),
            "cancelled": ts.was_cancelled(),
            "counters": to_value(ts.counters()),
            "version_changes": ts.tables().version_changes,
        },
        "pids": pids,
        "tables": tables,
    })
}
