mod common;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use common::*;
use dvb_inspector::descriptors::DescriptorKind;
use dvb_inspector::parsers::EsContent;
use dvb_inspector::processor::PidRole;
use dvb_inspector::psi::TableSection;
use dvb_inspector::{Options, TableKey, TransportStream, TsError};
use tokio_util::sync::CancellationToken;

fn decode(data: Vec<u8>) -> TransportStream {
    TransportStream::from_bytes(Bytes::from(data), Options::default()).unwrap()
}

#[test]
fn test_programs_services_and_components() {
    let ts = decode(sample_stream().bytes());

    assert_eq!(ts.packet_size(), 188);
    assert_eq!(ts.programs(), vec![(1, PMT_PID)]);
    let components: Vec<(u8, u16)> = ts
        .components(1)
        .iter()
        .map(|es| (es.stream_type, es.elementary_pid))
        .collect();
    assert_eq!(components, vec![(0x0F, AUDIO_PID), (0x06, SUBTITLE_PID)]);
    assert_eq!(ts.program_for_pid(SUBTITLE_PID), Some(1));
    assert_eq!(ts.program_for_pid(PMT_PID), Some(1));
    assert_eq!(ts.program_for_pid(0x0011), None);

    let services = ts.services(TSID);
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].identity(), Some(("Provider", "News", 0x01)));
    assert_eq!(ts.service_name(Some(ONID), Some(TSID), 1).as_deref(), Some("News"));
    assert_eq!(ts.service_name(Some(ONID + 1), None, 1), None);
    assert_eq!(ts.logical_channel_number(1), Some(7));

    assert_eq!(ts.pid(AUDIO_PID).map(|s| s.role), Some(PidRole::Pes));
    assert_eq!(ts.pid(PMT_PID).map(|s| s.role), Some(PidRole::Psi));
    assert_eq!(ts.pid(AUDIO_PID).and_then(|s| s.stream_type), Some(0x0F));
}

#[test]
fn test_packet_accounting() {
    let mux = sample_stream();
    let mut data = mux.bytes();
    data.extend([0u8; 100]);
    let ts = decode(data);

    let c = ts.counters();
    assert_eq!(c.packets, mux.packets.len() as u64);
    assert_eq!(c.trailing_bytes, 100);
    assert_eq!(c.null_packets, 20);
    assert_eq!(c.continuity_errors, 0);
    assert_eq!(c.crc_errors, 0);
    let per_pid: u64 = ts.pids().values().map(|s| s.packets).sum();
    assert_eq!(per_pid, c.packets);
}

#[test]
fn test_elementary_streams_decoded() {
    let ts = decode(sample_stream().bytes());

    // the last unbounded audio PES has no following start and is dropped
    let audio = ts.pes_packets(AUDIO_PID);
    assert_eq!(audio.len(), 19);
    assert_eq!(audio[1].pts(), Some(3600));
    for pes in audio {
        assert!(pes.es_errors.is_empty(), "{:?}", pes.es_errors);
        match &pes.content {
            Some(EsContent::Adts(frames)) => {
                assert_eq!(frames.len(), 2);
                assert_eq!(frames[0].frame_length, 207);
                assert_eq!(frames[1].frame_length, 157);
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    let subs = ts.pes_packets(SUBTITLE_PID);
    assert_eq!(subs.len(), 4);
    assert!(subs.iter().all(|p| !p.truncated));
    assert!(matches!(&subs[0].content, Some(EsContent::Subtitles(s)) if s.segments.len() == 1));

    let summary = ts.summary();
    let stream = &summary.programs[0].streams[0];
    assert_eq!(stream.codec.as_deref(), Some("AAC LC 48000 Hz 2 ch"));
    assert_eq!(stream.language.as_deref(), Some("eng"));
    assert_eq!(summary.programs[0].service_name.as_deref(), Some("News"));
    assert_eq!(summary.programs[0].logical_channel_number, Some(7));
}

#[test]
fn test_bitrate_from_pcr() {
    let ts = decode(sample_stream().bytes());
    let rate = ts.bitrate().unwrap();
    assert!((rate - 1_504_000.0).abs() < 1.0, "{}", rate);
    assert_eq!(ts.pcr().pid, Some(AUDIO_PID));
}

#[test]
fn test_prefixed_stride_and_packet_reparse() {
    let mux = sample_stream();
    let ts = decode(mux.bytes_with_prefix());
    assert_eq!(ts.packet_size(), 192);
    assert_eq!(ts.counters().packets, mux.packets.len() as u64);

    let first = ts.packet(0).unwrap();
    assert_eq!(first.pid, 0);
    assert!(first.payload_unit_start);
    assert_eq!(first.offset, 4);
    let fifth = ts.packet(5).unwrap();
    assert_eq!(fifth.prefix_timestamp, Some(5000));
    assert_eq!(fifth.raw().as_ref(), &mux.packets[5][..]);
    assert!(ts.packet(ts.counters().packets).is_none());
}

#[test]
fn test_resync_after_garbage() {
    let mux = sample_stream();
    let mut data = Vec::new();
    for (i, p) in mux.packets.iter().enumerate() {
        if i == 6 {
            data.extend([0u8; 50]);
        }
        data.extend_from_slice(p);
    }
    let ts = decode(data);
    let c = ts.counters();
    assert_eq!(c.sync_losses, 1);
    assert_eq!(c.skipped_bytes, 50);
    assert_eq!(c.packets, mux.packets.len() as u64);
    // packets after the gap are located from their real offset
    let p = ts.packet(6).unwrap();
    assert_eq!(p.offset, 6 * 188 + 50);
    assert_eq!(p.raw().as_ref(), &mux.packets[6][..]);
}

#[test]
fn test_single_duplicate_tolerated() {
    let mut mux = sample_stream();
    let audio_index = mux
        .packets
        .iter()
        .position(|p| p[1] & 0x1F == 0x01 && p[2] == 0x01 && p[1] & 0x40 == 0 && p[3] & 0x10 != 0)
        .unwrap();
    let copy = mux.packets[audio_index];
    mux.packets.insert(audio_index + 1, copy);
    let ts = decode(mux.bytes());
    assert_eq!(ts.counters().duplicates, 1);
    assert_eq!(ts.counters().continuity_errors, 0);
    assert_eq!(ts.pes_packets(AUDIO_PID).len(), 19);
}

#[test]
fn test_corrupt_section_rejected() {
    let mut mux = sample_stream();
    let sdt_index = mux.packets.iter().position(|p| p[2] == 0x11 && p[1] & 0x1F == 0).unwrap();
    mux.packets[sdt_index][20] ^= 0x01;
    let ts = decode(mux.bytes());
    assert_eq!(ts.counters().crc_errors, 1);
    assert!(ts.services(TSID).is_empty());
    assert_eq!(ts.service_name(None, None, 1), None);
    // the other tables are unaffected
    assert_eq!(ts.programs(), vec![(1, PMT_PID)]);
}

#[test]
fn test_version_change_replaces_table() {
    let mut mux = Mux::new();
    mux.section(0, &pat(0, &[(1, 0x100)]));
    mux.section(0, &pat(0, &[(1, 0x100)]));
    mux.section(0, &pat(1, &[(2, 0x200)]));
    for _ in 0..5 {
        mux.null();
    }
    let ts = decode(mux.bytes());
    assert_eq!(ts.programs(), vec![(2, 0x200)]);
    assert_eq!(ts.tables().version_changes, 1);
    let slot = ts.tables().slot(&TableKey::Pat).unwrap();
    assert_eq!(slot.version, 1);
    assert_eq!(slot.repetitions, 1);
}

#[test]
fn test_channel_names_resolved_when_nit_precedes_sdt() {
    let mut mux = Mux::new();
    mux.section(0x0000, &pat(0, &[(0, 0x0010), (1, PMT_PID)]));
    mux.section(0x0010, &nit_with_lcn(0x3001, 1, 7));
    mux.section(0x0011, &sdt(&[(1, service_descriptor("Provider", "News"))]));
    mux.section(0x0010, &nit_with_lcn(0x3001, 1, 7));
    let ts = decode(mux.bytes());

    let key = TableKey::Nit {
        table_id: 0x40,
        network_id: 0x3001,
    };
    let sections = ts.tables().get(&key).unwrap();
    let TableSection::Nit(nit) = &sections[0].content else {
        panic!("not a NIT");
    };
    let names: Vec<Option<String>> = nit.transport_streams[0]
        .descriptors
        .iter()
        .filter_map(|d| match &d.kind {
            DescriptorKind::LogicalChannel(l) => Some(l.entries[0].service_name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec![Some("News".to_string())]);
    assert_eq!(ts.logical_channel_number(1), Some(7));
}

#[test]
fn test_time_tables() {
    let mut mux = sample_stream();
    // 1993-10-13 12:45:00
    mux.section(0x0014, &[0x70, 0x70, 0x05, 0xC0, 0x79, 0x12, 0x45, 0x00]);
    let ts = decode(mux.bytes());
    assert_eq!(ts.utc_time(), Some(Utc.with_ymd_and_hms(1993, 10, 13, 12, 45, 0).unwrap()));
}

#[test]
fn test_not_a_transport_stream() {
    let err = TransportStream::from_bytes(Bytes::from(vec![0u8; 4000]), Options::default()).err();
    assert!(matches!(err, Some(TsError::NotMpegStream { .. })));
    let forced = Options {
        packet_size: Some(200),
        ..Options::default()
    };
    let err = TransportStream::from_bytes(Bytes::from(sample_stream().bytes()), forced).err();
    assert!(matches!(err, Some(TsError::UnsupportedPacketSize(200))));
}

#[test]
fn test_cancelled_scan() {
    let token = CancellationToken::new();
    token.cancel();
    let options = Options::default().with_cancel(token);
    let ts = TransportStream::from_bytes(Bytes::from(sample_stream().bytes()), options).unwrap();
    assert!(ts.was_cancelled());
    assert_eq!(ts.counters().packets, 0);
    assert!(ts.summary().cancelled);
}

#[test]
fn test_payloads_released_after_decoding() {
    let options = Options {
        retain_pes_payloads: false,
        max_pes_per_pid: Some(3),
        ..Options::default()
    };
    let ts = TransportStream::from_bytes(Bytes::from(sample_stream().bytes()), options).unwrap();
    let audio = ts.pes_packets(AUDIO_PID);
    assert_eq!(audio.len(), 3);
    assert!(audio.iter().all(|p| p.payload().is_empty() && p.content.is_some()));
    let state = ts.pid(AUDIO_PID).unwrap();
    assert_eq!(state.pes_count, 19);
    assert_eq!(state.pes_dropped, 16);
}

#[test]
fn test_tree_view() {
    let ts = decode(sample_stream().bytes());
    let tree = ts.tree();
    assert_eq!(tree["stream"]["packet_size"], 188);
    let pids = tree["pids"].as_array().unwrap();
    assert!(pids.iter().any(|p| p["label"] == "PAT"));
    assert!(pids.iter().any(|p| p["label"] == "PMT of program 1"));
    let tables = tree["tables"].as_array().unwrap();
    let sdt = tables.iter().find(|t| t["name"] == "SDT actual").unwrap();
    assert_eq!(sdt["complete"], true);
    let section = &sdt["sections"][0];
    let length = section["length"].as_u64().unwrap();
    assert!(length > 0);
    assert!(section["section"]["first_packet"].is_u64());
    let raw = section["raw"].as_str().unwrap();
    assert_eq!(raw.len() as u64, length * 2);
    assert!(raw.starts_with("42"));
}

#[tokio::test]
async fn test_open_async_matches_sequential() {
    let mux = sample_stream();
    let path = std::env::temp_dir().join(format!("dvb_inspector_{}.ts", std::process::id()));
    std::fs::write(&path, mux.bytes()).unwrap();

    let parallel = TransportStream::open_async(&path, Options::default()).await.unwrap();
    let sequential = TransportStream::open(&path, Options::default()).unwrap();
    std::fs::remove_file(&path).unwrap();

    for pid in [AUDIO_PID, SUBTITLE_PID] {
        let a: Vec<Option<String>> = parallel
            .pes_packets(pid)
            .iter()
            .map(|p| p.content.as_ref().and_then(|c| c.summary()))
            .collect();
        let b: Vec<Option<String>> = sequential
            .pes_packets(pid)
            .iter()
            .map(|p| p.content.as_ref().and_then(|c| c.summary()))
            .collect();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }
}
