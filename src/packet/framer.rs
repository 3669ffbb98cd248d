//! Packet stride detection and framing.

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use super::TsPacket;
use crate::constants::{PREFIX_TIMESTAMP_SIZE, SUPPORTED_STRIDES, TS_PACKET_SIZE, TS_SYNC_BYTE};
use crate::error::TsError;

/// Physical layout chosen by [`probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Framing {
    /// Bytes from one packet start to the next.
    pub stride: usize,
    /// Bytes preceding the sync byte (timestamp prefix).
    pub prefix: usize,
    /// Offset of the first packet (prefix included).
    pub start: usize,
}

impl Framing {
    fn for_stride(stride: usize) -> Self {
        let prefix = match stride {
            192 | 208 => PREFIX_TIMESTAMP_SIZE,
            _ => 0,
        };
        Framing { stride, prefix, start: 0 }
    }

    /// Bytes after the 188-byte packet (FEC trailer).
    pub fn trailer(&self) -> usize {
        self.stride - self.prefix - TS_PACKET_SIZE
    }
}

/// True when the sync byte recurs at `stride` for `run` packets from `sync`.
fn holds(data: &[u8], sync: usize, stride: usize, run: usize) -> bool {
    (0..run).all(|k| data.get(sync + k * stride) == Some(&TS_SYNC_BYTE))
}

/// Searches `[from, to)` for the first sync position with a full run. The run
/// shrinks to the number of packets that still fit before the end of data.
fn find_sync(data: &[u8], framing: &Framing, from: usize, to: usize, min_run: usize) -> Option<usize> {
    let stride = framing.stride;
    let first = from.max(framing.prefix);
    (first..to.min(data.len())).find(|&sync| {
        let fit = (data.len() - (sync - framing.prefix)) / stride;
        fit > 0 && holds(data, sync, stride, min_run.min(fit).max(1))
    })
}

/// Picks the packet stride: the first of 188, 192, 204, 208 whose sync
/// pattern holds for `min_run` packets somewhere inside `window`.
pub fn probe(data: &[u8], forced: Option<usize>, window: usize, min_run: usize) -> Result<Framing, TsError> {
    let candidates: Vec<usize> = match forced {
        Some(size) if SUPPORTED_STRIDES.contains(&size) => vec![size],
        Some(size) => return Err(TsError::UnsupportedPacketSize(size)),
        None => SUPPORTED_STRIDES.to_vec(),
    };
    for stride in candidates {
        let mut framing = Framing::for_stride(stride);
        if let Some(sync) = find_sync(data, &framing, 0, window, min_run) {
            framing.start = sync - framing.prefix;
            debug!(stride, start = framing.start, "packet stride detected");
            return Ok(framing);
        }
    }
    Err(TsError::NotMpegStream {
        probed: window.min(data.len()),
    })
}

/// Iterator over the packets of a probed buffer.
///
/// On a missing sync byte the framer counts a sync loss and resumes at the
/// next position where the stride pattern holds again.
pub struct Framer {
    data: Bytes,
    framing: Framing,
    min_run: usize,
    pos: usize,
    index: u64,
    pub sync_losses: u64,
    /// Bytes skipped while resynchronising.
    pub skipped_bytes: u64,
    /// Bytes after the last whole packet.
    pub trailing_bytes: u64,
}

impl Framer {
    pub fn new(data: Bytes, framing: Framing, min_run: usize) -> Self {
        Framer {
            data,
            pos: framing.start,
            framing,
            min_run,
            index: 0,
            sync_losses: 0,
            skipped_bytes: 0,
            trailing_bytes: 0,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Offset of the next packet to be framed.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn resync(&mut self) -> bool {
        let from = self.pos + self.framing.prefix + 1;
        match find_sync(&self.data, &self.framing, from, self.data.len(), self.min_run) {
            Some(sync) => {
                let next = sync - self.framing.prefix;
                warn!(offset = self.pos, resumed = next, "sync lost");
                self.skipped_bytes += (next - self.pos) as u64;
                self.pos = next;
                true
            }
            None => {
                warn!(offset = self.pos, "sync lost, no further packets");
                self.skipped_bytes += (self.data.len() - self.pos) as u64;
                self.pos = self.data.len();
                false
            }
        }
    }
}

impl Iterator for Framer {
    type Item = TsPacket;

    fn next(&mut self) -> Option<TsPacket> {
        let Framing { stride, prefix, .. } = self.framing;
        loop {
            if self.pos + stride > self.data.len() {
                self.trailing_bytes = (self.data.len() - self.pos) as u64;
                return None;
            }
            let sync = self.pos + prefix;
            if self.data[sync] != TS_SYNC_BYTE {
                self.sync_losses += 1;
                if !self.resync() {
                    return None;
                }
                continue;
            }
            let timestamp = (prefix == PREFIX_TIMESTAMP_SIZE).then(|| {
                u32::from_be_bytes([
                    self.data[self.pos],
                    self.data[self.pos + 1],
                    self.data[self.pos + 2],
                    self.data[self.pos + 3],
                ])
            });
            let raw = self.data.slice(sync..sync + TS_PACKET_SIZE);
            let pkt = TsPacket::parse(raw, self.index, sync as u64, timestamp);
            self.pos += stride;
            self.index += 1;
            return Some(pkt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::packet;

    fn stream(stride: usize, count: usize) -> Vec<u8> {
        let framing = Framing::for_stride(stride);
        let mut out = Vec::new();
        for i in 0..count {
            out.extend_from_slice(&(i as u32).to_be_bytes()[..framing.prefix]);
            out.extend_from_slice(&packet(0x100, false, i as u8, &[]));
            out.extend(std::iter::repeat_n(0u8, framing.trailer()));
        }
        out
    }

    #[test]
    fn test_probe_each_stride() {
        for stride in SUPPORTED_STRIDES {
            let data = stream(stride, 10);
            let f = probe(&data, None, 8 * 208, 5).unwrap();
            assert_eq!(f.stride, stride);
            assert_eq!(f.start, 0);
        }
    }

    #[test]
    fn test_probe_rejects_garbage() {
        let data = vec![0u8; 4096];
        assert!(matches!(probe(&data, None, 8 * 208, 5), Err(TsError::NotMpegStream { .. })));
        assert!(matches!(probe(&data, Some(190), 8 * 208, 5), Err(TsError::UnsupportedPacketSize(190))));
    }

    #[test]
    fn test_probe_skips_leading_junk() {
        let mut data = vec![0x12u8; 17];
        data.extend(stream(188, 8));
        let f = probe(&data, None, 8 * 208, 5).unwrap();
        assert_eq!(f.start, 17);
    }

    #[test]
    fn test_timestamp_prefix_and_count() {
        let data = Bytes::from(stream(192, 6));
        let f = probe(&data, None, 8 * 208, 5).unwrap();
        let packets: Vec<_> = Framer::new(data, f, 5).collect();
        assert_eq!(packets.len(), 6);
        assert_eq!(packets[3].prefix_timestamp, Some(3));
        assert_eq!(packets[3].offset, 3 * 192 + 4);
    }

    #[test]
    fn test_trailing_partial_packet_counted() {
        let mut data = stream(188, 4);
        data.extend_from_slice(&[0x47, 0, 0]);
        let data = Bytes::from(data);
        let f = probe(&data, None, 8 * 208, 5).unwrap();
        let mut framer = Framer::new(data, f, 5);
        assert_eq!(framer.by_ref().count(), 4);
        assert_eq!(framer.trailing_bytes, 3);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut data = stream(188, 6);
        data.extend_from_slice(&[0u8; 50]);
        data.extend(stream(188, 6));
        let data = Bytes::from(data);
        let f = probe(&data, None, 8 * 208, 5).unwrap();
        let mut framer = Framer::new(data, f, 5);
        assert_eq!(framer.by_ref().count(), 12);
        assert_eq!(framer.sync_losses, 1);
        assert_eq!(framer.skipped_bytes, 50);
    }
}
