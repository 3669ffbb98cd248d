//! Stream-wide counters and the PCR based bit-rate estimate.

use serde::Serialize;

use crate::constants::{PCR_CLOCK_HZ, PCR_WRAP};

/// Global counters; per-PID counts live on `PidState`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StreamCounters {
    pub packets: u64,
    pub null_packets: u64,
    pub sync_losses: u64,
    pub skipped_bytes: u64,
    pub trailing_bytes: u64,
    pub transport_errors: u64,
    pub continuity_errors: u64,
    pub duplicates: u64,
    pub scrambled: u64,
    pub role_conflicts: u64,
    pub sections: u64,
    pub crc_errors: u64,
    pub section_errors: u64,
    pub inconsistent_sections: u64,
    pub pes_packets: u64,
    pub pes_errors: u64,
}

/// PCR gaps above this are treated as discontinuities.
const MAX_PCR_GAP: u64 = 10 * 27_000_000;

/// Estimates the mux rate from PCR deltas on the first PID that carries PCRs.
///
/// Each run between discontinuities contributes its bytes and its 27 MHz
/// ticks; the rate is their ratio over all runs.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PcrTracker {
    pub pid: Option<u16>,
    pub samples: u64,
    pub discontinuities: u64,
    #[serde(skip)]
    last: Option<(u64, u64)>,
    ticks: u64,
    bytes: u64,
}

impl PcrTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one PCR sample observed at byte `offset`.
    pub fn push(&mut self, pid: u16, pcr: u64, offset: u64, discontinuity: bool) {
        match self.pid {
            None => self.pid = Some(pid),
            Some(p) if p != pid => return,
            Some(_) => {}
        }
        self.samples += 1;
        if let Some((prev_pcr, prev_offset)) = self.last {
            let delta = (pcr + PCR_WRAP - prev_pcr) % PCR_WRAP;
            if discontinuity || delta == 0 || delta > MAX_PCR_GAP || offset <= prev_offset {
                self.discontinuities += 1;
            } else {
                self.ticks += delta;
                self.bytes += offset - prev_offset;
            }
        }
        self.last = Some((pcr, offset));
    }

    /// Bits per second, once two PCRs of one run have been seen.
    pub fn bitrate(&self) -> Option<f64> {
        if self.ticks == 0 {
            return None;
        }
        Some(self.bytes as f64 * 8.0 * PCR_CLOCK_HZ / self.ticks as f64)
    }

    /// Seconds of PCR time covered by the runs.
    pub fn duration(&self) -> f64 {
        self.ticks as f64 / PCR_CLOCK_HZ
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_from_pcr_deltas() {
        let mut t = PcrTracker::new();
        // 188 * 1000 bytes every 27_000_000 ticks = 1_504_000 bit/s
        t.push(0x100, 0, 0, false);
        t.push(0x100, 27_000_000, 188_000, false);
        t.push(0x200, 5, 200_000, false);
        assert_eq!(t.bitrate(), Some(1_504_000.0));
        assert_eq!(t.samples, 2);
    }

    #[test]
    fn test_pcr_wrap_is_continuous() {
        let mut t = PcrTracker::new();
        t.push(1, PCR_WRAP - 13_500_000, 0, false);
        t.push(1, 13_500_000, 1_000, false);
        assert_eq!(t.discontinuities, 0);
        assert!((t.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_discontinuity_breaks_run() {
        let mut t = PcrTracker::new();
        t.push(1, 0, 0, false);
        t.push(1, 900 * 27_000_000, 1_000, false);
        assert_eq!(t.discontinuities, 1);
        assert_eq!(t.bitrate(), None);
    }
}
