use tokio_util::sync::CancellationToken;

use crate::constants::{DEFAULT_CANCEL_CHECK_INTERVAL, DEFAULT_MIN_SYNC_RUN, DEFAULT_PROBE_WINDOW};
use crate::descriptors::Charset;

/// Configuration options for a scan
#[derive(Debug, Clone)]
pub struct Options {
    /// Force a packet stride (188, 192, 204 or 208) instead of probing.
    pub packet_size: Option<usize>,
    /// Leading bytes searched for a sync pattern.
    pub probe_window: usize,
    /// Consecutive sync bytes required to accept a stride.
    pub min_sync_run: usize,
    /// Packets between cancellation checks.
    pub cancel_check_interval: u64,
    pub cancel: Option<CancellationToken>,
    /// Character table for DVB strings without a selector byte.
    pub default_charset: Charset,
    /// private_data_specifier assumed before any descriptor sets one.
    pub default_private_data_specifier: Option<u32>,
    /// Run the elementary-stream decoders after the scan.
    pub decode_elementary_streams: bool,
    /// Keep PES bytes after elementary-stream decoding.
    pub retain_pes_payloads: bool,
    /// Completed PES packets kept per PID; further ones are only counted.
    pub max_pes_per_pid: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            packet_size: None,
            probe_window: DEFAULT_PROBE_WINDOW,
            min_sync_run: DEFAULT_MIN_SYNC_RUN,
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
            cancel: None,
            default_charset: Charset::default(),
            default_private_data_specifier: None,
            decode_elementary_streams: true,
            retain_pes_payloads: true,
            max_pes_per_pid: None,
        }
    }
}

impl Options {
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
