//! Constants for MPEG-TS / DVB SI processing

/// MPEG-TS packet constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const TS_HEADER_SIZE: usize = 4;

/// Physical strides probed on open, in probe order.
/// 192 = 4-byte timestamp prefix, 204 = 16-byte FEC trailer, 208 = both.
pub const SUPPORTED_STRIDES: [usize; 4] = [188, 192, 204, 208];
pub const PREFIX_TIMESTAMP_SIZE: usize = 4;

/// PES packet constants
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// PCR constants
pub const PCR_CLOCK_HZ: f64 = 27_000_000.0; // 27 MHz
pub const PCR_WRAP: u64 = (1u64 << 33) * 300; // PCR wrap-around point

/// PTS constants
pub const PTS_CLOCK_HZ: u64 = 90_000; // 90 kHz
pub const PTS_WRAP: u64 = 1u64 << 33;

/// Well-known PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_CAT: u16 = 0x0001;
pub const PID_TSDT: u16 = 0x0002;
pub const PID_NIT: u16 = 0x0010;
pub const PID_SDT_BAT: u16 = 0x0011;
pub const PID_EIT: u16 = 0x0012;
pub const PID_RST: u16 = 0x0013;
pub const PID_TDT_TOT: u16 = 0x0014;
pub const PID_DIT: u16 = 0x001E;
pub const PID_SIT: u16 = 0x001F;
pub const PID_NULL: u16 = 0x1FFF;

/// PIDs reserved for PSI/SI (always classified as sections)
pub const SYSTEM_PIDS: &[u16] = &[
    PID_PAT, PID_CAT, PID_TSDT, PID_NIT, PID_SDT_BAT, PID_EIT, PID_RST, PID_TDT_TOT, PID_DIT,
    PID_SIT,
];

/// Table ids
pub mod table_id {
    pub const PAT: u8 = 0x00;
    pub const CAT: u8 = 0x01;
    pub const PMT: u8 = 0x02;
    pub const TSDT: u8 = 0x03;
    pub const NIT_ACTUAL: u8 = 0x40;
    pub const NIT_OTHER: u8 = 0x41;
    pub const SDT_ACTUAL: u8 = 0x42;
    pub const SDT_OTHER: u8 = 0x46;
    pub const BAT: u8 = 0x4A;
    pub const EIT_PF_ACTUAL: u8 = 0x4E;
    pub const EIT_PF_OTHER: u8 = 0x4F;
    pub const EIT_SCHEDULE_FIRST: u8 = 0x50;
    pub const EIT_SCHEDULE_LAST: u8 = 0x6F;
    pub const TDT: u8 = 0x70;
    pub const RST: u8 = 0x71;
    pub const ST: u8 = 0x72;
    pub const TOT: u8 = 0x73;
    pub const DIT: u8 = 0x7E;
    pub const SIT: u8 = 0x7F;
    pub const FASTSCAN_FNT: u8 = 0xBC;
    pub const FASTSCAN_FST: u8 = 0xBD;
    pub const STUFFING: u8 = 0xFF;
}

/// Registered private_data_specifier values with their own descriptor spaces
pub mod pds {
    pub const BSKYB: u32 = 0x0000_0002;
    pub const EACEM: u32 = 0x0000_0028;
    pub const NORDIG: u32 = 0x0000_0029;
}

/// Scan defaults
pub const DEFAULT_PROBE_WINDOW: usize = 8 * 208;
pub const DEFAULT_MIN_SYNC_RUN: usize = 5;
pub const DEFAULT_CANCEL_CHECK_INTERVAL: u64 = 10_000;
