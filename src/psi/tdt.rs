// psi/tdt.rs
//! TDT (0x70, no CRC) and TOT (0x73, CRC present), plus the MJD/BCD time
//! coding shared by EIT and several descriptors.

use bytes::Bytes;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use super::{DecodeContext, PsiSection};
use crate::bits::{bcd, BitCursor};
use crate::descriptors::{decode_loop, loop_slice, Descriptor, TableKind};
use crate::error::SectionError;

/// MJD date plus 24-bit BCD hh:mm:ss. `None` for the all-ones "undefined" value
/// and out-of-range fields.
pub fn decode_mjd_utc(mjd: u16, hms: u32) -> Option<DateTime<Utc>> {
    if mjd == 0xFFFF && hms == 0xFF_FFFF {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17)?;
    let date = epoch.checked_add_days(Days::new(mjd as u64))?;
    let h = bcd((hms >> 16) as u64 & 0xFF, 2) as u32;
    let m = bcd((hms >> 8) as u64 & 0xFF, 2) as u32;
    let s = bcd(hms as u64 & 0xFF, 2) as u32;
    let time = NaiveTime::from_hms_opt(h, m, s)?;
    Some(date.and_time(time).and_utc())
}

/// 24-bit BCD hh:mm:ss duration in seconds.
pub fn decode_bcd_duration(raw: u32) -> u32 {
    let v = bcd(raw as u64, 6) as u32;
    (v / 10000) * 3600 + (v / 100 % 100) * 60 + v % 100
}

pub(crate) fn read_utc(r: &mut BitCursor<'_>) -> Result<Option<DateTime<Utc>>, SectionError> {
    let mjd = r.read_u16()?;
    let hms = r.read_u24()?;
    Ok(decode_mjd_utc(mjd, hms))
}

#[derive(Debug, Clone, Serialize)]
pub struct TdtSection {
    pub utc_time: Option<DateTime<Utc>>,
}

pub fn parse_tdt(section: &PsiSection) -> Result<TdtSection, SectionError> {
    let body = section.body();
    let mut r = BitCursor::new(&body);
    Ok(TdtSection {
        utc_time: read_utc(&mut r)?,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct TotSection {
    pub utc_time: Option<DateTime<Utc>>,
    pub descriptors: Vec<Descriptor>,
}

pub fn parse_tot(section: &PsiSection, ctx: &DecodeContext<'_>) -> Result<TotSection, SectionError> {
    let body: Bytes = section.body();
    let mut r = BitCursor::new(&body);
    let utc_time = read_utc(&mut r)?;
    r.skip(4)?;
    let len = r.read(12)? as usize;
    let descriptors = decode_loop(&loop_slice(&body, 7, len)?, &ctx.env(TableKind::Tot));
    Ok(TotSection { utc_time, descriptors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_mjd_example_from_en_300_468() {
        // 93/10/13 12:45:00 is coded as 0xC079124500
        let t = decode_mjd_utc(0xC079, 0x124500).unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (1993, 10, 13));
        assert_eq!((t.hour(), t.minute(), t.second()), (12, 45, 0));
    }

    #[test]
    fn test_undefined_time() {
        assert_eq!(decode_mjd_utc(0xFFFF, 0xFFFFFF), None);
    }

    #[test]
    fn test_duration() {
        assert_eq!(decode_bcd_duration(0x014530), 3600 + 45 * 60 + 30);
    }
}
