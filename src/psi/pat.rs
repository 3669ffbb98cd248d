use serde::Serialize;

use super::{require_long, PsiSection};
use crate::bits::BitCursor;
use crate::error::SectionError;

/// ─────────── PAT ───────────
#[derive(Debug, Clone, Serialize)]
pub struct PatSection {
    pub transport_stream_id: u16,
    pub programs: Vec<PatEntry>,
}

/// program_number 0 points at the network PID.
#[derive(Debug, Clone, Serialize)]
pub struct PatEntry {
    pub program_number: u16,
    pub pid: u16,
}

impl PatSection {
    pub fn network_pid(&self) -> Option<u16> {
        self.programs.iter().find(|e| e.program_number == 0).map(|e| e.pid)
    }
}

pub fn parse_pat(section: &PsiSection) -> Result<PatSection, SectionError> {
    require_long(section)?;
    let body = section.body();
    if body.len() % 4 != 0 {
        return Err(SectionError::Malformed(format!("PAT body of {} bytes", body.len())));
    }
    let mut r = BitCursor::new(&body);
    let mut programs = Vec::with_capacity(body.len() / 4);
    while !r.is_empty() {
        let program_number = r.read_u16()?;
        r.skip(3)?;
        let pid = r.read(13)? as u16;
        programs.push(PatEntry { program_number, pid });
    }
    Ok(PatSection {
        transport_stream_id: section.table_id_extension,
        programs,
    })
}
