//! Selection information table (0x7F), found in partial transport streams.

use serde::Serialize;

use super::{require_long, DecodeContext, PsiSection};
use crate::bits::BitCursor;
use crate::descriptors::{decode_loop, loop_slice, Descriptor, TableKind};
use crate::error::SectionError;

#[derive(Debug, Clone, Serialize)]
pub struct SitSection {
    pub descriptors: Vec<Descriptor>,
    pub services: Vec<SitService>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SitService {
    pub service_id: u16,
    pub running_status: u8,
    pub descriptors: Vec<Descriptor>,
}

pub fn parse_sit(section: &PsiSection, ctx: &DecodeContext<'_>) -> Result<SitSection, SectionError> {
    require_long(section)?;
    let body = section.body();
    let env = ctx.env(TableKind::Sit);
    let mut r = BitCursor::new(&body);
    r.skip(4)?;
    let info_len = r.read(12)? as usize;
    let descriptors = decode_loop(&loop_slice(&body, 2, info_len)?, &env);
    r.skip(info_len as u64 * 8)?;

    let mut services = Vec::new();
    while !r.is_empty() {
        let service_id = r.read_u16()?;
        r.skip(1)?;
        let running_status = r.read(3)? as u8;
        let len = r.read(12)? as usize;
        let offset = (r.position() / 8) as usize;
        let descriptors = decode_loop(&loop_slice(&body, offset, len)?, &env);
        r.skip(len as u64 * 8)?;
        services.push(SitService {
            service_id,
            running_status,
            descriptors,
        });
    }
    Ok(SitSection { descriptors, services })
}
