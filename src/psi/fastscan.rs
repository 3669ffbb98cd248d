//! Fastscan services table (0xBD). The network table (0xBC) uses the NIT
//! layout and is parsed by [`super::nit`].

use serde::Serialize;

use super::{require_long, DecodeContext, PsiSection};
use crate::bits::BitCursor;
use crate::descriptors::{decode_loop, loop_slice, Descriptor, TableKind};
use crate::error::SectionError;

#[derive(Debug, Clone, Serialize)]
pub struct FstSection {
    pub operator_network_id: u16,
    pub services: Vec<FstService>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FstService {
    pub original_network_id: u16,
    pub transport_stream_id: u16,
    pub service_id: u16,
    pub default_video_pid: u16,
    pub default_audio_pid: u16,
    pub default_video_ecm_pid: u16,
    pub default_audio_ecm_pid: u16,
    pub default_pcr_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

pub fn parse_fst(section: &PsiSection, ctx: &DecodeContext<'_>) -> Result<FstSection, SectionError> {
    require_long(section)?;
    let body = section.body();
    let mut r = BitCursor::new(&body);
    let mut services = Vec::new();
    while !r.is_empty() {
        let original_network_id = r.read_u16()?;
        let transport_stream_id = r.read_u16()?;
        let service_id = r.read_u16()?;
        let mut pids = [0u16; 5];
        for pid in pids.iter_mut() {
            *pid = r.read_u16()? & 0x1FFF;
        }
        r.skip(4)?;
        let len = r.read(12)? as usize;
        let offset = (r.position() / 8) as usize;
        let env = ctx
            .env(TableKind::FastscanServices)
            .with_origin(original_network_id, transport_stream_id);
        let descriptors = decode_loop(&loop_slice(&body, offset, len)?, &env);
        r.skip(len as u64 * 8)?;
        services.push(FstService {
            original_network_id,
            transport_stream_id,
            service_id,
            default_video_pid: pids[0],
            default_audio_pid: pids[1],
            default_video_ecm_pid: pids[2],
            default_audio_ecm_pid: pids[3],
            default_pcr_pid: pids[4],
            descriptors,
        });
    }
    Ok(FstSection {
        operator_network_id: section.table_id_extension,
        services,
    })
}
