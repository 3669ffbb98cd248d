//! In-memory transport stream builder for the integration tests.
#![allow(dead_code)]

use dvb_inspector::psi::section::CRC_MPEG;

pub const PMT_PID: u16 = 0x100;
pub const AUDIO_PID: u16 = 0x101;
pub const SUBTITLE_PID: u16 = 0x102;
pub const TSID: u16 = 0x0001;
pub const ONID: u16 = 0x233A;

/// Long-form section with a valid CRC.
pub fn section(tid: u8, ext: u16, version: u8, number: u8, last: u8, body: &[u8]) -> Vec<u8> {
    let len = 5 + body.len() + 4;
    let mut v = vec![
        tid,
        0xB0 | ((len >> 8) as u8 & 0x0F),
        len as u8,
        (ext >> 8) as u8,
        ext as u8,
        0xC1 | (version << 1),
        number,
        last,
    ];
    v.extend_from_slice(body);
    v.extend_from_slice(&CRC_MPEG.checksum(&v).to_be_bytes());
    v
}

fn loop_with_length(descriptors: &[u8]) -> Vec<u8> {
    let mut v = vec![0xF0 | (descriptors.len() >> 8) as u8, descriptors.len() as u8];
    v.extend_from_slice(descriptors);
    v
}

pub fn pat(version: u8, programs: &[(u16, u16)]) -> Vec<u8> {
    let mut body = Vec::new();
    for &(program, pid) in programs {
        body.extend_from_slice(&program.to_be_bytes());
        body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
    }
    section(0x00, TSID, version, 0, 0, &body)
}

pub fn pmt(program: u16, pcr_pid: u16, streams: &[(u8, u16, Vec<u8>)]) -> Vec<u8> {
    let mut body = (0xE000 | pcr_pid).to_be_bytes().to_vec();
    body.extend(loop_with_length(&[]));
    for (stream_type, pid, descriptors) in streams {
        body.push(*stream_type);
        body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
        body.extend(loop_with_length(descriptors));
    }
    section(0x02, program, 0, 0, 0, &body)
}

pub fn service_descriptor(provider: &str, name: &str) -> Vec<u8> {
    let mut d = vec![0x48, (3 + provider.len() + name.len()) as u8, 0x01, provider.len() as u8];
    d.extend_from_slice(provider.as_bytes());
    d.push(name.len() as u8);
    d.extend_from_slice(name.as_bytes());
    d
}

pub fn sdt(services: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut body = ONID.to_be_bytes().to_vec();
    body.push(0xFF);
    for (service_id, descriptors) in services {
        body.extend_from_slice(&service_id.to_be_bytes());
        body.push(0xFC | 0x01);
        // running, not scrambled
        body.push(0x80 | (descriptors.len() >> 8) as u8);
        body.push(descriptors.len() as u8);
        body.extend_from_slice(descriptors);
    }
    section(0x42, TSID, 0, 0, 0, &body)
}

/// NIT actual with an EACEM logical channel entry for one service.
pub fn nit_with_lcn(network_id: u16, service_id: u16, lcn: u16) -> Vec<u8> {
    let mut ts_descriptors = vec![0x5F, 0x04, 0x00, 0x00, 0x00, 0x28, 0x83, 0x04];
    ts_descriptors.extend_from_slice(&service_id.to_be_bytes());
    ts_descriptors.extend_from_slice(&(0xFC00 | lcn).to_be_bytes());
    let mut entry = TSID.to_be_bytes().to_vec();
    entry.extend_from_slice(&ONID.to_be_bytes());
    entry.extend(loop_with_length(&ts_descriptors));
    let mut body = loop_with_length(&[]);
    body.extend(loop_with_length(&entry));
    section(0x40, network_id, 0, 0, 0, &body)
}

/// PES packet with a PTS-only header.
pub fn pes(stream_id: u8, pts: u64, payload: &[u8], bounded: bool) -> Vec<u8> {
    let mut p = vec![0x00, 0x00, 0x01, stream_id, 0, 0, 0x80, 0x80, 5];
    p.push(0x21 | ((pts >> 29) & 0x0E) as u8);
    p.push((pts >> 22) as u8);
    p.push(0x01 | ((pts >> 14) & 0xFE) as u8);
    p.push((pts >> 7) as u8);
    p.push(0x01 | ((pts << 1) & 0xFE) as u8);
    p.extend_from_slice(payload);
    if bounded {
        let len = (p.len() - 6) as u16;
        p[4..6].copy_from_slice(&len.to_be_bytes());
    }
    p
}

/// ADTS frame, AAC LC 48 kHz stereo, with `payload_len` zero bytes.
pub fn adts_frame(payload_len: usize) -> Vec<u8> {
    let len = 7 + payload_len;
    let mut f = vec![
        0xFF,
        0xF1,
        0x4C,
        0x80 | (len >> 11) as u8,
        (len >> 3) as u8,
        ((len & 7) << 5) as u8 | 0x1F,
        0xFC,
    ];
    f.resize(len, 0);
    f
}

/// DVB subtitling PES data field holding a single end-of-display-set segment.
pub fn subtitle_data(page_id: u16) -> Vec<u8> {
    let mut d = vec![0x20, 0x00, 0x0F, 0x80];
    d.extend_from_slice(&page_id.to_be_bytes());
    d.extend_from_slice(&[0x00, 0x00, 0xFF]);
    d
}

/// Packet writer keeping one continuity counter per PID.
#[derive(Default)]
pub struct Mux {
    pub packets: Vec<[u8; 188]>,
    counters: std::collections::HashMap<u16, u8>,
}

impl Mux {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_cc(&mut self, pid: u16) -> u8 {
        let cc = self.counters.entry(pid).or_insert(0x0F);
        *cc = (*cc + 1) & 0x0F;
        *cc
    }

    fn header(&mut self, pid: u16, pusi: bool, afc: u8) -> [u8; 188] {
        let mut p = [0xFFu8; 188];
        let cc = self.next_cc(pid);
        p[0] = 0x47;
        p[1] = (if pusi { 0x40 } else { 0 }) | (pid >> 8) as u8;
        p[2] = pid as u8;
        p[3] = (afc << 4) | cc;
        p
    }

    /// Splits a section over packets after a zero pointer field; the last
    /// packet is padded with 0xFF.
    pub fn section(&mut self, pid: u16, section: &[u8]) {
        let mut data = vec![0x00];
        data.extend_from_slice(section);
        for (i, chunk) in data.chunks(184).enumerate() {
            let mut p = self.header(pid, i == 0, 1);
            p[4..4 + chunk.len()].copy_from_slice(chunk);
            self.packets.push(p);
        }
    }

    /// Splits a PES packet over packets; the last one is filled with
    /// adaptation-field stuffing so no stray bytes follow the payload.
    pub fn pes(&mut self, pid: u16, pes: &[u8]) {
        for (i, chunk) in pes.chunks(184).enumerate() {
            if chunk.len() == 184 {
                let mut p = self.header(pid, i == 0, 1);
                p[4..].copy_from_slice(chunk);
                self.packets.push(p);
            } else {
                let mut p = self.header(pid, i == 0, 3);
                let af_len = 183 - chunk.len();
                p[4] = af_len as u8;
                if af_len > 0 {
                    p[5] = 0x00;
                }
                p[188 - chunk.len()..].copy_from_slice(chunk);
                self.packets.push(p);
            }
        }
    }

    /// Adaptation-field-only packet carrying a PCR (27 MHz units).
    pub fn pcr(&mut self, pid: u16, pcr: u64) {
        let mut p = [0xFFu8; 188];
        let cc = self.counters.get(&pid).copied().unwrap_or(0);
        p[0] = 0x47;
        p[1] = (pid >> 8) as u8;
        p[2] = pid as u8;
        p[3] = 0x20 | cc;
        p[4] = 183;
        p[5] = 0x10;
        let base = pcr / 300;
        let ext = pcr % 300;
        p[6] = (base >> 25) as u8;
        p[7] = (base >> 17) as u8;
        p[8] = (base >> 9) as u8;
        p[9] = (base >> 1) as u8;
        p[10] = ((base & 1) << 7) as u8 | 0x7E | (ext >> 8) as u8;
        p[11] = ext as u8;
        self.packets.push(p);
    }

    pub fn null(&mut self) {
        let mut p = [0xFFu8; 188];
        p[0] = 0x47;
        p[1] = 0x1F;
        p[2] = 0xFF;
        p[3] = 0x10;
        self.packets.push(p);
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.packets.iter().flatten().copied().collect()
    }

    /// Same packets with a 4-byte timestamp prefix each (192-byte stride).
    pub fn bytes_with_prefix(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, p) in self.packets.iter().enumerate() {
            out.extend_from_slice(&(i as u32 * 1000).to_be_bytes());
            out.extend_from_slice(p);
        }
        out
    }
}

/// One program with an AAC audio stream and a DVB subtitle stream, its SDT
/// and NIT, a run of audio PES packets and PCRs every ten packets.
pub fn sample_stream() -> Mux {
    let mut mux = Mux::new();
    mux.section(0x0000, &pat(0, &[(0, 0x0010), (1, PMT_PID)]));
    let audio_descriptors = vec![0x0A, 0x04, b'e', b'n', b'g', 0x00];
    let subtitle_descriptors = vec![0x59, 0x08, b'd', b'e', b'u', 0x10, 0x00, 0x01, 0x00, 0x01];
    mux.section(
        PMT_PID,
        &pmt(1, AUDIO_PID, &[(0x0F, AUDIO_PID, audio_descriptors), (0x06, SUBTITLE_PID, subtitle_descriptors)]),
    );
    mux.section(0x0011, &sdt(&[(1, service_descriptor("Provider", "News"))]));
    mux.section(0x0010, &nit_with_lcn(0x3001, 1, 7));

    for i in 0..20u64 {
        let mut frames = adts_frame(200);
        frames.extend(adts_frame(150));
        mux.pes(AUDIO_PID, &pes(0xC0, 3600 * i, &frames, false));
        if i % 5 == 0 {
            mux.pes(SUBTITLE_PID, &pes(0xBD, 3600 * i, &subtitle_data(1), true));
        }
        mux.null();
        // 27_000 ticks per packet is 1_504_000 bit/s
        let index = mux.packets.len() as u64;
        mux.pcr(AUDIO_PID, index * 27_000);
    }
    mux
}
