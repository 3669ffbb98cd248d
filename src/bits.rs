//! Bounds-checked bit reading and writing on top of `bitstream-io`.
//!
//! [`BitCursor`] tracks its own bit position so every read is checked against
//! the buffer before it reaches the underlying reader; running off the end is
//! a [`BitError::OutOfRange`], never garbage.

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite};

use crate::error::BitError;

pub struct BitCursor<'a> {
    data: &'a [u8],
    reader: BitReader<&'a [u8], BigEndian>,
    position: u64,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            reader: BitReader::endian(data, BigEndian),
            position: 0,
        }
    }

    #[inline]
    pub fn bits_remaining(&self) -> u64 {
        (self.data.len() as u64 * 8).saturating_sub(self.position)
    }

    #[inline]
    pub fn bytes_remaining(&self) -> usize {
        (self.bits_remaining() / 8) as usize
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.position % 8 == 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    fn ensure(&self, bits: u64) -> Result<(), BitError> {
        if bits > self.bits_remaining() {
            return Err(BitError::OutOfRange {
                requested: bits,
                position: self.position,
                available: self.data.len() as u64 * 8,
            });
        }
        Ok(())
    }

    fn out_of_range(&self, bits: u64) -> BitError {
        BitError::OutOfRange {
            requested: bits,
            position: self.position,
            available: self.data.len() as u64 * 8,
        }
    }

    /// Reads an unsigned value of 0..=32 bits.
    pub fn read(&mut self, bits: u32) -> Result<u32, BitError> {
        debug_assert!(bits <= 32);
        if bits == 0 {
            return Ok(0);
        }
        self.ensure(bits as u64)?;
        let v = self
            .reader
            .read_var::<u32>(bits)
            .map_err(|_| self.out_of_range(bits as u64))?;
        self.position += bits as u64;
        Ok(v)
    }

    /// Reads an unsigned value of 0..=64 bits (PCR, 33-bit timestamps, BCD times).
    pub fn read_u64(&mut self, bits: u32) -> Result<u64, BitError> {
        debug_assert!(bits <= 64);
        if bits == 0 {
            return Ok(0);
        }
        self.ensure(bits as u64)?;
        let v = self
            .reader
            .read_var::<u64>(bits)
            .map_err(|_| self.out_of_range(bits as u64))?;
        self.position += bits as u64;
        Ok(v)
    }

    pub fn read_u8(&mut self) -> Result<u8, BitError> {
        Ok(self.read(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, BitError> {
        Ok(self.read(16)? as u16)
    }

    pub fn read_u24(&mut self) -> Result<u32, BitError> {
        self.read(24)
    }

    pub fn read_u32(&mut self) -> Result<u32, BitError> {
        self.read(32)
    }

    pub fn read_bool(&mut self) -> Result<bool, BitError> {
        self.ensure(1)?;
        let b = self.reader.read_bit().map_err(|_| self.out_of_range(1))?;
        self.position += 1;
        Ok(b)
    }

    pub fn skip(&mut self, bits: u64) -> Result<(), BitError> {
        self.ensure(bits)?;
        let target = self.position + bits;
        // whole bytes are skipped by re-anchoring the reader
        let pad = ((8 - self.position % 8) % 8).min(bits);
        if pad > 0 {
            self.reader
                .skip(pad as u32)
                .map_err(|_| self.out_of_range(bits))?;
            self.position += pad;
        }
        let whole = (target - self.position) / 8;
        if whole > 0 {
            self.seek_byte((self.position / 8 + whole) as usize);
        }
        let rest = target - self.position;
        if rest > 0 {
            self.reader
                .skip(rest as u32)
                .map_err(|_| self.out_of_range(rest))?;
            self.position += rest;
        }
        Ok(())
    }

    fn seek_byte(&mut self, byte: usize) {
        self.reader = BitReader::endian(&self.data[byte..], BigEndian);
        self.position = byte as u64 * 8;
    }

    /// Skips to the next byte boundary.
    pub fn align(&mut self) {
        let pad = (8 - self.position % 8) % 8;
        if pad > 0 {
            self.reader.byte_align();
            self.position += pad;
        }
    }

    /// Borrows `len` whole bytes; the cursor must be byte aligned.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BitError> {
        if !self.is_aligned() {
            return Err(BitError::Unaligned(self.position));
        }
        self.ensure(len as u64 * 8)?;
        let start = (self.position / 8) as usize;
        let out = &self.data[start..start + len];
        self.seek_byte(start + len);
        Ok(out)
    }

    /// Borrows every byte left (aligned cursor only).
    pub fn rest(&mut self) -> Result<&'a [u8], BitError> {
        let n = self.bytes_remaining();
        self.read_bytes(n)
    }

    /// Unsigned exp-Golomb `ue(v)`.
    pub fn read_ue(&mut self) -> Result<u32, BitError> {
        let mut zeros = 0u32;
        while !self.read_bool()? {
            zeros += 1;
            if zeros > 31 {
                return Err(BitError::InvalidExpGolomb(zeros));
            }
        }
        let suffix = self.read(zeros)? as u64;
        Ok(((1u64 << zeros) - 1 + suffix) as u32)
    }

    /// Signed exp-Golomb `se(v)`: code m maps to (-1)^(m+1) * ceil(m / 2).
    pub fn read_se(&mut self) -> Result<i32, BitError> {
        let m = self.read_ue()? as i64;
        let v = if m % 2 == 1 { (m + 1) / 2 } else { -(m / 2) };
        Ok(v as i32)
    }

    /// True while bits remain before the rbsp_stop_one_bit.
    pub fn more_rbsp_data(&self) -> bool {
        let Some(last) = self.data.iter().rposition(|&b| b != 0) else {
            return false;
        };
        let stop_bit = last as u64 * 8 + (7 - self.data[last].trailing_zeros() as u64);
        self.position < stop_bit
    }
}

/// Bit writer used to re-serialize decoded layouts.
pub struct BitWriter {
    inner: bitstream_io::BitWriter<Vec<u8>, BigEndian>,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            inner: bitstream_io::BitWriter::endian(Vec::new(), BigEndian),
        }
    }

    pub fn write(&mut self, bits: u32, value: u32) -> std::io::Result<()> {
        if bits == 0 {
            return Ok(());
        }
        self.inner.write_var::<u32>(bits, value)
    }

    pub fn write_u64(&mut self, bits: u32, value: u64) -> std::io::Result<()> {
        if bits == 0 {
            return Ok(());
        }
        self.inner.write_var::<u64>(bits, value)
    }

    pub fn write_bool(&mut self, bit: bool) -> std::io::Result<()> {
        self.inner.write_bit(bit)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.inner.write_bytes(bytes)
    }

    pub fn write_ue(&mut self, value: u32) -> std::io::Result<()> {
        let code = value as u64 + 1;
        let len = 64 - code.leading_zeros();
        self.write_u64(len - 1, 0)?;
        self.write_u64(len, code)
    }

    pub fn write_se(&mut self, value: i32) -> std::io::Result<()> {
        let mapped = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.write_ue(mapped)
    }

    pub fn is_aligned(&self) -> bool {
        self.inner.byte_aligned()
    }

    /// Pads to a byte boundary with zero bits and returns the buffer.
    pub fn finish(mut self) -> std::io::Result<Vec<u8>> {
        self.inner.byte_align()?;
        Ok(self.inner.into_writer())
    }
}

/// Removes emulation prevention bytes (0x000003 -> 0x0000).
pub fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if i + 2 < data.len() && data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 3 {
            v.extend_from_slice(&data[i..i + 2]);
            i += 3;
        } else {
            v.push(data[i]);
            i += 1;
        }
    }
    v
}

/// Decodes `digits` packed BCD nibbles held in the low bits of `value`.
/// Nibbles above 9 are clamped to 9 so corrupt fields stay in range.
pub fn bcd(value: u64, digits: u32) -> u64 {
    let mut out = 0u64;
    for i in (0..digits).rev() {
        let nibble = (value >> (i * 4)) & 0x0F;
        out = out * 10 + nibble.min(9);
    }
    out
}

/// Encodes `value` as `digits` packed BCD nibbles.
pub fn to_bcd(mut value: u64, digits: u32) -> u64 {
    let mut out = 0u64;
    for i in 0..digits {
        out |= (value % 10) << (i * 4);
        value /= 10;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fixed_width_fields_across_bytes() {
        let data = [0b1010_1100, 0b0101_0011, 0xFF];
        let mut c = BitCursor::new(&data);
        assert_eq!(c.read(3).unwrap(), 0b101);
        assert_eq!(c.read(7).unwrap(), 0b0110001);
        assert_eq!(c.bits_remaining(), 14);
        assert_eq!(c.read(14).unwrap(), 0b01_0011_1111_1111);
        assert!(c.is_empty());
    }

    #[test]
    fn read_past_end_is_an_error_not_garbage() {
        let data = [0xAB];
        let mut c = BitCursor::new(&data);
        c.read(5).unwrap();
        let err = c.read(4).unwrap_err();
        assert_eq!(
            err,
            BitError::OutOfRange {
                requested: 4,
                position: 5,
                available: 8
            }
        );
        // failed read does not move the cursor
        assert_eq!(c.read(3).unwrap(), 0b011);
    }

    #[test]
    fn exp_golomb_codes() {
        // 1 | 010 | 011 | 00100 | 00101 -> ue: 0, 1, 2, 3, 4
        let mut w = BitWriter::new();
        for v in 0..5 {
            w.write_ue(v).unwrap();
        }
        let buf = w.finish().unwrap();
        let mut c = BitCursor::new(&buf);
        for v in 0..5 {
            assert_eq!(c.read_ue().unwrap(), v);
        }

        let mut w = BitWriter::new();
        for v in [0, 1, -1, 2, -2, 17, -300] {
            w.write_se(v).unwrap();
        }
        let buf = w.finish().unwrap();
        let mut c = BitCursor::new(&buf);
        for v in [0, 1, -1, 2, -2, 17, -300] {
            assert_eq!(c.read_se().unwrap(), v);
        }
    }

    #[test]
    fn exp_golomb_with_too_many_zeros_fails() {
        let data = [0u8; 8];
        let mut c = BitCursor::new(&data);
        assert_eq!(c.read_ue().unwrap_err(), BitError::InvalidExpGolomb(32));
    }

    #[test]
    fn align_skip_and_aligned_byte_reads() {
        let data = [0xF0, 0x01, 0x02, 0x03, 0x04];
        let mut c = BitCursor::new(&data);
        c.read(3).unwrap();
        assert_eq!(c.read_bytes(1).unwrap_err(), BitError::Unaligned(3));
        c.align();
        assert_eq!(c.read_bytes(2).unwrap(), &[0x01, 0x02]);
        c.skip(12).unwrap();
        assert_eq!(c.read(4).unwrap(), 0x4);
        assert!(c.skip(1).is_err());
    }

    #[test]
    fn more_rbsp_data_stops_at_trailing_bit() {
        let data = [0b1100_0000, 0b1000_0000];
        let mut c = BitCursor::new(&data);
        c.read(2).unwrap();
        assert!(c.more_rbsp_data());
        c.read(6).unwrap();
        assert!(!c.more_rbsp_data());
    }

    #[test]
    fn emulation_prevention_removed() {
        let raw = [0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x00, 0x03];
        assert_eq!(
            strip_emulation_prevention(&raw),
            vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn bcd_round_trip() {
        assert_eq!(bcd(0x1175_0000, 8), 11_750_000);
        assert_eq!(to_bcd(11_750_000, 8), 0x1175_0000);
        assert_eq!(bcd(0x0192, 4), 192);
    }
}
