//! Common parsing utilities

/// Positions of 0x000001 start codes; each entry is the offset of the byte
/// following the prefix.
pub fn start_codes(data: &[u8]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            out.push(i + 3);
            i += 3;
        } else if data[i + 2] > 1 {
            i += 3;
        } else {
            i += 1;
        }
    }
    out
}

/// Splits an Annex B byte stream into NAL units as (offset, bytes). Zero
/// bytes before the next start code (4-byte prefixes, trailing_zero_8bits)
/// are not part of the unit.
pub fn split_annex_b(data: &[u8]) -> Vec<(usize, &[u8])> {
    let starts = start_codes(data);
    let mut units = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let mut end = match starts.get(n + 1) {
            Some(&next) => next - 3,
            None => data.len(),
        };
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            units.push((start, &data[start..end]));
        }
    }
    units
}

/// Forward search for a sync pattern matching `mask`/`value` on the first
/// two bytes.
pub fn find_sync16(data: &[u8], from: usize, mask: u16, value: u16) -> Option<usize> {
    (from..data.len().saturating_sub(1)).find(|&i| (u16::from_be_bytes([data[i], data[i + 1]]) & mask) == value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_annex_b_mixed_prefixes() {
        let data = [0, 0, 0, 1, 0x67, 0xAA, 0, 0, 1, 0x68, 0xBB, 0xCC, 0, 0];
        let units = split_annex_b(&data);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0], (4, &[0x67, 0xAA][..]));
        assert_eq!(units[1], (9, &[0x68, 0xBB, 0xCC][..]));
    }

    #[test]
    fn test_find_sync16() {
        let data = [0x00, 0x0B, 0x77, 0x01];
        assert_eq!(find_sync16(&data, 0, 0xFFFF, 0x0B77), Some(1));
        assert_eq!(find_sync16(&data, 2, 0xFFFF, 0x0B77), None);
    }
}
