//! Packing of palette indices into 32-bit words.
//!
//! Indices never straddle a word boundary: a word holds `32 / bits` indices
//! in its low bits and any remaining high bits are padding. Supported widths
//! are 1, 2, 3, 4, 5, 6, 8 and 16 bits.

/// Widths accepted by [`pack`] and [`unpack`].
pub const VALID_BITS: [u8; 8] = [1, 2, 3, 4, 5, 6, 8, 16];

/// Smallest supported width able to index a palette of `palette_len` entries.
pub fn bits_for_palette(palette_len: usize) -> u8 {
    match palette_len {
        0..=2 => 1,
        3..=4 => 2,
        5..=8 => 3,
        9..=16 => 4,
        17..=32 => 5,
        33..=64 => 6,
        65..=256 => 8,
        _ => 16,
    }
}

/// Number of 32-bit words needed to hold `len` indices at `bits` each.
pub fn word_count(bits: u8, len: usize) -> usize {
    let per_word = (32 / u32::from(bits)) as usize;
    len.div_ceil(per_word)
}

/// Packs `values` at `bits` per entry.
///
/// Values wider than `bits` are truncated; callers pick `bits` from the
/// palette length.
pub fn pack(values: &[u16], bits: u8) -> Vec<u32> {
    debug_assert!(VALID_BITS.contains(&bits), "unsupported width {bits}");
    let per_word = (32 / u32::from(bits)) as usize;
    let mask = (1u32 << bits) - 1;
    values
        .chunks(per_word)
        .map(|group| {
            group.iter().enumerate().fold(0u32, |word, (slot, &v)| {
                word | ((u32::from(v) & mask) << (slot as u32 * u32::from(bits)))
            })
        })
        .collect()
}

/// Unpacks `len` indices of `bits` each from `words`.
///
/// Returns `None` if `words` is too short.
pub fn unpack(words: &[u32], bits: u8, len: usize) -> Option<Vec<u16>> {
    if !VALID_BITS.contains(&bits) || words.len() < word_count(bits, len) {
        return None;
    }
    let per_word = (32 / u32::from(bits)) as usize;
    let mask = (1u32 << bits) - 1;
    let out = (0..len)
        .map(|i| {
            let word = words[i / per_word];
            let shift = (i % per_word) as u32 * u32::from(bits);
            ((word >> shift) & mask) as u16
        })
        .collect();
    Some(out)
}
