//! Key-byte search strategies for the fixed-width node arrays.
//!
//! Node16 keeps its 16 key bytes in a fixed array; locating a byte and
//! finding a sorted insertion position are width-parallel on x86-64 with
//! SSE2 (compare all 16 lanes at once) and plain loops elsewhere. Which
//! path runs is a build-time decision; both return the same result for
//! every input, down to the tie-break (lowest matching index), and the
//! tests here compare them lane-for-lane whenever both are compiled in.
//!
//! Node256 occupancy queries scan a 4-word bitmap with trailing/leading
//! zero counts.

/// Index of the first occurrence of `byte` among the first `len` keys.
#[inline]
pub(crate) fn find_byte16(keys: &[u8; 16], len: usize, byte: u8) -> Option<usize> {
    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    {
        return find_byte16_sse2(keys, len, byte);
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "sse2")))]
    {
        find_byte16_scalar(keys, len, byte)
    }
}

/// Number of keys strictly less than `byte` among the first `len`.
///
/// On the sorted arrays Node16 maintains this is the insertion position
/// for an absent byte.
#[inline]
pub(crate) fn insert_pos16(keys: &[u8; 16], len: usize, byte: u8) -> usize {
    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    {
        return insert_pos16_sse2(keys, len, byte);
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "sse2")))]
    {
        insert_pos16_scalar(keys, len, byte)
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
#[inline]
fn find_byte16_sse2(keys: &[u8; 16], len: usize, byte: u8) -> Option<usize> {
    use std::arch::x86_64::*;

    debug_assert!(len <= 16);
    if len == 0 {
        return None;
    }
    // SAFETY: SSE2 is statically enabled for this target and the load reads
    // exactly the 16 bytes of `keys`.
    unsafe {
        let keys_vec = _mm_loadu_si128(keys.as_ptr() as *const __m128i);
        let search = _mm_set1_epi8(byte as i8);
        let cmp = _mm_cmpeq_epi8(keys_vec, search);
        let mask = (_mm_movemask_epi8(cmp) as u32) & lane_mask(len);
        if mask != 0 {
            Some(mask.trailing_zeros() as usize)
        } else {
            None
        }
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
#[inline]
fn insert_pos16_sse2(keys: &[u8; 16], len: usize, byte: u8) -> usize {
    use std::arch::x86_64::*;

    debug_assert!(len <= 16);
    if len == 0 {
        return 0;
    }
    // SAFETY: as above. The XOR with 0x80 biases both sides because the
    // lane compare is signed.
    unsafe {
        let keys_vec = _mm_loadu_si128(keys.as_ptr() as *const __m128i);
        let bias = _mm_set1_epi8(-128);
        let keys_biased = _mm_xor_si128(keys_vec, bias);
        let target = _mm_set1_epi8((byte ^ 0x80) as i8);
        let lt = _mm_cmplt_epi8(keys_biased, target);
        let mask = (_mm_movemask_epi8(lt) as u32) & lane_mask(len);
        mask.count_ones() as usize
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
#[inline]
fn lane_mask(len: usize) -> u32 {
    (1u32 << len) - 1
}

/// Scalar fallback for [`find_byte16`]; first match wins, same as the
/// SIMD path's trailing-zeros tie-break.
#[inline]
fn find_byte16_scalar(keys: &[u8; 16], len: usize, byte: u8) -> Option<usize> {
    debug_assert!(len <= 16);
    keys[..len].iter().position(|&k| k == byte)
}

/// Scalar fallback for [`insert_pos16`].
#[inline]
fn insert_pos16_scalar(keys: &[u8; 16], len: usize, byte: u8) -> usize {
    debug_assert!(len <= 16);
    keys[..len].iter().filter(|&&k| k < byte).count()
}

/// Lowest set bit index in a 256-bit occupancy bitmap.
#[inline]
pub(crate) fn first_set(bitmap: &[u64; 4]) -> Option<usize> {
    for (word_idx, &word) in bitmap.iter().enumerate() {
        if word != 0 {
            return Some(word_idx * 64 + word.trailing_zeros() as usize);
        }
    }
    None
}

/// Highest set bit index in a 256-bit occupancy bitmap.
#[inline]
pub(crate) fn last_set(bitmap: &[u64; 4]) -> Option<usize> {
    for (word_idx, &word) in bitmap.iter().enumerate().rev() {
        if word != 0 {
            return Some(word_idx * 64 + 63 - word.leading_zeros() as usize);
        }
    }
    None
}

/// Lowest set bit index at or above `from`.
#[inline]
pub(crate) fn next_set(bitmap: &[u64; 4], from: usize) -> Option<usize> {
    if from >= 256 {
        return None;
    }
    let first_word = from >> 6;
    let masked = bitmap[first_word] & (u64::MAX << (from & 63));
    if masked != 0 {
        return Some(first_word * 64 + masked.trailing_zeros() as usize);
    }
    for word_idx in first_word + 1..4 {
        let word = bitmap[word_idx];
        if word != 0 {
            return Some(word_idx * 64 + word.trailing_zeros() as usize);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn test_arrays() -> Vec<[u8; 16]> {
        let mut arrays = vec![
            [0u8; 16],
            [0xFF; 16],
            [7; 16],
            std::array::from_fn(|i| i as u8),
            std::array::from_fn(|i| (i * 16) as u8),
            std::array::from_fn(|i| 255 - i as u8),
            std::array::from_fn(|i| (i % 3) as u8),
        ];
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..64 {
            arrays.push(std::array::from_fn(|_| rng.gen()));
        }
        arrays
    }

    #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
    #[test]
    fn simd_and_scalar_agree_on_every_input() {
        for keys in test_arrays() {
            for len in 0..=16 {
                for byte in 0..=255u8 {
                    assert_eq!(
                        find_byte16_sse2(&keys, len, byte),
                        find_byte16_scalar(&keys, len, byte),
                        "find mismatch: keys={keys:?} len={len} byte={byte}"
                    );
                    assert_eq!(
                        insert_pos16_sse2(&keys, len, byte),
                        insert_pos16_scalar(&keys, len, byte),
                        "insert_pos mismatch: keys={keys:?} len={len} byte={byte}"
                    );
                }
            }
        }
    }

    #[test]
    fn find_returns_lowest_matching_index() {
        let mut keys = [9u8; 16];
        keys[3] = 1;
        keys[7] = 1;
        assert_eq!(find_byte16(&keys, 16, 1), Some(3));
        assert_eq!(find_byte16(&keys, 3, 1), None);
        assert_eq!(find_byte16(&keys, 0, 9), None);
    }

    #[test]
    fn insert_pos_matches_sorted_position() {
        let mut keys = [0u8; 16];
        for (i, byte) in [2u8, 4, 9, 200, 255].iter().enumerate() {
            keys[i] = *byte;
        }
        assert_eq!(insert_pos16(&keys, 5, 0), 0);
        assert_eq!(insert_pos16(&keys, 5, 3), 1);
        assert_eq!(insert_pos16(&keys, 5, 9), 2);
        assert_eq!(insert_pos16(&keys, 5, 201), 4);
        assert_eq!(insert_pos16(&keys, 5, 255), 4);
    }

    fn naive_bits(bitmap: &[u64; 4]) -> Vec<usize> {
        (0..256)
            .filter(|&b| bitmap[b >> 6] & (1u64 << (b & 63)) != 0)
            .collect()
    }

    #[test]
    fn bitmap_scans_match_naive_reference() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut cases: Vec<[u64; 4]> = vec![
            [0; 4],
            [u64::MAX; 4],
            [1, 0, 0, 0],
            [0, 0, 0, 1u64 << 63],
        ];
        for _ in 0..64 {
            cases.push(std::array::from_fn(|_| rng.gen::<u64>() & rng.gen::<u64>()));
        }
        for bitmap in cases {
            let bits = naive_bits(&bitmap);
            assert_eq!(first_set(&bitmap), bits.first().copied());
            assert_eq!(last_set(&bitmap), bits.last().copied());
            for from in 0..=256 {
                let expected = bits.iter().copied().find(|&b| b >= from);
                assert_eq!(next_set(&bitmap, from), expected, "from={from}");
            }
        }
    }
}
