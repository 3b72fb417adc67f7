//! Dictionary matching and rotation helpers.

use crate::Dictionary;

/// A dictionary match for an observed marker code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Marker id in the dictionary.
    pub id: u32,
    /// Rotation `0..=3` such that: `observed_code == rotate(dict_code, rotation)`.
    pub rotation: u8,
    /// Hamming distance between observed and dictionary code (after rotation).
    pub hamming: u8,
}

/// Matcher borrowing a dictionary for the duration of one detection pass.
///
/// Brute-force over all ids and rotations; the rotated code table is built
/// once per matcher.
#[derive(Clone, Debug)]
pub struct Matcher<'a> {
    dict: &'a Dictionary,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
}

impl<'a> Matcher<'a> {
    /// Build a matcher accepting codes within `max_hamming` bits.
    ///
    /// The threshold is clamped to the dictionary's `max_correction_bits`.
    pub fn new(dict: &'a Dictionary, max_hamming: u8) -> Self {
        let n = dict.marker_size;
        let rotated = dict
            .codes
            .iter()
            .map(|&base| {
                [
                    rotate_code_u64(base, n, 0),
                    rotate_code_u64(base, n, 1),
                    rotate_code_u64(base, n, 2),
                    rotate_code_u64(base, n, 3),
                ]
            })
            .collect();

        Self {
            dict,
            max_hamming: max_hamming.min(dict.max_correction_bits),
            rotated,
        }
    }

    #[inline]
    pub fn dictionary(&self) -> &'a Dictionary {
        self.dict
    }

    /// Effective Hamming threshold.
    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Find the best match within `max_hamming`. Ties keep the lowest id.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;

        for (id, rots) in self.rotated.iter().enumerate() {
            for (rot, &cand) in rots.iter().enumerate() {
                let h = (observed ^ cand).count_ones() as u8;
                if h > self.max_hamming {
                    continue;
                }
                if best.is_some_and(|prev| prev.hamming <= h) {
                    continue;
                }
                best = Some(Match {
                    id: id as u32,
                    rotation: rot as u8,
                    hamming: h,
                });
                if h == 0 {
                    return best;
                }
            }
        }

        best
    }
}

/// Rotate a code stored in row-major bits: `idx = y * N + x`.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }

    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let (sx, sy) = match rot {
                1 => (y, n - 1 - x),
                2 => (n - 1 - x, n - 1 - y),
                _ => (n - 1 - y, x),
            };
            out |= ((code >> (sy * n + sx)) & 1) << (y * n + x);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> Dictionary {
        Dictionary::from_json_str(include_str!("../../../testdata/demo_6x6_32.json"))
            .expect("fixture dictionary")
    }

    #[test]
    fn rotate_four_times_is_identity() {
        let code = 0x0123_4567_89ab_cdef_u64;
        let mut r = code;
        for _ in 0..4 {
            r = rotate_code_u64(r, 8, 1);
        }
        assert_eq!(code, r);
    }

    #[test]
    fn matcher_finds_rotated_code() {
        let dict = demo();
        let matcher = Matcher::new(&dict, 0);

        let observed = rotate_code_u64(dict.codes[7], dict.marker_size, 3);
        let m = matcher.match_code(observed).expect("match");
        assert_eq!(m, Match { id: 7, rotation: 3, hamming: 0 });
    }

    #[test]
    fn matcher_corrects_flipped_bits_up_to_limit() {
        let dict = demo();
        let matcher = Matcher::new(&dict, u8::MAX);
        assert_eq!(matcher.max_hamming(), dict.max_correction_bits);

        let observed = dict.codes[12] ^ 0b1001;
        let m = matcher.match_code(observed).expect("match");
        assert_eq!(m.id, 12);
        assert_eq!(m.hamming, 2);

        let strict = Matcher::new(&dict, 1);
        assert!(strict.match_code(observed).is_none());
    }

    #[test]
    fn full_size_6x6_family_matches_every_id() {
        // 250 pseudo-random 36-bit codes, the size of a full 6x6 family.
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let codes: Vec<u64> = (0..250)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                (state >> 20) & ((1u64 << 36) - 1)
            })
            .collect();
        let dict = Dictionary::new("user_6x6_250", 6, 0, codes).expect("valid table");
        assert_eq!(dict.len(), 250);

        let matcher = Matcher::new(&dict, 0);
        for id in [0u32, 131, 249] {
            let code = dict.code(id).expect("code");
            let m = matcher
                .match_code(rotate_code_u64(code, 6, 2))
                .expect("match");
            assert_eq!(m.id, id);
        }
    }
}
