//! Brute-force Hamming matching with Lowe's ratio test.

use rayon::prelude::*;

use super::{Descriptor, Feature};

/// A query feature paired with its best reference feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correspondence {
    /// Index into the query (frame) features.
    pub query: usize,
    /// Index into the reference (map) features.
    pub train: usize,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

/// Hamming distance between two descriptors.
#[inline]
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Match every query feature against `candidates` (indices into `train`).
///
/// A match is kept when its distance is at most `max_distance` and the best
/// distance is below `ratio` times the second best. Query features with a
/// single candidate only face the distance bound.
pub fn match_features(
    query: &[Feature],
    train: &[Feature],
    candidates: &[usize],
    ratio: f32,
    max_distance: u32,
) -> Vec<Correspondence> {
    if query.is_empty() || candidates.is_empty() {
        return Vec::new();
    }

    query
        .par_iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            let mut best = (u32::MAX, usize::MAX);
            let mut second = u32::MAX;
            for &ti in candidates {
                let d = hamming(&q.descriptor, &train[ti].descriptor);
                if d < best.0 {
                    second = best.0;
                    best = (d, ti);
                } else if d < second {
                    second = d;
                }
            }

            if best.0 > max_distance {
                return None;
            }
            if second != u32::MAX && best.0 as f32 >= ratio * second as f32 {
                return None;
            }
            Some(Correspondence {
                query: qi,
                train: best.1,
                distance: best.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Keypoint;

    fn feature(descriptor: Descriptor) -> Feature {
        Feature {
            keypoint: Keypoint {
                x: 0.0,
                y: 0.0,
                response: 1.0,
                angle: 0.0,
            },
            descriptor,
        }
    }

    fn with_bits(bits: usize) -> Descriptor {
        let mut d = [0u8; 32];
        for i in 0..bits {
            d[i / 8] |= 1 << (i % 8);
        }
        d
    }

    #[test]
    fn test_hamming() {
        assert_eq!(hamming(&[0u8; 32], &[0u8; 32]), 0);
        assert_eq!(hamming(&[0u8; 32], &[0xFF; 32]), 256);
        assert_eq!(hamming(&with_bits(5), &with_bits(12)), 7);
    }

    #[test]
    fn test_exact_match_found() {
        let train = vec![feature(with_bits(0)), feature(with_bits(100)), feature(with_bits(200))];
        let query = vec![feature(with_bits(100))];
        let matches = match_features(&query, &train, &[0, 1, 2], 0.75, 64);
        assert_eq!(
            matches,
            vec![Correspondence {
                query: 0,
                train: 1,
                distance: 0
            }]
        );
    }

    #[test]
    fn test_ratio_test_rejects_ambiguous() {
        // Two equally distant candidates
        let train = vec![feature(with_bits(10)), feature(with_bits(30))];
        let query = vec![feature(with_bits(20))];
        assert!(match_features(&query, &train, &[0, 1], 0.75, 64).is_empty());
    }

    #[test]
    fn test_max_distance() {
        let train = vec![feature(with_bits(0))];
        let query = vec![feature(with_bits(100))];
        assert!(match_features(&query, &train, &[0], 0.75, 64).is_empty());
        assert_eq!(match_features(&query, &train, &[0], 0.75, 128).len(), 1);
    }

    #[test]
    fn test_candidates_restrict_search() {
        let train = vec![feature(with_bits(50)), feature(with_bits(200))];
        let query = vec![feature(with_bits(50))];
        let matches = match_features(&query, &train, &[1], 0.75, 256);
        assert_eq!(matches[0].train, 1);
        assert!(match_features(&query, &train, &[], 0.75, 256).is_empty());
    }
}
