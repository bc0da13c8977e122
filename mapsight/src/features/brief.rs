//! Oriented BRIEF descriptors.
//!
//! Each descriptor is 256 intensity comparisons between pixel pairs drawn
//! from a fixed pattern around the keypoint. The pattern is rotated by the
//! keypoint orientation (intensity centroid) before sampling, so descriptors
//! survive in-plane rotation.

use std::sync::OnceLock;

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Descriptor, DESCRIPTOR_BYTES};

/// Number of binary tests per descriptor.
const PATTERN_PAIRS: usize = DESCRIPTOR_BYTES * 8;

/// Largest pattern offset before rotation.
const PATTERN_RADIUS: i32 = 13;

/// Radius of the disc used for the intensity centroid.
pub const ORIENTATION_RADIUS: i32 = 15;

/// Fixed seed so every process builds the same pattern.
const PATTERN_SEED: u64 = 0x0B21_EF5E;

type Pattern = [((i32, i32), (i32, i32)); PATTERN_PAIRS];

fn pattern() -> &'static Pattern {
    static PATTERN: OnceLock<Pattern> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        // Average of two uniforms: concentrates tests near the centre.
        let mut offset = move || {
            let a = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            let b = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            (a + b) / 2
        };
        std::array::from_fn(|_| {
            let p1 = (offset(), offset());
            let mut p2 = (offset(), offset());
            if p1 == p2 {
                p2 = (-p1.0, p1.1 + 1);
            }
            (p1, p2)
        })
    })
}

/// Intensity-centroid orientation in radians.
///
/// Returns 0 when the patch would leave the image.
pub fn orientation(image: &GrayImage, x: u32, y: u32) -> f32 {
    let (width, height) = image.dimensions();
    let r = ORIENTATION_RADIUS;
    let (cx, cy) = (x as i32, y as i32);
    if cx < r || cy < r || cx + r >= width as i32 || cy + r >= height as i32 {
        return 0.0;
    }

    let mut m01 = 0.0f64;
    let mut m10 = 0.0f64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let v = image.get_pixel((cx + dx) as u32, (cy + dy) as u32)[0] as f64;
            m10 += dx as f64 * v;
            m01 += dy as f64 * v;
        }
    }
    m01.atan2(m10) as f32
}

/// Compute the descriptor for a keypoint on a pre-smoothed image.
///
/// Returns `None` when a rotated sample would fall outside the image.
pub fn describe(smoothed: &GrayImage, x: u32, y: u32, angle: f32) -> Option<Descriptor> {
    let (width, height) = smoothed.dimensions();
    let (sin, cos) = angle.sin_cos();
    let (cx, cy) = (x as i32, y as i32);

    let sample = |(px, py): (i32, i32)| -> Option<u8> {
        let rx = (px as f32 * cos - py as f32 * sin).round() as i32 + cx;
        let ry = (px as f32 * sin + py as f32 * cos).round() as i32 + cy;
        if rx < 0 || ry < 0 || rx >= width as i32 || ry >= height as i32 {
            return None;
        }
        Some(smoothed.get_pixel(rx as u32, ry as u32)[0])
    };

    let mut descriptor = [0u8; DESCRIPTOR_BYTES];
    for (i, &(p1, p2)) in pattern().iter().enumerate() {
        if sample(p1)? < sample(p2)? {
            descriptor[i / 8] |= 1 << (i % 8);
        }
    }
    Some(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, _| Luma([(x * 4) as u8]))
    }

    #[test]
    fn test_pattern_is_stable() {
        let a = pattern();
        let b = pattern();
        assert_eq!(a[0], b[0]);
        for &((x1, y1), (x2, y2)) in a.iter() {
            assert!(x1.abs() <= PATTERN_RADIUS && y1.abs() <= PATTERN_RADIUS);
            assert!((x1, y1) != (x2, y2));
        }
    }

    #[test]
    fn test_orientation_points_towards_bright_side() {
        let img = gradient();
        let angle = orientation(&img, 32, 32);
        assert!(angle.abs() < 0.05, "angle {}", angle);

        let flipped = GrayImage::from_fn(64, 64, |_, y| Luma([(y * 4) as u8]));
        let angle = orientation(&flipped, 32, 32);
        assert!((angle - std::f32::consts::FRAC_PI_2).abs() < 0.05);
    }

    #[test]
    fn test_orientation_near_edge_is_zero() {
        assert_eq!(orientation(&gradient(), 3, 32), 0.0);
    }

    #[test]
    fn test_describe_out_of_bounds() {
        assert!(describe(&gradient(), 2, 2, 0.0).is_none());
    }

    #[test]
    fn test_describe_is_translation_invariant() {
        let img = GrayImage::from_fn(96, 96, |x, y| Luma([((x * 31) ^ (y * 17)) as u8]));
        let sub = image::imageops::crop_imm(&img, 10, 20, 60, 60).to_image();
        let a = describe(&img, 40, 50, 0.3).unwrap();
        let b = describe(&sub, 30, 30, 0.3).unwrap();
        assert_eq!(a, b);
    }
}
