//! Synthetic imagery shared by unit tests.

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Smooth random texture: bilinear value noise on an 8px grid plus grain.
///
/// Rich in both low frequencies (phase correlation) and corners (FAST).
pub(crate) fn texture(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let cell = 8u32;
    let gw = width / cell + 2;
    let gh = height / cell + 2;
    let grid: Vec<f64> = (0..gw * gh).map(|_| rng.random_range(0.0..200.0)).collect();
    let grain: Vec<f64> = (0..width * height)
        .map(|_| rng.random_range(0.0..40.0))
        .collect();

    GrayImage::from_fn(width, height, |x, y| {
        let (gx, gy) = (x / cell, y / cell);
        let fx = (x % cell) as f64 / cell as f64;
        let fy = (y % cell) as f64 / cell as f64;
        let at = |i: u32, j: u32| grid[(j * gw + i) as usize];
        let top = at(gx, gy) * (1.0 - fx) + at(gx + 1, gy) * fx;
        let bottom = at(gx, gy + 1) * (1.0 - fx) + at(gx + 1, gy + 1) * fx;
        let v = top * (1.0 - fy) + bottom * fy + grain[(y * width + x) as usize];
        Luma([v.clamp(0.0, 255.0) as u8])
    })
}
