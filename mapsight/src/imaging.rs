//! Grayscale image helpers shared by the matcher and the motion tracker.
//!
//! Every matching stage works on single-channel 8-bit rasters
//! ([`GrayImage`]). Colour frames are converted once per tick by
//! [`crate::capture::Frame::to_gray`]; the helpers here only resample and
//! measure grayscale data.
//!
//! [`PreprocessConfig`] is the optional matching preprocessing (posterize,
//! then local contrast equalisation). It must run on the reference map and
//! on every frame alike, so [`crate::reference::ReferenceMap`] owns it and
//! the matcher applies the map's settings to incoming frames.

use image::imageops::{self, FilterType};
use image::GrayImage;

/// Resample `image` by `factor` (0 < factor).
///
/// A factor of 1.0 returns a copy. Dimensions are rounded and never drop
/// below one pixel.
pub fn rescale(image: &GrayImage, factor: f64) -> GrayImage {
    if (factor - 1.0).abs() < f64::EPSILON || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let width = ((image.width() as f64 * factor).round() as u32).max(1);
    let height = ((image.height() as f64 * factor).round() as u32).max(1);
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Reduce the image to `levels` evenly spaced intensities.
///
/// Flattens fine gradients (water, haze) so matching concentrates on
/// structural edges. `levels` below 2 leaves the image unchanged.
pub fn posterize(image: &mut GrayImage, levels: u8) {
    if levels < 2 {
        return;
    }
    let step = 256.0 / levels as f32;
    let top = 255.0 / (levels - 1) as f32;
    for pixel in image.pixels_mut() {
        let bin = (pixel.0[0] as f32 / step).floor().min((levels - 1) as f32);
        pixel.0[0] = (bin * top).round() as u8;
    }
}

/// Preprocessing applied identically to the reference map and every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessConfig {
    /// Posterize to this many grey levels; 0 disables (default: 0).
    pub posterize_levels: u8,

    /// Clip limit for local contrast equalisation, as a multiple of the
    /// mean histogram bin height; 0 disables (default: 0.0).
    pub equalize_clip_limit: f32,

    /// Equalisation regions per axis (default: 8).
    pub equalize_tiles: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            posterize_levels: 0,
            equalize_clip_limit: 0.0,
            equalize_tiles: 8,
        }
    }
}

impl PreprocessConfig {
    /// True when [`apply`](Self::apply) leaves images untouched.
    pub fn is_identity(&self) -> bool {
        self.posterize_levels < 2 && self.equalize_clip_limit <= 0.0
    }

    /// Posterize, then equalise.
    pub fn apply(&self, image: &mut GrayImage) {
        posterize(image, self.posterize_levels);
        if self.equalize_clip_limit > 0.0 {
            equalize_local(image, self.equalize_clip_limit, self.equalize_tiles);
        }
    }
}

/// Contrast-limited adaptive histogram equalisation.
///
/// The image is split into `tiles × tiles` regions. Each region's histogram
/// is clipped at `clip_limit` times the mean bin height and the excess is
/// spread over every bin, which bounds how far flat areas get stretched.
/// Pixels are then mapped through the four nearest region mappings,
/// interpolated bilinearly between region centres.
pub fn equalize_local(image: &mut GrayImage, clip_limit: f32, tiles: u32) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || clip_limit <= 0.0 {
        return;
    }
    let tx = tiles.clamp(1, width);
    let ty = tiles.clamp(1, height);
    let span = |i: u32, n: u32, len: u32| {
        let lo = (i as u64 * len as u64 / n as u64) as u32;
        let hi = ((i as u64 + 1) * len as u64 / n as u64) as u32;
        (lo, hi)
    };

    let mut luts = Vec::with_capacity((tx * ty) as usize);
    for j in 0..ty {
        let (y0, y1) = span(j, ty, height);
        for i in 0..tx {
            let (x0, x1) = span(i, tx, width);
            let mut histogram = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[image.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            luts.push(clipped_mapping(&mut histogram, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let tile_w = width as f32 / tx as f32;
    let tile_h = height as f32 / ty as f32;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (i0, i1, ax) = neighbours(x, tile_w, tx);
        let (j0, j1, ay) = neighbours(y, tile_h, ty);
        let v = pixel.0[0] as usize;
        let at = |i: u32, j: u32| luts[(j * tx + i) as usize][v] as f32;
        let top = at(i0, j0) * (1.0 - ax) + at(i1, j0) * ax;
        let bottom = at(i0, j1) * (1.0 - ax) + at(i1, j1) * ax;
        pixel.0[0] = (top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8;
    }
}

/// Clip `histogram`, redistribute the excess and return the CDF mapping.
fn clipped_mapping(histogram: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for count in histogram.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (v, count) in histogram.iter().enumerate() {
        cdf += count + share + u32::from(v < remainder);
        lut[v] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Lower and upper region index around pixel `p`, and the upper weight.
fn neighbours(p: u32, tile: f32, count: u32) -> (u32, u32, f32) {
    let f = (p as f32 + 0.5) / tile - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let lo = (f.floor() as u32).min(count - 1);
    let hi = (lo + 1).min(count - 1);
    (lo, hi, (f - lo as f32).min(1.0))
}

/// Mean and standard deviation of the pixel intensities.
pub fn mean_stddev(image: &GrayImage) -> (f64, f64) {
    let n = (image.width() as u64 * image.height() as u64) as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let (sum, sum_sq) = image.as_raw().iter().fold((0.0_f64, 0.0_f64), |(s, sq), &v| {
        let v = v as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Copy the sub-rectangle at `(x, y)` clipped to the image bounds.
pub fn crop(image: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> GrayImage {
    let x = x.min(image.width());
    let y = y.min(image.height());
    let width = width.min(image.width() - x);
    let height = height.min(image.height() - y);
    imageops::crop_imm(image, x, y, width, height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_rescale_dimensions() {
        let img = GrayImage::new(200, 100);
        let half = rescale(&img, 0.5);
        assert_eq!(half.dimensions(), (100, 50));

        let same = rescale(&img, 1.0);
        assert_eq!(same.dimensions(), (200, 100));

        let tiny = rescale(&GrayImage::new(3, 3), 0.01);
        assert_eq!(tiny.dimensions(), (1, 1));
    }

    #[test]
    fn test_posterize_levels() {
        let mut img = GrayImage::from_fn(256, 1, |x, _| Luma([x as u8]));
        posterize(&mut img, 4);
        let mut values: Vec<u8> = img.pixels().map(|p| p.0[0]).collect();
        values.dedup();
        assert_eq!(values, vec![0, 85, 170, 255]);
    }

    #[test]
    fn test_posterize_noop_below_two_levels() {
        let mut img = GrayImage::from_fn(16, 1, |x, _| Luma([x as u8 * 10]));
        let before = img.clone();
        posterize(&mut img, 1);
        assert_eq!(img, before);
    }

    fn checkerboard(low: u8, high: u8) -> GrayImage {
        GrayImage::from_fn(256, 256, |x, y| Luma([if (x + y) % 2 == 0 { low } else { high }]))
    }

    fn step_between(image: &GrayImage) -> i32 {
        image.get_pixel(101, 100).0[0] as i32 - image.get_pixel(100, 100).0[0] as i32
    }

    #[test]
    fn test_equalize_stretches_low_contrast() {
        let mut mild = checkerboard(120, 124);
        equalize_local(&mut mild, 2.0, 8);
        assert!(step_between(&mild) > 4, "step {}", step_between(&mild));

        let mut strong = checkerboard(120, 124);
        equalize_local(&mut strong, 40.0, 8);
        assert!(step_between(&strong) > step_between(&mild));
    }

    #[test]
    fn test_equalize_uniform_stays_uniform() {
        let mut img = GrayImage::from_pixel(128, 64, Luma([90]));
        equalize_local(&mut img, 2.0, 8);
        let first = img.get_pixel(0, 0).0[0];
        assert!(img.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn test_equalize_tiny_image() {
        let mut img = GrayImage::from_fn(3, 2, |x, y| Luma([(x * 40 + y * 90) as u8]));
        equalize_local(&mut img, 2.0, 8);
        assert_eq!(img.dimensions(), (3, 2));
    }

    #[test]
    fn test_default_preprocess_is_identity() {
        let config = PreprocessConfig::default();
        assert!(config.is_identity());

        let mut img = checkerboard(10, 200);
        config.apply(&mut img);
        assert_eq!(img, checkerboard(10, 200));
    }

    #[test]
    fn test_preprocess_posterizes_then_equalizes() {
        let config = PreprocessConfig {
            posterize_levels: 4,
            equalize_clip_limit: 2.0,
            ..Default::default()
        };
        assert!(!config.is_identity());

        // 120 and 124 share a posterize bin, so nothing is left to stretch
        let mut img = checkerboard(120, 124);
        config.apply(&mut img);
        assert_eq!(step_between(&img), 0);
    }

    #[test]
    fn test_mean_stddev_uniform() {
        let img = GrayImage::from_pixel(32, 32, Luma([77]));
        let (mean, std) = mean_stddev(&img);
        assert!((mean - 77.0).abs() < 1e-9);
        assert!(std < 1e-9);
    }

    #[test]
    fn test_mean_stddev_checkerboard() {
        let img = GrayImage::from_fn(10, 10, |x, y| Luma([if (x + y) % 2 == 0 { 0 } else { 200 }]));
        let (mean, std) = mean_stddev(&img);
        assert!((mean - 100.0).abs() < 1e-9);
        assert!((std - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_crop_clips_to_bounds() {
        let img = GrayImage::from_fn(50, 40, |x, y| Luma([(x + y) as u8]));
        let c = crop(&img, 40, 30, 20, 20);
        assert_eq!(c.dimensions(), (10, 10));
        assert_eq!(c.get_pixel(0, 0).0[0], 70);

        let outside = crop(&img, 100, 100, 5, 5);
        assert_eq!(outside.dimensions(), (0, 0));
    }
}
