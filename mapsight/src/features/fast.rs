//! FAST-9 corner detection with 3×3 non-maximum suppression.

use image::GrayImage;
use rayon::prelude::*;

use super::Keypoint;

/// Bresenham circle of radius 3 around the candidate pixel.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous arc length required for a corner.
const ARC_LENGTH: usize = 9;

/// Detect FAST corners at least `border` pixels away from the image edges.
///
/// Suppression keeps a corner only if no 8-neighbour has a higher score, so
/// the result depends only on local pixels and not on where the image was
/// cropped from.
pub fn detect(image: &GrayImage, threshold: u8, border: u32) -> Vec<Keypoint> {
    let (width, height) = image.dimensions();
    let border = border.max(3);
    if width <= 2 * border || height <= 2 * border {
        return Vec::new();
    }

    let pixels = image.as_raw();
    let stride = width as usize;

    // Score map over the whole image; zero means "not a corner".
    let scores: Vec<f32> = (0..height)
        .into_par_iter()
        .flat_map_iter(|y| {
            (0..width).map(move |x| {
                if x < border || y < border || x >= width - border || y >= height - border {
                    0.0
                } else {
                    corner_score(pixels, stride, x as i32, y as i32, threshold)
                }
            })
        })
        .collect();

    let mut corners: Vec<Keypoint> = (border..height - border)
        .into_par_iter()
        .flat_map_iter(|y| {
            let scores = &scores;
            (border..width - border).filter_map(move |x| {
                let idx = y as usize * stride + x as usize;
                let score = scores[idx];
                if score <= 0.0 {
                    return None;
                }
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let n = (idx as i64 + dy * stride as i64 + dx) as usize;
                        let other = scores[n];
                        // Ties go to the earlier pixel in raster order.
                        if other > score || (other == score && n < idx) {
                            return None;
                        }
                    }
                }
                Some(Keypoint {
                    x: x as f32,
                    y: y as f32,
                    response: score,
                    angle: 0.0,
                })
            })
        })
        .collect();

    corners.shrink_to_fit();
    corners
}

/// FAST score: sum of absolute differences beyond the threshold over the
/// circle, or zero if the pixel is not a corner.
#[inline]
fn corner_score(pixels: &[u8], stride: usize, x: i32, y: i32, threshold: u8) -> f32 {
    let at = |dx: i32, dy: i32| pixels[(y + dy) as usize * stride + (x + dx) as usize];
    let center = at(0, 0);
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);

    // Quick rejection on the four cardinal points.
    let cardinal = [at(0, -3), at(3, 0), at(0, 3), at(-3, 0)];
    let bright_count = cardinal.iter().filter(|&&p| p > bright).count();
    let dark_count = cardinal.iter().filter(|&&p| p < dark).count();
    if bright_count < 2 && dark_count < 2 {
        return 0.0;
    }

    let ring: [u8; 16] = std::array::from_fn(|i| at(CIRCLE[i].0, CIRCLE[i].1));

    let (mut run_bright, mut run_dark) = (0usize, 0usize);
    let (mut best_bright, mut best_dark) = (0usize, 0usize);
    for i in 0..ring.len() * 2 {
        let p = ring[i % ring.len()];
        if p > bright {
            run_bright += 1;
            run_dark = 0;
            best_bright = best_bright.max(run_bright);
        } else if p < dark {
            run_dark += 1;
            run_bright = 0;
            best_dark = best_dark.max(run_dark);
        } else {
            run_bright = 0;
            run_dark = 0;
        }
    }
    if best_bright < ARC_LENGTH && best_dark < ARC_LENGTH {
        return 0.0;
    }

    let c = center as i32;
    let t = threshold as i32;
    ring.iter()
        .map(|&p| {
            let d = (p as i32 - c).abs() - t;
            d.max(0) as f32
        })
        .sum::<f32>()
        .max(f32::MIN_POSITIVE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_flat_image_has_no_corners() {
        let img = GrayImage::from_pixel(64, 64, Luma([128]));
        assert!(detect(&img, 20, 8).is_empty());
    }

    #[test]
    fn test_bright_square_corner_detected() {
        // Bright square on dark background: its four corners are FAST corners
        let img = GrayImage::from_fn(64, 64, |x, y| {
            if (20..44).contains(&x) && (20..44).contains(&y) {
                Luma([220])
            } else {
                Luma([30])
            }
        });
        let corners = detect(&img, 20, 8);
        assert!(!corners.is_empty());
        let near = |cx: f32, cy: f32| {
            corners
                .iter()
                .any(|k| (k.x - cx).abs() <= 2.0 && (k.y - cy).abs() <= 2.0)
        };
        assert!(near(20.0, 20.0));
        assert!(near(43.0, 43.0));
        // Straight edges are not corners
        assert!(!near(32.0, 20.0));
    }

    #[test]
    fn test_border_respected() {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 37 + y * 91) % 256) as u8]));
        for k in detect(&img, 10, 12) {
            assert!(k.x >= 12.0 && k.x < 52.0);
            assert!(k.y >= 12.0 && k.y < 52.0);
        }
    }

    #[test]
    fn test_too_small_image() {
        let img = GrayImage::new(10, 10);
        assert!(detect(&img, 20, 8).is_empty());
    }

    #[test]
    fn test_detection_is_crop_invariant() {
        let img = GrayImage::from_fn(96, 96, |x, y| {
            let v = (x * 7919 + y * 104_729) ^ (x * y);
            Luma([(v % 251) as u8])
        });
        let full = detect(&img, 25, 10);
        let sub = image::imageops::crop_imm(&img, 16, 16, 64, 64).to_image();
        let cropped = detect(&sub, 25, 10);

        // Every corner found well inside the crop exists in the full image.
        for k in cropped
            .iter()
            .filter(|k| k.x >= 12.0 && k.y >= 12.0 && k.x < 52.0 && k.y < 52.0)
        {
            assert!(full
                .iter()
                .any(|f| f.x == k.x + 16.0 && f.y == k.y + 16.0 && f.response == k.response));
        }
    }
}
