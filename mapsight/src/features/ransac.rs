//! RANSAC estimation of a scale + translation model.
//!
//! The model maps frame coordinates to map coordinates:
//!
//! ```text
//!   map = scale · frame + (tx, ty)
//! ```
//!
//! Two correspondences fix a hypothesis (the ratio of their spreads gives the
//! scale). The best hypothesis is refined by least squares over its inliers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default number of hypotheses.
pub const DEFAULT_RANSAC_ITERATIONS: usize = 200;

/// Default inlier distance in map pixels.
pub const DEFAULT_INLIER_THRESHOLD: f64 = 5.0;

/// RANSAC parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacConfig {
    /// Hypotheses to evaluate (default: 200).
    pub iterations: usize,

    /// Reprojection distance below which a pair is an inlier, in map pixels
    /// (default: 5.0).
    pub inlier_threshold: f64,

    /// Hypotheses with a scale outside `[min_scale, max_scale]` are skipped
    /// (default: 0.2 to 5.0).
    pub min_scale: f64,
    pub max_scale: f64,

    /// Seed for hypothesis sampling; fixed so results are reproducible
    /// (default: 0x5EED).
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_RANSAC_ITERATIONS,
            inlier_threshold: DEFAULT_INLIER_THRESHOLD,
            min_scale: 0.2,
            max_scale: 5.0,
            seed: 0x5EED,
        }
    }
}

/// Scale + translation model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTranslation {
    pub scale: f64,
    pub tx: f64,
    pub ty: f64,
}

impl ScaleTranslation {
    /// Map a frame point into map space.
    #[inline]
    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (self.scale * x + self.tx, self.scale * y + self.ty)
    }

    fn error(&self, src: (f64, f64), dst: (f64, f64)) -> f64 {
        let (px, py) = self.apply(src);
        (px - dst.0).hypot(py - dst.1)
    }
}

/// Outcome of a successful fit.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacFit {
    pub model: ScaleTranslation,
    /// Indices of inlier pairs, ascending.
    pub inliers: Vec<usize>,
}

/// Fit `dst ≈ scale · src + t` robustly.
///
/// Returns `None` with fewer than two pairs or when no hypothesis produced
/// at least two inliers.
pub fn fit_scale_translation(
    pairs: &[((f64, f64), (f64, f64))],
    config: &RansacConfig,
) -> Option<RansacFit> {
    if pairs.len() < 2 {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(ScaleTranslation, usize)> = None;

    for _ in 0..config.iterations.max(1) {
        let i = rng.random_range(0..pairs.len());
        let mut j = rng.random_range(0..pairs.len() - 1);
        if j >= i {
            j += 1;
        }
        let Some(model) = hypothesis(pairs[i], pairs[j], config) else {
            continue;
        };
        let count = pairs
            .iter()
            .filter(|(s, d)| model.error(*s, *d) <= config.inlier_threshold)
            .count();
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((model, count));
            if count == pairs.len() {
                break;
            }
        }
    }

    let (model, count) = best?;
    if count < 2 {
        return None;
    }

    let inliers = inlier_indices(pairs, &model, config.inlier_threshold);
    let refined = least_squares(pairs, &inliers)
        .filter(|m| m.scale >= config.min_scale && m.scale <= config.max_scale);

    // Keep the refinement only if it does not lose support.
    if let Some(refined) = refined {
        let refined_inliers = inlier_indices(pairs, &refined, config.inlier_threshold);
        if refined_inliers.len() >= inliers.len() {
            return Some(RansacFit {
                model: refined,
                inliers: refined_inliers,
            });
        }
    }
    Some(RansacFit { model, inliers })
}

fn hypothesis(
    a: ((f64, f64), (f64, f64)),
    b: ((f64, f64), (f64, f64)),
    config: &RansacConfig,
) -> Option<ScaleTranslation> {
    let src_spread = (a.0 .0 - b.0 .0).hypot(a.0 .1 - b.0 .1);
    if src_spread < 1.0 {
        return None;
    }
    let dst_spread = (a.1 .0 - b.1 .0).hypot(a.1 .1 - b.1 .1);
    let scale = dst_spread / src_spread;
    if scale < config.min_scale || scale > config.max_scale {
        return None;
    }
    let src_mid = ((a.0 .0 + b.0 .0) / 2.0, (a.0 .1 + b.0 .1) / 2.0);
    let dst_mid = ((a.1 .0 + b.1 .0) / 2.0, (a.1 .1 + b.1 .1) / 2.0);
    Some(ScaleTranslation {
        scale,
        tx: dst_mid.0 - scale * src_mid.0,
        ty: dst_mid.1 - scale * src_mid.1,
    })
}

fn inlier_indices(
    pairs: &[((f64, f64), (f64, f64))],
    model: &ScaleTranslation,
    threshold: f64,
) -> Vec<usize> {
    pairs
        .iter()
        .enumerate()
        .filter(|(_, (s, d))| model.error(*s, *d) <= threshold)
        .map(|(i, _)| i)
        .collect()
}

fn least_squares(pairs: &[((f64, f64), (f64, f64))], indices: &[usize]) -> Option<ScaleTranslation> {
    if indices.len() < 2 {
        return None;
    }
    let n = indices.len() as f64;
    let (mut sx, mut sy, mut dx, mut dy) = (0.0, 0.0, 0.0, 0.0);
    for &i in indices {
        let (s, d) = pairs[i];
        sx += s.0;
        sy += s.1;
        dx += d.0;
        dy += d.1;
    }
    let (sx, sy, dx, dy) = (sx / n, sy / n, dx / n, dy / n);

    let mut num = 0.0;
    let mut den = 0.0;
    for &i in indices {
        let (s, d) = pairs[i];
        let (cs, cd) = ((s.0 - sx, s.1 - sy), (d.0 - dx, d.1 - dy));
        num += cs.0 * cd.0 + cs.1 * cd.1;
        den += cs.0 * cs.0 + cs.1 * cs.1;
    }
    if den < 1e-9 {
        return None;
    }
    let scale = num / den;
    Some(ScaleTranslation {
        scale,
        tx: dx - scale * sx,
        ty: dy - scale * sy,
    })
}
