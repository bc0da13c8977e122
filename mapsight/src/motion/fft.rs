//! Two-dimensional FFT on row-major complex buffers.
//!
//! Built from `rustfft` one-dimensional plans: rows first, then columns via a
//! transpose. Plans are cached per image size since the tracker sees the
//! same frame size tick after tick.

use std::collections::HashMap;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

#[derive(Clone)]
struct Plans {
    row_forward: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

/// Cached 2-D FFT planner.
pub(crate) struct Fft2d {
    planner: FftPlanner<f64>,
    plans: HashMap<(usize, usize), Plans>,
    scratch: Vec<Complex<f64>>,
}

impl std::fmt::Debug for Fft2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2d")
            .field("cached_sizes", &self.plans.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Fft2d {
    pub(crate) fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            plans: HashMap::new(),
            scratch: Vec::new(),
        }
    }

    fn plans(&mut self, width: usize, height: usize) -> Plans {
        let planner = &mut self.planner;
        self.plans
            .entry((width, height))
            .or_insert_with(|| Plans {
                row_forward: planner.plan_fft_forward(width),
                col_forward: planner.plan_fft_forward(height),
                row_inverse: planner.plan_fft_inverse(width),
                col_inverse: planner.plan_fft_inverse(height),
            })
            .clone()
    }

    /// In-place forward transform of a `width × height` row-major buffer.
    pub(crate) fn forward(&mut self, data: &mut [Complex<f64>], width: usize, height: usize) {
        let plans = self.plans(width, height);
        self.transform(data, width, height, &plans.row_forward, &plans.col_forward);
    }

    /// In-place inverse transform, unnormalised (divide by `width × height`).
    pub(crate) fn inverse(&mut self, data: &mut [Complex<f64>], width: usize, height: usize) {
        let plans = self.plans(width, height);
        self.transform(data, width, height, &plans.row_inverse, &plans.col_inverse);
    }

    fn transform(
        &mut self,
        data: &mut [Complex<f64>],
        width: usize,
        height: usize,
        row: &Arc<dyn Fft<f64>>,
        col: &Arc<dyn Fft<f64>>,
    ) {
        debug_assert_eq!(data.len(), width * height);

        // Every row is contiguous; one call processes all of them.
        row.process(data);

        self.scratch.clear();
        self.scratch.resize(width * height, Complex::new(0.0, 0.0));
        for y in 0..height {
            for x in 0..width {
                self.scratch[x * height + y] = data[y * width + x];
            }
        }
        col.process(&mut self.scratch);
        for x in 0..width {
            for y in 0..height {
                data[y * width + x] = self.scratch[x * height + y];
            }
        }
    }
}
