//! Uniform grid over feature positions for region queries.

use super::Feature;

/// Default grid cell side in pixels.
pub const DEFAULT_CELL_SIZE: f32 = 128.0;

/// Axis-aligned region in image pixels, `[x0, x1) × [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Region {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Region of `width × height` centred on `(cx, cy)`.
    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, cx + width / 2.0, cy + height / 2.0)
    }

    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Features bucketed into a fixed grid.
///
/// Construction is `O(n)`; a region query touches only the cells it
/// overlaps and returns indices in ascending order.
#[derive(Debug)]
pub struct FeatureIndex {
    features: Vec<Feature>,
    cell_size: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<usize>>,
}

impl FeatureIndex {
    /// Index `features` found in an image of `width × height` pixels.
    pub fn new(features: Vec<Feature>, width: u32, height: u32, cell_size: f32) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { DEFAULT_CELL_SIZE };
        let cols = ((width as f32 / cell_size).ceil() as usize).max(1);
        let rows = ((height as f32 / cell_size).ceil() as usize).max(1);
        let mut cells = vec![Vec::new(); cols * rows];
        for (i, f) in features.iter().enumerate() {
            let c = ((f.keypoint.x / cell_size) as usize).min(cols - 1);
            let r = ((f.keypoint.y / cell_size) as usize).min(rows - 1);
            cells[r * cols + c].push(i);
        }
        Self {
            features,
            cell_size,
            cols,
            rows,
            cells,
        }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Every feature index.
    pub fn all(&self) -> Vec<usize> {
        (0..self.features.len()).collect()
    }

    /// Indices of features inside `region`.
    pub fn query(&self, region: &Region) -> Vec<usize> {
        if region.x1 <= region.x0 || region.y1 <= region.y0 {
            return Vec::new();
        }
        let cell = |v: f32, max: usize| ((v / self.cell_size).floor().max(0.0) as usize).min(max - 1);
        let (c0, c1) = (cell(region.x0, self.cols), cell(region.x1, self.cols));
        let (r0, r1) = (cell(region.y0, self.rows), cell(region.y1, self.rows));

        let mut hits: Vec<usize> = (r0..=r1)
            .flat_map(|r| (c0..=c1).map(move |c| r * self.cols + c))
            .flat_map(|cell| self.cells[cell].iter().copied())
            .filter(|&i| {
                let k = &self.features[i].keypoint;
                region.contains(k.x, k.y)
            })
            .collect();
        hits.sort_unstable();
        hits
    }
}
