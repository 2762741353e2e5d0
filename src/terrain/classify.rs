//! Splat classification: reduces a blend map to one dominant layer per cell.
//!
//! Every face is classified on a `side × side` window, `side = R + 2B`,
//! where `R` cells cover the face and `B` buffer cells on each side sample
//! the neighbouring faces so that blocks can be smoothed across face seams.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::heightfield::HeightfieldSource;
use crate::error::{Result, TfragError};

/// Sub-samples per kernel axis.
const KERNEL_TAPS: usize = 9;
/// Kernel sub-sample spacing, in cells.
const KERNEL_SPACING: f32 = 1.0 / 5.0;

/// Cells per face (`resolution`) and buffer cells on each side (`buffer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Quantization {
    pub resolution: usize,
    pub buffer: usize,
}

impl Default for Quantization {
    fn default() -> Self {
        Self {
            resolution: 1,
            buffer: 1,
        }
    }
}

impl Quantization {
    pub fn side(&self) -> usize {
        self.resolution + 2 * self.buffer
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 {
            return Err(TfragError::InvalidSettings("quantization resolution must be at least 1".into()));
        }
        Ok(())
    }
}

/// Normalised rectangle of terrain a classification window is laid over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A square grid of class ids, row-major. Used directly as the bake cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Classification {
    side: usize,
    cells: Vec<u8>,
}

impl Classification {
    pub fn new(side: usize, cells: Vec<u8>) -> Result<Self> {
        if cells.len() != side * side {
            return Err(TfragError::InvalidSettings(format!(
                "classification of side {} needs {} cells, got {}",
                side,
                side * side,
                cells.len()
            )));
        }
        Ok(Self { side, cells })
    }

    pub fn uniform(side: usize, class: u8) -> Self {
        Self {
            side,
            cells: vec![class; side * side],
        }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[y * self.side + x]
    }

    /// The middle cell.
    pub fn center(&self) -> u8 {
        self.cells[self.cells.len() / 2]
    }

    pub fn is_uniform(&self) -> bool {
        self.cells.iter().all(|&c| c == self.cells[0])
    }

    /// Ordered edge/corner reduction, in place, repeated until stable.
    ///
    /// Border cells are visited in row-major order. An edge cell takes the
    /// class of its inward neighbour (towards the buffer boundary) when that
    /// class is lower. A corner cell then looks at its vertical and horizontal
    /// inward neighbours and, if they differ, takes the vertical one when it
    /// is lower, else the horizontal one when that is lower. Cells only ever
    /// decrease, so the repetition terminates. Uniform windows are left alone.
    pub fn smooth(&mut self, buffer: usize) {
        while self.reduce_pass(buffer) {}
    }

    fn reduce_pass(&mut self, buffer: usize) -> bool {
        if self.is_uniform() {
            return false;
        }

        let n = self.side;
        let last = n - 1;
        let step = |s: usize| -> isize {
            if s < buffer {
                1
            } else if s == buffer {
                0
            } else {
                -1
            }
        };
        let at = |x: usize, y: usize, dx: isize, dy: isize| -> usize {
            (y as isize + dy) as usize * n + (x as isize + dx) as usize
        };
        let mut changed = false;

        for i in 0..self.cells.len() {
            let (sx, sy) = (i % n, i / n);
            let (dx, dy) = (step(sx), step(sy));
            let on_x = sx == 0 || sx == last;
            let on_y = sy == 0 || sy == last;
            let before = self.cells[i];

            if on_x || on_y {
                let neighbour = self.cells[at(sx, sy, dx, dy)];
                if self.cells[i] > neighbour {
                    self.cells[i] = neighbour;
                }
            }

            if on_x && on_y {
                let c0 = self.cells[i];
                let c1 = self.cells[at(sx, sy, 0, dy)];
                let c2 = self.cells[at(sx, sy, dx, 0)];
                if c1 != c2 && c0 > c1 {
                    self.cells[i] = c1;
                } else if c1 != c2 && c0 > c2 {
                    self.cells[i] = c2;
                }
            }

            changed |= self.cells[i] != before;
        }

        changed
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.cells.iter().enumerate() {
            if i > 0 {
                write!(f, "-")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Classify one face window of layer `group`.
///
/// Each cell sums the blend weights of a 9×9 sub-sample kernel around its
/// centre, weighted by `exp(-distance)^ramp` (distance in cells). The first
/// channel strictly heavier than everything before it wins; all-zero cells
/// stay class 0.
pub fn classify(
    source: &dyn HeightfieldSource,
    face: FaceRect,
    group: usize,
    ramp: f32,
    quantization: Quantization,
) -> Result<Classification> {
    quantization.validate()?;
    if !(ramp >= 0.0 && ramp.is_finite()) {
        return Err(TfragError::InvalidSettings(format!("classification ramp must be >= 0, got {ramp}")));
    }

    let n = quantization.side();
    let resolution = quantization.resolution as f32;
    let buffer = quantization.buffer as f32;
    let half = (KERNEL_TAPS / 2) as f32;
    let mut cells = vec![0u8; n * n];

    for y in 0..n {
        for x in 0..n {
            let mut weights = [0f32; 4];
            for j in 0..KERNEL_TAPS {
                for i in 0..KERNEL_TAPS {
                    let x_disp = (i as f32 - half) * KERNEL_SPACING;
                    let y_disp = (j as f32 - half) * KERNEL_SPACING;
                    let x_off = (x_disp + (x as f32 - buffer)) / resolution;
                    let y_off = (y_disp + (y as f32 - buffer)) / resolution;
                    let weight = (-(x_off * x_off + y_off * y_off).sqrt()).exp().powf(ramp);

                    let sample = source.blend_weights(face.x + x_off * face.width, face.y + y_off * face.height, group)?;
                    for (w, s) in weights.iter_mut().zip(sample) {
                        *w += s * weight;
                    }
                }
            }

            if weights.iter().any(|w| !w.is_finite()) {
                return Err(TfragError::SampleProvider(format!(
                    "kernel weights for cell ({x}, {y}) are {weights:?}"
                )));
            }

            let mut max = 0.0;
            for (class, &w) in weights.iter().enumerate() {
                if w > max {
                    cells[y * n + x] = class as u8;
                    max = w;
                }
            }
        }
    }

    Ok(Classification { side: n, cells })
}

// ============================================================================
// Terrain-wide grid
// ============================================================================

/// Classes for the whole terrain, `resolution` cells per vertex along each axis.
#[derive(Debug, Clone)]
pub struct ClassificationGrid {
    quantization: Quantization,
    stride: usize,
    rows: usize,
    cells: Vec<u8>,
}

impl ClassificationGrid {
    pub fn new(vertices_per_row: usize, vertices_per_column: usize, quantization: Quantization) -> Self {
        let stride = quantization.resolution * vertices_per_row;
        let rows = quantization.resolution * vertices_per_column;
        Self {
            quantization,
            stride,
            rows,
            cells: vec![0; stride * rows],
        }
    }

    fn origin(&self, x: usize, y: usize, cx: usize, cy: usize) -> (isize, isize) {
        let r = self.quantization.resolution as isize;
        let b = self.quantization.buffer as isize;
        (cx as isize - b + x as isize * r, cy as isize - b + y as isize * r)
    }

    /// Write a face window centred on grid cell `(x·R, y·R)`. Later windows
    /// overwrite earlier ones.
    ///
    /// Window cell `(cx, cy)` always lands on `(x·R − B + cx, y·R − B + cy)`
    /// and is dropped when that falls outside the grid. A write cursor that
    /// only advanced on cells inside the grid would instead shift the
    /// remaining cells of an edge window onto the wrong grid cells; edge
    /// output therefore differs from that scheme.
    pub fn scatter(&mut self, x: usize, y: usize, window: &Classification) {
        let n = window.side();
        for cy in 0..n {
            for cx in 0..n {
                let (sx, sy) = self.origin(x, y, cx, cy);
                if sx < 0 || sy < 0 || sx as usize >= self.stride || sy as usize >= self.rows {
                    continue;
                }
                self.cells[sy as usize * self.stride + sx as usize] = window.get(cx, cy);
            }
        }
    }

    /// Read the window centred on `(x·R, y·R)` with clamped indices, then smooth it.
    pub fn block(&self, x: usize, y: usize) -> Classification {
        let n = self.quantization.side();
        let mut cells = Vec::with_capacity(n * n);
        for cy in 0..n {
            for cx in 0..n {
                let (sx, sy) = self.origin(x, y, cx, cy);
                let sx = sx.clamp(0, self.stride as isize - 1) as usize;
                let sy = sy.clamp(0, self.rows as isize - 1) as usize;
                cells.push(self.cells[sy * self.stride + sx]);
            }
        }
        let mut block = Classification { side: n, cells };
        block.smooth(self.quantization.buffer);
        block
    }
}
