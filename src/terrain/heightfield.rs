use std::sync::Arc;

use cgmath::{InnerSpace, Vector3};
use image::{ImageBuffer, Luma, RgbaImage};

use crate::error::{Result, TfragError};

/// Layers blended by one splat group.
pub const LAYERS_PER_GROUP: usize = 4;

/// A diffuse texture with the colour it is tinted towards (`tint.a` is the strength).
#[derive(Debug, Clone)]
pub struct TerrainLayer {
    pub diffuse: Option<Arc<RgbaImage>>,
    pub tint: [f32; 4],
}

impl Default for TerrainLayer {
    fn default() -> Self {
        Self {
            diffuse: None,
            tint: [1.0, 1.0, 1.0, 0.0],
        }
    }
}

/// Read-only view of a terrain. All coordinates are normalised `(u, v)` in
/// `[0, 1]`, `u` along world X and `v` along world Z.
pub trait HeightfieldSource {
    /// World extent: width (X), height scale (Y), length (Z).
    fn size(&self) -> Vector3<f32>;

    /// Interpolated world height.
    fn height(&self, u: f32, v: f32) -> Result<f32>;

    /// Interpolated unit normal, Y up.
    fn normal(&self, u: f32, v: f32) -> Result<Vector3<f32>>;

    fn layer_group_count(&self) -> usize;

    /// Weights of the four layers in `group`. Missing groups weigh nothing.
    fn blend_weights(&self, u: f32, v: f32, group: usize) -> Result<[f32; 4]>;

    fn layers(&self) -> &[TerrainLayer];

    fn layer(&self, group: usize, index: usize) -> Option<&TerrainLayer> {
        self.layers().get(group * LAYERS_PER_GROUP + index)
    }
}

// ============================================================================
// Grid heightfield
// ============================================================================

/// RGBA blend weights on a regular grid, sampled with texel centres at
/// `(i + 0.5) / res` and clamped at the border.
#[derive(Debug, Clone)]
pub struct SplatGrid {
    width: usize,
    height: usize,
    weights: Vec<[f32; 4]>,
}

impl SplatGrid {
    pub fn new(width: usize, height: usize, weights: Vec<[f32; 4]>) -> Result<Self> {
        if width == 0 || height == 0 || weights.len() != width * height {
            return Err(TfragError::InvalidSettings(format!(
                "splat grid {}x{} needs {} weights, got {}",
                width,
                height,
                width * height,
                weights.len()
            )));
        }
        Ok(Self { width, height, weights })
    }

    /// Same weights everywhere.
    pub fn uniform(weights: [f32; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            weights: vec![weights],
        }
    }

    /// Row 0 of the image is `v = 0`.
    pub fn from_image(img: &RgbaImage) -> Result<Self> {
        let weights = img.pixels().map(|p| p.0.map(|c| c as f32 / 255.0)).collect();
        Self::new(img.width() as usize, img.height() as usize, weights)
    }

    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.weights[y * self.width + x]
    }

    pub fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let fx = u * self.width as f32 - 0.5;
        let fy = v * self.height as f32 - 0.5;
        let (x0, y0) = (fx.floor(), fy.floor());
        let (tx, ty) = (fx - x0, fy - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let a = self.texel(x0, y0);
        let b = self.texel(x0 + 1, y0);
        let c = self.texel(x0, y0 + 1);
        let d = self.texel(x0 + 1, y0 + 1);
        std::array::from_fn(|i| {
            let top = a[i] + (b[i] - a[i]) * tx;
            let bottom = c[i] + (d[i] - c[i]) * tx;
            top + (bottom - top) * ty
        })
    }
}

/// Heights on a `columns × rows` vertex grid spanning the terrain, plus one
/// splat grid per layer group.
#[derive(Debug, Clone)]
pub struct GridHeightfield {
    size: Vector3<f32>,
    columns: usize,
    rows: usize,
    heights: Vec<f32>,
    splats: Vec<SplatGrid>,
    layers: Vec<TerrainLayer>,
}

impl GridHeightfield {
    /// `heights` are world units, row-major with row 0 at `v = 0`.
    pub fn new(size: Vector3<f32>, columns: usize, rows: usize, heights: Vec<f32>) -> Result<Self> {
        if columns < 2 || rows < 2 {
            return Err(TfragError::InvalidSettings(format!(
                "height grid must be at least 2x2, got {columns}x{rows}"
            )));
        }
        if heights.len() != columns * rows {
            return Err(TfragError::InvalidSettings(format!(
                "height grid {}x{} needs {} samples, got {}",
                columns,
                rows,
                columns * rows,
                heights.len()
            )));
        }
        if !(size.x > 0.0 && size.z > 0.0) {
            return Err(TfragError::InvalidSettings(format!(
                "terrain size must be positive, got {:?}",
                size
            )));
        }
        Ok(Self {
            size,
            columns,
            rows,
            heights,
            splats: Vec::new(),
            layers: Vec::new(),
        })
    }

    pub fn flat(size: Vector3<f32>, height: f32) -> Result<Self> {
        Self::new(size, 2, 2, vec![height; 4])
    }

    /// Normalised heightmap scaled by `size.y`.
    pub fn from_heightmap(size: Vector3<f32>, heightmap: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Result<Self> {
        let heights = heightmap
            .pixels()
            .map(|p| p.0[0] as f32 / u16::MAX as f32 * size.y)
            .collect();
        Self::new(size, heightmap.width() as usize, heightmap.height() as usize, heights)
    }

    pub fn with_splat(mut self, splat: SplatGrid) -> Self {
        self.splats.push(splat);
        self
    }

    pub fn with_layers(mut self, layers: Vec<TerrainLayer>) -> Self {
        self.layers = layers;
        self
    }

    fn vertex(&self, x: usize, y: usize) -> f32 {
        self.heights[y * self.columns + x]
    }

    fn interpolate(&self, u: f32, v: f32) -> f32 {
        let fx = u.clamp(0.0, 1.0) * (self.columns - 1) as f32;
        let fy = v.clamp(0.0, 1.0) * (self.rows - 1) as f32;
        let x0 = (fx.floor() as usize).min(self.columns - 2);
        let y0 = (fy.floor() as usize).min(self.rows - 2);
        let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);

        let top = self.vertex(x0, y0) + (self.vertex(x0 + 1, y0) - self.vertex(x0, y0)) * tx;
        let bottom = self.vertex(x0, y0 + 1) + (self.vertex(x0 + 1, y0 + 1) - self.vertex(x0, y0 + 1)) * tx;
        top + (bottom - top) * ty
    }
}

impl HeightfieldSource for GridHeightfield {
    fn size(&self) -> Vector3<f32> {
        self.size
    }

    fn height(&self, u: f32, v: f32) -> Result<f32> {
        let h = self.interpolate(u, v);
        if !h.is_finite() {
            return Err(TfragError::SampleProvider(format!("height at ({u}, {v}) is {h}")));
        }
        Ok(h)
    }

    fn normal(&self, u: f32, v: f32) -> Result<Vector3<f32>> {
        let du = 1.0 / (self.columns - 1) as f32;
        let dv = 1.0 / (self.rows - 1) as f32;
        let (u0, u1) = ((u - du).max(0.0), (u + du).min(1.0));
        let (v0, v1) = ((v - dv).max(0.0), (v + dv).min(1.0));

        let dx = (self.height(u1, v)? - self.height(u0, v)?) / ((u1 - u0) * self.size.x);
        let dz = (self.height(u, v1)? - self.height(u, v0)?) / ((v1 - v0) * self.size.z);
        Ok(Vector3::new(-dx, 1.0, -dz).normalize())
    }

    fn layer_group_count(&self) -> usize {
        self.splats.len()
    }

    fn blend_weights(&self, u: f32, v: f32, group: usize) -> Result<[f32; 4]> {
        let Some(splat) = self.splats.get(group) else {
            return Ok([0.0; 4]);
        };
        let weights = splat.sample(u, v);
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(TfragError::SampleProvider(format!(
                "blend weights at ({u}, {v}) group {group} are {weights:?}"
            )));
        }
        Ok(weights)
    }

    fn layers(&self) -> &[TerrainLayer] {
        &self.layers
    }
}
