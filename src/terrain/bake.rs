use std::collections::HashMap;
use std::sync::Arc;

use cgmath::Vector2;
use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use super::classify::{Classification, Quantization};
use super::heightfield::{TerrainLayer, LAYERS_PER_GROUP};
use crate::error::{Result, TfragError};
use crate::texture_pipeline::noise::NoiseTexture;
use crate::texture_pipeline::resizer;

/// Edge length of the texture used when a terrain has no layers.
pub const PLACEHOLDER_SIZE: u32 = 32;
const PLACEHOLDER_COLOR: Rgba<u8> = Rgba([0x80, 0x80, 0x80, 0xFF]);
/// Noise displacement of the splat lookup, in cells.
const DITHER: f32 = 0.35;
/// Displacement of the splat lookup along the curvature centre, in cells.
const CURVATURE_BIAS: f32 = 0.25;

/// A baked face texture. Shared between faces with the same classification.
#[derive(Debug)]
pub struct BakedTexture {
    pub name: String,
    pub image: RgbaImage,
}

#[derive(Debug, Clone)]
pub struct BakeOptions {
    /// Output edge length in pixels.
    pub size: u32,
    pub quantization: Quantization,
    /// Used for every face instead of baking.
    pub texture_override: Option<Arc<RgbaImage>>,
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self {
            size: 64,
            quantization: Quantization::default(),
            texture_override: None,
        }
    }
}

struct LayerPixels {
    diffuse: Option<RgbaImage>,
    tint: [f32; 4],
}

impl LayerPixels {
    fn color(&self, x: u32, y: u32) -> [f32; 4] {
        let base = match &self.diffuse {
            Some(img) => img.get_pixel(x, y).0.map(|c| c as f32 / 255.0),
            None => [1.0; 4],
        };
        let t = self.tint[3];
        [
            base[0] + (self.tint[0] - base[0]) * t,
            base[1] + (self.tint[1] - base[1]) * t,
            base[2] + (self.tint[2] - base[2]) * t,
            base[3],
        ]
    }
}

/// Composites up to four layers through classification masks, memoised by
/// classification. Bakes are pure functions of the key, so a hit returns the
/// previously baked handle.
pub struct TextureBaker {
    options: BakeOptions,
    layers: Vec<LayerPixels>,
    noise: NoiseTexture,
    cache: HashMap<Classification, Arc<BakedTexture>>,
    fixed: Option<Arc<BakedTexture>>,
}

impl TextureBaker {
    /// Only the first layer group (four layers) is baked.
    pub fn new(layers: &[TerrainLayer], options: BakeOptions) -> Self {
        let size = options.size;
        let fixed = if let Some(img) = &options.texture_override {
            Some(Arc::new(BakedTexture {
                name: "override".into(),
                image: resizer::fit_square(img, size),
            }))
        } else if layers.is_empty() {
            warn!("terrain has no layers, using a {PLACEHOLDER_SIZE}x{PLACEHOLDER_SIZE} placeholder texture");
            Some(Arc::new(BakedTexture {
                name: "placeholder".into(),
                image: RgbaImage::from_pixel(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, PLACEHOLDER_COLOR),
            }))
        } else {
            None
        };

        let layers = layers
            .iter()
            .take(LAYERS_PER_GROUP)
            .map(|layer| LayerPixels {
                diffuse: layer.diffuse.as_deref().map(|img| resizer::fit_square(img, size)),
                tint: layer.tint,
            })
            .collect();

        Self {
            options,
            layers,
            noise: NoiseTexture::generate(),
            cache: HashMap::new(),
            fixed,
        }
    }

    /// Number of distinct baked textures held in the cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn bake(&mut self, classification: &Classification) -> Result<Arc<BakedTexture>> {
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }
        let side = self.options.quantization.side();
        if classification.side() != side {
            return Err(TfragError::InvalidSettings(format!(
                "classification side {} does not match quantization side {}",
                classification.side(),
                side
            )));
        }
        if let Some(hit) = self.cache.get(classification) {
            return Ok(hit.clone());
        }

        let baked = Arc::new(BakedTexture {
            name: classification.to_string(),
            image: self.composite(classification),
        });
        debug!("baked texture {} ({} cached)", baked.name, self.cache.len() + 1);
        self.cache.insert(classification.clone(), baked.clone());
        Ok(baked)
    }

    fn composite(&self, classification: &Classification) -> RgbaImage {
        let size = self.options.size;
        let q = self.options.quantization;
        let resolution = q.resolution as f32;
        let buffer = q.buffer as f32;
        let curvature = curvature_center(classification);
        let mut out = RgbaImage::new(size, size);

        for (px, py, pixel) in out.enumerate_pixels_mut() {
            let u = (px as f32 + 0.5) / size as f32;
            // image rows run top-down, classification rows run along +v
            let v = 1.0 - (py as f32 + 0.5) / size as f32;
            let nx = self.noise.sample(u, v) - 0.5;
            let ny = self.noise.sample(u + 0.5, v + 0.5) - 0.5;

            let cx = buffer + u * resolution + nx * DITHER + curvature.x * CURVATURE_BIAS;
            let cy = buffer + v * resolution + ny * DITHER + curvature.y * CURVATURE_BIAS;
            let weights = splat_weights(classification, cx, cy);

            let mut color = [0f32; 4];
            let mut total = 0.0;
            for (class, &w) in weights.iter().enumerate() {
                if w <= 0.0 {
                    continue;
                }
                let layer = self
                    .layers
                    .get(class)
                    .map(|l| l.color(px, py))
                    .unwrap_or([1.0; 4]);
                for (c, l) in color.iter_mut().zip(layer) {
                    *c += l * w;
                }
                total += w;
            }
            if total > 0.0 {
                color = color.map(|c| c / total);
            }
            *pixel = Rgba(color.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8));
        }

        out
    }
}

/// Sign of the summed offsets of every cell agreeing with the centre cell,
/// halved. Zero on an axis where agreement is balanced.
pub fn curvature_center(classification: &Classification) -> Vector2<f32> {
    let n = classification.side();
    let half = (n / 2) as f32;
    let scale = (n - 1).max(1) as f32;
    let c0 = classification.center();
    let mut sum = Vector2::new(0.0f32, 0.0);
    for (i, &c) in classification.cells().iter().enumerate() {
        if c == c0 {
            sum.x += ((i % n) as f32 - half) / scale;
            sum.y += ((i / n) as f32 - half) / scale;
        }
    }
    let sign = |v: f32| {
        if v < 0.0 {
            -1.0
        } else if v == 0.0 {
            0.0
        } else {
            1.0
        }
    };
    Vector2::new(sign(sum.x), sign(sum.y)) * 0.5
}

/// Bilinear one-hot lookup at cell coordinates (cell `i` spans `[i, i+1)`).
fn splat_weights(classification: &Classification, cx: f32, cy: f32) -> [f32; 4] {
    let n = classification.side() as i64;
    let fx = cx - 0.5;
    let fy = cy - 0.5;
    let (x0, y0) = (fx.floor(), fy.floor());
    let (tx, ty) = (fx - x0, fy - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let class = |x: i64, y: i64| classification.get(x.clamp(0, n - 1) as usize, y.clamp(0, n - 1) as usize) as usize;

    let mut weights = [0f32; 4];
    for (x, y, w) in [
        (x0, y0, (1.0 - tx) * (1.0 - ty)),
        (x0 + 1, y0, tx * (1.0 - ty)),
        (x0, y0 + 1, (1.0 - tx) * ty),
        (x0 + 1, y0 + 1, tx * ty),
    ] {
        if let Some(slot) = weights.get_mut(class(x, y)) {
            *slot += w;
        }
    }
    weights
}
