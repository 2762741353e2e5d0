//! Tileable low-frequency value noise used to dither splat boundaries.

/// Edge length of the generated noise texture.
pub const NOISE_SIZE: u32 = 64;
/// Lattice cells per edge; one lattice cell spans `NOISE_SIZE / NOISE_CELLS` texels.
const NOISE_CELLS: u32 = 8;
const NOISE_SEED: u32 = 0x5EED_7F4A;

/// Single channel noise in `[0, 1]`, sampled with wrapping.
#[derive(Debug, Clone)]
pub struct NoiseTexture {
    size: u32,
    values: Vec<f32>,
}

impl NoiseTexture {
    /// The baker's deterministic noise texture.
    pub fn generate() -> Self {
        Self::with_seed(NOISE_SEED)
    }

    pub fn with_seed(seed: u32) -> Self {
        let size = NOISE_SIZE;
        let cell = (size / NOISE_CELLS) as f32;
        let mut values = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                let fx = x as f32 / cell;
                let fy = y as f32 / cell;
                let (x0, y0) = (fx.floor() as u32, fy.floor() as u32);
                let (tx, ty) = (smoothstep(fx.fract()), smoothstep(fy.fract()));
                let lattice = |lx: u32, ly: u32| lattice_value(seed, lx % NOISE_CELLS, ly % NOISE_CELLS);
                let top = lerp(lattice(x0, y0), lattice(x0 + 1, y0), tx);
                let bottom = lerp(lattice(x0, y0 + 1), lattice(x0 + 1, y0 + 1), tx);
                values.push(lerp(top, bottom, ty));
            }
        }
        Self { size, values }
    }

    /// Nearest texel at `(u, v)`, wrapping outside `[0, 1)`.
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        let s = self.size as f32;
        let x = ((u * s).floor() as i64).rem_euclid(self.size as i64) as usize;
        let y = ((v * s).floor() as i64).rem_euclid(self.size as i64) as usize;
        self.values[y * self.size as usize + x]
    }
}

fn lattice_value(seed: u32, x: u32, y: u32) -> f32 {
    let mut h = seed ^ x.wrapping_mul(0x27D4_EB2D) ^ y.wrapping_mul(0x1656_67B1);
    h ^= h >> 15;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^= h >> 16;
    (h & 0xFFFF) as f32 / 65535.0
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
