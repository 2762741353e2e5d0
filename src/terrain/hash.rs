//! Content hash gating reconversion.
//!
//! The hash samples the terrain on a coarse grid rather than at full
//! resolution, so edits that fall between sample points do not invalidate it.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use super::config::{ConversionSettings, MaterialOverrides};
use super::heightfield::HeightfieldSource;
use crate::error::Result;

/// Samples per axis of the hash grid.
pub const HASH_SAMPLE_RESOLUTION: usize = 10;

/// 128-bit content hash, shown and serialised as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash128(pub [u8; 16]);

impl fmt::Display for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl From<Hash128> for String {
    fn from(hash: Hash128) -> Self {
        hash.to_string()
    }
}

impl TryFrom<String> for Hash128 {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 32 || !s.is_ascii() {
            return Err(format!("expected 32 hex digits, got `{s}`"));
        }
        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).map_err(|e| format!("bad hex in `{s}`: {e}"))?;
        }
        Ok(Hash128(out))
    }
}

/// Incremental hash input, appended field by field.
#[derive(Default)]
pub struct ContentHasher {
    md5: Md5,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.md5.update(bytes);
    }

    pub fn append_f32(&mut self, value: f32) {
        self.append_bytes(&value.to_le_bytes());
    }

    pub fn append_str(&mut self, value: &str) {
        self.append_bytes(&(value.len() as u64).to_le_bytes());
        self.append_bytes(value.as_bytes());
    }

    pub fn finish(self) -> Hash128 {
        let digest = self.md5.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest);
        Hash128(out)
    }
}

/// Hash of an image's dimensions and pixels.
pub fn image_content_hash(img: &image::RgbaImage) -> Hash128 {
    let mut hasher = ContentHasher::new();
    hasher.append_bytes(&img.width().to_le_bytes());
    hasher.append_bytes(&img.height().to_le_bytes());
    hasher.append_bytes(img.as_raw());
    hasher.finish()
}

/// Hash a terrain together with everything that changes its packed output.
///
/// Folds blend weights at every sample of a 10×10 grid, the sum of the
/// sampled heights, each layer's diffuse content hash, the material
/// overrides (the override image by content) and the conversion settings.
pub fn compute_hash(
    source: &dyn HeightfieldSource,
    overrides: &MaterialOverrides,
    settings: &ConversionSettings,
) -> Result<Hash128> {
    let texture_override = overrides.load_texture_override()?;
    compute_hash_with_override(source, overrides, texture_override.as_deref(), settings)
}

/// [`compute_hash`] with the override image already decoded.
pub fn compute_hash_with_override(
    source: &dyn HeightfieldSource,
    overrides: &MaterialOverrides,
    texture_override: Option<&image::RgbaImage>,
    settings: &ConversionSettings,
) -> Result<Hash128> {
    let mut hasher = ContentHasher::new();
    let n = HASH_SAMPLE_RESOLUTION;
    let step = 1.0 / (n - 1) as f32;

    let mut sum = 0f32;
    for i in 0..n * n {
        let u = (i % n) as f32 * step;
        let v = (i / n) as f32 * step;
        sum += source.height(u, v)?;
        for group in 0..source.layer_group_count() {
            for w in source.blend_weights(u, v, group)? {
                hasher.append_f32(w);
            }
        }
    }
    hasher.append_f32(sum);

    for layer in source.layers() {
        if let Some(diffuse) = &layer.diffuse {
            hasher.append_str(&image_content_hash(diffuse).to_string());
        }
        for c in layer.tint {
            hasher.append_f32(c);
        }
    }

    hasher.append_bytes(&overrides.mip_distance.to_le_bytes());
    for c in overrides.tint {
        hasher.append_f32(c);
    }
    hasher.append_bytes(&[
        overrides.clamp_u as u8,
        overrides.clamp_v as u8,
        overrides.correct_for_alpha_bloom as u8,
    ]);
    hasher.append_bytes(&overrides.max_texture_size.pixels().to_le_bytes());
    match texture_override {
        Some(img) => hasher.append_str(&image_content_hash(img).to_string()),
        None => hasher.append_str(""),
    }

    hasher.append_f32(settings.tfrag_size);
    hasher.append_f32(settings.classification_sharpness);
    hasher.append_bytes(&settings.texture_size.pixels().to_le_bytes());
    hasher.append_bytes(&(settings.quantization.resolution as u64).to_le_bytes());
    hasher.append_bytes(&(settings.quantization.buffer as u64).to_le_bytes());

    Ok(hasher.finish())
}

/// Remembers the last conversion so an unchanged terrain is not rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionCache {
    pub last_hash: Option<Hash128>,
    pub chunk_count: usize,
}

impl ConversionCache {
    /// True unless both the hash and the chunk count match the last conversion.
    pub fn needs_conversion(&self, hash: &Hash128, chunk_count: usize) -> bool {
        !(self.chunk_count == chunk_count && self.last_hash.as_ref() == Some(hash))
    }

    pub fn record(&mut self, hash: Hash128, chunk_count: usize) {
        self.last_hash = Some(hash);
        self.chunk_count = chunk_count;
    }

    /// Forget the last hash so the next check always converts.
    pub fn invalidate(&mut self) {
        self.last_hash = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::heightfield::{GridHeightfield, SplatGrid, TerrainLayer};
    use crate::texture_pipeline::TextureSize;
    use cgmath::Vector3;
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;

    fn terrain(height: f32) -> GridHeightfield {
        GridHeightfield::flat(Vector3::new(16.0, 1.0, 16.0), height)
            .unwrap()
            .with_splat(SplatGrid::uniform([1.0, 0.0, 0.0, 0.0]))
            .with_layers(vec![TerrainLayer {
                diffuse: Some(Arc::new(RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255])))),
                tint: [1.0, 1.0, 1.0, 0.0],
            }])
    }

    fn hash(source: &GridHeightfield, overrides: &MaterialOverrides) -> Hash128 {
        compute_hash(source, overrides, &ConversionSettings::default()).unwrap()
    }

    #[test]
    fn hash_is_stable() {
        let t = terrain(1.0);
        let o = MaterialOverrides::default();
        assert_eq!(hash(&t, &o), hash(&t, &o));
        assert_eq!(hash(&t, &o), hash(&terrain(1.0), &o));
    }

    #[test]
    fn inputs_change_the_hash() {
        let o = MaterialOverrides::default();
        let base = hash(&terrain(1.0), &o);
        assert_ne!(base, hash(&terrain(2.0), &o));

        let tinted = MaterialOverrides {
            tint: [1.0, 0.0, 0.0, 1.0],
            ..Default::default()
        };
        assert_ne!(base, hash(&terrain(1.0), &tinted));

        let smaller = MaterialOverrides {
            max_texture_size: TextureSize::_256,
            ..Default::default()
        };
        assert_ne!(base, hash(&terrain(1.0), &smaller));

        let other_splat = terrain(1.0).with_splat(SplatGrid::uniform([0.0, 1.0, 0.0, 0.0]));
        assert_ne!(base, hash(&other_splat, &o));

        let settings = ConversionSettings {
            tfrag_size: 8.0,
            ..Default::default()
        };
        assert_ne!(base, compute_hash(&terrain(1.0), &o, &settings).unwrap());
    }

    #[test]
    fn diffuse_content_changes_the_hash() {
        let o = MaterialOverrides::default();
        let other = terrain(1.0).with_layers(vec![TerrainLayer {
            diffuse: Some(Arc::new(RgbaImage::from_pixel(4, 4, Rgba([9, 9, 10, 255])))),
            tint: [1.0, 1.0, 1.0, 0.0],
        }]);
        assert_ne!(hash(&terrain(1.0), &o), hash(&other, &o));
    }

    #[test]
    fn override_image_is_hashed_by_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("override.png");
        RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255])).save(&path).unwrap();

        let t = terrain(1.0);
        let o = MaterialOverrides {
            texture_override: Some(path.clone()),
            ..Default::default()
        };
        let before = hash(&t, &o);
        assert_ne!(before, hash(&t, &MaterialOverrides::default()));
        assert_eq!(before, hash(&t, &o));

        // same path, edited in place
        RgbaImage::from_pixel(4, 4, Rgba([10, 200, 10, 255])).save(&path).unwrap();
        assert_ne!(before, hash(&t, &o));

        std::fs::remove_file(&path).unwrap();
        assert!(compute_hash(&t, &o, &ConversionSettings::default()).is_err());
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash128([0xAB; 16]);
        let s = h.to_string();
        assert_eq!(s, "abababababababababababababababab");
        assert_eq!(Hash128::try_from(s).unwrap(), h);
        assert!(Hash128::try_from("xyz".to_string()).is_err());

        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, "\"abababababababababababababababab\"");
    }

    #[test]
    fn cache_gates_on_hash_and_count() {
        let h = Hash128([1; 16]);
        let mut cache = ConversionCache::default();
        assert!(cache.needs_conversion(&h, 4));

        cache.record(h, 4);
        assert!(!cache.needs_conversion(&h, 4));
        assert!(cache.needs_conversion(&h, 5));
        assert!(cache.needs_conversion(&Hash128([2; 16]), 4));

        cache.invalidate();
        assert!(cache.needs_conversion(&h, 4));
    }
}
