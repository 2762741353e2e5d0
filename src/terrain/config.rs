use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use cgmath::Vector3;
use serde::{Deserialize, Serialize};

use super::classify::Quantization;
use super::heightfield::{GridHeightfield, SplatGrid, TerrainLayer};
use super::mesh::MeshOptions;
use crate::error::{Result, TfragError};
use crate::texture_pipeline::converter::{self, TextureOutputOptions};
use crate::texture_pipeline::TextureSize;
use crate::tfrag::PackOptions;

/// Colour the tint moves towards while an instance is selected.
const SELECTION_TINT: [f32; 3] = [1.0, 0.55, 0.1];
/// Tint alpha multiplier for hidden instances.
const HIDDEN_ALPHA: f32 = 0.25;

// ============================================================================
// Settings
// ============================================================================

/// Per-terrain conversion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Face edge length in world units (4..=8).
    pub tfrag_size: f32,
    /// Classification kernel ramp (0..=4).
    pub classification_sharpness: f32,
    pub texture_size: TextureSize,
    pub quantization: Quantization,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            tfrag_size: 4.0,
            classification_sharpness: 1.0,
            texture_size: TextureSize::_64,
            quantization: Quantization::default(),
        }
    }
}

impl ConversionSettings {
    pub fn validate(&self) -> Result<()> {
        if !(4.0..=8.0).contains(&self.tfrag_size) {
            return Err(TfragError::InvalidSettings(format!(
                "tfrag_size must be within 4..=8, got {}",
                self.tfrag_size
            )));
        }
        if !(0.0..=4.0).contains(&self.classification_sharpness) {
            return Err(TfragError::InvalidSettings(format!(
                "classification_sharpness must be within 0..=4, got {}",
                self.classification_sharpness
            )));
        }
        self.quantization.validate()
    }

    pub fn mesh_options(&self) -> MeshOptions {
        MeshOptions {
            face_size: self.tfrag_size,
            ramp: self.classification_sharpness,
            quantization: self.quantization,
        }
    }
}

/// Per-instance material parameters applied on top of the baked terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialOverrides {
    pub mip_distance: i16,
    /// Multiplies the chunk vertex colour.
    pub tint: [f32; 4],
    pub clamp_u: bool,
    pub clamp_v: bool,
    pub correct_for_alpha_bloom: bool,
    pub max_texture_size: TextureSize,
    pub texture_override: Option<PathBuf>,
}

impl Default for MaterialOverrides {
    fn default() -> Self {
        Self {
            mip_distance: i16::MIN,
            tint: [1.0; 4],
            clamp_u: true,
            clamp_v: true,
            correct_for_alpha_bloom: false,
            max_texture_size: TextureSize::_1024,
            texture_override: None,
        }
    }
}

impl MaterialOverrides {
    pub fn pack_options(&self) -> PackOptions {
        PackOptions {
            clamp_u: self.clamp_u,
            clamp_v: self.clamp_v,
            mip_distance: self.mip_distance,
        }
    }

    /// Mid grey scaled by the tint.
    pub fn vertex_color(&self) -> [f32; 4] {
        self.tint.map(|c| 0.5 * c)
    }

    pub fn bake_size(&self, settings: &ConversionSettings) -> u32 {
        settings.texture_size.min(self.max_texture_size).pixels()
    }

    /// Decode the override image, if one is set.
    pub fn load_texture_override(&self) -> Result<Option<Arc<image::RgbaImage>>> {
        match &self.texture_override {
            Some(path) => Ok(Some(Arc::new(image::open(path)?.to_rgba8()))),
            None => Ok(None),
        }
    }

    pub fn output_options(&self) -> TextureOutputOptions {
        TextureOutputOptions {
            correct_for_alpha_bloom: self.correct_for_alpha_bloom,
            max_dimension: self.max_texture_size.pixels(),
        }
    }
}

/// Editor-side visibility and selection of a terrain instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    pub visible: bool,
    pub selected: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            visible: true,
            selected: false,
        }
    }
}

impl RenderState {
    /// Overrides as a viewer should draw them. Packed chunks never see this.
    pub fn apply(&self, overrides: &MaterialOverrides) -> MaterialOverrides {
        let mut out = overrides.clone();
        if self.selected {
            for (c, s) in out.tint.iter_mut().zip(SELECTION_TINT) {
                *c += (s - *c) * 0.5;
            }
        }
        if !self.visible {
            out.tint[3] *= HIDDEN_ALPHA;
        }
        out
    }
}

// ============================================================================
// Job files
// ============================================================================

fn default_layer_tint() -> [f32; 4] {
    [1.0, 1.0, 1.0, 0.0]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default)]
    pub diffuse: Option<PathBuf>,
    #[serde(default = "default_layer_tint")]
    pub tint: [f32; 4],
}

/// A terrain conversion described in JSON. Relative paths are resolved
/// against the job file's directory by [`TerrainJob::load`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainJob {
    /// World size: width (X), height scale (Y), length (Z).
    pub size: [f32; 3],
    /// Greyscale heightmap, row 0 at the terrain's `z = 0` edge. Flat when absent.
    #[serde(default)]
    pub heightmap: Option<PathBuf>,
    /// One RGBA splat image per layer group.
    #[serde(default)]
    pub splatmaps: Vec<PathBuf>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub settings: ConversionSettings,
    #[serde(default)]
    pub overrides: MaterialOverrides,
}

impl TerrainJob {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read job {}", path.display()))?;
        let mut job: TerrainJob =
            serde_json::from_str(&text).with_context(|| format!("Failed to parse job {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        job.resolve_paths(base);
        Ok(job)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.heightmap.as_mut() {
            resolve(p);
        }
        self.splatmaps.iter_mut().for_each(resolve);
        for layer in &mut self.layers {
            if let Some(p) = layer.diffuse.as_mut() {
                resolve(p);
            }
        }
        if let Some(p) = self.overrides.texture_override.as_mut() {
            resolve(p);
        }
    }

    pub fn size(&self) -> Vector3<f32> {
        Vector3::new(self.size[0], self.size[1], self.size[2])
    }

    /// Load every referenced image into a grid heightfield.
    pub fn build_heightfield(&self) -> anyhow::Result<GridHeightfield> {
        let size = self.size();
        let mut heightfield = match &self.heightmap {
            Some(path) => {
                let img = image::open(path)
                    .with_context(|| format!("Failed to open heightmap {}", path.display()))?
                    .to_luma16();
                GridHeightfield::from_heightmap(size, &img)?
            }
            None => GridHeightfield::flat(size, 0.0)?,
        };

        for path in &self.splatmaps {
            let img = converter::load_rgba(path)?;
            heightfield = heightfield.with_splat(SplatGrid::from_image(&img)?);
        }

        let layers = self
            .layers
            .iter()
            .map(|layer| {
                let diffuse = match &layer.diffuse {
                    Some(path) => Some(Arc::new(converter::load_rgba(path)?)),
                    None => None,
                };
                Ok(TerrainLayer {
                    diffuse,
                    tint: layer.tint,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        if layers.len() > 4 {
            return Err(anyhow!("Terrain has {} layers, at most 4 are supported", layers.len()));
        }

        Ok(heightfield.with_layers(layers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::heightfield::HeightfieldSource;
    use image::{Luma, Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn settings_defaults() {
        let settings = ConversionSettings::default();
        assert_eq!(settings.tfrag_size, 4.0);
        assert_eq!(settings.texture_size.pixels(), 64);
        assert!(settings.validate().is_ok());

        let parsed: ConversionSettings = serde_json::from_str(r#"{"tfrag_size": 6}"#).unwrap();
        assert_eq!(parsed.tfrag_size, 6.0);
        assert_eq!(parsed.classification_sharpness, 1.0);
    }

    #[test]
    fn settings_ranges_are_checked() {
        let bad = ConversionSettings {
            tfrag_size: 9.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = ConversionSettings {
            classification_sharpness: -0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn overrides_defaults() {
        let o = MaterialOverrides::default();
        assert_eq!(o.mip_distance, i16::MIN);
        assert!(o.clamp_u && o.clamp_v);
        assert_eq!(o.vertex_color(), [0.5; 4]);
        assert_eq!(o.pack_options(), PackOptions::default());
    }

    #[test]
    fn bake_size_is_capped() {
        let settings = ConversionSettings {
            texture_size: TextureSize::_256,
            ..Default::default()
        };
        let overrides = MaterialOverrides {
            max_texture_size: TextureSize::_128,
            ..Default::default()
        };
        assert_eq!(overrides.bake_size(&settings), 128);
        assert_eq!(MaterialOverrides::default().bake_size(&settings), 256);
    }

    #[test]
    fn render_state_is_pure() {
        let base = MaterialOverrides::default();
        assert_eq!(RenderState::default().apply(&base), base);

        let hidden = RenderState {
            visible: false,
            selected: false,
        }
        .apply(&base);
        assert!((hidden.tint[3] - 0.25).abs() < 0.001);

        let selected = RenderState {
            visible: true,
            selected: true,
        }
        .apply(&base);
        assert!((selected.tint[2] - 0.55).abs() < 0.001);
        // input untouched
        assert_eq!(base.tint, [1.0; 4]);
    }

    #[test]
    fn job_resolves_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let job_path = tmp.path().join("job.json");
        std::fs::write(
            &job_path,
            r#"{
                "size": [16, 4, 16],
                "splatmaps": ["splat.png"],
                "layers": [{"diffuse": "grass.png"}],
                "settings": {"texture_size": "32"}
            }"#,
        )
        .unwrap();

        let job = TerrainJob::load(&job_path).unwrap();
        assert_eq!(job.splatmaps[0], tmp.path().join("splat.png"));
        assert_eq!(job.layers[0].diffuse.as_deref(), Some(tmp.path().join("grass.png").as_path()));
        assert_eq!(job.layers[0].tint, [1.0, 1.0, 1.0, 0.0]);
        assert_eq!(job.settings.texture_size, TextureSize::_32);
        assert_eq!(job.overrides, MaterialOverrides::default());
    }

    #[test]
    fn job_builds_heightfield_from_images() {
        let tmp = TempDir::new().unwrap();
        let mut heights = image::ImageBuffer::<Luma<u16>, Vec<u16>>::new(2, 2);
        heights.put_pixel(1, 0, Luma([u16::MAX]));
        heights.put_pixel(1, 1, Luma([u16::MAX]));
        heights.save(tmp.path().join("height.png")).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 0])).save(tmp.path().join("splat.png")).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])).save(tmp.path().join("grass.png")).unwrap();

        let job = TerrainJob {
            size: [8.0, 10.0, 8.0],
            heightmap: Some(tmp.path().join("height.png")),
            splatmaps: vec![tmp.path().join("splat.png")],
            layers: vec![LayerConfig {
                diffuse: Some(tmp.path().join("grass.png")),
                tint: default_layer_tint(),
            }],
            settings: ConversionSettings::default(),
            overrides: MaterialOverrides::default(),
        };
        let hf = job.build_heightfield().unwrap();
        assert!((hf.height(1.0, 0.5).unwrap() - 10.0).abs() < 0.001);
        assert!((hf.height(0.5, 0.5).unwrap() - 5.0).abs() < 0.001);
        assert_eq!(hf.blend_weights(0.5, 0.5, 0).unwrap(), [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(hf.layers().len(), 1);
        assert!(hf.layers()[0].diffuse.is_some());
    }

    #[test]
    fn missing_image_reports_path() {
        let job = TerrainJob {
            size: [8.0, 1.0, 8.0],
            heightmap: Some(PathBuf::from("/nonexistent/height.png")),
            splatmaps: vec![],
            layers: vec![],
            settings: ConversionSettings::default(),
            overrides: MaterialOverrides::default(),
        };
        let err = job.build_heightfield().unwrap_err();
        assert!(format!("{err:#}").contains("height.png"));
    }
}
