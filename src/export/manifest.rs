//! On-disk layout of a conversion:
//!
//! ```text
//! <out>/manifest.json
//! <out>/<i>.tfragdef, <out>/<i>.tfrag   one pair per packed chunk
//! <out>/textures/<i>.png                 baked textures by global index
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::terrain::{ConversionCache, ConversionResult, Hash128, MaterialOverrides};
use crate::texture_pipeline::converter;
use crate::tfrag::ChunkShape;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;
const TEXTURE_DIR: &str = "textures";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub index: usize,
    pub face: [usize; 2],
    pub shape: ChunkShape,
    pub def: String,
    pub data: String,
    pub textures: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureEntry {
    pub index: usize,
    pub name: String,
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub alpha_corrected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub hash: Hash128,
    pub complete: bool,
    pub faces_per_row: usize,
    pub faces_per_column: usize,
    /// Chunk count of a complete conversion.
    pub chunk_count: usize,
    /// Only records the hash once a conversion completed, so partial output is redone.
    pub cache: ConversionCache,
    pub chunks: Vec<ChunkEntry>,
    pub textures: Vec<TextureEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Manifest {
    pub fn path(out_dir: &Path) -> PathBuf {
        out_dir.join(MANIFEST_FILE)
    }

    /// Read `<out_dir>/manifest.json`, `None` when there is no previous conversion.
    pub fn load(out_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(out_dir);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest = serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(manifest))
    }

    pub fn save(&self, out_dir: &Path) -> Result<()> {
        let path = Self::path(out_dir);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Write every packed chunk, baked texture and the manifest into `out_dir`.
pub fn write_conversion(result: &ConversionResult, overrides: &MaterialOverrides, out_dir: &Path) -> Result<Manifest> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut chunks = Vec::with_capacity(result.chunks.len());
    for packed in &result.chunks {
        let def = format!("{}.tfragdef", packed.index);
        let data = format!("{}.tfrag", packed.index);
        std::fs::write(out_dir.join(&def), &packed.chunk.def).with_context(|| format!("Failed to write {def}"))?;
        std::fs::write(out_dir.join(&data), &packed.chunk.data).with_context(|| format!("Failed to write {data}"))?;
        chunks.push(ChunkEntry {
            index: packed.index,
            face: [packed.face.0, packed.face.1],
            shape: packed.chunk.shape,
            def,
            data,
            textures: packed.textures.clone(),
        });
    }

    let output_options = overrides.output_options();
    let mut textures = Vec::with_capacity(result.textures.len());
    for (index, texture) in result.textures.iter().enumerate() {
        let file = format!("{TEXTURE_DIR}/{index}.png");
        let prepared = converter::save_png(&texture.image, &out_dir.join(&file), &output_options)?;
        textures.push(TextureEntry {
            index,
            name: texture.name.clone(),
            file,
            width: prepared.image.width(),
            height: prepared.image.height(),
            alpha_corrected: prepared.alpha_corrected,
        });
    }

    let complete = result.is_complete();
    let mut cache = ConversionCache::default();
    if complete {
        cache.record(result.hash, result.expected_chunks);
    }

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        hash: result.hash,
        complete,
        faces_per_row: result.mesh.grid.faces_per_row,
        faces_per_column: result.mesh.grid.faces_per_column,
        chunk_count: result.expected_chunks,
        cache,
        chunks,
        textures,
        failure: result.failure.as_ref().map(|f| {
            format!(
                "chunk {} (faces from {},{}; {} quads): {}",
                f.index, f.face.0, f.face.1, f.quads, f.error
            )
        }),
    };
    manifest.save(out_dir)?;

    info!(
        "wrote {} chunks and {} textures to {}",
        manifest.chunks.len(),
        manifest.textures.len(),
        out_dir.display()
    );
    Ok(manifest)
}
