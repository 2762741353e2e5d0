use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use super::bake::{BakeOptions, BakedTexture, TextureBaker};
use super::config::{ConversionSettings, MaterialOverrides};
use super::hash::{compute_hash, compute_hash_with_override, ConversionCache, Hash128};
use super::heightfield::HeightfieldSource;
use super::mesh::{build_mesh, FaceGrid, TerrainMesh};
use crate::error::{Result, TfragError};
use crate::tfrag::{pack, set_texture_indices, ChunkShape, Quad, QuadVertex, TemplateSet, TfragChunk};

/// Positions in a face's triangle list that hold its corners in strip order.
const QUAD_TRIANGLE_OFFSETS: [usize; 4] = [0, 1, 2, 4];

/// Shared cancellation flag, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A chunk packed and pointed at the global texture list.
#[derive(Debug, Clone)]
pub struct PackedChunk {
    /// Row-major index in the chunk grid.
    pub index: usize,
    /// Face coordinates of the chunk's first face.
    pub face: (usize, usize),
    pub chunk: TfragChunk,
    /// Global texture index of each quad.
    pub textures: Vec<i32>,
}

/// The chunk that stopped a batch.
#[derive(Debug)]
pub struct ChunkFailure {
    pub index: usize,
    pub face: (usize, usize),
    pub quads: usize,
    pub error: TfragError,
}

#[derive(Debug)]
pub struct ConversionResult {
    pub hash: Hash128,
    pub mesh: TerrainMesh,
    /// Unique baked textures in order of first use; chunk texture indices point here.
    pub textures: Vec<Arc<BakedTexture>>,
    pub chunks: Vec<PackedChunk>,
    /// Chunk count of a complete conversion.
    pub expected_chunks: usize,
    pub failure: Option<ChunkFailure>,
    pub cancelled: bool,
}

impl ConversionResult {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.cancelled && self.chunks.len() == self.expected_chunks
    }
}

/// Outcome of checking a terrain against the last conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionPlan {
    pub hash: Hash128,
    pub chunk_count: usize,
    pub up_to_date: bool,
}

/// Hash the terrain and decide whether it needs converting again.
pub fn plan_conversion(
    source: &dyn HeightfieldSource,
    settings: &ConversionSettings,
    overrides: &MaterialOverrides,
    cache: &ConversionCache,
) -> Result<ConversionPlan> {
    settings.validate()?;
    let hash = compute_hash(source, overrides, settings)?;
    let chunk_count = FaceGrid::new(source.size(), settings.tfrag_size)?.chunk_count();
    Ok(ConversionPlan {
        hash,
        chunk_count,
        up_to_date: !cache.needs_conversion(&hash, chunk_count),
    })
}

/// Build the terrain mesh and pack it into chunks of up to 2×2 faces.
///
/// Chunks are packed in row-major chunk order. The first chunk that fails
/// to pack stops the batch; chunks packed before it are kept in the result.
pub fn convert_terrain(
    source: &dyn HeightfieldSource,
    settings: &ConversionSettings,
    overrides: &MaterialOverrides,
    templates: &TemplateSet,
    cancel: Option<&CancelFlag>,
) -> Result<ConversionResult> {
    settings.validate()?;
    let texture_override = overrides.load_texture_override()?;
    let hash = compute_hash_with_override(source, overrides, texture_override.as_deref(), settings)?;

    let bake_options = BakeOptions {
        size: overrides.bake_size(settings),
        quantization: settings.quantization,
        texture_override,
    };
    let mut baker = TextureBaker::new(source.layers(), bake_options);
    let mesh = build_mesh(source, &mut baker, &settings.mesh_options())?;

    let textures: Vec<Arc<BakedTexture>> = mesh.submeshes.iter().map(|s| s.texture.clone()).collect();
    let face_texture_index: Vec<i32> = mesh
        .face_textures
        .iter()
        .map(|t| textures.iter().position(|u| Arc::ptr_eq(t, u)).unwrap_or(0) as i32)
        .collect();

    let grid = mesh.grid;
    let expected_chunks = grid.chunk_count();
    let pack_options = overrides.pack_options();
    let color = overrides.vertex_color();

    let mut chunks = Vec::with_capacity(expected_chunks);
    let mut failure = None;
    let mut cancelled = false;

    'chunks: for cy in 0..grid.chunks_per_column() {
        for cx in 0..grid.chunks_per_row() {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                warn!("conversion cancelled after {} of {} chunks", chunks.len(), expected_chunks);
                cancelled = true;
                break 'chunks;
            }

            let index = cy * grid.chunks_per_row() + cx;
            let face = (cx * 2, cy * 2);
            let faces = chunk_faces(&grid, face);

            let quads: Vec<Quad> = faces
                .iter()
                .map(|&f| face_quad(&mesh, f, color, face_texture_index[f] as u32))
                .collect();
            let indices: Vec<i32> = faces.iter().map(|&f| face_texture_index[f]).collect();

            match pack(&quads, templates, &pack_options).and_then(|chunk| set_texture_indices(&chunk, &indices)) {
                Ok(chunk) => chunks.push(PackedChunk {
                    index,
                    face,
                    chunk,
                    textures: indices,
                }),
                Err(e) => {
                    let shape = ChunkShape::from_quad_count(quads.len())
                        .map(|s| s.to_string())
                        .unwrap_or_else(|_| format!("{} quads", quads.len()));
                    error!(
                        "chunk {} (faces from {},{}; {}) failed to pack: {}",
                        index, face.0, face.1, shape, e
                    );
                    failure = Some(ChunkFailure {
                        index,
                        face,
                        quads: quads.len(),
                        error: e,
                    });
                    break 'chunks;
                }
            }
        }
    }

    info!(
        "converted terrain {}: {}/{} chunks, {} textures",
        hash,
        chunks.len(),
        expected_chunks,
        textures.len()
    );

    Ok(ConversionResult {
        hash,
        mesh,
        textures,
        chunks,
        expected_chunks,
        failure,
        cancelled,
    })
}

/// Row-major face indices of the 2×2 block starting at `origin`, clipped to the grid.
fn chunk_faces(grid: &FaceGrid, origin: (usize, usize)) -> Vec<usize> {
    let mut faces = Vec::with_capacity(4);
    for y in origin.1..(origin.1 + 2).min(grid.faces_per_column) {
        for x in origin.0..(origin.0 + 2).min(grid.faces_per_row) {
            faces.push(y * grid.faces_per_row + x);
        }
    }
    faces
}

fn face_quad(mesh: &TerrainMesh, face: usize, color: [f32; 4], texture: u32) -> Quad {
    let tris = mesh.face_triangles(face);
    let corners = QUAD_TRIANGLE_OFFSETS.map(|ofs| {
        let v = tris[ofs] as usize;
        QuadVertex {
            position: mesh.vertices[v],
            normal: mesh.normals[v],
            color,
            uv: mesh.uvs[v],
        }
    });
    Quad { corners, texture }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::heightfield::{GridHeightfield, SplatGrid, TerrainLayer};
    use cgmath::{Vector2, Vector3};

    fn flat(width: f32, length: f32) -> GridHeightfield {
        GridHeightfield::flat(Vector3::new(width, 1.0, length), 0.0)
            .unwrap()
            .with_splat(SplatGrid::uniform([1.0, 0.0, 0.0, 0.0]))
            .with_layers(vec![TerrainLayer::default()])
    }

    fn convert(hf: &GridHeightfield) -> ConversionResult {
        convert_terrain(
            hf,
            &ConversionSettings::default(),
            &MaterialOverrides::default(),
            &TemplateSet::zeroed().unwrap(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn chunk_faces_clip_to_grid() {
        let grid = FaceGrid {
            faces_per_row: 3,
            faces_per_column: 3,
        };
        assert_eq!(chunk_faces(&grid, (0, 0)), vec![0, 1, 3, 4]);
        assert_eq!(chunk_faces(&grid, (2, 0)), vec![2, 5]);
        assert_eq!(chunk_faces(&grid, (0, 2)), vec![6, 7]);
        assert_eq!(chunk_faces(&grid, (2, 2)), vec![8]);
    }

    #[test]
    fn face_quad_uses_strip_corner_order() {
        let hf = flat(8.0, 8.0);
        let result = convert(&hf);
        let quad = face_quad(&result.mesh, 0, [0.5; 4], 0);
        let uvs: Vec<Vector2<f32>> = quad.corners.iter().map(|c| c.uv).collect();
        assert_eq!(
            uvs,
            vec![
                Vector2::new(0.0, 1.0),
                Vector2::new(1.0, 1.0),
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
            ]
        );
        assert_eq!(quad.corners[0].position, Vector3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn odd_grid_mixes_shapes() {
        let result = convert(&flat(12.0, 8.0));
        assert!(result.is_complete());
        let shapes: Vec<ChunkShape> = result.chunks.iter().map(|c| c.chunk.shape).collect();
        assert_eq!(shapes, vec![ChunkShape::Quad2x2, ChunkShape::Quad1x2]);
        assert_eq!(result.chunks[1].face, (2, 0));
        assert_eq!(result.chunks[1].textures, vec![0, 0]);
    }

    #[test]
    fn cancelled_flag_stops_before_first_chunk() {
        let hf = flat(16.0, 16.0);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = convert_terrain(
            &hf,
            &ConversionSettings::default(),
            &MaterialOverrides::default(),
            &TemplateSet::zeroed().unwrap(),
            Some(&cancel),
        )
        .unwrap();
        assert!(result.cancelled);
        assert!(result.chunks.is_empty());
        assert!(!result.is_complete());
    }

    #[test]
    fn plan_skips_unchanged_terrain() {
        let hf = flat(16.0, 16.0);
        let settings = ConversionSettings::default();
        let overrides = MaterialOverrides::default();
        let mut cache = ConversionCache::default();

        let plan = plan_conversion(&hf, &settings, &overrides, &cache).unwrap();
        assert!(!plan.up_to_date);
        assert_eq!(plan.chunk_count, 4);

        cache.record(plan.hash, plan.chunk_count);
        assert!(plan_conversion(&hf, &settings, &overrides, &cache).unwrap().up_to_date);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = ConversionSettings {
            tfrag_size: 2.0,
            ..Default::default()
        };
        let err = convert_terrain(
            &flat(8.0, 8.0),
            &settings,
            &MaterialOverrides::default(),
            &TemplateSet::zeroed().unwrap(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TfragError::InvalidSettings(_)));
    }
}
