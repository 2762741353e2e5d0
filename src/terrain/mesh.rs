use std::sync::Arc;

use cgmath::{Vector2, Vector3};
use tracing::info;

use super::bake::{BakedTexture, TextureBaker};
use super::classify::{classify, ClassificationGrid, FaceRect, Quantization};
use super::heightfield::{HeightfieldSource, LAYERS_PER_GROUP};
use crate::error::{Result, TfragError};

/// Face and chunk counts for a terrain cut into square faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceGrid {
    pub faces_per_row: usize,
    pub faces_per_column: usize,
}

impl FaceGrid {
    pub fn new(size: Vector3<f32>, face_size: f32) -> Result<Self> {
        if !(face_size > 0.0 && face_size.is_finite()) {
            return Err(TfragError::InvalidSettings(format!("face size must be positive, got {face_size}")));
        }
        let faces = |extent: f32| (extent / face_size).ceil().max(1.0) as usize;
        Ok(Self {
            faces_per_row: faces(size.x),
            faces_per_column: faces(size.z),
        })
    }

    pub fn face_count(&self) -> usize {
        self.faces_per_row * self.faces_per_column
    }

    pub fn chunks_per_row(&self) -> usize {
        self.faces_per_row.div_ceil(2)
    }

    pub fn chunks_per_column(&self) -> usize {
        self.faces_per_column.div_ceil(2)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks_per_row() * self.chunks_per_column()
    }
}

/// Triangles of the terrain mesh drawn with one baked texture.
#[derive(Debug, Clone)]
pub struct Submesh {
    pub texture: Arc<BakedTexture>,
    pub triangles: Vec<u32>,
}

/// Unshared-vertex terrain mesh: 4 vertices and 2 triangles per face, faces
/// row-major starting at the `(0, 0)` corner.
#[derive(Debug, Clone)]
pub struct TerrainMesh {
    pub grid: FaceGrid,
    pub vertices: Vec<Vector3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub uvs: Vec<Vector2<f32>>,
    pub triangles: Vec<u32>,
    /// Baked texture of each face.
    pub face_textures: Vec<Arc<BakedTexture>>,
    /// One per distinct texture, in order of first use.
    pub submeshes: Vec<Submesh>,
}

impl TerrainMesh {
    pub fn face_index(&self, x: usize, y: usize) -> usize {
        y * self.grid.faces_per_row + x
    }

    /// The two triangles of a face.
    pub fn face_triangles(&self, face: usize) -> &[u32] {
        &self.triangles[face * 6..face * 6 + 6]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MeshOptions {
    pub face_size: f32,
    /// Kernel sharpness handed to the classifier.
    pub ramp: f32,
    pub quantization: Quantization,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            face_size: 4.0,
            ramp: 1.0,
            quantization: Quantization::default(),
        }
    }
}

/// Walk the heightfield face by face, classify and bake every face, and group
/// the triangles by baked texture.
pub fn build_mesh(source: &dyn HeightfieldSource, baker: &mut TextureBaker, options: &MeshOptions) -> Result<TerrainMesh> {
    let layer_count = source.layers().len();
    if layer_count > LAYERS_PER_GROUP {
        return Err(TfragError::InvalidSettings(format!(
            "terrain has {layer_count} layers, at most {LAYERS_PER_GROUP} are supported"
        )));
    }
    options.quantization.validate()?;

    let size = source.size();
    let grid = FaceGrid::new(size, options.face_size)?;
    let (per_row, per_column) = (grid.faces_per_row, grid.faces_per_column);
    let inv_row = 1.0 / per_row as f32;
    let inv_column = 1.0 / per_column as f32;
    let faces = grid.face_count();

    let mut vertices = Vec::with_capacity(faces * 4);
    let mut normals = Vec::with_capacity(faces * 4);
    let mut uvs = Vec::with_capacity(faces * 4);
    let mut triangles = Vec::with_capacity(faces * 6);
    let mut classes = ClassificationGrid::new(per_row + 1, per_column + 1, options.quantization);

    for y in 0..per_column {
        for x in 0..per_row {
            let v = vertices.len() as u32;
            triangles.extend_from_slice(&[v + 2, v + 3, v, v + 3, v + 1, v]);

            for vy in 0..2 {
                for vx in 0..2 {
                    let tx = (x + vx) as f32 * inv_row;
                    let ty = (y + vy) as f32 * inv_column;
                    let height = source.height(tx, ty)?;
                    vertices.push(Vector3::new(tx * size.x, height, ty * size.z));
                    normals.push(source.normal(tx, ty)?);
                    uvs.push(Vector2::new(vx as f32, vy as f32));
                }
            }

            // window origin sits one face back so its centre cell lands on this face's corner
            let face = FaceRect {
                x: x as f32 * inv_row - inv_row,
                y: y as f32 * inv_column - inv_column,
                width: inv_row,
                height: inv_column,
            };
            let window = classify(source, face, 0, options.ramp, options.quantization)?;
            classes.scatter(x, y, &window);
        }
    }

    let mut face_textures = Vec::with_capacity(faces);
    for y in 0..per_column {
        for x in 0..per_row {
            let block = classes.block(x + 1, y + 1);
            face_textures.push(baker.bake(&block)?);
        }
    }

    let mut submeshes: Vec<Submesh> = Vec::new();
    for (face, texture) in face_textures.iter().enumerate() {
        let tris = &triangles[face * 6..face * 6 + 6];
        match submeshes.iter_mut().find(|s| Arc::ptr_eq(&s.texture, texture)) {
            Some(submesh) => submesh.triangles.extend_from_slice(tris),
            None => submeshes.push(Submesh {
                texture: texture.clone(),
                triangles: tris.to_vec(),
            }),
        }
    }

    info!(
        "built terrain mesh: {}x{} faces, {} submeshes, {} baked textures",
        per_row,
        per_column,
        submeshes.len(),
        baker.len()
    );

    Ok(TerrainMesh {
        grid,
        vertices,
        normals,
        uvs,
        triangles,
        face_textures,
        submeshes,
    })
}
