//! Packed tfrag chunks: the PS2 renderer's terrain fragment format.
//!
//! A chunk is a 0x40 byte `def` header plus a data block holding VIF
//! packets, texture descriptors, lighting and culling data. Chunks are
//! built from 1, 2 or 4 quads by patching a per-shape template.

pub mod header;
pub mod layout;
pub mod normal;
pub mod pack;
pub mod remap;
pub mod transform;

use std::fmt;

use cgmath::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TfragError};

pub use header::{unpack_def, TfragHeader};
pub use layout::{ChunkLayout, ChunkTemplate, TemplateSet};
pub use pack::{pack, PackOptions};
pub use remap::set_texture_indices;
pub use transform::transform_chunk;

/// Size of the def header in bytes.
pub const DEF_SIZE: usize = 0x40;

/// Quad arrangement of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkShape {
    Quad1x1,
    Quad1x2,
    Quad2x2,
}

impl ChunkShape {
    pub const ALL: [ChunkShape; 3] = [ChunkShape::Quad1x1, ChunkShape::Quad1x2, ChunkShape::Quad2x2];

    pub fn from_quad_count(quads: usize) -> Result<Self> {
        match quads {
            1 => Ok(ChunkShape::Quad1x1),
            2 => Ok(ChunkShape::Quad1x2),
            4 => Ok(ChunkShape::Quad2x2),
            _ => Err(TfragError::UnsupportedShape { quads }),
        }
    }

    pub fn quad_count(self) -> usize {
        match self {
            ChunkShape::Quad1x1 => 1,
            ChunkShape::Quad1x2 => 2,
            ChunkShape::Quad2x2 => 4,
        }
    }
}

impl fmt::Display for ChunkShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkShape::Quad1x1 => write!(f, "1x1"),
            ChunkShape::Quad1x2 => write!(f, "1x2"),
            ChunkShape::Quad2x2 => write!(f, "2x2"),
        }
    }
}

/// One corner of a quad, in Y-up authoring space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadVertex {
    pub position: Vector3<f32>,
    pub normal: Vector3<f32>,
    pub color: [f32; 4],
    pub uv: Vector2<f32>,
}

/// Four corners in strip order plus the index of the baked texture drawn on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    pub corners: [QuadVertex; 4],
    pub texture: u32,
}

/// A packed chunk. Never patched in place: post-processing returns a new chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TfragChunk {
    pub shape: ChunkShape,
    pub def: Vec<u8>,
    pub data: Vec<u8>,
}

impl TfragChunk {
    pub fn header(&self) -> Result<TfragHeader> {
        TfragHeader::parse(&self.def)
    }
}
