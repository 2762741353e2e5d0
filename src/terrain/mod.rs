//! Heightfield terrain to chunk conversion.
//!
//! A terrain is cut into square faces. Each face is classified against the
//! splat map, gets a baked texture shared with every face of the same
//! classification, and faces are packed into chunks of up to 2×2.

pub mod bake;
pub mod classify;
pub mod config;
pub mod convert;
pub mod hash;
pub mod heightfield;
pub mod mesh;

pub use bake::{BakeOptions, BakedTexture, TextureBaker};
pub use classify::{classify, Classification, ClassificationGrid, FaceRect, Quantization};
pub use config::{ConversionSettings, MaterialOverrides, RenderState, TerrainJob};
pub use convert::{convert_terrain, plan_conversion, CancelFlag, ConversionResult, PackedChunk};
pub use hash::{compute_hash, compute_hash_with_override, ConversionCache, Hash128};
pub use heightfield::{GridHeightfield, HeightfieldSource, SplatGrid, TerrainLayer};
pub use mesh::{build_mesh, FaceGrid, MeshOptions, TerrainMesh};
