//! Writing conversion results to disk.

pub mod glb;
pub mod manifest;
pub mod terrain_glb;

pub use manifest::{write_conversion, Manifest};
pub use terrain_glb::{build_terrain_glb, export_terrain_glb};
