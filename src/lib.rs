//! Heightfield terrain to PS2 tfrag chunk conversion.

pub mod error;
pub mod export;
pub mod math;
pub mod mesh_processing;
pub mod terrain;
pub mod texture_pipeline;
pub mod tfrag;

pub use error::{Result, TfragError};
