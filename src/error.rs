use std::io;

use thiserror::Error;

use crate::tfrag::ChunkShape;

/// Errors raised by the terrain classifier, texture baker and chunk codec.
#[derive(Debug, Error)]
pub enum TfragError {
    /// A chunk was handed a quad count with no packing layout.
    #[error("unsupported chunk shape: {quads} quads (expected 1, 2 or 4)")]
    UnsupportedShape { quads: usize },

    /// Position deduplication produced a different base vertex count than the layout stores.
    #[error("{shape} chunk has {actual} base vertices, layout expects {expected}")]
    VertexCountMismatch {
        shape: ChunkShape,
        expected: usize,
        actual: usize,
    },

    /// A vertex sits too far from the chunk centre for a 16-bit displacement (±32 units).
    #[error("{shape} chunk vertex {vertex} is {value:.3} units from the chunk centre, past the 16-bit displacement range")]
    DisplacementOverflow {
        shape: ChunkShape,
        vertex: usize,
        value: f32,
    },

    /// A template buffer is too short for one of the regions its layout writes.
    #[error("{shape} template region `{region}` ends at {end:#x}, buffer is {len:#x} bytes")]
    TemplateOverflow {
        shape: ChunkShape,
        region: &'static str,
        end: usize,
        len: usize,
    },

    /// An embedded template could not be decoded.
    #[error("invalid {shape} template: {message}")]
    InvalidTemplate { shape: ChunkShape, message: String },

    #[error("cannot set {actual} texture indices on a chunk with {expected} textures")]
    TextureCountMismatch { expected: usize, actual: usize },

    /// A packed chunk references bytes outside its data block.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    /// The heightfield provider returned unusable data.
    #[error("heightfield sample provider failed: {0}")]
    SampleProvider(String),

    #[error("invalid conversion settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Binary(#[from] binrw::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Result type for classifier, baker and codec operations
pub type Result<T> = std::result::Result<T, TfragError>;
