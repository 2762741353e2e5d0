//! Binary glTF container: 12-byte header, a JSON chunk padded with spaces
//! and a BIN chunk padded with zeros, both 4-byte aligned.

use std::path::Path;

use anyhow::{Context, Result};

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_VERSION: u32 = 2;
const CHUNK_TYPE_JSON: u32 = 0x4E4F_534A;
const CHUNK_TYPE_BIN: u32 = 0x004E_4942;

fn push_chunk(out: &mut Vec<u8>, kind: u32, payload: &[u8], pad: u8) {
    let padding = (4 - payload.len() % 4) % 4;
    out.extend_from_slice(&((payload.len() + padding) as u32).to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(payload);
    out.extend(std::iter::repeat(pad).take(padding));
}

/// Assemble a GLB in memory.
pub fn glb_bytes(json_str: &str, bin_data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(28 + json_str.len() + bin_data.len() + 6);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    push_chunk(&mut out, CHUNK_TYPE_JSON, json_str.as_bytes(), b' ');
    if !bin_data.is_empty() {
        push_chunk(&mut out, CHUNK_TYPE_BIN, bin_data, 0);
    }

    let total = out.len() as u32;
    out[8..12].copy_from_slice(&total.to_le_bytes());
    out
}

pub fn write_glb(json_str: &str, bin_data: &[u8], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, glb_bytes(json_str, bin_data))
        .with_context(|| format!("Failed to write GLB: {}", path.display()))
}
