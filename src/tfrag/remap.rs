use std::collections::HashMap;

use super::TfragChunk;
use crate::error::{Result, TfragError};

/// Point a chunk's texture descriptors at `indices` and remap the texture
/// byte of each msphere to match. Returns the patched copy.
pub fn set_texture_indices(chunk: &TfragChunk, indices: &[i32]) -> Result<TfragChunk> {
    let header = chunk.header()?;
    let expected = header.texture_count();
    if indices.len() != expected {
        return Err(TfragError::TextureCountMismatch {
            expected,
            actual: indices.len(),
        });
    }

    let mut data = chunk.data.clone();
    let mut remap: HashMap<i32, i32> = HashMap::new();

    for (i, &new_index) in indices.iter().enumerate() {
        let ofs = header.tex_ofs as usize + 0x50 * i;
        let slot = slice_mut(&mut data, ofs, 4)?;
        let old_index = i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
        slot.copy_from_slice(&new_index.to_le_bytes());
        // first descriptor wins when a template repeats an index
        remap.entry(old_index).or_insert(new_index);
    }

    for i in 0..header.msphere_cnt as usize {
        let ofs = header.msphere_ofs as usize + 0x10 * i + 0xF;
        let byte = slice_mut(&mut data, ofs, 1)?;
        if let Some(&new_index) = remap.get(&(byte[0] as i32)) {
            byte[0] = new_index as u8;
        }
    }

    Ok(TfragChunk {
        shape: chunk.shape,
        def: chunk.def.clone(),
        data,
    })
}

pub(crate) fn slice_mut(data: &mut [u8], ofs: usize, len: usize) -> Result<&mut [u8]> {
    let size = data.len();
    data.get_mut(ofs..ofs + len).ok_or_else(|| {
        TfragError::MalformedChunk(format!("{len} bytes at {ofs:#x} past data end {size:#x}"))
    })
}
