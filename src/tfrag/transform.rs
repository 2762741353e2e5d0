use std::io::{Cursor, Seek, SeekFrom};

use binrw::{BinRead, BinWrite};
use cgmath::{EuclideanSpace, Matrix4, Point3, Transform, Vector3};
use tracing::debug;

use super::remap::slice_mut;
use super::{ChunkShape, TfragChunk, TfragHeader};
use crate::error::{Result, TfragError};
use crate::math::{fixed16_overflow, CubeVector3, Fixed16Vector3, Fixed32Vector3, ScaledVector3};

/// VIF STROW command word; four row words follow.
const VIF_STROW: u32 = 0x3000_0000;
/// Bits set in the command byte of every VIF UNPACK.
const VIF_UNPACK_MASK: u32 = 0b0110_0000;

fn apply(matrix: &Matrix4<f32>, p: Vector3<f32>) -> Vector3<f32> {
    matrix.transform_point(Point3::from_vec(p)).to_vec()
}

/// Move a packed chunk by `matrix` (game space).
///
/// Updates the def sphere, msphere positions, the lighting centre, the
/// bounding cube, every STROW row holding the chunk centre and the V3-16
/// displacement UNPACKs that follow them. Returns the transformed copy.
pub fn transform_chunk(chunk: &TfragChunk, matrix: &Matrix4<f32>) -> Result<TfragChunk> {
    let mut header = chunk.header()?;
    let mut data = Cursor::new(chunk.data.clone());

    header.center = ScaledVector3(apply(matrix, header.center.0));

    let light_ofs = header.light_ofs as usize;
    let centre_row = read_row(data.get_ref(), light_ofs)?;

    for i in 0..header.msphere_cnt as usize {
        let ofs = header.msphere_ofs as usize + 0x10 * i;
        seek(&mut data, ofs)?;
        let p = ScaledVector3::read(&mut data)?;
        seek(&mut data, ofs)?;
        ScaledVector3(apply(matrix, p.0)).write(&mut data)?;
    }

    seek(&mut data, light_ofs)?;
    let centre = Fixed32Vector3::read(&mut data)?;
    seek(&mut data, light_ofs)?;
    Fixed32Vector3(apply(matrix, centre.0)).write(&mut data)?;

    for c in 0..8 {
        let ofs = header.cube_ofs as usize + c * 8;
        seek(&mut data, ofs)?;
        let corner = CubeVector3::read(&mut data)?;
        seek(&mut data, ofs)?;
        CubeVector3(apply(matrix, corner.0)).write(&mut data)?;
    }

    let rewritten = transform_packets(&mut data, chunk.shape, &header, centre_row, matrix)?;
    debug!("transformed {} chunk, {} packet fields rewritten", chunk.shape, rewritten);

    Ok(TfragChunk {
        shape: chunk.shape,
        def: header.to_bytes()?,
        data: data.into_inner(),
    })
}

/// Walk the VIF stream ahead of the colour table. Each STROW whose row equals
/// the chunk centre is moved; each following V3-16 UNPACK is treated as
/// displacements from that centre and re-expressed around the moved one.
fn transform_packets(
    data: &mut Cursor<Vec<u8>>,
    shape: ChunkShape,
    header: &TfragHeader,
    centre_row: [i32; 3],
    matrix: &Matrix4<f32>,
) -> Result<usize> {
    let end = (header.rgba_ofs as usize).min(data.get_ref().len());
    let mut current: Option<(Vector3<f32>, Vector3<f32>)> = None;
    let mut rewritten = 0;
    let mut w = 0usize;

    while w + 4 <= end {
        let word = read_u32(data.get_ref(), w)?;

        if word == VIF_STROW {
            if read_row(data.get_ref(), w + 4)? == centre_row {
                seek(data, w + 4)?;
                let before = Fixed32Vector3::read(data)?.0;
                let after = apply(matrix, before);
                seek(data, w + 4)?;
                Fixed32Vector3(after).write(data)?;
                current = Some((before, after));
                rewritten += 1;
            }
            w += 20;
            continue;
        }

        if (word >> 24) & VIF_UNPACK_MASK == VIF_UNPACK_MASK {
            let vn = (word >> 26) & 0b11;
            let vl = (word >> 24) & 0b11;
            let num = match (word >> 16) & 0xFF {
                0 => 256,
                n => n as usize,
            };
            let element_size = ((32 >> vl) * (vn + 1)) as usize / 8;
            let payload = (num * element_size).div_ceil(4) * 4;

            if element_size == 6 {
                if let Some((before, after)) = current {
                    for i in 0..num {
                        let ofs = w + 4 + i * 6;
                        seek(data, ofs)?;
                        let displacement = Fixed16Vector3::read(data)?.0;
                        let moved = apply(matrix, before + displacement) - after;
                        if let Some(value) = fixed16_overflow(moved) {
                            return Err(TfragError::DisplacementOverflow { shape, vertex: i, value });
                        }
                        seek(data, ofs)?;
                        Fixed16Vector3(moved).write(data)?;
                        rewritten += 1;
                    }
                }
            }
            w += 4 + payload;
            continue;
        }

        w += 4;
    }

    Ok(rewritten)
}

fn read_u32(data: &[u8], ofs: usize) -> Result<u32> {
    let b = data
        .get(ofs..ofs + 4)
        .ok_or_else(|| TfragError::MalformedChunk(format!("word at {ofs:#x} past data end")))?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_row(data: &[u8], ofs: usize) -> Result<[i32; 3]> {
    let mut row = [0i32; 3];
    for (i, v) in row.iter_mut().enumerate() {
        *v = read_u32(data, ofs + 4 * i)? as i32;
    }
    Ok(row)
}

fn seek(cursor: &mut Cursor<Vec<u8>>, offset: usize) -> Result<()> {
    // writes past the end would grow the buffer
    slice_mut(cursor.get_mut(), offset, 1)?;
    cursor.seek(SeekFrom::Start(offset as u64))?;
    Ok(())
}
