use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};
use cgmath::Vector3;

use super::DEF_SIZE;
use crate::error::{Result, TfragError};
use crate::math::ScaledVector3;

/// The 0x40 byte chunk definition the renderer walks before touching the data block.
///
/// Offsets are relative to the start of the data block.
#[binrw]
#[derive(Debug, Clone, PartialEq)]
#[brw(little)]
pub struct TfragHeader {
    /// Bounding sphere centre in game (Z-up) space.
    pub center: ScaledVector3,
    /// Bounding sphere diameter.
    #[br(map = |raw: f32| raw / 1024.0)]
    #[bw(map = |d: &f32| *d * 1024.0)]
    pub diameter: f32,
    pub p_data: u32,
    pub lod_2_ofs: u16,
    pub shared_ofs: u16,
    pub lod_1_ofs: u16,
    pub lod_0_ofs: u16,
    pub tex_ofs: u16,
    pub rgba_ofs: u16,
    pub common_size: i8,
    pub lod_2_size: i8,
    pub lod_1_size: i8,
    pub lod_0_size: i8,
    pub lod_2_rgba_cnt: i8,
    pub lod_1_rgba_cnt: i8,
    pub lod_0_rgba_cnt: i8,
    #[br(map = |raw: u8| raw != 0)]
    #[bw(map = |b: &bool| *b as u8)]
    pub base_only: bool,
    pub tex_cnt: i8,
    pub rgba_size: i8,
    pub rgba_verts_loc: i8,
    pub occl_index_stash: i8,
    pub msphere_cnt: u8,
    pub flags: u8,
    pub msphere_ofs: i16,
    pub light_ofs: i16,
    pub light_vert_start_off: i16,
    pub dir_lights_one: i8,
    pub dir_lights_upd: i8,
    pub point_lights: u16,
    pub cube_ofs: i16,
    pub occl_index: i16,
    pub vert_cnt: u8,
    pub tri_cnt: i8,
    pub mip_dist: i16,
}

impl Default for TfragHeader {
    fn default() -> Self {
        Self {
            center: ScaledVector3(Vector3::new(0.0, 0.0, 0.0)),
            diameter: 0.0,
            p_data: 0,
            lod_2_ofs: 0,
            shared_ofs: 0,
            lod_1_ofs: 0,
            lod_0_ofs: 0,
            tex_ofs: 0,
            rgba_ofs: 0,
            common_size: 0,
            lod_2_size: 0,
            lod_1_size: 0,
            lod_0_size: 0,
            lod_2_rgba_cnt: 0,
            lod_1_rgba_cnt: 0,
            lod_0_rgba_cnt: 0,
            base_only: false,
            tex_cnt: 0,
            rgba_size: 0,
            rgba_verts_loc: 0,
            occl_index_stash: 0,
            msphere_cnt: 0,
            flags: 0,
            msphere_ofs: 0,
            light_ofs: 0,
            light_vert_start_off: 0,
            dir_lights_one: 0,
            dir_lights_upd: 0,
            point_lights: 0,
            cube_ofs: 0,
            occl_index: 0,
            vert_cnt: 0,
            tri_cnt: 0,
            mip_dist: i16::MIN,
        }
    }
}

impl TfragHeader {
    /// Decode a def block. Extra trailing bytes are ignored.
    pub fn parse(def: &[u8]) -> Result<Self> {
        if def.len() < DEF_SIZE {
            return Err(TfragError::MalformedChunk(format!(
                "def is {} bytes, expected {:#x}",
                def.len(),
                DEF_SIZE
            )));
        }
        Ok(TfragHeader::read(&mut Cursor::new(def))?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(DEF_SIZE));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn texture_count(&self) -> usize {
        self.tex_cnt.max(0) as usize
    }

    /// Start of the per-vertex UV/index records, right after the texture descriptors.
    pub fn vertex_info_ofs(&self) -> usize {
        self.tex_ofs as usize + 0x50 * self.texture_count() + 0x1C
    }
}

/// Decode a `.tfragdef` block for inspection.
pub fn unpack_def(def: &[u8]) -> Result<TfragHeader> {
    TfragHeader::parse(def)
}
