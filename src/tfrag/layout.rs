use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use tracing::debug;

use super::{ChunkShape, TfragHeader};
use crate::error::{Result, TfragError};

// ============================================================================
// Per-shape layouts
// ============================================================================

/// Where each patched region of a shape's data block lives.
///
/// The header values are the shape's fixed def fields; the packer fills in
/// the sphere and mip distance.
#[derive(Debug, Clone)]
pub struct ChunkLayout {
    pub shape: ChunkShape,
    pub header: TfragHeader,
    /// Offsets of the per-LOD tristrip index lists.
    pub strip_offsets: &'static [usize],
    /// Offsets of the STROW rows holding each LOD's chunk centre.
    pub lod_position_offsets: &'static [usize],
    /// Length of the data block.
    pub data_len: usize,
}

const STRIPS_2X2: &[usize] = &[0x1C, 0x2F4];
const LOD_POSITIONS_2X2: &[usize] = &[0x260, 0x314];
const STRIPS_1X2: &[usize] = &[0x1C, 0x254];
const LOD_POSITIONS_1X2: &[usize] = &[0x170, 0x204];

impl ChunkLayout {
    pub fn for_shape(shape: ChunkShape) -> Self {
        match shape {
            ChunkShape::Quad2x2 => Self {
                shape,
                header: TfragHeader {
                    lod_2_ofs: 0,
                    shared_ofs: 0x50,
                    lod_1_ofs: 0x2C0,
                    lod_0_ofs: 0x310,
                    tex_ofs: 0x80,
                    rgba_ofs: 0x380,
                    common_size: 0x27,
                    lod_2_size: 0x2C,
                    lod_1_size: 0x2E,
                    lod_0_size: 0x07,
                    lod_2_rgba_cnt: 0x0C,
                    lod_1_rgba_cnt: 0x0C,
                    lod_0_rgba_cnt: 0x0C,
                    base_only: true,
                    tex_cnt: 4,
                    rgba_size: 3,
                    rgba_verts_loc: 0x1E,
                    msphere_cnt: 4,
                    flags: 1,
                    msphere_ofs: 0x410,
                    light_ofs: 0x3B0,
                    light_vert_start_off: 0x278,
                    dir_lights_one: -1,
                    point_lights: 0xFFFF,
                    cube_ofs: 0x450,
                    vert_cnt: 9,
                    tri_cnt: 8,
                    ..Default::default()
                },
                strip_offsets: STRIPS_2X2,
                lod_position_offsets: LOD_POSITIONS_2X2,
                data_len: 0x490,
            },
            ChunkShape::Quad1x2 | ChunkShape::Quad1x1 => {
                let single = shape == ChunkShape::Quad1x1;
                Self {
                    shape,
                    header: TfragHeader {
                        lod_2_ofs: 0,
                        shared_ofs: 0x40,
                        lod_1_ofs: 0x1C0,
                        lod_0_ofs: 0x200,
                        tex_ofs: 0x70,
                        rgba_ofs: 0x260,
                        common_size: 0x18,
                        lod_2_size: 0x1C,
                        lod_1_size: 0x1E,
                        lod_0_size: 0x06,
                        lod_2_rgba_cnt: 0x08,
                        lod_1_rgba_cnt: 0x08,
                        lod_0_rgba_cnt: 0x08,
                        base_only: true,
                        tex_cnt: if single { 1 } else { 2 },
                        rgba_size: 2,
                        rgba_verts_loc: 0x14,
                        msphere_cnt: if single { 1 } else { 2 },
                        flags: 1,
                        msphere_ofs: 0x2C0,
                        light_ofs: 0x280,
                        light_vert_start_off: 0x188,
                        dir_lights_one: -1,
                        point_lights: 0xFFFF,
                        cube_ofs: 0x2E0,
                        vert_cnt: if single { 4 } else { 6 },
                        tri_cnt: if single { 2 } else { 4 },
                        ..Default::default()
                    },
                    // the single quad shape rides on the 1x2 packet
                    strip_offsets: STRIPS_1X2,
                    lod_position_offsets: LOD_POSITIONS_1X2,
                    data_len: 0x320,
                }
            }
        }
    }

    /// Base vertices (unique positions) a chunk of this shape stores.
    pub fn expected_base_vertices(&self) -> usize {
        self.header.vert_cnt as usize
    }

    /// Every `(name, start, len)` the packer may write, sized for the worst case
    /// of four distinct ordered vertices per quad.
    pub fn regions(&self) -> Vec<(&'static str, usize, usize)> {
        let h = &self.header;
        let quads = self.shape.quad_count();
        let verts = h.vert_cnt as usize;
        let max_ordered = quads * 4;

        let mut regions = vec![
            ("cube", h.cube_ofs as usize, 8 * 8),
            ("light centre", h.light_ofs as usize, 12),
            ("normals", h.light_ofs as usize + 0x10, 8 * verts),
            ("vertex colours", h.rgba_ofs as usize, 4 * verts),
            ("mspheres", h.msphere_ofs as usize, 0x10 * h.msphere_cnt as usize),
            ("displacements", h.light_vert_start_off as usize, 6 * verts),
            ("vertex info", h.vertex_info_ofs(), 8 * max_ordered),
        ];
        for &ofs in self.strip_offsets {
            regions.push(("tristrip", ofs, max_ordered));
        }
        for &ofs in self.lod_position_offsets {
            regions.push(("lod position", ofs, 12));
        }
        for i in 0..h.texture_count() {
            regions.push(("texture descriptor", h.tex_ofs as usize + 0x50 * i, 0x28));
        }
        regions
    }

    /// Check every region fits a buffer of `len` bytes.
    pub fn validate(&self, len: usize) -> Result<()> {
        for (region, start, size) in self.regions() {
            let end = start + size;
            if end > len {
                return Err(TfragError::TemplateOverflow {
                    shape: self.shape,
                    region,
                    end,
                    len,
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Templates
// ============================================================================

/// A layout plus the base bytes a chunk is patched from.
#[derive(Debug, Clone)]
pub struct ChunkTemplate {
    layout: ChunkLayout,
    base: Vec<u8>,
}

impl ChunkTemplate {
    /// Pair `base` with `layout`, rejecting buffers the layout would overrun.
    pub fn new(layout: ChunkLayout, base: Vec<u8>) -> Result<Self> {
        layout.validate(base.len())?;
        Ok(Self { layout, base })
    }

    /// Zero-filled buffer of the layout's length.
    pub fn zeroed(shape: ChunkShape) -> Result<Self> {
        let layout = ChunkLayout::for_shape(shape);
        let base = vec![0u8; layout.data_len];
        Self::new(layout, base)
    }

    /// Template decoded from the captured reference packet for `shape`.
    pub fn reference(shape: ChunkShape) -> Result<Self> {
        let encoded = match shape {
            ChunkShape::Quad2x2 => REFERENCE_DATA_2X2,
            ChunkShape::Quad1x2 | ChunkShape::Quad1x1 => REFERENCE_DATA_1X2,
        };
        let base = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| TfragError::InvalidTemplate {
                shape,
                message: e.to_string(),
            })?;
        let layout = ChunkLayout::for_shape(shape);
        if base.len() != layout.data_len {
            return Err(TfragError::InvalidTemplate {
                shape,
                message: format!("decoded {:#x} bytes, layout expects {:#x}", base.len(), layout.data_len),
            });
        }
        Self::new(layout, base)
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub fn base(&self) -> &[u8] {
        &self.base
    }
}

/// One validated template per shape, built once and shared read-only.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    quad_1x1: ChunkTemplate,
    quad_1x2: ChunkTemplate,
    quad_2x2: ChunkTemplate,
}

impl TemplateSet {
    /// Templates from the captured reference packets.
    pub fn reference() -> Result<Self> {
        debug!("decoding reference tfrag templates");
        Ok(Self {
            quad_1x1: ChunkTemplate::reference(ChunkShape::Quad1x1)?,
            quad_1x2: ChunkTemplate::reference(ChunkShape::Quad1x2)?,
            quad_2x2: ChunkTemplate::reference(ChunkShape::Quad2x2)?,
        })
    }

    /// Zero-filled templates generated from the layouts alone.
    pub fn zeroed() -> Result<Self> {
        Ok(Self {
            quad_1x1: ChunkTemplate::zeroed(ChunkShape::Quad1x1)?,
            quad_1x2: ChunkTemplate::zeroed(ChunkShape::Quad1x2)?,
            quad_2x2: ChunkTemplate::zeroed(ChunkShape::Quad2x2)?,
        })
    }

    pub fn get(&self, shape: ChunkShape) -> &ChunkTemplate {
        match shape {
            ChunkShape::Quad1x1 => &self.quad_1x1,
            ChunkShape::Quad1x2 => &self.quad_1x2,
            ChunkShape::Quad2x2 => &self.quad_2x2,
        }
    }
}

/// Reference VIF packet for a 2x2 chunk (0x490 bytes).
const REFERENCE_DATA_2X2: &str = "AAAAMDUAAAA1AAAANQAAADUAAAABAAAFRcAEbgABAgMJBAoFBgcLDA0IDg8AAAAFSYAFboQAAACEAAUAhAAKAIQADwAA////AAAAAAAAAAAAwAVtCQAHAAAAAAAAAAAAHQA1AD4ARQBFAEUARQBFAEUARQBFAEUASQAJAAmAFGwCAAAAAAAAAAYAAAAAAAAAd/8AAAQAAAAUAAAAAAAARQAAAAAAAAAACAAAAAAAAAAAAAAAAAAAADQAAAAAAAAAAAAAAAAAAAA2AAAAAAAAAAMAAAAAAAAABgAAAAAAAAB3/wAABAAAABQAAAAAAABFAAAAAAAAAAAIAAAAAAAAAAAAAAAAAAAANAAAAAAAAAAAAAAAAAAAADYAAAAAAAAAEQAAAAAAAAAGAAAAAAAAAHf/AAAEAAAAFAAAAAAAAEUBAAAAAQAAAAgAAAAAAAAAAAAAAAAAAAA0AAAAAAAAAAAAAAAAAAAANgAAAAAAAAAMAAAAAAAAAAYAAAAAAAAAd/8AAAQAAAAUAAAAAAAARQAAAAABAAAACAAAAAAAAAAAAAAAAAAAADQAAAAAAAAAAAAAAAAAAAA2AAAAAAAAAAAAADAAAABFAAAARQAAAAAdAAAAAQAABTWAEG0AEAAAABAAAAAgAAAAEAIAABAAEAAQBAAAIAAQABAGAAAQAAAAEAgAABAAEAAQCgAAAAAAABAMAAAQAAAAEA4AABAAAAAQEAAAAAAAABACAAAAABAAEAYAAAAAEAAQAAAAEAAQABACAAAAAAAAEA4AAAAAEAAQAgAAEAAQABAIAAAAADDdCAYAAR0IAOmaAQAAAAAAAgEAAR2ACWn/H+z/1f/0/+7/1f8gIBYg7P8WAAcg1f/z3+3/1f8Y4PQf1f/pH+zfpADe/+vfXP/g3+vf1f8AAAQEAAEAAAAFAAAAAAAAAABJgAVuhAAAAIQABQCEAAoAhAAPAAD///8AAAAwNQAAADUAAAA1AAAANQAAAAEAAAVFwARuAAECAwkECgUGBwsMDQgODwAAAAAAAAAAAAAAAAAAADDdCAYAAR0IAOmaAQAAAAAAAgEAAQAAAAAAAAAAAAAABQQEAAFJgAVuhAAAAIQABQCEAAoAhAAPAAD///8AAAAwNQAAADUAAAA1AAAANQAAAAEAAAVFwARuAAECAwkECgUGBwsMDQgODwAAAAVDRTuANzkxgDs+NIBXWk2ARUg9gE9RRYAvMSqAODsygFFUR4AAAAAAAAAAAAAAAADdCAYAAR0IAOmaAQAAAAAAAHqBPgidAAADeYpA5pgAAAN9ej/nmAAAA3qPQGqlAAADeilAKJ0AAAN6oEBJoQAAA31aPcWUAAADeD0+55gAAAN5OT1KoQAAAAAAAAAAAADrHMNINdACSflkzUe+Fv8CQxy/SLPPAklQX81Hthb/A4cZw0jUzgBJCkHNR6wW/xHtGL9I3M4ASVBfzUeoFv8Mohf1IGsGAACkGPUgbgYAAKMX8x9vBgAApBjzH28GAACjF/QgawYAAKQY9SBpBgAAoxfzH2kGAACkGPMfaQYAAA==";

/// Reference VIF packet shared by the 1x2 and 1x1 chunks (0x320 bytes).
const REFERENCE_DATA_1X2: &str = "AAAAMCMAAAAjAAAAIwAAACMAAAABAAAFK8ACbgABAgMEBQYHAAAABS2AA26EAAAAhAAFAAD///8AAAAAAAAAAADABW0GAAIAAAAAAAAAAAATACMAKQArACsAKwArACsAKwArACsAKwAtAAkACYAKbBEAAAAAAAAABgAAAAAAAAB3/wAABAAAABQAAAAAAABFAQAAAAEAAAAIAAAAAAAAAAAAAAAAAAAANAAAAAAAAAAAAAAAAAAAADYAAAAAAAAAEwAAAAAAAAAGAAAAAAAAAHf/AAAEAAAAFAAAAAAAAEUBAAAAAQAAAAgAAAAAAAAAAAAAAAAAAAA0AAAAAAAAAAAAAAAAAAAANgAAAAAAAAAAAAAwAAAARQAAAEUAAAAAEwAAAAEAAAUjgAhtAAAAAAAQAAAAEAAAABACAAAAABAAEAQAABAAEAAQBgAAAAAAABAIAAAQAAAAEAoAAAAAEAAQAAAAEAAQABACAAAAADBSGQcA69wHAJymAQAAAAAAAgEAAROABmkfEAkAhf4K8AUAiAEeEAsgaP0J8AUgSv77DwTglwLh7/XfnwEEBAABAAAABQAAAAAAAAAAAAAAAC2AA26EAAAAhAAFAAD///8AAAAwIwAAACMAAAAjAAAAIwAAAAEAAAUrwAJuAAECAwQFBgcAAAAAAAAAAAAAAAAAAAAwUhkHAOvcBwCcpgEAAAAAAAIBAAEAAAAAAAAAAAAAAAUEBAABLYADboQAAACEAAUAAP///wAAADAjAAAAIwAAACMAAAAjAAAAAQAABSvAAm4AAQIDBAUGBwAAAAU4OjGAS05DgC4wKYA0Ni6AOjwzgExPRIAAAAAAAAAAAFIZBwDr3AcAnKYBAAAAAAAAfy0855gAAAN/WTspoQAAA4AyOcWUAAADe1c3xpQAAAOAOTrnmAAAA31IOSmhAADGLONIYp79SDUK00fBFv8RSCrjSFid+UhYV9NHyhb/E4AczR+ZBgAAphzzHqUGAAAkHPQfpQYAACQc8x6lBgAAphz1H5AGAACmHJQfkAYAACQc9B+QBgAAJRzzHqEGAAA=";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_templates_decode_to_layout_length() {
        let set = TemplateSet::reference().unwrap();
        assert_eq!(set.get(ChunkShape::Quad2x2).base().len(), 0x490);
        assert_eq!(set.get(ChunkShape::Quad1x2).base().len(), 0x320);
        assert_eq!(set.get(ChunkShape::Quad1x1).base().len(), 0x320);
    }

    #[test]
    fn zeroed_templates_validate() {
        let set = TemplateSet::zeroed().unwrap();
        for shape in ChunkShape::ALL {
            let template = set.get(shape);
            assert!(template.base().iter().all(|&b| b == 0));
            assert_eq!(template.layout().shape, shape);
        }
    }

    #[test]
    fn short_buffer_is_rejected_at_construction() {
        let layout = ChunkLayout::for_shape(ChunkShape::Quad2x2);
        let err = ChunkTemplate::new(layout, vec![0u8; 0x440]).unwrap_err();
        match err {
            TfragError::TemplateOverflow { shape, region, end, len } => {
                assert_eq!(shape, ChunkShape::Quad2x2);
                assert_eq!(region, "cube");
                assert_eq!(end, 0x490);
                assert_eq!(len, 0x440);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cube_is_the_last_region_of_each_layout() {
        for shape in ChunkShape::ALL {
            let layout = ChunkLayout::for_shape(shape);
            let end = layout.header.cube_ofs as usize + 0x40;
            assert_eq!(end, layout.data_len, "{shape}");
            let max_end = layout.regions().iter().map(|(_, s, l)| s + l).max().unwrap();
            assert_eq!(max_end, layout.data_len, "{shape}");
        }
    }

    #[test]
    fn single_quad_layout_differs_only_in_counts() {
        let one = ChunkLayout::for_shape(ChunkShape::Quad1x1);
        let two = ChunkLayout::for_shape(ChunkShape::Quad1x2);
        assert_eq!(one.header.tex_cnt, 1);
        assert_eq!(one.header.vert_cnt, 4);
        assert_eq!(one.header.tri_cnt, 2);
        assert_eq!(one.header.msphere_cnt, 1);
        assert_eq!(one.header.tex_ofs, two.header.tex_ofs);
        assert_eq!(one.strip_offsets, two.strip_offsets);
        assert_eq!(one.expected_base_vertices(), 4);
        assert_eq!(two.expected_base_vertices(), 6);
    }
}
