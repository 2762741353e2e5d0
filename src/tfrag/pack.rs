use std::io::{Cursor, Seek, SeekFrom};

use binrw::BinWrite;
use cgmath::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::normal::pack_normal;
use super::{ChunkShape, Quad, TemplateSet, TfragChunk};
use crate::error::{Result, TfragError};
use crate::math::{
    approx_eq2, approx_eq3, fixed16_overflow, fixed_uv, mean, quantize, swizzle_xzy, CubeVector3, Fixed16Vector3, Fixed32Vector3,
    ScaledVector3,
};
use crate::mesh_processing::bounds::{cube_corners, mean_bounding_sphere, Aabb};

/// Default vertex colour table entry (mid grey, half alpha).
const DEFAULT_RGBA: u32 = 0x8080_8080;
/// Per-vertex `q` word written after each UV pair (1.0 in 4.12 fixed point).
const VERTEX_Q: u16 = 0x1000;
/// Side of the seed box the bounding cube grows from.
const SEED_BOX_SIZE: f32 = 1.0 / 8.0;

/// Per-chunk values that come from material overrides rather than geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    pub clamp_u: bool,
    pub clamp_v: bool,
    pub mip_distance: i16,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            clamp_u: true,
            clamp_v: true,
            mip_distance: i16::MIN,
        }
    }
}

// ============================================================================
// Vertex tables
// ============================================================================

/// A unique position shared by every quad corner that sits on it.
#[derive(Debug, Clone)]
struct BaseVertex {
    position: Vector3<f32>,
    normal_sum: Vector3<f32>,
    color_sum: [f32; 4],
    count: u32,
}

impl BaseVertex {
    fn add(&mut self, normal: Vector3<f32>, color: [f32; 4]) {
        self.normal_sum += normal;
        for (sum, c) in self.color_sum.iter_mut().zip(color) {
            *sum += c;
        }
        self.count += 1;
    }

    fn normal(&self) -> Vector3<f32> {
        self.normal_sum / self.count as f32
    }

    fn color(&self) -> [f32; 4] {
        self.color_sum.map(|c| c / self.count as f32)
    }
}

/// A distinct (position, uv, normal) combination as drawn by the strips.
#[derive(Debug, Clone)]
struct OrderedVertex {
    position: Vector3<f32>,
    normal: Vector3<f32>,
    uv: Vector2<f32>,
    base: usize,
}

#[derive(Debug, Default)]
struct VertexTables {
    base: Vec<BaseVertex>,
    ordered: Vec<OrderedVertex>,
    quads: Vec<[usize; 4]>,
}

impl VertexTables {
    /// Two passes over the quad corners: first one ordered vertex per unique
    /// position, then one per remaining (position, uv, normal) combination,
    /// folding each extra combination's normal and colour into its base.
    fn build(quads: &[Quad]) -> Self {
        let mut tables = Self::default();

        for quad in quads {
            for corner in &quad.corners {
                let position = swizzle_xzy(corner.position);
                if tables.find_base(position).is_some() {
                    continue;
                }
                let normal = swizzle_xzy(corner.normal);
                let base = tables.base.len();
                tables.base.push(BaseVertex {
                    position,
                    normal_sum: normal,
                    color_sum: corner.color,
                    count: 1,
                });
                tables.ordered.push(OrderedVertex {
                    position,
                    normal,
                    uv: corner.uv,
                    base,
                });
            }
        }

        for quad in quads {
            let mut ordered_quad = [0usize; 4];
            for (slot, corner) in ordered_quad.iter_mut().zip(&quad.corners) {
                let position = swizzle_xzy(corner.position);
                let normal = swizzle_xzy(corner.normal);
                let existing = tables.ordered.iter().position(|v| {
                    approx_eq3(v.position, position) && approx_eq2(v.uv, corner.uv) && approx_eq3(v.normal, normal)
                });
                *slot = match existing {
                    Some(index) => index,
                    None => {
                        // every position got a base vertex in the first pass
                        let base = tables.find_base(position).unwrap_or_default();
                        tables.base[base].add(normal, corner.color);
                        tables.ordered.push(OrderedVertex {
                            position,
                            normal,
                            uv: corner.uv,
                            base,
                        });
                        tables.ordered.len() - 1
                    }
                };
            }
            tables.quads.push(ordered_quad);
        }

        tables
    }

    fn find_base(&self, position: Vector3<f32>) -> Option<usize> {
        self.base.iter().position(|b| approx_eq3(b.position, position))
    }
}

// ============================================================================
// Packing
// ============================================================================

/// Pack 1, 2 or 4 quads into a chunk patched from the matching template.
///
/// The template is cloned; `templates` is never modified.
pub fn pack(quads: &[Quad], templates: &TemplateSet, options: &PackOptions) -> Result<TfragChunk> {
    let shape = ChunkShape::from_quad_count(quads.len())?;
    let template = templates.get(shape);
    let layout = template.layout();
    let mut header = layout.header.clone();

    let tables = VertexTables::build(quads);
    let expected = layout.expected_base_vertices();
    if tables.base.len() != expected {
        return Err(TfragError::VertexCountMismatch {
            shape,
            expected,
            actual: tables.base.len(),
        });
    }

    let ordered_positions: Vec<Vector3<f32>> = tables.ordered.iter().map(|v| v.position).collect();
    let (sphere_center, sphere_radius) = mean_bounding_sphere(&ordered_positions);

    let mut bounds = Aabb::from_center_size(sphere_center, Vector3::new(SEED_BOX_SIZE, SEED_BOX_SIZE, SEED_BOX_SIZE));
    for &p in &ordered_positions {
        bounds.encapsulate(p);
    }
    let center = quantize(bounds.center(), 1024.0);

    for (vertex, base) in tables.base.iter().enumerate() {
        if let Some(value) = fixed16_overflow(base.position - center) {
            return Err(TfragError::DisplacementOverflow { shape, vertex, value });
        }
    }

    let mut data = Cursor::new(template.base().to_vec());

    for (i, corner) in cube_corners(center, bounds.extents()).into_iter().enumerate() {
        seek(&mut data, header.cube_ofs as usize + i * 8)?;
        CubeVector3(corner).write(&mut data)?;
    }

    seek(&mut data, header.light_ofs as usize)?;
    Fixed32Vector3(center).write(&mut data)?;

    seek(&mut data, header.rgba_ofs as usize)?;
    for _ in 0..header.vert_cnt {
        DEFAULT_RGBA.write_le(&mut data)?;
    }

    for (i, quad) in tables.quads.iter().take(header.msphere_cnt as usize).enumerate() {
        let quad_center = mean(quad.iter().map(|&v| tables.ordered[v].position));
        seek(&mut data, header.msphere_ofs as usize + 0x10 * i)?;
        ScaledVector3(quad_center).write(&mut data)?;
    }

    for &strip_ofs in layout.strip_offsets {
        seek(&mut data, strip_ofs)?;
        for quad in &tables.quads {
            for &v in quad {
                (v as u8).write_le(&mut data)?;
            }
        }
    }

    for &lod_ofs in layout.lod_position_offsets {
        seek(&mut data, lod_ofs)?;
        Fixed32Vector3(center).write(&mut data)?;
    }

    seek(&mut data, header.light_vert_start_off as usize)?;
    for base in &tables.base {
        Fixed16Vector3(base.position - center).write(&mut data)?;
    }

    for (i, base) in tables.base.iter().enumerate() {
        seek(&mut data, header.light_ofs as usize + 0x10 + 8 * i)?;
        pack_normal(base.normal(), base.color()).write_le(&mut data)?;
    }

    seek(&mut data, header.vertex_info_ofs())?;
    for vertex in &tables.ordered {
        fixed_uv(vertex.uv.x).write_le(&mut data)?;
        fixed_uv(1.0 - vertex.uv.y).write_le(&mut data)?;
        VERTEX_Q.write_le(&mut data)?;
        ((vertex.base * 2) as i16).write_le(&mut data)?;
    }

    for i in 0..header.texture_count() {
        seek(&mut data, header.tex_ofs as usize + 0x50 * i + 0x20)?;
        (options.clamp_u as i32).write_le(&mut data)?;
        (options.clamp_v as i32).write_le(&mut data)?;
    }

    header.center = ScaledVector3(sphere_center);
    header.diameter = sphere_radius * 2.0;
    header.mip_dist = options.mip_distance;

    debug!(
        "packed {} chunk: {} base / {} ordered vertices, radius {:.3}",
        shape,
        tables.base.len(),
        tables.ordered.len(),
        sphere_radius
    );

    Ok(TfragChunk {
        shape,
        def: header.to_bytes()?,
        data: data.into_inner(),
    })
}

fn seek(cursor: &mut Cursor<Vec<u8>>, offset: usize) -> Result<()> {
    cursor.seek(SeekFrom::Start(offset as u64))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tfrag::{QuadVertex, TfragHeader, DEF_SIZE};

    fn corner(x: f32, z: f32, u: f32, v: f32) -> QuadVertex {
        QuadVertex {
            position: Vector3::new(x, 0.0, z),
            normal: Vector3::new(0.0, 1.0, 0.0),
            color: [0.5; 4],
            uv: Vector2::new(u, v),
        }
    }

    /// Unit face at `(x, z)`, corners in strip order.
    fn face(x: f32, z: f32, texture: u32) -> Quad {
        Quad {
            corners: [
                corner(x, z + 1.0, 0.0, 1.0),
                corner(x + 1.0, z + 1.0, 1.0, 1.0),
                corner(x, z, 0.0, 0.0),
                corner(x + 1.0, z, 1.0, 0.0),
            ],
            texture,
        }
    }

    fn read_i32(data: &[u8], ofs: usize) -> i32 {
        i32::from_le_bytes([data[ofs], data[ofs + 1], data[ofs + 2], data[ofs + 3]])
    }

    fn read_i16(data: &[u8], ofs: usize) -> i16 {
        i16::from_le_bytes([data[ofs], data[ofs + 1]])
    }

    #[test]
    fn single_face_builds_four_base_vertices() {
        let tables = VertexTables::build(&[face(0.0, 0.0, 0)]);
        assert_eq!(tables.base.len(), 4);
        assert_eq!(tables.ordered.len(), 4);
        assert_eq!(tables.quads, vec![[0, 1, 2, 3]]);
    }

    #[test]
    fn shared_edge_adds_ordered_vertices_only_for_new_uvs() {
        let tables = VertexTables::build(&[face(0.0, 0.0, 0), face(1.0, 0.0, 1)]);
        assert_eq!(tables.base.len(), 6);
        // the shared edge has u = 1 on one face and u = 0 on the other
        assert_eq!(tables.ordered.len(), 8);
        let shared = tables.find_base(Vector3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(tables.base[shared].count, 2);
    }

    #[test]
    fn ordered_vertices_keep_base_positions_first() {
        let tables = VertexTables::build(&[face(0.0, 0.0, 0), face(1.0, 0.0, 1)]);
        for (i, v) in tables.ordered.iter().take(tables.base.len()).enumerate() {
            assert_eq!(v.base, i);
        }
    }

    #[test]
    fn pack_writes_def_and_keeps_template_length() {
        let templates = TemplateSet::zeroed().unwrap();
        let chunk = pack(&[face(0.0, 0.0, 0)], &templates, &PackOptions::default()).unwrap();
        assert_eq!(chunk.shape, ChunkShape::Quad1x1);
        assert_eq!(chunk.def.len(), DEF_SIZE);
        assert_eq!(chunk.data.len(), 0x320);

        let header = TfragHeader::parse(&chunk.def).unwrap();
        assert_eq!(header.vert_cnt, 4);
        assert_eq!(header.mip_dist, i16::MIN);
        // swizzled centre: x = 0.5, y = z_authoring = 0.5, z = height = 0
        assert!((header.center.0.x - 0.5).abs() < 0.001);
        assert!((header.center.0.y - 0.5).abs() < 0.001);
        assert!(header.center.0.z.abs() < 0.001);
        assert!((header.diameter - 2.0f32.sqrt()).abs() < 0.001);
    }

    #[test]
    fn clamp_flags_follow_options() {
        let templates = TemplateSet::zeroed().unwrap();
        let options = PackOptions {
            clamp_u: true,
            clamp_v: false,
            mip_distance: 64,
        };
        let chunk = pack(&[face(0.0, 0.0, 0), face(1.0, 0.0, 0)], &templates, &options).unwrap();
        let header = chunk.header().unwrap();
        for i in 0..2 {
            let ofs = header.tex_ofs as usize + 0x50 * i + 0x20;
            assert_eq!(read_i32(&chunk.data, ofs), 1);
            assert_eq!(read_i32(&chunk.data, ofs + 4), 0);
        }
        assert_eq!(header.mip_dist, 64);
    }

    #[test]
    fn uv_records_flip_v_and_store_doubled_base_index() {
        let templates = TemplateSet::zeroed().unwrap();
        let chunk = pack(&[face(0.0, 0.0, 0)], &templates, &PackOptions::default()).unwrap();
        let header = chunk.header().unwrap();
        let ofs = header.vertex_info_ofs();
        // first ordered vertex: uv (0, 1) -> stored (0, 0)
        assert_eq!(read_i16(&chunk.data, ofs), 0);
        assert_eq!(read_i16(&chunk.data, ofs + 2), 0);
        assert_eq!(u16::from_le_bytes([chunk.data[ofs + 4], chunk.data[ofs + 5]]), VERTEX_Q);
        assert_eq!(read_i16(&chunk.data, ofs + 6), 0);
        // second: uv (1, 1) -> (4096, 0), base 1
        assert_eq!(read_i16(&chunk.data, ofs + 8), 4096);
        assert_eq!(read_i16(&chunk.data, ofs + 14), 2);
    }

    /// 4×4 face whose far edge sits `step` units above the near edge.
    fn cliff(step: f32) -> Quad {
        let mut quad = face(0.0, 0.0, 0);
        for (i, c) in quad.corners.iter_mut().enumerate() {
            c.position.x *= 4.0;
            c.position.z *= 4.0;
            if i < 2 {
                c.position.y = step;
            }
        }
        quad
    }

    #[test]
    fn cliff_past_displacement_range_is_rejected() {
        let templates = TemplateSet::zeroed().unwrap();
        let err = pack(&[cliff(80.0)], &templates, &PackOptions::default()).unwrap_err();
        match err {
            TfragError::DisplacementOverflow { shape, vertex, value } => {
                assert_eq!(shape, ChunkShape::Quad1x1);
                assert_eq!(vertex, 0);
                assert!((value - 40.0).abs() < 0.001, "{value}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cliff_inside_displacement_range_keeps_its_height() {
        let templates = TemplateSet::zeroed().unwrap();
        let chunk = pack(&[cliff(30.0)], &templates, &PackOptions::default()).unwrap();
        let header = chunk.header().unwrap();
        for i in 0..4 {
            let ofs = header.light_vert_start_off as usize + 6 * i;
            let stored: Vec<i16> = (0..3).map(|c| read_i16(&chunk.data, ofs + 2 * c)).collect();
            assert!(stored.iter().any(|v| v.abs() == 15 * 1024), "{stored:?}");
        }
    }

    #[test]
    fn three_quads_are_rejected() {
        let templates = TemplateSet::zeroed().unwrap();
        let quads = [face(0.0, 0.0, 0), face(1.0, 0.0, 0), face(2.0, 0.0, 0)];
        let err = pack(&quads, &templates, &PackOptions::default()).unwrap_err();
        assert!(matches!(err, TfragError::UnsupportedShape { quads: 3 }));
    }

    #[test]
    fn disjoint_pair_is_a_vertex_count_mismatch() {
        let templates = TemplateSet::zeroed().unwrap();
        let quads = [face(0.0, 0.0, 0), face(5.0, 5.0, 0)];
        let err = pack(&quads, &templates, &PackOptions::default()).unwrap_err();
        match err {
            TfragError::VertexCountMismatch { shape, expected, actual } => {
                assert_eq!(shape, ChunkShape::Quad1x2);
                assert_eq!(expected, 6);
                assert_eq!(actual, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
