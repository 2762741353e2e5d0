// Chunk packer behaviour through the public API

use cgmath::{InnerSpace, Matrix4, Vector3};
use forge_tfrag_lib::tfrag::normal::unpack_normal;
use forge_tfrag_lib::tfrag::{
    pack, set_texture_indices, transform_chunk, unpack_def, ChunkShape, PackOptions, TemplateSet, DEF_SIZE,
};
use forge_tfrag_lib::TfragError;

#[path = "common/mod.rs"]
mod common;

use common::{face, face_with_normal, quad_2x2, read_i16, read_i32, read_u64};

#[test]
fn packing_twice_is_byte_identical() {
    for templates in [TemplateSet::zeroed().unwrap(), TemplateSet::reference().unwrap()] {
        let a = pack(&quad_2x2(), &templates, &PackOptions::default()).unwrap();
        let b = pack(&quad_2x2(), &templates, &PackOptions::default()).unwrap();
        assert_eq!(a.def, b.def);
        assert_eq!(a.data, b.data);
        assert_eq!(a.def.len(), DEF_SIZE);
    }
}

#[test]
fn base_vertex_counts_per_shape() {
    let templates = TemplateSet::zeroed().unwrap();
    let cases = [
        (vec![face(0.0, 0.0, 0)], ChunkShape::Quad1x1, 4),
        (vec![face(0.0, 0.0, 0), face(1.0, 0.0, 0)], ChunkShape::Quad1x2, 6),
        (vec![face(0.0, 0.0, 0), face(0.0, 1.0, 0)], ChunkShape::Quad1x2, 6),
        (quad_2x2(), ChunkShape::Quad2x2, 9),
    ];
    for (quads, shape, verts) in cases {
        let chunk = pack(&quads, &templates, &PackOptions::default()).unwrap();
        assert_eq!(chunk.shape, shape);
        assert_eq!(chunk.header().unwrap().vert_cnt as usize, verts);
    }
}

#[test]
fn scattered_quads_are_a_vertex_count_mismatch() {
    let templates = TemplateSet::zeroed().unwrap();
    let quads = vec![face(0.0, 0.0, 0), face(3.0, 0.0, 0), face(0.0, 3.0, 0), face(3.0, 3.0, 0)];
    let err = pack(&quads, &templates, &PackOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        TfragError::VertexCountMismatch {
            shape: ChunkShape::Quad2x2,
            expected: 9,
            actual: 16
        }
    ));

    let err = pack(&[], &templates, &PackOptions::default()).unwrap_err();
    assert!(matches!(err, TfragError::UnsupportedShape { quads: 0 }));
}

#[test]
fn pinwheel_centre_normal_is_the_mean() {
    let normals = [
        Vector3::new(-0.3, 1.0, -0.2).normalize(),
        Vector3::new(0.4, 1.0, -0.1).normalize(),
        Vector3::new(-0.2, 1.0, 0.3).normalize(),
        Vector3::new(0.1, 1.0, 0.5).normalize(),
    ];
    let quads = vec![
        face_with_normal(0.0, 0.0, normals[0], 0),
        face_with_normal(1.0, 0.0, normals[1], 1),
        face_with_normal(0.0, 1.0, normals[2], 2),
        face_with_normal(1.0, 1.0, normals[3], 3),
    ];
    let chunk = pack(&quads, &TemplateSet::zeroed().unwrap(), &PackOptions::default()).unwrap();
    let header = chunk.header().unwrap();
    assert_eq!(header.vert_cnt, 9);

    // the shared corner sits on the chunk centre, so its displacement is zero
    let centre = (0..9)
        .find(|&i| {
            let ofs = header.light_vert_start_off as usize + 6 * i;
            (0..3).all(|c| read_i16(&chunk.data, ofs + 2 * c) == 0)
        })
        .unwrap();

    let mean = (normals[0] + normals[1] + normals[2] + normals[3]) / 4.0;
    // stored Z-up
    let expected = Vector3::new(mean.x, mean.z, mean.y);
    let bits = read_u64(&chunk.data, header.light_ofs as usize + 0x10 + 8 * centre);
    let (normal, color) = unpack_normal(bits);

    let tolerance = std::f32::consts::PI / 128.0;
    assert!((normal - expected).magnitude() < tolerance, "{normal:?} vs {expected:?}");
    for c in color.iter().take(3) {
        assert!((c - 0.5).abs() <= 8.0 / 255.0);
    }
}

#[test]
fn post_processing_returns_new_chunks() {
    let templates = TemplateSet::reference().unwrap();
    let chunk = pack(&quad_2x2(), &templates, &PackOptions::default()).unwrap();
    let original = chunk.clone();

    let remapped = set_texture_indices(&chunk, &[7, 8, 9, 10]).unwrap();
    assert_eq!(chunk, original);
    let header = remapped.header().unwrap();
    for (i, id) in [7, 8, 9, 10].into_iter().enumerate() {
        assert_eq!(read_i32(&remapped.data, header.tex_ofs as usize + 0x50 * i), id);
    }

    let moved = transform_chunk(&remapped, &Matrix4::from_translation(Vector3::new(10.0, 0.0, -4.0))).unwrap();
    let before = unpack_def(&remapped.def).unwrap();
    let after = unpack_def(&moved.def).unwrap();
    assert!((after.center.0.x - before.center.0.x - 10.0).abs() < 0.01);
    assert!((after.center.0.z - before.center.0.z + 4.0).abs() < 0.01);
    assert!((after.diameter - before.diameter).abs() < 0.001);

    let err = set_texture_indices(&chunk, &[1]).unwrap_err();
    assert!(matches!(err, TfragError::TextureCountMismatch { expected: 4, actual: 1 }));
}

#[test]
fn options_reach_the_def_header() {
    let options = PackOptions {
        clamp_u: false,
        clamp_v: true,
        mip_distance: 300,
    };
    let chunk = pack(&[face(0.0, 0.0, 0)], &TemplateSet::zeroed().unwrap(), &options).unwrap();
    let header = unpack_def(&chunk.def).unwrap();
    assert_eq!(header.mip_dist, 300);
    assert_eq!(read_i32(&chunk.data, header.tex_ofs as usize + 0x20), 0);
    assert_eq!(read_i32(&chunk.data, header.tex_ofs as usize + 0x24), 1);
}
