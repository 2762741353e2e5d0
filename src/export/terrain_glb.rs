//! glTF view of a converted terrain: the face mesh with one primitive per
//! baked texture, textures embedded as PNG in the binary buffer.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use gltf::json as gltf;
use gltf::{
    accessor::{ComponentType, GenericComponentType},
    validation::{Checked, USize64},
};
use serde_json::value::RawValue;

use super::glb::write_glb;
use crate::terrain::{ConversionResult, MaterialOverrides, RenderState};
use crate::texture_pipeline::converter;

const GENERATOR: &str = "forge-tfrag";

fn align4(bin: &mut Vec<u8>) {
    let pad = (4 - (bin.len() % 4)) % 4;
    bin.extend(std::iter::repeat(0u8).take(pad));
}

/// Append 4-byte scalars, returning (offset, byte_length).
fn append_data<T: bytemuck::Pod>(bin: &mut Vec<u8>, data: &[T]) -> (usize, usize) {
    align4(bin);
    let offset = bin.len();
    let bytes: &[u8] = bytemuck::cast_slice(data);
    bin.extend_from_slice(bytes);
    (offset, bytes.len())
}

struct Builder {
    bin: Vec<u8>,
    buffer_views: Vec<gltf::buffer::View>,
    accessors: Vec<gltf::Accessor>,
}

impl Builder {
    fn view(&mut self, offset: usize, len: usize, target: Option<gltf::buffer::Target>, name: String) -> u32 {
        let index = self.buffer_views.len() as u32;
        self.buffer_views.push(gltf::buffer::View {
            buffer: gltf::Index::new(0),
            byte_length: USize64(len as u64),
            byte_offset: Some(USize64(offset as u64)),
            target: target.map(Checked::Valid),
            byte_stride: None,
            extensions: None,
            extras: None,
            name: Some(name),
        });
        index
    }

    #[allow(clippy::too_many_arguments)]
    fn accessor<T: bytemuck::Pod>(
        &mut self,
        data: &[T],
        count: usize,
        component: ComponentType,
        type_: gltf::accessor::Type,
        target: gltf::buffer::Target,
        bounds: Option<(serde_json::Value, serde_json::Value)>,
        name: &str,
    ) -> u32 {
        let (offset, len) = append_data(&mut self.bin, data);
        let view = self.view(offset, len, Some(target), format!("{name}_view"));
        let (min, max) = match bounds {
            Some((min, max)) => (Some(min), Some(max)),
            None => (None, None),
        };
        let index = self.accessors.len() as u32;
        self.accessors.push(gltf::Accessor {
            buffer_view: Some(gltf::Index::new(view)),
            byte_offset: Some(USize64(0)),
            component_type: Checked::Valid(GenericComponentType(component)),
            count: USize64(count as u64),
            type_: Checked::Valid(type_),
            min,
            max,
            name: Some(format!("{name}_accessor")),
            normalized: false,
            sparse: None,
            extensions: None,
            extras: None,
        });
        index
    }
}

/// Build the glTF JSON and binary buffer for a converted terrain.
///
/// Materials use the overrides as a viewer draws them under `render`.
pub fn build_terrain_glb(
    result: &ConversionResult,
    overrides: &MaterialOverrides,
    render: RenderState,
) -> Result<(String, Vec<u8>)> {
    let mesh = &result.mesh;
    if mesh.submeshes.is_empty() {
        return Err(anyhow!("Terrain mesh has no faces"));
    }
    let shown = render.apply(overrides);

    let mut b = Builder {
        bin: Vec::new(),
        buffer_views: vec![],
        accessors: vec![],
    };
    let vertex_count = mesh.vertices.len();

    let positions: Vec<f32> = mesh.vertices.iter().flat_map(|v| [v.x, v.y, v.z]).collect();
    let mut pos_min = [f32::MAX; 3];
    let mut pos_max = [f32::MIN; 3];
    for v in &mesh.vertices {
        for (c, value) in [v.x, v.y, v.z].into_iter().enumerate() {
            pos_min[c] = pos_min[c].min(value);
            pos_max[c] = pos_max[c].max(value);
        }
    }
    let pos_acc = b.accessor(
        &positions,
        vertex_count,
        ComponentType::F32,
        gltf::accessor::Type::Vec3,
        gltf::buffer::Target::ArrayBuffer,
        Some((serde_json::to_value(pos_min)?, serde_json::to_value(pos_max)?)),
        "position",
    );

    let normals: Vec<f32> = mesh.normals.iter().flat_map(|n| [n.x, n.y, n.z]).collect();
    let norm_acc = b.accessor(
        &normals,
        vertex_count,
        ComponentType::F32,
        gltf::accessor::Type::Vec3,
        gltf::buffer::Target::ArrayBuffer,
        None,
        "normal",
    );

    // baked images store v = 1 in row 0, glTF puts v = 0 there
    let uvs: Vec<f32> = mesh.uvs.iter().flat_map(|uv| [uv.x, 1.0 - uv.y]).collect();
    let uv_acc = b.accessor(
        &uvs,
        vertex_count,
        ComponentType::F32,
        gltf::accessor::Type::Vec2,
        gltf::buffer::Target::ArrayBuffer,
        None,
        "uv",
    );

    let wrap = |clamp: bool| {
        if clamp {
            gltf::texture::WrappingMode::ClampToEdge
        } else {
            gltf::texture::WrappingMode::Repeat
        }
    };
    let samplers = vec![gltf::texture::Sampler {
        mag_filter: Some(Checked::Valid(gltf::texture::MagFilter::Linear)),
        min_filter: Some(Checked::Valid(gltf::texture::MinFilter::Linear)),
        wrap_s: Checked::Valid(wrap(shown.clamp_u)),
        wrap_t: Checked::Valid(wrap(shown.clamp_v)),
        name: Some("terrain_sampler".into()),
        extensions: None,
        extras: None,
    }];

    let mut images = vec![];
    let mut textures = vec![];
    let mut materials = vec![];
    let mut primitives = vec![];

    for (i, submesh) in mesh.submeshes.iter().enumerate() {
        let png = converter::encode_png(&submesh.texture.image)?;
        align4(&mut b.bin);
        let img_offset = b.bin.len();
        b.bin.extend_from_slice(&png);
        let img_view = b.view(img_offset, png.len(), None, format!("texture_{i}_image_view"));

        images.push(gltf::Image {
            buffer_view: Some(gltf::Index::new(img_view)),
            mime_type: Some(gltf::image::MimeType("image/png".to_string())),
            uri: None,
            name: Some(submesh.texture.name.clone()),
            extensions: None,
            extras: None,
        });
        textures.push(gltf::Texture {
            sampler: Some(gltf::Index::new(0)),
            source: gltf::Index::new(i as u32),
            name: Some(format!("texture_{i}")),
            extensions: None,
            extras: None,
        });

        materials.push(gltf::Material {
            alpha_cutoff: None,
            alpha_mode: Checked::Valid(if shown.tint[3] < 1.0 {
                gltf::material::AlphaMode::Blend
            } else {
                gltf::material::AlphaMode::Opaque
            }),
            double_sided: false,
            pbr_metallic_roughness: gltf::material::PbrMetallicRoughness {
                base_color_factor: gltf::material::PbrBaseColorFactor(shown.tint),
                base_color_texture: Some(gltf::texture::Info {
                    index: gltf::Index::new(i as u32),
                    tex_coord: 0,
                    extensions: None,
                    extras: None,
                }),
                metallic_factor: gltf::material::StrengthFactor(0.0),
                roughness_factor: gltf::material::StrengthFactor(1.0),
                metallic_roughness_texture: None,
                extensions: None,
                extras: None,
            },
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            emissive_factor: gltf::material::EmissiveFactor([0.0, 0.0, 0.0]),
            extensions: None,
            extras: None,
            name: Some(format!("terrain_material_{i}")),
        });

        let idx_acc = b.accessor(
            &submesh.triangles,
            submesh.triangles.len(),
            ComponentType::U32,
            gltf::accessor::Type::Scalar,
            gltf::buffer::Target::ElementArrayBuffer,
            None,
            &format!("submesh_{i}_index"),
        );

        let mut attributes = BTreeMap::new();
        attributes.insert(Checked::Valid(gltf::mesh::Semantic::Positions), gltf::Index::new(pos_acc));
        attributes.insert(Checked::Valid(gltf::mesh::Semantic::Normals), gltf::Index::new(norm_acc));
        attributes.insert(Checked::Valid(gltf::mesh::Semantic::TexCoords(0)), gltf::Index::new(uv_acc));

        primitives.push(gltf::mesh::Primitive {
            attributes,
            indices: Some(gltf::Index::new(idx_acc)),
            material: Some(gltf::Index::new(i as u32)),
            mode: Checked::Valid(gltf::mesh::Mode::Triangles),
            targets: None,
            extensions: None,
            extras: None,
        });
    }

    let gltf_mesh = gltf::Mesh {
        name: Some("terrain".into()),
        primitives,
        weights: None,
        extensions: None,
        extras: None,
    };

    let nodes = vec![gltf::Node {
        mesh: Some(gltf::Index::new(0)),
        name: Some("terrain_mesh".into()),
        ..Default::default()
    }];

    let scene_extras = serde_json::json!({
        "terrain_hash": result.hash.to_string(),
        "coordinate_system": "y_up",
        "faces_per_row": mesh.grid.faces_per_row,
        "faces_per_column": mesh.grid.faces_per_column,
        "chunk_count": result.chunks.len(),
    });
    let scene = gltf::Scene {
        nodes: vec![gltf::Index::new(0)],
        name: Some("TerrainScene".into()),
        extensions: None,
        extras: Some(RawValue::from_string(serde_json::to_string(&scene_extras)?)?),
    };

    let buffer = gltf::Buffer {
        byte_length: USize64(b.bin.len() as u64),
        extensions: None,
        extras: None,
        name: Some("terrain_buffer".into()),
        uri: None,
    };

    let root = gltf::Root {
        asset: gltf::Asset {
            version: "2.0".into(),
            generator: Some(GENERATOR.into()),
            ..Default::default()
        },
        nodes,
        scenes: vec![scene],
        scene: Some(gltf::Index::new(0)),
        accessors: b.accessors,
        buffers: vec![buffer],
        buffer_views: b.buffer_views,
        meshes: vec![gltf_mesh],
        materials,
        images,
        textures,
        samplers,
        ..Default::default()
    };

    let gltf_json = serde_json::to_string(&root)?;
    Ok((gltf_json, b.bin))
}

/// Build and write `path` as a GLB.
pub fn export_terrain_glb(
    result: &ConversionResult,
    overrides: &MaterialOverrides,
    render: RenderState,
    path: &Path,
) -> Result<()> {
    let (json, bin) = build_terrain_glb(result, overrides, render)?;
    write_glb(&json, &bin, path)
}
