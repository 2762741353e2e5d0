// Common test utilities and helpers
#![allow(dead_code)]

use std::sync::Arc;

use cgmath::{Vector2, Vector3};
use forge_tfrag_lib::terrain::{GridHeightfield, SplatGrid, TerrainLayer};
use forge_tfrag_lib::tfrag::{Quad, QuadVertex};
use image::{Rgba, RgbaImage};

/// Flat terrain of `width × length` world units with a single splat weight everywhere.
pub fn flat_terrain(width: f32, length: f32, weights: [f32; 4], layers: usize) -> GridHeightfield {
    GridHeightfield::flat(Vector3::new(width, 1.0, length), 0.0)
        .unwrap()
        .with_splat(SplatGrid::uniform(weights))
        .with_layers((0..layers).map(|i| solid_layer(layer_color(i))).collect())
}

/// Terrain whose left half is layer 0 and right half layer 1, with a gentle slope.
pub fn split_terrain(width: f32, length: f32) -> GridHeightfield {
    let heights: Vec<f32> = (0..4).flat_map(|_| [0.0, 0.25, 0.5, 1.0]).collect();
    GridHeightfield::new(Vector3::new(width, 2.0, length), 4, 4, heights)
        .unwrap()
        .with_splat(SplatGrid::new(2, 1, vec![[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]]).unwrap())
        .with_layers(vec![solid_layer(layer_color(0)), solid_layer(layer_color(1))])
}

pub fn layer_color(i: usize) -> [u8; 4] {
    match i {
        0 => [200, 40, 40, 255],
        1 => [40, 200, 40, 255],
        2 => [40, 40, 200, 255],
        _ => [200, 200, 40, 255],
    }
}

pub fn solid_layer(color: [u8; 4]) -> TerrainLayer {
    TerrainLayer {
        diffuse: Some(Arc::new(RgbaImage::from_pixel(16, 16, Rgba(color)))),
        tint: [1.0, 1.0, 1.0, 0.0],
    }
}

pub fn corner(x: f32, z: f32, u: f32, v: f32, normal: Vector3<f32>) -> QuadVertex {
    QuadVertex {
        position: Vector3::new(x, 0.0, z),
        normal,
        color: [0.5; 4],
        uv: Vector2::new(u, v),
    }
}

/// Unit face at `(x, z)`, corners in strip order, one normal for every corner.
pub fn face_with_normal(x: f32, z: f32, normal: Vector3<f32>, texture: u32) -> Quad {
    Quad {
        corners: [
            corner(x, z + 1.0, 0.0, 1.0, normal),
            corner(x + 1.0, z + 1.0, 1.0, 1.0, normal),
            corner(x, z, 0.0, 0.0, normal),
            corner(x + 1.0, z, 1.0, 0.0, normal),
        ],
        texture,
    }
}

pub fn face(x: f32, z: f32, texture: u32) -> Quad {
    face_with_normal(x, z, Vector3::new(0.0, 1.0, 0.0), texture)
}

/// Four unit faces around `(1, 0, 1)`.
pub fn quad_2x2() -> Vec<Quad> {
    vec![face(0.0, 0.0, 0), face(1.0, 0.0, 1), face(0.0, 1.0, 2), face(1.0, 1.0, 3)]
}

pub fn read_i16(data: &[u8], ofs: usize) -> i16 {
    i16::from_le_bytes([data[ofs], data[ofs + 1]])
}

pub fn read_i32(data: &[u8], ofs: usize) -> i32 {
    i32::from_le_bytes([data[ofs], data[ofs + 1], data[ofs + 2], data[ofs + 3]])
}

pub fn read_u64(data: &[u8], ofs: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[ofs..ofs + 8]);
    u64::from_le_bytes(bytes)
}

/// Tiny deterministic generator for sweeping inputs.
pub struct Lcg(pub u64);

impl Lcg {
    pub fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    pub fn below(&mut self, n: u32) -> u32 {
        self.next_u32() % n
    }
}
