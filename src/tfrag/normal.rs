use std::f32::consts::PI;

use cgmath::{InnerSpace, Vector3};

use crate::math::normalize_or_zero;

/// A vertex normal and colour in the 64-bit form the lighting block stores.
///
/// Bits 0-15 hold the normal length (`0x7FFF` = 1), 16-23 the azimuth and
/// 24-31 the elevation as signed `PI / 128` steps, 32-47 the colour as
/// 5-5-5-1. The top 16 bits are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedNormal {
    pub intensity: u16,
    pub azimuth: i8,
    pub elevation: i8,
    pub color: u16,
}

impl PackedNormal {
    pub fn pack(normal: Vector3<f32>, color: [f32; 4]) -> Self {
        let factor = normal.magnitude().clamp(0.0, 1.0);
        let n = normalize_or_zero(normal);

        Self {
            intensity: (factor * 0x7FFF as f32) as u16,
            azimuth: angle_step(n.y.atan2(n.x)),
            elevation: angle_step(n.z.clamp(-1.0, 1.0).asin()),
            color: pack_color(color),
        }
    }

    pub fn to_bits(self) -> u64 {
        self.intensity as u64
            | (self.azimuth as u8 as u64) << 16
            | (self.elevation as u8 as u64) << 24
            | (self.color as u64) << 32
    }

    pub fn from_bits(bits: u64) -> Self {
        Self {
            intensity: (bits & 0xFFFF) as u16,
            azimuth: ((bits >> 16) & 0xFF) as u8 as i8,
            elevation: ((bits >> 24) & 0xFF) as u8 as i8,
            color: ((bits >> 32) & 0xFFFF) as u16,
        }
    }

    /// Rebuild the scaled normal and colour.
    pub fn unpack(self) -> (Vector3<f32>, [f32; 4]) {
        let factor = self.intensity as f32 / 0x7FFF as f32;
        let (az_cos, az_sin) = trig(self.azimuth);
        let (el_cos, el_sin) = trig(self.elevation);
        let normal = Vector3::new(az_cos * el_cos, az_sin * el_cos, el_sin) * factor;
        (normal, unpack_color(self.color))
    }
}

/// Pack a normal and colour straight to the stored 64-bit word.
pub fn pack_normal(normal: Vector3<f32>, color: [f32; 4]) -> u64 {
    PackedNormal::pack(normal, color).to_bits()
}

pub fn unpack_normal(bits: u64) -> (Vector3<f32>, [f32; 4]) {
    PackedNormal::from_bits(bits).unpack()
}

/// Radians to the nearest signed `PI / 128` step. `PI` itself wraps to -128.
fn angle_step(radians: f32) -> i8 {
    ((radians * 128.0 / PI).round_ties_even() as i32) as i8
}

fn trig(step: i8) -> (f32, f32) {
    let a = step as f32 * PI / 128.0;
    (a.cos(), a.sin())
}

fn channel(value: f32) -> u16 {
    (value * 255.0).round_ties_even().clamp(0.0, 255.0) as u16
}

fn pack_color(c: [f32; 4]) -> u16 {
    (channel(c[0]) >> 3) | (channel(c[1]) >> 3) << 5 | (channel(c[2]) >> 3) << 10 | (channel(c[3]) >> 7) << 15
}

fn unpack_color(c: u16) -> [f32; 4] {
    [
        ((c & 0x1F) << 3) as f32 / 255.0,
        (((c >> 5) & 0x1F) << 3) as f32 / 255.0,
        (((c >> 10) & 0x1F) << 3) as f32 / 255.0,
        (((c >> 15) & 0x1) << 7) as f32 / 255.0,
    ]
}
