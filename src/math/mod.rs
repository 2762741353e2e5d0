use binrw::binrw;
use cgmath::{InnerSpace, Vector2, Vector3, Zero};

/// Squared distance under which two vectors compare equal.
pub const VECTOR_EPSILON_SQ: f32 = 9.999_999_4e-11;

// ============================================================================
// Fixed point vectors
// ============================================================================

/// Vector stored as three `f32`s pre-multiplied by 1024.
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct ScaledVector3(
    #[br(map = |raw: [f32; 3]| Vector3::new(raw[0], raw[1], raw[2]) / 1024.0)]
    #[bw(map = |v: &Vector3<f32>| [v.x * 1024.0, v.y * 1024.0, v.z * 1024.0])]
    pub Vector3<f32>,
);

/// Vector stored as three `i32`s in 1/1024 units (chunk centres, STROW rows).
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct Fixed32Vector3(
    #[br(map = |raw: [i32; 3]| Vector3::new(raw[0] as f32, raw[1] as f32, raw[2] as f32) / 1024.0)]
    #[bw(map = |v: &Vector3<f32>| [fixed_i32(v.x, 1024.0), fixed_i32(v.y, 1024.0), fixed_i32(v.z, 1024.0)])]
    pub Vector3<f32>,
);

/// Vector stored as three `i16`s in 1/1024 units (vertex displacements).
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct Fixed16Vector3(
    #[br(map = |raw: [i16; 3]| Vector3::new(raw[0] as f32, raw[1] as f32, raw[2] as f32) / 1024.0)]
    #[bw(map = |v: &Vector3<f32>| [fixed_i16(v.x, 1024.0), fixed_i16(v.y, 1024.0), fixed_i16(v.z, 1024.0)])]
    pub Vector3<f32>,
);

/// Vector stored as three `i16`s in 1/16 units (bounding cube corners).
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq)]
#[brw(little)]
pub struct CubeVector3(
    #[br(map = |raw: [i16; 3]| Vector3::new(raw[0] as f32, raw[1] as f32, raw[2] as f32) / 16.0)]
    #[bw(map = |v: &Vector3<f32>| [fixed_i16(v.x, 16.0), fixed_i16(v.y, 16.0), fixed_i16(v.z, 16.0)])]
    pub Vector3<f32>,
);

/// Scale and round half to even, saturating into `i32`.
pub fn fixed_i32(value: f32, scale: f32) -> i32 {
    (value * scale).round_ties_even() as i32
}

/// Scale and round half to even, saturating into `i16`.
pub fn fixed_i16(value: f32, scale: f32) -> i16 {
    (value * scale).round_ties_even() as i16
}

/// Scale and round half to even, `None` when the result leaves `i16`.
pub fn checked_fixed_i16(value: f32, scale: f32) -> Option<i16> {
    let scaled = (value * scale).round_ties_even();
    if scaled >= i16::MIN as f32 && scaled <= i16::MAX as f32 {
        Some(scaled as i16)
    } else {
        None
    }
}

/// First component of `v` that does not fit a 1/1024 `i16` displacement.
pub fn fixed16_overflow(v: Vector3<f32>) -> Option<f32> {
    [v.x, v.y, v.z]
        .into_iter()
        .find(|&c| checked_fixed_i16(c, 1024.0).is_none())
}

/// Texture coordinate in 1/4096 units. Negative values are doubled first,
/// the hardware reads the sign as an extra scale bit.
pub fn fixed_uv(value: f32) -> i16 {
    let value = if value < 0.0 { value * 2.0 } else { value };
    fixed_i16(value, 4096.0)
}

// ============================================================================
// Vector helpers
// ============================================================================

/// Y-up authoring space to the game's Z-up space (and back).
pub fn swizzle_xzy(v: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(v.x, v.z, v.y)
}

pub fn approx_eq3(a: Vector3<f32>, b: Vector3<f32>) -> bool {
    (a - b).magnitude2() < VECTOR_EPSILON_SQ
}

pub fn approx_eq2(a: Vector2<f32>, b: Vector2<f32>) -> bool {
    (a - b).magnitude2() < VECTOR_EPSILON_SQ
}

/// Snap each component to the nearest `1 / steps`.
pub fn quantize(v: Vector3<f32>, steps: f32) -> Vector3<f32> {
    Vector3::new(
        (v.x * steps).round_ties_even() / steps,
        (v.y * steps).round_ties_even() / steps,
        (v.z * steps).round_ties_even() / steps,
    )
}

pub fn mean(points: impl IntoIterator<Item = Vector3<f32>>) -> Vector3<f32> {
    let mut sum = Vector3::zero();
    let mut count = 0usize;
    for p in points {
        sum += p;
        count += 1;
    }
    if count == 0 {
        sum
    } else {
        sum / count as f32
    }
}

/// Component-wise product.
pub fn scale3(a: Vector3<f32>, b: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(a.x * b.x, a.y * b.y, a.z * b.z)
}

/// Normalise, leaving the zero vector untouched.
pub fn normalize_or_zero(v: Vector3<f32>) -> Vector3<f32> {
    let len = v.magnitude();
    if len > 0.0 {
        v / len
    } else {
        Vector3::zero()
    }
}
