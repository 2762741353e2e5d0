use cgmath::{InnerSpace, Vector3};

use crate::math::{mean, scale3};

/// Corner directions of the bounding cube, in the order they are stored.
pub const CUBE_AXES: [[f32; 3]; 8] = [
    [1.0, 1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, 1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, 1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, -1.0, -1.0],
];

/// Sphere centred on the mean of `points`, radius reaching the farthest point.
///
/// Not minimal, but matches what the renderer's culling data was built with.
pub fn mean_bounding_sphere(points: &[Vector3<f32>]) -> (Vector3<f32>, f32) {
    let center = mean(points.iter().copied());
    let radius = points
        .iter()
        .map(|p| (p - center).magnitude())
        .fold(0.0f32, f32::max);
    (center, radius)
}

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn from_center_size(center: Vector3<f32>, size: Vector3<f32>) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Grow the box to contain `p`.
    pub fn encapsulate(&mut self, p: Vector3<f32>) {
        self.min = Vector3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Vector3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Half of `size`.
    pub fn extents(&self) -> Vector3<f32> {
        self.size() * 0.5
    }

    pub fn contains(&self, p: Vector3<f32>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// The 8 corners `center ± half_extent`, in [`CUBE_AXES`] order.
pub fn cube_corners(center: Vector3<f32>, half_extent: Vector3<f32>) -> [Vector3<f32>; 8] {
    CUBE_AXES.map(|axis| center + scale3(half_extent, Vector3::from(axis)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_sphere_covers_all_points() {
        let points = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 4.0),
            Vector3::new(4.0, 0.0, 4.0),
            Vector3::new(8.0, 1.0, 8.0),
        ];
        let (center, radius) = mean_bounding_sphere(&points);
        assert!((center.x - 3.2).abs() < 0.001);
        for p in &points {
            assert!((p - center).magnitude() <= radius + 0.001);
        }
    }

    #[test]
    fn single_point_sphere_has_zero_radius() {
        let (center, radius) = mean_bounding_sphere(&[Vector3::new(1.0, 2.0, 3.0)]);
        assert_eq!(center, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(radius, 0.0);
    }

    #[test]
    fn encapsulate_grows_seed_box() {
        let mut aabb = Aabb::from_center_size(Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.125, 0.125, 0.125));
        assert!((aabb.extents().x - 0.0625).abs() < 1e-6);

        aabb.encapsulate(Vector3::new(2.0, -1.0, 0.0));
        assert_eq!(aabb.max.x, 2.0);
        assert_eq!(aabb.min.y, -1.0);
        assert!((aabb.min.z + 0.0625).abs() < 1e-6);
        assert!(aabb.contains(Vector3::new(1.0, -0.5, 0.0)));
    }

    #[test]
    fn cube_corners_follow_axis_order() {
        let corners = cube_corners(Vector3::new(1.0, 1.0, 1.0), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(corners[0], Vector3::new(2.0, 3.0, 4.0));
        assert_eq!(corners[1], Vector3::new(2.0, 3.0, -2.0));
        assert_eq!(corners[7], Vector3::new(0.0, -1.0, -2.0));
    }
}
