//! View frustum extraction and conservative AABB / sphere visibility tests.

use glam::{Mat4, Vec3, Vec4};

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Vec3,
    /// Maximum corner of the bounding box.
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// A box of the given half-extents around `center`.
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self::new(center - extents, center + extents)
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents (half-size along each axis).
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// The box enclosing this box after `transform` is applied to all eight corners.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = transform.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }
}

/// A view frustum defined by six inward-pointing planes extracted from
/// the view-projection matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    /// Six planes: left, right, bottom, top, near, far.
    /// Each `Vec4(a, b, c, d)` where `(a,b,c)` is the normalized inward
    /// normal and `d` is the signed distance term.
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a reverse-Z view-projection matrix
    /// (Griggs-Hartmann, clip depth in `[0, w]` with near at `w`).
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        // Reverse-Z: z <= w is the near side, z >= 0 the far side.
        planes[NEAR] = rows[3] - rows[2];
        planes[FAR] = rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// The six planes in left, right, bottom, top, near, far order.
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// Test whether an AABB is at least partially inside the frustum.
    ///
    /// Uses the positive-vertex test, so boxes near frustum corners may be
    /// reported visible when they are not. Visible boxes are never rejected.
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let p = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            normal.dot(p) + plane.w >= 0.0
        })
    }

    /// Test whether a sphere is at least partially inside the frustum.
    pub fn is_sphere_visible(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_camera_vp() -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            1000.0, // reverse-Z: far as near param
            0.1,    // reverse-Z: near as far param
        );
        proj * view
    }

    #[test]
    fn test_object_in_front_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -5.0), Vec3::new(1.0, 1.0, -3.0));
        assert!(frustum.is_visible(&aabb));
    }

    #[test]
    fn test_object_behind_camera_not_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, 1.0, 10.0));
        assert!(!frustum.is_visible(&aabb));
    }

    #[test]
    fn test_object_partially_in_frustum_is_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let aabb = Aabb::new(Vec3::new(-100.0, -1.0, -10.0), Vec3::new(1.0, 1.0, -5.0));
        assert!(frustum.is_visible(&aabb));
    }

    #[test]
    fn test_all_six_planes_reject() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let outside = [
            Aabb::new(Vec3::splat(10.0), Vec3::splat(20.0)),
            Aabb::new(Vec3::new(-1000.0, 0.0, -5.0), Vec3::new(-999.0, 1.0, -4.0)),
            Aabb::new(Vec3::new(999.0, 0.0, -5.0), Vec3::new(1000.0, 1.0, -4.0)),
            Aabb::new(Vec3::new(0.0, 999.0, -5.0), Vec3::new(1.0, 1000.0, -4.0)),
            Aabb::new(Vec3::new(0.0, -1000.0, -5.0), Vec3::new(1.0, -999.0, -4.0)),
            Aabb::new(Vec3::new(0.0, 0.0, -2000.0), Vec3::new(1.0, 1.0, -1500.0)),
            // Between the eye and the near plane.
            Aabb::new(Vec3::new(-0.01, -0.01, -0.05), Vec3::new(0.01, 0.01, -0.02)),
        ];
        for aabb in &outside {
            assert!(!frustum.is_visible(aabb), "{aabb:?} should be culled");
        }
    }

    #[test]
    fn test_sphere_visibility() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        assert!(frustum.is_sphere_visible(Vec3::new(0.0, 0.0, -10.0), 1.0));
        // Center behind the camera but radius reaches into the frustum.
        assert!(frustum.is_sphere_visible(Vec3::new(0.0, 0.0, 2.0), 5.0));
        assert!(!frustum.is_sphere_visible(Vec3::new(0.0, 0.0, 20.0), 5.0));
        assert!(!frustum.is_sphere_visible(Vec3::new(500.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn test_aabb_center_and_extents() {
        let aabb = Aabb::new(Vec3::new(-2.0, -3.0, -4.0), Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(aabb.center(), Vec3::ZERO);
        assert_eq!(aabb.extents(), Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_transformed_aabb_follows_translation_and_rotation() {
        let aabb = Aabb::from_center_extents(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Vec3::new(5.0, 0.0, 0.0));

        let rotated = aabb.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2));
        assert!((rotated.extents() - Vec3::new(3.0, 2.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_frustum_planes_are_normalized() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        for plane in frustum.planes() {
            let normal_len = plane.truncate().length();
            assert!(
                (normal_len - 1.0).abs() < 1e-4,
                "plane normal not normalized: {normal_len}"
            );
        }
    }
}
