// Math primitives used by the scene and GPU scene layers. Thin wrappers
// around `cgmath` rather than hand-rolled matrix code: cgmath's own
// `transpose()` is used everywhere a transpose is needed, so there is no
// copy-from-uninitialized-result bug to carry over from the source this
// crate was ported from.

use cgmath::{perspective, Deg, Matrix4, Point3, SquareMatrix, Vector3};

pub type Mat4 = Matrix4<f32>;
pub type Vec3 = Vector3<f32>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }
}

/// Builds a reverse-Z perspective projection: camera-near maps to NDC
/// z = 1.0, camera-far maps to NDC z = 0.0. Everything downstream
/// (depth comparisons, clear values) must agree with this convention.
pub fn reverse_z_perspective(fov_y: Deg<f32>, aspect: f32, near: f32, far: f32) -> Mat4 {
    // Standard right-handed perspective, then remap z from [-1, 1]
    // (far->1, near->-1) to reverse-Z [0, 1] (far->0, near->1).
    let standard = perspective(fov_y, aspect, near, far);
    let remap = Matrix4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, -0.5, 0.0, //
        0.0, 0.0, 0.5, 1.0,
    );
    remap * standard
}

/// Projects a camera-space point through `proj` and returns its NDC
/// coordinates (perspective divide applied).
pub fn project_point(proj: &Mat4, camera_space: Vec3) -> cgmath::Vector3<f32> {
    let clip = proj * camera_space.extend(1.0);
    cgmath::Vector3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
}

pub fn identity() -> Mat4 {
    Mat4::identity()
}

pub fn look_at(eye: Point3<f32>, target: Point3<f32>, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, target, up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Deg;

    // Scenario 4: reverse-Z projection, fovY=70, aspect=16:9, near=0.1, far=1000.
    #[test]
    fn reverse_z_near_and_far_planes() {
        let proj = reverse_z_perspective(Deg(70.0), 16.0 / 9.0, 0.1, 1000.0);

        let near_point = Vec3::new(0.0, 0.0, -0.1);
        let far_point = Vec3::new(0.0, 0.0, -1000.0);

        let near_ndc = project_point(&proj, near_point);
        let far_ndc = project_point(&proj, far_point);

        assert!((near_ndc.z - 1.0).abs() < 1e-4, "near z = {}", near_ndc.z);
        assert!((far_ndc.z - 0.0).abs() < 1e-4, "far z = {}", far_ndc.z);
    }

    #[test]
    fn depth_stays_in_unit_range() {
        let proj = reverse_z_perspective(Deg(70.0), 16.0 / 9.0, 0.1, 1000.0);
        for z in [-0.5_f32, -10.0, -250.0, -999.0] {
            let ndc = project_point(&proj, Vec3::new(0.0, 0.0, z));
            assert!(ndc.z >= -1e-4 && ndc.z <= 1.0 + 1e-4, "z={} ndc.z={}", z, ndc.z);
        }
    }
}
