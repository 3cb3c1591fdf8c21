// src/camera.rs
// Camera state and derived matrices consumed by ray generation.
// This provides the view classification the sampling backend needs to
// select its ray-generation mode.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Ray-generation mode for a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    Perspective,
    Orthographic,
    Equirectangular,
}

/// A camera plus the derived matrices the sampling backend reads.
///
/// `world` is the camera-to-world transform; `inverse_projection` maps
/// clip space back to camera space. Both are recomputed by the
/// constructors and by `update`.
#[derive(Debug, Clone, Copy)]
pub struct CameraView {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub world: Mat4,
    pub inverse_projection: Mat4,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl CameraView {
    pub fn perspective(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let mut view = Self {
            position,
            target,
            up,
            projection: Projection::Perspective,
            world: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            fov_y,
            aspect,
            near,
            far,
        };
        view.update();
        view
    }

    pub fn orthographic(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        half_height: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let mut view = Self {
            position,
            target,
            up,
            projection: Projection::Orthographic,
            world: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            // half_height doubles as fov storage for ortho cameras
            fov_y: half_height,
            aspect,
            near,
            far,
        };
        view.update();
        view
    }

    /// 360-degree camera; the projection matrix is unused by
    /// equirectangular ray generation but kept valid for compositing.
    pub fn equirectangular(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let mut view = Self {
            position,
            target,
            up,
            projection: Projection::Equirectangular,
            world: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            fov_y: std::f32::consts::FRAC_PI_2,
            aspect: 2.0,
            near: 0.1,
            far: 1000.0,
        };
        view.update();
        view
    }

    /// Recompute `world` and `inverse_projection` after mutating the
    /// position/target/up fields.
    pub fn update(&mut self) {
        let view = Mat4::look_at_rh(self.position, self.target, self.up);
        self.world = view.inverse();
        let proj = match self.projection {
            Projection::Perspective | Projection::Equirectangular => {
                Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
            }
            Projection::Orthographic => {
                let h = self.fov_y;
                let w = h * self.aspect;
                Mat4::orthographic_rh(-w, w, -h, h, self.near, self.far)
            }
        };
        self.inverse_projection = proj.inverse();
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.update();
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Camera-space right axis in world space, used by multi-view
    /// derivation to offset synthetic views along the baseline.
    pub fn right(&self) -> Vec3 {
        self.world.x_axis.truncate().normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_matrix_places_camera_at_position() {
        let cam = CameraView::perspective(
            Vec3::new(3.0, 2.0, 3.0),
            Vec3::ZERO,
            Vec3::Y,
            45f32.to_radians(),
            4.0 / 3.0,
            0.1,
            100.0,
        );
        let origin = cam.world.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(3.0, 2.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn inverse_projection_round_trips() {
        let cam = CameraView::perspective(
            Vec3::ZERO,
            Vec3::NEG_Z,
            Vec3::Y,
            60f32.to_radians(),
            1.0,
            0.1,
            50.0,
        );
        let proj = cam.inverse_projection.inverse();
        let p = glam::Vec4::new(0.3, -0.2, 0.5, 1.0);
        let back = cam.inverse_projection * (proj * p);
        let back = back / back.w;
        assert!((back.truncate() - p.truncate()).length() < 1e-4);
    }
}
