// Camera - projection and view matrices
//
// World space is left-handed with +y pointing down and +z into the screen.
// Clip depth runs from 0 at the near plane to 1 at the far plane.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Projection and view matrices for one viewpoint
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    /// Orthographic box; `top` is the smaller y because y points down
    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        // glam is y-up, so its "bottom" is our top
        self.projection = Mat4::orthographic_lh(left, right, top, bottom, near, far);
    }

    /// # Panics
    /// If `aspect` is not positive.
    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        assert!(aspect > f32::EPSILON, "aspect ratio must be positive, got {aspect}");
        self.projection = Mat4::perspective_lh(fov_y, aspect, near, far);
    }

    /// Look along `direction` from `position`. `Vec3::Y` is the usual `up`
    /// for this y-down world.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        self.view = Mat4::look_to_lh(position, direction, up);
    }

    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// View from Tait-Bryan angles applied in Y, X, Z order
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let orientation = Quat::from_euler(EulerRot::YXZ, rotation.y, rotation.x, rotation.z);
        self.view = Mat4::from_quat(orientation.inverse()) * Mat4::from_translation(-position);
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection_view(&self) -> Mat4 {
        self.projection * self.view
    }
}
