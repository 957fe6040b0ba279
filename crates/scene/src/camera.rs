//! Camera parameters consumed by the renderer.

use glam::{Mat4, Vec3};

/// A perspective camera as exposed by a [`Scene`](crate::Scene).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParams {
    /// Camera position in world space
    pub position: Vec3,
    /// Viewing direction (need not be normalized)
    pub direction: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            fov_y: 45.0_f32.to_radians(),
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl CameraParams {
    /// Camera at `position` looking towards `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            direction: target - position,
            ..Self::default()
        }
    }

    /// Get the normalized forward direction.
    ///
    /// Falls back to `-Z` when `direction` is zero.
    pub fn forward(&self) -> Vec3 {
        self.direction.try_normalize().unwrap_or(Vec3::NEG_Z)
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.forward();
        // World up is degenerate when looking straight up or down
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        Mat4::look_to_rh(self.position, forward, up)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_view_matrix_moves_camera_to_origin() {
        let camera = CameraParams::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let eye = camera.view_matrix() * Vec4::new(0.0, 0.0, 5.0, 1.0);
        assert!(eye.truncate().length() < 1e-5);
    }

    #[test]
    fn test_target_is_in_front() {
        let camera = CameraParams::looking_at(Vec3::new(3.0, 2.0, 1.0), Vec3::ZERO);
        let target = camera.view_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // Right-handed view space looks down -Z
        assert!(target.z < 0.0);
    }

    #[test]
    fn test_vertical_direction_does_not_produce_nan() {
        let camera = CameraParams {
            direction: Vec3::NEG_Y,
            ..CameraParams::default()
        };
        assert!(!camera.view_matrix().is_nan());
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = CameraParams::default();
        let proj = camera.projection_matrix(16.0 / 9.0);
        let reference = Mat4::perspective_rh(camera.fov_y, 16.0 / 9.0, camera.near, camera.far);
        assert!(proj.y_axis.y < 0.0);
        assert_eq!(proj.y_axis.y, -reference.y_axis.y);
        assert_eq!(proj.x_axis.x, reference.x_axis.x);
    }

    #[test]
    fn test_view_projection_composes() {
        let camera = CameraParams::looking_at(Vec3::new(2.0, 1.0, 4.0), Vec3::ZERO);
        let expected = camera.projection_matrix(1.5) * camera.view_matrix();
        assert_eq!(camera.view_projection_matrix(1.5), expected);
    }

    #[test]
    fn test_zero_direction_falls_back() {
        let camera = CameraParams {
            direction: Vec3::ZERO,
            ..CameraParams::default()
        };
        assert_eq!(camera.forward(), Vec3::NEG_Z);
    }
}
