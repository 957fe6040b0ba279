//! Light records.
//!
//! Each type is a std140 array element: `vec3` members are followed by a
//! scalar or explicit padding so the renderer copies slices of them into the
//! light blocks byte for byte.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Light arriving from one direction everywhere, like the sun.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DirectionalLight {
    /// Unit vector the light travels along.
    pub direction: Vec3,
    pub _pad0: f32,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::NEG_Y, Vec3::ONE, 1.0)
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            _pad0: 0.0,
            color,
            intensity,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    pub position: Vec3,
    /// Distance at which the contribution reaches zero.
    pub radius: f32,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 10.0, Vec3::ONE, 1.0)
    }
}

impl PointLight {
    pub fn new(position: Vec3, radius: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            radius,
            color,
            intensity,
        }
    }
}

/// A cone of light. Full intensity inside the inner cone, fading to zero at
/// the outer one.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SpotLight {
    pub position: Vec3,
    pub range: f32,
    /// Unit cone axis.
    pub direction: Vec3,
    pub _pad0: f32,
    pub color: Vec3,
    pub intensity: f32,
    /// Cosines of the cone half-angles, `inner_cutoff >= outer_cutoff`.
    pub inner_cutoff: f32,
    pub outer_cutoff: f32,
    pub _pad1: [f32; 2],
}

impl Default for SpotLight {
    fn default() -> Self {
        Self::new(
            Vec3::ZERO,
            Vec3::NEG_Y,
            Vec3::ONE,
            1.0,
            10.0,
            25.0_f32.to_radians(),
            37.0_f32.to_radians(),
        )
    }
}

impl SpotLight {
    /// Creates a spot light from cone half-angles in radians.
    pub fn new(
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        range: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        Self {
            position,
            range,
            direction: direction.normalize_or_zero(),
            _pad0: 0.0,
            color,
            intensity,
            inner_cutoff: inner_angle.cos(),
            outer_cutoff: outer_angle.max(inner_angle).cos(),
            _pad1: [0.0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std140_sizes() {
        assert_eq!(std::mem::size_of::<DirectionalLight>(), 32);
        assert_eq!(std::mem::size_of::<PointLight>(), 32);
        assert_eq!(std::mem::size_of::<SpotLight>(), 64);
    }

    #[test]
    fn test_directional_direction_normalized() {
        let light = DirectionalLight::new(Vec3::new(0.0, -4.0, 0.0), Vec3::ONE, 2.0);
        assert_eq!(light.direction, Vec3::NEG_Y);
    }

    #[test]
    fn test_spot_cutoffs_ordered() {
        let light = SpotLight::default();
        assert!(light.inner_cutoff > light.outer_cutoff);

        // An outer angle smaller than the inner one collapses onto it
        let narrow = SpotLight::new(Vec3::ZERO, Vec3::Z, Vec3::ONE, 1.0, 5.0, 0.5, 0.2);
        assert_eq!(narrow.inner_cutoff, narrow.outer_cutoff);
    }
}
