//! Math utilities and types
//!
//! Provides the fundamental math types used by the scene graph and the
//! renderer, plus the pure transform and projection builders.
//!
//! Matrices follow the column-vector convention: a point is transformed as
//! `M * p`, so `A * B` applies `B` first.

pub mod projection;
pub mod transform;

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

pub use projection::{ortho_projection, persp_projection, perspective_fov, view_matrix, view_matrix_from_quaternion};
pub use transform::{
    euler_to_matrix, euler_to_quaternion, inverse_model_matrix, model_matrix,
    quaternion_from_axis_angle, quaternion_to_euler, rotation_from_quaternion, EulerOrder,
};

use thiserror::Error;

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Errors raised by the math layer
///
/// Degenerate inputs are handled in-line (zero or identity results); only
/// paths that would otherwise give a silently wrong answer report an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    /// The requested conversion has no implementation
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Local-to-parent matrix (`T * R * S`)
    pub fn to_matrix(&self) -> Mat4 {
        model_matrix(&self.position, &self.rotation, &self.scale)
    }

    /// Parent-to-local matrix, the exact inverse of [`Transform::to_matrix`]
    pub fn to_inverse_matrix(&self) -> Mat4 {
        inverse_model_matrix(&self.position, &self.rotation, &self.scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: Point3) -> Point3 {
        self.to_matrix().transform_point(&point)
    }
}

/// Homogeneous point (`w = 1`) from a 3D position
pub fn to_homogeneous_point(v: &Vec3) -> Vec4 {
    Vec4::new(v.x, v.y, v.z, 1.0)
}

/// Homogeneous direction (`w = 0`) from a 3D vector
pub fn to_homogeneous_direction(v: &Vec3) -> Vec4 {
    Vec4::new(v.x, v.y, v.z, 0.0)
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// 2 * Pi
    pub const TAU: f32 = 2.0 * PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;

    /// Threshold under which a length is treated as zero
    pub const EPSILON: f32 = 1e-6;
}

/// Math utility functions
pub mod utils {
    use super::{constants, Vec3};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }

    /// Normalize a vector, returning zero for degenerate input
    pub fn safe_normalize(v: &Vec3) -> Vec3 {
        let length = v.norm();
        if length <= constants::EPSILON {
            Vec3::zeros()
        } else {
            v / length
        }
    }

    /// Cross product normalized, zero when the inputs are parallel
    pub fn safe_cross(a: &Vec3, b: &Vec3) -> Vec3 {
        safe_normalize(&a.cross(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_matrix_inverse_pair() {
        let transform = Transform {
            position: Vec3::new(2.0, 3.0, 1.0),
            rotation: Quat::from_axis_angle(&Vec3::y_axis(), 0.785),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        let identity = transform.to_matrix() * transform.to_inverse_matrix();
        assert_relative_eq!(identity, Mat4::identity(), epsilon = 1e-5);
    }

    #[test]
    fn test_transform_point() {
        let transform = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));
        let moved = transform.transform_point(Point3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(moved, Point3::new(1.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_safe_normalize_degenerate() {
        assert_eq!(utils::safe_normalize(&Vec3::zeros()), Vec3::zeros());
        assert_eq!(utils::safe_cross(&Vec3::x(), &Vec3::x()), Vec3::zeros());
        assert_relative_eq!(utils::safe_normalize(&Vec3::new(0.0, 3.0, 4.0)), Vec3::new(0.0, 0.6, 0.8));
    }

    #[test]
    fn test_homogeneous_helpers() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(to_homogeneous_point(&v).w, 1.0);
        assert_eq!(to_homogeneous_direction(&v).w, 0.0);
    }
}
