//! Pure transform builders
//!
//! Model matrices, their analytic inverses, quaternion construction and the
//! Euler conversions used by scene nodes. Everything here is stateless.

use super::{constants::EPSILON, Mat3, Mat4, MathError, Quat, Quaternion, Vec3};
use nalgebra::Rotation3;
use serde::{Deserialize, Serialize};

/// Order in which the elementary pitch (X), yaw (Y) and roll (Z) rotations
/// are composed
///
/// The matrix for `PitchYawRoll` is `Pitch * Yaw * Roll`, so the last named
/// rotation is the first one applied to a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EulerOrder {
    /// Pitch * Yaw * Roll
    PitchYawRoll,
    /// Pitch * Roll * Yaw
    PitchRollYaw,
    /// Yaw * Pitch * Roll
    YawPitchRoll,
    /// Yaw * Roll * Pitch
    YawRollPitch,
    /// Roll * Pitch * Yaw
    RollPitchYaw,
    /// Roll * Yaw * Pitch
    RollYawPitch,
}

impl EulerOrder {
    /// Every supported order
    pub const ALL: [EulerOrder; 6] = [
        EulerOrder::PitchYawRoll,
        EulerOrder::PitchRollYaw,
        EulerOrder::YawPitchRoll,
        EulerOrder::YawRollPitch,
        EulerOrder::RollPitchYaw,
        EulerOrder::RollYawPitch,
    ];
}

/// Translation matrix
pub fn translation_matrix(offset: &Vec3) -> Mat4 {
    Mat4::new(
        1.0, 0.0, 0.0, offset.x,
        0.0, 1.0, 0.0, offset.y,
        0.0, 0.0, 1.0, offset.z,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Non-uniform scale matrix
pub fn scale_matrix(scale: &Vec3) -> Mat4 {
    Mat4::new(
        scale.x, 0.0, 0.0, 0.0,
        0.0, scale.y, 0.0, 0.0,
        0.0, 0.0, scale.z, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation about the X axis
pub fn pitch_matrix(angle: f32) -> Mat4 {
    let (s, c) = angle.sin_cos();
    Mat4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, c, -s, 0.0,
        0.0, s, c, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation about the Y axis
pub fn yaw_matrix(angle: f32) -> Mat4 {
    let (s, c) = angle.sin_cos();
    Mat4::new(
        c, 0.0, s, 0.0,
        0.0, 1.0, 0.0, 0.0,
        -s, 0.0, c, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation about the Z axis
pub fn roll_matrix(angle: f32) -> Mat4 {
    let (s, c) = angle.sin_cos();
    Mat4::new(
        c, -s, 0.0, 0.0,
        s, c, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation matrix from a quaternion
///
/// Built as the product of the left and right multiplication matrices of the
/// quaternion. The input is normalized first; a zero quaternion yields the
/// identity.
pub fn rotation_from_quaternion(q: &Quaternion<f32>) -> Mat4 {
    let norm = q.norm();
    if norm <= EPSILON {
        return Mat4::identity();
    }
    let (w, x, y, z) = (q.w / norm, q.i / norm, q.j / norm, q.k / norm);

    let left = Mat4::new(
        w, -z, y, x,
        z, w, -x, y,
        -y, x, w, z,
        -x, -y, -z, w,
    );
    let right = Mat4::new(
        w, -z, y, -x,
        z, w, -x, -y,
        -y, x, w, -z,
        x, y, z, w,
    );
    left * right
}

/// Local-to-parent matrix: `Translate(position) * Rotate(rotation) * Scale(scale)`
pub fn model_matrix(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Mat4 {
    translation_matrix(position) * rotation_from_quaternion(rotation.quaternion()) * scale_matrix(scale)
}

/// Parent-to-local matrix: `Scale(1 / scale) * Rotate(conjugate) * Translate(-position)`
///
/// Zero scale components cannot be inverted and map to zero.
pub fn inverse_model_matrix(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Mat4 {
    let inverse_scale = scale.map(|s| if s.abs() <= EPSILON { 0.0 } else { 1.0 / s });
    scale_matrix(&inverse_scale)
        * rotation_from_quaternion(&rotation.quaternion().conjugate())
        * translation_matrix(&-position)
}

/// Half-angle quaternion `(cos(angle/2), axis * sin(angle/2))`
///
/// The axis is normalized; a zero axis gives the identity rotation.
pub fn quaternion_from_axis_angle(axis: &Vec3, angle: f32) -> Quat {
    let length = axis.norm();
    if length <= EPSILON {
        return Quat::identity();
    }
    let axis = axis / length;
    let (s, c) = (angle * 0.5).sin_cos();
    Quat::new_normalize(Quaternion::new(c, axis.x * s, axis.y * s, axis.z * s))
}

/// Compose the elementary rotations in the given order
pub fn euler_to_matrix(pitch: f32, yaw: f32, roll: f32, order: EulerOrder) -> Mat4 {
    let p = pitch_matrix(pitch);
    let y = yaw_matrix(yaw);
    let r = roll_matrix(roll);
    match order {
        EulerOrder::PitchYawRoll => p * y * r,
        EulerOrder::PitchRollYaw => p * r * y,
        EulerOrder::YawPitchRoll => y * p * r,
        EulerOrder::YawRollPitch => y * r * p,
        EulerOrder::RollPitchYaw => r * p * y,
        EulerOrder::RollYawPitch => r * y * p,
    }
}

/// Quaternion equivalent of [`euler_to_matrix`]
pub fn euler_to_quaternion(pitch: f32, yaw: f32, roll: f32, order: EulerOrder) -> Quat {
    let matrix = euler_to_matrix(pitch, yaw, roll, order);
    let basis: Mat3 = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    Quat::from_rotation_matrix(&Rotation3::from_matrix_unchecked(basis))
}

/// Reverse Euler extraction
///
/// Not supported: always returns [`MathError::NotImplemented`].
pub fn quaternion_to_euler(_rotation: &Quat, _order: EulerOrder) -> Result<(f32, f32, f32), MathError> {
    Err(MathError::NotImplemented("quaternion to Euler angle extraction"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::constants::{HALF_PI, PI};
    use approx::assert_relative_eq;

    fn sample_rotations() -> Vec<Quat> {
        vec![
            Quat::identity(),
            quaternion_from_axis_angle(&Vec3::new(1.0, 1.0, 1.0), 0.5),
            quaternion_from_axis_angle(&Vec3::new(0.0, 1.0, 0.0), HALF_PI),
            quaternion_from_axis_angle(&Vec3::new(-0.3, 0.2, 0.9), 2.4),
        ]
    }

    #[test]
    fn test_rotation_from_quaternion_matches_nalgebra() {
        for rotation in sample_rotations() {
            let ours = rotation_from_quaternion(rotation.quaternion());
            assert_relative_eq!(ours, rotation.to_homogeneous(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_rotation_from_zero_quaternion_is_identity() {
        let zero = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(rotation_from_quaternion(&zero), Mat4::identity());
    }

    #[test]
    fn test_rotation_from_unnormalized_quaternion() {
        let raw = Quaternion::new(2.0, 0.0, 2.0, 0.0);
        let expected = quaternion_from_axis_angle(&Vec3::y(), HALF_PI).to_homogeneous();
        assert_relative_eq!(rotation_from_quaternion(&raw), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_model_times_inverse_is_identity() {
        let positions = [Vec3::zeros(), Vec3::new(1.0, -2.0, 3.5), Vec3::new(-10.0, 0.25, 4.0)];
        let scales = [Vec3::new(1.0, 1.0, 1.0), Vec3::new(2.0, 0.5, 3.0), Vec3::new(-1.0, 4.0, 0.1)];

        for position in &positions {
            for rotation in sample_rotations() {
                for scale in &scales {
                    let forward = model_matrix(position, &rotation, scale);
                    let inverse = inverse_model_matrix(position, &rotation, scale);
                    assert_relative_eq!(forward * inverse, Mat4::identity(), epsilon = 1e-4);
                    assert_relative_eq!(inverse * forward, Mat4::identity(), epsilon = 1e-4);
                }
            }
        }
    }

    #[test]
    fn test_inverse_with_zero_scale_stays_finite() {
        let inverse = inverse_model_matrix(&Vec3::new(1.0, 2.0, 3.0), &Quat::identity(), &Vec3::new(0.0, 1.0, 1.0));
        assert!(inverse.iter().all(|v| v.is_finite()));
        assert_eq!(inverse[(0, 0)], 0.0);
    }

    #[test]
    fn test_axis_angle_quaternion() {
        let rotation = quaternion_from_axis_angle(&Vec3::new(0.0, 5.0, 0.0), HALF_PI);
        let rotated = rotation * Vec3::x();
        assert_relative_eq!(rotated, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);

        assert_eq!(quaternion_from_axis_angle(&Vec3::zeros(), PI), Quat::identity());
    }

    #[test]
    fn test_elementary_rotations() {
        let x = nalgebra::Vector4::new(1.0, 0.0, 0.0, 0.0);
        let y = nalgebra::Vector4::new(0.0, 1.0, 0.0, 0.0);
        assert_relative_eq!(yaw_matrix(HALF_PI) * x, nalgebra::Vector4::new(0.0, 0.0, -1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(roll_matrix(HALF_PI) * x, y, epsilon = 1e-6);
        assert_relative_eq!(pitch_matrix(HALF_PI) * y, nalgebra::Vector4::new(0.0, 0.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_euler_orders_match_quaternion_products() {
        let (pitch, yaw, roll) = (0.3, -1.1, 0.7);
        let p = quaternion_from_axis_angle(&Vec3::x(), pitch);
        let y = quaternion_from_axis_angle(&Vec3::y(), yaw);
        let r = quaternion_from_axis_angle(&Vec3::z(), roll);

        let expected = [
            (EulerOrder::PitchYawRoll, p * y * r),
            (EulerOrder::PitchRollYaw, p * r * y),
            (EulerOrder::YawPitchRoll, y * p * r),
            (EulerOrder::YawRollPitch, y * r * p),
            (EulerOrder::RollPitchYaw, r * p * y),
            (EulerOrder::RollYawPitch, r * y * p),
        ];

        for (order, quat) in expected {
            let converted = euler_to_quaternion(pitch, yaw, roll, order);
            // q and -q are the same rotation
            let dot = converted.coords.dot(&quat.coords);
            assert!(dot.abs() > 0.9999, "{order:?} mismatch: dot = {dot}");
            assert_relative_eq!(
                rotation_from_quaternion(converted.quaternion()),
                euler_to_matrix(pitch, yaw, roll, order),
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn test_orders_differ() {
        let a = euler_to_matrix(0.4, 0.8, 0.2, EulerOrder::PitchYawRoll);
        let b = euler_to_matrix(0.4, 0.8, 0.2, EulerOrder::RollYawPitch);
        assert!((a - b).norm() > 1e-3);
    }

    #[test]
    fn test_reverse_euler_not_implemented() {
        let result = quaternion_to_euler(&Quat::identity(), EulerOrder::PitchYawRoll);
        assert!(matches!(result, Err(MathError::NotImplemented(_))));
    }
}
