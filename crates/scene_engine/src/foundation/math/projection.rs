//! View and projection matrices
//!
//! OpenGL-style clip space: the camera looks down `-Z`, and the visible depth
//! range `[-near, -far]` maps to `[-1, 1]`. Bounds are not validated; callers
//! must pass non-empty intervals.

use super::transform::{pitch_matrix, roll_matrix, rotation_from_quaternion, translation_matrix, yaw_matrix};
use super::{Mat4, Quat, Vec3};

/// Inverse camera transform from a position and `(pitch, yaw, roll)` angles
///
/// The camera model is `Translate(position) * Yaw * Pitch * Roll`; the view
/// matrix undoes it with the negated angles in reverse order.
pub fn view_matrix(position: &Vec3, angles: &Vec3) -> Mat4 {
    let (pitch, yaw, roll) = (angles.x, angles.y, angles.z);
    roll_matrix(-roll) * pitch_matrix(-pitch) * yaw_matrix(-yaw) * translation_matrix(&-position)
}

/// Inverse camera transform for a quaternion-oriented camera
pub fn view_matrix_from_quaternion(position: &Vec3, rotation: &Quat) -> Mat4 {
    rotation_from_quaternion(&rotation.quaternion().conjugate()) * translation_matrix(&-position)
}

/// Orthographic projection: scale the box to the unit cube, then center it
pub fn ortho_projection(right: f32, left: f32, top: f32, bottom: f32, near: f32, far: f32) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = far - near;
    Mat4::new(
        2.0 / width, 0.0, 0.0, -(right + left) / width,
        0.0, 2.0 / height, 0.0, -(top + bottom) / height,
        0.0, 0.0, -2.0 / depth, -(far + near) / depth,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Perspective projection: the orthographic box composed with a
/// perspective-divide matrix that keeps depth inside `[-far, -near]`
pub fn persp_projection(right: f32, left: f32, top: f32, bottom: f32, near: f32, far: f32) -> Mat4 {
    let divide = Mat4::new(
        near, 0.0, 0.0, 0.0,
        0.0, near, 0.0, 0.0,
        0.0, 0.0, near + far, near * far,
        0.0, 0.0, -1.0, 0.0,
    );
    ortho_projection(right, left, top, bottom, near, far) * divide
}

/// Symmetric perspective projection from a vertical field of view (radians)
pub fn perspective_fov(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let top = near * (fov_y * 0.5).tan();
    let right = top * aspect;
    persp_projection(right, -right, top, -top, near, far)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{constants::HALF_PI, transform::model_matrix, Vec4};
    use approx::assert_relative_eq;

    fn project(matrix: &Mat4, point: Vec4) -> Vec4 {
        let clip = matrix * point;
        clip / clip.w
    }

    #[test]
    fn test_ortho_maps_box_to_unit_cube() {
        let ortho = ortho_projection(4.0, -2.0, 3.0, -1.0, 0.5, 10.0);
        assert_relative_eq!(project(&ortho, Vec4::new(4.0, 3.0, -0.5, 1.0)), Vec4::new(1.0, 1.0, -1.0, 1.0), epsilon = 1e-5);
        assert_relative_eq!(project(&ortho, Vec4::new(-2.0, -1.0, -10.0, 1.0)), Vec4::new(-1.0, -1.0, 1.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_persp_matches_frustum_form() {
        let (r, l, t, b, n, f) = (1.5_f32, -0.5_f32, 1.0_f32, -1.0_f32, 0.1_f32, 100.0_f32);
        let expected = Mat4::new(
            2.0 * n / (r - l), 0.0, (r + l) / (r - l), 0.0,
            0.0, 2.0 * n / (t - b), (t + b) / (t - b), 0.0,
            0.0, 0.0, -(f + n) / (f - n), -2.0 * f * n / (f - n),
            0.0, 0.0, -1.0, 0.0,
        );
        assert_relative_eq!(persp_projection(r, l, t, b, n, f), expected, epsilon = 1e-4);
    }

    #[test]
    fn test_persp_depth_range() {
        let persp = perspective_fov(HALF_PI, 16.0 / 9.0, 1.0, 50.0);
        let near = project(&persp, Vec4::new(0.0, 0.0, -1.0, 1.0));
        let far = project(&persp, Vec4::new(0.0, 0.0, -50.0, 1.0));
        assert_relative_eq!(near.z, -1.0, epsilon = 1e-5);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_view_matrix_undoes_camera_model() {
        let position = Vec3::new(3.0, -1.0, 7.0);
        let angles = Vec3::new(0.3, 1.2, -0.4);
        let camera = translation_matrix(&position)
            * yaw_matrix(angles.y)
            * pitch_matrix(angles.x)
            * roll_matrix(angles.z);

        assert_relative_eq!(view_matrix(&position, &angles) * camera, Mat4::identity(), epsilon = 1e-5);
    }

    #[test]
    fn test_quaternion_view_matrix() {
        let position = Vec3::new(0.0, 2.0, 5.0);
        let rotation = Quat::from_axis_angle(&Vec3::y_axis(), 0.7);
        let camera = model_matrix(&position, &rotation, &Vec3::new(1.0, 1.0, 1.0));

        assert_relative_eq!(view_matrix_from_quaternion(&position, &rotation) * camera, Mat4::identity(), epsilon = 1e-5);
    }
}
