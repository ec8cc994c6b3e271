//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Quat, Vec3};

/// Integrates an angular velocity (radians/sec) over `dt` into a rotation delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-6 {
        return Quat::IDENTITY;
    }
    Quat::from_axis_angle(angular.normalize(), angle)
}

/// Inertia tensor of a solid capsule aligned with the local Y axis.
///
/// `half_length` is the half length of the cylindrical section only.
pub fn inertia_capsule(radius: f32, half_length: f32, mass: f32) -> Mat3 {
    let cylinder_volume = std::f32::consts::PI * radius * radius * 2.0 * half_length;
    let sphere_volume = 4.0 / 3.0 * std::f32::consts::PI * radius.powi(3);
    let total = cylinder_volume + sphere_volume;
    if total <= f32::EPSILON {
        return Mat3::ZERO;
    }
    let cylinder_mass = mass * cylinder_volume / total;
    let sphere_mass = mass - cylinder_mass;
    let height = 2.0 * half_length;

    let axial = 0.5 * cylinder_mass * radius * radius + 0.4 * sphere_mass * radius * radius;
    let lateral = cylinder_mass * (3.0 * radius * radius + height * height) / 12.0
        + sphere_mass * (0.4 * radius * radius + half_length * half_length + 0.75 * radius * half_length);

    Mat3::from_diagonal(Vec3::new(lateral, axial, lateral))
}

/// Inertia tensor of a solid cylinder aligned with the local Y axis.
pub fn inertia_cylinder(radius: f32, half_height: f32, mass: f32) -> Mat3 {
    let height = 2.0 * half_height;
    let lateral = mass * (3.0 * radius * radius + height * height) / 12.0;
    Mat3::from_diagonal(Vec3::new(lateral, 0.5 * mass * radius * radius, lateral))
}

/// Shifts an inertia tensor about the center of mass to a point at `offset`.
pub fn parallel_axis(inertia: Mat3, mass: f32, offset: Vec3) -> Mat3 {
    let d2 = offset.length_squared();
    inertia + (Mat3::from_diagonal(Vec3::splat(d2)) - outer(offset, offset)) * mass
}

pub fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Cross-product matrix: `skew(a) * b == a.cross(b)`.
pub fn skew(a: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, a.z, -a.y),
        Vec3::new(-a.z, 0.0, a.x),
        Vec3::new(a.y, -a.x, 0.0),
    )
}

/// Two unit tangents completing `normal` to a right-handed orthonormal basis.
pub fn tangent_basis(normal: Vec3) -> (Vec3, Vec3) {
    let helper = if normal.x.abs() > 0.577 { Vec3::Y } else { Vec3::X };
    let t1 = normal.cross(helper).normalize_or(Vec3::Z);
    let t2 = normal.cross(t1);
    (t1, t2)
}

/// World inverse inertia `R * I⁻¹ * Rᵀ`.
pub fn rotate_inertia(inverse_inertia_local: Mat3, orientation: Quat) -> Mat3 {
    let rotation = Mat3::from_quat(orientation);
    rotation * inverse_inertia_local * rotation.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tangent_basis_is_orthonormal() {
        for normal in [Vec3::X, -Vec3::Y, Vec3::new(1.0, 2.0, -3.0).normalize()] {
            let (t1, t2) = tangent_basis(normal);
            assert_relative_eq!(t1.length(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(t2.length(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(t1.dot(normal), 0.0, epsilon = 1e-5);
            assert_relative_eq!(t2.dot(t1), 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn skew_matches_cross_product() {
        let a = Vec3::new(0.3, -1.0, 2.0);
        let b = Vec3::new(4.0, 0.5, -0.25);
        let expected = a.cross(b);
        let actual = skew(a) * b;
        assert_relative_eq!(actual.x, expected.x, epsilon = 1e-5);
        assert_relative_eq!(actual.y, expected.y, epsilon = 1e-5);
        assert_relative_eq!(actual.z, expected.z, epsilon = 1e-5);
    }

    #[test]
    fn parallel_axis_adds_md2_off_axis() {
        let base = Mat3::from_diagonal(Vec3::ONE);
        let shifted = parallel_axis(base, 2.0, Vec3::new(0.0, 3.0, 0.0));
        assert_relative_eq!(shifted.x_axis.x, 1.0 + 18.0, epsilon = 1e-4);
        assert_relative_eq!(shifted.y_axis.y, 1.0, epsilon = 1e-4);
    }
}
