use glam::{Mat3, Quat, Vec3};

use super::invert_or_zero;
use crate::{
    core::RigidBody,
    dynamics::solver::SolverBody,
    utils::math::{outer, skew},
};

/// Jacobian of the vector part of `left * q2` with respect to the relative
/// angular velocity, i.e. the lower-right block of `L(left) * R(right)`.
pub(crate) fn quaternion_jacobian(left: Quat, right: Quat) -> Mat3 {
    let pv = Vec3::new(left.x, left.y, left.z);
    let qv = Vec3::new(right.x, right.y, right.z);
    let (pw, qw) = (left.w, right.w);

    Mat3::from_diagonal(Vec3::splat(pw * qw)) - outer(pv, qv) - skew(qv) * pw + skew(pv) * qw
        - skew(pv) * skew(qv)
}

/// Relative rotation error of two bodies against the rotation recorded at creation,
/// together with its Jacobian. Both are flipped onto the short arc.
pub(crate) fn relative_rotation(initial: Quat, orientation1: Quat, orientation2: Quat) -> (Vec3, Mat3) {
    let left = initial * orientation1.conjugate();
    let relative = left * orientation2;
    let error = Vec3::new(relative.x, relative.y, relative.z);
    let jacobian = quaternion_jacobian(left, orientation2);
    if relative.w < 0.0 {
        (-error, -jacobian)
    } else {
        (error, jacobian)
    }
}

/// Locks the relative orientation of two bodies.
#[derive(Debug, Clone, Copy)]
pub struct FixedAngle {
    initial: Quat,
    pub softness: f32,
    pub bias_factor: f32,

    jacobian: Mat3,
    effective_mass: Mat3,
    bias: Vec3,
    accumulated_impulse: Vec3,
}

impl Default for FixedAngle {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedAngle {
    pub const DEFAULT_SOFTNESS: f32 = 0.001;
    pub const DEFAULT_BIAS_FACTOR: f32 = 0.2;

    pub fn new() -> Self {
        Self {
            initial: Quat::IDENTITY,
            softness: Self::DEFAULT_SOFTNESS,
            bias_factor: Self::DEFAULT_BIAS_FACTOR,
            jacobian: Mat3::ZERO,
            effective_mass: Mat3::ZERO,
            bias: Vec3::ZERO,
            accumulated_impulse: Vec3::ZERO,
        }
    }

    pub fn accumulated_impulse(&self) -> Vec3 {
        self.accumulated_impulse
    }

    pub(crate) fn initialize(&mut self, body1: &RigidBody, body2: &RigidBody) {
        self.initial = body2.orientation.conjugate() * body1.orientation;
    }

    pub(crate) fn prepare(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        let (error, jacobian) = relative_rotation(self.initial, body1.orientation, body2.orientation);
        self.jacobian = jacobian;

        let k = jacobian * (body1.inverse_inertia + body2.inverse_inertia) * jacobian.transpose()
            + Mat3::from_diagonal(Vec3::splat(self.softness * inv_dt));
        self.effective_mass = invert_or_zero(k);
        self.bias = -error * self.bias_factor * inv_dt;

        let impulse = self.jacobian.transpose() * self.accumulated_impulse;
        body1.apply_angular_impulse(impulse);
        body2.apply_angular_impulse(-impulse);
    }

    pub(crate) fn iterate(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        let jv = self.jacobian * (body1.angular_velocity - body2.angular_velocity);
        let softness = self.accumulated_impulse * self.softness * inv_dt;
        let lambda = -(self.effective_mass * (jv + self.bias + softness));

        self.accumulated_impulse += lambda;
        let impulse = self.jacobian.transpose() * lambda;
        body1.apply_angular_impulse(impulse);
        body2.apply_angular_impulse(-impulse);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rigidbody::BodyHandle;
    use approx::assert_relative_eq;

    #[test]
    fn jacobian_is_identity_at_rest() {
        let (error, jacobian) = relative_rotation(Quat::IDENTITY, Quat::IDENTITY, Quat::IDENTITY);
        assert_eq!(error, Vec3::ZERO);
        assert!(jacobian.abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }

    #[test]
    fn relative_spin_is_cancelled() {
        let body1 = RigidBody::new(BodyHandle::INVALID);
        let body2 = RigidBody::new(BodyHandle::INVALID);
        let mut fixed = FixedAngle::new();
        fixed.softness = 0.0;
        fixed.initialize(&body1, &body2);

        let mut b1 = SolverBody::fixed();
        let mut b2 = SolverBody::from_body(&body2);
        b2.angular_velocity = Vec3::new(0.0, 3.0, 0.0);
        fixed.prepare(&mut b1, &mut b2, 100.0);
        for _ in 0..10 {
            fixed.iterate(&mut b1, &mut b2, 100.0);
        }
        assert_relative_eq!(b2.angular_velocity.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn twisted_body_is_rotated_back() {
        let body1 = RigidBody::new(BodyHandle::INVALID);
        let body2 = RigidBody::new(BodyHandle::INVALID);
        let mut fixed = FixedAngle::new();
        fixed.initialize(&body1, &body2);

        let mut b1 = SolverBody::fixed();
        let mut b2 = SolverBody::from_body(&body2);
        b2.orientation = Quat::from_rotation_y(0.2);
        fixed.prepare(&mut b1, &mut b2, 100.0);
        for _ in 0..10 {
            fixed.iterate(&mut b1, &mut b2, 100.0);
        }
        assert!(b2.angular_velocity.y < 0.0);
    }
}
