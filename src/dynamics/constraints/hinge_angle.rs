use glam::{Mat3, Quat, Vec3};

use super::{fixed_angle::relative_rotation, invert_or_zero, AngularLimit};
use crate::{core::RigidBody, dynamics::solver::SolverBody, utils::math::tangent_basis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitState {
    Inactive,
    Upper,
    Lower,
}

/// Removes the two rotational degrees of freedom perpendicular to a hinge
/// axis and optionally limits the rotation about it.
#[derive(Debug, Clone, Copy)]
pub struct HingeAngle {
    axis: Vec3,
    initial: Quat,
    /// Rows of the projection onto (tangent, bitangent, hinge axis) in the frame of body 2.
    projection: Mat3,
    pub limit: AngularLimit,
    pub softness: f32,
    pub bias_factor: f32,

    jacobian: Mat3,
    effective_mass: Mat3,
    bias: Vec3,
    state: LimitState,
    accumulated_impulse: Vec3,
}

impl HingeAngle {
    pub const DEFAULT_SOFTNESS: f32 = 0.001;
    pub const DEFAULT_BIAS_FACTOR: f32 = 0.2;

    pub fn new(axis: Vec3, limit: AngularLimit) -> Self {
        Self {
            axis: axis.normalize_or(Vec3::Y),
            initial: Quat::IDENTITY,
            projection: Mat3::IDENTITY,
            limit,
            softness: Self::DEFAULT_SOFTNESS,
            bias_factor: Self::DEFAULT_BIAS_FACTOR,
            jacobian: Mat3::ZERO,
            effective_mass: Mat3::ZERO,
            bias: Vec3::ZERO,
            state: LimitState::Inactive,
            accumulated_impulse: Vec3::ZERO,
        }
    }

    pub fn accumulated_impulse(&self) -> Vec3 {
        self.accumulated_impulse
    }

    /// Signed rotation about the hinge axis since creation, in radians.
    pub fn angle(&self, body1: &RigidBody, body2: &RigidBody) -> f32 {
        let (error, _) = relative_rotation(self.initial, body1.orientation, body2.orientation);
        2.0 * (self.projection * error).z.clamp(-1.0, 1.0).asin()
    }

    pub(crate) fn initialize(&mut self, body1: &RigidBody, body2: &RigidBody) {
        self.initial = body2.orientation.conjugate() * body1.orientation;
        let local_axis = body2.orientation.conjugate() * self.axis;
        let (tangent, bitangent) = tangent_basis(local_axis);
        self.projection = Mat3::from_cols(tangent, bitangent, local_axis).transpose();
    }

    pub(crate) fn prepare(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        let (error, rotation_jacobian) = relative_rotation(self.initial, body1.orientation, body2.orientation);
        let mut error = self.projection * error;
        let jacobian = self.projection * rotation_jacobian;

        let upper = (self.limit.to * 0.5).sin();
        let lower = (self.limit.from * 0.5).sin();
        self.state = if error.z > upper {
            error.z -= upper;
            LimitState::Upper
        } else if error.z < lower {
            error.z -= lower;
            LimitState::Lower
        } else {
            LimitState::Inactive
        };

        self.jacobian = if self.state == LimitState::Inactive {
            error.z = 0.0;
            self.accumulated_impulse.z = 0.0;
            Mat3::from_cols(jacobian.row(0), jacobian.row(1), Vec3::ZERO).transpose()
        } else {
            jacobian
        };

        let mut k = self.jacobian * (body1.inverse_inertia + body2.inverse_inertia) * self.jacobian.transpose()
            + Mat3::from_diagonal(Vec3::splat(self.softness * inv_dt));
        if self.state == LimitState::Inactive {
            k.z_axis.z += 1.0;
        }
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

        let old = self.accumulated_impulse;
        let mut accumulated = old + lambda;
        accumulated.z = match self.state {
            LimitState::Inactive => 0.0,
            LimitState::Upper => accumulated.z.max(0.0),
            LimitState::Lower => accumulated.z.min(0.0),
        };
        self.accumulated_impulse = accumulated;

        let impulse = self.jacobian.transpose() * (accumulated - old);
        body1.apply_angular_impulse(impulse);
        body2.apply_angular_impulse(-impulse);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rigidbody::BodyHandle;
    use approx::assert_relative_eq;

    fn hinge(limit: AngularLimit) -> (HingeAngle, RigidBody) {
        let body1 = RigidBody::new(BodyHandle::INVALID);
        let body2 = RigidBody::new(BodyHandle::INVALID);
        let mut hinge = HingeAngle::new(Vec3::Y, limit);
        hinge.softness = 0.0;
        hinge.initialize(&body1, &body2);
        (hinge, body2)
    }

    #[test]
    fn spin_about_the_axis_is_free() {
        let (mut hinge, body2) = hinge(AngularLimit::FULL);
        let mut b1 = SolverBody::fixed();
        let mut b2 = SolverBody::from_body(&body2);
        b2.angular_velocity = Vec3::new(0.5, 2.0, -0.5);
        hinge.prepare(&mut b1, &mut b2, 100.0);
        for _ in 0..10 {
            hinge.iterate(&mut b1, &mut b2, 100.0);
        }
        assert_relative_eq!(b2.angular_velocity.y, 2.0, epsilon = 1e-4);
        assert_relative_eq!(b2.angular_velocity.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(b2.angular_velocity.z, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn limit_stops_rotation_past_upper_angle() {
        let (mut hinge, body2) = hinge(AngularLimit::new(-0.5, 0.5));
        let mut b1 = SolverBody::fixed();
        let mut b2 = SolverBody::from_body(&body2);
        b2.orientation = Quat::from_rotation_y(0.6);
        b2.angular_velocity = Vec3::new(0.0, 1.0, 0.0);
        hinge.prepare(&mut b1, &mut b2, 100.0);
        for _ in 0..10 {
            hinge.iterate(&mut b1, &mut b2, 100.0);
            assert!(hinge.accumulated_impulse().z >= 0.0);
        }
        assert!(b2.angular_velocity.y < 0.0);
    }

    #[test]
    fn angle_reports_rotation_about_axis() {
        let (hinge, mut body2) = hinge(AngularLimit::FULL);
        let body1 = RigidBody::new(BodyHandle::INVALID);
        body2.orientation = Quat::from_rotation_y(0.4);
        assert_relative_eq!(hinge.angle(&body1, &body2), 0.4, epsilon = 1e-5);
    }
}
