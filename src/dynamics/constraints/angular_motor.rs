use glam::Vec3;

use super::invert_scalar_or_zero;
use crate::{core::RigidBody, dynamics::solver::SolverBody};

/// Drives the relative angular velocity about an axis towards a target,
/// bounded by a maximum torque.
#[derive(Debug, Clone, Copy)]
pub struct AngularMotor {
    axis: Vec3,
    local_axis1: Vec3,
    local_axis2: Vec3,
    /// Target relative angular velocity in radians per second.
    pub target_velocity: f32,
    /// Torque limit; zero disables the motor.
    pub max_force: f32,

    jacobian1: Vec3,
    jacobian2: Vec3,
    effective_mass: f32,
    max_lambda: f32,
    accumulated_impulse: f32,
}

impl AngularMotor {
    pub fn new(axis: Vec3) -> Self {
        Self {
            axis: axis.normalize_or(Vec3::Y),
            local_axis1: Vec3::ZERO,
            local_axis2: Vec3::ZERO,
            target_velocity: 0.0,
            max_force: 0.0,
            jacobian1: Vec3::ZERO,
            jacobian2: Vec3::ZERO,
            effective_mass: 0.0,
            max_lambda: 0.0,
            accumulated_impulse: 0.0,
        }
    }

    pub fn with_target(mut self, target_velocity: f32, max_force: f32) -> Self {
        self.target_velocity = target_velocity;
        self.max_force = max_force;
        self
    }

    pub fn accumulated_impulse(&self) -> f32 {
        self.accumulated_impulse
    }

    pub(crate) fn initialize(&mut self, body1: &RigidBody, body2: &RigidBody) {
        self.local_axis1 = body1.orientation.conjugate() * self.axis;
        self.local_axis2 = body2.orientation.conjugate() * self.axis;
    }

    pub(crate) fn prepare(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        self.jacobian1 = -(body1.orientation * self.local_axis1);
        self.jacobian2 = body2.orientation * self.local_axis2;

        self.effective_mass = invert_scalar_or_zero(
            self.jacobian1.dot(body1.inverse_inertia * self.jacobian1)
                + self.jacobian2.dot(body2.inverse_inertia * self.jacobian2),
        );
        self.max_lambda = self.max_force.max(0.0) / inv_dt;
        self.accumulated_impulse = self.accumulated_impulse.clamp(-self.max_lambda, self.max_lambda);

        body1.apply_angular_impulse(self.jacobian1 * self.accumulated_impulse);
        body2.apply_angular_impulse(self.jacobian2 * self.accumulated_impulse);
    }

    pub(crate) fn iterate(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, _inv_dt: f32) {
        let jv = body1.angular_velocity.dot(self.jacobian1) + body2.angular_velocity.dot(self.jacobian2);
        let lambda = -self.effective_mass * (jv - self.target_velocity);

        let old = self.accumulated_impulse;
        self.accumulated_impulse = (old + lambda).clamp(-self.max_lambda, self.max_lambda);
        let lambda = self.accumulated_impulse - old;

        body1.apply_angular_impulse(self.jacobian1 * lambda);
        body2.apply_angular_impulse(self.jacobian2 * lambda);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rigidbody::BodyHandle;
    use approx::assert_relative_eq;

    fn spun_up(max_force: f32) -> SolverBody {
        let body1 = RigidBody::new(BodyHandle::INVALID);
        let body2 = RigidBody::new(BodyHandle::INVALID);
        let mut motor = AngularMotor::new(Vec3::Z).with_target(4.0, max_force);
        motor.initialize(&body1, &body2);

        let mut b1 = SolverBody::fixed();
        let mut b2 = SolverBody::from_body(&body2);
        motor.prepare(&mut b1, &mut b2, 100.0);
        for _ in 0..10 {
            motor.iterate(&mut b1, &mut b2, 100.0);
        }
        b2
    }

    #[test]
    fn strong_motor_reaches_target_in_one_step() {
        assert_relative_eq!(spun_up(1000.0).angular_velocity.z, 4.0, epsilon = 1e-4);
    }

    #[test]
    fn weak_motor_is_torque_limited() {
        // 10 N·m over 0.01 s on unit inertia.
        assert_relative_eq!(spun_up(10.0).angular_velocity.z, 0.1, epsilon = 1e-4);
        assert_eq!(spun_up(0.0).angular_velocity.z, 0.0);
    }
}
