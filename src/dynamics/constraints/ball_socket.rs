use glam::{Mat3, Vec3};

use super::invert_or_zero;
use crate::{core::RigidBody, dynamics::solver::SolverBody, utils::math::skew};

/// Keeps one anchor point of each body at the same world position.
#[derive(Debug, Clone, Copy)]
pub struct BallSocket {
    anchor: Vec3,
    local_anchor1: Vec3,
    local_anchor2: Vec3,
    pub softness: f32,
    pub bias_factor: f32,

    r1: Vec3,
    r2: Vec3,
    effective_mass: Mat3,
    bias: Vec3,
    accumulated_impulse: Vec3,
}

impl BallSocket {
    pub const DEFAULT_SOFTNESS: f32 = 0.00001;
    pub const DEFAULT_BIAS_FACTOR: f32 = 0.2;

    /// Socket centred at the world-space `anchor`, as seen when the constraint is created.
    pub fn new(anchor: Vec3) -> Self {
        Self {
            anchor,
            local_anchor1: Vec3::ZERO,
            local_anchor2: Vec3::ZERO,
            softness: Self::DEFAULT_SOFTNESS,
            bias_factor: Self::DEFAULT_BIAS_FACTOR,
            r1: Vec3::ZERO,
            r2: Vec3::ZERO,
            effective_mass: Mat3::ZERO,
            bias: Vec3::ZERO,
            accumulated_impulse: Vec3::ZERO,
        }
    }

    pub fn with_softness(mut self, softness: f32, bias_factor: f32) -> Self {
        self.softness = softness;
        self.bias_factor = bias_factor;
        self
    }

    pub fn accumulated_impulse(&self) -> Vec3 {
        self.accumulated_impulse
    }

    /// Current world positions of the anchor on body 1 and on body 2.
    pub fn world_anchors(&self, body1: &RigidBody, body2: &RigidBody) -> (Vec3, Vec3) {
        (
            body1.position + body1.orientation * self.local_anchor1,
            body2.position + body2.orientation * self.local_anchor2,
        )
    }

    pub(crate) fn initialize(&mut self, body1: &RigidBody, body2: &RigidBody) {
        self.local_anchor1 = body1.orientation.conjugate() * (self.anchor - body1.position);
        self.local_anchor2 = body2.orientation.conjugate() * (self.anchor - body2.position);
    }

    pub(crate) fn prepare(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        self.r1 = body1.orientation * self.local_anchor1;
        self.r2 = body2.orientation * self.local_anchor2;

        let skew1 = skew(self.r1);
        let skew2 = skew(self.r2);
        let k = Mat3::from_diagonal(Vec3::splat(
            body1.inverse_mass + body2.inverse_mass + self.softness * inv_dt,
        )) - skew1 * body1.inverse_inertia * skew1
            - skew2 * body2.inverse_inertia * skew2;
        self.effective_mass = invert_or_zero(k);

        let error = (body2.position + self.r2) - (body1.position + self.r1);
        self.bias = error * self.bias_factor * inv_dt;

        body1.apply_impulse(-self.accumulated_impulse, self.r1);
        body2.apply_impulse(self.accumulated_impulse, self.r2);
    }

    pub(crate) fn iterate(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        let jv = body2.velocity_at(self.r2) - body1.velocity_at(self.r1);
        let softness = self.accumulated_impulse * self.softness * inv_dt;
        let lambda = -(self.effective_mass * (jv + self.bias + softness));

        self.accumulated_impulse += lambda;
        body1.apply_impulse(-lambda, self.r1);
        body2.apply_impulse(lambda, self.r2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rigidbody::BodyHandle;
    use approx::assert_relative_eq;

    #[test]
    fn pulls_drifting_body_back_to_anchor() {
        let anchor_body = RigidBody::new(BodyHandle::INVALID);
        let mut hanging = RigidBody::new(BodyHandle::INVALID);
        hanging.position = Vec3::new(0.0, -1.0, 0.0);

        let mut socket = BallSocket::new(Vec3::ZERO);
        socket.initialize(&anchor_body, &hanging);

        let mut body1 = SolverBody::fixed();
        let mut body2 = SolverBody::from_body(&hanging);
        body2.position.y -= 0.1;

        socket.prepare(&mut body1, &mut body2, 60.0);
        for _ in 0..10 {
            socket.iterate(&mut body1, &mut body2, 60.0);
        }
        // Bias asks for the error to close at bias_factor * inv_dt.
        assert_relative_eq!(body2.velocity.y, 0.1 * 0.2 * 60.0, epsilon = 1e-2);
        assert_relative_eq!(body2.velocity.x, 0.0, epsilon = 1e-4);
        assert!(socket.accumulated_impulse().y > 0.0);
    }
}
