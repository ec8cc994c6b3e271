use glam::Vec3;

use super::{invert_scalar_or_zero, AngularLimit};
use crate::{core::RigidBody, dynamics::solver::SolverBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitState {
    Inactive,
    /// Axes opened past the upper angle.
    Upper,
    /// Axes closer than the lower angle.
    Lower,
}

/// Restricts the angle between an axis fixed in body 1 and one fixed in body 2.
#[derive(Debug, Clone, Copy)]
pub struct ConeLimit {
    axis: Vec3,
    local_axis1: Vec3,
    local_axis2: Vec3,
    pub limit: AngularLimit,
    pub softness: f32,
    pub bias_factor: f32,

    jacobian1: Vec3,
    jacobian2: Vec3,
    effective_mass: f32,
    bias: f32,
    state: LimitState,
    accumulated_impulse: f32,
}

impl ConeLimit {
    pub const DEFAULT_SOFTNESS: f32 = 0.001;
    pub const DEFAULT_BIAS_FACTOR: f32 = 0.2;

    /// `axis` is given in world space; `limit.to` is the cone half-angle and
    /// `limit.from` an optional minimum opening.
    pub fn new(axis: Vec3, limit: AngularLimit) -> Self {
        Self {
            axis: axis.normalize_or(Vec3::Y),
            local_axis1: Vec3::ZERO,
            local_axis2: Vec3::ZERO,
            limit,
            softness: Self::DEFAULT_SOFTNESS,
            bias_factor: Self::DEFAULT_BIAS_FACTOR,
            jacobian1: Vec3::ZERO,
            jacobian2: Vec3::ZERO,
            effective_mass: 0.0,
            bias: 0.0,
            state: LimitState::Inactive,
            accumulated_impulse: 0.0,
        }
    }

    pub fn accumulated_impulse(&self) -> f32 {
        self.accumulated_impulse
    }

    /// Current angle between the two body axes.
    pub fn angle(&self, body1: &RigidBody, body2: &RigidBody) -> f32 {
        let a1 = body1.orientation * self.local_axis1;
        let a2 = body2.orientation * self.local_axis2;
        a1.dot(a2).clamp(-1.0, 1.0).acos()
    }

    pub(crate) fn initialize(&mut self, body1: &RigidBody, body2: &RigidBody) {
        self.local_axis1 = body1.orientation.conjugate() * self.axis;
        self.local_axis2 = body2.orientation.conjugate() * self.axis;
    }

    pub(crate) fn prepare(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        let a1 = body1.orientation * self.local_axis1;
        let a2 = body2.orientation * self.local_axis2;

        self.jacobian1 = a2.cross(a1);
        self.jacobian2 = a1.cross(a2);

        let mut error = a1.dot(a2);
        let cos_upper = self.limit.to.cos();
        let cos_lower = self.limit.from.cos();
        self.state = if error < cos_upper {
            error -= cos_upper;
            LimitState::Upper
        } else if error > cos_lower {
            error -= cos_lower;
            LimitState::Lower
        } else {
            LimitState::Inactive
        };

        if self.state == LimitState::Inactive {
            self.accumulated_impulse = 0.0;
            return;
        }

        self.effective_mass = invert_scalar_or_zero(
            self.jacobian1.dot(body1.inverse_inertia * self.jacobian1)
                + self.jacobian2.dot(body2.inverse_inertia * self.jacobian2)
                + self.softness * inv_dt,
        );
        self.bias = -error * self.bias_factor * inv_dt;

        body1.apply_angular_impulse(self.jacobian1 * self.accumulated_impulse);
        body2.apply_angular_impulse(self.jacobian2 * self.accumulated_impulse);
    }

    pub(crate) fn iterate(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        if self.state == LimitState::Inactive {
            return;
        }

        let jv = body1.angular_velocity.dot(self.jacobian1) + body2.angular_velocity.dot(self.jacobian2);
        let softness = self.accumulated_impulse * self.softness * inv_dt;
        let lambda = -self.effective_mass * (jv + self.bias + softness);

        let old = self.accumulated_impulse;
        self.accumulated_impulse = match self.state {
            LimitState::Upper => (old + lambda).min(0.0),
            _ => (old + lambda).max(0.0),
        };
        let lambda = self.accumulated_impulse - old;

        body1.apply_angular_impulse(self.jacobian1 * lambda);
        body2.apply_angular_impulse(self.jacobian2 * lambda);
    }
}
