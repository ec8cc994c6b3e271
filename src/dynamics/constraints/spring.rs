use glam::Vec3;

use super::invert_scalar_or_zero;
use crate::{core::RigidBody, dynamics::solver::SolverBody};

/// Soft distance constraint between two anchor points.
///
/// Anchor offsets keep their world orientation and ignore body rotation,
/// which suits the particle bodies of soft bodies.
#[derive(Debug, Clone, Copy)]
pub struct Spring {
    anchor1: Vec3,
    anchor2: Vec3,
    offset1: Vec3,
    offset2: Vec3,
    /// Rest length; defaults to the anchor distance at creation.
    pub distance: Option<f32>,
    pub softness: f32,
    pub bias_factor: f32,

    normal: Vec3,
    effective_mass: f32,
    bias: f32,
    accumulated_impulse: f32,
}

impl Spring {
    pub const DEFAULT_SOFTNESS: f32 = 0.001;
    pub const DEFAULT_BIAS_FACTOR: f32 = 0.2;

    pub fn new(anchor1: Vec3, anchor2: Vec3) -> Self {
        Self {
            anchor1,
            anchor2,
            offset1: Vec3::ZERO,
            offset2: Vec3::ZERO,
            distance: None,
            softness: Self::DEFAULT_SOFTNESS,
            bias_factor: Self::DEFAULT_BIAS_FACTOR,
            normal: Vec3::ZERO,
            effective_mass: 0.0,
            bias: 0.0,
            accumulated_impulse: 0.0,
        }
    }

    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_softness(mut self, softness: f32, bias_factor: f32) -> Self {
        self.softness = softness;
        self.bias_factor = bias_factor;
        self
    }

    pub fn rest_length(&self) -> f32 {
        self.distance.unwrap_or_default()
    }

    pub fn accumulated_impulse(&self) -> f32 {
        self.accumulated_impulse
    }

    /// Current distance between the two anchors.
    pub fn current_length(&self, body1: &RigidBody, body2: &RigidBody) -> f32 {
        ((body2.position + self.offset2) - (body1.position + self.offset1)).length()
    }

    pub(crate) fn initialize(&mut self, body1: &RigidBody, body2: &RigidBody) {
        self.offset1 = self.anchor1 - body1.position;
        self.offset2 = self.anchor2 - body2.position;
        if self.distance.is_none() {
            self.distance = Some((self.anchor2 - self.anchor1).length());
        }
    }

    pub(crate) fn prepare(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        let delta = (body2.position + self.offset2) - (body1.position + self.offset1);
        let length = delta.length();
        self.normal = if length > 1e-6 { delta / length } else { Vec3::Y };

        self.effective_mass =
            invert_scalar_or_zero(body1.inverse_mass + body2.inverse_mass + self.softness * inv_dt);
        self.bias = (length - self.rest_length()) * self.bias_factor * inv_dt;

        body1.velocity -= self.normal * (body1.inverse_mass * self.accumulated_impulse);
        body2.velocity += self.normal * (body2.inverse_mass * self.accumulated_impulse);
    }

    pub(crate) fn iterate(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        let jv = (body2.velocity - body1.velocity).dot(self.normal);
        let softness = self.accumulated_impulse * self.softness * inv_dt;
        let lambda = -self.effective_mass * (jv + self.bias + softness);
        self.accumulated_impulse += lambda;

        body1.velocity -= self.normal * (body1.inverse_mass * lambda);
        body2.velocity += self.normal * (body2.inverse_mass * lambda);
    }
}
