//! Global configuration constants and the tunable [`WorldConfig`].

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 100.0;

/// Number of solver iterations performed per island and step.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 10;

/// Default per-step damping multipliers (1.0 means no damping).
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.998;
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.995;

/// Fraction of the positional error fed back as velocity bias per step.
pub const DEFAULT_BIAS_FACTOR: f32 = 0.2;
pub const DEFAULT_SOFTNESS: f32 = 0.001;

/// Penetration tolerated before the contact bias kicks in.
pub const DEFAULT_CONTACT_SLOP: f32 = 0.01;

/// Distance a contact point may drift before it is discarded.
pub const DEFAULT_CONTACT_BREAK_THRESHOLD: f32 = 0.02;

/// Approach speed below which restitution is ignored.
pub const DEFAULT_RESTITUTION_THRESHOLD: f32 = 0.5;

/// Enlargement applied to the boxes of moving proxies in the dynamic tree.
pub const DEFAULT_TREE_MARGIN: f32 = 0.1;

pub const DEFAULT_SLEEP_LINEAR_THRESHOLD: f32 = 0.05;
pub const DEFAULT_SLEEP_ANGULAR_THRESHOLD: f32 = 0.1;
pub const DEFAULT_SLEEP_STEPS: u32 = 60;

/// Byte budget for the inline payload of a single constraint.
pub const CONSTRAINT_DATA_SIZE_LIMIT: usize = 256;

/// Maximum number of points kept in one contact manifold.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Tunables for a [`crate::World`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vec3,
    pub solver_iterations: u32,
    pub bias_factor: f32,
    pub softness: f32,
    pub contact_slop: f32,
    pub contact_break_threshold: f32,
    pub restitution_threshold: f32,
    pub tree_margin: f32,
    pub allow_sleeping: bool,
    pub sleep_linear_threshold: f32,
    pub sleep_angular_threshold: f32,
    pub sleep_steps: u32,
    /// Logs a warning when a step runs longer than this (0 disables the check).
    pub step_budget_ms: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            solver_iterations: DEFAULT_SOLVER_ITERATIONS,
            bias_factor: DEFAULT_BIAS_FACTOR,
            softness: DEFAULT_SOFTNESS,
            contact_slop: DEFAULT_CONTACT_SLOP,
            contact_break_threshold: DEFAULT_CONTACT_BREAK_THRESHOLD,
            restitution_threshold: DEFAULT_RESTITUTION_THRESHOLD,
            tree_margin: DEFAULT_TREE_MARGIN,
            allow_sleeping: true,
            sleep_linear_threshold: DEFAULT_SLEEP_LINEAR_THRESHOLD,
            sleep_angular_threshold: DEFAULT_SLEEP_ANGULAR_THRESHOLD,
            sleep_steps: DEFAULT_SLEEP_STEPS,
            step_budget_ms: 0.0,
        }
    }
}

impl WorldConfig {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_solver_iterations(mut self, iterations: u32) -> Self {
        self.solver_iterations = iterations.max(1);
        self
    }

    pub fn with_sleeping(mut self, allow: bool) -> Self {
        self.allow_sleeping = allow;
        self
    }
}
