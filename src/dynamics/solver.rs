//! Sequential-impulse solver working on copied-out island jobs.

use glam::{Mat3, Quat, Vec3};

use crate::{
    collision::contact::{ArbiterKey, ContactManifold},
    config::WorldConfig,
    core::{rigidbody::BodyHandle, RigidBody},
    dynamics::constraints::{ConstraintHandle, ConstraintKind},
    utils::math::angular_velocity_to_quat,
};

/// Velocity state of one body as seen by the solver.
#[derive(Debug, Clone, Copy)]
pub struct SolverBody {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub inverse_mass: f32,
    pub inverse_inertia: Mat3,
}

impl SolverBody {
    pub fn from_body(body: &RigidBody) -> Self {
        Self {
            position: body.position,
            orientation: body.orientation,
            velocity: body.velocity,
            angular_velocity: body.angular_velocity,
            inverse_mass: body.inverse_mass(),
            inverse_inertia: body.inverse_inertia_world(),
        }
    }

    /// An immovable body at the origin.
    pub fn fixed() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inverse_mass: 0.0,
            inverse_inertia: Mat3::ZERO,
        }
    }

    pub fn velocity_at(&self, r: Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(r)
    }

    /// Impulse applied at offset `r` from the body origin.
    pub fn apply_impulse(&mut self, impulse: Vec3, r: Vec3) {
        self.velocity += impulse * self.inverse_mass;
        self.angular_velocity += self.inverse_inertia * r.cross(impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: Vec3) {
        self.angular_velocity += self.inverse_inertia * impulse;
    }

    /// Contribution of this body to the effective mass of a point row.
    pub fn effective_mass(&self, r: Vec3, direction: Vec3) -> f32 {
        let rn = r.cross(direction);
        self.inverse_mass + rn.dot(self.inverse_inertia * rn)
    }
}

/// Step-wide values shared by every row of every island.
#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    pub dt: f32,
    pub inv_dt: f32,
    pub iterations: u32,
    pub gravity: Vec3,
    pub bias_factor: f32,
    pub softness: f32,
    pub slop: f32,
    pub restitution_threshold: f32,
}

impl SolverSettings {
    pub fn new(config: &WorldConfig, dt: f32) -> Self {
        Self {
            dt,
            inv_dt: 1.0 / dt,
            iterations: config.solver_iterations.max(1),
            gravity: config.gravity,
            bias_factor: config.bias_factor,
            softness: config.softness,
            slop: config.contact_slop,
            restitution_threshold: config.restitution_threshold,
        }
    }
}

/// Forces and damping a dynamic body brings into the velocity integration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyLoad {
    pub force: Vec3,
    pub torque: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub affected_by_gravity: bool,
}

impl BodyLoad {
    pub fn from_body(body: &RigidBody) -> Self {
        Self {
            force: body.force,
            torque: body.torque,
            linear_damping: body.linear_damping,
            angular_damping: body.angular_damping,
            affected_by_gravity: body.affected_by_gravity,
        }
    }
}

pub(crate) struct JobConstraint {
    pub handle: ConstraintHandle,
    pub body1: usize,
    pub body2: usize,
    pub kind: ConstraintKind,
}

pub(crate) struct JobContact {
    pub key: ArbiterKey,
    pub body1: usize,
    pub body2: usize,
    pub manifold: ContactManifold,
}

/// Everything one island needs, copied out of the world so that islands can be
/// solved on separate threads. Dynamic bodies come first; static bodies the
/// island touches are appended and never written back.
pub(crate) struct IslandJob {
    pub handles: Vec<BodyHandle>,
    pub loads: Vec<BodyLoad>,
    pub bodies: Vec<SolverBody>,
    pub constraints: Vec<JobConstraint>,
    pub contacts: Vec<JobContact>,
}

impl IslandJob {
    pub fn dynamic_count(&self) -> usize {
        self.handles.len()
    }

    /// Integrates velocities, solves every row and integrates positions.
    pub fn solve(&mut self, settings: &SolverSettings) {
        self.integrate_velocities(settings);

        for constraint in &mut self.constraints {
            if let Some((body1, body2)) = pair_mut(&mut self.bodies, constraint.body1, constraint.body2) {
                constraint.kind.prepare(body1, body2, settings.inv_dt);
            }
        }
        for contact in &mut self.contacts {
            if let Some((body1, body2)) = pair_mut(&mut self.bodies, contact.body1, contact.body2) {
                contact.manifold.prepare(body1, body2, settings);
            }
        }

        for _ in 0..settings.iterations {
            for constraint in &mut self.constraints {
                if let Some((body1, body2)) = pair_mut(&mut self.bodies, constraint.body1, constraint.body2) {
                    constraint.kind.iterate(body1, body2, settings.inv_dt);
                }
            }
            for contact in &mut self.contacts {
                if let Some((body1, body2)) = pair_mut(&mut self.bodies, contact.body1, contact.body2) {
                    contact.manifold.iterate(body1, body2, settings);
                }
            }
        }

        self.integrate_positions(settings.dt);
    }

    fn integrate_velocities(&mut self, settings: &SolverSettings) {
        let dt = settings.dt;
        for (body, load) in self.bodies.iter_mut().zip(&self.loads) {
            let mut acceleration = load.force * body.inverse_mass;
            if load.affected_by_gravity && body.inverse_mass > 0.0 {
                acceleration += settings.gravity;
            }
            body.velocity = (body.velocity + acceleration * dt) * load.linear_damping;
            body.angular_velocity =
                (body.angular_velocity + body.inverse_inertia * load.torque * dt) * load.angular_damping;
        }
    }

    fn integrate_positions(&mut self, dt: f32) {
        let count = self.dynamic_count();
        for body in &mut self.bodies[..count] {
            body.position += body.velocity * dt;
            body.orientation = (angular_velocity_to_quat(body.angular_velocity, dt) * body.orientation).normalize();
        }
    }
}

/// Mutable references to two distinct slots of `bodies`, in argument order.
pub(crate) fn pair_mut(bodies: &mut [SolverBody], a: usize, b: usize) -> Option<(&mut SolverBody, &mut SolverBody)> {
    if a == b || a >= bodies.len() || b >= bodies.len() {
        return None;
    }
    if a < b {
        let (left, right) = bodies.split_at_mut(b);
        Some((&mut left[a], &mut right[0]))
    } else {
        let (left, right) = bodies.split_at_mut(a);
        Some((&mut right[0], &mut left[b]))
    }
}

/// Solves every job, in parallel when requested and available.
pub(crate) fn solve_islands(jobs: &mut [IslandJob], settings: &SolverSettings, multithreaded: bool) {
    #[cfg(feature = "parallel")]
    {
        if multithreaded && jobs.len() > 1 {
            use rayon::prelude::*;
            jobs.par_iter_mut().for_each(|job| job.solve(settings));
            return;
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = multithreaded;

    for job in jobs {
        job.solve(settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_body(position: Vec3) -> SolverBody {
        SolverBody {
            position,
            inverse_mass: 1.0,
            inverse_inertia: Mat3::IDENTITY,
            ..SolverBody::fixed()
        }
    }

    #[test]
    fn pair_mut_returns_argument_order() {
        let mut bodies = vec![unit_body(Vec3::X), unit_body(Vec3::Y), unit_body(Vec3::Z)];
        let (a, b) = pair_mut(&mut bodies, 2, 0).expect("distinct slots");
        assert_eq!(a.position, Vec3::Z);
        assert_eq!(b.position, Vec3::X);
        assert!(pair_mut(&mut bodies, 1, 1).is_none());
        assert!(pair_mut(&mut bodies, 1, 7).is_none());
    }

    #[test]
    fn off_center_impulse_adds_spin() {
        let mut body = unit_body(Vec3::ZERO);
        body.apply_impulse(Vec3::X, Vec3::Y);
        assert_relative_eq!(body.velocity.x, 1.0);
        assert_relative_eq!(body.angular_velocity.z, -1.0);
        assert_relative_eq!(body.effective_mass(Vec3::Y, Vec3::X), 2.0);
    }

    #[test]
    fn free_fall_job_integrates_gravity() {
        let config = WorldConfig::default();
        let settings = SolverSettings::new(&config, 0.1);
        let mut job = IslandJob {
            handles: vec![BodyHandle::INVALID],
            loads: vec![BodyLoad {
                force: Vec3::ZERO,
                torque: Vec3::ZERO,
                linear_damping: 1.0,
                angular_damping: 1.0,
                affected_by_gravity: true,
            }],
            bodies: vec![unit_body(Vec3::ZERO)],
            constraints: Vec::new(),
            contacts: Vec::new(),
        };
        job.solve(&settings);
        assert_relative_eq!(job.bodies[0].velocity.y, -0.981, epsilon = 1e-5);
        assert_relative_eq!(job.bodies[0].position.y, -0.0981, epsilon = 1e-5);
    }
}
