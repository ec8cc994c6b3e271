use glam::{Mat3, Quat, Vec3};

use super::{
    shape::ShapeHandle,
    types::{MassProperties, Material},
};
use crate::{
    config::{DEFAULT_ANGULAR_DAMPING, DEFAULT_LINEAR_DAMPING},
    dynamics::constraints::ConstraintHandle,
    utils::{allocator::Handle, math::rotate_inertia},
};

pub type BodyHandle = Handle<RigidBody>;

/// Core rigid body storing kinematic state and mass data.
///
/// Pose and velocity fields can be written directly. Writing to a sleeping
/// body has no effect on the simulation until it is woken with
/// [`crate::World::activate`].
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Accumulated force and torque, cleared after every step.
    pub force: Vec3,
    pub torque: Vec3,
    pub material: Material,
    /// Per-step velocity multipliers in `[0, 1]`.
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub affected_by_gravity: bool,

    pub(crate) handle: BodyHandle,
    pub(crate) inverse_mass: f32,
    pub(crate) inverse_inertia_local: Mat3,
    pub(crate) inverse_inertia_world: Mat3,
    pub(crate) mass_from_shapes: bool,
    pub(crate) is_static: bool,
    pub(crate) is_active: bool,
    pub(crate) sleep_counter: u32,
    pub(crate) island: Option<usize>,
    pub(crate) shapes: Vec<ShapeHandle>,
    pub(crate) constraints: Vec<ConstraintHandle>,
}

impl RigidBody {
    pub(crate) fn new(handle: BodyHandle) -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            material: Material::default(),
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            affected_by_gravity: true,
            handle,
            inverse_mass: 1.0,
            inverse_inertia_local: Mat3::IDENTITY,
            inverse_inertia_world: Mat3::IDENTITY,
            mass_from_shapes: true,
            is_static: false,
            is_active: true,
            sleep_counter: 0,
            island: None,
            shapes: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Awake bodies take part in the step; sleeping ones are frozen.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn island(&self) -> Option<usize> {
        self.island
    }

    pub fn shapes(&self) -> &[ShapeHandle] {
        &self.shapes
    }

    pub fn constraints(&self) -> &[ConstraintHandle] {
        &self.constraints
    }

    /// Zero for static bodies.
    pub fn inverse_mass(&self) -> f32 {
        if self.is_static {
            0.0
        } else {
            self.inverse_mass
        }
    }

    pub fn mass(&self) -> f32 {
        if self.inverse_mass > 0.0 {
            1.0 / self.inverse_mass
        } else {
            f32::INFINITY
        }
    }

    pub fn inverse_inertia_world(&self) -> Mat3 {
        if self.is_static {
            Mat3::ZERO
        } else {
            self.inverse_inertia_world
        }
    }

    pub fn apply_force(&mut self, force: Vec3) {
        self.force += force;
    }

    /// Force applied at a world-space point, producing torque about the body origin.
    pub fn apply_force_at(&mut self, force: Vec3, point: Vec3) {
        self.force += force;
        self.torque += (point - self.position).cross(force);
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, point: Vec3) {
        if self.is_static {
            return;
        }
        self.velocity += impulse * self.inverse_mass;
        self.angular_velocity += self.inverse_inertia_world * (point - self.position).cross(impulse);
    }

    /// World-space velocity of a point rigidly attached to the body.
    pub fn velocity_at(&self, point: Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(point - self.position)
    }

    /// Overrides the mass derived from the attached shapes.
    pub fn set_mass_properties(&mut self, props: MassProperties) {
        self.mass_from_shapes = false;
        self.apply_mass_properties(&props);
    }

    /// Gives the body a mass but no rotational response, as used for the
    /// particles of a soft body.
    pub fn set_translational_mass(&mut self, mass: f32) {
        self.mass_from_shapes = false;
        self.inverse_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        self.inverse_inertia_local = Mat3::ZERO;
        self.inverse_inertia_world = Mat3::ZERO;
    }

    pub(crate) fn apply_mass_properties(&mut self, props: &MassProperties) {
        let (inverse_mass, inverse_inertia) = props.inverses();
        self.inverse_mass = inverse_mass;
        self.inverse_inertia_local = inverse_inertia;
        self.update_world_inertia();
    }

    pub(crate) fn update_world_inertia(&mut self) {
        self.inverse_inertia_world = rotate_inertia(self.inverse_inertia_local, self.orientation);
    }

    pub(crate) fn clear_accumulators(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }
}
