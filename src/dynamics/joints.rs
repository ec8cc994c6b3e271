//! Joints assembled from primitive constraints.

use glam::Vec3;

use crate::{
    core::rigidbody::BodyHandle,
    dynamics::constraints::{
        AngularLimit, AngularMotor, BallSocket, ConstraintHandle, ConstraintKind, FixedAngle, HingeAngle,
    },
    error::{PhysicsError, PhysicsResult},
    world::World,
};

/// Rotation about a single axis through `center`, optionally limited and driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HingeJoint {
    pub hinge_angle: ConstraintHandle,
    pub ball_socket: ConstraintHandle,
    pub motor: Option<ConstraintHandle>,
}

impl HingeJoint {
    /// Both bodies must already be placed in their rest pose. The motor
    /// starts with zero torque and does nothing until given a target.
    pub fn new(
        world: &mut World,
        body1: BodyHandle,
        body2: BodyHandle,
        center: Vec3,
        axis: Vec3,
        limit: AngularLimit,
        has_motor: bool,
    ) -> PhysicsResult<Self> {
        let hinge_angle = world.create_constraint(body1, body2, HingeAngle::new(axis, limit))?;
        let ball_socket = match world.create_constraint(body1, body2, BallSocket::new(center)) {
            Ok(handle) => handle,
            Err(err) => {
                world.remove_constraint(hinge_angle)?;
                return Err(err);
            }
        };
        let motor = if has_motor {
            match world.create_constraint(body1, body2, AngularMotor::new(axis)) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    world.remove_constraint(ball_socket)?;
                    world.remove_constraint(hinge_angle)?;
                    return Err(err);
                }
            }
        } else {
            None
        };
        Ok(Self {
            hinge_angle,
            ball_socket,
            motor,
        })
    }

    /// Sets the motor target. Fails when the joint was built without a motor.
    pub fn set_motor_target(&self, world: &mut World, target_velocity: f32, max_force: f32) -> PhysicsResult<()> {
        let handle = self.motor.ok_or(PhysicsError::MissingMotor)?;
        let constraint = world
            .constraint_mut(handle)
            .ok_or_else(|| PhysicsError::unknown_constraint(handle))?;
        if let ConstraintKind::AngularMotor(motor) = constraint.kind_mut() {
            motor.target_velocity = target_velocity;
            motor.max_force = max_force;
        }
        let (body1, body2) = (constraint.body1(), constraint.body2());
        world.activate(body1)?;
        world.activate(body2)
    }

    /// Current hinge angle in radians.
    pub fn angle(&self, world: &World) -> Option<f32> {
        let constraint = world.constraint(self.hinge_angle)?;
        let ConstraintKind::HingeAngle(hinge) = constraint.kind() else {
            return None;
        };
        Some(hinge.angle(world.body(constraint.body1())?, world.body(constraint.body2())?))
    }

    pub fn set_enabled(&self, world: &mut World, enabled: bool) -> PhysicsResult<()> {
        for handle in self.handles() {
            world.set_constraint_enabled(handle, enabled)?;
        }
        Ok(())
    }

    pub fn remove(self, world: &mut World) -> PhysicsResult<()> {
        for handle in self.handles() {
            world.remove_constraint(handle)?;
        }
        Ok(())
    }

    fn handles(&self) -> impl Iterator<Item = ConstraintHandle> {
        [Some(self.hinge_angle), Some(self.ball_socket), self.motor]
            .into_iter()
            .flatten()
    }
}

/// Welds two bodies together at `anchor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedJoint {
    pub fixed_angle: ConstraintHandle,
    pub ball_socket: ConstraintHandle,
}

impl FixedJoint {
    pub fn new(world: &mut World, body1: BodyHandle, body2: BodyHandle, anchor: Vec3) -> PhysicsResult<Self> {
        let fixed_angle = world.create_constraint(body1, body2, FixedAngle::new())?;
        let ball_socket = match world.create_constraint(body1, body2, BallSocket::new(anchor)) {
            Ok(handle) => handle,
            Err(err) => {
                world.remove_constraint(fixed_angle)?;
                return Err(err);
            }
        };
        Ok(Self {
            fixed_angle,
            ball_socket,
        })
    }

    pub fn set_enabled(&self, world: &mut World, enabled: bool) -> PhysicsResult<()> {
        world.set_constraint_enabled(self.fixed_angle, enabled)?;
        world.set_constraint_enabled(self.ball_socket, enabled)
    }

    pub fn remove(self, world: &mut World) -> PhysicsResult<()> {
        world.remove_constraint(self.fixed_angle)?;
        world.remove_constraint(self.ball_socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::WorldConfig, core::Shape};

    fn hanging_box(world: &mut World, position: Vec3) -> BodyHandle {
        let body = world.create_rigid_body();
        if let Some(b) = world.body_mut(body) {
            b.position = position;
        }
        world
            .add_shape(body, Shape::cuboid(Vec3::splat(0.5)))
            .expect("valid box");
        body
    }

    #[test]
    fn hinge_without_motor_rejects_targets() {
        let mut world = World::default();
        let body = hanging_box(&mut world, Vec3::ZERO);
        let null_body = world.null_body();
        let hinge = HingeJoint::new(&mut world, null_body, body, Vec3::ZERO, Vec3::Y, AngularLimit::FULL, false)
            .expect("hinge");
        assert_eq!(
            hinge.set_motor_target(&mut world, 1.0, 10.0),
            Err(PhysicsError::MissingMotor)
        );
        assert_eq!(world.constraints().count(), 2);

        hinge.remove(&mut world).expect("remove");
        assert_eq!(world.constraints().count(), 0);
    }

    #[test]
    fn failed_joint_leaves_no_constraints_behind() {
        let mut world = World::default();
        let body = hanging_box(&mut world, Vec3::ZERO);
        assert!(FixedJoint::new(&mut world, body, body, Vec3::ZERO).is_err());
        assert_eq!(world.constraints().count(), 0);
    }

    #[test]
    fn disabled_fixed_joint_lets_body_fall() {
        let mut world = World::new(WorldConfig::default().with_sleeping(false));
        let body = hanging_box(&mut world, Vec3::new(0.0, 2.0, 0.0));
        let null_body = world.null_body();
        let joint = FixedJoint::new(&mut world, null_body, body, Vec3::new(0.0, 2.0, 0.0)).expect("joint");

        for _ in 0..30 {
            world.step(0.01, false).expect("step");
        }
        let held = world.body(body).map_or(0.0, |b| b.position.y);
        assert!((held - 2.0).abs() < 0.05, "held at {held}");

        joint.set_enabled(&mut world, false).expect("disable");
        for _ in 0..30 {
            world.step(0.01, false).expect("step");
        }
        let dropped = world.body(body).map_or(0.0, |b| b.position.y);
        assert!(dropped < 1.7, "fell to {dropped}");
    }
}
