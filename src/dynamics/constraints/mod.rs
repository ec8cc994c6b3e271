//! Primitive constraints solved by the sequential-impulse solver.
//!
//! Every variant follows the same two-phase protocol: `prepare` runs once per
//! step to build Jacobians, effective mass and bias and to warm start with the
//! impulse accumulated last step; `iterate` runs once per solver pass and
//! applies a clamped impulse delta.

mod angular_motor;
mod ball_socket;
mod cone_limit;
mod fixed_angle;
mod hinge_angle;
mod spring;

pub use angular_motor::AngularMotor;
pub use ball_socket::BallSocket;
pub use cone_limit::ConeLimit;
pub use fixed_angle::FixedAngle;
pub use hinge_angle::HingeAngle;
pub use spring::Spring;

use std::f32::consts::PI;

use glam::Mat3;
use serde::{Deserialize, Serialize};

use crate::{
    config::CONSTRAINT_DATA_SIZE_LIMIT,
    core::{rigidbody::BodyHandle, RigidBody},
    dynamics::solver::SolverBody,
    error::{PhysicsError, PhysicsResult},
    utils::allocator::Handle,
};

pub type ConstraintHandle = Handle<Constraint>;

/// Angular range in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngularLimit {
    pub from: f32,
    pub to: f32,
}

impl AngularLimit {
    pub const FULL: Self = Self { from: -PI, to: PI };

    pub fn new(from: f32, to: f32) -> Self {
        Self { from, to }
    }

    pub fn from_degrees(from: f32, to: f32) -> Self {
        Self::new(from.to_radians(), to.to_radians())
    }
}

impl Default for AngularLimit {
    fn default() -> Self {
        Self::FULL
    }
}

/// Inline payload of a constraint.
#[derive(Debug, Clone, Copy)]
pub enum ConstraintKind {
    BallSocket(BallSocket),
    ConeLimit(ConeLimit),
    FixedAngle(FixedAngle),
    HingeAngle(HingeAngle),
    AngularMotor(AngularMotor),
    Spring(Spring),
}

const _: () = {
    assert!(std::mem::size_of::<BallSocket>() <= CONSTRAINT_DATA_SIZE_LIMIT);
    assert!(std::mem::size_of::<ConeLimit>() <= CONSTRAINT_DATA_SIZE_LIMIT);
    assert!(std::mem::size_of::<FixedAngle>() <= CONSTRAINT_DATA_SIZE_LIMIT);
    assert!(std::mem::size_of::<HingeAngle>() <= CONSTRAINT_DATA_SIZE_LIMIT);
    assert!(std::mem::size_of::<AngularMotor>() <= CONSTRAINT_DATA_SIZE_LIMIT);
    assert!(std::mem::size_of::<Spring>() <= CONSTRAINT_DATA_SIZE_LIMIT);
};

/// Rejects payloads over the per-constraint budget. The built-in variants are
/// asserted above at compile time; this catches variants that grow past it.
pub fn check_payload_size(size: usize) -> PhysicsResult<()> {
    if size > CONSTRAINT_DATA_SIZE_LIMIT {
        return Err(PhysicsError::ConstraintTooLarge {
            size,
            limit: CONSTRAINT_DATA_SIZE_LIMIT,
        });
    }
    Ok(())
}

macro_rules! dispatch {
    ($kind:expr, $inner:ident => $body:expr) => {
        match $kind {
            ConstraintKind::BallSocket($inner) => $body,
            ConstraintKind::ConeLimit($inner) => $body,
            ConstraintKind::FixedAngle($inner) => $body,
            ConstraintKind::HingeAngle($inner) => $body,
            ConstraintKind::AngularMotor($inner) => $body,
            ConstraintKind::Spring($inner) => $body,
        }
    };
}

impl ConstraintKind {
    /// Size in bytes of the variant payload.
    pub fn payload_size(&self) -> usize {
        dispatch!(self, inner => std::mem::size_of_val(inner))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::BallSocket(_) => "ball socket",
            ConstraintKind::ConeLimit(_) => "cone limit",
            ConstraintKind::FixedAngle(_) => "fixed angle",
            ConstraintKind::HingeAngle(_) => "hinge angle",
            ConstraintKind::AngularMotor(_) => "angular motor",
            ConstraintKind::Spring(_) => "spring",
        }
    }

    /// Captures the body-relative frames from the current body poses.
    pub(crate) fn initialize(&mut self, body1: &RigidBody, body2: &RigidBody) {
        dispatch!(self, inner => inner.initialize(body1, body2))
    }

    pub(crate) fn prepare(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        dispatch!(self, inner => inner.prepare(body1, body2, inv_dt))
    }

    pub(crate) fn iterate(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, inv_dt: f32) {
        dispatch!(self, inner => inner.iterate(body1, body2, inv_dt))
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident),*) => {
        $(impl From<$variant> for ConstraintKind {
            fn from(value: $variant) -> Self {
                ConstraintKind::$variant(value)
            }
        })*
    };
}

impl_from_variant!(BallSocket, ConeLimit, FixedAngle, HingeAngle, AngularMotor, Spring);

/// Edge between two bodies. Body 1 may be the world's static null body.
#[derive(Debug, Clone)]
pub struct Constraint {
    handle: ConstraintHandle,
    body1: BodyHandle,
    body2: BodyHandle,
    pub(crate) enabled: bool,
    pub(crate) kind: ConstraintKind,
}

impl Constraint {
    pub(crate) fn new(handle: ConstraintHandle, body1: BodyHandle, body2: BodyHandle, kind: ConstraintKind) -> Self {
        Self {
            handle,
            body1,
            body2,
            enabled: true,
            kind,
        }
    }

    pub fn handle(&self) -> ConstraintHandle {
        self.handle
    }

    pub fn body1(&self) -> BodyHandle {
        self.body1
    }

    pub fn body2(&self) -> BodyHandle {
        self.body2
    }

    /// Disabled constraints stay registered but are skipped by islands and the solver.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// Tunables such as softness, limits and motor targets can be changed between steps.
    pub fn kind_mut(&mut self) -> &mut ConstraintKind {
        &mut self.kind
    }
}

/// Inverse of a 3x3 effective-mass matrix, or zero when it is degenerate so
/// the row applies no impulse.
pub(crate) fn invert_or_zero(matrix: Mat3) -> Mat3 {
    let determinant = matrix.determinant();
    if determinant.is_finite() && determinant.abs() > 1e-12 {
        matrix.inverse()
    } else {
        Mat3::ZERO
    }
}

/// Inverse of a scalar effective mass, or zero when degenerate.
pub(crate) fn invert_scalar_or_zero(value: f32) -> f32 {
    if value.is_finite() && value > 1e-12 {
        1.0 / value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn every_builtin_payload_fits_the_budget() {
        let kinds: [ConstraintKind; 6] = [
            BallSocket::new(Vec3::ZERO).into(),
            ConeLimit::new(Vec3::Y, AngularLimit::new(0.0, 0.5)).into(),
            FixedAngle::new().into(),
            HingeAngle::new(Vec3::Y, AngularLimit::FULL).into(),
            AngularMotor::new(Vec3::Y).into(),
            Spring::new(Vec3::ZERO, Vec3::X).into(),
        ];
        for kind in kinds {
            assert!(kind.payload_size() <= CONSTRAINT_DATA_SIZE_LIMIT, "{}", kind.name());
            assert!(check_payload_size(kind.payload_size()).is_ok());
        }
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert_eq!(
            check_payload_size(CONSTRAINT_DATA_SIZE_LIMIT + 1),
            Err(PhysicsError::ConstraintTooLarge {
                size: CONSTRAINT_DATA_SIZE_LIMIT + 1,
                limit: CONSTRAINT_DATA_SIZE_LIMIT,
            })
        );
        assert!(check_payload_size(CONSTRAINT_DATA_SIZE_LIMIT).is_ok());
    }

    #[test]
    fn degenerate_mass_inverts_to_zero() {
        assert_eq!(invert_or_zero(Mat3::ZERO), Mat3::ZERO);
        assert_eq!(invert_scalar_or_zero(0.0), 0.0);
        assert_eq!(invert_scalar_or_zero(f32::NAN), 0.0);
        assert_eq!(invert_scalar_or_zero(4.0), 0.25);
    }
}
