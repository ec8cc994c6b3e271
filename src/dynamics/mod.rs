//! Simulation dynamics: constraints, joints, soft bodies, islands and the solver.

pub mod constraints;
pub mod island;
pub mod joints;
pub mod soft_body;
pub mod solver;

pub use constraints::{
    AngularLimit, AngularMotor, BallSocket, ConeLimit, Constraint, ConstraintHandle, ConstraintKind, FixedAngle,
    HingeAngle, Spring,
};
pub use island::{Island, IslandManager};
pub use joints::{FixedJoint, HingeJoint};
pub use soft_body::SoftBody;
pub use solver::{SolverBody, SolverSettings};
