//! Error types returned by the world API.

use thiserror::Error;

/// Result type alias for world operations.
pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Usage errors reported by [`crate::World`]. The world is left untouched
/// whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// The body handle is stale or was never issued by this world.
    #[error("unknown body handle {0}")]
    UnknownBody(String),

    /// The shape handle is stale or was never issued by this world.
    #[error("unknown shape handle {0}")]
    UnknownShape(String),

    /// The constraint handle is stale or was never issued by this world.
    #[error("unknown constraint handle {0}")]
    UnknownConstraint(String),

    /// The external proxy handle is stale or was never issued by this world.
    #[error("unknown external proxy handle {0}")]
    UnknownExternal(String),

    /// The static anchor body is owned by the world.
    #[error("the null body cannot be removed")]
    NullBodyRemoval,

    /// Both ends of a constraint refer to the same body.
    #[error("constraint connects body {0} to itself")]
    SelfConstraint(String),

    /// A constraint payload does not fit the per-constraint storage budget.
    #[error("constraint payload of {size} bytes exceeds the {limit} byte limit")]
    ConstraintTooLarge { size: usize, limit: usize },

    /// Motor target set on a hinge that was built without a motor.
    #[error("hinge has no motor")]
    MissingMotor,

    /// Negative or non-finite time step.
    #[error("invalid time step {0}")]
    InvalidTimeStep(f32),

    /// Shape parameters that cannot produce a valid collision proxy.
    #[error("invalid shape: {0}")]
    InvalidShape(String),
}

impl PhysicsError {
    #[must_use]
    pub fn unknown_body(handle: impl std::fmt::Debug) -> Self {
        Self::UnknownBody(format!("{handle:?}"))
    }

    #[must_use]
    pub fn unknown_shape(handle: impl std::fmt::Debug) -> Self {
        Self::UnknownShape(format!("{handle:?}"))
    }

    #[must_use]
    pub fn unknown_constraint(handle: impl std::fmt::Debug) -> Self {
        Self::UnknownConstraint(format!("{handle:?}"))
    }

    #[must_use]
    pub fn unknown_external(handle: impl std::fmt::Debug) -> Self {
        Self::UnknownExternal(format!("{handle:?}"))
    }

    #[must_use]
    pub fn invalid_shape(details: impl Into<String>) -> Self {
        Self::InvalidShape(details.into())
    }
}
