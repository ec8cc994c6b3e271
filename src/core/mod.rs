//! Core types describing bodies, collision shapes and shared data.

pub mod aabb;
pub mod rigidbody;
pub mod shape;
pub mod types;

pub use aabb::Aabb;
pub use rigidbody::{BodyHandle, RigidBody};
pub use shape::{CollisionFilter, Shape, ShapeHandle, ShapeKind, SupportMap};
pub use types::{InertiaTensorExt, MassProperties, Material, MaterialMixing, MixingMode};
