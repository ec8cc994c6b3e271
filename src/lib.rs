//! Ballast – a real-time rigid and soft body physics engine.
//!
//! A [`World`] owns bodies, shapes and constraints behind generational
//! handles. Every call to [`World::step`] refits the dynamic AABB tree,
//! turns overlapping shapes into persistent contact manifolds with GJK/EPA,
//! groups connected bodies into islands and solves each island with a
//! warm-started sequential impulse solver. Islands run on the rayon pool
//! when the `parallel` feature is enabled.
//!
//! ```
//! use ballast::{Shape, Vec3, World, WorldConfig};
//!
//! let mut world = World::new(WorldConfig::default());
//! let ground = world.create_rigid_body();
//! world.add_shape(ground, Shape::cuboid(Vec3::new(10.0, 0.5, 10.0))).unwrap();
//! world.set_static(ground, true).unwrap();
//!
//! let crate_body = world.create_rigid_body();
//! world.body_mut(crate_body).unwrap().position = Vec3::new(0.0, 3.0, 0.0);
//! world.add_shape(crate_body, Shape::cuboid(Vec3::splat(0.5))).unwrap();
//!
//! for _ in 0..100 {
//!     world.step(1.0 / 100.0, false).unwrap();
//! }
//! assert!(world.body(crate_body).unwrap().position.y < 3.0);
//! ```

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Quat, Vec2, Vec3};

pub use collision::{
    contact::{ArbiterKey, ContactManifold, ContactPoint},
    terrain::{add_terrain, HeightField, Terrain},
};
pub use config::WorldConfig;
pub use core::{
    aabb::Aabb,
    rigidbody::{BodyHandle, RigidBody},
    shape::{CollisionFilter, Shape, ShapeHandle, ShapeKind},
    types::{MassProperties, Material},
};
pub use dynamics::{
    constraints::{
        AngularLimit, AngularMotor, BallSocket, ConeLimit, Constraint, ConstraintHandle, ConstraintKind, FixedAngle,
        HingeAngle, Spring,
    },
    island::Island,
    joints::{FixedJoint, HingeJoint},
    soft_body::SoftBody,
};
pub use error::{PhysicsError, PhysicsResult};
pub use utils::{
    allocator::{Arena, Handle},
    profiling::StepProfile,
    slim_bag::SlimBag,
};
pub use world::{
    BroadPhaseFilter, ContactContext, ExternalHandle, ExternalProxy, FixedStepper, ProxyRef, RayHit, World,
};
