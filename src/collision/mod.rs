//! Collision detection: the dynamic AABB tree, GJK/EPA narrow phase,
//! persistent contact manifolds and the heightmap terrain.

pub mod clipping;
pub mod contact;
pub mod dynamic_tree;
pub mod narrow_phase;
pub mod terrain;

pub use contact::{ArbiterKey, ContactManifold, ContactPoint};
pub use dynamic_tree::{DynamicTree, ProxyId, TreeRayHit};
pub use narrow_phase::{NarrowPhase, Overlap, OverlapSet};
pub use terrain::{add_terrain, HeightField, Terrain, TerrainFilter, TerrainProxy};
