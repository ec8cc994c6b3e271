//! Tree payloads, host extension points and the context handed to filters.

use glam::Vec3;

use crate::{
    collision::{contact::ArbiterKey, dynamic_tree::ProxyId},
    core::{aabb::Aabb, rigidbody::BodyHandle, shape::ShapeHandle, RigidBody, Shape},
    utils::allocator::{Arena, Handle},
};

pub type ExternalHandle = Handle<ExternalEntry>;

/// What a leaf of the world's dynamic tree refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyRef {
    Shape(ShapeHandle),
    External(ExternalHandle),
}

impl ProxyRef {
    pub fn shape(self) -> Option<ShapeHandle> {
        match self {
            ProxyRef::Shape(handle) => Some(handle),
            ProxyRef::External(_) => None,
        }
    }

    pub fn external(self) -> Option<ExternalHandle> {
        match self {
            ProxyRef::External(handle) => Some(handle),
            ProxyRef::Shape(_) => None,
        }
    }
}

/// Host geometry living in the broad phase next to the shapes, such as a
/// terrain. The world never runs the narrow phase on it; a
/// [`BroadPhaseFilter`] decides what its overlaps mean.
pub trait ExternalProxy: Send + Sync {
    fn world_aabb(&self) -> Aabb;

    /// World-space ray test returning `(lambda, normal)`.
    fn ray_cast(&self, _origin: Vec3, _direction: Vec3) -> Option<(f32, Vec3)> {
        None
    }
}

/// An external proxy registered with a world.
pub struct ExternalEntry {
    pub(crate) proxy: Box<dyn ExternalProxy>,
    pub(crate) id: u64,
    pub(crate) tree_proxy: ProxyId,
}

impl ExternalEntry {
    pub fn proxy(&self) -> &dyn ExternalProxy {
        self.proxy.as_ref()
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for ExternalEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalEntry")
            .field("id", &self.id)
            .field("tree_proxy", &self.tree_proxy)
            .finish()
    }
}

/// Hook called for every broad-phase pair that survived the built-in checks.
///
/// Returning `false` skips the built-in narrow phase for the pair. Filters may
/// produce their own contacts through [`ContactContext::register_contact`].
pub trait BroadPhaseFilter: Send + Sync {
    fn filter(&mut self, context: &mut ContactContext<'_>, proxy1: ProxyRef, proxy2: ProxyRef) -> bool;
}

/// A contact produced outside the built-in narrow phase.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegisteredContact {
    pub key: ArbiterKey,
    pub body1: BodyHandle,
    pub body2: BodyHandle,
    pub point1: Vec3,
    pub point2: Vec3,
    pub normal: Vec3,
    pub penetration: f32,
}

/// Read access to the world during pair filtering.
pub struct ContactContext<'a> {
    pub(crate) bodies: &'a Arena<RigidBody>,
    pub(crate) shapes: &'a Arena<Shape>,
    pub(crate) externals: &'a Arena<ExternalEntry>,
    pub(crate) null_body: BodyHandle,
    pub(crate) registered: Vec<RegisteredContact>,
}

impl<'a> ContactContext<'a> {
    pub fn body(&self, handle: BodyHandle) -> Option<&'a RigidBody> {
        self.bodies.get(handle)
    }

    pub fn shape(&self, handle: ShapeHandle) -> Option<&'a Shape> {
        self.shapes.get(handle)
    }

    pub fn external(&self, handle: ExternalHandle) -> Option<&'a ExternalEntry> {
        self.externals.get(handle)
    }

    /// The world's static anchor body.
    pub fn null_body(&self) -> BodyHandle {
        self.null_body
    }

    /// Queues a contact between `body1` and `body2` under the manifold keyed by
    /// `(id1, id2)`. The normal points from body 1 towards body 2 and
    /// `point1 - point2` should equal `normal * penetration`.
    #[allow(clippy::too_many_arguments)]
    pub fn register_contact(
        &mut self,
        id1: u64,
        id2: u64,
        body1: BodyHandle,
        body2: BodyHandle,
        point1: Vec3,
        point2: Vec3,
        normal: Vec3,
        penetration: f32,
    ) {
        if !normal.is_finite() || !penetration.is_finite() {
            log::warn!("dropping registered contact ({id1}, {id2}) with non-finite data");
            return;
        }
        self.registered.push(RegisteredContact {
            key: ArbiterKey::new(id1, id2),
            body1,
            body2,
            point1,
            point2,
            normal,
            penetration,
        });
    }
}

/// Closest hit reported by [`crate::World::ray_cast`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub proxy: ProxyRef,
    pub normal: Vec3,
    pub lambda: f32,
}
