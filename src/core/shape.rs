use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    aabb::Aabb,
    rigidbody::BodyHandle,
    types::{InertiaTensorExt, MassProperties},
};
use crate::{
    collision::{dynamic_tree::ProxyId, narrow_phase::NarrowPhase},
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::Handle,
        math::{inertia_capsule, inertia_cylinder, parallel_axis},
    },
};

pub type ShapeHandle = Handle<Shape>;

/// Anything the narrow phase can collide: a support mapping in local space.
pub trait SupportMap {
    /// Furthest point of the shape along `direction` (which need not be normalized).
    fn support(&self, direction: Vec3) -> Vec3;

    /// A point strictly inside the shape.
    fn center(&self) -> Vec3 {
        Vec3::ZERO
    }
}

/// Convex collision geometry expressed in shape-local coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShapeKind {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// Capsule along the local Y axis; `half_length` excludes the caps.
    Capsule { radius: f32, half_length: f32 },
    Cylinder { radius: f32, half_height: f32 },
    ConvexHull { vertices: Vec<Vec3> },
    Triangle { a: Vec3, b: Vec3, c: Vec3 },
}

impl SupportMap for ShapeKind {
    fn support(&self, direction: Vec3) -> Vec3 {
        match self {
            ShapeKind::Sphere { radius } => direction.normalize_or(Vec3::X) * *radius,
            ShapeKind::Box { half_extents } => Vec3::select(
                direction.cmpge(Vec3::ZERO),
                *half_extents,
                -*half_extents,
            ),
            ShapeKind::Capsule {
                radius,
                half_length,
            } => {
                let tip = if direction.y >= 0.0 {
                    *half_length
                } else {
                    -*half_length
                };
                Vec3::new(0.0, tip, 0.0) + direction.normalize_or(Vec3::Y) * *radius
            }
            ShapeKind::Cylinder {
                radius,
                half_height,
            } => {
                let lateral = Vec3::new(direction.x, 0.0, direction.z);
                let rim = lateral.normalize_or_zero() * *radius;
                let cap = if direction.y >= 0.0 {
                    *half_height
                } else {
                    -*half_height
                };
                Vec3::new(rim.x, cap, rim.z)
            }
            ShapeKind::ConvexHull { vertices } => support_of_points(vertices, direction),
            ShapeKind::Triangle { a, b, c } => support_of_points(&[*a, *b, *c], direction),
        }
    }

    fn center(&self) -> Vec3 {
        match self {
            ShapeKind::ConvexHull { vertices } if !vertices.is_empty() => {
                vertices.iter().copied().sum::<Vec3>() / vertices.len() as f32
            }
            ShapeKind::Triangle { a, b, c } => (*a + *b + *c) / 3.0,
            _ => Vec3::ZERO,
        }
    }
}

fn support_of_points(points: &[Vec3], direction: Vec3) -> Vec3 {
    let mut best = Vec3::ZERO;
    let mut best_dot = f32::NEG_INFINITY;
    for &point in points {
        let dot = point.dot(direction);
        if dot > best_dot {
            best_dot = dot;
            best = point;
        }
    }
    best
}

impl ShapeKind {
    pub fn validate(&self) -> PhysicsResult<()> {
        let positive = |value: f32| value.is_finite() && value > 0.0;
        let ok = match self {
            ShapeKind::Sphere { radius } => positive(*radius),
            ShapeKind::Box { half_extents } => half_extents.is_finite() && half_extents.min_element() > 0.0,
            ShapeKind::Capsule {
                radius,
                half_length,
            } => positive(*radius) && half_length.is_finite() && *half_length >= 0.0,
            ShapeKind::Cylinder {
                radius,
                half_height,
            } => positive(*radius) && positive(*half_height),
            ShapeKind::ConvexHull { vertices } => {
                !vertices.is_empty() && vertices.iter().all(|v| v.is_finite())
            }
            ShapeKind::Triangle { a, b, c } => {
                a.is_finite() && b.is_finite() && c.is_finite() && (*b - *a).cross(*c - *a).length_squared() > 0.0
            }
        };
        if ok {
            Ok(())
        } else {
            Err(PhysicsError::invalid_shape(format!("{self:?}")))
        }
    }

    /// World bounds for the shape placed at `position` with `orientation`.
    pub fn world_aabb(&self, orientation: Quat, position: Vec3) -> Aabb {
        match self {
            ShapeKind::Sphere { radius } => {
                Aabb::from_center_half_extents(position, Vec3::splat(*radius))
            }
            ShapeKind::Box { half_extents } => {
                let rotation = Mat3::from_quat(orientation);
                let abs = Mat3::from_cols(
                    rotation.x_axis.abs(),
                    rotation.y_axis.abs(),
                    rotation.z_axis.abs(),
                );
                Aabb::from_center_half_extents(position, abs * *half_extents)
            }
            _ => {
                let inverse = orientation.conjugate();
                let mut min = Vec3::ZERO;
                let mut max = Vec3::ZERO;
                for axis in 0..3 {
                    let mut world_axis = Vec3::ZERO;
                    world_axis[axis] = 1.0;
                    let local = inverse * world_axis;
                    max[axis] = (orientation * self.support(local))[axis];
                    min[axis] = (orientation * self.support(-local))[axis];
                }
                Aabb::new(position + min, position + max)
            }
        }
    }

    /// Mass properties about the shape origin.
    pub fn mass_properties(&self, density: f32) -> MassProperties {
        use std::f32::consts::PI;
        match self {
            ShapeKind::Sphere { radius } => {
                let mass = density * 4.0 / 3.0 * PI * radius.powi(3);
                MassProperties {
                    mass,
                    inertia: Mat3::for_solid_sphere(*radius, mass),
                }
            }
            ShapeKind::Box { half_extents } => {
                let mass = density * 8.0 * half_extents.x * half_extents.y * half_extents.z;
                MassProperties {
                    mass,
                    inertia: Mat3::for_solid_box(*half_extents, mass),
                }
            }
            ShapeKind::Capsule {
                radius,
                half_length,
            } => {
                let volume = PI * radius * radius * (2.0 * half_length + 4.0 / 3.0 * radius);
                let mass = density * volume;
                MassProperties {
                    mass,
                    inertia: inertia_capsule(*radius, *half_length, mass),
                }
            }
            ShapeKind::Cylinder {
                radius,
                half_height,
            } => {
                let mass = density * PI * radius * radius * 2.0 * half_height;
                MassProperties {
                    mass,
                    inertia: inertia_cylinder(*radius, *half_height, mass),
                }
            }
            // Hulls and triangles are approximated by their bounding box.
            ShapeKind::ConvexHull { .. } | ShapeKind::Triangle { .. } => {
                let bounds = self.world_aabb(Quat::IDENTITY, Vec3::ZERO);
                let half_extents = bounds.extent();
                let mass = density * 8.0 * half_extents.x * half_extents.y * half_extents.z;
                MassProperties {
                    mass,
                    inertia: parallel_axis(
                        Mat3::for_solid_box(half_extents, mass),
                        mass,
                        bounds.center(),
                    ),
                }
            }
        }
    }

    /// Ray cast in shape-local space. Returns the ray parameter of the first
    /// hit and the outward surface normal there. A ray starting inside the
    /// shape hits at parameter zero with a normal opposing the ray.
    pub fn ray_cast(&self, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
        if direction.length_squared() < 1e-24 {
            return None;
        }
        let inside = || (0.0, -direction.normalize());
        match self {
            ShapeKind::Sphere { radius } => {
                let c = origin.length_squared() - radius * radius;
                if c <= 0.0 {
                    return Some(inside());
                }
                let a = direction.length_squared();
                let b = origin.dot(direction);
                let discriminant = b * b - a * c;
                if b >= 0.0 || discriminant < 0.0 {
                    return None;
                }
                let lambda = (-b - discriminant.sqrt()) / a;
                Some((lambda, (origin + direction * lambda).normalize_or(Vec3::Y)))
            }
            ShapeKind::Box { half_extents } => ray_box(*half_extents, origin, direction),
            ShapeKind::Capsule {
                radius,
                half_length,
            } => {
                let clamped_y = origin.y.clamp(-*half_length, *half_length);
                if (origin - Vec3::new(0.0, clamped_y, 0.0)).length_squared() <= radius * radius {
                    return Some(inside());
                }
                let side = ray_cylinder_side(*radius, *half_length, origin, direction);
                let caps = [*half_length, -*half_length].into_iter().filter_map(|y| {
                    let center = Vec3::new(0.0, y, 0.0);
                    ShapeKind::Sphere { radius: *radius }
                        .ray_cast(origin - center, direction)
                });
                side.into_iter()
                    .chain(caps)
                    .min_by(|a, b| a.0.total_cmp(&b.0))
            }
            ShapeKind::Cylinder {
                radius,
                half_height,
            } => {
                let lateral = origin.x * origin.x + origin.z * origin.z;
                if origin.y.abs() <= *half_height && lateral <= radius * radius {
                    return Some(inside());
                }
                let side = ray_cylinder_side(*radius, *half_height, origin, direction);
                let cap = if direction.y.abs() > 1e-12 {
                    let (plane, normal) = if direction.y < 0.0 {
                        (*half_height, Vec3::Y)
                    } else {
                        (-*half_height, Vec3::NEG_Y)
                    };
                    let lambda = (plane - origin.y) / direction.y;
                    let hit = origin + direction * lambda;
                    (lambda >= 0.0 && hit.x * hit.x + hit.z * hit.z <= radius * radius)
                        .then_some((lambda, normal))
                } else {
                    None
                };
                side.into_iter().chain(cap).min_by(|a, b| a.0.total_cmp(&b.0))
            }
            ShapeKind::Triangle { a, b, c } => ray_triangle(*a, *b, *c, origin, direction),
            ShapeKind::ConvexHull { .. } => NarrowPhase::ray_cast(self, origin, direction),
        }
    }
}

fn ray_box(half_extents: Vec3, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
    let bounds = Aabb::new(-half_extents, half_extents);
    if bounds.min.cmple(origin).all() && bounds.max.cmpge(origin).all() {
        return Some((0.0, -direction.normalize()));
    }
    let lambda = bounds.ray_entry(origin, direction, f32::MAX)?;
    let hit = origin + direction * lambda;
    // The entering face is the one whose plane the hit lies on most exactly.
    let relative = hit / half_extents;
    let magnitude = relative.abs();
    let axis = if magnitude.x >= magnitude.y && magnitude.x >= magnitude.z {
        0
    } else if magnitude.y >= magnitude.z {
        1
    } else {
        2
    };
    let mut normal = Vec3::ZERO;
    normal[axis] = relative[axis].signum();
    Some((lambda, normal))
}

fn ray_cylinder_side(radius: f32, half_height: f32, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
    let a = direction.x * direction.x + direction.z * direction.z;
    if a < 1e-12 {
        return None;
    }
    let b = origin.x * direction.x + origin.z * direction.z;
    let c = origin.x * origin.x + origin.z * origin.z - radius * radius;
    let discriminant = b * b - a * c;
    if discriminant < 0.0 {
        return None;
    }
    let lambda = (-b - discriminant.sqrt()) / a;
    if lambda < 0.0 {
        return None;
    }
    let hit = origin + direction * lambda;
    (hit.y.abs() <= half_height).then(|| (lambda, Vec3::new(hit.x, 0.0, hit.z) / radius))
}

fn ray_triangle(a: Vec3, b: Vec3, c: Vec3, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
    let ab = b - a;
    let ac = c - a;
    let p = direction.cross(ac);
    let det = ab.dot(p);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(ab);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let lambda = ac.dot(q) * inv_det;
    if lambda < 0.0 {
        return None;
    }
    let mut normal = ab.cross(ac).normalize();
    if normal.dot(direction) > 0.0 {
        normal = -normal;
    }
    Some((lambda, normal))
}

/// Layer/mask pair: two shapes may collide when each one's layer is in the other's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub layer: u32,
    pub mask: u32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            layer: 1,
            mask: u32::MAX,
        }
    }
}

impl CollisionFilter {
    pub fn allows(&self, other: &CollisionFilter) -> bool {
        (self.layer & other.mask) != 0 && (other.layer & self.mask) != 0
    }
}

/// Collision proxy attached to exactly one rigid body.
#[derive(Debug, Clone)]
pub struct Shape {
    pub kind: ShapeKind,
    /// Placement relative to the owning body.
    pub offset: Vec3,
    pub rotation: Quat,
    pub filter: CollisionFilter,
    pub density: f32,
    /// Shapes sharing a soft-body group never collide with each other.
    pub soft_body: Option<u64>,
    pub(crate) body: BodyHandle,
    pub(crate) id: u64,
    pub(crate) world_aabb: Aabb,
    pub(crate) proxy: Option<ProxyId>,
    /// Body pose the world AABB was last computed for.
    pub(crate) refit_pose: Option<(Quat, Vec3)>,
}

impl Shape {
    pub fn new(kind: ShapeKind) -> Self {
        Self {
            kind,
            offset: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            filter: CollisionFilter::default(),
            density: 1.0,
            soft_body: None,
            body: BodyHandle::INVALID,
            id: 0,
            world_aabb: Aabb::empty(),
            proxy: None,
            refit_pose: None,
        }
    }

    pub fn sphere(radius: f32) -> Self {
        Self::new(ShapeKind::Sphere { radius })
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::new(ShapeKind::Box { half_extents })
    }

    pub fn capsule(radius: f32, half_length: f32) -> Self {
        Self::new(ShapeKind::Capsule {
            radius,
            half_length,
        })
    }

    pub fn cylinder(radius: f32, half_height: f32) -> Self {
        Self::new(ShapeKind::Cylinder {
            radius,
            half_height,
        })
    }

    pub fn convex_hull(vertices: Vec<Vec3>) -> Self {
        Self::new(ShapeKind::ConvexHull { vertices })
    }

    pub fn triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self::new(ShapeKind::Triangle { a, b, c })
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation.normalize();
        self
    }

    pub fn with_filter(mut self, layer: u32, mask: u32) -> Self {
        self.filter = CollisionFilter { layer, mask };
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn in_soft_body(mut self, group: u64) -> Self {
        self.soft_body = Some(group);
        self
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// Unique id, stable for the lifetime of the shape.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn world_aabb(&self) -> Aabb {
        self.world_aabb
    }

    pub fn proxy(&self) -> Option<ProxyId> {
        self.proxy
    }

    /// World orientation and position given the owning body's pose.
    pub fn world_transform(&self, body_orientation: Quat, body_position: Vec3) -> (Quat, Vec3) {
        (
            body_orientation * self.rotation,
            body_position + body_orientation * self.offset,
        )
    }

    /// Mass properties in body space, including the shape offset.
    pub fn body_mass_properties(&self) -> MassProperties {
        let local = self.kind.mass_properties(self.density);
        let rotation = Mat3::from_quat(self.rotation);
        MassProperties {
            mass: local.mass,
            inertia: parallel_axis(
                rotation * local.inertia * rotation.transpose(),
                local.mass,
                self.offset,
            ),
        }
    }

    pub(crate) fn refresh_world_aabb(&mut self, body_orientation: Quat, body_position: Vec3) {
        let (orientation, position) = self.world_transform(body_orientation, body_position);
        self.world_aabb = self.kind.world_aabb(orientation, position);
        self.refit_pose = Some((body_orientation, body_position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cylinder_support_reaches_rim_and_cap() {
        let cylinder = ShapeKind::Cylinder {
            radius: 2.0,
            half_height: 0.5,
        };
        let point = cylinder.support(Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(point.y, 0.5);
        assert_relative_eq!(Vec3::new(point.x, 0.0, point.z).length(), 2.0, epsilon = 1e-5);
        let point = cylinder.support(Vec3::NEG_Y);
        assert_relative_eq!(point.y, -0.5);
    }

    #[test]
    fn rotated_box_aabb_encloses_corners() {
        let kind = ShapeKind::Box {
            half_extents: Vec3::new(1.0, 0.5, 0.25),
        };
        let rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_4);
        let bounds = kind.world_aabb(rotation, Vec3::new(3.0, 0.0, 0.0));
        let expected = (1.0 + 0.5) * std::f32::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(bounds.max.x - 3.0, expected, epsilon = 1e-5);
        assert_relative_eq!(bounds.max.z, 0.25, epsilon = 1e-5);
    }

    #[test]
    fn capsule_aabb_matches_support() {
        let kind = ShapeKind::Capsule {
            radius: 0.5,
            half_length: 1.0,
        };
        let bounds = kind.world_aabb(Quat::IDENTITY, Vec3::ZERO);
        assert_relative_eq!(bounds.max.y, 1.5, epsilon = 1e-5);
        assert_relative_eq!(bounds.min.x, -0.5, epsilon = 1e-5);
    }

    #[test]
    fn local_ray_casts_hit_expected_faces() {
        let origin = Vec3::new(-5.0, 0.0, 0.0);
        let sphere = ShapeKind::Sphere { radius: 1.0 };
        let (lambda, normal) = sphere.ray_cast(origin, Vec3::X).expect("sphere hit");
        assert_relative_eq!(lambda, 4.0, epsilon = 1e-5);
        assert_relative_eq!(normal.x, -1.0, epsilon = 1e-5);

        let cuboid = ShapeKind::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        let (lambda, normal) = cuboid.ray_cast(origin, Vec3::X * 2.0).expect("box hit");
        assert_relative_eq!(lambda, 2.0, epsilon = 1e-5);
        assert_eq!(normal, Vec3::NEG_X);

        let cylinder = ShapeKind::Cylinder {
            radius: 1.0,
            half_height: 1.0,
        };
        let (lambda, normal) = cylinder
            .ray_cast(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y)
            .expect("cylinder cap hit");
        assert_relative_eq!(lambda, 4.0, epsilon = 1e-5);
        assert_eq!(normal, Vec3::Y);

        let capsule = ShapeKind::Capsule {
            radius: 0.5,
            half_length: 1.0,
        };
        let (lambda, _) = capsule
            .ray_cast(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y)
            .expect("capsule cap hit");
        assert_relative_eq!(lambda, 3.5, epsilon = 1e-5);
        assert!(capsule.ray_cast(Vec3::new(2.0, 5.0, 0.0), Vec3::NEG_Y).is_none());

        let triangle = ShapeKind::Triangle {
            a: Vec3::new(-1.0, 0.0, -1.0),
            b: Vec3::new(1.0, 0.0, -1.0),
            c: Vec3::new(0.0, 0.0, 1.0),
        };
        let (lambda, normal) = triangle
            .ray_cast(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y)
            .expect("triangle hit");
        assert_relative_eq!(lambda, 2.0, epsilon = 1e-5);
        assert_relative_eq!(normal.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(ShapeKind::Sphere { radius: 0.0 }.validate().is_err());
        assert!(ShapeKind::ConvexHull { vertices: vec![] }.validate().is_err());
        assert!(ShapeKind::Box {
            half_extents: Vec3::ONE
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn filters_require_mutual_acceptance() {
        let a = CollisionFilter { layer: 0b01, mask: 0b10 };
        let b = CollisionFilter { layer: 0b10, mask: 0b01 };
        let c = CollisionFilter { layer: 0b10, mask: 0b10 };
        assert!(a.allows(&b));
        assert!(!a.allows(&c));
    }
}
