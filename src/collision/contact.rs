//! Persistent contact manifolds and their sequential-impulse rows.

use glam::{Vec2, Vec3};

use crate::{
    config::MAX_MANIFOLD_POINTS,
    core::{rigidbody::BodyHandle, shape::ShapeHandle, RigidBody},
    dynamics::solver::{SolverBody, SolverSettings},
    utils::math::tangent_basis,
};

/// Ordered pair of proxy ids identifying a manifold across steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArbiterKey {
    pub a: u64,
    pub b: u64,
}

impl ArbiterKey {
    pub fn new(a: u64, b: u64) -> Self {
        if a <= b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }
}

/// One persistent contact point.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactPoint {
    /// Anchors in the local frames of body 1 and body 2.
    pub local_anchor1: Vec3,
    pub local_anchor2: Vec3,
    pub point1: Vec3,
    pub point2: Vec3,
    /// From body 1 towards body 2.
    pub normal: Vec3,
    pub tangent1: Vec3,
    pub tangent2: Vec3,
    pub penetration: f32,
    pub normal_impulse: f32,
    pub friction_impulse: Vec2,

    r1: Vec3,
    r2: Vec3,
    normal_mass: f32,
    tangent_mass: Vec2,
    bias: f32,
}

impl ContactPoint {
    fn place(&mut self, point1: Vec3, point2: Vec3, normal: Vec3, penetration: f32, body1: &RigidBody, body2: &RigidBody) {
        self.point1 = point1;
        self.point2 = point2;
        self.local_anchor1 = body1.orientation.conjugate() * (point1 - body1.position);
        self.local_anchor2 = body2.orientation.conjugate() * (point2 - body2.position);
        self.penetration = penetration;
        self.set_normal(normal);
    }

    fn set_normal(&mut self, normal: Vec3) {
        let normal = normal.normalize_or(Vec3::Y);
        if normal.dot(self.normal) < 0.999 {
            // The friction basis only turns with the normal so warm starting stays coherent.
            let (t1, t2) = tangent_basis(normal);
            self.tangent1 = t1;
            self.tangent2 = t2;
        } else {
            self.tangent1 = (self.tangent1 - normal * normal.dot(self.tangent1)).normalize_or(self.tangent1);
            self.tangent2 = normal.cross(self.tangent1);
        }
        self.normal = normal;
    }
}

/// Up to [`MAX_MANIFOLD_POINTS`] contacts between two bodies.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub key: ArbiterKey,
    pub body1: BodyHandle,
    pub body2: BodyHandle,
    /// Shapes on each side; `None` for contacts registered by a filter.
    pub shape1: Option<ShapeHandle>,
    pub shape2: Option<ShapeHandle>,
    pub friction: f32,
    pub restitution: f32,
    points: [ContactPoint; MAX_MANIFOLD_POINTS],
    len: usize,
    pub(crate) touched: bool,
}

impl ContactManifold {
    pub fn new(key: ArbiterKey, body1: BodyHandle, body2: BodyHandle, friction: f32, restitution: f32) -> Self {
        Self {
            key,
            body1,
            body2,
            shape1: None,
            shape2: None,
            friction,
            restitution,
            points: [ContactPoint::default(); MAX_MANIFOLD_POINTS],
            len: 0,
            touched: true,
        }
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Recomputes world positions from the body poses and drops points that
    /// separated or slid further than `break_threshold`.
    pub fn refresh(&mut self, body1: &RigidBody, body2: &RigidBody, break_threshold: f32) {
        let mut i = 0;
        while i < self.len {
            let point = &mut self.points[i];
            point.point1 = body1.position + body1.orientation * point.local_anchor1;
            point.point2 = body2.position + body2.orientation * point.local_anchor2;
            let gap = point.point1 - point.point2;
            point.penetration = gap.dot(point.normal);
            let drift = (gap - point.normal * point.penetration).length_squared();

            if point.penetration < -break_threshold || drift > break_threshold * break_threshold {
                self.len -= 1;
                self.points[i] = self.points[self.len];
            } else {
                i += 1;
            }
        }
    }

    /// Adds a world-space contact. A point close to an existing one replaces
    /// its geometry and keeps its accumulated impulses; a full manifold drops
    /// its least deep point.
    #[allow(clippy::too_many_arguments)]
    pub fn add_point(
        &mut self,
        point1: Vec3,
        point2: Vec3,
        normal: Vec3,
        penetration: f32,
        body1: &RigidBody,
        body2: &RigidBody,
        match_threshold: f32,
    ) {
        let threshold_sq = match_threshold * match_threshold;
        if let Some(existing) = self.points[..self.len].iter_mut().find(|p| {
            (p.point1 - point1).length_squared() < threshold_sq || (p.point2 - point2).length_squared() < threshold_sq
        }) {
            existing.place(point1, point2, normal, penetration, body1, body2);
            return;
        }

        let mut point = ContactPoint::default();
        point.place(point1, point2, normal, penetration, body1, body2);

        if self.len < MAX_MANIFOLD_POINTS {
            self.points[self.len] = point;
            self.len += 1;
            return;
        }

        let (shallowest, depth) = self
            .points()
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.penetration))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, f32::INFINITY));
        if penetration > depth {
            self.points[shallowest] = point;
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Builds the per-point rows and applies the impulses cached from the last step.
    pub fn prepare(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, settings: &SolverSettings) {
        for point in &mut self.points[..self.len] {
            point.r1 = point.point1 - body1.position;
            point.r2 = point.point2 - body2.position;

            let k_normal = body1.effective_mass(point.r1, point.normal)
                + body2.effective_mass(point.r2, point.normal)
                + settings.softness * settings.inv_dt;
            point.normal_mass = if k_normal.is_finite() && k_normal > f32::EPSILON {
                1.0 / k_normal
            } else {
                0.0
            };

            let (r1, r2) = (point.r1, point.r2);
            let tangent_mass = |tangent: Vec3| {
                let k = body1.effective_mass(r1, tangent) + body2.effective_mass(r2, tangent);
                if k.is_finite() && k > f32::EPSILON {
                    1.0 / k
                } else {
                    0.0
                }
            };
            point.tangent_mass = Vec2::new(tangent_mass(point.tangent1), tangent_mass(point.tangent2));

            point.bias = -settings.bias_factor * settings.inv_dt * (point.penetration - settings.slop).max(0.0);
            let approach = (body2.velocity_at(point.r2) - body1.velocity_at(point.r1)).dot(point.normal);
            if approach < -settings.restitution_threshold {
                point.bias = point.bias.min(self.restitution * approach);
            }

            if point.normal_mass == 0.0 {
                continue;
            }
            let impulse = point.normal * point.normal_impulse
                + point.tangent1 * point.friction_impulse.x
                + point.tangent2 * point.friction_impulse.y;
            body1.apply_impulse(-impulse, point.r1);
            body2.apply_impulse(impulse, point.r2);
        }
    }

    pub fn iterate(&mut self, body1: &mut SolverBody, body2: &mut SolverBody, settings: &SolverSettings) {
        let friction = self.friction;
        for point in &mut self.points[..self.len] {
            if point.normal_mass == 0.0 {
                continue;
            }

            let relative = body2.velocity_at(point.r2) - body1.velocity_at(point.r1);
            let normal_velocity = relative.dot(point.normal);
            let lambda = -point.normal_mass
                * (normal_velocity + point.bias + point.normal_impulse * settings.softness * settings.inv_dt);
            let accumulated = (point.normal_impulse + lambda).max(0.0);
            let delta = accumulated - point.normal_impulse;
            point.normal_impulse = accumulated;
            let impulse = point.normal * delta;
            body1.apply_impulse(-impulse, point.r1);
            body2.apply_impulse(impulse, point.r2);

            let relative = body2.velocity_at(point.r2) - body1.velocity_at(point.r1);
            let lambda = Vec2::new(
                -point.tangent_mass.x * relative.dot(point.tangent1),
                -point.tangent_mass.y * relative.dot(point.tangent2),
            );
            let old = point.friction_impulse;
            point.friction_impulse = (old + lambda).clamp_length_max(friction * point.normal_impulse);
            let delta = point.friction_impulse - old;
            let impulse = point.tangent1 * delta.x + point.tangent2 * delta.y;
            body1.apply_impulse(-impulse, point.r1);
            body2.apply_impulse(impulse, point.r2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rigidbody::RigidBody;

    fn body_at(position: Vec3) -> RigidBody {
        let mut body = RigidBody::new(BodyHandle::INVALID);
        body.position = position;
        body
    }

    #[test]
    fn keys_are_order_independent() {
        assert_eq!(ArbiterKey::new(7, 3), ArbiterKey::new(3, 7));
        assert!(ArbiterKey::new(1, 9) < ArbiterKey::new(2, 3));
    }

    #[test]
    fn matching_point_keeps_impulse() {
        let ground = body_at(Vec3::ZERO);
        let body = body_at(Vec3::new(0.0, 1.0, 0.0));
        let mut manifold = ContactManifold::new(ArbiterKey::new(1, 2), BodyHandle::INVALID, BodyHandle::INVALID, 0.5, 0.0);

        manifold.add_point(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, 0.49, 0.0), Vec3::Y, 0.01, &ground, &body, 0.02);
        manifold.points[0].normal_impulse = 3.0;
        manifold.add_point(Vec3::new(0.005, 0.5, 0.0), Vec3::new(0.005, 0.48, 0.0), Vec3::Y, 0.02, &ground, &body, 0.02);

        assert_eq!(manifold.len(), 1);
        assert_eq!(manifold.points()[0].normal_impulse, 3.0);
        assert_eq!(manifold.points()[0].penetration, 0.02);
    }

    #[test]
    fn full_manifold_drops_least_deep_point() {
        let ground = body_at(Vec3::ZERO);
        let body = body_at(Vec3::Y);
        let mut manifold = ContactManifold::new(ArbiterKey::new(1, 2), BodyHandle::INVALID, BodyHandle::INVALID, 0.5, 0.0);
        for (i, depth) in [0.03, 0.01, 0.04, 0.02].into_iter().enumerate() {
            let x = i as f32;
            manifold.add_point(Vec3::new(x, 0.5, 0.0), Vec3::new(x, 0.5 - depth, 0.0), Vec3::Y, depth, &ground, &body, 0.02);
        }
        manifold.add_point(Vec3::new(9.0, 0.5, 0.0), Vec3::new(9.0, 0.45, 0.0), Vec3::Y, 0.05, &ground, &body, 0.02);
        let depths: Vec<f32> = manifold.points().iter().map(|p| p.penetration).collect();
        assert_eq!(manifold.len(), 4);
        assert!(!depths.contains(&0.01));
        assert!(depths.contains(&0.05));

        // Shallower than everything kept: ignored.
        manifold.add_point(Vec3::new(-9.0, 0.5, 0.0), Vec3::new(-9.0, 0.5, 0.0), Vec3::Y, 0.0, &ground, &body, 0.02);
        assert!(manifold.points().iter().all(|p| p.penetration > 0.0));
    }

    #[test]
    fn refresh_retires_separated_points() {
        let ground = body_at(Vec3::ZERO);
        let mut body = body_at(Vec3::Y);
        let mut manifold = ContactManifold::new(ArbiterKey::new(1, 2), BodyHandle::INVALID, BodyHandle::INVALID, 0.5, 0.0);
        manifold.add_point(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, 0.49, 0.0), Vec3::Y, 0.01, &ground, &body, 0.02);

        manifold.refresh(&ground, &body, 0.02);
        assert_eq!(manifold.len(), 1);

        body.position.y += 0.5;
        manifold.refresh(&ground, &body, 0.02);
        assert!(manifold.is_empty());
    }
}
