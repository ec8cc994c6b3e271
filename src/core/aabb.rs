use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box used by shapes and dynamic tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        Aabb::new(self.min - Vec3::splat(margin), self.max + Vec3::splat(margin))
    }

    /// Stretches the box along `displacement` (only the side the box moves towards).
    pub fn swept(&self, displacement: Vec3) -> Aabb {
        Aabb::new(
            self.min + displacement.min(Vec3::ZERO),
            self.max + displacement.max(Vec3::ZERO),
        )
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn surface_area(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Slab test: entry parameter of the ray `origin + t * direction` with
    /// `t` in `[0, max_lambda]`, or `None` when the ray misses.
    pub fn ray_entry(&self, origin: Vec3, direction: Vec3, max_lambda: f32) -> Option<f32> {
        let mut enter = 0.0_f32;
        let mut exit = max_lambda;
        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < 1e-12 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (self.min[axis] - o) * inv;
            let mut t1 = (self.max[axis] - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            enter = enter.max(t0);
            exit = exit.min(t1);
            if enter > exit {
                return None;
            }
        }
        Some(enter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ray_entry_reports_first_slab_crossing() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let entry = aabb
            .ray_entry(Vec3::new(-5.0, 0.0, 0.0), Vec3::X, f32::MAX)
            .expect("ray points at the box");
        assert_relative_eq!(entry, 4.0, epsilon = 1e-5);

        assert!(aabb.ray_entry(Vec3::new(-5.0, 2.0, 0.0), Vec3::X, f32::MAX).is_none());
        assert!(aabb.ray_entry(Vec3::new(-5.0, 0.0, 0.0), Vec3::X, 3.0).is_none());
        assert_eq!(aabb.ray_entry(Vec3::ZERO, Vec3::Y, 1.0), Some(0.0));
    }

    #[test]
    fn swept_only_grows_towards_motion() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let swept = aabb.swept(Vec3::new(2.0, -1.0, 0.0));
        assert_eq!(swept.min, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(swept.max, Vec3::new(3.0, 1.0, 1.0));
        assert!(swept.contains(&aabb));
    }
}
