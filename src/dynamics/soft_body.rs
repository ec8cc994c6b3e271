//! Soft bodies made of particle bodies joined by springs.

use std::collections::BTreeSet;

use glam::Vec3;

use crate::{
    core::{rigidbody::BodyHandle, Shape},
    dynamics::constraints::{ConstraintHandle, Spring},
    error::PhysicsResult,
    world::World,
};

/// Inverse mass of cloth particles; light particles keep the springs stiff.
pub const CLOTH_PARTICLE_INVERSE_MASS: f32 = 100.0;
pub const CLOTH_SPRING_SOFTNESS: f32 = 0.2;

/// Particles sharing a soft-body group, so their shapes never collide with
/// each other, plus the springs holding them together.
#[derive(Debug, Clone)]
pub struct SoftBody {
    group: u64,
    particles: Vec<BodyHandle>,
    springs: Vec<ConstraintHandle>,
}

impl SoftBody {
    /// Empty soft body with a fresh group id.
    pub fn new(world: &mut World) -> Self {
        let group = world.request_ids(1);
        Self {
            group,
            particles: Vec::new(),
            springs: Vec::new(),
        }
    }

    /// Rectangular cloth in the XZ plane starting at `origin`, triangulated
    /// per cell, with one spring per triangle edge.
    pub fn cloth(
        world: &mut World,
        origin: Vec3,
        columns: usize,
        rows: usize,
        spacing: f32,
        particle_radius: f32,
    ) -> PhysicsResult<Self> {
        let mut cloth = Self::new(world);
        for row in 0..rows {
            for column in 0..columns {
                let position = origin + Vec3::new(column as f32 * spacing, 0.0, row as f32 * spacing);
                cloth.add_particle(world, position, particle_radius, 1.0 / CLOTH_PARTICLE_INVERSE_MASS)?;
            }
        }

        let index = |column: usize, row: usize| row * columns + column;
        let mut edges = BTreeSet::new();
        let mut add_edge = |a: usize, b: usize| {
            edges.insert((a.min(b), a.max(b)));
        };
        for row in 0..rows.saturating_sub(1) {
            for column in 0..columns.saturating_sub(1) {
                let (v00, v10) = (index(column, row), index(column + 1, row));
                let (v01, v11) = (index(column, row + 1), index(column + 1, row + 1));
                for (a, b, c) in [(v00, v10, v11), (v00, v11, v01)] {
                    add_edge(a, b);
                    add_edge(a, c);
                    add_edge(b, c);
                }
            }
        }

        for (a, b) in edges {
            let (first, second) = (cloth.particles[a], cloth.particles[b]);
            cloth.connect(world, first, second, CLOTH_SPRING_SOFTNESS)?;
        }
        log::debug!(
            "built cloth with {} particles and {} springs",
            cloth.particles.len(),
            cloth.springs.len()
        );
        Ok(cloth)
    }

    /// Adds a sphere particle with translational mass only.
    pub fn add_particle(&mut self, world: &mut World, position: Vec3, radius: f32, mass: f32) -> PhysicsResult<BodyHandle> {
        let body = world.create_rigid_body();
        if let Some(particle) = world.body_mut(body) {
            particle.position = position;
            particle.set_translational_mass(mass);
        }
        if let Err(err) = world.add_shape(body, Shape::sphere(radius).in_soft_body(self.group)) {
            world.remove_body(body)?;
            return Err(err);
        }
        self.particles.push(body);
        Ok(body)
    }

    /// Joins two particles with a spring at their current distance.
    pub fn connect(
        &mut self,
        world: &mut World,
        first: BodyHandle,
        second: BodyHandle,
        softness: f32,
    ) -> PhysicsResult<ConstraintHandle> {
        let anchors = (
            world.body(first).map(|body| body.position),
            world.body(second).map(|body| body.position),
        );
        let (Some(anchor1), Some(anchor2)) = anchors else {
            return Err(crate::error::PhysicsError::unknown_body(if anchors.0.is_none() { first } else { second }));
        };
        let spring = Spring::new(anchor1, anchor2).with_softness(softness, Spring::DEFAULT_BIAS_FACTOR);
        let handle = world.create_constraint(first, second, spring)?;
        self.springs.push(handle);
        Ok(handle)
    }

    pub fn group(&self) -> u64 {
        self.group
    }

    pub fn particles(&self) -> &[BodyHandle] {
        &self.particles
    }

    pub fn springs(&self) -> &[ConstraintHandle] {
        &self.springs
    }

    /// Mean particle position.
    pub fn center(&self, world: &World) -> Vec3 {
        let positions: Vec<Vec3> = self
            .particles
            .iter()
            .filter_map(|particle| world.body(*particle).map(|body| body.position))
            .collect();
        if positions.is_empty() {
            return Vec3::ZERO;
        }
        positions.iter().copied().sum::<Vec3>() / positions.len() as f32
    }

    /// Removes every particle; their springs go with them.
    pub fn remove(self, world: &mut World) -> PhysicsResult<()> {
        for particle in self.particles {
            world.remove_body(particle)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::WorldConfig, dynamics::constraints::ConstraintKind};

    #[test]
    fn cloth_has_one_spring_per_triangle_edge() {
        let mut world = World::default();
        let cloth = SoftBody::cloth(&mut world, Vec3::ZERO, 3, 3, 0.5, 0.1).expect("cloth");
        assert_eq!(cloth.particles().len(), 9);
        // 12 grid edges plus one diagonal per cell.
        assert_eq!(cloth.springs().len(), 16);
    }

    #[test]
    fn overlapping_particles_of_one_cloth_never_collide() {
        let mut world = World::new(WorldConfig::default().with_gravity(Vec3::ZERO));
        SoftBody::cloth(&mut world, Vec3::ZERO, 4, 4, 0.2, 0.3).expect("cloth");
        world.step(0.01, false).expect("step");
        assert_eq!(world.manifolds().count(), 0);
    }

    #[test]
    fn groups_far_apart_in_id_space_stay_distinct() {
        let mut world = World::new(WorldConfig::default().with_gravity(Vec3::ZERO));
        let mut first = SoftBody::new(&mut world);
        world.request_ids((1 << 32) - 1);
        let mut second = SoftBody::new(&mut world);
        assert_eq!(second.group() - first.group(), 1 << 32);

        first.add_particle(&mut world, Vec3::ZERO, 0.3, 1.0).expect("particle");
        second.add_particle(&mut world, Vec3::new(0.4, 0.0, 0.0), 0.3, 1.0).expect("particle");
        world.step(0.01, false).expect("step");
        assert_eq!(world.manifolds().count(), 1);
    }

    #[test]
    fn pinned_cloth_hangs_with_bounded_stretch() {
        let mut world = World::new(WorldConfig::default().with_sleeping(false));
        let cloth = SoftBody::cloth(&mut world, Vec3::new(0.0, 5.0, 0.0), 5, 5, 0.25, 0.05).expect("cloth");
        for column in 0..5 {
            world.set_static(cloth.particles()[column], true).expect("pin");
        }
        for _ in 0..120 {
            world.step(0.01, false).expect("step");
        }

        for handle in cloth.springs() {
            let constraint = world.constraint(*handle).expect("spring");
            let ConstraintKind::Spring(spring) = constraint.kind() else {
                panic!("cloth edges are springs");
            };
            let (Some(body1), Some(body2)) = (world.body(constraint.body1()), world.body(constraint.body2())) else {
                panic!("particles exist");
            };
            let stretch = spring.current_length(body1, body2) / spring.rest_length();
            assert!(stretch < 1.5, "spring stretched by {stretch}");
        }
        assert!(cloth.center(&world).y < 5.0);
        assert!(cloth.center(&world).is_finite());
    }
}
