use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    collision::contact::{ArbiterKey, ContactManifold},
    config::WorldConfig,
    core::rigidbody::{BodyHandle, RigidBody},
    dynamics::constraints::{Constraint, ConstraintHandle},
    utils::allocator::Arena,
};

/// Connected set of dynamic bodies that can be solved independently.
#[derive(Debug, Clone, Default)]
pub struct Island {
    pub bodies: Vec<BodyHandle>,
    pub constraints: Vec<ConstraintHandle>,
    pub manifolds: Vec<ArbiterKey>,
    pub is_awake: bool,
}

/// Rebuilds islands every step and manages sleeping state.
#[derive(Debug, Default)]
pub struct IslandManager {
    islands: Vec<Island>,
    adjacency: HashMap<BodyHandle, Vec<BodyHandle>>,
}

impl IslandManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partitions the non-static bodies into connected components. Edges are
    /// manifolds holding at least one point and enabled constraints; static
    /// bodies end edges but never join an island. Bodies are visited in arena
    /// order, constraints by handle and manifolds by key, so the layout only
    /// depends on the world contents.
    pub fn build_islands(
        &mut self,
        bodies: &mut Arena<RigidBody>,
        manifolds: &BTreeMap<ArbiterKey, ContactManifold>,
        constraints: &Arena<Constraint>,
    ) {
        self.islands.clear();
        self.adjacency.clear();

        let is_dynamic = |bodies: &Arena<RigidBody>, handle: BodyHandle| {
            bodies.get(handle).is_some_and(|body| !body.is_static())
        };

        let manifold_edges = manifolds
            .values()
            .filter(|manifold| !manifold.is_empty())
            .map(|manifold| (manifold.body1, manifold.body2));
        let constraint_edges = constraints
            .values()
            .filter(|constraint| constraint.is_enabled())
            .map(|constraint| (constraint.body1(), constraint.body2()));
        for (body1, body2) in manifold_edges.chain(constraint_edges) {
            if is_dynamic(bodies, body1) && is_dynamic(bodies, body2) {
                self.adjacency.entry(body1).or_default().push(body2);
                self.adjacency.entry(body2).or_default().push(body1);
            }
        }

        let mut visited = HashSet::new();
        let handles: Vec<BodyHandle> = bodies
            .iter()
            .filter(|(_, body)| !body.is_static())
            .map(|(handle, _)| handle)
            .collect();
        for handle in handles {
            if visited.contains(&handle) {
                continue;
            }
            let members = self.depth_first_collect(handle, &mut visited);
            let index = self.islands.len();
            let mut is_awake = false;
            for member in &members {
                if let Some(body) = bodies.get_mut(*member) {
                    body.island = Some(index);
                    is_awake |= body.is_active();
                }
            }
            self.islands.push(Island {
                bodies: members,
                is_awake,
                ..Island::default()
            });
        }
        for (_, body) in bodies.iter_mut().filter(|(_, body)| body.is_static()) {
            body.island = None;
        }

        let island_of = |bodies: &Arena<RigidBody>, body1: BodyHandle, body2: BodyHandle| {
            [body1, body2]
                .into_iter()
                .find_map(|handle| bodies.get(handle).and_then(RigidBody::island))
        };
        for (handle, constraint) in constraints.iter() {
            if !constraint.is_enabled() {
                continue;
            }
            if let Some(index) = island_of(bodies, constraint.body1(), constraint.body2()) {
                self.islands[index].constraints.push(handle);
            }
        }
        for (key, manifold) in manifolds {
            if manifold.is_empty() {
                continue;
            }
            if let Some(index) = island_of(bodies, manifold.body1, manifold.body2) {
                self.islands[index].manifolds.push(*key);
            }
        }
    }

    fn depth_first_collect(&self, start: BodyHandle, visited: &mut HashSet<BodyHandle>) -> Vec<BodyHandle> {
        let mut stack = vec![start];
        let mut result = Vec::new();

        while let Some(node) = stack.pop() {
            if visited.insert(node) {
                result.push(node);
                if let Some(neighbors) = self.adjacency.get(&node) {
                    stack.extend(neighbors.iter().rev().copied());
                }
            }
        }

        result
    }

    /// Wakes every body of an island that holds at least one awake body.
    /// Returns how many sleeping bodies were woken.
    pub fn propagate_wake(&mut self, bodies: &mut Arena<RigidBody>) -> usize {
        let mut woken = 0;
        for island in self.islands.iter().filter(|island| island.is_awake) {
            for handle in &island.bodies {
                if let Some(body) = bodies.get_mut(*handle) {
                    if !body.is_active {
                        body.is_active = true;
                        body.sleep_counter = 0;
                        woken += 1;
                    }
                }
            }
        }
        woken
    }

    /// Counts low-motion steps per body and puts islands to sleep once every
    /// member has been calm for `sleep_steps` consecutive steps.
    pub fn update_sleeping(&mut self, bodies: &mut Arena<RigidBody>, config: &WorldConfig) {
        let linear_sq = config.sleep_linear_threshold * config.sleep_linear_threshold;
        let angular_sq = config.sleep_angular_threshold * config.sleep_angular_threshold;

        for island in self.islands.iter_mut().filter(|island| island.is_awake) {
            let mut sleepable = config.allow_sleeping;
            for handle in &island.bodies {
                if let Some(body) = bodies.get_mut(*handle) {
                    let calm = body.velocity.length_squared() < linear_sq
                        && body.angular_velocity.length_squared() < angular_sq;
                    body.sleep_counter = if calm { body.sleep_counter.saturating_add(1) } else { 0 };
                    sleepable &= body.sleep_counter >= config.sleep_steps;
                }
            }

            if sleepable {
                island.is_awake = false;
                for handle in &island.bodies {
                    if let Some(body) = bodies.get_mut(*handle) {
                        body.is_active = false;
                        body.velocity = glam::Vec3::ZERO;
                        body.angular_velocity = glam::Vec3::ZERO;
                    }
                }
                log::debug!("island of {} bodies went to sleep", island.bodies.len());
            }
        }
    }

    /// Drops a removed body from the island it belonged to.
    pub fn detach_body(&mut self, handle: BodyHandle, island: Option<usize>) {
        if let Some(island) = island.and_then(|index| self.islands.get_mut(index)) {
            island.bodies.retain(|member| *member != handle);
        }
    }

    pub fn detach_constraint(&mut self, handle: ConstraintHandle) {
        for island in &mut self.islands {
            island.constraints.retain(|member| *member != handle);
        }
    }

    pub fn detach_manifold(&mut self, key: ArbiterKey) {
        for island in &mut self.islands {
            island.manifolds.retain(|member| *member != key);
        }
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    pub fn awake_islands(&self) -> impl Iterator<Item = &Island> + '_ {
        self.islands.iter().filter(|island| island.is_awake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::constraints::{BallSocket, ConstraintKind};
    use glam::Vec3;

    fn world_with_bodies(count: usize) -> (Arena<RigidBody>, Vec<BodyHandle>) {
        let mut bodies = Arena::new();
        let handles = (0..count)
            .map(|_| bodies.insert_with(RigidBody::new))
            .collect();
        (bodies, handles)
    }

    fn link(
        constraints: &mut Arena<Constraint>,
        bodies: &Arena<RigidBody>,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle {
        let (Some(body1), Some(body2)) = (bodies.get(a), bodies.get(b)) else {
            panic!("bodies exist");
        };
        let mut kind = ConstraintKind::from(BallSocket::new(Vec3::ZERO));
        kind.initialize(body1, body2);
        constraints.insert_with(|handle| Constraint::new(handle, a, b, kind))
    }

    #[test]
    fn constraint_joins_two_bodies_third_stays_alone() {
        let (mut bodies, handles) = world_with_bodies(3);
        let mut constraints = Arena::new();
        let joint = link(&mut constraints, &bodies, handles[0], handles[1]);
        let manifolds = BTreeMap::new();

        let mut manager = IslandManager::new();
        manager.build_islands(&mut bodies, &manifolds, &constraints);
        assert_eq!(manager.islands().len(), 2);
        assert_eq!(manager.islands()[0].constraints, vec![joint]);

        constraints.remove(joint);
        manager.build_islands(&mut bodies, &manifolds, &constraints);
        assert_eq!(manager.islands().len(), 3);
    }

    #[test]
    fn static_bodies_split_islands() {
        let (mut bodies, handles) = world_with_bodies(3);
        if let Some(ground) = bodies.get_mut(handles[1]) {
            ground.is_static = true;
        }
        let mut constraints = Arena::new();
        link(&mut constraints, &bodies, handles[0], handles[1]);
        link(&mut constraints, &bodies, handles[1], handles[2]);

        let mut manager = IslandManager::new();
        manager.build_islands(&mut bodies, &BTreeMap::new(), &constraints);
        assert_eq!(manager.islands().len(), 2);
        assert!(manager.islands().iter().all(|island| island.constraints.len() == 1));
        assert_eq!(bodies.get(handles[1]).and_then(RigidBody::island), None);
    }

    #[test]
    fn calm_island_falls_asleep_after_enough_steps() {
        let (mut bodies, _) = world_with_bodies(2);
        let config = WorldConfig {
            sleep_steps: 3,
            ..WorldConfig::default()
        };
        let mut manager = IslandManager::new();
        for _ in 0..3 {
            manager.build_islands(&mut bodies, &BTreeMap::new(), &Arena::new());
            manager.update_sleeping(&mut bodies, &config);
        }
        assert!(bodies.values().all(|body| !body.is_active()));

        manager.build_islands(&mut bodies, &BTreeMap::new(), &Arena::new());
        assert_eq!(manager.awake_islands().count(), 0);
    }
}
