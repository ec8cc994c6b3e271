use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};

use glam::Vec3;

mod proxy;
mod stepper;

pub use proxy::{BroadPhaseFilter, ContactContext, ExternalEntry, ExternalHandle, ExternalProxy, ProxyRef, RayHit};
pub use stepper::FixedStepper;

use proxy::RegisteredContact;

use crate::{
    collision::{
        contact::{ArbiterKey, ContactManifold},
        dynamic_tree::DynamicTree,
        narrow_phase::{NarrowPhase, OverlapSet},
    },
    config::WorldConfig,
    core::{
        rigidbody::BodyHandle,
        shape::ShapeHandle,
        types::{MassProperties, Material},
        RigidBody, Shape,
    },
    dynamics::{
        constraints::{check_payload_size, Constraint, ConstraintHandle, ConstraintKind},
        island::{Island, IslandManager},
        solver::{solve_islands, BodyLoad, IslandJob, JobConstraint, JobContact, SolverBody, SolverSettings},
    },
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::Arena,
        logging::{warn_if_step_budget_exceeded, ScopedTimer},
        profiling::{PhaseTimer, StepProfile},
        slim_bag::SlimBag,
    },
};

/// Shape pair that went through the narrow phase, ordered by shape id.
#[derive(Debug, Clone, Copy)]
struct NarrowResult {
    shape1: ShapeHandle,
    shape2: ShapeHandle,
    overlaps: OverlapSet,
}

/// Central simulation container: owns every body, shape, constraint and
/// manifold and advances them with [`World::step`].
pub struct World {
    config: WorldConfig,
    bodies: Arena<RigidBody>,
    shapes: Arena<Shape>,
    constraints: Arena<Constraint>,
    externals: Arena<ExternalEntry>,
    manifolds: BTreeMap<ArbiterKey, ContactManifold>,
    tree: DynamicTree<ProxyRef>,
    islands: IslandManager,
    filter: Option<Box<dyn BroadPhaseFilter>>,
    null_body: BodyHandle,
    next_id: u64,
    profile: StepProfile,
    narrow_results: SlimBag<NarrowResult>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        let mut bodies = Arena::new();
        let null_body = bodies.insert_with(|handle| {
            let mut body = RigidBody::new(handle);
            body.is_static = true;
            body.mass_from_shapes = false;
            body.affected_by_gravity = false;
            body
        });

        Self {
            tree: DynamicTree::new(config.tree_margin),
            config,
            bodies,
            shapes: Arena::new(),
            constraints: Arena::new(),
            externals: Arena::new(),
            manifolds: BTreeMap::new(),
            islands: IslandManager::new(),
            filter: None,
            null_body,
            next_id: 1,
            profile: StepProfile::default(),
            narrow_results: SlimBag::with_capacity(64),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Tunables take effect on the next step. The tree margin only applies to
    /// proxies inserted or reinserted afterwards.
    pub fn config_mut(&mut self) -> &mut WorldConfig {
        &mut self.config
    }

    /// Static anchor owned by the world; constraints and injected contacts
    /// use it as their fixed end.
    pub fn null_body(&self) -> BodyHandle {
        self.null_body
    }

    /// Reserves `count` consecutive ids for manifold keys and returns the first.
    pub fn request_ids(&mut self, count: u64) -> u64 {
        let first = self.next_id;
        self.next_id += count;
        first
    }

    pub fn create_rigid_body(&mut self) -> BodyHandle {
        let handle = self.bodies.insert_with(RigidBody::new);
        log::debug!("created body {handle:?}");
        handle
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    /// Direct access to pose, velocity and forces. Changes to a sleeping body
    /// only matter once it is woken with [`World::activate`].
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> + '_ {
        self.bodies.iter()
    }

    pub fn shape(&self, handle: ShapeHandle) -> Option<&Shape> {
        self.shapes.get(handle)
    }

    pub fn shapes(&self) -> impl Iterator<Item = (ShapeHandle, &Shape)> + '_ {
        self.shapes.iter()
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Option<&Constraint> {
        self.constraints.get(handle)
    }

    pub fn constraint_mut(&mut self, handle: ConstraintHandle) -> Option<&mut Constraint> {
        self.constraints.get_mut(handle)
    }

    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintHandle, &Constraint)> + '_ {
        self.constraints.iter()
    }

    pub fn external(&self, handle: ExternalHandle) -> Option<&ExternalEntry> {
        self.externals.get(handle)
    }

    pub fn manifolds(&self) -> impl Iterator<Item = &ContactManifold> + '_ {
        self.manifolds.values()
    }

    pub fn manifold(&self, key: ArbiterKey) -> Option<&ContactManifold> {
        self.manifolds.get(&key)
    }

    /// Islands built during the last step.
    pub fn islands(&self) -> &[Island] {
        self.islands.islands()
    }

    /// Timings and counters of the last step.
    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    pub fn tree(&self) -> &DynamicTree<ProxyRef> {
        &self.tree
    }

    /// Attaches `shape` to `body` and registers it with the broad phase. The
    /// body mass is recomputed unless it was set explicitly.
    pub fn add_shape(&mut self, body: BodyHandle, mut shape: Shape) -> PhysicsResult<ShapeHandle> {
        shape.kind.validate()?;
        if !(shape.density > 0.0) || !shape.density.is_finite() {
            return Err(PhysicsError::invalid_shape(format!("density {}", shape.density)));
        }
        let Some(owner) = self.bodies.get(body) else {
            return Err(PhysicsError::unknown_body(body));
        };
        let (orientation, position, is_static) = (owner.orientation, owner.position, owner.is_static());

        shape.body = body;
        shape.id = self.request_ids(1);
        shape.refresh_world_aabb(orientation, position);
        let aabb = shape.world_aabb;
        let handle = self.shapes.insert(shape);
        let proxy = self.tree.add_proxy(ProxyRef::Shape(handle), aabb, !is_static);
        if let Some(shape) = self.shapes.get_mut(handle) {
            shape.proxy = Some(proxy);
        }
        if let Some(owner) = self.bodies.get_mut(body) {
            owner.shapes.push(handle);
        }

        self.update_body_mass(body);
        self.wake(body);
        Ok(handle)
    }

    pub fn remove_shape(&mut self, handle: ShapeHandle) -> PhysicsResult<()> {
        let shape = self
            .shapes
            .remove(handle)
            .ok_or_else(|| PhysicsError::unknown_shape(handle))?;
        if let Some(proxy) = shape.proxy {
            self.tree.remove_proxy(proxy);
        }
        if let Some(owner) = self.bodies.get_mut(shape.body) {
            owner.shapes.retain(|member| *member != handle);
        }

        let id = shape.id;
        self.drop_manifolds(|manifold| manifold.key.a == id || manifold.key.b == id);
        self.update_body_mass(shape.body);
        self.wake(shape.body);
        Ok(())
    }

    /// Removes a body together with its shapes, constraints and contacts.
    /// Bodies it was touching are woken.
    pub fn remove_body(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        if handle == self.null_body {
            return Err(PhysicsError::NullBodyRemoval);
        }
        let Some(body) = self.bodies.get(handle) else {
            return Err(PhysicsError::unknown_body(handle));
        };
        let shapes = body.shapes.clone();
        let constraints = body.constraints.clone();
        let island = body.island;

        for constraint in constraints {
            self.detach_constraint(constraint);
        }
        for shape in shapes {
            if let Some(shape) = self.shapes.remove(shape) {
                if let Some(proxy) = shape.proxy {
                    self.tree.remove_proxy(proxy);
                }
            }
        }
        self.drop_manifolds(|manifold| manifold.body1 == handle || manifold.body2 == handle);
        self.islands.detach_body(handle, island);
        self.bodies.remove(handle);
        log::debug!("removed body {handle:?}");
        Ok(())
    }

    /// Connects two bodies with a constraint. `body1` may be the null body.
    pub fn create_constraint(
        &mut self,
        body1: BodyHandle,
        body2: BodyHandle,
        init: impl Into<ConstraintKind>,
    ) -> PhysicsResult<ConstraintHandle> {
        let mut kind = init.into();
        let Some(first) = self.bodies.get(body1) else {
            return Err(PhysicsError::unknown_body(body1));
        };
        let Some(second) = self.bodies.get(body2) else {
            return Err(PhysicsError::unknown_body(body2));
        };
        if body1 == body2 {
            return Err(PhysicsError::SelfConstraint(format!("{body1:?}")));
        }
        check_payload_size(kind.payload_size())?;

        kind.initialize(first, second);
        let handle = self
            .constraints
            .insert_with(|handle| Constraint::new(handle, body1, body2, kind));
        for body in [body1, body2] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.constraints.push(handle);
            }
            self.wake(body);
        }
        log::debug!("created {} constraint {handle:?}", kind.name());
        Ok(handle)
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> PhysicsResult<()> {
        if !self.constraints.contains(handle) {
            return Err(PhysicsError::unknown_constraint(handle));
        }
        self.detach_constraint(handle);
        Ok(())
    }

    /// Disabled constraints stay attached but are ignored by islands and the solver.
    pub fn set_constraint_enabled(&mut self, handle: ConstraintHandle, enabled: bool) -> PhysicsResult<()> {
        let constraint = self
            .constraints
            .get_mut(handle)
            .ok_or_else(|| PhysicsError::unknown_constraint(handle))?;
        constraint.enabled = enabled;
        let (body1, body2) = (constraint.body1(), constraint.body2());
        self.wake(body1);
        self.wake(body2);
        Ok(())
    }

    /// Wakes a sleeping body; its island follows on the next step.
    pub fn activate(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        if !self.bodies.contains(handle) {
            return Err(PhysicsError::unknown_body(handle));
        }
        self.wake(handle);
        Ok(())
    }

    /// Puts a body to sleep right away. Anything touching it wakes it again.
    pub fn deactivate(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(handle)
            .ok_or_else(|| PhysicsError::unknown_body(handle))?;
        if !body.is_static {
            body.is_active = false;
            body.velocity = Vec3::ZERO;
            body.angular_velocity = Vec3::ZERO;
        }
        Ok(())
    }

    /// Turns a body into immovable geometry or back into a dynamic body.
    pub fn set_static(&mut self, handle: BodyHandle, is_static: bool) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(handle)
            .ok_or_else(|| PhysicsError::unknown_body(handle))?;
        if handle == self.null_body || body.is_static == is_static {
            return Ok(());
        }
        body.is_static = is_static;
        body.velocity = Vec3::ZERO;
        body.angular_velocity = Vec3::ZERO;
        body.is_active = true;
        body.sleep_counter = 0;
        let shapes = body.shapes.clone();

        // Static proxies are stored without margin.
        for shape in shapes {
            let Some(shape) = self.shapes.get_mut(shape) else { continue };
            if let Some(proxy) = shape.proxy.take() {
                let payload = self.tree.remove_proxy(proxy);
                shape.proxy = Some(self.tree.add_proxy(payload, shape.world_aabb, !is_static));
            }
        }
        self.update_body_mass(handle);
        Ok(())
    }

    /// Installs the hook consulted for every broad-phase pair.
    pub fn set_broad_phase_filter(&mut self, filter: Box<dyn BroadPhaseFilter>) {
        self.filter = Some(filter);
    }

    pub fn clear_broad_phase_filter(&mut self) -> Option<Box<dyn BroadPhaseFilter>> {
        self.filter.take()
    }

    /// Inserts host geometry into the broad phase.
    pub fn add_external_proxy(&mut self, proxy: Box<dyn ExternalProxy>) -> ExternalHandle {
        let aabb = proxy.world_aabb();
        let id = self.request_ids(1);
        let handle = self.externals.insert(ExternalEntry {
            proxy,
            id,
            tree_proxy: 0,
        });
        let tree_proxy = self.tree.add_proxy(ProxyRef::External(handle), aabb, false);
        if let Some(entry) = self.externals.get_mut(handle) {
            entry.tree_proxy = tree_proxy;
        }
        handle
    }

    /// Re-reads the box of an external proxy after the host changed it.
    pub fn update_external_proxy(&mut self, handle: ExternalHandle) -> PhysicsResult<()> {
        let entry = self
            .externals
            .get(handle)
            .ok_or_else(|| PhysicsError::unknown_external(handle))?;
        self.tree.update(entry.tree_proxy, entry.proxy.world_aabb(), Vec3::ZERO);
        Ok(())
    }

    pub fn remove_external_proxy(&mut self, handle: ExternalHandle) -> PhysicsResult<Box<dyn ExternalProxy>> {
        let entry = self
            .externals
            .remove(handle)
            .ok_or_else(|| PhysicsError::unknown_external(handle))?;
        self.tree.remove_proxy(entry.tree_proxy);
        Ok(entry.proxy)
    }

    /// Closest hit of the ray `origin + lambda * direction` over shapes and
    /// external proxies. `pre` can skip a proxy before it is tested and `post`
    /// can reject a hit, in which case the search goes on.
    pub fn ray_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_lambda: Option<f32>,
        mut pre: impl FnMut(ProxyRef) -> bool,
        mut post: impl FnMut(&RayHit) -> bool,
    ) -> Option<RayHit> {
        if !origin.is_finite() || !direction.is_finite() || direction.length_squared() < f32::EPSILON {
            return None;
        }
        let hit = self.tree.ray_cast(
            origin,
            direction,
            max_lambda.unwrap_or(f32::INFINITY),
            &mut pre,
            |hit| {
                post(&RayHit {
                    proxy: hit.proxy,
                    normal: hit.normal,
                    lambda: hit.lambda,
                })
            },
            |proxy| self.ray_cast_proxy(proxy, origin, direction),
        )?;
        Some(RayHit {
            proxy: hit.proxy,
            normal: hit.normal,
            lambda: hit.lambda,
        })
    }

    fn ray_cast_proxy(&self, proxy: ProxyRef, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
        match proxy {
            ProxyRef::Shape(handle) => {
                let shape = self.shapes.get(handle)?;
                let body = self.bodies.get(shape.body)?;
                let (orientation, position) = shape.world_transform(body.orientation, body.position);
                let inverse = orientation.conjugate();
                let (lambda, normal) = shape.kind.ray_cast(inverse * (origin - position), inverse * direction)?;
                Some((lambda, orientation * normal))
            }
            ProxyRef::External(handle) => self.externals.get(handle)?.proxy.ray_cast(origin, direction),
        }
    }

    /// Advances the simulation by `dt` seconds. Islands and the narrow phase
    /// run on the rayon pool when `multithreaded` is set.
    pub fn step(&mut self, dt: f32, multithreaded: bool) -> PhysicsResult<()> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(PhysicsError::InvalidTimeStep(dt));
        }
        if dt == 0.0 {
            return Ok(());
        }

        let started = Instant::now();
        let mut profile = StepProfile::default();
        let settings = SolverSettings::new(&self.config, dt);

        let (pairs, registered) = {
            let _timer = ScopedTimer::new("broad_phase");
            let _phase = PhaseTimer::new(&mut profile.broad_phase_time);
            self.refit_proxies(dt);
            self.collect_pairs()
        };
        profile.pair_count = pairs.len() + registered.len();

        {
            let _timer = ScopedTimer::new("narrow_phase");
            let _phase = PhaseTimer::new(&mut profile.narrow_phase_time);
            for manifold in self.manifolds.values_mut() {
                manifold.touched = false;
            }
            self.run_narrow_phase(&pairs, multithreaded);
            let results: Vec<NarrowResult> = self.narrow_results.drain().collect();
            for result in results {
                self.apply_narrow_result(&result);
            }
            for contact in registered {
                self.merge_contacts(
                    contact.key,
                    contact.body1,
                    contact.body2,
                    None,
                    [(contact.point1, contact.point2, contact.normal, contact.penetration)],
                );
            }
            self.retire_manifolds();
        }

        {
            let _timer = ScopedTimer::new("islands::build");
            let _phase = PhaseTimer::new(&mut profile.island_time);
            self.islands
                .build_islands(&mut self.bodies, &self.manifolds, &self.constraints);
            let woken = self.islands.propagate_wake(&mut self.bodies);
            if woken > 0 {
                log::debug!("contacts woke {woken} bodies");
            }
        }

        let mut jobs: Vec<IslandJob> = self
            .islands
            .awake_islands()
            .filter_map(|island| self.prepare_island_job(island))
            .collect();
        {
            let label = if multithreaded { "solver::parallel" } else { "solver::sequential" };
            let _timer = ScopedTimer::new(label);
            let _phase = PhaseTimer::new(&mut profile.solver_time);
            solve_islands(&mut jobs, &settings, multithreaded);
        }

        {
            let _timer = ScopedTimer::new("integrator");
            let _phase = PhaseTimer::new(&mut profile.integrator_time);
            self.write_back(jobs);
            for body in self.bodies.values_mut() {
                body.clear_accumulators();
            }
            self.islands.update_sleeping(&mut self.bodies, &self.config);
        }

        profile.body_count = self.bodies.len();
        profile.active_body_count = self
            .bodies
            .values()
            .filter(|body| body.is_active() && !body.is_static())
            .count();
        profile.manifold_count = self.manifolds.len();
        profile.contact_count = self.manifolds.values().map(ContactManifold::len).sum();
        profile.island_count = self.islands.islands().len();
        profile.total_time = started.elapsed();
        profile.report();
        warn_if_step_budget_exceeded(profile.total_time, self.config.step_budget_ms);
        self.profile = profile;
        Ok(())
    }

    fn refit_proxies(&mut self, dt: f32) {
        for shape in self.shapes.values_mut() {
            let Some(body) = self.bodies.get(shape.body) else { continue };
            if !body.is_active() && !body.is_static() {
                continue;
            }
            // Static bodies only need a refit after something moved them.
            if body.is_static() && shape.refit_pose == Some((body.orientation, body.position)) {
                continue;
            }
            shape.refresh_world_aabb(body.orientation, body.position);
            if let Some(proxy) = shape.proxy {
                let displacement = if body.is_static() { Vec3::ZERO } else { body.velocity * dt };
                self.tree.update(proxy, shape.world_aabb, displacement);
            }
        }
    }

    /// Overlapping proxy pairs that passed both filters, plus the contacts the
    /// user filter injected on the way.
    fn collect_pairs(&mut self) -> (Vec<(ShapeHandle, ShapeHandle)>, Vec<RegisteredContact>) {
        let mut user_filter = self.filter.take();
        let mut context = ContactContext {
            bodies: &self.bodies,
            shapes: &self.shapes,
            externals: &self.externals,
            null_body: self.null_body,
            registered: Vec::new(),
        };
        let mut pairs = Vec::new();

        self.tree.enumerate_pairs(
            |a, b| default_pair_filter(&self.bodies, &self.shapes, a, b),
            |a, b| {
                if let Some(filter) = user_filter.as_mut() {
                    if !filter.filter(&mut context, a, b) {
                        return;
                    }
                }
                if let (ProxyRef::Shape(first), ProxyRef::Shape(second)) = (a, b) {
                    pairs.push((first, second));
                }
            },
        );

        let registered = context.registered;
        self.filter = user_filter;
        (pairs, registered)
    }

    fn run_narrow_phase(&self, pairs: &[(ShapeHandle, ShapeHandle)], multithreaded: bool) {
        let shapes = &self.shapes;
        let bodies = &self.bodies;
        let results = &self.narrow_results;

        let collide = |&(a, b): &(ShapeHandle, ShapeHandle)| {
            let (Some(shape_a), Some(shape_b)) = (shapes.get(a), shapes.get(b)) else {
                return;
            };
            let (shape1, shape2, first, second) = if shape_a.id <= shape_b.id {
                (a, b, shape_a, shape_b)
            } else {
                (b, a, shape_b, shape_a)
            };
            let (Some(body1), Some(body2)) = (bodies.get(first.body), bodies.get(second.body)) else {
                return;
            };
            let (orientation1, position1) = first.world_transform(body1.orientation, body1.position);
            let (orientation2, position2) = second.world_transform(body2.orientation, body2.position);
            let overlaps = NarrowPhase::collide(
                &first.kind,
                orientation1,
                position1,
                &second.kind,
                orientation2,
                position2,
            );
            if !overlaps.is_empty() {
                results.concurrent_add(NarrowResult {
                    shape1,
                    shape2,
                    overlaps,
                });
            }
        };

        #[cfg(feature = "parallel")]
        {
            if multithreaded && pairs.len() > 1 {
                use rayon::prelude::*;
                pairs.par_iter().for_each(collide);
                return;
            }
        }
        #[cfg(not(feature = "parallel"))]
        let _ = multithreaded;

        pairs.iter().for_each(collide);
    }

    fn apply_narrow_result(&mut self, result: &NarrowResult) {
        let (Some(shape1), Some(shape2)) = (self.shapes.get(result.shape1), self.shapes.get(result.shape2)) else {
            return;
        };
        let key = ArbiterKey::new(shape1.id, shape2.id);
        let (body1, body2) = (shape1.body, shape2.body);
        self.merge_contacts(
            key,
            body1,
            body2,
            Some((result.shape1, result.shape2)),
            result
                .overlaps
                .iter()
                .map(|overlap| (overlap.point_a, overlap.point_b, overlap.normal, overlap.penetration)),
        );
    }

    /// Feeds new contacts into the manifold keyed by `key`, creating it if
    /// needed. Existing points are refreshed once per step before matching.
    fn merge_contacts(
        &mut self,
        key: ArbiterKey,
        body1: BodyHandle,
        body2: BodyHandle,
        shapes: Option<(ShapeHandle, ShapeHandle)>,
        points: impl IntoIterator<Item = (Vec3, Vec3, Vec3, f32)>,
    ) {
        let (Some(first), Some(second)) = (self.bodies.get(body1), self.bodies.get(body2)) else {
            return;
        };
        let (friction, restitution) = Material::combine(&first.material, &second.material);
        let manifold = self.manifolds.entry(key).or_insert_with(|| {
            let mut manifold = ContactManifold::new(key, body1, body2, friction, restitution);
            if let Some((shape1, shape2)) = shapes {
                manifold.shape1 = Some(shape1);
                manifold.shape2 = Some(shape2);
            }
            manifold
        });

        let flipped = manifold.body1 != body1;
        let (first, second) = if flipped { (second, first) } else { (first, second) };
        manifold.friction = friction;
        manifold.restitution = restitution;

        let threshold = self.config.contact_break_threshold;
        if !manifold.touched {
            manifold.refresh(first, second, threshold);
            manifold.touched = true;
        }
        for (point1, point2, normal, penetration) in points {
            let (point1, point2, normal) = if flipped {
                (point2, point1, -normal)
            } else {
                (point1, point2, normal)
            };
            manifold.add_point(point1, point2, normal, penetration, first, second, threshold);
        }
    }

    /// Drops manifolds that were not confirmed this step unless both bodies
    /// are frozen, in which case the contact is kept for when they wake.
    fn retire_manifolds(&mut self) {
        let bodies = &self.bodies;
        let islands = &mut self.islands;
        let moving = |handle: BodyHandle| {
            bodies
                .get(handle)
                .map(|body| body.is_active() && !body.is_static())
        };
        self.manifolds.retain(|key, manifold| {
            let keep = match (moving(manifold.body1), moving(manifold.body2)) {
                (Some(moving1), Some(moving2)) => manifold.touched || !(moving1 || moving2),
                _ => false,
            };
            if !keep {
                islands.detach_manifold(*key);
            }
            keep
        });
    }

    /// Copies an island into a self-contained job. Static bodies referenced by
    /// its rows are appended after the dynamic ones.
    fn prepare_island_job(&self, island: &Island) -> Option<IslandJob> {
        if island.bodies.is_empty() {
            return None;
        }

        let mut handles = Vec::with_capacity(island.bodies.len());
        let mut loads = Vec::with_capacity(island.bodies.len());
        let mut bodies = Vec::with_capacity(island.bodies.len());
        let mut slots: HashMap<BodyHandle, usize> = HashMap::with_capacity(island.bodies.len());

        for handle in &island.bodies {
            if let Some(body) = self.bodies.get(*handle) {
                slots.insert(*handle, bodies.len());
                handles.push(*handle);
                loads.push(BodyLoad::from_body(body));
                bodies.push(SolverBody::from_body(body));
            }
        }
        if handles.is_empty() {
            return None;
        }

        let mut slot_of = |handle: BodyHandle, bodies: &mut Vec<SolverBody>| -> Option<usize> {
            if let Some(slot) = slots.get(&handle) {
                return Some(*slot);
            }
            let body = self.bodies.get(handle)?;
            let slot = bodies.len();
            bodies.push(SolverBody::from_body(body));
            slots.insert(handle, slot);
            Some(slot)
        };

        let mut constraints = Vec::with_capacity(island.constraints.len());
        for handle in &island.constraints {
            let Some(constraint) = self.constraints.get(*handle) else { continue };
            if !constraint.is_enabled() {
                continue;
            }
            let (Some(body1), Some(body2)) = (
                slot_of(constraint.body1(), &mut bodies),
                slot_of(constraint.body2(), &mut bodies),
            ) else {
                continue;
            };
            constraints.push(JobConstraint {
                handle: *handle,
                body1,
                body2,
                kind: constraint.kind,
            });
        }

        let mut contacts = Vec::with_capacity(island.manifolds.len());
        for key in &island.manifolds {
            let Some(manifold) = self.manifolds.get(key) else { continue };
            let (Some(body1), Some(body2)) = (
                slot_of(manifold.body1, &mut bodies),
                slot_of(manifold.body2, &mut bodies),
            ) else {
                continue;
            };
            contacts.push(JobContact {
                key: *key,
                body1,
                body2,
                manifold: manifold.clone(),
            });
        }

        Some(IslandJob {
            handles,
            loads,
            bodies,
            constraints,
            contacts,
        })
    }

    fn write_back(&mut self, jobs: Vec<IslandJob>) {
        for job in jobs {
            for (handle, state) in job.handles.iter().zip(&job.bodies) {
                if let Some(body) = self.bodies.get_mut(*handle) {
                    body.position = state.position;
                    body.orientation = state.orientation;
                    body.velocity = state.velocity;
                    body.angular_velocity = state.angular_velocity;
                    body.update_world_inertia();
                }
            }
            for solved in job.constraints {
                if let Some(constraint) = self.constraints.get_mut(solved.handle) {
                    constraint.kind = solved.kind;
                }
            }
            for solved in job.contacts {
                if let Some(manifold) = self.manifolds.get_mut(&solved.key) {
                    *manifold = solved.manifold;
                }
            }
        }
    }

    fn wake(&mut self, handle: BodyHandle) {
        if let Some(body) = self.bodies.get_mut(handle) {
            if !body.is_static {
                body.is_active = true;
                body.sleep_counter = 0;
            }
        }
    }

    fn update_body_mass(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle) else { return };
        if !body.mass_from_shapes || body.is_static {
            return;
        }
        let shapes = &self.shapes;
        let mut total = MassProperties::ZERO;
        for shape in body.shapes.iter().filter_map(|shape| shapes.get(*shape)) {
            total.accumulate(&shape.body_mass_properties());
        }
        let props = if body.shapes.is_empty() { MassProperties::default() } else { total };
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_mass_properties(&props);
        }
    }

    fn detach_constraint(&mut self, handle: ConstraintHandle) {
        let Some(constraint) = self.constraints.remove(handle) else { return };
        for body in [constraint.body1(), constraint.body2()] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.constraints.retain(|member| *member != handle);
            }
            self.wake(body);
        }
        self.islands.detach_constraint(handle);
    }

    fn drop_manifolds(&mut self, mut doomed: impl FnMut(&ContactManifold) -> bool) {
        let mut touched = Vec::new();
        let islands = &mut self.islands;
        self.manifolds.retain(|key, manifold| {
            if !doomed(manifold) {
                return true;
            }
            touched.push(manifold.body1);
            touched.push(manifold.body2);
            islands.detach_manifold(*key);
            false
        });
        for body in touched {
            self.wake(body);
        }
    }
}

/// Built-in pair rejection: shapes of one body, shapes of one soft body,
/// layer/mask mismatches and pairs where nothing can move. Pairs involving an
/// external proxy always pass so that the user filter sees them.
fn default_pair_filter(bodies: &Arena<RigidBody>, shapes: &Arena<Shape>, a: ProxyRef, b: ProxyRef) -> bool {
    let (ProxyRef::Shape(first), ProxyRef::Shape(second)) = (a, b) else {
        return true;
    };
    let (Some(first), Some(second)) = (shapes.get(first), shapes.get(second)) else {
        return false;
    };
    if first.body == second.body {
        return false;
    }
    if first.soft_body.is_some() && first.soft_body == second.soft_body {
        return false;
    }
    if !first.filter.allows(&second.filter) {
        return false;
    }
    let moving = |handle: BodyHandle| {
        bodies
            .get(handle)
            .is_some_and(|body| body.is_active() && !body.is_static())
    };
    moving(first.body) || moving(second.body)
}
