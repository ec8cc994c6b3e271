//! Heightmap terrain plugged into the world through an external proxy and a
//! broad-phase filter that injects triangle contacts.

use std::{ops::Range, sync::Arc};

use glam::{Quat, Vec3};

use crate::{
    collision::narrow_phase::NarrowPhase,
    core::{aabb::Aabb, ShapeKind},
    error::{PhysicsError, PhysicsResult},
    world::{BroadPhaseFilter, ContactContext, ExternalHandle, ExternalProxy, ProxyRef, World},
};

const RAY_MARCH_FRACTION: f32 = 0.25;
const RAY_BISECTION_STEPS: usize = 24;

/// Height of the surface above the point `(x, z)`.
pub trait HeightField: Send + Sync {
    fn height(&self, x: f32, z: f32) -> f32;
}

impl<F> HeightField for F
where
    F: Fn(f32, f32) -> f32 + Send + Sync,
{
    fn height(&self, x: f32, z: f32) -> f32 {
        self(x, z)
    }
}

/// Regular grid sampling a [`HeightField`]. Every cell is split into two
/// triangles along its `(0, 0)`-`(1, 1)` diagonal.
pub struct Terrain<H> {
    field: H,
    origin_x: f32,
    origin_z: f32,
    cell_size: f32,
    cells_x: usize,
    cells_z: usize,
    bounds: Aabb,
}

impl<H: HeightField> Terrain<H> {
    pub fn new(field: H, origin_x: f32, origin_z: f32, cells_x: usize, cells_z: usize, cell_size: f32) -> PhysicsResult<Self> {
        if cells_x == 0 || cells_z == 0 {
            return Err(PhysicsError::invalid_shape("terrain needs at least one cell"));
        }
        if !(cell_size > 0.0) || !cell_size.is_finite() {
            return Err(PhysicsError::invalid_shape(format!("terrain cell size {cell_size}")));
        }

        let mut terrain = Self {
            field,
            origin_x,
            origin_z,
            cell_size,
            cells_x,
            cells_z,
            bounds: Aabb::empty(),
        };
        let mut bounds = Aabb::empty();
        for i in 0..=cells_x {
            for j in 0..=cells_z {
                bounds.extend(terrain.vertex(i, j));
            }
        }
        if !bounds.is_finite() {
            return Err(PhysicsError::invalid_shape("terrain heights must be finite"));
        }
        terrain.bounds = bounds;
        Ok(terrain)
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.cells_x * self.cells_z * 2
    }

    /// Grid vertex `(i, j)` in world space.
    pub fn vertex(&self, i: usize, j: usize) -> Vec3 {
        let x = self.origin_x + i as f32 * self.cell_size;
        let z = self.origin_z + j as f32 * self.cell_size;
        Vec3::new(x, self.field.height(x, z), z)
    }

    /// The two triangles of cell `(i, j)`, wound so that their normals point up.
    pub fn cell_triangles(&self, i: usize, j: usize) -> [[Vec3; 3]; 2] {
        let v00 = self.vertex(i, j);
        let v10 = self.vertex(i + 1, j);
        let v11 = self.vertex(i + 1, j + 1);
        let v01 = self.vertex(i, j + 1);
        [[v00, v10, v11], [v00, v11, v01]]
    }

    /// Index of the first triangle of cell `(i, j)`; the second one follows it.
    pub fn triangle_index(&self, i: usize, j: usize) -> usize {
        2 * (i * self.cells_z + j)
    }

    /// Cells whose footprint overlaps the box, or `None` when it misses the grid.
    pub fn cell_range(&self, aabb: &Aabb) -> Option<(Range<usize>, Range<usize>)> {
        let to_cell = |value: f32, origin: f32| ((value - origin) / self.cell_size).floor();
        let span = |min: f32, max: f32, origin: f32, cells: usize| {
            let first = to_cell(min, origin).max(0.0);
            let last = (to_cell(max, origin) + 1.0).min(cells as f32);
            (first < last).then(|| first as usize..last as usize)
        };
        Some((
            span(aabb.min.x, aabb.max.x, self.origin_x, self.cells_x)?,
            span(aabb.min.z, aabb.max.z, self.origin_z, self.cells_z)?,
        ))
    }

    /// Surface height of the triangulated grid, clamped to its footprint.
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let (i, u) = self.locate(x, self.origin_x, self.cells_x);
        let (j, v) = self.locate(z, self.origin_z, self.cells_z);
        let h00 = self.vertex(i, j).y;
        let h11 = self.vertex(i + 1, j + 1).y;
        if u >= v {
            let h10 = self.vertex(i + 1, j).y;
            h00 + u * (h10 - h00) + v * (h11 - h10)
        } else {
            let h01 = self.vertex(i, j + 1).y;
            h00 + v * (h01 - h00) + u * (h11 - h01)
        }
    }

    /// Normal of the triangle above `(x, z)`.
    pub fn normal_at(&self, x: f32, z: f32) -> Vec3 {
        let (i, u) = self.locate(x, self.origin_x, self.cells_x);
        let (j, v) = self.locate(z, self.origin_z, self.cells_z);
        let [first, second] = self.cell_triangles(i, j);
        triangle_normal(if u >= v { &first } else { &second })
    }

    fn locate(&self, value: f32, origin: f32, cells: usize) -> (usize, f32) {
        let scaled = ((value - origin) / self.cell_size).clamp(0.0, cells as f32);
        let cell = (scaled.floor() as usize).min(cells - 1);
        (cell, scaled - cell as f32)
    }

    /// Marches the ray through the bounds and refines the first crossing of
    /// the surface by bisection. A ray starting below the surface hits at 0.
    pub fn ray_cast(&self, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
        let length = direction.length();
        if length < f32::EPSILON {
            return None;
        }
        let enter = self.bounds.ray_entry(origin, direction, f32::INFINITY)?;
        let exit = ray_exit(&self.bounds, origin, direction);
        let gap = |lambda: f32| {
            let point = origin + direction * lambda;
            point.y - self.height_at(point.x, point.z)
        };
        let hit = |lambda: f32| {
            let point = origin + direction * lambda;
            Some((lambda, self.normal_at(point.x, point.z)))
        };

        if gap(enter) <= 0.0 {
            return hit(enter);
        }
        let step = RAY_MARCH_FRACTION * self.cell_size / length;
        let mut above = enter;
        while above < exit {
            let next = (above + step).min(exit);
            if gap(next) <= 0.0 {
                let mut below = next;
                for _ in 0..RAY_BISECTION_STEPS {
                    let middle = 0.5 * (above + below);
                    if gap(middle) > 0.0 {
                        above = middle;
                    } else {
                        below = middle;
                    }
                }
                return hit(below);
            }
            above = next;
        }
        None
    }
}

fn triangle_normal([a, b, c]: &[Vec3; 3]) -> Vec3 {
    (*c - *a).cross(*b - *a).normalize_or(Vec3::Y)
}

fn ray_exit(bounds: &Aabb, origin: Vec3, direction: Vec3) -> f32 {
    let mut exit = f32::INFINITY;
    for axis in 0..3 {
        let d = direction[axis];
        if d.abs() < 1e-12 {
            continue;
        }
        let t0 = (bounds.min[axis] - origin[axis]) / d;
        let t1 = (bounds.max[axis] - origin[axis]) / d;
        exit = exit.min(t0.max(t1));
    }
    exit
}

/// Broad-phase presence of a terrain.
pub struct TerrainProxy<H> {
    terrain: Arc<Terrain<H>>,
}

impl<H: HeightField> ExternalProxy for TerrainProxy<H> {
    fn world_aabb(&self) -> Aabb {
        self.terrain.bounds()
    }

    fn ray_cast(&self, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
        self.terrain.ray_cast(origin, direction)
    }
}

/// Turns overlaps between the terrain proxy and awake dynamic shapes into
/// per-triangle contacts against the null body. Every other pair is left to
/// the built-in narrow phase.
pub struct TerrainFilter<H> {
    terrain: Arc<Terrain<H>>,
    proxy: ExternalHandle,
    first_id: u64,
}

impl<H: HeightField> TerrainFilter<H> {
    pub fn new(world: &mut World, terrain: Arc<Terrain<H>>, proxy: ExternalHandle) -> Self {
        let first_id = world.request_ids(terrain.triangle_count() as u64);
        Self {
            terrain,
            proxy,
            first_id,
        }
    }

    /// Manifold id of a terrain triangle.
    pub fn triangle_id(&self, triangle_index: usize) -> u64 {
        self.first_id + triangle_index as u64
    }
}

impl<H: HeightField> BroadPhaseFilter for TerrainFilter<H> {
    fn filter(&mut self, context: &mut ContactContext<'_>, proxy1: ProxyRef, proxy2: ProxyRef) -> bool {
        let ours = ProxyRef::External(self.proxy);
        let other = if proxy1 == ours {
            proxy2
        } else if proxy2 == ours {
            proxy1
        } else {
            return true;
        };

        let Some(shape) = other.shape().and_then(|handle| context.shape(handle)) else {
            return false;
        };
        let Some(body) = context.body(shape.body()) else {
            return false;
        };
        if body.is_static() || !body.is_active() {
            return false;
        }
        let Some((columns, rows)) = self.terrain.cell_range(&shape.world_aabb()) else {
            return false;
        };

        let null_body = context.null_body();
        let (orientation, position) = shape.world_transform(body.orientation, body.position);
        for i in columns {
            for j in rows.clone() {
                let first = self.terrain.triangle_index(i, j);
                for (offset, triangle) in self.terrain.cell_triangles(i, j).iter().enumerate() {
                    let [a, b, c] = *triangle;
                    let Some(overlap) = NarrowPhase::test_overlap(
                        &ShapeKind::Triangle { a, b, c },
                        Quat::IDENTITY,
                        Vec3::ZERO,
                        &shape.kind,
                        orientation,
                        position,
                    ) else {
                        continue;
                    };
                    context.register_contact(
                        self.triangle_id(first + offset),
                        shape.id(),
                        null_body,
                        shape.body(),
                        overlap.point_a,
                        overlap.point_b,
                        triangle_normal(triangle),
                        overlap.penetration,
                    );
                }
            }
        }
        false
    }
}

/// Registers `terrain` with the world and installs its contact filter,
/// replacing any previous broad-phase filter.
pub fn add_terrain<H: HeightField + 'static>(world: &mut World, terrain: Terrain<H>) -> ExternalHandle {
    let terrain = Arc::new(terrain);
    let proxy = world.add_external_proxy(Box::new(TerrainProxy {
        terrain: Arc::clone(&terrain),
    }));
    let filter = TerrainFilter::new(world, terrain, proxy);
    world.set_broad_phase_filter(Box::new(filter));
    log::debug!("terrain installed as external proxy {proxy:?}");
    proxy
}
