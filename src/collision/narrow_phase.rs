//! Support-mapping narrow phase: GJK to decide overlap, EPA to measure it.

use glam::{Quat, Vec3};

use super::clipping::{clip_polygon, rectangle_planes};
use crate::{
    config::MAX_MANIFOLD_POINTS,
    core::shape::{ShapeKind, SupportMap},
};

/// Penetration between two convex shapes.
///
/// `normal` points from A to B and `point_a - point_b == normal * penetration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap {
    pub point_a: Vec3,
    pub point_b: Vec3,
    pub normal: Vec3,
    pub penetration: f32,
}

/// Up to [`MAX_MANIFOLD_POINTS`] overlaps produced for one shape pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlapSet {
    points: [Option<Overlap>; MAX_MANIFOLD_POINTS],
    len: usize,
}

impl OverlapSet {
    fn single(overlap: Overlap) -> Self {
        let mut set = Self::default();
        set.push(overlap);
        set
    }

    fn push(&mut self, overlap: Overlap) {
        if self.len < MAX_MANIFOLD_POINTS {
            self.points[self.len] = Some(overlap);
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Overlap> + '_ {
        self.points[..self.len].iter().flatten()
    }
}

#[derive(Debug, Clone, Copy)]
struct SupportPoint {
    /// Point of the Minkowski difference `A - B`.
    v: Vec3,
    a: Vec3,
    b: Vec3,
}

/// Two placed support maps.
struct MinkowskiDifference<'a, A: ?Sized, B: ?Sized> {
    shape_a: &'a A,
    orientation_a: Quat,
    position_a: Vec3,
    shape_b: &'a B,
    orientation_b: Quat,
    position_b: Vec3,
}

impl<A: SupportMap + ?Sized, B: SupportMap + ?Sized> MinkowskiDifference<'_, A, B> {
    fn support(&self, direction: Vec3) -> SupportPoint {
        let a = self.position_a
            + self.orientation_a * self.shape_a.support(self.orientation_a.conjugate() * direction);
        let b = self.position_b
            + self.orientation_b * self.shape_b.support(self.orientation_b.conjugate() * -direction);
        SupportPoint { v: a - b, a, b }
    }

    fn center(&self) -> Vec3 {
        (self.position_a + self.orientation_a * self.shape_a.center())
            - (self.position_b + self.orientation_b * self.shape_b.center())
    }
}

fn same_direction(a: Vec3, b: Vec3) -> bool {
    a.dot(b) > 0.0
}

/// Simplex whose newest point sits at index 0.
struct Simplex {
    points: [SupportPoint; 4],
    len: usize,
}

impl Simplex {
    fn new(first: SupportPoint) -> Self {
        Self {
            points: [first; 4],
            len: 1,
        }
    }

    fn push_front(&mut self, point: SupportPoint) {
        self.points = [point, self.points[0], self.points[1], self.points[2]];
        self.len = (self.len + 1).min(4);
    }

    fn set(&mut self, points: &[SupportPoint]) {
        self.points[..points.len()].copy_from_slice(points);
        self.len = points.len();
    }

    /// Reduces the simplex towards the origin; returns `true` once it encloses it.
    fn evolve(&mut self, direction: &mut Vec3) -> bool {
        match self.len {
            2 => {
                self.line(direction);
                false
            }
            3 => {
                self.triangle(direction);
                false
            }
            4 => self.tetrahedron(direction),
            _ => false,
        }
    }

    fn line(&mut self, direction: &mut Vec3) {
        let [a, b, ..] = self.points;
        let ab = b.v - a.v;
        let ao = -a.v;
        if same_direction(ab, ao) {
            let perpendicular = ab.cross(ao).cross(ab);
            // The origin lies on the segment: any orthogonal direction works.
            *direction = if perpendicular.length_squared() < 1e-12 {
                ab.any_orthogonal_vector()
            } else {
                perpendicular
            };
        } else {
            self.set(&[a]);
            *direction = ao;
        }
    }

    fn triangle(&mut self, direction: &mut Vec3) {
        let [a, b, c, _] = self.points;
        let ab = b.v - a.v;
        let ac = c.v - a.v;
        let ao = -a.v;
        let abc = ab.cross(ac);

        if same_direction(abc.cross(ac), ao) {
            if same_direction(ac, ao) {
                self.set(&[a, c]);
                *direction = ac.cross(ao).cross(ac);
            } else {
                self.set(&[a, b]);
                self.line(direction);
            }
        } else if same_direction(ab.cross(abc), ao) {
            self.set(&[a, b]);
            self.line(direction);
        } else if abc.dot(ao) >= 0.0 {
            *direction = abc;
        } else {
            self.set(&[a, c, b]);
            *direction = -abc;
        }
    }

    fn tetrahedron(&mut self, direction: &mut Vec3) -> bool {
        let [a, b, c, d] = self.points;
        let ab = b.v - a.v;
        let ac = c.v - a.v;
        let ad = d.v - a.v;
        let ao = -a.v;

        let abc = ab.cross(ac);
        let acd = ac.cross(ad);
        let adb = ad.cross(ab);

        if same_direction(abc, ao) {
            self.set(&[a, b, c]);
            self.triangle(direction);
            return false;
        }
        if same_direction(acd, ao) {
            self.set(&[a, c, d]);
            self.triangle(direction);
            return false;
        }
        if same_direction(adb, ao) {
            self.set(&[a, d, b]);
            self.triangle(direction);
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

impl Face {
    fn new(polytope: &[SupportPoint], indices: [usize; 3]) -> Option<Self> {
        let [i, j, k] = indices;
        let normal = (polytope[j].v - polytope[i].v).cross(polytope[k].v - polytope[i].v);
        if normal.length_squared() < 1e-20 {
            return None;
        }
        let normal = normal.normalize();
        let distance = normal.dot(polytope[i].v);
        Some(if distance < 0.0 {
            Self {
                indices: [i, k, j],
                normal: -normal,
                distance: -distance,
            }
        } else {
            Self {
                indices,
                normal,
                distance,
            }
        })
    }
}

pub struct NarrowPhase;

impl NarrowPhase {
    const GJK_MAX_ITERATIONS: usize = 64;
    const EPA_MAX_ITERATIONS: usize = 64;
    const EPA_TOLERANCE: f32 = 1e-4;
    /// Minimum alignment between the contact normal and a box face for the
    /// face to be clipped into a multi-point manifold.
    const FACE_ALIGNMENT: f32 = 0.95;

    /// Tests two convex shapes for overlap and measures the penetration.
    pub fn test_overlap<A, B>(
        shape_a: &A,
        orientation_a: Quat,
        position_a: Vec3,
        shape_b: &B,
        orientation_b: Quat,
        position_b: Vec3,
    ) -> Option<Overlap>
    where
        A: SupportMap + ?Sized,
        B: SupportMap + ?Sized,
    {
        let pair = MinkowskiDifference {
            shape_a,
            orientation_a,
            position_a,
            shape_b,
            orientation_b,
            position_b,
        };

        let mut direction = -pair.center();
        if direction.length_squared() < 1e-12 {
            direction = Vec3::X;
        }
        let first = pair.support(direction);
        let mut simplex = Simplex::new(first);
        direction = -first.v;

        for _ in 0..Self::GJK_MAX_ITERATIONS {
            if direction.length_squared() < 1e-20 {
                // The origin lies on the current simplex: shapes only touch.
                return None;
            }
            let support = pair.support(direction);
            if support.v.dot(direction) <= 0.0 {
                return None;
            }
            simplex.push_front(support);
            if simplex.evolve(&mut direction) {
                return Self::expand(&pair, &simplex.points);
            }
        }

        log::trace!("gjk did not converge");
        None
    }

    fn expand<A, B>(pair: &MinkowskiDifference<'_, A, B>, tetrahedron: &[SupportPoint; 4]) -> Option<Overlap>
    where
        A: SupportMap + ?Sized,
        B: SupportMap + ?Sized,
    {
        let mut polytope = tetrahedron.to_vec();
        let mut faces: Vec<Face> = [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]]
            .into_iter()
            .filter_map(|[i, j, k]| {
                // Wind each face away from the vertex it does not use.
                let opposite = 6 - i - j - k;
                let normal = (polytope[j].v - polytope[i].v).cross(polytope[k].v - polytope[i].v);
                let indices = if normal.dot(polytope[opposite].v - polytope[i].v) > 0.0 {
                    [i, k, j]
                } else {
                    [i, j, k]
                };
                Face::new(&polytope, indices)
            })
            .collect();

        let mut closest = None;
        for _ in 0..Self::EPA_MAX_ITERATIONS {
            let best = faces
                .iter()
                .copied()
                .min_by(|a, b| a.distance.total_cmp(&b.distance))?;
            closest = Some(best);

            let support = pair.support(best.normal);
            if support.v.dot(best.normal) - best.distance < Self::EPA_TOLERANCE {
                break;
            }

            let new_index = polytope.len();
            polytope.push(support);

            let mut edges: Vec<(usize, usize)> = Vec::new();
            faces.retain(|face| {
                let visible = face.normal.dot(support.v - polytope[face.indices[0]].v) > 0.0;
                if visible {
                    let [i, j, k] = face.indices;
                    for (u, v) in [(i, j), (j, k), (k, i)] {
                        if let Some(shared) = edges.iter().position(|&edge| edge == (v, u)) {
                            edges.swap_remove(shared);
                        } else {
                            edges.push((u, v));
                        }
                    }
                }
                !visible
            });

            faces.extend(
                edges
                    .into_iter()
                    .filter_map(|(u, v)| Face::new(&polytope, [u, v, new_index])),
            );
            if faces.is_empty() {
                break;
            }
        }

        let face = closest?;
        let [i, j, k] = face.indices;
        let (u, v, w) = barycentric(
            face.normal * face.distance,
            polytope[i].v,
            polytope[j].v,
            polytope[k].v,
        );
        let point_a = polytope[i].a * u + polytope[j].a * v + polytope[k].a * w;
        let point_b = polytope[i].b * u + polytope[j].b * v + polytope[k].b * w;

        Some(Overlap {
            point_a,
            point_b,
            normal: face.normal,
            penetration: face.distance,
        })
    }

    /// Contact points for a pair of placed shapes. Boxes meeting face-first get
    /// a clipped multi-point manifold, spheres an exact answer, everything else
    /// a single GJK/EPA point.
    pub fn collide(
        shape_a: &ShapeKind,
        orientation_a: Quat,
        position_a: Vec3,
        shape_b: &ShapeKind,
        orientation_b: Quat,
        position_b: Vec3,
    ) -> OverlapSet {
        if let (ShapeKind::Sphere { radius: ra }, ShapeKind::Sphere { radius: rb }) = (shape_a, shape_b) {
            return Self::sphere_sphere(*ra, position_a, *rb, position_b)
                .map(OverlapSet::single)
                .unwrap_or_default();
        }

        let Some(overlap) = Self::test_overlap(
            shape_a,
            orientation_a,
            position_a,
            shape_b,
            orientation_b,
            position_b,
        ) else {
            return OverlapSet::default();
        };

        if let (ShapeKind::Box { half_extents: ha }, ShapeKind::Box { half_extents: hb }) = (shape_a, shape_b) {
            let set = Self::box_box(
                &overlap,
                *ha,
                orientation_a,
                position_a,
                *hb,
                orientation_b,
                position_b,
            );
            if !set.is_empty() {
                return set;
            }
        }

        OverlapSet::single(overlap)
    }

    fn sphere_sphere(ra: f32, pa: Vec3, rb: f32, pb: Vec3) -> Option<Overlap> {
        let delta = pb - pa;
        let distance = delta.length();
        let penetration = ra + rb - distance;
        if penetration <= 0.0 {
            return None;
        }
        let normal = if distance > 1e-6 { delta / distance } else { Vec3::Y };
        Some(Overlap {
            point_a: pa + normal * ra,
            point_b: pb - normal * rb,
            normal,
            penetration,
        })
    }

    /// Clips the incident box face against the reference box face.
    fn box_box(
        overlap: &Overlap,
        half_a: Vec3,
        orientation_a: Quat,
        position_a: Vec3,
        half_b: Vec3,
        orientation_b: Quat,
        position_b: Vec3,
    ) -> OverlapSet {
        let normal = overlap.normal;
        let (axis_a, sign_a, align_a) = best_face(orientation_a, normal);
        let (axis_b, sign_b, align_b) = best_face(orientation_b, -normal);

        // Reference box: the one whose face is most aligned with the normal.
        let a_is_reference = align_a >= align_b * 0.98;
        let (ref_half, ref_ori, ref_pos, ref_axis, ref_sign, inc_half, inc_ori, inc_pos, align) =
            if a_is_reference {
                (half_a, orientation_a, position_a, axis_a, sign_a, half_b, orientation_b, position_b, align_a)
            } else {
                (half_b, orientation_b, position_b, axis_b, sign_b, half_a, orientation_a, position_a, align_b)
            };
        if align < Self::FACE_ALIGNMENT {
            return OverlapSet::default();
        }

        let ref_normal = ref_ori * (axis_vector(ref_axis) * ref_sign);
        let ref_center = ref_pos + ref_normal * ref_half[ref_axis];
        let (u_axis, v_axis) = ((ref_axis + 1) % 3, (ref_axis + 2) % 3);
        let planes = rectangle_planes(
            ref_center,
            ref_ori * axis_vector(u_axis),
            ref_ori * axis_vector(v_axis),
            ref_half[u_axis],
            ref_half[v_axis],
        );

        let (inc_axis, inc_sign, _) = best_face(inc_ori, -ref_normal);
        let incident = face_vertices(inc_half, inc_ori, inc_pos, inc_axis, inc_sign);
        let clipped = clip_polygon(&incident, &planes);

        let plane_offset = ref_normal.dot(ref_center);
        let mut candidates: Vec<(Vec3, f32)> = clipped
            .into_iter()
            .map(|point| (point, plane_offset - ref_normal.dot(point)))
            .filter(|(_, depth)| *depth >= 0.0)
            .collect();
        reduce_to_four(&mut candidates);

        let contact_normal = if a_is_reference { ref_normal } else { -ref_normal };
        let mut set = OverlapSet::default();
        for (incident_point, depth) in candidates {
            let reference_point = incident_point + ref_normal * depth;
            let (point_a, point_b) = if a_is_reference {
                (reference_point, incident_point)
            } else {
                (incident_point, reference_point)
            };
            set.push(Overlap {
                point_a,
                point_b,
                normal: contact_normal,
                penetration: depth,
            });
        }
        set
    }

    /// Ray cast against any support map in its local frame. Returns the ray
    /// parameter and the outward normal, or parameter zero when the origin is inside.
    pub fn ray_cast<S: SupportMap + ?Sized>(shape: &S, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
        const EPSILON_SQ: f32 = 1e-8;

        let mut lambda = 0.0;
        let mut x = origin;
        let mut normal = Vec3::ZERO;
        let mut v = x - shape.center();
        let mut simplex: Vec<Vec3> = Vec::with_capacity(4);

        for _ in 0..Self::GJK_MAX_ITERATIONS {
            if v.length_squared() <= EPSILON_SQ {
                break;
            }
            let p = shape.support(v);
            let w = x - p;
            let vw = v.dot(w);
            if vw > 0.0 {
                let vr = v.dot(direction);
                if vr >= 0.0 {
                    return None;
                }
                lambda -= vw / vr;
                x = origin + direction * lambda;
                normal = v;
            }

            if !simplex.contains(&p) {
                simplex.push(p);
            } else if vw <= 0.0 {
                break;
            }
            let points: Vec<Vec3> = simplex.iter().map(|p| x - *p).collect();
            let (closest, keep) = closest_to_origin(&points);
            let mut bit = 0;
            simplex.retain(|_| {
                let kept = keep & (1 << bit) != 0;
                bit += 1;
                kept
            });
            v = closest;
        }

        let normal = if normal.length_squared() > 0.0 {
            normal.normalize()
        } else {
            -direction.normalize_or(Vec3::Y)
        };
        Some((lambda, normal))
    }
}

fn axis_vector(axis: usize) -> Vec3 {
    let mut v = Vec3::ZERO;
    v[axis] = 1.0;
    v
}

/// Local face axis of a box best aligned with `direction`, its sign and the alignment.
fn best_face(orientation: Quat, direction: Vec3) -> (usize, f32, f32) {
    let local = orientation.conjugate() * direction;
    let abs = local.abs();
    let axis = if abs.x >= abs.y && abs.x >= abs.z {
        0
    } else if abs.y >= abs.z {
        1
    } else {
        2
    };
    (axis, local[axis].signum(), abs[axis])
}

fn face_vertices(half: Vec3, orientation: Quat, position: Vec3, axis: usize, sign: f32) -> [Vec3; 4] {
    let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
    let corner = |su: f32, sv: f32| {
        let mut local = Vec3::ZERO;
        local[axis] = half[axis] * sign;
        local[u] = half[u] * su;
        local[v] = half[v] * sv;
        position + orientation * local
    };
    [corner(1.0, 1.0), corner(-1.0, 1.0), corner(-1.0, -1.0), corner(1.0, -1.0)]
}

/// Keeps the deepest point and the three that span the largest patch.
fn reduce_to_four(points: &mut Vec<(Vec3, f32)>) {
    if points.len() <= MAX_MANIFOLD_POINTS {
        return;
    }
    let mut chosen = Vec::with_capacity(MAX_MANIFOLD_POINTS);
    let deepest = points
        .iter()
        .enumerate()
        .max_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
        .map_or(0, |(i, _)| i);
    chosen.push(points.swap_remove(deepest));

    take_best(points, &mut chosen, |p, chosen| (p - chosen[0].0).length_squared());
    take_best(points, &mut chosen, |p, chosen| {
        (chosen[1].0 - chosen[0].0).cross(p - chosen[0].0).length_squared()
    });
    take_best(points, &mut chosen, |p, chosen| {
        chosen
            .iter()
            .map(|(q, _)| (p - *q).length_squared())
            .fold(f32::INFINITY, f32::min)
    });
    *points = chosen;
}

fn take_best(
    points: &mut Vec<(Vec3, f32)>,
    chosen: &mut Vec<(Vec3, f32)>,
    score: impl Fn(Vec3, &[(Vec3, f32)]) -> f32,
) {
    if let Some(index) = points
        .iter()
        .enumerate()
        .max_by(|a, b| score(a.1 .0, chosen.as_slice()).total_cmp(&score(b.1 .0, chosen.as_slice())))
        .map(|(i, _)| i)
    {
        chosen.push(points.swap_remove(index));
    }
}

/// Barycentric coordinates of `p` projected onto triangle `abc`.
fn barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> (f32, f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denominator = d00 * d11 - d01 * d01;
    if denominator.abs() < 1e-12 {
        return (1.0, 0.0, 0.0);
    }
    let v = (d11 * d20 - d01 * d21) / denominator;
    let w = (d00 * d21 - d01 * d20) / denominator;
    (1.0 - v - w, v, w)
}

/// Closest point to the origin on the hull of up to four points, plus a bit
/// mask of the points that support it.
fn closest_to_origin(points: &[Vec3]) -> (Vec3, u8) {
    match points.len() {
        1 => (points[0], 0b1),
        2 => closest_on_segment(points[0], points[1], [0, 1]),
        3 => closest_on_triangle(points[0], points[1], points[2], [0, 1, 2]),
        _ => closest_on_tetrahedron(points),
    }
}

fn closest_on_segment(a: Vec3, b: Vec3, ids: [u8; 2]) -> (Vec3, u8) {
    let ab = b - a;
    let denominator = ab.length_squared();
    let t = if denominator > 0.0 { -a.dot(ab) / denominator } else { 0.0 };
    if t <= 0.0 {
        (a, 1 << ids[0])
    } else if t >= 1.0 {
        (b, 1 << ids[1])
    } else {
        (a + ab * t, (1 << ids[0]) | (1 << ids[1]))
    }
}

fn closest_on_triangle(a: Vec3, b: Vec3, c: Vec3, ids: [u8; 3]) -> (Vec3, u8) {
    let bit = |i: usize| 1u8 << ids[i];
    let ab = b - a;
    let ac = c - a;
    let d1 = ab.dot(-a);
    let d2 = ac.dot(-a);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, bit(0));
    }
    let d3 = ab.dot(-b);
    let d4 = ac.dot(-b);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, bit(1));
    }
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, bit(0) | bit(1));
    }
    let d5 = ab.dot(-c);
    let d6 = ac.dot(-c);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, bit(2));
    }
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, bit(0) | bit(2));
    }
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, bit(1) | bit(2));
    }
    let denominator = va + vb + vc;
    if denominator.abs() < 1e-20 {
        return closest_on_segment(a, b, [ids[0], ids[1]]);
    }
    let v = vb / denominator;
    let w = vc / denominator;
    (a + ab * v + ac * w, bit(0) | bit(1) | bit(2))
}

fn closest_on_tetrahedron(points: &[Vec3]) -> (Vec3, u8) {
    let faces: [([usize; 3], usize); 4] = [
        ([0, 1, 2], 3),
        ([0, 2, 3], 1),
        ([0, 3, 1], 2),
        ([1, 3, 2], 0),
    ];
    let mut best: Option<(Vec3, u8)> = None;
    for ([i, j, k], opposite) in faces {
        let normal = (points[j] - points[i]).cross(points[k] - points[i]);
        let origin_side = normal.dot(-points[i]);
        let opposite_side = normal.dot(points[opposite] - points[i]);
        // Origin and the opposite vertex on different sides: this face is visible.
        if origin_side * opposite_side < 0.0 {
            let candidate = closest_on_triangle(
                points[i],
                points[j],
                points[k],
                [i as u8, j as u8, k as u8],
            );
            if best.map_or(true, |(p, _)| candidate.0.length_squared() < p.length_squared()) {
                best = Some(candidate);
            }
        }
    }
    best.unwrap_or((Vec3::ZERO, 0b1111))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere(radius: f32) -> ShapeKind {
        ShapeKind::Sphere { radius }
    }

    fn cuboid(half_extents: Vec3) -> ShapeKind {
        ShapeKind::Box { half_extents }
    }

    #[test]
    fn epa_measures_overlapping_spheres() {
        let overlap = NarrowPhase::test_overlap(
            &sphere(1.0),
            Quat::IDENTITY,
            Vec3::ZERO,
            &sphere(1.0),
            Quat::IDENTITY,
            Vec3::new(1.5, 0.0, 0.0),
        )
        .expect("spheres overlap");

        assert!((overlap.penetration - 0.5).abs() < 0.02, "depth {}", overlap.penetration);
        assert!(overlap.normal.x > 0.99, "normal {:?}", overlap.normal);
        let gap = overlap.point_a - overlap.point_b;
        assert_relative_eq!(gap.x, overlap.normal.x * overlap.penetration, epsilon = 1e-3);
    }

    #[test]
    fn epa_handles_deep_sphere_penetration() {
        let overlap = NarrowPhase::test_overlap(
            &sphere(1.0),
            Quat::IDENTITY,
            Vec3::ZERO,
            &sphere(1.0),
            Quat::IDENTITY,
            Vec3::new(0.5, 0.0, 0.0),
        )
        .expect("deep overlap");
        assert!((overlap.penetration - 1.5).abs() < 0.03, "depth {}", overlap.penetration);
    }

    #[test]
    fn separated_shapes_do_not_overlap() {
        assert!(NarrowPhase::test_overlap(
            &sphere(1.0),
            Quat::IDENTITY,
            Vec3::ZERO,
            &cuboid(Vec3::ONE),
            Quat::IDENTITY,
            Vec3::new(3.0, 0.0, 0.0),
        )
        .is_none());
    }

    #[test]
    fn box_on_box_normal_and_depth() {
        let overlap = NarrowPhase::test_overlap(
            &cuboid(Vec3::new(5.0, 0.5, 5.0)),
            Quat::IDENTITY,
            Vec3::ZERO,
            &cuboid(Vec3::splat(0.5)),
            Quat::IDENTITY,
            Vec3::new(0.3, 0.9, -0.2),
        )
        .expect("boxes overlap");
        assert_relative_eq!(overlap.penetration, 0.1, epsilon = 1e-3);
        assert_relative_eq!(overlap.normal.y, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn rotated_box_overlap_is_detected() {
        let overlap = NarrowPhase::test_overlap(
            &cuboid(Vec3::ONE),
            Quat::from_rotation_z(45f32.to_radians()),
            Vec3::ZERO,
            &cuboid(Vec3::ONE),
            Quat::IDENTITY,
            Vec3::new(2.1, 0.0, 0.0),
        )
        .expect("rotated corner reaches the second box");
        assert!(overlap.penetration > 0.0);
        assert!(overlap.normal.x > 0.9);
    }

    #[test]
    fn resting_boxes_get_four_clipped_points() {
        let set = NarrowPhase::collide(
            &cuboid(Vec3::new(5.0, 0.5, 5.0)),
            Quat::IDENTITY,
            Vec3::ZERO,
            &cuboid(Vec3::splat(0.5)),
            Quat::IDENTITY,
            Vec3::new(0.0, 0.95, 0.0),
        );
        assert_eq!(set.len(), 4);
        for overlap in set.iter() {
            assert_relative_eq!(overlap.penetration, 0.05, epsilon = 1e-3);
            assert_relative_eq!(overlap.normal.y, 1.0, epsilon = 1e-5);
            assert_relative_eq!(overlap.point_b.y, 0.45, epsilon = 1e-3);
            assert_relative_eq!(overlap.point_a.y, 0.5, epsilon = 1e-3);
        }
    }

    #[test]
    fn sphere_pair_is_exact() {
        let set = NarrowPhase::collide(
            &sphere(1.0),
            Quat::IDENTITY,
            Vec3::ZERO,
            &sphere(0.5),
            Quat::IDENTITY,
            Vec3::new(0.0, 1.2, 0.0),
        );
        let overlap = set.iter().next().expect("spheres overlap");
        assert_relative_eq!(overlap.penetration, 0.3, epsilon = 1e-6);
        assert_relative_eq!(overlap.point_a.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(overlap.point_b.y, 0.7, epsilon = 1e-6);
    }

    #[test]
    fn support_ray_cast_matches_analytic_box() {
        let hull = ShapeKind::ConvexHull {
            vertices: [-1.0f32, 1.0]
                .iter()
                .flat_map(|&x| [-1.0f32, 1.0].into_iter().flat_map(move |y| [-1.0f32, 1.0].into_iter().map(move |z| Vec3::new(x, y, z))))
                .collect(),
        };
        let (lambda, normal) = NarrowPhase::ray_cast(&hull, Vec3::new(-4.0, 0.2, 0.1), Vec3::X)
            .expect("ray hits the hull");
        assert_relative_eq!(lambda, 3.0, epsilon = 1e-3);
        assert!(normal.x < -0.9, "normal {normal:?}");

        assert!(NarrowPhase::ray_cast(&hull, Vec3::new(-4.0, 3.0, 0.0), Vec3::X).is_none());
        let (lambda, _) = NarrowPhase::ray_cast(&hull, Vec3::ZERO, Vec3::X).expect("inside");
        assert_eq!(lambda, 0.0);
    }
}
