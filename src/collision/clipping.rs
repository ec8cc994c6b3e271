//! Polygon clipping used to build multi-point face contacts.

use glam::Vec3;

const EPSILON: f32 = 1e-5;

/// Half-space `normal · p <= offset`; points with positive signed distance lie outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub offset: f32,
}

impl Plane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            offset: normal.dot(point),
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.offset
    }
}

/// Sutherland-Hodgman clipping of a convex polygon against each plane in turn.
pub fn clip_polygon(vertices: &[Vec3], planes: &[Plane]) -> Vec<Vec3> {
    let mut output = vertices.to_vec();
    let mut scratch = Vec::with_capacity(vertices.len() + planes.len());
    for plane in planes {
        clip_against_plane(&output, plane, &mut scratch);
        std::mem::swap(&mut output, &mut scratch);
        if output.is_empty() {
            break;
        }
    }
    output
}

fn clip_against_plane(vertices: &[Vec3], plane: &Plane, clipped: &mut Vec<Vec3>) {
    clipped.clear();
    let Some(&last) = vertices.last() else {
        return;
    };

    let mut start = last;
    let mut start_distance = plane.signed_distance(start);
    for &end in vertices {
        let end_distance = plane.signed_distance(end);
        let start_inside = start_distance <= EPSILON;
        let end_inside = end_distance <= EPSILON;

        if start_inside != end_inside {
            let denominator = start_distance - end_distance;
            if denominator.abs() > f32::EPSILON {
                clipped.push(start + (end - start) * (start_distance / denominator));
            }
        }
        if end_inside {
            clipped.push(end);
        }

        start = end;
        start_distance = end_distance;
    }
}

/// Side planes of a rectangle centred at `center` spanned by two unit tangents.
pub fn rectangle_planes(center: Vec3, tangent_u: Vec3, tangent_v: Vec3, half_u: f32, half_v: f32) -> [Plane; 4] {
    [
        Plane::from_point_normal(center + tangent_u * half_u, tangent_u),
        Plane::from_point_normal(center - tangent_u * half_u, -tangent_u),
        Plane::from_point_normal(center + tangent_v * half_v, tangent_v),
        Plane::from_point_normal(center - tangent_v * half_v, -tangent_v),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(half: f32, y: f32) -> Vec<Vec3> {
        vec![
            Vec3::new(half, y, half),
            Vec3::new(-half, y, half),
            Vec3::new(-half, y, -half),
            Vec3::new(half, y, -half),
        ]
    }

    #[test]
    fn polygon_inside_rectangle_is_untouched() {
        let planes = rectangle_planes(Vec3::ZERO, Vec3::X, Vec3::Z, 2.0, 2.0);
        let clipped = clip_polygon(&square(1.0, 0.0), &planes);
        assert_eq!(clipped.len(), 4);
        for point in square(1.0, 0.0) {
            assert!(clipped.contains(&point));
        }
    }

    #[test]
    fn rotated_square_is_cut_to_octagon() {
        let planes = rectangle_planes(Vec3::ZERO, Vec3::X, Vec3::Z, 1.0, 1.0);
        let diamond = [
            Vec3::new(1.3, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.3),
            Vec3::new(-1.3, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -1.3),
        ];
        let clipped = clip_polygon(&diamond, &planes);
        assert_eq!(clipped.len(), 8);
        assert!(clipped
            .iter()
            .all(|p| p.x.abs() <= 1.0 + 1e-4 && p.z.abs() <= 1.0 + 1e-4));
    }

    #[test]
    fn disjoint_polygon_vanishes() {
        let planes = rectangle_planes(Vec3::ZERO, Vec3::X, Vec3::Z, 1.0, 1.0);
        let far: Vec<Vec3> = square(0.5, 0.0).into_iter().map(|p| p + Vec3::X * 5.0).collect();
        assert!(clip_polygon(&far, &planes).is_empty());
    }
}
