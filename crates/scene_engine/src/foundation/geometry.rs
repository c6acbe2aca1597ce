//! Triangle geometry and polygon triangulation

use crate::foundation::math::{constants::EPSILON, Vec2, Vec3};
use bytemuck::{Pod, Zeroable};

/// Interleaved vertex as uploaded to GPU buffers
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Vertex with a position only
    pub fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            normal: [0.0, 0.0, 0.0],
            tex_coord: [0.0, 0.0],
        }
    }
}

/// Three vertices forming one face
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Triangle {
    /// Corners in counter-clockwise order
    pub vertices: [Vertex; 3],
}

impl Triangle {
    /// Create a triangle from its corners
    pub fn new(a: Vertex, b: Vertex, c: Vertex) -> Self {
        Self { vertices: [a, b, c] }
    }

    /// Geometric face normal, zero for degenerate triangles
    pub fn face_normal(&self) -> Vec3 {
        let [a, b, c] = self.vertices.map(|v| Vec3::from(v.position));
        crate::foundation::math::utils::safe_cross(&(b - a), &(c - a))
    }
}

/// Flatten triangles into a vertex stream
pub fn triangles_as_bytes(triangles: &[Triangle]) -> &[u8] {
    bytemuck::cast_slice(triangles)
}

/// Triangulate a simple planar polygon by ear clipping
///
/// Returns index triples into `points`, wound like the input polygon. Fewer
/// than three points produce no triangles. Self-intersecting input cannot be
/// clipped cleanly; when no ear is found the remaining fan is emitted.
pub fn triangulate_polygon(points: &[Vec3]) -> Vec<[usize; 3]> {
    if points.len() < 3 {
        return Vec::new();
    }
    if points.len() == 3 {
        return vec![[0, 1, 2]];
    }

    let projected = project_to_plane(points);
    let winding = signed_area(&projected).signum();
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut triangles = Vec::with_capacity(points.len() - 2);

    while remaining.len() > 3 {
        let count = remaining.len();
        let ear = (0..count).find(|&i| {
            let prev = remaining[(i + count - 1) % count];
            let next = remaining[(i + 1) % count];
            is_ear(&projected, &remaining, prev, remaining[i], next, winding)
        });

        match ear {
            Some(i) => {
                let prev = remaining[(i + count - 1) % count];
                let next = remaining[(i + 1) % count];
                triangles.push([prev, remaining[i], next]);
                remaining.remove(i);
            }
            None => {
                log::warn!("Polygon with {} vertices has no ear left, emitting fan", points.len());
                for i in 1..remaining.len() - 1 {
                    triangles.push([remaining[0], remaining[i], remaining[i + 1]]);
                }
                return triangles;
            }
        }
    }

    triangles.push([remaining[0], remaining[1], remaining[2]]);
    triangles
}

/// A vertex is an ear when its corner is convex with respect to the polygon
/// winding and no other remaining vertex lies inside the corner triangle
fn is_ear(points: &[Vec2], remaining: &[usize], prev: usize, current: usize, next: usize, winding: f32) -> bool {
    let (a, b, c) = (points[prev], points[current], points[next]);
    let corner = cross_2d(&(b - a), &(c - b));
    if corner * winding <= EPSILON {
        return false;
    }

    remaining
        .iter()
        .filter(|&&index| index != prev && index != current && index != next)
        .all(|&index| !point_in_triangle(&points[index], &a, &b, &c))
}

fn cross_2d(a: &Vec2, b: &Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

fn signed_area(points: &[Vec2]) -> f32 {
    let mut area = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        area += p.x * q.y - q.x * p.y;
    }
    area * 0.5
}

fn point_in_triangle(p: &Vec2, a: &Vec2, b: &Vec2, c: &Vec2) -> bool {
    let d1 = cross_2d(&(b - a), &(p - a));
    let d2 = cross_2d(&(c - b), &(p - b));
    let d3 = cross_2d(&(a - c), &(p - c));
    let has_negative = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_positive = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_negative && has_positive)
}

/// Drop the axis the polygon normal (Newell's method) is most aligned with
fn project_to_plane(points: &[Vec3]) -> Vec<Vec2> {
    let mut normal = Vec3::zeros();
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        normal.x += (p.y - q.y) * (p.z + q.z);
        normal.y += (p.z - q.z) * (p.x + q.x);
        normal.z += (p.x - q.x) * (p.y + q.y);
    }

    let abs = normal.abs();
    if abs.x >= abs.y && abs.x >= abs.z {
        let sign = normal.x.signum();
        points.iter().map(|p| Vec2::new(p.y * sign, p.z)).collect()
    } else if abs.y >= abs.z {
        let sign = normal.y.signum();
        points.iter().map(|p| Vec2::new(p.z * sign, p.x)).collect()
    } else {
        let sign = normal.z.signum();
        points.iter().map(|p| Vec2::new(p.x * sign, p.y)).collect()
    }
}
