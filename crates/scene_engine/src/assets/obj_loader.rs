//! Wavefront OBJ reader producing flat triangle lists

use super::AssetError;
use crate::foundation::geometry::{triangulate_polygon, Triangle, Vertex};
use crate::foundation::math::{utils::safe_normalize, Vec3};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// OBJ parser
///
/// Reads positions, texture coordinates, normals and polygon faces. Faces
/// with more than three corners are split by ear clipping, so concave
/// polygons come out correct. Corners without a normal get the face normal.
/// Materials, groups and smoothing directives are ignored.
pub struct ObjLoader;

#[derive(Default)]
struct ObjData {
    positions: Vec<[f32; 3]>,
    tex_coords: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
}

#[derive(Clone, Copy)]
struct Corner {
    position: usize,
    tex_coord: Option<usize>,
    normal: Option<usize>,
}

impl ObjLoader {
    /// Load an OBJ file
    pub fn load_file(path: &Path) -> Result<Vec<Triangle>, AssetError> {
        let file = File::open(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let triangles = Self::parse(BufReader::new(file)).map_err(|e| match e {
            AssetError::Io { source, .. } => AssetError::Io { path: path.to_path_buf(), source },
            other => other,
        })?;
        log::info!("Loaded {} triangles from {path:?}", triangles.len());
        Ok(triangles)
    }

    /// Parse OBJ text
    pub fn parse<R: BufRead>(reader: R) -> Result<Vec<Triangle>, AssetError> {
        let mut data = ObjData::default();
        let mut triangles = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = line.map_err(|source| AssetError::Io { path: Default::default(), source })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else { continue };
            let args: Vec<&str> = parts.collect();

            match keyword {
                "v" => data.positions.push(parse_floats::<3>(&args, line_number, "vertex")?),
                "vt" => {
                    // The optional third coordinate is ignored
                    let uv = parse_floats::<2>(&args, line_number, "texture coordinate")?;
                    data.tex_coords.push(uv);
                }
                "vn" => data.normals.push(parse_floats::<3>(&args, line_number, "normal")?),
                "f" => {
                    let corners = args
                        .iter()
                        .map(|token| parse_corner(token, &data, line_number))
                        .collect::<Result<Vec<_>, _>>()?;
                    if corners.len() < 3 {
                        return Err(parse_error(line_number, format!("face has {} corners", corners.len())));
                    }
                    emit_face(&data, &corners, &mut triangles);
                }
                _ => log::trace!("Skipping OBJ directive '{keyword}' on line {line_number}"),
            }
        }

        Ok(triangles)
    }
}

fn parse_error(line: usize, message: impl Into<String>) -> AssetError {
    AssetError::Parse { line, message: message.into() }
}

fn parse_floats<const N: usize>(args: &[&str], line: usize, what: &str) -> Result<[f32; N], AssetError> {
    if args.len() < N {
        return Err(parse_error(line, format!("{what} needs {N} components, got {}", args.len())));
    }
    let mut values = [0.0; N];
    for (value, arg) in values.iter_mut().zip(args) {
        *value = arg
            .parse()
            .map_err(|_| parse_error(line, format!("invalid {what} component '{arg}'")))?;
    }
    Ok(values)
}

/// Resolve a 1-based or negative (relative) OBJ index
fn resolve_index(token: &str, count: usize, line: usize, what: &str) -> Result<usize, AssetError> {
    let raw: i64 = token
        .parse()
        .map_err(|_| parse_error(line, format!("invalid {what} index '{token}'")))?;
    let resolved = match raw {
        0 => None,
        r if r > 0 => usize::try_from(r - 1).ok(),
        r => usize::try_from(r.unsigned_abs()).ok().and_then(|back| count.checked_sub(back)),
    };
    resolved
        .filter(|&index| index < count)
        .ok_or_else(|| parse_error(line, format!("{what} index {raw} out of range ({count} defined)")))
}

fn parse_corner(token: &str, data: &ObjData, line: usize) -> Result<Corner, AssetError> {
    let mut fields = token.split('/');
    let position = resolve_index(fields.next().unwrap_or_default(), data.positions.len(), line, "vertex")?;
    let tex_coord = match fields.next() {
        Some(field) if !field.is_empty() => Some(resolve_index(field, data.tex_coords.len(), line, "texture coordinate")?),
        _ => None,
    };
    let normal = match fields.next() {
        Some(field) if !field.is_empty() => Some(resolve_index(field, data.normals.len(), line, "normal")?),
        _ => None,
    };
    Ok(Corner { position, tex_coord, normal })
}

fn emit_face(data: &ObjData, corners: &[Corner], triangles: &mut Vec<Triangle>) {
    let points: Vec<Vec3> = corners.iter().map(|c| Vec3::from(data.positions[c.position])).collect();
    let face_normal = newell_normal(&points);

    let vertex = |corner: &Corner| Vertex {
        position: data.positions[corner.position],
        normal: corner.normal.map_or(face_normal, |n| data.normals[n]),
        tex_coord: corner.tex_coord.map_or([0.0, 0.0], |t| data.tex_coords[t]),
    };

    for [a, b, c] in triangulate_polygon(&points) {
        triangles.push(Triangle::new(vertex(&corners[a]), vertex(&corners[b]), vertex(&corners[c])));
    }
}

/// Unit polygon normal, robust for concave faces
fn newell_normal(points: &[Vec3]) -> [f32; 3] {
    let mut normal = Vec3::zeros();
    for (i, current) in points.iter().enumerate() {
        let next = &points[(i + 1) % points.len()];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    safe_normalize(&normal).into()
}
