use std::{collections::HashSet, num::ParseFloatError, num::ParseIntError};

use glam::{Vec2, Vec3};
use log::warn;

use super::{GeometryStore, MaterialId, Triangle, Vertex};

#[derive(Debug, thiserror::Error)]
pub enum MeshLineError {
    #[error("expected {expected} components, found {found}")]
    MissingComponents { expected: usize, found: usize },
    #[error("invalid number: {0}")]
    InvalidFloat(#[from] ParseFloatError),
    #[error("non-finite number '{0}'")]
    NonFinite(String),
    #[error("invalid index: {0}")]
    InvalidIndex(#[from] ParseIntError),
    #[error("face needs at least 3 corners, found {0}")]
    TooFewCorners(usize),
    #[error("{kind} index {index} out of range (have {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: i64,
        len: usize,
    },
    #[error("usemtl without a material name")]
    MissingMaterialName,
}

pub struct ObjParser<'a> {
    store: &'a mut GeometryStore,
    source: &'a str,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    texcoords: Vec<Vec2>,
    material: MaterialId,
    unknown: HashSet<String>,
    skipped: usize,
}

impl<'a> ObjParser<'a> {
    pub fn new(store: &'a mut GeometryStore, source: &'a str) -> Self {
        Self {
            store,
            source,
            positions: Vec::new(),
            normals: Vec::new(),
            texcoords: Vec::new(),
            material: MaterialId::DEFAULT,
            unknown: HashSet::new(),
            skipped: 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn parse_line(&mut self, number: usize, line: &str) {
        let line = match line.find('#') {
            Some(comment) => &line[..comment],
            None => line,
        };

        let line = line.trim();
        if line.len() < 2 {
            return;
        }

        let mut tokens = line.split_whitespace();
        let Some(directive) = tokens.next() else {
            return;
        };

        let result = match directive {
            "v" => parse_vec3(tokens).map(|p| self.positions.push(p)),
            "vn" => parse_vec3(tokens).map(|n| self.normals.push(n)),
            "vt" => parse_texcoord(tokens).map(|t| self.texcoords.push(t)),
            "f" => self.parse_face(tokens),
            "usemtl" => match tokens.next() {
                Some(name) => {
                    self.material = self.store.materials.intern(name);
                    Ok(())
                }
                None => Err(MeshLineError::MissingMaterialName),
            },
            _ => {
                if self.unknown.insert(directive.to_string()) {
                    warn!(
                        "{}:{}: unrecognized directive '{}', skipping",
                        self.source, number, directive,
                    );
                }

                Ok(())
            }
        };

        if let Err(err) = result {
            warn!("{}:{}: malformed line skipped: {}", self.source, number, err);
            self.skipped += 1;
        }
    }

    fn parse_face<'t>(
        &mut self,
        tokens: impl Iterator<Item = &'t str>,
    ) -> Result<(), MeshLineError> {
        let corners = tokens
            .map(|corner| self.parse_corner(corner))
            .collect::<Result<Vec<_>, _>>()?;

        if corners.len() < 3 {
            return Err(MeshLineError::TooFewCorners(corners.len()));
        }

        // fan triangulation, a no-op for plain triangles
        for i in 1..corners.len() - 1 {
            let triangle = Triangle {
                vertices: [corners[0], corners[i], corners[i + 1]],
                material: self.material,
            };

            self.store.push_triangle(triangle);
        }

        Ok(())
    }

    fn parse_corner(&self, corner: &str) -> Result<Vertex, MeshLineError> {
        let mut parts = corner.split('/');

        let position = match parts.next() {
            Some(index) if !index.is_empty() => {
                let index = index.parse::<i64>()?;
                self.positions[resolve("vertex", index, self.positions.len())?]
            }
            _ => {
                return Err(MeshLineError::MissingComponents {
                    expected: 1,
                    found: 0,
                })
            }
        };

        let uv = match parts.next() {
            Some(index) if !index.is_empty() => {
                let index = index.parse::<i64>()?;
                self.texcoords[resolve("texcoord", index, self.texcoords.len())?]
            }
            _ => Vec2::ZERO,
        };

        let normal = match parts.next() {
            Some(index) if !index.is_empty() => {
                let index = index.parse::<i64>()?;
                self.normals[resolve("normal", index, self.normals.len())?]
            }
            _ => Vec3::ZERO,
        };

        Ok(Vertex {
            position,
            normal,
            uv,
        })
    }
}

/// Converts a 1-based (or negative, relative to the end) index.
fn resolve(kind: &'static str, index: i64, len: usize) -> Result<usize, MeshLineError> {
    let resolved = match index {
        i if i > 0 => i - 1,
        i if i < 0 => len as i64 + i,
        _ => -1,
    };

    if resolved < 0 || resolved as usize >= len {
        return Err(MeshLineError::IndexOutOfRange { kind, index, len });
    }

    Ok(resolved as usize)
}

fn parse_floats<'t, const N: usize>(
    tokens: impl Iterator<Item = &'t str>,
) -> Result<[f32; N], MeshLineError> {
    let mut values = [0.0; N];
    let mut found = 0;

    for token in tokens.take(N) {
        let value: f32 = token.parse()?;
        if !value.is_finite() {
            return Err(MeshLineError::NonFinite(token.to_string()));
        }

        values[found] = value;
        found += 1;
    }

    if found < N {
        return Err(MeshLineError::MissingComponents { expected: N, found });
    }

    Ok(values)
}

fn parse_vec3<'t>(tokens: impl Iterator<Item = &'t str>) -> Result<Vec3, MeshLineError> {
    parse_floats::<3>(tokens).map(Vec3::from_array)
}

fn parse_texcoord<'t>(tokens: impl Iterator<Item = &'t str>) -> Result<Vec2, MeshLineError> {
    let [u, v] = parse_floats::<2>(tokens)?;
    Ok(Vec2::new(u, 1.0 - v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (GeometryStore, usize) {
        let mut store = GeometryStore::new();
        let mut parser = ObjParser::new(&mut store, "test.obj");

        for (i, line) in source.lines().enumerate() {
            parser.parse_line(i + 1, line);
        }

        let skipped = parser.skipped();
        (store, skipped)
    }

    #[test]
    fn full_corners() {
        let (store, skipped) = parse(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             vn 0 0 1\n\
             vt 0 0\nvt 1 0\nvt 0 0.25\n\
             f 1/1/1 2/2/1 3/3/1\n",
        );

        assert_eq!(skipped, 0);
        assert_eq!(store.triangles.len(), 1);

        let tri = &store.triangles[0];
        assert_eq!(tri.vertices[1].position, Vec3::X);
        assert_eq!(tri.vertices[0].normal, Vec3::Z);
        // v is flipped
        assert_eq!(tri.vertices[2].uv, Vec2::new(0.0, 0.75));
        assert_eq!(tri.material, MaterialId::DEFAULT);
    }

    #[test]
    fn partial_corners_and_negative_indices() {
        let (store, skipped) = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf -3//1 -2 -1\n");

        assert_eq!(skipped, 0);
        assert_eq!(store.triangles.len(), 1);
        assert_eq!(store.triangles[0].vertices[0].normal, Vec3::Z);
        assert_eq!(store.triangles[0].vertices[1].normal, Vec3::ZERO);
        assert_eq!(store.triangles[0].vertices[2].position, Vec3::Y);
    }

    #[test]
    fn quads_are_fanned() {
        let (store, _) = parse("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n");

        assert_eq!(store.triangles.len(), 2);
        assert_eq!(store.triangles[1].vertices[0].position, Vec3::ZERO);
        assert_eq!(store.triangles[1].vertices[2].position, Vec3::Y);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (store, skipped) = parse(
            "v 0 0\n\
             v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             v a b c\n\
             f 1 2\n\
             f 1 2 9\n\
             f 0 1 2\n\
             usemtl\n\
             f 1 2 3\n",
        );

        assert_eq!(skipped, 6);
        assert_eq!(store.triangles.len(), 1);
    }

    #[test]
    fn non_finite_coordinates_are_skipped() {
        let (store, skipped) = parse(
            "v nan 0 0\n\
             v inf 0 0\n\
             v 0 -inf 0\n\
             vn 0 0 NaN\n\
             vt infinity 0\n\
             v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             f 1 2 3\n",
        );

        assert_eq!(skipped, 5);
        assert_eq!(store.triangles.len(), 1);
        assert!(store.triangles[0]
            .vertices
            .iter()
            .all(|v| v.position.is_finite()));
    }

    #[test]
    fn comments_and_unknown_directives() {
        let (store, skipped) = parse(
            "# header\n\
             o thing\n\
             mtllib world.mtl\n\
             v 0 0 0 # origin\n\
             v 1 0 0\n\
             v 0 1 0\n\
             f 1 2 3 # f 9 9 9\n",
        );

        assert_eq!(skipped, 0);
        assert_eq!(store.triangles.len(), 1);
    }

    #[test]
    fn occluders_are_separated() {
        let (store, _) = parse(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             usemtl stone\nf 1 2 3\n\
             usemtl OCCLUDE\nf 1 2 3\nf 3 2 1\n\
             usemtl wood\nf 1 2 3\n",
        );

        assert_eq!(store.triangles.len(), 2);
        assert_eq!(store.occluders.len(), 6);

        let stone = store.triangles[0].material;
        let wood = store.triangles[1].material;
        assert_eq!(store.materials.get(stone).unwrap().name, "stone");
        assert_eq!(store.materials.get(wood).unwrap().name, "wood");
    }
}
