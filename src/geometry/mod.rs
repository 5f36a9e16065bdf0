mod material;
mod obj;

pub use material::*;
pub use obj::*;

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use log::info;

use crate::bounds::BoundingBox;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
    pub material: MaterialId,
}

impl Triangle {
    pub fn centroid(&self) -> Vec3 {
        let [a, b, c] = self.vertices;
        (a.position + b.position + c.position) / 3.0
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| v.position)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("World geometry not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read world geometry: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug, Default)]
pub struct GeometryStore {
    pub triangles: Vec<Triangle>,
    /// Triangle list of occluder-only geometry, three positions per triangle.
    pub occluders: Vec<Vec3>,
    pub materials: Materials,
}

impl GeometryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, GeometryError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(GeometryError::NotFound(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };

        let source = path.display().to_string();
        let store = Self::parse(BufReader::new(file), &source)?;

        info!(
            "Loaded {}: {} triangles, {} occluder triangles, {} materials",
            source,
            store.triangles.len(),
            store.occluders.len() / 3,
            store.materials.len(),
        );

        Ok(store)
    }

    pub fn parse(reader: impl BufRead, source: &str) -> io::Result<Self> {
        let mut store = Self::new();
        let mut parser = ObjParser::new(&mut store, source);

        for (i, line) in reader.lines().enumerate() {
            parser.parse_line(i + 1, &line?);
        }

        Ok(store)
    }

    pub fn push_triangle(&mut self, triangle: Triangle) {
        if self.materials.is_occluder(triangle.material) {
            self.occluders.extend(triangle.positions());
        } else {
            self.triangles.push(triangle);
        }
    }

    pub fn triangle(&self, index: u32) -> &Triangle {
        &self.triangles[index as usize]
    }

    pub fn len(&self) -> u32 {
        self.triangles.len() as u32
    }

    /// Occluders included, grown to contain the origin and padded by 0.5.
    pub fn padded_bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox::new(Vec3::ZERO, Vec3::ZERO);

        for triangle in &self.triangles {
            for position in triangle.positions() {
                bounds.expand(position);
            }
        }

        for &position in &self.occluders {
            bounds.expand(position);
        }

        BoundingBox::new(bounds.start - Vec3::splat(0.5), bounds.end + Vec3::splat(0.5))
    }
}
