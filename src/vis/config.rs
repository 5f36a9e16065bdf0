use std::{fs, path::Path};

use glam::Vec3;
use log::{debug, warn};

use crate::{bounds::BoundingBox, octree::OctreeConfig};

/// Depth and capacity carry over from the previous world, `bounds` does not.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VisConfig {
    pub octree: OctreeConfig,
    pub bounds: Option<BoundingBox>,
}

impl VisConfig {
    pub fn read(&mut self, path: &Path) {
        self.bounds = None;

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                warn!("Vis data for world unavailable: {}: {}", path.display(), err);
                return;
            }
        };

        self.apply(&source, &path.display().to_string());
    }

    pub fn apply(&mut self, source: &str, name: &str) {
        let mut tokens = source.split_whitespace();

        while let Some(option) = tokens.next() {
            match option {
                "oct_depth" => match next_value::<u32>(&mut tokens) {
                    Some(depth) => self.octree.max_depth = depth,
                    None => warn!("Invalid value for oct_depth in vis data {}", name),
                },
                "oct_capacity" => match next_value::<usize>(&mut tokens) {
                    Some(capacity) => self.octree.leaf_capacity = capacity,
                    None => warn!("Invalid value for oct_capacity in vis data {}", name),
                },
                "bounds" => {
                    let start = next_vec3(&mut tokens);
                    let end = next_vec3(&mut tokens);

                    match start.zip(end) {
                        Some((start, end)) => self.bounds = Some(BoundingBox::new(start, end)),
                        None => warn!("Invalid value for bounds in vis data {}", name),
                    }
                }
                _ => warn!("Unrecognized option in vis data {}: {}", name, option),
            }
        }

        debug!("Vis config for {}: {:?}", name, self);
    }
}

fn next_value<'a, T: std::str::FromStr>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<T> {
    tokens.next()?.parse().ok()
}

fn next_vec3<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<Vec3> {
    let x = next_value(tokens)?;
    let y = next_value(tokens)?;
    let z = next_value(tokens)?;
    Some(Vec3::new(x, y, z))
}
