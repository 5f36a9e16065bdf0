use std::ops::Range;

use glam::Vec3;

use crate::{
    bounds::BoundingBox,
    entity::{Entities, EntityId},
    geometry::MaterialId,
    octree::{NodeId, Octree},
};

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Batch {
        material: MaterialId,
        vertices: Range<u32>,
    },
    Entity {
        entity: EntityId,
        bounds: BoundingBox,
        color: Vec3,
    },
}

#[derive(Clone, Debug, Default)]
pub struct VisibleSet {
    pub leaves: Vec<NodeId>,
}

impl VisibleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.leaves.clear();
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// `pass` must differ from every earlier pass.
    pub fn render(
        &self,
        octree: &Octree,
        entities: &mut Entities,
        pass: u64,
        commands: &mut Vec<DrawCommand>,
    ) {
        for &leaf in &self.leaves {
            let node = &octree[leaf];

            for &id in &node.entities {
                let Some(entity) = entities.get_mut(id) else {
                    continue;
                };

                if entity.last_drawn == pass {
                    continue;
                }

                entity.last_drawn = pass;
                commands.push(DrawCommand::Entity {
                    entity: id,
                    bounds: entity.bounding_box(),
                    color: entity.color,
                });
            }

            for batch in node.batches() {
                commands.push(DrawCommand::Batch {
                    material: batch.material,
                    vertices: batch.vertices.clone(),
                });
            }
        }
    }

    pub fn leaf_bounds<'a>(&'a self, octree: &'a Octree) -> impl Iterator<Item = BoundingBox> + 'a {
        self.leaves.iter().map(move |&leaf| octree[leaf].bounds)
    }
}
