use crate::{bounds::BoundingBox, entity::EntityId};

use super::{NodeId, Octree};

impl Octree {
    /// Returns the number of membership lists written to.
    pub fn requery_entity(&mut self, entity: EntityId, bounds: &BoundingBox) -> usize {
        self.requery_node(self.root(), entity, bounds)
    }

    pub fn remove_entity(&mut self, entity: EntityId) -> usize {
        self.requery_entity(entity, &BoundingBox::EMPTY)
    }

    fn requery_node(&mut self, index: NodeId, entity: EntityId, bounds: &BoundingBox) -> usize {
        let node = &mut self[index];

        let position = node.entities.iter().position(|&e| e == entity);
        let before = position.is_some();
        let now = bounds.intersects(&node.bounds);

        let mut writes = 0;

        match (before, now) {
            // the entity can't be in any descendant either
            (false, false) => return 0,
            (false, true) => {
                node.entities.push(entity);
                writes += 1;
            }
            (true, false) => {
                if let Some(position) = position {
                    node.entities.swap_remove(position);
                }
                writes += 1;
            }
            // finer nodes may still have changed
            (true, true) => {}
        }

        if let Some(children) = node.children() {
            for child in children {
                writes += self.requery_node(child, entity, bounds);
            }
        }

        writes
    }

    pub fn entity_leaves(&self, entity: EntityId) -> Vec<NodeId> {
        (self.iter_leaves())
            .filter(|(_, leaf)| leaf.contains_entity(entity))
            .map(|(index, _)| index)
            .collect()
    }
}
