use std::ops::Range;

use crate::{bounds::BoundingBox, entity::EntityId, geometry::MaterialId};

pub type NodeId = u32;

#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub material: MaterialId,
    pub triangles: Vec<u32>,
    pub vertices: Range<u32>,
}

impl Batch {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.end - self.vertices.start
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeState {
    /// Triangles waiting to be split or finalized, only seen during a build.
    Building { bucket: Vec<u32> },
    /// Children are the 8 nodes starting at `children`, in octant order.
    Internal { children: NodeId },
    Leaf { batches: Vec<Batch> },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub bounds: BoundingBox,
    pub depth: u32,
    pub state: NodeState,
    /// Entities whose bounds currently intersect `bounds`, without duplicates.
    pub entities: Vec<EntityId>,
}

impl Node {
    pub fn new(bounds: BoundingBox, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            state: NodeState::Building { bucket: Vec::new() },
            entities: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.state, NodeState::Leaf { .. })
    }

    pub fn children(&self) -> Option<Range<NodeId>> {
        match self.state {
            NodeState::Internal { children } => Some(children..children + 8),
            _ => None,
        }
    }

    pub fn batches(&self) -> &[Batch] {
        match &self.state {
            NodeState::Leaf { batches } => batches,
            _ => &[],
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.batches().iter().map(|b| b.triangles.len()).sum()
    }

    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }
}
