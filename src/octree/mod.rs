use std::{
    collections::BTreeMap,
    mem,
    ops::{Index, IndexMut},
};

mod membership;
mod node;
mod octant;

pub use membership::*;
pub use node::*;
pub use octant::*;

use log::{debug, info};

use crate::{
    bounds::BoundingBox,
    geometry::{GeometryStore, MaterialId, Vertex},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OctreeConfig {
    /// Nodes at this depth always become leaves.
    pub max_depth: u32,
    /// Nodes holding at most this many triangles become leaves.
    pub leaf_capacity: usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            leaf_capacity: 64,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OctreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub depth: u32,
    pub triangles: usize,
}

#[derive(Clone, Debug)]
pub struct Octree {
    pub nodes: Vec<Node>,
    pub leaves: Vec<NodeId>,
    /// Vertex data of all leaf batches, grouped by leaf and material.
    pub batch_vertices: Vec<Vertex>,
    pub config: OctreeConfig,
}

impl Octree {
    pub fn build(store: &GeometryStore, bounds: BoundingBox, config: OctreeConfig) -> Self {
        let mut root = Node::new(bounds, 0);
        root.state = NodeState::Building {
            bucket: (0..store.len()).collect(),
        };

        let mut octree = Self {
            nodes: vec![root],
            leaves: Vec::new(),
            batch_vertices: Vec::with_capacity(store.triangles.len() * 3),
            config,
        };

        octree.build_node(store, octree.root(), bounds, 0);

        let stats = octree.stats();
        info!(
            "Built octree: {} nodes, {} leaves, depth {}, {} triangles (max depth {}, capacity {})",
            stats.nodes,
            stats.leaves,
            stats.depth,
            stats.triangles,
            config.max_depth,
            config.leaf_capacity,
        );

        octree
    }

    pub const fn root(&self) -> NodeId {
        0
    }

    fn push_branch(&mut self, bounds: &BoundingBox, depth: u32) -> NodeId {
        let index = self.len();

        for octant in 0..8 {
            let node = Node::new(octant_bounds(bounds, octant), depth);
            self.nodes.push(node);
        }

        index
    }

    fn build_node(
        &mut self,
        store: &GeometryStore,
        index: NodeId,
        mut bounds: BoundingBox,
        level: u32,
    ) {
        let placeholder = NodeState::Building { bucket: Vec::new() };
        let bucket = match mem::replace(&mut self[index].state, placeholder) {
            NodeState::Building { bucket } => bucket,
            state => {
                self[index].state = state;
                return;
            }
        };

        // grow the candidate bounds so they contain every triangle entirely
        for &triangle in &bucket {
            for position in store.triangle(triangle).positions() {
                bounds.expand(position);
            }
        }

        self[index].bounds = bounds;

        if level >= self.config.max_depth || bucket.len() <= self.config.leaf_capacity {
            self.make_leaf(store, index, bucket);
            return;
        }

        let children = self.push_branch(&bounds, level + 1);
        let mid = bounds.center();

        let mut buckets: [Vec<u32>; 8] = Default::default();
        for triangle in bucket {
            let centroid = store.triangle(triangle).centroid();
            buckets[which_octant(mid, centroid) as usize].push(triangle);
        }

        for (octant, bucket) in buckets.into_iter().enumerate() {
            self[children + octant as u32].state = NodeState::Building { bucket };
        }

        self[index].state = NodeState::Internal { children };

        for octant in 0..8 {
            let child_bounds = octant_bounds(&bounds, octant);
            self.build_node(store, children + octant, child_bounds, level + 1);
        }
    }

    fn make_leaf(&mut self, store: &GeometryStore, index: NodeId, bucket: Vec<u32>) {
        let mut by_material: BTreeMap<MaterialId, Vec<u32>> = BTreeMap::new();
        for triangle in bucket {
            let material = store.triangle(triangle).material;
            by_material.entry(material).or_default().push(triangle);
        }

        let mut batches = Vec::with_capacity(by_material.len());
        for (material, triangles) in by_material {
            let start = self.batch_vertices.len() as u32;

            for &triangle in &triangles {
                let vertices = store.triangle(triangle).vertices;
                self.batch_vertices.extend_from_slice(&vertices);
            }

            let end = self.batch_vertices.len() as u32;
            batches.push(Batch {
                material,
                triangles,
                vertices: start..end,
            });
        }

        debug!(
            "Leaf {} at depth {}: {} batches",
            index,
            self[index].depth,
            batches.len(),
        );

        self[index].state = NodeState::Leaf { batches };
        self.leaves.push(index);
    }

    pub fn len(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn iter_leaves(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.leaves.iter().map(|&leaf| (leaf, &self[leaf]))
    }

    pub fn stats(&self) -> OctreeStats {
        OctreeStats {
            nodes: self.nodes.len(),
            leaves: self.leaves.len(),
            depth: self.nodes.iter().map(|n| n.depth).max().unwrap_or(0),
            triangles: self.iter_leaves().map(|(_, n)| n.triangle_count()).sum(),
        }
    }
}

impl Index<NodeId> for Octree {
    type Output = Node;

    #[inline]
    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index as usize]
    }
}

impl IndexMut<NodeId> for Octree {
    #[inline]
    fn index_mut(&mut self, index: NodeId) -> &mut Self::Output {
        &mut self.nodes[index as usize]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use glam::Vec3;

    use super::*;
    use crate::geometry::{Triangle, Vertex};

    pub fn triangle_at(center: Vec3, size: f32, material: MaterialId) -> Triangle {
        let vertex = |offset: Vec3| Vertex {
            position: center + offset * size,
            ..Default::default()
        };

        Triangle {
            vertices: [
                vertex(Vec3::new(-0.5, -0.5, 0.0)),
                vertex(Vec3::new(0.5, -0.5, 0.0)),
                vertex(Vec3::new(0.0, 0.5, 0.5)),
            ],
            material,
        }
    }

    pub fn scattered_store(count: u32) -> GeometryStore {
        let mut store = GeometryStore::new();
        let stone = store.materials.intern("stone");
        let wood = store.materials.intern("wood");

        let mut seed: u32 = 0x1234_5678;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed % 10_000) as f32 / 100.0
        };

        for i in 0..count {
            let center = Vec3::new(next(), next(), next());
            let material = if i % 3 == 0 { wood } else { stone };
            store.push_triangle(triangle_at(center, 1.5, material));
        }

        store
    }

    fn world_bounds() -> BoundingBox {
        BoundingBox::new(Vec3::ZERO, Vec3::splat(100.0))
    }

    fn descendants(octree: &Octree, node: NodeId, out: &mut Vec<NodeId>) {
        out.push(node);
        if let Some(children) = octree[node].children() {
            for child in children {
                descendants(octree, child, out);
            }
        }
    }

    #[test]
    fn partition_is_complete() {
        let store = scattered_store(500);
        let config = OctreeConfig {
            max_depth: 5,
            leaf_capacity: 8,
        };
        let octree = Octree::build(&store, world_bounds(), config);

        let mut seen = vec![0u32; store.triangles.len()];
        for (_, leaf) in octree.iter_leaves() {
            for batch in leaf.batches() {
                for &triangle in &batch.triangles {
                    seen[triangle as usize] += 1;
                }
            }
        }

        assert!(seen.iter().all(|&count| count == 1));
        assert_eq!(octree.stats().triangles, store.triangles.len());
        assert_eq!(octree.batch_vertices.len(), store.triangles.len() * 3);
    }

    #[test]
    fn no_buckets_survive_the_build() {
        let store = scattered_store(200);
        let octree = Octree::build(&store, world_bounds(), OctreeConfig::default());

        for node in &octree.nodes {
            assert!(!matches!(node.state, NodeState::Building { .. }));
        }

        let leaves = octree.nodes.iter().filter(|n| n.is_leaf()).count();
        assert_eq!(leaves, octree.leaves.len());
    }

    #[test]
    fn bounds_contain_geometry() {
        let store = scattered_store(300);
        let config = OctreeConfig {
            max_depth: 6,
            leaf_capacity: 4,
        };
        let octree = Octree::build(&store, world_bounds(), config);

        for index in 0..octree.len() {
            let mut nodes = Vec::new();
            descendants(&octree, index, &mut nodes);

            let bounds = octree[index].bounds;
            for node in nodes {
                for batch in octree[node].batches() {
                    for &triangle in &batch.triangles {
                        for position in store.triangle(triangle).positions() {
                            assert!(bounds.point_in(position));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn batch_vertices_match_triangles() {
        let store = scattered_store(100);
        let octree = Octree::build(&store, world_bounds(), OctreeConfig::default());

        for (_, leaf) in octree.iter_leaves() {
            for batch in leaf.batches() {
                assert_eq!(batch.vertex_count() as usize, batch.triangles.len() * 3);

                let vertices = &octree.batch_vertices
                    [batch.vertices.start as usize..batch.vertices.end as usize];

                for (i, &triangle) in batch.triangles.iter().enumerate() {
                    let triangle = store.triangle(triangle);
                    assert_eq!(triangle.material, batch.material);
                    assert_eq!(&vertices[i * 3..i * 3 + 3], &triangle.vertices);
                }
            }

            // one batch per material
            let mut materials: Vec<_> = leaf.batches().iter().map(|b| b.material).collect();
            materials.dedup();
            assert_eq!(materials.len(), leaf.batches().len());
        }
    }

    #[test]
    fn zero_capacity_splits_to_max_depth() {
        let store = scattered_store(64);
        let config = OctreeConfig {
            max_depth: 3,
            leaf_capacity: 0,
        };
        let octree = Octree::build(&store, world_bounds(), config);

        for (_, leaf) in octree.iter_leaves() {
            assert!(leaf.depth <= 3);

            if leaf.triangle_count() > 0 {
                assert_eq!(leaf.depth, 3);
            }
        }
    }

    #[test]
    fn capacity_bounds_leaf_size() {
        let store = scattered_store(400);
        let config = OctreeConfig {
            max_depth: 32,
            leaf_capacity: 5,
        };
        let octree = Octree::build(&store, world_bounds(), config);

        for (_, leaf) in octree.iter_leaves() {
            assert!(leaf.triangle_count() <= 5);
        }
    }

    #[test]
    fn zero_depth_is_a_single_leaf() {
        let store = scattered_store(50);
        let config = OctreeConfig {
            max_depth: 0,
            leaf_capacity: 0,
        };
        let octree = Octree::build(&store, world_bounds(), config);

        assert_eq!(octree.len(), 1);
        assert_eq!(octree.leaves, vec![octree.root()]);
        assert_eq!(octree[octree.root()].triangle_count(), 50);
    }

    #[test]
    fn empty_store() {
        let store = GeometryStore::new();
        let octree = Octree::build(&store, world_bounds(), OctreeConfig::default());

        assert_eq!(octree.leaves.len(), 1);
        assert_eq!(octree[octree.root()].bounds, world_bounds());
        assert!(octree.batch_vertices.is_empty());
    }

    #[test]
    fn two_separated_triangles() {
        let mut store = GeometryStore::new();
        let stone = store.materials.intern("stone");
        store.push_triangle(triangle_at(Vec3::splat(20.0), 4.0, stone));
        store.push_triangle(triangle_at(Vec3::splat(80.0), 4.0, stone));

        let config = OctreeConfig {
            max_depth: 10,
            leaf_capacity: 1,
        };
        let octree = Octree::build(&store, world_bounds(), config);

        let filled: Vec<_> = (octree.iter_leaves())
            .filter(|(_, leaf)| leaf.triangle_count() > 0)
            .collect();

        assert!(octree.leaves.len() >= 2);
        assert_eq!(filled.len(), 2);

        for (_, leaf) in &filled {
            assert_eq!(leaf.triangle_count(), 1);
        }

        let a = filled[0].1.bounds;
        let b = filled[1].1.bounds;
        let mut overlap = a;
        overlap.intersect_guarded(&b);
        assert_eq!(overlap.volume(), 0.0);

        for (triangle, leaf) in [(0, filled[0].1), (1, filled[1].1)] {
            let triangle_bounds = BoundingBox::from_points(store.triangle(triangle).positions());
            assert!(leaf.bounds.contains_box(&triangle_bounds));
        }
    }

    #[test]
    fn leaves_contain_parsed_vertices() {
        let source = "v nan 0 0\nv 1 0 0\nv 0 1 0\n\
                      v 10 10 10\nv 11 10 10\nv 10 11 10\n\
                      f 1 2 3\nf 4 5 6\n";
        let store = GeometryStore::parse(source.as_bytes(), "test.obj").unwrap();

        let config = OctreeConfig {
            max_depth: 4,
            leaf_capacity: 0,
        };
        let bounds = BoundingBox::new(Vec3::ZERO, Vec3::splat(20.0));
        let octree = Octree::build(&store, bounds, config);

        assert!(!store.triangles.is_empty());
        for triangle in &store.triangles {
            assert!(triangle.positions().all(|p| p.is_finite()));
        }

        for (_, leaf) in octree.iter_leaves() {
            for batch in leaf.batches() {
                for &triangle in &batch.triangles {
                    for position in store.triangle(triangle).positions() {
                        assert!(leaf.bounds.point_in(position));
                    }
                }
            }
        }
    }
}
