use glam::Vec3;
use log::trace;

use crate::{
    bounds::BoundingBox,
    octree::{NodeId, Octree},
};

use super::VisibleSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u32);

/// Results are only guaranteed to be available after `wait_all` returned.
pub trait OcclusionQueries {
    /// Handles of the previous walk become invalid.
    fn seed_occluders(&mut self);

    fn issue(&mut self, bounds: &BoundingBox) -> QueryHandle;

    fn wait_all(&mut self);

    fn poll(&self, query: QueryHandle) -> Option<u64>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub levels: u32,
    pub queries: u32,
    pub culled: u32,
    pub leaves: u32,
}

#[derive(Clone, Debug)]
pub struct VisibilityWalker {
    pub disabled: bool,
    /// How close the eye must be to a box to always traverse it.
    pub eye_tolerance: f32,
    queues: [Vec<NodeId>; 2],
    pending: Vec<(NodeId, QueryHandle)>,
}

impl Default for VisibilityWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityWalker {
    pub const EYE_TOLERANCE: f32 = 1.5;

    pub fn new() -> Self {
        Self {
            disabled: false,
            eye_tolerance: Self::EYE_TOLERANCE,
            queues: [Vec::new(), Vec::new()],
            pending: Vec::new(),
        }
    }

    pub fn walk<Q: OcclusionQueries>(
        &mut self,
        octree: &Octree,
        eye: Vec3,
        queries: &mut Q,
        visible: &mut VisibleSet,
    ) -> WalkStats {
        visible.clear();

        if self.disabled {
            visible.leaves.extend_from_slice(&octree.leaves);

            return WalkStats {
                leaves: visible.len() as u32,
                ..Default::default()
            };
        }

        let mut stats = WalkStats::default();

        queries.seed_occluders();

        let mut current = 0;
        self.queues[current].clear();
        self.queues[current].push(octree.root());

        while !self.queues[current].is_empty() {
            let next = current ^ 1;
            self.queues[next].clear();
            self.pending.clear();

            for &index in &self.queues[current] {
                let Some(children) = octree[index].children() else {
                    visible.leaves.push(index);
                    continue;
                };

                for child in children {
                    let handle = queries.issue(&octree[child].bounds);
                    self.pending.push((child, handle));
                }
            }

            if !self.pending.is_empty() {
                queries.wait_all();
            }

            // results are read back in the order they were issued
            for &(child, handle) in &self.pending {
                // a query without a result is treated as visible
                let samples = queries.poll(handle).unwrap_or(u64::MAX);
                let bounds = &octree[child].bounds;

                if samples > 0 || bounds.point_in_tolerance(eye, self.eye_tolerance) {
                    self.queues[next].push(child);
                } else {
                    stats.culled += 1;
                }
            }

            stats.levels += 1;
            stats.queries += self.pending.len() as u32;
            current = next;
        }

        stats.leaves = visible.len() as u32;

        trace!(
            "Visibility walk: {} levels, {} queries, {} culled, {} leaves",
            stats.levels,
            stats.queries,
            stats.culled,
            stats.leaves,
        );

        stats
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::octree::{tests::scattered_store, OctreeConfig};

    /// Queries that fail for boxes fully inside any hidden region.
    #[derive(Default)]
    pub struct FakeQueries {
        pub hidden: Vec<BoundingBox>,
        pub issued: Vec<BoundingBox>,
        pub results: Vec<Option<u64>>,
        pub seeds: u32,
        pub waits: u32,
    }

    impl OcclusionQueries for FakeQueries {
        fn seed_occluders(&mut self) {
            self.seeds += 1;
            self.issued.clear();
            self.results.clear();
        }

        fn issue(&mut self, bounds: &BoundingBox) -> QueryHandle {
            self.issued.push(*bounds);
            self.results.push(None);
            QueryHandle(self.issued.len() as u32 - 1)
        }

        fn wait_all(&mut self) {
            self.waits += 1;

            for (i, bounds) in self.issued.iter().enumerate() {
                let hidden = self.hidden.iter().any(|h| h.contains_box(bounds));
                self.results[i] = Some(if hidden { 0 } else { 64 });
            }
        }

        fn poll(&self, query: QueryHandle) -> Option<u64> {
            self.results[query.0 as usize]
        }
    }

    fn octree() -> Octree {
        let store = scattered_store(600);
        let bounds = BoundingBox::new(Vec3::ZERO, Vec3::splat(100.0));
        let config = OctreeConfig {
            max_depth: 4,
            leaf_capacity: 6,
        };

        Octree::build(&store, bounds, config)
    }

    fn sorted(mut leaves: Vec<NodeId>) -> Vec<NodeId> {
        leaves.sort();
        leaves
    }

    fn expected(octree: &Octree, queries: &FakeQueries, eye: Vec3) -> Vec<NodeId> {
        fn visit(octree: &Octree, node: NodeId, q: &FakeQueries, eye: Vec3, out: &mut Vec<NodeId>) {
            match octree[node].children() {
                None => out.push(node),
                Some(children) => {
                    for child in children {
                        let bounds = &octree[child].bounds;
                        let hidden = q.hidden.iter().any(|h| h.contains_box(bounds));

                        if !hidden || bounds.point_in_tolerance(eye, 1.5) {
                            visit(octree, child, q, eye, out);
                        }
                    }
                }
            }
        }

        let mut out = Vec::new();
        visit(octree, octree.root(), queries, eye, &mut out);
        sorted(out)
    }

    #[test]
    fn everything_visible() {
        let octree = octree();
        let mut queries = FakeQueries::default();
        let mut walker = VisibilityWalker::new();
        let mut visible = VisibleSet::new();

        let stats = walker.walk(&octree, Vec3::splat(-10.0), &mut queries, &mut visible);

        assert_eq!(sorted(visible.leaves.clone()), sorted(octree.leaves.clone()));
        assert_eq!(stats.culled, 0);
        assert_eq!(stats.queries as usize, octree.len() as usize - 1);
        assert_eq!(queries.seeds, 1);
    }

    #[test]
    fn one_wait_per_level() {
        let octree = octree();
        let mut queries = FakeQueries::default();
        let mut walker = VisibilityWalker::new();
        let mut visible = VisibleSet::new();

        let stats = walker.walk(&octree, Vec3::splat(-10.0), &mut queries, &mut visible);

        // every internal depth issues one batch
        assert_eq!(queries.waits, octree.stats().depth);
        assert_eq!(stats.levels, octree.stats().depth + 1);
    }

    #[test]
    fn hidden_region_is_culled() {
        let octree = octree();
        let mut queries = FakeQueries {
            hidden: vec![BoundingBox::new(Vec3::splat(-1.0), Vec3::new(51.0, 101.0, 101.0))],
            ..Default::default()
        };
        let mut walker = VisibilityWalker::new();
        let mut visible = VisibleSet::new();

        let eye = Vec3::new(200.0, 50.0, 50.0);
        let stats = walker.walk(&octree, eye, &mut queries, &mut visible);

        assert!(stats.culled > 0);
        assert!(visible.len() < octree.leaves.len());
        assert_eq!(sorted(visible.leaves.clone()), expected(&octree, &queries, eye));

        for &leaf in &visible.leaves {
            assert!(octree[leaf].bounds.end.x > 50.0);
        }
    }

    #[test]
    fn eye_inside_hidden_node_is_traversed() {
        let octree = octree();
        let mut queries = FakeQueries {
            hidden: vec![BoundingBox::new(Vec3::splat(-10.0), Vec3::splat(110.0))],
            ..Default::default()
        };
        let mut walker = VisibilityWalker::new();
        let mut visible = VisibleSet::new();

        let eye = Vec3::new(20.0, 30.0, 40.0);
        walker.walk(&octree, eye, &mut queries, &mut visible);

        assert!(!visible.is_empty());
        assert_eq!(sorted(visible.leaves.clone()), expected(&octree, &queries, eye));

        let around_eye = visible
            .leaves
            .iter()
            .any(|&leaf| octree[leaf].bounds.point_in(eye));
        assert!(around_eye);
    }

    #[test]
    fn disabled_returns_all_leaves() {
        let octree = octree();
        let mut queries = FakeQueries {
            hidden: vec![BoundingBox::new(Vec3::splat(-10.0), Vec3::splat(110.0))],
            ..Default::default()
        };
        let mut walker = VisibilityWalker::new();
        walker.disabled = true;
        let mut visible = VisibleSet::new();

        for eye in [Vec3::ZERO, Vec3::splat(50.0), Vec3::splat(1000.0)] {
            walker.walk(&octree, eye, &mut queries, &mut visible);
            assert_eq!(visible.leaves, octree.leaves);
        }

        assert_eq!(queries.seeds, 0);
        assert!(queries.issued.is_empty());
    }

    #[test]
    fn disabled_matches_admit_all_walk() {
        let octree = octree();
        let mut walker = VisibilityWalker::new();

        let mut all = VisibleSet::new();
        walker.walk(&octree, Vec3::ZERO, &mut FakeQueries::default(), &mut all);

        walker.disabled = true;
        let mut fallback = VisibleSet::new();
        walker.walk(&octree, Vec3::ZERO, &mut FakeQueries::default(), &mut fallback);

        assert_eq!(sorted(all.leaves), sorted(fallback.leaves));
    }

    #[test]
    fn leaf_root() {
        let store = scattered_store(3);
        let bounds = BoundingBox::new(Vec3::ZERO, Vec3::splat(100.0));
        let octree = Octree::build(&store, bounds, OctreeConfig::default());

        let mut queries = FakeQueries::default();
        let mut visible = VisibleSet::new();
        VisibilityWalker::new().walk(&octree, Vec3::ZERO, &mut queries, &mut visible);

        assert_eq!(visible.leaves, vec![octree.root()]);
        assert_eq!(queries.waits, 0);
    }
}
