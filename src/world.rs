use std::path::{Path, PathBuf};

use glam::Vec3;
use log::{debug, info, warn};

use crate::{
    app::UpdateContext,
    bounds::BoundingBox,
    entity::{Entities, Entity, EntityId},
    geometry::{GeometryError, GeometryStore},
    octree::{Octree, OctreeStats},
    render::Camera,
    vis::{DrawCommand, OcclusionQueries, VisConfig, VisibilityWalker, VisibleSet, WalkStats},
};

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("Invalid world bounds {0:?}, the volume must be positive and finite")]
    InvalidBounds(BoundingBox),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisStats {
    pub octree: OctreeStats,
    pub walk: WalkStats,
}

pub struct LoadedWorld {
    pub path: PathBuf,
    pub geometry: GeometryStore,
    pub octree: Octree,
}

pub struct World {
    pub camera: Camera,
    pub vis: VisConfig,
    pub loaded: Option<LoadedWorld>,
    pub entities: Entities,
    pub walker: VisibilityWalker,
    pub visible: VisibleSet,
    pub commands: Vec<DrawCommand>,
    pub stats: WalkStats,
    pub show_wireframe: bool,
    pass: u64,
    time: f32,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub const GEOMETRY_FILE: &'static str = "geo.obj";
    pub const VIS_FILE: &'static str = "vis";

    pub fn new() -> Self {
        Self {
            camera: Camera::default(),
            vis: VisConfig::default(),
            loaded: None,
            entities: Entities::new(),
            walker: VisibilityWalker::new(),
            visible: VisibleSet::new(),
            commands: Vec::new(),
            stats: WalkStats::default(),
            show_wireframe: false,
            pass: 0,
            time: 0.0,
        }
    }

    /// On error no world is loaded.
    pub fn initialize(&mut self, path: &Path) -> Result<(), WorldError> {
        self.destroy();

        self.vis.read(&path.join(Self::VIS_FILE));
        let geometry = GeometryStore::load(&path.join(Self::GEOMETRY_FILE))?;

        let bounds = match self.vis.bounds {
            Some(bounds) => bounds,
            None => geometry.padded_bounds(),
        };

        if !bounds.is_finite() || bounds.volume() <= 0.0 {
            return Err(WorldError::InvalidBounds(bounds));
        }

        let octree = Octree::build(&geometry, bounds, self.vis.octree);

        info!("Initialized world {}", path.display());

        self.loaded = Some(LoadedWorld {
            path: path.to_path_buf(),
            geometry,
            octree,
        });

        Ok(())
    }

    pub fn destroy(&mut self) {
        if let Some(world) = self.loaded.take() {
            info!("Destroyed world {}", world.path.display());
        }

        self.entities.clear();
        self.visible.clear();
        self.commands.clear();
    }

    pub fn octree(&self) -> Option<&Octree> {
        self.loaded.as_ref().map(|world| &world.octree)
    }

    pub fn spawn_entity(&mut self, entity: Entity) -> EntityId {
        let id = self.entities.spawn(entity);
        self.requery_entity(id);
        id
    }

    pub fn despawn_entity(&mut self, id: EntityId) {
        if let Some(world) = &mut self.loaded {
            world.octree.remove_entity(id);
        }

        self.entities.despawn(id);
    }

    pub fn move_entity(&mut self, id: EntityId, position: Vec3) {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.position = position;
            self.requery_entity(id);
        }
    }

    pub fn requery_entity(&mut self, id: EntityId) {
        let (Some(world), Some(entity)) = (&mut self.loaded, self.entities.get(id)) else {
            return;
        };

        world.octree.requery_entity(id, &entity.bounding_box());
    }

    pub fn update(&mut self, cx: UpdateContext) {
        self.camera.update(cx);
        self.time += cx.delta;

        for id in self.entities.ids() {
            let moved = match self.entities.get_mut(id) {
                Some(entity) => entity.update(self.time),
                None => false,
            };

            if moved {
                self.requery_entity(id);
            }
        }
    }

    pub fn post_update(&mut self) {
        self.commands.clear();
    }

    pub fn set_vis_disabled(&mut self, disabled: bool) {
        self.walker.disabled = disabled;
        info!("Occlusion culling {}", if disabled { "disabled" } else { "enabled" });
    }

    pub fn set_show_wireframe(&mut self, show: bool) {
        self.show_wireframe = show;
        info!("Leaf wireframes {}", if show { "on" } else { "off" });
    }

    pub fn build_visible_set<Q: OcclusionQueries>(&mut self, queries: &mut Q) {
        let Some(world) = &self.loaded else {
            self.visible.clear();
            return;
        };

        let eye = self.camera.eye();
        self.stats = (self.walker).walk(&world.octree, eye, queries, &mut self.visible);
    }

    pub fn render_visible_set(&mut self) -> &[DrawCommand] {
        self.commands.clear();

        let pass = self.next_pass();
        if let Some(world) = &self.loaded {
            (self.visible).render(&world.octree, &mut self.entities, pass, &mut self.commands);
        }

        &self.commands
    }

    pub fn wireframe_bounds(&self) -> Vec<BoundingBox> {
        match (&self.loaded, self.show_wireframe) {
            (Some(world), true) => self.visible.leaf_bounds(&world.octree).collect(),
            _ => Vec::new(),
        }
    }

    fn next_pass(&mut self) -> u64 {
        self.pass = match self.pass.checked_add(1) {
            Some(pass) => pass,
            None => {
                warn!("Draw pass counter wrapped, resetting entity draw marks");
                self.entities.reset_draw_marks();
                1
            }
        };

        debug_assert!(self.pass != 0);
        self.pass
    }

    pub fn vis_stats(&self) -> Option<VisStats> {
        Some(VisStats {
            octree: self.octree()?.stats(),
            walk: self.stats,
        })
    }

    pub fn log_stats(&self) {
        let Some(stats) = self.vis_stats() else {
            debug!("No world loaded");
            return;
        };

        info!(
            "{} nodes, {} leaves, depth {}, {} triangles",
            stats.octree.nodes, stats.octree.leaves, stats.octree.depth, stats.octree.triangles,
        );
        info!(
            "Last walk: {} visible leaves, {} queries over {} levels, {} culled",
            stats.walk.leaves, stats.walk.queries, stats.walk.levels, stats.walk.culled,
        );
    }
}
