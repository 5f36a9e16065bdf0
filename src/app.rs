use std::{f32::consts::TAU, path::Path, sync::Arc, time::Instant};

use glam::Vec3;
use log::info;
use winit::{
    event::{DeviceEvent, WindowEvent},
    window::Window,
};

use crate::{
    entity::{Entity, Orbit},
    input::{Key, Keyboard, Mouse},
    render::Renderer,
    world::World,
    Args,
};

#[derive(Clone, Copy, Debug)]
pub struct UpdateContext<'a> {
    pub delta: f32,
    pub mouse: &'a Mouse,
    pub keyboard: &'a Keyboard,
}

pub struct App {
    pub world: World,
    pub renderer: Renderer,
    pub window: Arc<Window>,
    pub mouse: Mouse,
    pub keyboard: Keyboard,
    pub last_frame: Instant,
}

impl App {
    pub fn new(window: Arc<Window>, args: &Args) -> anyhow::Result<Self> {
        let renderer = Renderer::new(window.clone())?;

        let mut app = Self {
            world: World::new(),
            renderer,
            window,
            mouse: Mouse::default(),
            keyboard: Keyboard::default(),
            last_frame: Instant::now(),
        };

        app.world.set_vis_disabled(args.vis_disable);
        app.world.set_show_wireframe(args.wireframe);

        if let Some(path) = &args.world {
            app.load_world(path)?;
            app.spawn_props(args.props);
        }

        Ok(app)
    }

    pub fn load_world(&mut self, path: &Path) -> anyhow::Result<()> {
        self.renderer.unload_world();
        self.world.initialize(path)?;
        self.renderer.load_world(&self.world);

        // start outside the root box, looking at its center
        if let Some(octree) = self.world.octree() {
            let bounds = octree[octree.root()].bounds;
            self.world.camera.position = bounds.end + bounds.size() * 0.25;
            self.world.camera.look_at(bounds.center());
        }

        Ok(())
    }

    pub fn spawn_props(&mut self, count: u32) {
        let Some(octree) = self.world.octree() else {
            return;
        };

        let bounds = octree[octree.root()].bounds;
        let center = bounds.center();
        let extent = bounds.size().min_element();

        for i in 0..count {
            let t = i as f32 / count as f32;
            let orbit = Orbit {
                center: center + Vec3::Y * (t - 0.5) * extent * 0.5,
                radius: extent * (0.1 + 0.3 * t),
                speed: 0.2 + 0.6 * (1.0 - t),
                phase: t * TAU,
            };

            let color = Vec3::new(0.9, 0.3 + 0.6 * t, 0.2);
            let size = Vec3::splat(extent * 0.02);
            let entity = Entity::new(orbit.position(0.0), size, color).with_orbit(orbit);
            self.world.spawn_entity(entity);
        }

        info!("Spawned {} props", count);
    }

    pub fn update(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let delta = now - self.last_frame;
        self.last_frame = now;

        if self.keyboard.is_pressed(Key::F1) {
            let disabled = !self.world.walker.disabled;
            self.world.set_vis_disabled(disabled);
        }

        if self.keyboard.is_pressed(Key::F2) {
            let show = !self.world.show_wireframe;
            self.world.set_show_wireframe(show);
        }

        if self.keyboard.is_pressed(Key::F3) {
            self.world.log_stats();
        }

        let cx = UpdateContext {
            delta: delta.as_secs_f32(),
            mouse: &self.mouse,
            keyboard: &self.keyboard,
        };

        self.world.update(cx);

        Ok(())
    }

    pub fn post_update(&mut self) -> anyhow::Result<()> {
        self.mouse.update();
        self.keyboard.update();

        self.world.post_update();

        Ok(())
    }

    pub fn device_event(&mut self, event: &DeviceEvent) {
        self.mouse.device_event(event);
    }

    pub fn window_event(&mut self, event: &WindowEvent) {
        self.mouse.window_event(event);
        self.keyboard.window_event(event);
    }

    pub fn request_close(&self) -> bool {
        true
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn window_resized(&mut self, width: u32, height: u32) {
        self.renderer.resize(width, height);
    }

    pub fn render(&mut self) -> anyhow::Result<()> {
        self.update()?;
        self.renderer.render_frame(&mut self.world)?;
        self.post_update()?;

        Ok(())
    }
}
