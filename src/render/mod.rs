mod camera;
mod phase;
mod shader;

use std::sync::Arc;

pub use camera::*;
pub use phase::*;
pub use shader::*;

use anyhow::bail;
use log::info;
use winit::window::Window;

use crate::world::World;

pub struct WgpuContext {
    pub surface: wgpu::Surface<'static>,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

pub async fn init_wgpu_async(window: Arc<Window>) -> anyhow::Result<WgpuContext> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    let surface = instance.create_surface(window)?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .ok_or(anyhow::anyhow!("No suitable adapter found"))?;

    info!("Using adapter {}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        )
        .await?;

    Ok(WgpuContext {
        surface,
        adapter,
        device,
        queue,
    })
}

pub fn init_wgpu(window: Arc<Window>) -> anyhow::Result<WgpuContext> {
    hyena::block_on(init_wgpu_async(window))
}

#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub view: &'a wgpu::TextureView,
    pub depth_view: &'a wgpu::TextureView,
    pub camera: &'a DrawCamera,
    pub width: u32,
    pub height: u32,
}

pub struct Renderer {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub surface_config: wgpu::SurfaceConfiguration,
    pub needs_configure: bool,
    pub depth_texture: wgpu::Texture,
    pub camera: DrawCamera,
    pub occlusion_phase: OcclusionPhase,
    pub geometry_phase: GeometryPhase,
}

impl Renderer {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let width = window.inner_size().width.max(1);
        let height = window.inner_size().height.max(1);

        let WgpuContext {
            surface,
            adapter,
            device,
            queue,
        } = init_wgpu(window)?;

        let capabilities = surface.get_capabilities(&adapter);
        let Some(&format) = (capabilities.formats.iter())
            .find(|format| format.is_srgb())
            .or(capabilities.formats.first())
        else {
            bail!("Surface is incompatible with the adapter");
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
        };

        let depth_texture = Self::create_depth_texture(&device, width, height);

        let camera = DrawCamera::new(&device)?;
        let occlusion_phase = OcclusionPhase::new(&device, &camera)?;
        let geometry_phase = GeometryPhase::new(&device, format, &camera)?;

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            needs_configure: true,
            depth_texture,
            camera,
            occlusion_phase,
            geometry_phase,
        })
    }

    fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_config.width = width;
        self.surface_config.height = height;

        self.needs_configure = true;
    }

    pub fn configure(&mut self) {
        self.needs_configure = false;

        self.surface.configure(&self.device, &self.surface_config);

        let width = self.surface_config.width;
        let height = self.surface_config.height;
        self.depth_texture = Self::create_depth_texture(&self.device, width, height);
    }

    pub fn aspect(&self) -> f32 {
        self.surface_config.width as f32 / self.surface_config.height as f32
    }

    pub fn load_world(&mut self, world: &World) {
        let Some(loaded) = &world.loaded else {
            self.unload_world();
            return;
        };

        (self.occlusion_phase).load_world(&self.device, &loaded.geometry);
        (self.geometry_phase).load_world(&self.device, &loaded.geometry, &loaded.octree);
    }

    pub fn unload_world(&mut self) {
        self.occlusion_phase.unload_world();
        self.geometry_phase.unload_world();
    }

    pub fn render_frame(&mut self, world: &mut World) -> anyhow::Result<()> {
        // minimized
        if self.surface_config.width == 0 || self.surface_config.height == 0 {
            return Ok(());
        }

        if self.needs_configure {
            self.configure();
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                self.surface.get_current_texture()?
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(e) => bail!(e),
        };

        // the walk reads the camera too, the write lands with its first submit
        (self.camera).write(&self.queue, &world.camera, self.aspect());
        world.build_visible_set(&mut self.occlusion_queries());

        let wireframes = world.wireframe_bounds();
        let draws = FrameDraws::new(world.render_visible_set(), &wireframes);

        let view = frame.texture.create_view(&Default::default());
        let depth_view = self.depth_texture.create_view(&Default::default());

        let cx = RenderContext {
            device: &self.device,
            queue: &self.queue,
            view: &view,
            depth_view: &depth_view,
            camera: &self.camera,
            width: self.surface_config.width,
            height: self.surface_config.height,
        };

        let mut encoder = self.device.create_command_encoder(&Default::default());
        self.geometry_phase.render(&mut encoder, cx, &draws)?;

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        Ok(())
    }
}
