#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use app::App;
use clap::Parser;
use log::error;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

mod app;
mod bounds;
mod entity;
mod geometry;
mod input;
mod octree;
mod render;
mod vis;
mod world;

#[derive(Parser)]
pub struct Args {
    #[clap(short, long, default_value = "info")]
    pub log_level: log::LevelFilter,
    /// Directory holding `geo.obj` and `vis`.
    #[clap(short, long)]
    pub world: Option<PathBuf>,
    /// Start with occlusion culling disabled.
    #[clap(long)]
    pub vis_disable: bool,
    /// Start with visible leaf wireframes on.
    #[clap(long)]
    pub wireframe: bool,
    /// Number of moving demo props.
    #[clap(long, default_value_t = 0)]
    pub props: u32,
}

impl Args {
    pub fn init_logger(&self) {
        env_logger::builder()
            .filter_level(self.log_level)
            .filter_module("wgpu", log::LevelFilter::Warn)
            .filter_module("wgpu_core", log::LevelFilter::Warn)
            .filter_module("wgpu_hal", log::LevelFilter::Warn)
            .filter_module("winit", log::LevelFilter::Warn)
            .filter_module("naga", log::LevelFilter::Warn)
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.init_logger();

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("Occlusion Vis")
        .build(&event_loop)?;

    let mut app = App::new(Arc::new(window), &args)?;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);

        match &event {
            Event::WindowEvent { event, .. } => {
                match event {
                    WindowEvent::CloseRequested => {
                        if app.request_close() {
                            elwt.exit();
                        }
                    }
                    WindowEvent::Resized(size) => {
                        app.window_resized(size.width, size.height);
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(e) = app.render() {
                            error!("{:#}", e);
                        }
                    }
                    _ => {}
                }

                app.window_event(event);
            }
            Event::DeviceEvent { event, .. } => app.device_event(event),
            Event::AboutToWait => app.request_redraw(),
            _ => {}
        }
    })?;

    Ok(())
}
