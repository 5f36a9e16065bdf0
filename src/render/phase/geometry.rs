use std::{mem, ops::Range};

use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::{
    bounds::BoundingBox,
    geometry::{GeometryStore, MaterialId, Vertex},
    octree::Octree,
    render::{open_shader, DrawCamera, RenderContext, Renderer},
    vis::DrawCommand,
};

use super::{create_camera_bind_group, create_camera_layout, BoxInstance};

pub struct GeometryPipelines {
    pub camera_layout: wgpu::BindGroupLayout,
    pub material_layout: wgpu::BindGroupLayout,
    pub batch: wgpu::RenderPipeline,
    pub solid_box: wgpu::RenderPipeline,
    pub line_box: wgpu::RenderPipeline,
}

impl GeometryPipelines {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> anyhow::Result<Self> {
        let camera_layout = create_camera_layout(device);

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let batch_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Batch Pipeline Layout"),
            bind_group_layouts: &[&camera_layout, &material_layout],
            push_constant_ranges: &[],
        });

        let box_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Box Pipeline Layout"),
            bind_group_layouts: &[&camera_layout],
            push_constant_ranges: &[],
        });

        let geometry_shader = open_shader(device, "assets/shaders/geometry.wgsl")?;
        let box_shader = open_shader(device, "assets/shaders/boxes.wgsl")?;

        let targets = [Some(wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let depth = |write: bool| wgpu::DepthStencilState {
            format: Renderer::DEPTH_FORMAT,
            depth_write_enabled: write,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: Default::default(),
            bias: Default::default(),
        };

        let batch = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Batch Pipeline"),
            layout: Some(&batch_layout),
            vertex: wgpu::VertexState {
                module: &geometry_shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x3,
                        1 => Float32x3,
                        2 => Float32x2,
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &geometry_shader,
                entry_point: "fs_main",
                targets: &targets,
            }),
            primitive: Default::default(),
            depth_stencil: Some(depth(true)),
            multisample: Default::default(),
            multiview: None,
        });

        let solid_box = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Entity Box Pipeline"),
            layout: Some(&box_layout),
            vertex: wgpu::VertexState {
                module: &box_shader,
                entry_point: "vs_solid",
                buffers: &[BoxInstance::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &box_shader,
                entry_point: "fs_solid",
                targets: &targets,
            }),
            primitive: Default::default(),
            depth_stencil: Some(depth(true)),
            multisample: Default::default(),
            multiview: None,
        });

        let line_box = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Wireframe Pipeline"),
            layout: Some(&box_layout),
            vertex: wgpu::VertexState {
                module: &box_shader,
                entry_point: "vs_lines",
                buffers: &[BoxInstance::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &box_shader,
                entry_point: "fs_lines",
                targets: &targets,
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: Some(depth(false)),
            multisample: Default::default(),
            multiview: None,
        });

        Ok(Self {
            camera_layout,
            material_layout,
            batch,
            solid_box,
            line_box,
        })
    }
}

pub struct DrawWorld {
    pub vertices: Option<wgpu::Buffer>,
    pub material_buffers: Vec<wgpu::Buffer>,
    pub materials: Vec<wgpu::BindGroup>,
}

impl DrawWorld {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &GeometryPipelines,
        geometry: &GeometryStore,
        octree: &Octree,
    ) -> Self {
        let vertices = (!octree.batch_vertices.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Batch Vertex Buffer"),
                contents: bytemuck::cast_slice(&octree.batch_vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let material_buffers: Vec<_> = (geometry.materials.iter())
            .map(|(_, material)| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Material Buffer: {}", material.name)),
                    contents: bytemuck::bytes_of(&material.color.extend(1.0)),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            })
            .collect();

        let materials = (material_buffers.iter())
            .map(|buffer| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Material Bind Group"),
                    layout: &pipelines.material_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        Self {
            vertices,
            material_buffers,
            materials,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDraws {
    pub batches: Vec<(MaterialId, Range<u32>)>,
    pub boxes: Vec<BoxInstance>,
    pub solid: Range<u32>,
    pub lines: Range<u32>,
}

impl FrameDraws {
    pub const WIREFRAME_COLOR: Vec3 = Vec3::new(1.0, 0.8, 0.2);

    pub fn new(commands: &[DrawCommand], wireframes: &[BoundingBox]) -> Self {
        let mut draws = Self::default();

        for command in commands {
            match command {
                DrawCommand::Batch { material, vertices } => {
                    draws.batches.push((*material, vertices.clone()));
                }
                DrawCommand::Entity { bounds, color, .. } => {
                    draws.boxes.push(BoxInstance::new(bounds, *color));
                }
            }
        }

        let solid = draws.boxes.len() as u32;

        for bounds in wireframes {
            (draws.boxes).push(BoxInstance::new(bounds, Self::WIREFRAME_COLOR));
        }

        draws.solid = 0..solid;
        draws.lines = solid..draws.boxes.len() as u32;
        draws
    }
}

pub struct GeometryPhase {
    pub pipelines: GeometryPipelines,
    pub camera_bind_group: wgpu::BindGroup,
    pub world: Option<DrawWorld>,
}

impl GeometryPhase {
    pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
        r: 0.48,
        g: 0.64,
        b: 0.83,
        a: 1.0,
    };

    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        camera: &DrawCamera,
    ) -> anyhow::Result<Self> {
        let pipelines = GeometryPipelines::new(device, format)?;
        let camera_bind_group =
            create_camera_bind_group(device, &pipelines.camera_layout, camera);

        Ok(Self {
            pipelines,
            camera_bind_group,
            world: None,
        })
    }

    pub fn load_world(
        &mut self,
        device: &wgpu::Device,
        geometry: &GeometryStore,
        octree: &Octree,
    ) {
        self.world = Some(DrawWorld::new(device, &self.pipelines, geometry, octree));
    }

    pub fn unload_world(&mut self) {
        self.world = None;
    }

    pub fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        cx: RenderContext,
        draws: &FrameDraws,
    ) -> anyhow::Result<()> {
        let instances = (!draws.boxes.is_empty()).then(|| {
            cx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Box Instance Buffer"),
                contents: bytemuck::cast_slice(&draws.boxes),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Geometry Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: cx.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(Self::CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: cx.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_bind_group(0, &self.camera_bind_group, &[]);

        if let Some(DrawWorld {
            vertices: Some(vertices),
            materials,
            ..
        }) = &self.world
        {
            pass.set_pipeline(&self.pipelines.batch);
            pass.set_vertex_buffer(0, vertices.slice(..));

            let mut bound = None;
            for (material, range) in &draws.batches {
                let Some(bind_group) = materials.get(material.index()) else {
                    continue;
                };

                if bound != Some(*material) {
                    pass.set_bind_group(1, bind_group, &[]);
                    bound = Some(*material);
                }

                pass.draw(range.clone(), 0..1);
            }
        }

        if let Some(instances) = &instances {
            pass.set_vertex_buffer(0, instances.slice(..));

            if !draws.solid.is_empty() {
                pass.set_pipeline(&self.pipelines.solid_box);
                pass.draw(0..36, draws.solid.clone());
            }

            if !draws.lines.is_empty() {
                pass.set_pipeline(&self.pipelines.line_box);
                pass.draw(0..24, draws.lines.clone());
            }
        }

        Ok(())
    }
}
