use std::{mem, ops::Range, sync::mpsc};

use glam::Vec3;
use log::{trace, warn};
use wgpu::util::DeviceExt;

use crate::{
    bounds::BoundingBox,
    geometry::GeometryStore,
    render::{open_shader, DrawCamera, Renderer},
    vis::{OcclusionQueries, QueryHandle},
};

use super::{create_camera_bind_group, create_camera_layout, BoxInstance};

pub struct OcclusionPipelines {
    pub camera_layout: wgpu::BindGroupLayout,
    pub occluder: wgpu::RenderPipeline,
    pub query: wgpu::RenderPipeline,
}

impl OcclusionPipelines {
    pub fn new(device: &wgpu::Device) -> anyhow::Result<Self> {
        let camera_layout = create_camera_layout(device);

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Occlusion Pipeline Layout"),
            bind_group_layouts: &[&camera_layout],
            push_constant_ranges: &[],
        });

        let shader = open_shader(device, "assets/shaders/occlusion.wgsl")?;

        let occluder = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Occluder Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_occluder",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: mem::size_of::<Vec3>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                }],
            },
            fragment: None,
            primitive: Default::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: OcclusionPhase::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
        });

        // depth tested only, the occluder depth is never written by queries
        let query = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Occlusion Query Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_query",
                buffers: &[BoxInstance::layout()],
            },
            fragment: None,
            primitive: Default::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: OcclusionPhase::DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
        });

        Ok(Self {
            camera_layout,
            occluder,
            query,
        })
    }
}

pub struct DrawOccluders {
    pub buffer: wgpu::Buffer,
    pub vertex_count: u32,
}

pub struct OcclusionPhase {
    pub pipelines: OcclusionPipelines,
    pub camera_bind_group: wgpu::BindGroup,
    pub depth_texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    pub occluders: Option<DrawOccluders>,
    pub instance_buffer: wgpu::Buffer,
    pub query_sets: Vec<wgpu::QuerySet>,
    pub resolve_buffer: wgpu::Buffer,
    pub readback_buffer: wgpu::Buffer,
    /// Queries the instance and result buffers have room for.
    capacity: u32,
    pending: Vec<BoundingBox>,
    /// Results of the current walk, indexed by handle.
    results: Vec<Option<u64>>,
}

impl OcclusionPhase {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    pub const SIZE: u32 = 256;
    pub const QUERY_SET_SIZE: u32 = 4096;

    pub fn new(device: &wgpu::Device, camera: &DrawCamera) -> anyhow::Result<Self> {
        let pipelines = OcclusionPipelines::new(device)?;
        let camera_bind_group =
            create_camera_bind_group(device, &pipelines.camera_layout, camera);

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Occlusion Depth Texture"),
            size: wgpu::Extent3d {
                width: Self::SIZE,
                height: Self::SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth_texture.create_view(&Default::default());

        let capacity = 64;
        let (instance_buffer, resolve_buffer, readback_buffer) =
            Self::create_buffers(device, capacity);

        Ok(Self {
            pipelines,
            camera_bind_group,
            depth_texture,
            depth_view,
            occluders: None,
            instance_buffer,
            query_sets: Vec::new(),
            resolve_buffer,
            readback_buffer,
            capacity,
            pending: Vec::new(),
            results: Vec::new(),
        })
    }

    fn create_buffers(
        device: &wgpu::Device,
        capacity: u32,
    ) -> (wgpu::Buffer, wgpu::Buffer, wgpu::Buffer) {
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Occlusion Query Instances"),
            size: capacity as u64 * mem::size_of::<BoxInstance>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let result_size = resolve_size(capacity);

        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Occlusion Query Resolve"),
            size: result_size,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Occlusion Query Readback"),
            size: result_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        (instance_buffer, resolve_buffer, readback_buffer)
    }

    fn reserve(&mut self, device: &wgpu::Device, count: u32) {
        if count > self.capacity {
            self.capacity = count.next_power_of_two();

            trace!("Growing occlusion query buffers to {}", self.capacity);

            let (instance, resolve, readback) = Self::create_buffers(device, self.capacity);
            self.instance_buffer = instance;
            self.resolve_buffer = resolve;
            self.readback_buffer = readback;
        }

        let sets = query_chunks(count).count();
        while self.query_sets.len() < sets {
            let set = device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("Occlusion Query Set"),
                ty: wgpu::QueryType::Occlusion,
                count: Self::QUERY_SET_SIZE,
            });

            self.query_sets.push(set);
        }
    }

    pub fn load_world(&mut self, device: &wgpu::Device, geometry: &GeometryStore) {
        if geometry.occluders.is_empty() {
            self.occluders = None;
            return;
        }

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Occluder Vertex Buffer"),
            contents: bytemuck::cast_slice(&geometry.occluders),
            usage: wgpu::BufferUsages::VERTEX,
        });

        self.occluders = Some(DrawOccluders {
            buffer,
            vertex_count: geometry.occluders.len() as u32,
        });
    }

    pub fn unload_world(&mut self) {
        self.occluders = None;
        self.pending.clear();
        self.results.clear();
    }

    pub fn queries<'a>(
        &'a mut self,
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
    ) -> GpuQueries<'a> {
        GpuQueries {
            device,
            queue,
            phase: self,
        }
    }
}

/// Every barrier submits the batch and blocks on the readback.
pub struct GpuQueries<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    phase: &'a mut OcclusionPhase,
}

impl GpuQueries<'_> {
    fn encode_queries(&self, encoder: &mut wgpu::CommandEncoder, count: u32) {
        let phase = &*self.phase;

        for (set, chunk) in phase.query_sets.iter().zip(query_chunks(count)) {
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Occlusion Query Pass"),
                    color_attachments: &[],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &phase.depth_view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: Some(set),
                });

                pass.set_pipeline(&phase.pipelines.query);
                pass.set_bind_group(0, &phase.camera_bind_group, &[]);
                pass.set_vertex_buffer(0, phase.instance_buffer.slice(..));

                for (local, instance) in chunk.clone().enumerate() {
                    pass.begin_occlusion_query(local as u32);
                    pass.draw(0..36, instance..instance + 1);
                    pass.end_occlusion_query();
                }
            }

            let offset = chunk.start as u64 * mem::size_of::<u64>() as u64;
            encoder.resolve_query_set(set, 0..chunk.len() as u32, &phase.resolve_buffer, offset);
        }

        let size = count as u64 * mem::size_of::<u64>() as u64;
        encoder.copy_buffer_to_buffer(&phase.resolve_buffer, 0, &phase.readback_buffer, 0, size);
    }

    fn read_results(&self, count: u32) -> Option<Vec<u64>> {
        let size = count as u64 * mem::size_of::<u64>() as u64;
        let slice = self.phase.readback_buffer.slice(..size);

        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("Failed to read occlusion query results: {}", err);
                return None;
            }
            Err(_) => {
                warn!("Occlusion query readback was dropped");
                return None;
            }
        }

        let samples = decode_samples(&slice.get_mapped_range());
        self.phase.readback_buffer.unmap();

        Some(samples)
    }
}

impl OcclusionQueries for GpuQueries<'_> {
    fn seed_occluders(&mut self) {
        self.phase.pending.clear();
        self.phase.results.clear();

        let phase = &*self.phase;
        let mut encoder = (self.device).create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Occluder Seed Encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Occluder Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &phase.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(occluders) = &phase.occluders {
                pass.set_pipeline(&phase.pipelines.occluder);
                pass.set_bind_group(0, &phase.camera_bind_group, &[]);
                pass.set_vertex_buffer(0, occluders.buffer.slice(..));
                pass.draw(0..occluders.vertex_count, 0..1);
            }
        }

        self.queue.submit(Some(encoder.finish()));
    }

    fn issue(&mut self, bounds: &BoundingBox) -> QueryHandle {
        self.phase.pending.push(*bounds);
        self.phase.results.push(None);

        QueryHandle(self.phase.results.len() as u32 - 1)
    }

    fn wait_all(&mut self) {
        let count = self.phase.pending.len() as u32;
        if count == 0 {
            return;
        }

        self.phase.reserve(self.device, count);

        let instances: Vec<_> = (self.phase.pending.iter())
            .map(|bounds| BoxInstance::new(bounds, Vec3::ZERO))
            .collect();
        let bytes = bytemuck::cast_slice(&instances);
        self.queue.write_buffer(&self.phase.instance_buffer, 0, bytes);

        let mut encoder = (self.device).create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Occlusion Query Encoder"),
        });
        self.encode_queries(&mut encoder, count);
        self.queue.submit(Some(encoder.finish()));

        let first = self.phase.results.len() - count as usize;
        if let Some(samples) = self.read_results(count) {
            for (result, samples) in self.phase.results[first..].iter_mut().zip(samples) {
                *result = Some(samples);
            }
        }

        self.phase.pending.clear();
    }

    fn poll(&self, query: QueryHandle) -> Option<u64> {
        self.phase.results.get(query.0 as usize).copied().flatten()
    }
}

pub fn query_chunks(count: u32) -> impl Iterator<Item = Range<u32>> {
    let size = OcclusionPhase::QUERY_SET_SIZE;
    (0..count.div_ceil(size)).map(move |i| i * size..u32::min((i + 1) * size, count))
}

/// Resolved query results are 8 byte little endian sample counts.
pub fn decode_samples(bytes: &[u8]) -> Vec<u64> {
    (bytes.chunks_exact(mem::size_of::<u64>()))
        .map(|chunk| {
            let mut sample = [0; 8];
            sample.copy_from_slice(chunk);
            u64::from_le_bytes(sample)
        })
        .collect()
}

/// Resolve destinations are aligned, so round the result buffers up.
fn resolve_size(capacity: u32) -> u64 {
    let size = capacity as u64 * mem::size_of::<u64>() as u64;
    size.next_multiple_of(wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT)
}

impl Renderer {
    pub fn occlusion_queries(&mut self) -> GpuQueries<'_> {
        (self.occlusion_phase).queries(&self.device, &self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_every_query() {
        assert_eq!(query_chunks(0).count(), 0);
        assert_eq!(query_chunks(10).collect::<Vec<_>>(), vec![0..10]);

        let size = OcclusionPhase::QUERY_SET_SIZE;
        let chunks: Vec<_> = query_chunks(size * 2 + 5).collect();
        assert_eq!(chunks, vec![0..size, size..size * 2, size * 2..size * 2 + 5]);
    }

    #[test]
    fn samples_decode_little_endian() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&1234u64.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());

        assert_eq!(decode_samples(&bytes), vec![0, 1234, u64::MAX]);
    }

    #[test]
    fn resolve_size_is_aligned() {
        assert_eq!(resolve_size(1), 256);
        assert_eq!(resolve_size(64), 512);
        assert_eq!(resolve_size(5000), 40192);
        assert_eq!(resolve_size(5000) % wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT, 0);
    }
}
