//! Accelerator execution path.
//!
//! [`FlockKernel`] runs the compute phase of a step on the GPU. It is strictly
//! optional: [`FlockKernel::new`] is a capability check that fails with a
//! [`GpuError`] when no adapter or device is available, and callers stay on a
//! CPU path in that case.
//!
//! Readback is a blocking synchronisation point. [`FlockKernel::compute`]
//! returns only after the results have been copied back to host memory, so
//! nothing downstream (oscillators, predators, rendering) can observe a
//! half-finished step.

mod kernel;
mod records;

pub use kernel::{flock_kernel_wgsl, WORKGROUP_SIZE};
pub use records::{GpuAgent, GpuParams};

use tracing::{info, warn};
use wgpu::util::DeviceExt;

use crate::error::GpuError;
use crate::step::{AgentUpdate, StepContext};

/// Threats uploaded per step; extra threats are ignored by the kernel.
pub const MAX_THREATS: usize = 64;
/// Attractors uploaded per step; extra attractors are ignored by the kernel.
pub const MAX_ATTRACTORS: usize = 64;

/// Compute pipeline and buffers for one simulator.
pub struct FlockKernel {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    params_buffer: wgpu::Buffer,
    agents_in: wgpu::Buffer,
    agents_out: wgpu::Buffer,
    staging: wgpu::Buffer,
    threats_buffer: wgpu::Buffer,
    attractors_buffer: wgpu::Buffer,
    capacity: usize,
    adapter_name: String,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl FlockKernel {
    /// Acquire a device and build the kernel for up to `capacity` agents.
    pub fn new(capacity: usize) -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async(capacity))
    }

    async fn new_async(capacity: usize) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Flock Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let capacity = capacity.max(1);
        let agent_bytes = (capacity * std::mem::size_of::<GpuAgent>()) as u64;
        let vec4_bytes = std::mem::size_of::<[f32; 4]>();

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Flock Params"),
            contents: bytemuck::bytes_of(&GpuParams::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let agents_in = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Flock Agents In"),
            size: agent_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let agents_out = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Flock Agents Out"),
            size: agent_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Flock Staging"),
            size: agent_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let threats_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Flock Threats"),
            size: (MAX_THREATS * vec4_bytes) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let attractors_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Flock Attractors"),
            size: (MAX_ATTRACTORS * vec4_bytes) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let source = flock_kernel_wgsl();
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Flock Kernel"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Flock Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, true),
                storage_entry(4, true),
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Flock Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: agents_in.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: agents_out.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: threats_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: attractors_buffer.as_entire_binding() },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Flock Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Flock Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        info!(adapter = %adapter_name, capacity, "GPU flock kernel ready");

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group,
            params_buffer,
            agents_in,
            agents_out,
            staging,
            threats_buffer,
            attractors_buffer,
            capacity,
            adapter_name,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Run the compute phase for every agent in `ctx` and read the results back.
    pub fn compute(&mut self, ctx: &StepContext<'_>) -> Result<Vec<AgentUpdate>, GpuError> {
        let n = ctx.count().min(self.capacity);
        if n == 0 {
            return Ok(Vec::new());
        }

        let agents: Vec<GpuAgent> = (0..n)
            .map(|i| GpuAgent {
                position: ctx.positions[i].to_array(),
                velocity: ctx.velocities[i].to_array(),
                heading: ctx.headings[i],
                panic: ctx.panic[i],
                energy: ctx.energy[i],
                density: 0.0,
            })
            .collect();

        if ctx.threats.len() > MAX_THREATS {
            warn!(threats = ctx.threats.len(), max = MAX_THREATS, "too many threats for GPU kernel, truncating");
        }
        if ctx.attractors.len() > MAX_ATTRACTORS {
            warn!(attractors = ctx.attractors.len(), max = MAX_ATTRACTORS, "too many attractors for GPU kernel, truncating");
        }
        let threats: Vec<[f32; 4]> = ctx
            .threats
            .iter()
            .take(MAX_THREATS)
            .map(|t| [t.position.x, t.position.y, t.radius, 0.0])
            .collect();
        let attractors: Vec<[f32; 4]> = ctx
            .attractors
            .iter()
            .take(MAX_ATTRACTORS)
            .map(|a| [a.position.x, a.position.y, a.signed_strength(), a.radius])
            .collect();

        let mut params = GpuParams::from_context(ctx, threats.len() as u32, attractors.len() as u32);
        params.count = n as u32;

        self.queue.write_buffer(&self.agents_in, 0, bytemuck::cast_slice(&agents));
        self.queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
        if !threats.is_empty() {
            self.queue.write_buffer(&self.threats_buffer, 0, bytemuck::cast_slice(&threats));
        }
        if !attractors.is_empty() {
            self.queue.write_buffer(&self.attractors_buffer, 0, bytemuck::cast_slice(&attractors));
        }

        let bytes = (n * std::mem::size_of::<GpuAgent>()) as u64;
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Flock Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Flock Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups((n as u32).div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        encoder.copy_buffer_to_buffer(&self.agents_out, 0, &self.staging, 0, bytes);
        self.queue.submit(Some(encoder.finish()));

        let slice = self.staging.slice(..bytes);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

        let updates = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, GpuAgent>(&data)
                .iter()
                .map(|&a| AgentUpdate::from(a))
                .collect()
        };
        self.staging.unmap();
        Ok(updates)
    }
}
