//! GPU visibility reducer
//!
//! Uploads the tagged render as an `Rgba32Float` texture and runs one compute
//! dispatch that `atomicMin`s every pixel's LOD into its texture slot. The
//! kernel walks the image with a grid-stride loop, so images larger than the
//! dispatch limit are still covered by a single dispatch.

use super::visibility_reducer::{occluded_lods, validate_texture_count, VisibilityReducer};
use crate::constants::REDUCE_WORKGROUP_SIZE;
use crate::error::{AtlasError, AtlasResult};
use bytemuck::{Pod, Zeroable};
use image::Rgba32FImage;
use wgpu::util::DeviceExt;

const REDUCE_SHADER: &str = r#"
struct ReduceParams {
    output_size: u32,
    _padding0: u32,
    _padding1: u32,
    _padding2: u32,
};

@group(0) @binding(0) var input_tex: texture_2d<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<atomic<i32>>;
@group(0) @binding(2) var<uniform> params: ReduceParams;

@compute @workgroup_size(8, 8, 1)
fn reduce_max_lod(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(num_workgroups) num_groups: vec3<u32>,
) {
    let dims = textureDimensions(input_tex);
    let stride = num_groups.xy * vec2<u32>(8u, 8u);

    var y = global_id.y;
    loop {
        if (y >= dims.y) { break; }
        var x = global_id.x;
        loop {
            if (x >= dims.x) { break; }
            let p = textureLoad(input_tex, vec2<i32>(i32(x), i32(y)), 0);
            if (p.a > 0.0 && p.b > 0.0) {
                let id = i32(round(p.g * f32(params.output_size)));
                if (id >= 0 && id < i32(params.output_size)) {
                    atomicMin(&output[id], i32(round(p.r / p.b)));
                }
            }
            x = x + stride.x;
        }
        y = y + stride.y;
    }
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ReduceParams {
    output_size: u32,
    _padding: [u32; 3],
}

pub struct GpuVisibilityReducer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    max_workgroups: u32,
    max_texture_dimension: u32,
}

impl GpuVisibilityReducer {
    /// Create a reducer on the default adapter
    pub fn new(entry_point: &str) -> AtlasResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| AtlasError::ComputeUnsupported("no GPU adapter available".to_string()))?;

        let capabilities = adapter.get_downlevel_capabilities();
        if !capabilities
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(AtlasError::ComputeUnsupported(format!(
                "adapter '{}' has no compute shader support",
                adapter.get_info().name
            )));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("LOD Reduce Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| AtlasError::ComputeUnsupported(format!("request_device failed: {}", e)))?;

        log::info!(
            "[GpuVisibilityReducer::new] Using adapter '{}' ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend
        );

        Self::from_device(device, queue, entry_point)
    }

    /// Build the reduction pipeline on an existing device
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        entry_point: &str,
    ) -> AtlasResult<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("LOD Reduce Shader"),
            source: wgpu::ShaderSource::Wgsl(REDUCE_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LOD Reduce Bind Group Layout"),
            entries: &[
                // Tagged render
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Per-texture LOD
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Params
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("LOD Reduce Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("LOD Reduce Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            log::error!(
                "[GpuVisibilityReducer::from_device] Cannot build kernel '{}': {}",
                entry_point,
                error
            );
            return Err(AtlasError::ComputeUnsupported(format!(
                "cannot find kernel '{}' in reduction shader: {}",
                entry_point, error
            )));
        }

        let limits = device.limits();
        Ok(Self {
            max_workgroups: limits.max_compute_workgroups_per_dimension,
            max_texture_dimension: limits.max_texture_dimension_2d,
            device,
            queue,
            pipeline,
            bind_group_layout,
        })
    }

    /// Largest atlas edge the device can allocate
    pub fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn upload_tagged(&self, tagged: &Rgba32FImage) -> wgpu::Texture {
        let size = wgpu::Extent3d {
            width: tagged.width(),
            height: tagged.height(),
            depth_or_array_layers: 1,
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Tagged Render"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(tagged.as_raw().as_slice()),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(16 * tagged.width()),
                rows_per_image: Some(tagged.height()),
            },
            size,
        );

        texture
    }

    fn read_back(&self, buffer: &wgpu::Buffer, texture_count: usize) -> AtlasResult<Vec<i32>> {
        let buffer_slice = buffer.slice(..);
        let (sender, receiver) = flume::bounded(1);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| AtlasError::GpuOperationFailed {
                operation: "lod readback recv".to_string(),
                error: e.to_string(),
            })?
            .map_err(|e| AtlasError::GpuOperationFailed {
                operation: "lod readback map_async".to_string(),
                error: e.to_string(),
            })?;

        let data = buffer_slice.get_mapped_range();
        let lods: Vec<i32> = bytemuck::cast_slice::<u8, i32>(&data)[..texture_count].to_vec();
        drop(data);
        buffer.unmap();

        Ok(lods)
    }
}

/// The tagged render is uploaded as one texture, so it must fit the device
pub fn check_upload_size(width: u32, height: u32, max_dimension: u32) -> AtlasResult<()> {
    if width > max_dimension || height > max_dimension {
        return Err(AtlasError::GpuOperationFailed {
            operation: "tagged render upload".to_string(),
            error: format!(
                "{}x{} exceeds the device texture limit {}",
                width, height, max_dimension
            ),
        });
    }
    Ok(())
}

/// Workgroups needed to cover `pixel_count` pixels on one axis
pub fn dispatch_count(pixel_count: u32, group_size: u32) -> u32 {
    pixel_count / group_size + u32::from(pixel_count % group_size > 0)
}

impl VisibilityReducer for GpuVisibilityReducer {
    fn reduce(&mut self, tagged: &Rgba32FImage, texture_count: usize) -> AtlasResult<Vec<i32>> {
        validate_texture_count(texture_count)?;

        let initial = occluded_lods(texture_count);
        if tagged.width() == 0 || tagged.height() == 0 {
            return Ok(initial);
        }
        check_upload_size(tagged.width(), tagged.height(), self.max_texture_dimension)?;

        let texture = self.upload_tagged(tagged);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let output_size = (texture_count * std::mem::size_of::<i32>()) as u64;
        let output = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("LOD Output Buffer"),
                contents: bytemuck::cast_slice(&initial),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("LOD Readback Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params = ReduceParams {
            output_size: texture_count as u32,
            _padding: [0; 3],
        };
        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("LOD Reduce Params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LOD Reduce Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let groups_x = dispatch_count(tagged.width(), REDUCE_WORKGROUP_SIZE).min(self.max_workgroups);
        let groups_y = dispatch_count(tagged.height(), REDUCE_WORKGROUP_SIZE).min(self.max_workgroups);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("LOD Reduce Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("LOD Reduce Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&output, 0, &readback, 0, output_size);
        self.queue.submit(Some(encoder.finish()));

        let lods = self.read_back(&readback, texture_count)?;

        log::debug!(
            "[GpuVisibilityReducer::reduce] {}x{} pixels in {}x{} workgroups, {} textures",
            tagged.width(),
            tagged.height(),
            groups_x,
            groups_y,
            texture_count
        );

        Ok(lods)
    }

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn device_texture_limit(&self) -> Option<u32> {
        Some(self.max_texture_dimension)
    }
}
