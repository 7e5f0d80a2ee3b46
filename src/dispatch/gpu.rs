use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::{
    dispatch::surface::{
        AtlasDesc, AtlasHandle, AtlasId, AtlasImage, Bindings, BufferId, BufferSource,
        DispatchSurface, KernelId, VertexBufferHandle,
    },
    foundation::{
        core::VertexRecord,
        error::{VatError, VatResult},
        math::align_to,
    },
};

const WORKGROUP_SIZE_X: u32 = 64;
const TEXEL_BYTES: u32 = 16;
const RECORD_BYTES: u64 = (VertexRecord::STRIDE_F32 * 4) as u64;

const PARAMS_WGSL: &str = r#"
struct Params {
    start_pixel: vec2<u32>,
    frame_width: u32,
    channel: u32,
    vertex_count: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
};

@group(0) @binding(2) var<uniform> params: Params;

fn texel_coord(i: u32) -> vec2<u32> {
    return params.start_pixel + vec2<u32>(i % params.frame_width, i / params.frame_width);
}
"#;

const ENCODE_WGSL: &str = r#"
@group(0) @binding(0) var result: texture_storage_2d<rgba32float, write>;
@group(0) @binding(1) var<storage, read> gpu_vertices: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= params.vertex_count) {
        return;
    }
    let base = i * 10u;
    var texel: vec4<f32>;
    if (params.channel == 0u) {
        texel = vec4<f32>(gpu_vertices[base], gpu_vertices[base + 1u], gpu_vertices[base + 2u], 1.0);
    } else if (params.channel == 1u) {
        texel = vec4<f32>(gpu_vertices[base + 3u], gpu_vertices[base + 4u], gpu_vertices[base + 5u], 0.0);
    } else {
        texel = vec4<f32>(
            gpu_vertices[base + 6u],
            gpu_vertices[base + 7u],
            gpu_vertices[base + 8u],
            gpu_vertices[base + 9u],
        );
    }
    textureStore(result, texel_coord(i), texel);
}
"#;

const DECODE_WGSL: &str = r#"
@group(0) @binding(0) var result: texture_2d<f32>;
@group(0) @binding(1) var<storage, read_write> gpu_vertices: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= params.vertex_count) {
        return;
    }
    let texel = textureLoad(result, texel_coord(i), 0);
    let base = i * 10u;
    if (params.channel == 0u) {
        gpu_vertices[base] = texel.x;
        gpu_vertices[base + 1u] = texel.y;
        gpu_vertices[base + 2u] = texel.z;
    } else if (params.channel == 1u) {
        gpu_vertices[base + 3u] = texel.x;
        gpu_vertices[base + 4u] = texel.y;
        gpu_vertices[base + 5u] = texel.z;
    } else {
        gpu_vertices[base + 6u] = texel.x;
        gpu_vertices[base + 7u] = texel.y;
        gpu_vertices[base + 8u] = texel.z;
        gpu_vertices[base + 9u] = texel.w;
    }
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DispatchParams {
    start_pixel: [u32; 2],
    frame_width: u32,
    channel: u32,
    vertex_count: u32,
    _pad: [u32; 3],
}

struct Kernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

struct GpuAtlas {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// wgpu compute execution of the encode/decode kernels.
///
/// Atlases are `Rgba32Float` storage textures; vertex buffers are `array<f32>` storage
/// buffers with ten floats per record. wgpu zero-initialises both.
pub struct GpuSurface {
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernels: [Kernel; 2],
    next_id: u64,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    atlases: HashMap<AtlasId, GpuAtlas>,
}

impl std::fmt::Debug for GpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuSurface")
            .field("buffers", &self.buffers.len())
            .field("atlases", &self.atlases.len())
            .finish_non_exhaustive()
    }
}

impl GpuSurface {
    pub fn new() -> VatResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                VatError::dispatch("no gpu adapter available")
            }
            other => VatError::dispatch(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("vatbake_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| VatError::dispatch(format!("wgpu request_device failed: {e:?}")))?;

        let encode = build_kernel(&device, KernelId::Encode);
        let decode = build_kernel(&device, KernelId::Decode);
        tracing::debug!(adapter = ?adapter.get_info().name, "gpu surface ready");

        Ok(Self {
            device,
            queue,
            kernels: [encode, decode],
            next_id: 1,
            buffers: HashMap::new(),
            atlases: HashMap::new(),
        })
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Submits `encoder` and blocks until `staging` is mapped, returning its bytes.
    fn read_staging(
        &self,
        encoder: wgpu::CommandEncoder,
        staging: &wgpu::Buffer,
    ) -> VatResult<Vec<u8>> {
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| VatError::dispatch(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| VatError::dispatch("readback channel closed"))?
            .map_err(|e| VatError::dispatch(format!("readback map failed: {e:?}")))?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }
}

fn build_kernel(device: &wgpu::Device, kernel: KernelId) -> Kernel {
    let (label, body, result_ty, vertices_read_only) = match kernel {
        KernelId::Encode => (
            "vat_encode",
            ENCODE_WGSL,
            wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: wgpu::TextureFormat::Rgba32Float,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            true,
        ),
        KernelId::Decode => (
            "vat_decode",
            DECODE_WGSL,
            wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
            },
            false,
        ),
    };

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: result_ty,
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: vertices_read_only,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
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

    let source = format!("{PARAMS_WGSL}{body}");
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });

    Kernel {
        pipeline,
        bind_group_layout,
    }
}

impl DispatchSurface for GpuSurface {
    fn group_size_x(&self, _kernel: KernelId) -> u32 {
        WORKGROUP_SIZE_X
    }

    fn create_atlas(&mut self, desc: &AtlasDesc) -> VatResult<AtlasHandle> {
        desc.validate()?;
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(VatError::dispatch(format!(
                "atlas '{}' is {}x{}, device limit is {max}",
                desc.label, desc.width, desc.height
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = AtlasId(self.alloc_id());
        self.atlases.insert(id, GpuAtlas { texture, view });
        Ok(AtlasHandle::new(id, desc.width, desc.height))
    }

    fn release_atlas(&mut self, atlas: AtlasHandle) -> VatResult<()> {
        let gpu = self
            .atlases
            .remove(&atlas.id())
            .ok_or_else(|| VatError::dispatch(format!("unknown atlas {:?}", atlas.id())))?;
        gpu.texture.destroy();
        Ok(())
    }

    fn create_vertex_buffer(
        &mut self,
        vertices: &[VertexRecord],
        source: BufferSource,
    ) -> VatResult<VertexBufferHandle> {
        let len = u32::try_from(vertices.len())
            .map_err(|_| VatError::validation("vertex buffer length overflows u32"))?;
        let bytes = u64::from(len) * RECORD_BYTES;
        let max = u64::from(self.device.limits().max_storage_buffer_binding_size);
        if bytes > max {
            return Err(VatError::dispatch(format!(
                "vertex buffer of {bytes} bytes exceeds device binding limit {max}"
            )));
        }

        // Storage bindings cannot be empty.
        let placeholder = [VertexRecord::default()];
        let contents: &[VertexRecord] = if vertices.is_empty() {
            &placeholder
        } else {
            vertices
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(match source {
                    BufferSource::Live => "vat_live_vertices",
                    BufferSource::Baked => "vat_baked_vertices",
                }),
                contents: bytemuck::cast_slice(contents),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            });
        let id = BufferId(self.alloc_id());
        self.buffers.insert(id, buffer);
        Ok(VertexBufferHandle::new(id, len, source))
    }

    fn release_vertex_buffer(&mut self, buffer: VertexBufferHandle) -> VatResult<()> {
        let gpu = self
            .buffers
            .remove(&buffer.id())
            .ok_or_else(|| VatError::dispatch(format!("unknown vertex buffer {:?}", buffer.id())))?;
        gpu.destroy();
        Ok(())
    }

    fn dispatch(
        &mut self,
        kernel: KernelId,
        bindings: &Bindings<'_>,
        groups: [u32; 3],
    ) -> VatResult<()> {
        let lanes = bindings.lanes(groups, WORKGROUP_SIZE_X);
        bindings.check_tile(lanes)?;
        let atlas = self.atlases.get(&bindings.result.id()).ok_or_else(|| {
            VatError::dispatch(format!("unknown atlas {:?}", bindings.result.id()))
        })?;
        let buffer = self.buffers.get(&bindings.gpu_vertices.id()).ok_or_else(|| {
            VatError::dispatch(format!(
                "unknown vertex buffer {:?}",
                bindings.gpu_vertices.id()
            ))
        })?;
        if lanes == 0 {
            return Ok(());
        }

        let params = DispatchParams {
            start_pixel: [bindings.start_pixel.x, bindings.start_pixel.y],
            frame_width: bindings.frame_width,
            channel: bindings.channel.index(),
            vertex_count: lanes as u32,
            _pad: [0; 3],
        };
        let uniforms = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vat_dispatch_params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let k = &self.kernels[kernel.index() as usize];
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vat_dispatch"),
            layout: &k.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&atlas.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vat_dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("vat_dispatch"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&k.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        self.queue.submit(Some(encoder.finish()));

        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(VatError::dispatch(format!(
                "{kernel:?} dispatch rejected: {e}"
            )));
        }
        Ok(())
    }

    fn read_vertex_buffer(&mut self, buffer: &VertexBufferHandle) -> VatResult<Vec<VertexRecord>> {
        let gpu = self
            .buffers
            .get(&buffer.id())
            .ok_or_else(|| VatError::dispatch(format!("unknown vertex buffer {:?}", buffer.id())))?;
        if buffer.is_empty() {
            return Ok(Vec::new());
        }

        let size = u64::from(buffer.len()) * RECORD_BYTES;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vat_vertex_readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vat_vertex_readback"),
            });
        encoder.copy_buffer_to_buffer(gpu, 0, &staging, 0, size);

        let bytes = self.read_staging(encoder, &staging)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    fn read_atlas(&mut self, atlas: &AtlasHandle) -> VatResult<AtlasImage> {
        let gpu = self
            .atlases
            .get(&atlas.id())
            .ok_or_else(|| VatError::dispatch(format!("unknown atlas {:?}", atlas.id())))?;

        let (width, height) = (atlas.width(), atlas.height());
        let unpadded = width
            .checked_mul(TEXEL_BYTES)
            .ok_or_else(|| VatError::dispatch("atlas row size overflow"))?;
        let bytes_per_row = align_to(unpadded, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let size = u64::from(bytes_per_row) * u64::from(height);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vat_atlas_readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vat_atlas_readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let bytes = self.read_staging(encoder, &staging)?;
        let mut image = AtlasImage::zeroed(width, height);
        let texel_bytes = TEXEL_BYTES as usize;
        for (y, row) in image.texels.chunks_mut(width as usize).enumerate() {
            let start = y * bytes_per_row as usize;
            for (x, texel) in row.iter_mut().enumerate() {
                let at = start + x * texel_bytes;
                *texel = bytemuck::pod_read_unaligned(&bytes[at..at + texel_bytes]);
            }
        }
        Ok(image)
    }
}
