use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use crate::error::{self, AnalysisError};
use crate::geometry::{check_vertex_data, QuadVertex, QUAD_VERTEX_COUNT};
use crate::shaders::{ProgramKind, ShaderStage, FRAGMENT_ENTRY, VERTEX_ENTRY, VERTEX_SHADER};
use crate::surface::{
    check_region, GeometryHandle, PixelBuffer, ProgramHandle, RenderSurface, ResourceTable,
    TextureHandle, Uniforms, BYTES_PER_PIXEL,
};

/// Framebuffer format; unorm so readback bytes are the shader output scaled to 0..=255
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Adapter selection knobs
#[derive(Debug, Clone, Copy)]
pub struct GpuOptions {
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ResolutionUniform {
    resolution: [f32; 2],
    _pad: [f32; 2], // 16-byte alignment
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuProgram {
    kind: ProgramKind,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Off-screen wgpu rendering surface of fixed size.
///
/// Every resource created through the [`RenderSurface`] methods belongs to the
/// current run and is released by [`RenderSurface::end_frame`].
pub struct GpuSurface {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    width: u32,
    height: u32,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    textures: ResourceTable<GpuTexture>,
    programs: ResourceTable<GpuProgram>,
    geometries: ResourceTable<wgpu::Buffer>,
}

impl GpuSurface {
    /// Acquire a device and allocate the off-screen framebuffer
    pub async fn new(width: u32, height: u32, options: &GpuOptions) -> Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "surface has zero size");

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await
            .context("Failed to find a suitable GPU adapter")?;

        let adapter_name = adapter.get_info().name;
        log::info!("using GPU adapter: {}", adapter_name);

        let limits = adapter.limits();
        anyhow::ensure!(
            width <= limits.max_texture_dimension_2d && height <= limits.max_texture_dimension_2d,
            "surface {}x{} exceeds adapter texture limit {}",
            width,
            height,
            limits.max_texture_dimension_2d
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Photo Quality Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .context("Failed to create device")?;

        // Errors outside an error scope are logged instead of panicking
        device.on_uncaptured_error(Box::new(|err| {
            log::error!("uncaptured wgpu error: {}", err);
        }));

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Analysis Framebuffer"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Source Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            adapter_name,
            width,
            height,
            target,
            target_view,
            sampler,
            textures: ResourceTable::default(),
            programs: ResourceTable::default(),
            geometries: ResourceTable::default(),
        })
    }

    /// Blocking constructor for callers outside an async runtime
    pub fn new_blocking(width: u32, height: u32, options: &GpuOptions) -> Result<Self> {
        pollster::block_on(Self::new(width, height, options))
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Compile and link arbitrary stage sources under the name of `kind`.
    ///
    /// Compile failures are attributed to the stage, pipeline creation
    /// failures to the program.
    pub fn compile_program_from(
        &mut self,
        kind: ProgramKind,
        vertex_src: &str,
        fragment_src: &str,
    ) -> error::Result<ProgramHandle> {
        let vertex = self.compile_stage(ShaderStage::Vertex, vertex_src)?;
        let fragment = self.compile_stage(ShaderStage::Fragment, fragment_src)?;

        let (pipeline, failure) = self.capture(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(kind.label()),
                // Derived from the shaders, so each program gets its own bindings
                layout: None,
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some(VERTEX_ENTRY),
                    compilation_options: Default::default(),
                    buffers: &[QuadVertex::layout()],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some(FRAGMENT_ENTRY),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        });
        if let Some(log) = failure {
            log::error!("{} program failed to link: {}", kind, log);
            return Err(AnalysisError::Link { program: kind, log });
        }

        let (bind_group_layout, failure) = self.capture(|_| pipeline.get_bind_group_layout(0));
        if let Some(log) = failure {
            return Err(AnalysisError::Link { program: kind, log });
        }

        let id = self.programs.insert(GpuProgram {
            kind,
            pipeline,
            bind_group_layout,
        });
        Ok(ProgramHandle(id))
    }

    fn compile_stage(&self, stage: ShaderStage, source: &str) -> error::Result<wgpu::ShaderModule> {
        let (module, failure) = self.capture(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage {
                    ShaderStage::Vertex => "Quad Vertex Shader",
                    ShaderStage::Fragment => "Analysis Fragment Shader",
                }),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        match failure {
            Some(log) => {
                log::error!("{} shader failed to compile: {}", stage, log);
                Err(AnalysisError::Compile { stage, log })
            }
            None => Ok(module),
        }
    }

    /// Run `f` inside validation and out-of-memory error scopes.
    ///
    /// Returns the value together with the first captured error message.
    fn capture<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<String>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        let message = validation.or(out_of_memory).map(|err| err.to_string());
        (value, message)
    }

    /// Record commands into a fresh encoder and submit them.
    ///
    /// Validation failures of the recorded work are reported against
    /// `resource` instead of reaching the uncaptured error handler.
    fn submit_checked(
        &self,
        resource: &'static str,
        record: impl FnOnce(&mut wgpu::CommandEncoder),
    ) -> error::Result<()> {
        let ((), failure) = self.capture(|device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(resource),
            });
            record(&mut encoder);
            self.queue.submit(Some(encoder.finish()));
        });
        match failure {
            Some(reason) => {
                log::error!("{} failed: {}", resource, reason);
                Err(AnalysisError::resource(resource, reason))
            }
            None => Ok(()),
        }
    }

    fn texture(&self, handle: TextureHandle) -> error::Result<&GpuTexture> {
        self.textures
            .get(handle.0)
            .ok_or(AnalysisError::UnknownHandle("texture"))
    }

    fn program(&self, handle: ProgramHandle) -> error::Result<&GpuProgram> {
        self.programs
            .get(handle.0)
            .ok_or(AnalysisError::UnknownHandle("program"))
    }

    fn geometry(&self, handle: GeometryHandle) -> error::Result<&wgpu::Buffer> {
        self.geometries
            .get(handle.0)
            .ok_or(AnalysisError::UnknownHandle("geometry"))
    }

    fn build_bind_group(
        &self,
        program: &GpuProgram,
        texture: &GpuTexture,
        uniforms: &Uniforms,
    ) -> error::Result<(wgpu::BindGroup, Option<wgpu::Buffer>)> {
        let uniform_buffer = if program.kind.uses_resolution() {
            let resolution = uniforms
                .resolution
                .unwrap_or([self.width as f32, self.height as f32]);
            let (buffer, failure) = self.capture(|device| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Resolution Uniform"),
                    contents: bytemuck::bytes_of(&ResolutionUniform {
                        resolution,
                        _pad: [0.0; 2],
                    }),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            });
            if let Some(reason) = failure {
                return Err(AnalysisError::resource("uniform buffer", reason));
            }
            Some(buffer)
        } else {
            None
        };

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        if let Some(buffer) = uniform_buffer.as_ref() {
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: buffer.as_entire_binding(),
            });
        }

        let (bind_group, failure) = self.capture(|device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Analysis Bind Group"),
                layout: &program.bind_group_layout,
                entries: &entries,
            })
        });
        if let Some(reason) = failure {
            return Err(AnalysisError::resource("bind group", reason));
        }

        Ok((bind_group, uniform_buffer))
    }
}

impl RenderSurface for GpuSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn backend_name(&self) -> &'static str {
        "gpu"
    }

    fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_texture(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> error::Result<TextureHandle> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(AnalysisError::resource(
                "texture",
                format!("{} bytes do not describe a {}x{} RGBA8 image", pixels.len(), width, height),
            ));
        }

        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let (texture, failure) = self.capture(|device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Source Texture"),
                size: texture_size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        });
        if let Some(reason) = failure {
            log::error!("texture creation failed: {}", reason);
            return Err(AnalysisError::resource("texture", reason));
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * BYTES_PER_PIXEL as u32),
                rows_per_image: Some(height),
            },
            texture_size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(TextureHandle(self.textures.insert(GpuTexture { texture, view })))
    }

    fn compile_program(&mut self, kind: ProgramKind) -> error::Result<ProgramHandle> {
        self.compile_program_from(kind, VERTEX_SHADER, kind.fragment_source())
    }

    fn create_geometry(&mut self, vertices: &[f32]) -> error::Result<GeometryHandle> {
        check_vertex_data(vertices)?;

        let (buffer, failure) = self.capture(|device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
        if let Some(reason) = failure {
            return Err(AnalysisError::resource("vertex buffer", reason));
        }

        Ok(GeometryHandle(self.geometries.insert(buffer)))
    }

    fn clear(&mut self, rgba: [f64; 4]) -> error::Result<()> {
        self.submit_checked("clear pass", |encoder| {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: rgba[0],
                            g: rgba[1],
                            b: rgba[2],
                            a: rgba[3],
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        })
    }

    fn draw(
        &mut self,
        program: ProgramHandle,
        geometry: GeometryHandle,
        texture: TextureHandle,
        uniforms: &Uniforms,
    ) -> error::Result<()> {
        let gpu_program = self.program(program)?;
        let vertex_buffer = self.geometry(geometry)?;
        let gpu_texture = self.texture(texture)?;

        let (bind_group, _uniform_buffer) =
            self.build_bind_group(gpu_program, gpu_texture, uniforms)?;

        // Flushed on return: the following readback waits on this submission
        self.submit_checked("render pass", |encoder| {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(gpu_program.kind.label()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&gpu_program.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        })
    }

    fn read_pixels(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> error::Result<PixelBuffer> {
        check_region((self.width, self.height), x, y, width, height)?;

        let unpadded_bytes_per_row = width * BYTES_PER_PIXEL as u32;
        let padded_bytes_per_row =
            align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback_size = u64::from(padded_bytes_per_row) * u64::from(height);

        let (staging_buffer, failure) = self.capture(|device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Readback Buffer"),
                size: readback_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        if let Some(reason) = failure {
            return Err(AnalysisError::resource("readback buffer", reason));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        // Poll device until the copy and the mapping complete
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| AnalysisError::readback("buffer mapping callback was dropped"))?
            .map_err(AnalysisError::readback)?;

        let mapped = buffer_slice.get_mapped_range();
        let frame = copy_tight_rows(&mapped, unpadded_bytes_per_row, padded_bytes_per_row, height);

        drop(mapped);
        staging_buffer.unmap();

        PixelBuffer::new(width, height, frame?)
    }

    fn end_frame(&mut self) {
        for texture in self.textures.drain() {
            texture.texture.destroy();
        }
        for buffer in self.geometries.drain() {
            buffer.destroy();
        }
        self.programs.clear();
        self.device.poll(wgpu::Maintain::Wait);
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Strip wgpu's per-row padding from a mapped readback
fn copy_tight_rows(
    mapped: &[u8],
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
    height: u32,
) -> error::Result<Vec<u8>> {
    let required_len = padded_bytes_per_row as usize * height as usize;
    if mapped.len() < required_len {
        return Err(AnalysisError::readback(format!(
            "mapped frame too small: expected at least {} bytes, got {}",
            required_len,
            mapped.len()
        )));
    }

    let row_len = unpadded_bytes_per_row as usize;
    let mut frame = Vec::with_capacity(row_len * height as usize);
    for row in mapped
        .chunks(padded_bytes_per_row as usize)
        .take(height as usize)
    {
        frame.extend_from_slice(&row[..row_len]);
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::QUAD_VERTICES;
    use crate::image_source::SourceImage;
    use crate::pipeline::analyze;
    use crate::statistics::BrightnessStatus;

    fn try_surface(size: u32) -> Option<GpuSurface> {
        match GpuSurface::new_blocking(size, size, &GpuOptions::default()) {
            Ok(surface) => Some(surface),
            Err(err) => {
                eprintln!("skipping GPU test: {:#}", err);
                None
            }
        }
    }

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(2000, 256), 2048);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(1, 256), 256);
    }

    #[test]
    fn test_copy_tight_rows_strips_padding() {
        let mapped = vec![
            1, 2, 3, 4, 99, 99, 99, 99, // row 1: 4 bytes + 4 bytes pad
            5, 6, 7, 8, 88, 88, 88, 88, // row 2: 4 bytes + 4 bytes pad
        ];

        let tight = copy_tight_rows(&mapped, 4, 8, 2).unwrap();
        assert_eq!(tight, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_copy_tight_rows_rejects_short_mapping() {
        assert!(copy_tight_rows(&[0; 12], 4, 8, 2).is_err());
    }

    #[test]
    fn test_gpu_gray_image_is_normal_and_blurry() {
        let Some(mut surface) = try_surface(64) else {
            return;
        };
        let image = SourceImage::from_rgba("gray", 64, 64, [128, 128, 128, 255].repeat(64 * 64))
            .unwrap();

        let result = analyze(&mut surface, &image).unwrap();
        assert_eq!(result.brightness, BrightnessStatus::Normal);
        assert!(result.is_blurry);
    }

    #[test]
    fn test_gpu_broken_fragment_reports_compile_error() {
        let Some(mut surface) = try_surface(16) else {
            return;
        };

        let err = surface
            .compile_program_from(ProgramKind::Laplacian, VERTEX_SHADER, "fn fs_main( {")
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
    }

    #[test]
    fn test_gpu_mismatched_entry_point_reports_link_error() {
        let Some(mut surface) = try_surface(16) else {
            return;
        };

        let fragment = "@fragment fn other() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        let err = surface
            .compile_program_from(ProgramKind::PassThrough, VERTEX_SHADER, fragment)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Link { .. }));
    }

    #[test]
    fn test_gpu_released_handles_are_rejected() {
        let Some(mut surface) = try_surface(16) else {
            return;
        };

        let texture = surface.create_texture(&[0; 4], 1, 1).unwrap();
        let geometry = surface.create_geometry(&QUAD_VERTICES).unwrap();
        let program = surface.compile_program(ProgramKind::PassThrough).unwrap();
        surface.end_frame();

        let err = surface
            .draw(program, geometry, texture, &Uniforms::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownHandle(_)));
    }

    #[test]
    fn test_gpu_released_handles_do_not_alias_next_frame() {
        let Some(mut surface) = try_surface(4) else {
            return;
        };

        let old_texture = surface.create_texture(&[0, 0, 0, 255], 1, 1).unwrap();
        let old_geometry = surface.create_geometry(&QUAD_VERTICES).unwrap();
        let old_program = surface.compile_program(ProgramKind::PassThrough).unwrap();
        surface.end_frame();

        let texture = surface.create_texture(&[255, 255, 255, 255], 1, 1).unwrap();
        let geometry = surface.create_geometry(&QUAD_VERTICES).unwrap();
        let program = surface.compile_program(ProgramKind::PassThrough).unwrap();
        assert_ne!((texture, geometry, program), (old_texture, old_geometry, old_program));

        let err = surface
            .draw(program, geometry, old_texture, &Uniforms::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownHandle("texture")));
    }

    #[test]
    fn test_gpu_source_wider_than_device_limit_still_analyzes() {
        let Some(mut surface) = try_surface(16) else {
            return;
        };

        let width = surface.max_texture_dimension() + 1;
        let image = SourceImage::from_rgba("panorama", width, 1, [128, 128, 128, 255].repeat(width as usize))
            .unwrap();

        let result = analyze(&mut surface, &image).unwrap();
        assert_eq!(result.brightness, BrightnessStatus::Normal);
    }

    #[test]
    fn test_gpu_invalid_commands_are_reported() {
        let Some(surface) = try_surface(4) else {
            return;
        };

        let buffer = |label| {
            surface.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: 16,
                usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let (src, dst) = (buffer("src"), buffer("dst"));

        // Copy sizes must be a multiple of 4
        let err = surface
            .submit_checked("test copy", |encoder| {
                encoder.copy_buffer_to_buffer(&src, 0, &dst, 0, 3);
            })
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ResourceCreation { resource: "test copy", .. }));

        assert!(surface
            .submit_checked("test copy", |encoder| {
                encoder.copy_buffer_to_buffer(&src, 0, &dst, 0, 4);
            })
            .is_ok());
    }
}
