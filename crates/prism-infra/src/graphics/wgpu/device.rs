// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::command::{encode_stream, WgpuCommandBuffer};
use super::context::{ContextOptions, WgpuContext};
use super::conversions::{self, IntoWgpu};
use super::reflection::{used_bindings, BindingSlot};
use crate::graphics::headless::compiler::declares_function;
use prism_core::renderer::api::{
    BufferId, ConstantBufferHandle, FenceId, GraphicsBackendType, InputLayout, PolygonMode, RenderPipelineId,
    RenderTargetHandle, SamplerId, ShaderModuleDescriptor, ShaderModuleId, ShaderStage,
    PipelineStateDescriptor, TextureFormat, TextureViewId, VertexBufferHandle,
};
use prism_core::renderer::{
    DeviceError, NativeCommandBuffer, PipelineError, ResourceError, RhiDevice, ShaderError,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use wgpu::util::DeviceExt;

const DROP_WAIT: Duration = Duration::from_secs(5);

/// A pipeline object of either kind.
#[derive(Debug, Clone)]
pub(super) enum WgpuPipeline {
    Render(Arc<wgpu::RenderPipeline>),
    Compute(Arc<wgpu::ComputePipeline>),
}

#[derive(Debug)]
struct ShaderEntry {
    label: String,
    stage: ShaderStage,
    entry_point: String,
    input_layout: Option<InputLayout>,
    module: Arc<wgpu::ShaderModule>,
    bindings: Vec<BindingSlot>,
}

#[derive(Debug)]
struct PipelineEntry {
    label: String,
    pipeline: WgpuPipeline,
    bindings: Arc<[BindingSlot]>,
}

/// A compiled stage picked for a pipeline.
struct StageModule {
    module: Arc<wgpu::ShaderModule>,
    entry_point: String,
    bindings: Vec<BindingSlot>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An [`RhiDevice`] backed by WGPU.
///
/// Buffers, texture views and samplers are created by the caller with the
/// raw `wgpu::Device` (see [`context`](Self::context)) and registered here
/// to obtain the IDs used in command handles.
///
/// Shader resources follow a fixed group layout: constant buffer slot `n`
/// is `@group(0) @binding(n)`, texture slot `n` is `@group(1) @binding(n)`
/// and sampler slot `n` is `@group(2) @binding(n)`.
#[derive(Debug)]
pub struct WgpuDevice {
    context: WgpuContext,
    shaders: Mutex<HashMap<ShaderModuleId, ShaderEntry>>,
    pipelines: Mutex<HashMap<RenderPipelineId, PipelineEntry>>,
    buffers: Mutex<HashMap<BufferId, Arc<wgpu::Buffer>>>,
    texture_views: Mutex<HashMap<TextureViewId, Arc<wgpu::TextureView>>>,
    samplers: Mutex<HashMap<SamplerId, Arc<wgpu::Sampler>>>,
    next_shader_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,
    next_buffer_id: AtomicUsize,
    next_view_id: AtomicUsize,
    next_sampler_id: AtomicUsize,
    /// Last fence handed out. Held across `queue.submit` so fences follow queue order.
    issued: Mutex<u64>,
    completed: Arc<AtomicU64>,
    frame: AtomicU64,
}

impl WgpuDevice {
    /// Opens the default adapter and wraps it.
    pub fn new() -> anyhow::Result<Arc<Self>> {
        Self::with_options(ContextOptions::default())
    }

    /// Opens the adapter selected by `options` and wraps it.
    pub fn with_options(options: ContextOptions) -> anyhow::Result<Arc<Self>> {
        let context = pollster::block_on(WgpuContext::with_options(options))?;
        Ok(Self::from_context(context))
    }

    /// Wraps an existing context.
    pub fn from_context(context: WgpuContext) -> Arc<Self> {
        log::info!(
            "WgpuDevice created on \"{}\" ({:?})",
            context.adapter.name,
            context.adapter.backend
        );
        Arc::new(Self {
            context,
            shaders: Mutex::new(HashMap::new()),
            pipelines: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            texture_views: Mutex::new(HashMap::new()),
            samplers: Mutex::new(HashMap::new()),
            next_shader_id: AtomicUsize::new(0),
            next_pipeline_id: AtomicUsize::new(0),
            next_buffer_id: AtomicUsize::new(0),
            next_view_id: AtomicUsize::new(0),
            next_sampler_id: AtomicUsize::new(0),
            issued: Mutex::new(0),
            completed: Arc::new(AtomicU64::new(0)),
            frame: AtomicU64::new(0),
        })
    }

    /// The underlying WGPU objects.
    pub fn context(&self) -> &WgpuContext {
        &self.context
    }

    // --- Resource registration ---

    /// Registers a buffer and returns its ID.
    pub fn register_buffer(&self, buffer: wgpu::Buffer) -> BufferId {
        let id = BufferId(self.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.buffers).insert(id, Arc::new(buffer));
        id
    }

    /// Registers a texture view and returns its ID.
    pub fn register_texture_view(&self, view: wgpu::TextureView) -> TextureViewId {
        let id = TextureViewId(self.next_view_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.texture_views).insert(id, Arc::new(view));
        id
    }

    /// Registers a sampler and returns its ID.
    pub fn register_sampler(&self, sampler: wgpu::Sampler) -> SamplerId {
        let id = SamplerId(self.next_sampler_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.samplers).insert(id, Arc::new(sampler));
        id
    }

    /// Forgets a buffer. In-flight submissions keep their own reference.
    pub fn release_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        lock(&self.buffers)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    /// Forgets a texture view.
    pub fn release_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        lock(&self.texture_views)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    /// Forgets a sampler.
    pub fn release_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        lock(&self.samplers)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    /// Creates and registers a vertex buffer holding `contents`.
    pub fn create_vertex_buffer(
        &self,
        label: &str,
        contents: &[u8],
        stride: u32,
    ) -> Result<VertexBufferHandle, ResourceError> {
        if stride == 0 || contents.len() % stride as usize != 0 {
            return Err(ResourceError::BackendError(format!(
                "'{label}': {} bytes is not a whole number of {stride}-byte vertices",
                contents.len()
            )));
        }
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::VERTEX,
            });
        Ok(VertexBufferHandle {
            buffer: self.register_buffer(buffer),
            offset: 0,
            stride,
            vertex_count: (contents.len() / stride as usize) as u32,
        })
    }

    /// Creates and registers a uniform buffer holding `contents`.
    pub fn create_constant_buffer(&self, label: &str, contents: &[u8]) -> ConstantBufferHandle {
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        ConstantBufferHandle {
            buffer: self.register_buffer(buffer),
            offset: 0,
            size: contents.len() as u64,
        }
    }

    /// Creates and registers a 2D texture usable as a render target.
    pub fn create_render_target(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> RenderTargetHandle {
        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: format.into_wgpu(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        RenderTargetHandle {
            view: self.register_texture_view(view),
            format,
            width: width.max(1),
            height: height.max(1),
        }
    }

    // --- Lookups used while encoding ---

    /// The pipeline and the resource slots its entry points read.
    pub(super) fn get_wgpu_pipeline(
        &self,
        id: RenderPipelineId,
    ) -> Option<(WgpuPipeline, Arc<[BindingSlot]>)> {
        lock(&self.pipelines)
            .get(&id)
            .map(|entry| (entry.pipeline.clone(), Arc::clone(&entry.bindings)))
    }

    pub(super) fn get_wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        lock(&self.buffers).get(&id).cloned()
    }

    pub(super) fn get_wgpu_texture_view(&self, id: TextureViewId) -> Option<Arc<wgpu::TextureView>> {
        lock(&self.texture_views).get(&id).cloned()
    }

    pub(super) fn get_wgpu_sampler(&self, id: SamplerId) -> Option<Arc<wgpu::Sampler>> {
        lock(&self.samplers).get(&id).cloned()
    }

    fn check_lost(&self) -> Result<(), DeviceError> {
        if self.context.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        Ok(())
    }

    /// Polls the underlying wgpu::Device in a non-blocking manner so that
    /// `on_submitted_work_done` callbacks run.
    fn poll_device_non_blocking(&self) {
        if let Err(e) = self.context.device.poll(wgpu::PollType::Poll) {
            log::warn!("Failed to poll device (non-blocking): {:?}", e);
        }
    }

    fn generate_shader_id(&self) -> ShaderModuleId {
        ShaderModuleId(self.next_shader_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_pipeline_id(&self) -> RenderPipelineId {
        RenderPipelineId(self.next_pipeline_id.fetch_add(1, Ordering::Relaxed))
    }

    fn stage_module(
        shaders: &HashMap<ShaderModuleId, ShaderEntry>,
        id: ShaderModuleId,
        stage: ShaderStage,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<StageModule, PipelineError> {
        match shaders.get(&id) {
            Some(entry) if entry.stage == stage => Ok(StageModule {
                module: Arc::clone(&entry.module),
                entry_point: entry.entry_point.clone(),
                bindings: entry.bindings.clone(),
            }),
            other => {
                if let Some(entry) = other {
                    log::error!(
                        "WgpuDevice: '{}' is a {} module, expected {stage}",
                        entry.label,
                        entry.stage
                    );
                }
                Err(PipelineError::InvalidShaderModuleForPipeline {
                    id,
                    pipeline_label: Some(descriptor.label()),
                })
            }
        }
    }

    fn create_render_pipeline(
        &self,
        descriptor: &PipelineStateDescriptor,
        label: &str,
    ) -> Result<(wgpu::RenderPipeline, Vec<BindingSlot>), PipelineError> {
        let shaders = lock(&self.shaders);
        let vs_id = descriptor
            .vertex_shader
            .ok_or_else(|| PipelineError::IncompleteDescriptor("no vertex stage".to_string()))?;
        let vertex = Self::stage_module(&shaders, vs_id, ShaderStage::Vertex, descriptor)?;
        let fragment = descriptor
            .pixel_shader
            .map(|id| Self::stage_module(&shaders, id, ShaderStage::Pixel, descriptor))
            .transpose()?;

        let compiled_layout = shaders.get(&vs_id).and_then(|e| e.input_layout.as_ref());
        if let (Some(compiled), Some(requested)) = (compiled_layout, &descriptor.input_layout) {
            if compiled.signature() != requested.signature() {
                return Err(PipelineError::IncompatibleInputLayout {
                    vertex_shader: vs_id,
                    details: format!(
                        "compiled for {:?}, pipeline declares {:?}",
                        compiled.signature(),
                        requested.signature()
                    ),
                });
            }
        }
        drop(shaders);

        let features = self.context.features;
        let rasterizer = &descriptor.rasterizer;
        if rasterizer.polygon_mode == PolygonMode::Line
            && !features.contains(wgpu::Features::POLYGON_MODE_LINE)
        {
            return Err(PipelineError::CompilationFailed {
                label: label.to_string(),
                details: "wireframe rasterization is not supported by this adapter".to_string(),
            });
        }

        let attributes: Vec<wgpu::VertexAttribute> = descriptor
            .input_layout
            .iter()
            .flat_map(|layout| layout.attributes())
            .map(|a| wgpu::VertexAttribute {
                format: a.format.into_wgpu(),
                offset: a.offset as u64,
                shader_location: a.shader_location,
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = descriptor
            .input_layout
            .iter()
            .map(|layout| wgpu::VertexBufferLayout {
                array_stride: layout.stride() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            })
            .collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = descriptor
            .render_target_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: format.into_wgpu(),
                    blend: descriptor.blend.into_wgpu(),
                    write_mask: descriptor.blend.write_mask.into_wgpu(),
                })
            })
            .collect();

        let depth_stencil = descriptor.depth_stencil_format.map(|format| {
            conversions::depth_stencil_state(
                &descriptor.depth_stencil,
                format,
                (
                    rasterizer.depth_bias,
                    rasterizer.depth_bias_slope_scale,
                    rasterizer.depth_bias_clamp,
                ),
            )
        });

        let pipeline = self
            .context
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: None,
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(vertex.entry_point.as_str()),
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: fragment.as_ref().map(|pixel| wgpu::FragmentState {
                    module: pixel.module.as_ref(),
                    entry_point: Some(pixel.entry_point.as_str()),
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: descriptor.topology.into_wgpu(),
                    strip_index_format: None,
                    front_face: rasterizer.front_face.into_wgpu(),
                    cull_mode: rasterizer.cull_mode.into_wgpu(),
                    unclipped_depth: !rasterizer.depth_clip_enabled
                        && features.contains(wgpu::Features::DEPTH_CLIP_CONTROL),
                    polygon_mode: rasterizer.polygon_mode.into_wgpu(),
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: descriptor.sample_count.into_wgpu(),
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
                cache: None,
            });

        let mut bindings = vertex.bindings;
        bindings.extend(fragment.into_iter().flat_map(|pixel| pixel.bindings));
        bindings.sort_unstable();
        bindings.dedup();
        Ok((pipeline, bindings))
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &PipelineStateDescriptor,
        id: ShaderModuleId,
        label: &str,
    ) -> Result<(wgpu::ComputePipeline, Vec<BindingSlot>), PipelineError> {
        let compute = {
            let shaders = lock(&self.shaders);
            Self::stage_module(&shaders, id, ShaderStage::Compute, descriptor)?
        };
        let pipeline = self
            .context
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &compute.module,
                entry_point: Some(compute.entry_point.as_str()),
                compilation_options: Default::default(),
                cache: None,
            });
        Ok((pipeline, compute.bindings))
    }
}

impl RhiDevice for WgpuDevice {
    fn backend_type(&self) -> GraphicsBackendType {
        match self.context.adapter.backend {
            wgpu::Backend::Vulkan => GraphicsBackendType::Vulkan,
            wgpu::Backend::Metal => GraphicsBackendType::Metal,
            wgpu::Backend::Dx12 => GraphicsBackendType::Dx12,
            wgpu::Backend::Gl => GraphicsBackendType::OpenGL,
            wgpu::Backend::BrowserWebGpu => GraphicsBackendType::WebGpu,
            _ => GraphicsBackendType::Unknown,
        }
    }

    fn compile_shader(
        &self,
        descriptor: &ShaderModuleDescriptor<'_>,
    ) -> Result<ShaderModuleId, ShaderError> {
        let module = self
            .context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(descriptor.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(descriptor.source)),
            });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| match &m.location {
                Some(loc) => format!("{}:{}: {}", loc.line_number, loc.line_position, m.message),
                None => m.message.clone(),
            })
            .collect();
        if !errors.is_empty() {
            return Err(ShaderError::CompilationError {
                label: descriptor.label.to_string(),
                details: errors.join("\n"),
            });
        }
        if !declares_function(descriptor.source, descriptor.entry_point) {
            return Err(ShaderError::MissingEntryPoint {
                label: descriptor.label.to_string(),
                stage: descriptor.stage,
                entry_point: descriptor.entry_point.to_string(),
            });
        }

        let id = self.generate_shader_id();
        lock(&self.shaders).insert(
            id,
            ShaderEntry {
                label: descriptor.label.to_string(),
                stage: descriptor.stage,
                entry_point: descriptor.entry_point.to_string(),
                input_layout: descriptor.input_layout.cloned(),
                module: Arc::new(module),
                bindings: used_bindings(descriptor.source, descriptor.entry_point),
            },
        );
        log::debug!(
            "WgpuDevice: compiled {} stage of '{}' as {id:?}",
            descriptor.stage,
            descriptor.label
        );
        Ok(id)
    }

    fn destroy_shader(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        match lock(&self.shaders).remove(&id) {
            Some(entry) => {
                log::trace!("WgpuDevice: destroyed shader '{}' ({id:?})", entry.label);
                Ok(())
            }
            None => Err(ResourceError::Shader(ShaderError::NotFound { id })),
        }
    }

    fn create_pipeline(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<RenderPipelineId, PipelineError> {
        descriptor.validate()?;
        let label = descriptor.label();
        let (pipeline, bindings) = match descriptor.compute_shader {
            Some(cs) => {
                let (pipeline, bindings) = self.create_compute_pipeline(descriptor, cs, &label)?;
                (WgpuPipeline::Compute(Arc::new(pipeline)), bindings)
            }
            None => {
                let (pipeline, bindings) = self.create_render_pipeline(descriptor, &label)?;
                (WgpuPipeline::Render(Arc::new(pipeline)), bindings)
            }
        };

        let id = self.generate_pipeline_id();
        log::debug!(
            "WgpuDevice: created pipeline '{label}' ({id:?}) reading {} resource(s)",
            bindings.len()
        );
        lock(&self.pipelines).insert(
            id,
            PipelineEntry {
                label,
                pipeline,
                bindings: bindings.into(),
            },
        );
        Ok(id)
    }

    fn destroy_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        match lock(&self.pipelines).remove(&id) {
            Some(entry) => {
                log::trace!("WgpuDevice: destroyed pipeline '{}' ({id:?})", entry.label);
                Ok(())
            }
            None => Err(ResourceError::Pipeline(
                PipelineError::InvalidRenderPipeline { id },
            )),
        }
    }

    fn allocate_command_buffer(
        &self,
        label: &str,
    ) -> Result<Box<dyn NativeCommandBuffer>, DeviceError> {
        Ok(Box::new(WgpuCommandBuffer::new(label)))
    }

    fn submit(&self, buffer: Box<dyn NativeCommandBuffer>) -> Result<FenceId, DeviceError> {
        self.check_lost()?;
        let buffer = buffer
            .into_any()
            .downcast::<WgpuCommandBuffer>()
            .map_err(|_| DeviceError::InvalidCommandBuffer)?;
        let (label, commands) = buffer.into_parts();

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&label),
            });
        encode_stream(self, &mut encoder, &label, &commands)?;

        let mut issued = lock(&self.issued);
        self.context.queue.submit(std::iter::once(encoder.finish()));
        *issued += 1;
        let fence = FenceId(*issued);
        let completed = Arc::clone(&self.completed);
        self.context.queue.on_submitted_work_done(move || {
            completed.fetch_max(fence.0, Ordering::AcqRel);
        });
        log::trace!(
            "WgpuDevice: submitted '{label}' ({} commands) as {fence:?}",
            commands.len()
        );
        Ok(fence)
    }

    fn is_fence_signaled(&self, fence: FenceId) -> Result<bool, DeviceError> {
        if fence.0 > *lock(&self.issued) {
            return Err(DeviceError::UnknownFence(fence));
        }
        self.poll_device_non_blocking();
        self.check_lost()?;
        Ok(self.completed.load(Ordering::Acquire) >= fence.0)
    }

    fn wait_for_fence(&self, fence: FenceId, timeout: Duration) -> Result<(), DeviceError> {
        let start = Instant::now();
        while !self.is_fence_signaled(fence)? {
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(DeviceError::Timeout {
                    fence: Some(fence),
                    waited,
                });
            }
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    fn wait_idle(&self, timeout: Duration) -> Result<(), DeviceError> {
        self.poll_device_non_blocking();
        self.check_lost()?;
        let last = FenceId(*lock(&self.issued));
        if last.0 == 0 {
            return Ok(());
        }
        self.wait_for_fence(last, timeout).map_err(|e| match e {
            DeviceError::Timeout { waited, .. } => DeviceError::Timeout {
                fence: None,
                waited,
            },
            other => other,
        })
    }

    /// There is no surface to present to; this only advances the frame counter.
    fn present(&self) -> Result<u64, DeviceError> {
        self.poll_device_non_blocking();
        Ok(self.frame.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn current_frame_index(&self) -> u64 {
        self.frame.load(Ordering::SeqCst)
    }
}

impl Drop for WgpuDevice {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle(DROP_WAIT) {
            log::warn!("WgpuDevice dropped with work in flight: {e}");
        }
    }
}
