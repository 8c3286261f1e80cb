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

//! The command list recording state machine.
//!
//! A [`CommandList`] moves through four states:
//!
//! ```text
//!   Idle --begin--> Recording --end--> Ended --submit--> IdleSyncCpuToGpu
//!    ^                                                        |
//!    +--------------- fence signaled (poll / begin) ----------+
//! ```
//!
//! Every operation checks the state first. An operation in the wrong state is
//! a contract violation: it is logged, returns
//! [`CommandListError::InvalidState`] and poisons the recording in progress,
//! which `submit` then refuses to hand to the device.

mod bindings;
mod frame_lists;

pub use self::frame_lists::FrameCommandLists;

use self::bindings::BindingTable;
use crate::renderer::api::*;
use crate::renderer::error::{CommandListError, DeviceError};
use crate::renderer::pipeline_cache::{CachedPipeline, PipelineCache};
use crate::renderer::shader_unit::{NativeShader, ShaderUnit};
use crate::renderer::traits::{NativeCommandBuffer, PassProfiler, RhiDevice, ScopeToken};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

struct Marker {
    name: String,
    token: Option<ScopeToken>,
}

/// Objects the GPU may still read until `fence` signals.
struct InFlight {
    fence: FenceId,
    pipelines: Vec<Arc<CachedPipeline>>,
    shaders: Vec<Arc<NativeShader>>,
}

/// Stores `value` in `field`. Returns `true` if the field changed.
fn assign<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    true
}

/// Records GPU work for one thread and hands it to an [`RhiDevice`].
///
/// A list is created once and recycled: after `submit` it waits (lazily, on
/// the next `begin`/`begin_marker`, or eagerly via [`poll`](Self::poll) and
/// [`flush`](Self::flush)) for the GPU to finish with the previous
/// submission before recording again.
pub struct CommandList {
    name: String,
    device: Arc<dyn RhiDevice>,
    cache: Arc<PipelineCache>,
    profiler: Option<Arc<dyn PassProfiler>>,
    skip_redundant: bool,
    wait_timeout: Duration,

    state: CommandListState,
    buffer: Option<Box<dyn NativeCommandBuffer>>,
    markers: Vec<Marker>,
    descriptor: Option<PipelineStateDescriptor>,
    pipeline_dirty: bool,
    pipeline: Option<Arc<CachedPipeline>>,
    bindings: BindingTable,
    retained_pipelines: Vec<Arc<CachedPipeline>>,
    retained_shaders: Vec<Arc<NativeShader>>,
    poisoned: Option<&'static str>,
    stats: CommandListStats,

    in_flight: Option<InFlight>,
    last_stats: CommandListStats,
}

impl fmt::Debug for CommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandList")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("open_markers", &self.markers.len())
            .field("poisoned", &self.poisoned)
            .field("pending_fence", &self.pending_fence())
            .finish_non_exhaustive()
    }
}

impl CommandList {
    /// Creates an idle command list recording against `device` and resolving
    /// pipelines through `cache`.
    pub fn new(
        name: impl Into<String>,
        device: Arc<dyn RhiDevice>,
        cache: Arc<PipelineCache>,
        settings: &RhiSettings,
    ) -> Self {
        Self {
            name: name.into(),
            device,
            cache,
            profiler: None,
            skip_redundant: settings.skip_redundant_bindings,
            wait_timeout: settings.gpu_wait_timeout(),
            state: CommandListState::Idle,
            buffer: None,
            markers: Vec::new(),
            descriptor: None,
            pipeline_dirty: false,
            pipeline: None,
            bindings: BindingTable::default(),
            retained_pipelines: Vec::new(),
            retained_shaders: Vec::new(),
            poisoned: None,
            stats: CommandListStats::default(),
            in_flight: None,
            last_stats: CommandListStats::default(),
        }
    }

    /// Reports marker scopes to `profiler`.
    pub fn with_profiler(mut self, profiler: Arc<dyn PassProfiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// The name given at creation, also used as the native buffer label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current state.
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// The number of marker scopes currently open.
    pub fn open_markers(&self) -> usize {
        self.markers.len()
    }

    /// Returns `true` if a contract violation invalidated the current recording.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// The fence of the last submission, until the list has observed it signal.
    pub fn pending_fence(&self) -> Option<FenceId> {
        self.in_flight.as_ref().map(|in_flight| in_flight.fence)
    }

    /// The pipeline the next draw or dispatch would use.
    pub fn pipeline(&self) -> Option<&Arc<CachedPipeline>> {
        self.pipeline.as_ref()
    }

    /// Counters for the recording in progress.
    pub fn stats(&self) -> CommandListStats {
        self.stats
    }

    /// Counters of the last successfully submitted recording.
    pub fn last_submitted_stats(&self) -> CommandListStats {
        self.last_stats
    }

    // --- Markers and pass scope ---

    /// Opens a named marker scope (a debug group and, if set, a profiler scope).
    ///
    /// Legal in `Idle`. From `IdleSyncCpuToGpu` the list first waits for its
    /// previous submission. Does not start recording.
    pub fn begin_marker(&mut self, name: &str) -> Result<(), CommandListError> {
        self.sync_previous()?;
        if self.state != CommandListState::Idle {
            return Err(self.violation("begin_marker"));
        }
        self.ensure_buffer()?;
        self.encode(RenderCommand::PushDebugGroup(name.to_string()))?;
        let token = self
            .profiler
            .as_ref()
            .map(|profiler| profiler.begin_scope(name));
        self.markers.push(Marker {
            name: name.to_string(),
            token,
        });
        log::trace!("Command list '{}': opened marker '{name}'", self.name);
        Ok(())
    }

    /// Closes the innermost marker scope.
    pub fn end_marker(&mut self) -> Result<(), CommandListError> {
        if !matches!(
            self.state,
            CommandListState::Idle | CommandListState::Recording
        ) || self.buffer.is_none()
        {
            return Err(self.violation("end_marker"));
        }
        let Some(marker) = self.markers.pop() else {
            log::error!(
                "Command list '{}': 'end_marker' without an open marker",
                self.name
            );
            self.poisoned.get_or_insert("end_marker");
            return Err(CommandListError::MarkerUnderflow);
        };
        self.close_marker(marker)
    }

    /// Resolves `descriptor` through the pipeline cache and starts recording.
    ///
    /// On failure the list stays `Idle` and nothing is bound.
    pub fn begin(&mut self, descriptor: &PipelineStateDescriptor) -> Result<(), CommandListError> {
        self.sync_previous()?;
        if self.state != CommandListState::Idle {
            return Err(self.violation("begin"));
        }
        let pipeline = match self.cache.resolve(descriptor) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!(
                    "Command list '{}' could not begin '{}': {e}",
                    self.name,
                    descriptor.label()
                );
                return Err(e.into());
            }
        };
        self.ensure_buffer()?;
        self.descriptor = Some(descriptor.clone());
        self.pipeline_dirty = false;
        self.state = CommandListState::Recording;
        self.bind_pipeline(pipeline)
    }

    /// Opens a marker named `name`, then begins with `descriptor`.
    ///
    /// If the pipeline cannot be resolved the marker is closed again.
    pub fn begin_pass(
        &mut self,
        name: &str,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<(), CommandListError> {
        self.begin_marker(name)?;
        if let Err(e) = self.begin(descriptor) {
            if let Some(marker) = self.markers.pop() {
                self.close_marker(marker)?;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stops recording and closes every open marker scope.
    pub fn end(&mut self) -> Result<(), CommandListError> {
        self.expect_recording("end")?;
        while let Some(marker) = self.markers.pop() {
            self.close_marker(marker)?;
        }
        self.state = CommandListState::Ended;
        Ok(())
    }

    // --- Pipeline-affecting state ---

    /// Sets the primitive topology.
    pub fn set_primitive_topology(
        &mut self,
        topology: PrimitiveTopology,
    ) -> Result<(), CommandListError> {
        self.modify_descriptor("set_primitive_topology", |d| {
            assign(&mut d.topology, topology)
        })
    }

    /// Sets the vertex input layout.
    pub fn set_input_layout(&mut self, layout: InputLayout) -> Result<(), CommandListError> {
        self.modify_descriptor("set_input_layout", |d| {
            assign(&mut d.input_layout, Some(layout))
        })
    }

    /// Sets the depth/stencil state.
    pub fn set_depth_stencil_state(
        &mut self,
        state: DepthStencilState,
    ) -> Result<(), CommandListError> {
        self.modify_descriptor("set_depth_stencil_state", |d| {
            assign(&mut d.depth_stencil, state)
        })
    }

    /// Sets the rasterizer state.
    pub fn set_rasterizer_state(&mut self, state: RasterizerState) -> Result<(), CommandListError> {
        self.modify_descriptor("set_rasterizer_state", |d| {
            assign(&mut d.rasterizer, state)
        })
    }

    /// Sets the blend state.
    pub fn set_blend_state(&mut self, state: BlendState) -> Result<(), CommandListError> {
        self.modify_descriptor("set_blend_state", |d| assign(&mut d.blend, state))
    }

    /// Binds the vertex stage of `unit`, along with its input layout.
    pub fn set_vertex_shader(&mut self, unit: &ShaderUnit) -> Result<(), CommandListError> {
        self.set_shader("set_vertex_shader", unit, ShaderStage::Vertex)
    }

    /// Binds the pixel stage of `unit`.
    pub fn set_pixel_shader(&mut self, unit: &ShaderUnit) -> Result<(), CommandListError> {
        self.set_shader("set_pixel_shader", unit, ShaderStage::Pixel)
    }

    /// Binds the compute stage of `unit`.
    pub fn set_compute_shader(&mut self, unit: &ShaderUnit) -> Result<(), CommandListError> {
        self.set_shader("set_compute_shader", unit, ShaderStage::Compute)
    }

    fn set_shader(
        &mut self,
        operation: &'static str,
        unit: &ShaderUnit,
        stage: ShaderStage,
    ) -> Result<(), CommandListError> {
        self.expect_recording(operation)?;
        let Some((native, layout)) = unit.bindable_stage(stage) else {
            let err = CommandListError::ShaderNotReady {
                label: unit.label(),
                stage,
            };
            log::error!("Command list '{}': {err}", self.name);
            return Err(err);
        };
        let id = Some(native.id());
        self.modify_descriptor(operation, |d| {
            let mut changed = match stage {
                ShaderStage::Vertex => assign(&mut d.vertex_shader, id),
                ShaderStage::Pixel => assign(&mut d.pixel_shader, id),
                ShaderStage::Compute => assign(&mut d.compute_shader, id),
            };
            if stage == ShaderStage::Vertex && layout.is_some() {
                changed |= assign(&mut d.input_layout, layout);
            }
            changed
        })?;
        if !self
            .retained_shaders
            .iter()
            .any(|held| Arc::ptr_eq(held, &native))
        {
            self.retained_shaders.push(native);
        }
        Ok(())
    }

    // --- Direct bindings ---

    /// Sets the viewport.
    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<(), CommandListError> {
        self.expect_recording("set_viewport")?;
        let changed = self.bindings.bind_viewport(viewport);
        self.encode_binding(changed, RenderCommand::SetViewport(viewport))
    }

    /// Sets the scissor rectangle.
    pub fn set_scissor_rectangle(&mut self, scissor: ScissorRect) -> Result<(), CommandListError> {
        self.expect_recording("set_scissor_rectangle")?;
        let changed = self.bindings.bind_scissor(scissor);
        self.encode_binding(changed, RenderCommand::SetScissor(scissor))
    }

    /// Binds the vertex buffer.
    pub fn set_vertex_buffer(&mut self, buffer: VertexBufferHandle) -> Result<(), CommandListError> {
        self.expect_recording("set_vertex_buffer")?;
        let changed = self.bindings.bind_vertex_buffer(buffer);
        self.encode_binding(changed, RenderCommand::SetVertexBuffer(buffer))
    }

    /// Binds the index buffer.
    pub fn set_index_buffer(&mut self, buffer: IndexBufferHandle) -> Result<(), CommandListError> {
        self.expect_recording("set_index_buffer")?;
        let changed = self.bindings.bind_index_buffer(buffer);
        self.encode_binding(changed, RenderCommand::SetIndexBuffer(buffer))
    }

    /// Binds a constant buffer at `slot` for the stages in `scope`.
    pub fn set_constant_buffer(
        &mut self,
        slot: u32,
        scope: BufferScope,
        buffer: ConstantBufferHandle,
    ) -> Result<(), CommandListError> {
        self.expect_recording("set_constant_buffer")?;
        self.check_slot("constant buffer", slot, MAX_CONSTANT_BUFFER_SLOTS)?;
        let changed = self.bindings.bind_constant_buffer(slot, scope, buffer);
        self.encode_binding(
            changed,
            RenderCommand::SetConstantBuffer {
                slot,
                scope,
                buffer,
            },
        )
    }

    /// Binds a sampler at `slot`.
    pub fn set_sampler(&mut self, slot: u32, sampler: SamplerHandle) -> Result<(), CommandListError> {
        self.expect_recording("set_sampler")?;
        self.check_slot("sampler", slot, MAX_SAMPLER_SLOTS)?;
        let changed = self.bindings.bind_sampler(slot, sampler);
        self.encode_binding(changed, RenderCommand::SetSampler { slot, sampler })
    }

    /// Binds a texture at `slot`, or unbinds the slot with `None`.
    pub fn set_texture(
        &mut self,
        slot: u32,
        texture: Option<TextureHandle>,
    ) -> Result<(), CommandListError> {
        self.expect_recording("set_texture")?;
        self.check_slot("texture", slot, MAX_TEXTURE_SLOTS)?;
        let changed = self.bindings.bind_texture(slot, texture);
        self.encode_binding(changed, RenderCommand::SetTexture { slot, texture })
    }

    /// Binds the color targets and an optional depth/stencil target.
    ///
    /// The target formats become part of the pipeline state.
    pub fn set_render_targets(
        &mut self,
        color: &[RenderTargetHandle],
        depth: Option<RenderTargetHandle>,
    ) -> Result<(), CommandListError> {
        self.expect_recording("set_render_targets")?;
        if color.len() > MAX_RENDER_TARGETS {
            return Err(self.invalid_slot(
                "render target",
                color.len() as u32,
                MAX_RENDER_TARGETS as u32,
            ));
        }
        if color.iter().any(|target| target.format.is_depth()) {
            return Err(self.invalid_target("depth view bound as a color target"));
        }
        if depth.is_some_and(|target| !target.format.is_depth()) {
            return Err(self.invalid_target("color view bound as the depth target"));
        }

        let formats: Vec<TextureFormat> = color.iter().map(|target| target.format).collect();
        let depth_format = depth.map(|target| target.format);
        self.modify_descriptor("set_render_targets", |d| {
            let changed = assign(&mut d.render_target_formats, formats);
            assign(&mut d.depth_stencil_format, depth_format) || changed
        })?;

        let changed = self.bindings.bind_render_targets(color, depth);
        self.encode_binding(
            changed,
            RenderCommand::SetRenderTargets {
                color: color.to_vec(),
                depth,
            },
        )
    }

    /// Binds a single color target.
    pub fn set_render_target(
        &mut self,
        target: RenderTargetHandle,
        depth: Option<RenderTargetHandle>,
    ) -> Result<(), CommandListError> {
        self.set_render_targets(std::slice::from_ref(&target), depth)
    }

    // --- Clears ---

    /// Clears a color target. No pipeline is needed.
    pub fn clear_render_target(
        &mut self,
        target: RenderTargetHandle,
        color: ClearColor,
    ) -> Result<(), CommandListError> {
        self.expect_recording("clear_render_target")?;
        if target.format.is_depth() {
            return Err(self.invalid_target("clear_render_target on a depth view"));
        }
        self.encode(RenderCommand::ClearRenderTarget { target, color })
    }

    /// Clears the depth and/or stencil aspects of a depth target.
    ///
    /// A clear that names neither aspect records nothing.
    pub fn clear_depth_stencil(
        &mut self,
        target: RenderTargetHandle,
        clear: DepthStencilClear,
    ) -> Result<(), CommandListError> {
        self.expect_recording("clear_depth_stencil")?;
        if !target.format.is_depth() {
            return Err(self.invalid_target("clear_depth_stencil on a color view"));
        }
        if clear.stencil.is_some() && !target.format.has_stencil() {
            return Err(self.invalid_target("stencil clear on a view without stencil"));
        }
        if clear.is_noop() {
            return Ok(());
        }
        self.encode(RenderCommand::ClearDepthStencil { target, clear })
    }

    // --- Work ---

    /// Draws `vertex_count` vertices from the bound vertex buffer.
    pub fn draw(&mut self, vertex_count: u32) -> Result<(), CommandListError> {
        self.expect_recording("draw")?;
        self.prepare_work("draw", PipelineKind::Graphics)?;
        let vertices = self.require_vertex_buffer()?;
        self.check_range(0, vertex_count, vertices.vertex_count)?;
        if vertex_count == 0 {
            return Ok(());
        }
        self.encode(RenderCommand::Draw {
            vertex_count,
            first_vertex: 0,
        })?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    /// Draws `index_count` indices starting at `index_offset`, adding
    /// `vertex_offset` to each index.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        index_offset: u32,
        vertex_offset: i32,
    ) -> Result<(), CommandListError> {
        self.expect_recording("draw_indexed")?;
        self.prepare_work("draw_indexed", PipelineKind::Graphics)?;
        let vertices = self.require_vertex_buffer()?;
        let Some(indices) = self.bindings.index_buffer else {
            log::error!("Command list '{}': draw_indexed without an index buffer", self.name);
            return Err(CommandListError::MissingIndexBuffer);
        };
        self.check_range(index_offset, index_count, indices.index_count)?;
        // The base vertex shifts every index, so its magnitude must stay
        // inside the bound vertex buffer in either direction.
        if vertex_offset != 0 {
            self.check_range(vertex_offset.unsigned_abs(), 1, vertices.vertex_count)?;
        }
        if index_count == 0 {
            return Ok(());
        }
        self.encode(RenderCommand::DrawIndexed {
            index_count,
            first_index: index_offset,
            base_vertex: vertex_offset,
        })?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    /// Dispatches `x * y * z` workgroups with the bound compute pipeline.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), CommandListError> {
        self.expect_recording("dispatch")?;
        self.prepare_work("dispatch", PipelineKind::Compute)?;
        if x == 0 || y == 0 || z == 0 {
            return Ok(());
        }
        self.encode(RenderCommand::Dispatch { x, y, z })?;
        self.stats.dispatches += 1;
        Ok(())
    }

    // --- Submission ---

    /// Hands the ended recording to the device.
    ///
    /// On success the list enters `IdleSyncCpuToGpu` and the fence of the
    /// submission is returned. A poisoned or unbalanced recording is
    /// discarded instead. If the device rejects the buffer the recording is
    /// discarded and the list returns to `Idle`.
    pub fn submit(&mut self) -> Result<FenceId, CommandListError> {
        if self.state != CommandListState::Ended {
            return Err(self.violation("submit"));
        }
        if let Some(cause) = self.poisoned {
            log::error!(
                "Command list '{}': discarding recording invalidated by '{cause}'",
                self.name
            );
            self.reset_recording();
            return Err(CommandListError::Poisoned { cause });
        }
        if !self.markers.is_empty() {
            let open = self.markers.len();
            log::error!("Command list '{}': {open} marker(s) open at submit", self.name);
            self.reset_recording();
            return Err(CommandListError::UnbalancedMarkers { open });
        }
        let Some(buffer) = self.buffer.take() else {
            self.reset_recording();
            return Err(DeviceError::InvalidCommandBuffer.into());
        };

        let command_count = buffer.command_count();
        match self.device.submit(buffer) {
            Ok(fence) => {
                self.in_flight = Some(InFlight {
                    fence,
                    pipelines: std::mem::take(&mut self.retained_pipelines),
                    shaders: std::mem::take(&mut self.retained_shaders),
                });
                self.last_stats = self.stats;
                self.reset_recording();
                self.state = CommandListState::IdleSyncCpuToGpu;
                log::debug!(
                    "Command list '{}' submitted {command_count} command(s) ({fence:?})",
                    self.name
                );
                Ok(fence)
            }
            Err(e) => {
                log::error!("Command list '{}' submission failed: {e}", self.name);
                self.reset_recording();
                Err(e.into())
            }
        }
    }

    /// Checks the previous submission without blocking and returns the state
    /// after the check.
    pub fn poll(&mut self) -> Result<CommandListState, CommandListError> {
        if self.state == CommandListState::IdleSyncCpuToGpu {
            match self.pending_fence() {
                Some(fence) => match self.device.is_fence_signaled(fence) {
                    Ok(true) => self.retire(),
                    Ok(false) => {}
                    Err(e) => return Err(self.fence_failure(e)),
                },
                None => self.retire(),
            }
        }
        Ok(self.state)
    }

    /// Blocks until all work submitted to the device has completed, bounded
    /// by the configured GPU wait timeout. Legal in any state.
    pub fn flush(&mut self) -> Result<(), CommandListError> {
        log::debug!("Command list '{}': flushing device", self.name);
        match self.device.wait_idle(self.wait_timeout) {
            Ok(()) => {
                self.retire();
                Ok(())
            }
            Err(e) => Err(self.fence_failure(e)),
        }
    }

    /// Abandons an unfinished recording. Nothing reaches the GPU.
    pub fn discard(&mut self) {
        if self.state == CommandListState::IdleSyncCpuToGpu {
            return;
        }
        if self.buffer.is_some() {
            log::debug!("Command list '{}': discarding recording", self.name);
        }
        self.reset_recording();
    }

    // --- Internals ---

    fn violation(&mut self, operation: &'static str) -> CommandListError {
        let state = self.state;
        log::error!(
            "Command list '{}': '{operation}' is not allowed in state {state}",
            self.name
        );
        if self.buffer.is_some() {
            self.poisoned.get_or_insert(operation);
        }
        CommandListError::InvalidState { operation, state }
    }

    fn expect_recording(&mut self, operation: &'static str) -> Result<(), CommandListError> {
        if self.state == CommandListState::Recording {
            Ok(())
        } else {
            Err(self.violation(operation))
        }
    }

    fn invalid_slot(&self, kind: &'static str, slot: u32, max: u32) -> CommandListError {
        let err = CommandListError::InvalidSlot { kind, slot, max };
        log::error!("Command list '{}': {err}", self.name);
        err
    }

    fn check_slot(&self, kind: &'static str, slot: u32, max: u32) -> Result<(), CommandListError> {
        if slot < max {
            Ok(())
        } else {
            Err(self.invalid_slot(kind, slot, max))
        }
    }

    fn invalid_target(&self, reason: &'static str) -> CommandListError {
        log::error!("Command list '{}': {reason}", self.name);
        CommandListError::InvalidTarget(reason)
    }

    fn check_range(&self, first: u32, count: u32, available: u32) -> Result<(), CommandListError> {
        if u64::from(first) + u64::from(count) <= u64::from(available) {
            return Ok(());
        }
        let err = CommandListError::DrawOutOfRange {
            first,
            count,
            available,
        };
        log::error!("Command list '{}': {err}", self.name);
        Err(err)
    }

    fn require_vertex_buffer(&self) -> Result<VertexBufferHandle, CommandListError> {
        self.bindings.vertex_buffer.ok_or_else(|| {
            log::error!("Command list '{}': draw without a vertex buffer", self.name);
            CommandListError::MissingVertexBuffer
        })
    }

    /// Waits for the previous submission if the list is still syncing.
    fn sync_previous(&mut self) -> Result<(), CommandListError> {
        if self.state != CommandListState::IdleSyncCpuToGpu {
            return Ok(());
        }
        let Some(fence) = self.pending_fence() else {
            self.retire();
            return Ok(());
        };
        match self.device.wait_for_fence(fence, self.wait_timeout) {
            Ok(()) => {
                self.retire();
                Ok(())
            }
            Err(e) => Err(self.fence_failure(e)),
        }
    }

    /// Releases the objects of the last submission and leaves `IdleSyncCpuToGpu`.
    fn retire(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            log::trace!(
                "Command list '{}': {:?} signaled, releasing {} pipeline(s) and {} shader(s)",
                self.name,
                in_flight.fence,
                in_flight.pipelines.len(),
                in_flight.shaders.len()
            );
        }
        if self.state == CommandListState::IdleSyncCpuToGpu {
            self.state = CommandListState::Idle;
        }
    }

    /// Logs a failed fence wait. A lost device will never signal, so the
    /// submission is retired; a timeout leaves it pending.
    fn fence_failure(&mut self, err: DeviceError) -> CommandListError {
        log::error!("Command list '{}': waiting for the GPU failed: {err}", self.name);
        if matches!(err, DeviceError::DeviceLost) {
            self.retire();
        }
        err.into()
    }

    fn ensure_buffer(&mut self) -> Result<(), CommandListError> {
        if self.buffer.is_none() {
            let buffer = self.device.allocate_command_buffer(&self.name)?;
            self.buffer = Some(buffer);
            self.stats = CommandListStats::default();
        }
        Ok(())
    }

    fn encode(&mut self, command: RenderCommand) -> Result<(), CommandListError> {
        let buffer = self
            .buffer
            .as_mut()
            .ok_or(DeviceError::InvalidCommandBuffer)?;
        buffer.encode(command)?;
        self.stats.commands_encoded += 1;
        Ok(())
    }

    fn encode_binding(
        &mut self,
        changed: bool,
        command: RenderCommand,
    ) -> Result<(), CommandListError> {
        if !changed && self.skip_redundant {
            self.stats.redundant_bindings_skipped += 1;
            return Ok(());
        }
        self.encode(command)
    }

    fn close_marker(&mut self, marker: Marker) -> Result<(), CommandListError> {
        if let (Some(profiler), Some(token)) = (&self.profiler, marker.token) {
            profiler.end_scope(token);
        }
        log::trace!("Command list '{}': closed marker '{}'", self.name, marker.name);
        self.encode(RenderCommand::PopDebugGroup)
    }

    fn modify_descriptor(
        &mut self,
        operation: &'static str,
        apply: impl FnOnce(&mut PipelineStateDescriptor) -> bool,
    ) -> Result<(), CommandListError> {
        self.expect_recording(operation)?;
        let descriptor = self
            .descriptor
            .as_mut()
            .ok_or(CommandListError::PipelineNotResolved)?;
        if apply(descriptor) {
            self.pipeline_dirty = true;
        }
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: Arc<CachedPipeline>) -> Result<(), CommandListError> {
        if self
            .pipeline
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &pipeline))
        {
            return Ok(());
        }
        self.encode(RenderCommand::SetPipeline(pipeline.id()))?;
        self.stats.pipeline_switches += 1;
        if !self
            .retained_pipelines
            .iter()
            .any(|held| Arc::ptr_eq(held, &pipeline))
        {
            self.retained_pipelines.push(Arc::clone(&pipeline));
        }
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Re-resolves a dirty descriptor and checks the pipeline kind.
    fn prepare_work(
        &mut self,
        operation: &'static str,
        kind: PipelineKind,
    ) -> Result<(), CommandListError> {
        if self.pipeline_dirty {
            let resolved = match &self.descriptor {
                Some(descriptor) => self.cache.resolve(descriptor),
                None => return Err(CommandListError::PipelineNotResolved),
            };
            let pipeline = resolved.map_err(|e| {
                log::error!("Command list '{}': '{operation}' skipped: {e}", self.name);
                CommandListError::from(e)
            })?;
            self.pipeline_dirty = false;
            self.bind_pipeline(pipeline)?;
        }
        let Some(pipeline) = &self.pipeline else {
            return Err(CommandListError::PipelineNotResolved);
        };
        if pipeline.kind() != kind {
            log::error!(
                "Command list '{}': '{operation}' with {:?} pipeline '{}'",
                self.name,
                pipeline.kind(),
                pipeline.label()
            );
            return Err(CommandListError::WrongPipelineKind { operation });
        }
        Ok(())
    }

    /// Drops the recording in progress and returns to `Idle`.
    fn reset_recording(&mut self) {
        for marker in self.markers.drain(..) {
            if let (Some(profiler), Some(token)) = (&self.profiler, marker.token) {
                profiler.end_scope(token);
            }
        }
        self.buffer = None;
        self.descriptor = None;
        self.pipeline_dirty = false;
        self.pipeline = None;
        self.bindings.reset();
        self.retained_pipelines.clear();
        self.retained_shaders.clear();
        self.poisoned = None;
        self.stats = CommandListStats::default();
        self.state = CommandListState::Idle;
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        if let Some(fence) = self.pending_fence() {
            if let Err(e) = self.device.wait_for_fence(fence, self.wait_timeout) {
                log::warn!(
                    "Command list '{}' dropped before {fence:?} signaled: {e}",
                    self.name
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDevice, RecordingProfiler, CS_SOURCE, VS_PS_SOURCE};
    use std::sync::atomic::Ordering;

    struct Fixture {
        device: Arc<FakeDevice>,
        cache: Arc<PipelineCache>,
        unit: ShaderUnit,
    }

    impl Fixture {
        fn new() -> Self {
            let device = FakeDevice::new();
            let cache = Arc::new(PipelineCache::new(device.clone(), &RhiSettings::default()));
            let unit = ShaderUnit::compiled(
                device.clone(),
                ShaderKind::VertexPixel,
                ShaderSource::inline("quad", VS_PS_SOURCE),
                InputLayoutSignature::POSITION_TEXCOORD,
            );
            Self {
                device,
                cache,
                unit,
            }
        }

        fn list(&self) -> CommandList {
            CommandList::new(
                "main",
                self.device.clone(),
                Arc::clone(&self.cache),
                &RhiSettings::default(),
            )
        }

        fn descriptor(&self) -> PipelineStateDescriptor {
            PipelineStateDescriptor::builder()
                .stages(&self.unit.compiled_stages().unwrap())
                .render_target(TextureFormat::Rgba8Unorm)
                .build()
                .unwrap()
        }
    }

    fn color_target() -> RenderTargetHandle {
        RenderTargetHandle {
            view: TextureViewId(1),
            format: TextureFormat::Rgba8Unorm,
            width: 64,
            height: 64,
        }
    }

    fn vertices(vertex_count: u32) -> VertexBufferHandle {
        VertexBufferHandle {
            buffer: BufferId(10),
            offset: 0,
            stride: 20,
            vertex_count,
        }
    }

    #[test]
    fn single_draw_frame_reaches_the_device_and_returns_to_idle() {
        let fx = Fixture::new();
        let mut list = fx.list();

        list.begin_pass("opaque", &fx.descriptor()).unwrap();
        list.set_viewport(Viewport::from_size(64, 64)).unwrap();
        list.set_vertex_buffer(vertices(3)).unwrap();
        list.draw(3).unwrap();
        list.end().unwrap();
        let fence = list.submit().unwrap();

        assert_eq!(list.state(), CommandListState::IdleSyncCpuToGpu);
        assert_eq!(list.pending_fence(), Some(fence));
        let commands = fx.device.last_submission();
        assert_eq!(commands.first(), Some(&RenderCommand::PushDebugGroup("opaque".into())));
        assert!(matches!(commands[1], RenderCommand::SetPipeline(_)));
        assert_eq!(commands.last(), Some(&RenderCommand::PopDebugGroup));
        assert_eq!(commands.iter().filter(|c| c.is_work()).count(), 1);
        assert_eq!(list.last_submitted_stats().draw_calls, 1);

        assert_eq!(list.poll().unwrap(), CommandListState::IdleSyncCpuToGpu);
        fx.device.signal_all();
        assert_eq!(list.poll().unwrap(), CommandListState::Idle);
        assert_eq!(list.pending_fence(), None);
    }

    #[test]
    fn draw_while_idle_is_a_contract_violation() {
        let fx = Fixture::new();
        let mut list = fx.list();

        let err = list.draw(3).unwrap_err();

        assert!(err.is_contract_violation());
        assert!(matches!(
            err,
            CommandListError::InvalidState {
                operation: "draw",
                state: CommandListState::Idle
            }
        ));
        assert_eq!(list.state(), CommandListState::Idle);
    }

    #[test]
    fn violation_poisons_the_recording() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.end().unwrap();

        // Ended does not accept draws.
        assert!(list.draw(3).is_err());
        assert!(list.is_poisoned());

        let err = list.submit().unwrap_err();
        assert!(matches!(err, CommandListError::Poisoned { cause: "draw" }));
        assert_eq!(list.state(), CommandListState::Idle);
        assert!(fx.device.submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn begin_from_ended_is_rejected() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.end().unwrap();

        let err = list.begin(&fx.descriptor()).unwrap_err();

        assert!(matches!(
            err,
            CommandListError::InvalidState {
                operation: "begin",
                state: CommandListState::Ended
            }
        ));
        assert_eq!(list.state(), CommandListState::Ended);
    }

    #[test]
    fn marker_underflow_poisons() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();

        assert!(matches!(
            list.end_marker(),
            Err(CommandListError::MarkerUnderflow)
        ));
        list.end().unwrap();
        assert!(matches!(
            list.submit(),
            Err(CommandListError::Poisoned {
                cause: "end_marker"
            })
        ));
    }

    #[test]
    fn end_closes_every_open_marker() {
        let fx = Fixture::new();
        let profiler = Arc::new(RecordingProfiler::default());
        let mut list = fx.list().with_profiler(profiler.clone());

        list.begin_marker("frame").unwrap();
        list.begin_pass("gbuffer", &fx.descriptor()).unwrap();
        assert_eq!(list.open_markers(), 2);
        list.end().unwrap();
        list.submit().unwrap();

        assert_eq!(
            *profiler.events.lock().unwrap(),
            vec!["begin:frame", "begin:gbuffer", "end:1", "end:0"]
        );
        let pops = fx
            .device
            .last_submission()
            .iter()
            .filter(|c| **c == RenderCommand::PopDebugGroup)
            .count();
        assert_eq!(pops, 2);
    }

    #[test]
    fn failed_begin_stays_idle_and_closes_the_pass_marker() {
        let fx = Fixture::new();
        let profiler = Arc::new(RecordingProfiler::default());
        let mut list = fx.list().with_profiler(profiler.clone());

        let err = list
            .begin_pass("broken", &PipelineStateDescriptor::default())
            .unwrap_err();

        assert!(matches!(err, CommandListError::Pipeline(_)));
        assert_eq!(list.state(), CommandListState::Idle);
        assert_eq!(list.open_markers(), 0);
        assert_eq!(profiler.events.lock().unwrap().len(), 2);
        assert_eq!(fx.device.pipeline_builds(), 0);
    }

    #[test]
    fn unbuilt_shader_unit_cannot_be_bound() {
        let fx = Fixture::new();
        let broken = ShaderUnit::compiled(
            fx.device.clone(),
            ShaderKind::VertexPixel,
            ShaderSource::inline("no_pixel", "fn vs_main() { }"),
            InputLayoutSignature::POSITION_TEXCOORD,
        );
        assert_eq!(broken.stage_state(ShaderStage::Vertex), CompilationState::Built);
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();

        for result in [list.set_vertex_shader(&broken), list.set_pixel_shader(&broken)] {
            assert!(matches!(
                result,
                Err(CommandListError::ShaderNotReady { .. })
            ));
        }
        assert!(!list.is_poisoned());
    }

    #[test]
    fn changed_state_re_resolves_at_the_next_draw() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.set_vertex_buffer(vertices(6)).unwrap();
        list.draw(3).unwrap();
        let first = Arc::clone(list.pipeline().unwrap());

        list.set_primitive_topology(PrimitiveTopology::LineList).unwrap();
        list.draw(6).unwrap();
        list.set_primitive_topology(PrimitiveTopology::LineList).unwrap();
        list.draw(6).unwrap();

        assert!(!Arc::ptr_eq(&first, list.pipeline().unwrap()));
        assert_eq!(fx.device.pipeline_builds(), 2);
        assert_eq!(list.stats().pipeline_switches, 2);
    }

    #[test]
    fn failed_re_resolve_keeps_the_draw_off_the_stream() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.set_vertex_buffer(vertices(3)).unwrap();

        list.set_depth_stencil_state(DepthStencilState::read_write())
            .unwrap();
        let err = list.draw(3).unwrap_err();

        assert!(matches!(err, CommandListError::Pipeline(_)));
        assert_eq!(list.stats().draw_calls, 0);
    }

    #[test]
    fn redundant_bindings_are_skipped() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();

        list.set_viewport(Viewport::from_size(64, 64)).unwrap();
        list.set_viewport(Viewport::from_size(64, 64)).unwrap();
        list.set_viewport(Viewport::from_size(32, 32)).unwrap();

        assert_eq!(list.stats().redundant_bindings_skipped, 1);
        list.end().unwrap();
        list.submit().unwrap();
        let viewports = fx
            .device
            .last_submission()
            .iter()
            .filter(|c| matches!(c, RenderCommand::SetViewport(_)))
            .count();
        assert_eq!(viewports, 2);
    }

    #[test]
    fn out_of_range_slots_and_draws_are_rejected() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        let sampler = SamplerHandle {
            sampler: SamplerId(1),
        };

        assert!(matches!(
            list.set_sampler(MAX_SAMPLER_SLOTS, sampler),
            Err(CommandListError::InvalidSlot { kind: "sampler", .. })
        ));
        assert!(matches!(
            list.draw(3),
            Err(CommandListError::MissingVertexBuffer)
        ));
        list.set_vertex_buffer(vertices(3)).unwrap();
        assert!(matches!(
            list.draw(4),
            Err(CommandListError::DrawOutOfRange {
                first: 0,
                count: 4,
                available: 3
            })
        ));
        assert!(matches!(
            list.draw_indexed(3, 0, 0),
            Err(CommandListError::MissingIndexBuffer)
        ));
    }

    #[test]
    fn indexed_draw_checks_the_index_range() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.set_vertex_buffer(vertices(4)).unwrap();
        list.set_index_buffer(IndexBufferHandle {
            buffer: BufferId(11),
            offset: 0,
            format: IndexFormat::Uint16,
            index_count: 6,
        })
        .unwrap();

        list.draw_indexed(6, 0, 0).unwrap();
        assert!(list.draw_indexed(6, 1, 0).is_err());
        assert_eq!(list.stats().draw_calls, 1);
    }

    #[test]
    fn indexed_draw_rejects_a_base_vertex_outside_the_buffer() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.set_vertex_buffer(vertices(4)).unwrap();
        list.set_index_buffer(IndexBufferHandle {
            buffer: BufferId(11),
            offset: 0,
            format: IndexFormat::Uint16,
            index_count: 6,
        })
        .unwrap();

        assert!(matches!(
            list.draw_indexed(6, 0, -1000),
            Err(CommandListError::DrawOutOfRange {
                first: 1000,
                available: 4,
                ..
            })
        ));
        assert_eq!(list.state(), CommandListState::Recording);
        assert_eq!(list.stats().draw_calls, 0);
    }

    #[test]
    fn indexed_draw_accepts_a_small_negative_base_vertex() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.set_vertex_buffer(vertices(4)).unwrap();
        list.set_index_buffer(IndexBufferHandle {
            buffer: BufferId(11),
            offset: 0,
            format: IndexFormat::Uint16,
            index_count: 6,
        })
        .unwrap();

        list.draw_indexed(6, 0, -3).unwrap();
        assert!(list.draw_indexed(6, 0, 4).is_err());
        assert_eq!(list.stats().draw_calls, 1);
    }

    #[test]
    fn dispatch_needs_a_compute_pipeline() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        assert!(matches!(
            list.dispatch(1, 1, 1),
            Err(CommandListError::WrongPipelineKind {
                operation: "dispatch"
            })
        ));
        list.discard();

        let compute = ShaderUnit::compiled(
            fx.device.clone(),
            ShaderKind::Compute,
            ShaderSource::inline("cull", CS_SOURCE),
            InputLayoutSignature::EMPTY,
        );
        let descriptor = PipelineStateDescriptor::builder()
            .stages(&compute.compiled_stages().unwrap())
            .build()
            .unwrap();
        list.begin(&descriptor).unwrap();
        list.dispatch(8, 8, 1).unwrap();
        assert!(list.draw(3).is_err());
        assert_eq!(list.stats().dispatches, 1);
    }

    #[test]
    fn clears_check_the_target_kind() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        let depth = RenderTargetHandle {
            view: TextureViewId(2),
            format: TextureFormat::Depth32Float,
            width: 64,
            height: 64,
        };

        list.clear_render_target(color_target(), ClearColor::BLACK)
            .unwrap();
        list.clear_depth_stencil(depth, DepthStencilClear::depth(1.0))
            .unwrap();
        assert!(matches!(
            list.clear_depth_stencil(color_target(), DepthStencilClear::depth(1.0)),
            Err(CommandListError::InvalidTarget(_))
        ));
        assert!(matches!(
            list.clear_depth_stencil(depth, DepthStencilClear::depth_stencil(1.0, 0)),
            Err(CommandListError::InvalidTarget(_))
        ));
        assert_eq!(list.stats().commands_encoded, 3);
    }

    #[test]
    fn device_rejection_resets_to_idle() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.end().unwrap();
        fx.device.fail_submit.store(true, Ordering::SeqCst);

        let err = list.submit().unwrap_err();

        assert!(matches!(err, CommandListError::Device(_)));
        assert_eq!(list.state(), CommandListState::Idle);
        assert_eq!(list.pending_fence(), None);
    }

    #[test]
    fn in_flight_pipelines_outlive_a_cache_clear() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.end().unwrap();
        list.submit().unwrap();

        fx.cache.clear();
        assert_eq!(fx.device.live_pipelines(), 1);

        fx.device.signal_all();
        list.poll().unwrap();
        assert_eq!(fx.device.live_pipelines(), 0);
    }

    #[test]
    fn next_begin_waits_for_the_previous_submission() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.end().unwrap();
        list.submit().unwrap();

        list.begin(&fx.descriptor()).unwrap();

        assert_eq!(list.state(), CommandListState::Recording);
        assert_eq!(list.pending_fence(), None);
    }

    #[test]
    fn flush_reports_timeout_and_device_loss() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.end().unwrap();
        list.submit().unwrap();

        fx.device.hang.store(true, Ordering::SeqCst);
        assert!(matches!(
            list.flush(),
            Err(CommandListError::Device(DeviceError::Timeout { .. }))
        ));
        assert_eq!(list.state(), CommandListState::IdleSyncCpuToGpu);

        fx.device.hang.store(false, Ordering::SeqCst);
        fx.device.lost.store(true, Ordering::SeqCst);
        assert!(matches!(
            list.flush(),
            Err(CommandListError::Device(DeviceError::DeviceLost))
        ));
        assert_eq!(list.state(), CommandListState::Idle);
    }

    #[test]
    fn discard_drops_the_recording() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin_pass("shadow", &fx.descriptor()).unwrap();

        list.discard();

        assert_eq!(list.state(), CommandListState::Idle);
        assert_eq!(list.open_markers(), 0);
        assert!(fx.device.submitted.lock().unwrap().is_empty());
        list.begin(&fx.descriptor()).unwrap();
    }

    #[test]
    fn render_target_formats_feed_the_descriptor() {
        let fx = Fixture::new();
        let mut list = fx.list();
        list.begin(&fx.descriptor()).unwrap();
        list.set_vertex_buffer(vertices(3)).unwrap();
        let hdr = RenderTargetHandle {
            format: TextureFormat::Rgba16Float,
            ..color_target()
        };

        list.set_render_target(hdr, None).unwrap();
        list.draw(3).unwrap();

        assert_eq!(fx.cache.len(), 2);
        assert!(matches!(
            list.set_render_target(
                RenderTargetHandle {
                    format: TextureFormat::Depth32Float,
                    ..color_target()
                },
                None
            ),
            Err(CommandListError::InvalidTarget(_))
        ));
    }
}
