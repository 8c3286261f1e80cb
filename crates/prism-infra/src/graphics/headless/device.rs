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

use super::compiler;
use super::timeline::Timeline;
use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use prism_core::renderer::{
    DeviceError, FenceId, GraphicsBackendType, InputLayout, NativeCommandBuffer, PipelineError,
    PipelineKind, PipelineStateDescriptor, RenderCommand, RenderPipelineId, ResourceError,
    RhiDevice, ShaderError, ShaderModuleDescriptor, ShaderModuleId, ShaderStage,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Configuration for the [`HeadlessDevice`].
#[derive(Debug, Clone, Default)]
pub struct HeadlessDeviceConfig {
    /// Simulated GPU time spent on each submission.
    pub execution_latency: Duration,
    /// Simulated time to build one pipeline.
    pub pipeline_build_latency: Duration,
    /// Simulated time to compile one shader stage.
    pub shader_compile_latency: Duration,
}

/// A snapshot of what the headless device has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// Shader stages that compiled.
    pub shaders_compiled: u64,
    /// Shader stages that were rejected.
    pub shader_failures: u64,
    /// Pipelines created.
    pub pipelines_created: u64,
    /// Command buffers accepted by `submit`.
    pub submissions: u64,
    /// Commands executed on the GPU thread.
    pub commands_executed: u64,
    /// Draws executed on the GPU thread.
    pub draws_executed: u64,
    /// Dispatches executed on the GPU thread.
    pub dispatches_executed: u64,
    /// Executed `SetPipeline` commands naming a pipeline that was already destroyed.
    pub stale_pipeline_uses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    shaders_compiled: AtomicU64,
    shader_failures: AtomicU64,
    pipelines_created: AtomicU64,
    submissions: AtomicU64,
    commands_executed: AtomicU64,
    draws_executed: AtomicU64,
    dispatches_executed: AtomicU64,
    stale_pipeline_uses: AtomicU64,
}

#[derive(Debug)]
struct ShaderEntry {
    label: String,
    stage: ShaderStage,
    input_layout: Option<InputLayout>,
}

#[derive(Debug)]
struct PipelineEntry {
    label: String,
    kind: PipelineKind,
}

type PipelineMap = Arc<Mutex<HashMap<RenderPipelineId, PipelineEntry>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lets tests hold the GPU thread before it executes the next submission.
#[derive(Debug, Default)]
struct Gate {
    held: Mutex<bool>,
    released: Condvar,
}

impl Gate {
    fn set(&self, held: bool) {
        *lock(&self.held) = held;
        self.released.notify_all();
    }

    fn pass(&self) {
        let mut held = lock(&self.held);
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// The recording of a [`HeadlessDevice`]: the command stream, kept as is.
#[derive(Debug)]
pub struct HeadlessCommandBuffer {
    label: String,
    commands: Vec<RenderCommand>,
}

impl HeadlessCommandBuffer {
    /// The commands recorded so far.
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }
}

impl NativeCommandBuffer for HeadlessCommandBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn encode(&mut self, command: RenderCommand) -> Result<(), DeviceError> {
        self.commands.push(command);
        Ok(())
    }

    fn command_count(&self) -> usize {
        self.commands.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

struct GpuJob {
    fence: FenceId,
    label: String,
    commands: Vec<RenderCommand>,
}

/// A device without a GPU.
///
/// Shaders are checked structurally (see the module docs of `compiler`),
/// pipelines are bookkeeping entries, and submissions run on a dedicated
/// thread that plays the role of the GPU queue: it executes them in order,
/// counts the work and signals each fence when done.
#[derive(Debug)]
pub struct HeadlessDevice {
    config: HeadlessDeviceConfig,
    shaders: Mutex<HashMap<ShaderModuleId, ShaderEntry>>,
    pipelines: PipelineMap,
    next_shader_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,
    timeline: Arc<Timeline>,
    counters: Arc<Counters>,
    gate: Arc<Gate>,
    queue: Mutex<Option<Sender<GpuJob>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    frame: AtomicU64,
}

impl HeadlessDevice {
    /// Creates the device and starts its GPU thread.
    pub fn new(config: HeadlessDeviceConfig) -> anyhow::Result<Arc<Self>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let timeline = Arc::new(Timeline::default());
        let counters = Arc::new(Counters::default());
        let gate = Arc::new(Gate::default());
        let pipelines: PipelineMap = Arc::new(Mutex::new(HashMap::new()));

        let worker = {
            let timeline = Arc::clone(&timeline);
            let counters = Arc::clone(&counters);
            let gate = Arc::clone(&gate);
            let pipelines = Arc::clone(&pipelines);
            let latency = config.execution_latency;
            thread::Builder::new()
                .name("prism-headless-gpu".to_string())
                .spawn(move || run_gpu(rx, timeline, counters, gate, pipelines, latency))
                .context("Failed to spawn the headless GPU thread")?
        };

        log::info!("Headless device created ({config:?})");
        Ok(Arc::new(Self {
            config,
            shaders: Mutex::new(HashMap::new()),
            pipelines,
            next_shader_id: AtomicUsize::new(0),
            next_pipeline_id: AtomicUsize::new(0),
            timeline,
            counters,
            gate,
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            frame: AtomicU64::new(0),
        }))
    }

    /// Creates a device with no simulated latency.
    pub fn instant() -> anyhow::Result<Arc<Self>> {
        Self::new(HeadlessDeviceConfig::default())
    }

    /// The configuration the device was created with.
    pub fn config(&self) -> &HeadlessDeviceConfig {
        &self.config
    }

    /// Counters of the work done so far.
    pub fn stats(&self) -> HeadlessStats {
        let c = &self.counters;
        HeadlessStats {
            shaders_compiled: c.shaders_compiled.load(Ordering::Relaxed),
            shader_failures: c.shader_failures.load(Ordering::Relaxed),
            pipelines_created: c.pipelines_created.load(Ordering::Relaxed),
            submissions: c.submissions.load(Ordering::Relaxed),
            commands_executed: c.commands_executed.load(Ordering::Relaxed),
            draws_executed: c.draws_executed.load(Ordering::Relaxed),
            dispatches_executed: c.dispatches_executed.load(Ordering::Relaxed),
            stale_pipeline_uses: c.stale_pipeline_uses.load(Ordering::Relaxed),
        }
    }

    /// The number of shader modules alive.
    pub fn live_shaders(&self) -> usize {
        lock(&self.shaders).len()
    }

    /// The number of pipelines alive.
    pub fn live_pipelines(&self) -> usize {
        lock(&self.pipelines).len()
    }

    /// The highest fence the GPU thread has signaled.
    pub fn completed_fence(&self) -> FenceId {
        self.timeline.completed()
    }

    /// Stops the GPU thread from starting new submissions until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.gate.set(true);
    }

    /// Lets the GPU thread continue.
    pub fn resume(&self) {
        self.gate.set(false);
    }

    /// Marks the device as lost. Pending and future waits fail with
    /// [`DeviceError::DeviceLost`] and nothing else signals.
    pub fn simulate_device_lost(&self) {
        log::error!("Headless device lost");
        self.timeline.mark_lost();
        self.resume();
    }

    fn generate_shader_id(&self) -> ShaderModuleId {
        ShaderModuleId(self.next_shader_id.fetch_add(1, Ordering::Relaxed))
    }

    fn generate_pipeline_id(&self) -> RenderPipelineId {
        RenderPipelineId(self.next_pipeline_id.fetch_add(1, Ordering::Relaxed))
    }

    fn check_stage(
        shaders: &HashMap<ShaderModuleId, ShaderEntry>,
        id: ShaderModuleId,
        stage: ShaderStage,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<(), PipelineError> {
        match shaders.get(&id) {
            Some(entry) if entry.stage == stage => Ok(()),
            Some(entry) => {
                log::error!(
                    "HeadlessDevice: '{}' is a {} module, expected {stage}",
                    entry.label,
                    entry.stage
                );
                Err(PipelineError::InvalidShaderModuleForPipeline {
                    id,
                    pipeline_label: Some(descriptor.label()),
                })
            }
            None => Err(PipelineError::InvalidShaderModuleForPipeline {
                id,
                pipeline_label: Some(descriptor.label()),
            }),
        }
    }
}

fn run_gpu(
    rx: Receiver<GpuJob>,
    timeline: Arc<Timeline>,
    counters: Arc<Counters>,
    gate: Arc<Gate>,
    pipelines: PipelineMap,
    latency: Duration,
) {
    log::info!("Headless GPU thread started.");
    for job in rx.iter() {
        gate.pass();
        if timeline.is_lost() {
            continue;
        }
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        for command in &job.commands {
            match command {
                RenderCommand::SetPipeline(id) if !lock(&pipelines).contains_key(id) => {
                    log::error!(
                        "Headless GPU: '{}' uses destroyed pipeline {id:?}",
                        job.label
                    );
                    counters.stale_pipeline_uses.fetch_add(1, Ordering::Relaxed);
                }
                RenderCommand::Draw { .. } | RenderCommand::DrawIndexed { .. } => {
                    counters.draws_executed.fetch_add(1, Ordering::Relaxed);
                }
                RenderCommand::Dispatch { .. } => {
                    counters.dispatches_executed.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }
        counters
            .commands_executed
            .fetch_add(job.commands.len() as u64, Ordering::Relaxed);
        log::trace!(
            "Headless GPU executed '{}' ({} commands), signaling {:?}",
            job.label,
            job.commands.len(),
            job.fence
        );
        timeline.signal(job.fence);
    }
    log::info!("Headless GPU thread stopped.");
}

impl RhiDevice for HeadlessDevice {
    fn backend_type(&self) -> GraphicsBackendType {
        GraphicsBackendType::Headless
    }

    fn compile_shader(
        &self,
        descriptor: &ShaderModuleDescriptor<'_>,
    ) -> Result<ShaderModuleId, ShaderError> {
        if self.timeline.is_lost() {
            return Err(ShaderError::CompilationError {
                label: descriptor.label.to_string(),
                details: "device lost".to_string(),
            });
        }
        if !self.config.shader_compile_latency.is_zero() {
            thread::sleep(self.config.shader_compile_latency);
        }
        if let Err(e) = compiler::check(descriptor) {
            self.counters.shader_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        let id = self.generate_shader_id();
        lock(&self.shaders).insert(
            id,
            ShaderEntry {
                label: descriptor.label.to_string(),
                stage: descriptor.stage,
                input_layout: descriptor.input_layout.cloned(),
            },
        );
        self.counters.shaders_compiled.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "HeadlessDevice: compiled {} stage of '{}' as {id:?}",
            descriptor.stage,
            descriptor.label
        );
        Ok(id)
    }

    fn destroy_shader(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        match lock(&self.shaders).remove(&id) {
            Some(entry) => {
                log::trace!("HeadlessDevice: destroyed shader '{}' ({id:?})", entry.label);
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
        {
            let shaders = lock(&self.shaders);
            if let Some(id) = descriptor.compute_shader {
                Self::check_stage(&shaders, id, ShaderStage::Compute, descriptor)?;
            }
            if let Some(id) = descriptor.pixel_shader {
                Self::check_stage(&shaders, id, ShaderStage::Pixel, descriptor)?;
            }
            if let Some(id) = descriptor.vertex_shader {
                Self::check_stage(&shaders, id, ShaderStage::Vertex, descriptor)?;
                let compiled = shaders.get(&id).and_then(|e| e.input_layout.as_ref());
                if let (Some(compiled), Some(requested)) = (compiled, &descriptor.input_layout) {
                    if compiled.signature() != requested.signature() {
                        return Err(PipelineError::IncompatibleInputLayout {
                            vertex_shader: id,
                            details: format!(
                                "compiled for {:?}, pipeline declares {:?}",
                                compiled.signature(),
                                requested.signature()
                            ),
                        });
                    }
                }
            }
        }

        if !self.config.pipeline_build_latency.is_zero() {
            thread::sleep(self.config.pipeline_build_latency);
        }

        let id = self.generate_pipeline_id();
        let label = descriptor.label();
        log::debug!("HeadlessDevice: created pipeline '{label}' ({id:?})");
        lock(&self.pipelines).insert(
            id,
            PipelineEntry {
                label,
                kind: descriptor.kind(),
            },
        );
        self.counters.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn destroy_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        match lock(&self.pipelines).remove(&id) {
            Some(entry) => {
                log::trace!(
                    "HeadlessDevice: destroyed {:?} pipeline '{}' ({id:?})",
                    entry.kind,
                    entry.label
                );
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
        if self.timeline.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        Ok(Box::new(HeadlessCommandBuffer {
            label: label.to_string(),
            commands: Vec::new(),
        }))
    }

    fn submit(&self, buffer: Box<dyn NativeCommandBuffer>) -> Result<FenceId, DeviceError> {
        let buffer = buffer
            .into_any()
            .downcast::<HeadlessCommandBuffer>()
            .map_err(|_| DeviceError::InvalidCommandBuffer)?;
        let queue = lock(&self.queue);
        let Some(tx) = queue.as_ref() else {
            return Err(DeviceError::SubmissionFailed(
                "GPU thread has stopped".to_string(),
            ));
        };

        let fence = self.timeline.issue()?;
        let job = GpuJob {
            fence,
            label: buffer.label,
            commands: buffer.commands,
        };
        if tx.send(job).is_err() {
            self.timeline.revoke(fence);
            return Err(DeviceError::SubmissionFailed(
                "GPU thread has stopped".to_string(),
            ));
        }
        self.counters.submissions.fetch_add(1, Ordering::Relaxed);
        Ok(fence)
    }

    fn is_fence_signaled(&self, fence: FenceId) -> Result<bool, DeviceError> {
        self.timeline.is_signaled(fence)
    }

    fn wait_for_fence(&self, fence: FenceId, timeout: Duration) -> Result<(), DeviceError> {
        self.timeline.wait(fence, timeout)
    }

    fn wait_idle(&self, timeout: Duration) -> Result<(), DeviceError> {
        if self.timeline.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        let last = self.timeline.issued();
        if last.0 == 0 {
            return Ok(());
        }
        self.timeline.wait(last, timeout).map_err(|e| match e {
            DeviceError::Timeout { waited, .. } => DeviceError::Timeout {
                fence: None,
                waited,
            },
            other => other,
        })
    }

    fn present(&self) -> Result<u64, DeviceError> {
        if self.timeline.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        Ok(self.frame.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn current_frame_index(&self) -> u64 {
        self.frame.load(Ordering::SeqCst)
    }
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        self.resume();
        // Closing the channel ends the GPU thread once the queue is drained.
        lock(&self.queue).take();
        if let Some(worker) = lock(&self.worker).take() {
            if worker.join().is_err() {
                log::warn!("Headless GPU thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::{InputLayoutSignature, TextureFormat};

    fn compile(
        device: &HeadlessDevice,
        stage: ShaderStage,
        source: &str,
        layout: Option<&InputLayout>,
    ) -> Result<ShaderModuleId, ShaderError> {
        device.compile_shader(&ShaderModuleDescriptor {
            label: "test",
            source,
            stage,
            entry_point: stage.entry_point(),
            input_layout: layout,
        })
    }

    #[test]
    fn pipeline_rejects_a_module_of_the_wrong_stage() {
        let device = HeadlessDevice::instant().unwrap();
        let layout = InputLayout::from_signature(InputLayoutSignature::POSITION).unwrap();
        let vs = compile(&device, ShaderStage::Vertex, "fn vs_main() {}", Some(&layout)).unwrap();

        let descriptor = PipelineStateDescriptor::builder()
            .vertex_shader(vs)
            .pixel_shader(vs)
            .input_layout(layout)
            .render_target(TextureFormat::Rgba8Unorm)
            .build()
            .unwrap();

        assert!(matches!(
            device.create_pipeline(&descriptor),
            Err(PipelineError::InvalidShaderModuleForPipeline { .. })
        ));
    }

    #[test]
    fn pipeline_rejects_a_mismatched_input_layout() {
        let device = HeadlessDevice::instant().unwrap();
        let compiled = InputLayout::from_signature(InputLayoutSignature::POSITION).unwrap();
        let vs = compile(&device, ShaderStage::Vertex, "fn vs_main() {}", Some(&compiled)).unwrap();

        let descriptor = PipelineStateDescriptor::builder()
            .vertex_shader(vs)
            .input_layout(
                InputLayout::from_signature(InputLayoutSignature::POSITION_COLOR).unwrap(),
            )
            .build()
            .unwrap();

        assert!(matches!(
            device.create_pipeline(&descriptor),
            Err(PipelineError::IncompatibleInputLayout { .. })
        ));
    }

    #[test]
    fn paused_gpu_leaves_fences_pending() {
        let device = HeadlessDevice::instant().unwrap();
        device.pause();

        let buffer = device.allocate_command_buffer("paused").unwrap();
        let fence = device.submit(buffer).unwrap();
        assert!(!device.is_fence_signaled(fence).unwrap());
        assert!(matches!(
            device.wait_idle(Duration::from_millis(10)),
            Err(DeviceError::Timeout { fence: None, .. })
        ));

        device.resume();
        device.wait_for_fence(fence, Duration::from_secs(5)).unwrap();
        assert_eq!(device.completed_fence(), fence);
        assert_eq!(device.stats().submissions, 1);
    }

    #[test]
    fn lost_device_refuses_new_work() {
        let device = HeadlessDevice::instant().unwrap();
        device.simulate_device_lost();

        assert!(matches!(
            device.allocate_command_buffer("late"),
            Err(DeviceError::DeviceLost)
        ));
        assert!(matches!(device.present(), Err(DeviceError::DeviceLost)));
        assert!(compile(&device, ShaderStage::Compute, "fn cs_main() {}", None).is_err());
    }

    #[test]
    fn destroyed_objects_are_not_found_twice() {
        let device = HeadlessDevice::instant().unwrap();
        let cs = compile(&device, ShaderStage::Compute, "fn cs_main() {}", None).unwrap();

        device.destroy_shader(cs).unwrap();

        assert!(matches!(
            device.destroy_shader(cs),
            Err(ResourceError::Shader(ShaderError::NotFound { .. }))
        ));
        assert_eq!(device.live_shaders(), 0);
    }
}
