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

//! In-crate test doubles for the device and scheduler traits.

use crate::renderer::api::*;
use crate::renderer::error::{DeviceError, PipelineError, ResourceError, ShaderError};
use crate::renderer::traits::{
    NativeCommandBuffer, PassProfiler, RhiDevice, ScopeToken, Task, TaskScheduler,
};
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const VS_PS_SOURCE: &str = "fn vs_main() { }\nfn fs_main() { }";
pub(crate) const CS_SOURCE: &str = "fn cs_main() { }";

#[derive(Debug)]
pub(crate) struct FakeCommandBuffer {
    label: String,
    pub(crate) commands: Vec<RenderCommand>,
}

impl NativeCommandBuffer for FakeCommandBuffer {
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

/// A device that "compiles" by looking for entry points and completes GPU
/// work whenever the CPU waits for it.
#[derive(Debug, Default)]
pub(crate) struct FakeDevice {
    next_id: AtomicUsize,
    shaders: Mutex<HashSet<ShaderModuleId>>,
    pipelines: Mutex<HashSet<RenderPipelineId>>,
    compiles: AtomicUsize,
    pipeline_builds: AtomicUsize,
    build_delay_ms: AtomicU64,
    pub(crate) fail_builds: AtomicBool,
    pub(crate) fail_submit: AtomicBool,
    pub(crate) hang: AtomicBool,
    pub(crate) lost: AtomicBool,
    issued_fence: AtomicU64,
    signaled_fence: AtomicU64,
    frame: AtomicU64,
    pub(crate) submitted: Mutex<Vec<Vec<RenderCommand>>>,
}

/// Routes the crate's `log` output to the test harness. Safe to call from
/// every test; only the first call installs the logger.
pub(crate) fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

impl FakeDevice {
    pub(crate) fn new() -> Arc<Self> {
        init_test_logger();
        Arc::new(Self::default())
    }

    pub(crate) fn with_build_delay(delay: Duration) -> Arc<Self> {
        init_test_logger();
        let device = Self::default();
        device
            .build_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        Arc::new(device)
    }

    pub(crate) fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub(crate) fn pipeline_builds(&self) -> usize {
        self.pipeline_builds.load(Ordering::SeqCst)
    }

    pub(crate) fn live_shaders(&self) -> usize {
        self.shaders.lock().unwrap().len()
    }

    pub(crate) fn live_pipelines(&self) -> usize {
        self.pipelines.lock().unwrap().len()
    }

    pub(crate) fn signal_all(&self) {
        let issued = self.issued_fence.load(Ordering::SeqCst);
        self.signaled_fence.fetch_max(issued, Ordering::SeqCst);
    }

    pub(crate) fn last_submission(&self) -> Vec<RenderCommand> {
        self.submitted
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn complete_up_to(&self, fence: u64) -> Result<(), DeviceError> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(DeviceError::DeviceLost);
        }
        if self.hang.load(Ordering::SeqCst) {
            return Err(DeviceError::Timeout {
                fence: Some(FenceId(fence)),
                waited: Duration::ZERO,
            });
        }
        self.signaled_fence.fetch_max(fence, Ordering::SeqCst);
        Ok(())
    }
}

impl RhiDevice for FakeDevice {
    fn backend_type(&self) -> GraphicsBackendType {
        GraphicsBackendType::Headless
    }

    fn compile_shader(
        &self,
        descriptor: &ShaderModuleDescriptor<'_>,
    ) -> Result<ShaderModuleId, ShaderError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if descriptor.source.contains("#error") {
            return Err(ShaderError::CompilationError {
                label: descriptor.label.to_string(),
                details: "#error directive".to_string(),
            });
        }
        if !descriptor
            .source
            .contains(&format!("fn {}", descriptor.entry_point))
        {
            return Err(ShaderError::MissingEntryPoint {
                label: descriptor.label.to_string(),
                stage: descriptor.stage,
                entry_point: descriptor.entry_point.to_string(),
            });
        }
        let id = ShaderModuleId(self.next_id());
        self.shaders.lock().unwrap().insert(id);
        Ok(id)
    }

    fn destroy_shader(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        if self.shaders.lock().unwrap().remove(&id) {
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    fn create_pipeline(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<RenderPipelineId, PipelineError> {
        {
            let shaders = self.shaders.lock().unwrap();
            for id in [
                descriptor.vertex_shader,
                descriptor.pixel_shader,
                descriptor.compute_shader,
            ]
            .into_iter()
            .flatten()
            {
                if !shaders.contains(&id) {
                    return Err(PipelineError::InvalidShaderModuleForPipeline {
                        id,
                        pipeline_label: Some(descriptor.label()),
                    });
                }
            }
        }
        let delay = self.build_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail_builds.load(Ordering::SeqCst) {
            return Err(PipelineError::CompilationFailed {
                label: Some(descriptor.label()),
                details: "rejected by test".to_string(),
            });
        }
        self.pipeline_builds.fetch_add(1, Ordering::SeqCst);
        let id = RenderPipelineId(self.next_id());
        self.pipelines.lock().unwrap().insert(id);
        Ok(id)
    }

    fn destroy_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        if self.pipelines.lock().unwrap().remove(&id) {
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    fn allocate_command_buffer(
        &self,
        label: &str,
    ) -> Result<Box<dyn NativeCommandBuffer>, DeviceError> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(DeviceError::DeviceLost);
        }
        Ok(Box::new(FakeCommandBuffer {
            label: label.to_string(),
            commands: Vec::new(),
        }))
    }

    fn submit(&self, buffer: Box<dyn NativeCommandBuffer>) -> Result<FenceId, DeviceError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(DeviceError::SubmissionFailed("rejected by test".to_string()));
        }
        let buffer = buffer
            .into_any()
            .downcast::<FakeCommandBuffer>()
            .map_err(|_| DeviceError::InvalidCommandBuffer)?;
        self.submitted.lock().unwrap().push(buffer.commands);
        Ok(FenceId(self.issued_fence.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn is_fence_signaled(&self, fence: FenceId) -> Result<bool, DeviceError> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(DeviceError::DeviceLost);
        }
        Ok(fence.0 <= self.signaled_fence.load(Ordering::SeqCst))
    }

    fn wait_for_fence(&self, fence: FenceId, _timeout: Duration) -> Result<(), DeviceError> {
        self.complete_up_to(fence.0)
    }

    fn wait_idle(&self, _timeout: Duration) -> Result<(), DeviceError> {
        self.complete_up_to(self.issued_fence.load(Ordering::SeqCst))
    }

    fn present(&self) -> Result<u64, DeviceError> {
        Ok(self.frame.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn current_frame_index(&self) -> u64 {
        self.frame.load(Ordering::SeqCst)
    }
}

/// Runs every task immediately on the calling thread.
pub(crate) struct InlineScheduler;

impl TaskScheduler for InlineScheduler {
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Holds tasks until the test drains them.
#[derive(Default)]
pub(crate) struct QueuedScheduler {
    tasks: Mutex<Vec<Task>>,
}

impl QueuedScheduler {
    pub(crate) fn run_all(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            task();
        }
    }
}

impl TaskScheduler for QueuedScheduler {
    fn schedule(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }
}

/// Records scope names as they open and close.
#[derive(Debug, Default)]
pub(crate) struct RecordingProfiler {
    next: AtomicU64,
    pub(crate) events: Mutex<Vec<String>>,
}

impl PassProfiler for RecordingProfiler {
    fn begin_scope(&self, name: &str) -> ScopeToken {
        self.events.lock().unwrap().push(format!("begin:{name}"));
        ScopeToken(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn end_scope(&self, token: ScopeToken) {
        self.events.lock().unwrap().push(format!("end:{}", token.0));
    }
}
