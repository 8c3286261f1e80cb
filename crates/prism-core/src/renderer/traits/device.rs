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

use crate::renderer::api::*;
use crate::renderer::error::{DeviceError, PipelineError, ResourceError, ShaderError};
use crate::renderer::traits::NativeCommandBuffer;
use std::fmt::Debug;
use std::time::Duration;

/// The device and swap chain a command list records for.
///
/// Implementations must be shareable across threads: command lists on
/// several threads allocate buffers and submit concurrently, and the
/// pipeline cache builds pipelines from whichever thread missed first.
pub trait RhiDevice: Send + Sync + Debug + 'static {
    /// The graphics API behind this device.
    fn backend_type(&self) -> GraphicsBackendType;

    /// Compiles one shader stage.
    /// ## Errors
    /// * `ShaderError::CompilationError` - If the backend rejects the source.
    /// * `ShaderError::MissingEntryPoint` - If the stage's entry point is absent.
    fn compile_shader(
        &self,
        descriptor: &ShaderModuleDescriptor<'_>,
    ) -> Result<ShaderModuleId, ShaderError>;

    /// Releases a compiled shader stage.
    fn destroy_shader(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    /// Builds a native pipeline for a validated descriptor.
    /// ## Errors
    /// * `PipelineError::InvalidShaderModuleForPipeline` - If a stage ID is unknown.
    /// * `PipelineError::IncompatibleInputLayout` - If the layout differs from the vertex stage's.
    /// * `PipelineError::CompilationFailed` - If the backend rejects the state combination.
    fn create_pipeline(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<RenderPipelineId, PipelineError>;

    /// Releases a native pipeline.
    fn destroy_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError>;

    /// Allocates an empty native command buffer.
    fn allocate_command_buffer(
        &self,
        label: &str,
    ) -> Result<Box<dyn NativeCommandBuffer>, DeviceError>;

    /// Hands a recorded buffer to the queue and returns the fence that
    /// signals once the GPU has executed it.
    fn submit(&self, buffer: Box<dyn NativeCommandBuffer>) -> Result<FenceId, DeviceError>;

    /// Non-blocking fence query.
    fn is_fence_signaled(&self, fence: FenceId) -> Result<bool, DeviceError>;

    /// Blocks until `fence` signals or `timeout` elapses.
    fn wait_for_fence(&self, fence: FenceId, timeout: Duration) -> Result<(), DeviceError>;

    /// Blocks until every submitted buffer has executed or `timeout` elapses.
    fn wait_idle(&self, timeout: Duration) -> Result<(), DeviceError>;

    /// Presents the current frame and advances the frame counter.
    /// Returns the index of the frame that starts.
    fn present(&self) -> Result<u64, DeviceError>;

    /// The index of the frame currently being recorded.
    fn current_frame_index(&self) -> u64;
}
