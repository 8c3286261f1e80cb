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

//! Error types for every layer of the RHI.
//!
//! Shader and pipeline errors are plain values so they can be stored on a
//! shader unit or handed to every waiter of a shared pipeline build.

use crate::renderer::api::command::CommandListState;
use crate::renderer::api::core::{FenceId, RenderPipelineId, ShaderModuleId};
use crate::renderer::api::shader::ShaderStage;
use std::fmt;
use std::time::Duration;

/// Why a shader stage did not build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderError {
    /// The source file could not be read.
    LoadError {
        /// File path as given.
        path: String,
        /// The I/O error, rendered.
        source_error: String,
    },
    /// The backend compiler rejected the source.
    CompilationError {
        /// Shader label.
        label: String,
        /// Compiler output.
        details: String,
    },
    /// The source compiled, but the entry point required by the stage is absent.
    MissingEntryPoint {
        /// Shader label.
        label: String,
        /// Stage being compiled.
        stage: ShaderStage,
        /// Function name the stage looks for.
        entry_point: String,
    },
    /// A vertex stage was requested with an input layout that has no attributes.
    EmptyInputLayout {
        /// Shader label.
        label: String,
    },
    /// No live module has this id.
    NotFound {
        /// The missing module.
        id: ShaderModuleId,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::LoadError { path, source_error } => {
                write!(f, "Cannot read shader '{path}': {source_error}")
            }
            ShaderError::CompilationError { label, details } => {
                write!(f, "Shader '{label}' did not compile: {details}")
            }
            ShaderError::MissingEntryPoint {
                label,
                stage,
                entry_point,
            } => {
                write!(
                    f,
                    "Shader '{label}' has no entry point '{entry_point}' for the {stage} stage"
                )
            }
            ShaderError::EmptyInputLayout { label } => {
                write!(f, "Vertex shader '{label}' was given an empty input layout")
            }
            ShaderError::NotFound { id } => {
                write!(f, "No shader module {id:?}")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// Why a pipeline state could not be resolved to a native pipeline.
///
/// Cloneable so that every caller waiting on a shared build can receive the
/// same failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The descriptor does not name a usable combination of shader stages.
    IncompleteDescriptor(String),
    /// A stage id in the descriptor is not a live module of the right stage.
    InvalidShaderModuleForPipeline {
        /// The offending module.
        id: ShaderModuleId,
        /// Pipeline label, when known.
        pipeline_label: Option<String>,
    },
    /// The input layout does not match the one the vertex stage was compiled against.
    IncompatibleInputLayout {
        /// The vertex shader whose layout was violated.
        vertex_shader: ShaderModuleId,
        /// A human readable explanation.
        details: String,
    },
    /// The backend refused to build the pipeline.
    CompilationFailed {
        /// Pipeline label, when known.
        label: Option<String>,
        /// Backend message.
        details: String,
    },
    /// The pipeline id is not live on the device.
    InvalidRenderPipeline {
        /// The stale or unknown id.
        id: RenderPipelineId,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::IncompleteDescriptor(msg) => {
                write!(f, "Incomplete pipeline descriptor: {msg}")
            }
            PipelineError::InvalidShaderModuleForPipeline { id, pipeline_label } => {
                let label = pipeline_label.as_deref().unwrap_or("<unnamed>");
                write!(f, "Pipeline '{label}' references unusable shader module {id:?}")
            }
            PipelineError::IncompatibleInputLayout {
                vertex_shader,
                details,
            } => {
                write!(
                    f,
                    "Input layout incompatible with vertex shader {vertex_shader:?}: {details}"
                )
            }
            PipelineError::CompilationFailed { label, details } => {
                let label = label.as_deref().unwrap_or("<unnamed>");
                write!(f, "Pipeline '{label}' failed to build: {details}")
            }
            PipelineError::InvalidRenderPipeline { id } => {
                write!(f, "No live pipeline {id:?}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Failure to create, look up or release a device object.
#[derive(Debug)]
pub enum ResourceError {
    /// Wraps a [`ShaderError`].
    Shader(ShaderError),
    /// Wraps a [`PipelineError`].
    Pipeline(PipelineError),
    /// The id is not registered.
    NotFound,
    /// The id was released or belongs to another device.
    InvalidHandle,
    /// Backend-specific failure.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "shader: {err}"),
            ResourceError::Pipeline(err) => write!(f, "pipeline: {err}"),
            ResourceError::NotFound => write!(f, "No resource registered under this id"),
            ResourceError::InvalidHandle => write!(f, "Stale or foreign resource handle"),
            ResourceError::BackendError(msg) => write!(f, "Backend: {msg}"),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// An error reported by the device while submitting or synchronizing work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The queue refused the command buffer.
    SubmissionFailed(String),
    /// A wait on the GPU did not complete within the allotted time.
    Timeout {
        /// The fence being waited on, or `None` for a device-wide wait.
        fence: Option<FenceId>,
        /// How long the caller waited.
        waited: Duration,
    },
    /// The graphics device was lost (driver reset, GPU removed).
    /// Every object created from it must be recreated.
    DeviceLost,
    /// The command buffer handed to the device was not created by it.
    InvalidCommandBuffer,
    /// The fence ID was never issued by this device.
    UnknownFence(FenceId),
    /// Backend-specific failure.
    Backend(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::SubmissionFailed(msg) => write!(f, "Command submission failed: {msg}"),
            DeviceError::Timeout {
                fence: Some(fence),
                waited,
            } => {
                write!(f, "Timed out after {waited:?} waiting for {fence:?}")
            }
            DeviceError::Timeout {
                fence: None,
                waited,
            } => {
                write!(f, "Timed out after {waited:?} waiting for the device to idle")
            }
            DeviceError::DeviceLost => write!(f, "Device lost"),
            DeviceError::InvalidCommandBuffer => {
                write!(f, "The command buffer does not belong to this device.")
            }
            DeviceError::UnknownFence(fence) => write!(f, "Unknown fence: {fence:?}"),
            DeviceError::Backend(msg) => write!(f, "Backend device error: {msg}"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// An error returned by a [`CommandList`](crate::renderer::CommandList) operation.
#[derive(Debug)]
pub enum CommandListError {
    /// An operation was invoked in a state that does not allow it.
    /// The current recording is poisoned and can no longer be submitted.
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the list was in.
        state: CommandListState,
    },
    /// `submit` was called while marker scopes were still open.
    UnbalancedMarkers {
        /// The number of scopes left open.
        open: usize,
    },
    /// `end_marker` was called with no open marker scope.
    MarkerUnderflow,
    /// The recording was poisoned by an earlier contract violation.
    Poisoned {
        /// The operation that poisoned the recording.
        cause: &'static str,
    },
    /// A shader unit was bound before it reached the `Built` state.
    ShaderNotReady {
        /// The label of the shader unit.
        label: String,
        /// The stage that was requested.
        stage: ShaderStage,
    },
    /// A binding slot is beyond the supported range.
    InvalidSlot {
        /// The kind of binding.
        kind: &'static str,
        /// The requested slot.
        slot: u32,
        /// The number of available slots.
        max: u32,
    },
    /// A draw was issued without a bound vertex buffer.
    MissingVertexBuffer,
    /// An indexed draw was issued without a bound index buffer.
    MissingIndexBuffer,
    /// A draw was issued before any pipeline was resolved.
    PipelineNotResolved,
    /// A draw was issued against a compute pipeline, or a dispatch against a graphics one.
    WrongPipelineKind {
        /// The operation that was attempted.
        operation: &'static str,
    },
    /// A draw would read past the end of the bound buffer.
    DrawOutOfRange {
        /// The first element the draw reads.
        first: u32,
        /// The number of elements the draw reads.
        count: u32,
        /// The number of elements available.
        available: u32,
    },
    /// A clear or render-target bind used a view of the wrong kind.
    InvalidTarget(&'static str),
    /// Resolving the pipeline state failed.
    Pipeline(PipelineError),
    /// The device rejected an operation.
    Device(DeviceError),
}

impl CommandListError {
    /// Returns `true` if the error is an ordering violation of the recording contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            CommandListError::InvalidState { .. }
                | CommandListError::Poisoned { .. }
                | CommandListError::MarkerUnderflow
                | CommandListError::UnbalancedMarkers { .. }
        )
    }
}

impl fmt::Display for CommandListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandListError::InvalidState { operation, state } => {
                write!(f, "'{operation}' is not allowed in state {state}")
            }
            CommandListError::UnbalancedMarkers { open } => {
                write!(f, "{open} marker scope(s) still open at submit")
            }
            CommandListError::MarkerUnderflow => write!(f, "No marker scope to close"),
            CommandListError::Poisoned { cause } => {
                write!(f, "Recording was invalidated by a misplaced '{cause}'")
            }
            CommandListError::ShaderNotReady { label, stage } => {
                write!(f, "Shader '{label}' is not built for the {stage} stage")
            }
            CommandListError::InvalidSlot { kind, slot, max } => {
                write!(f, "{kind} slot {slot} is out of range (max {max})")
            }
            CommandListError::MissingVertexBuffer => write!(f, "No vertex buffer bound"),
            CommandListError::MissingIndexBuffer => write!(f, "No index buffer bound"),
            CommandListError::PipelineNotResolved => write!(f, "No pipeline resolved"),
            CommandListError::WrongPipelineKind { operation } => {
                write!(f, "'{operation}' does not match the bound pipeline kind")
            }
            CommandListError::DrawOutOfRange {
                first,
                count,
                available,
            } => {
                write!(
                    f,
                    "Draw reads elements {first}..{} but only {available} are bound",
                    *first as u64 + *count as u64
                )
            }
            CommandListError::InvalidTarget(reason) => write!(f, "Invalid target: {reason}"),
            CommandListError::Pipeline(err) => write!(f, "Pipeline resolution failed: {err}"),
            CommandListError::Device(err) => write!(f, "Device error: {err}"),
        }
    }
}

impl std::error::Error for CommandListError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandListError::Pipeline(err) => Some(err),
            CommandListError::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PipelineError> for CommandListError {
    fn from(err: PipelineError) -> Self {
        CommandListError::Pipeline(err)
    }
}

impl From<DeviceError> for CommandListError {
    fn from(err: DeviceError) -> Self {
        CommandListError::Device(err)
    }
}
