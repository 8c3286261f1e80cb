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

//! The public, backend-agnostic recording contracts of Prism.
//!
//! The value types in [`api`] describe what a pass wants from the GPU. The
//! [`traits`] are what a backend in `prism-infra` implements. On top of those
//! sit the three pieces of recording logic:
//!
//! - [`ShaderUnit`]: source to native shader stages, synchronously or on a
//!   [`TaskScheduler`].
//! - [`PipelineCache`]: one native pipeline per distinct
//!   [`PipelineStateDescriptor`], shared across threads.
//! - [`CommandList`]: the recording state machine handing native command
//!   buffers to an [`RhiDevice`].

pub mod api;
pub mod command_list;
pub mod error;
pub mod pipeline_cache;
pub mod shader_unit;
pub mod traits;

pub use self::api::*;
pub use self::command_list::{CommandList, FrameCommandLists};
pub use self::error::{CommandListError, DeviceError, PipelineError, ResourceError, ShaderError};
pub use self::pipeline_cache::{CachedPipeline, PipelineCache};
pub use self::shader_unit::ShaderUnit;
pub use self::traits::{
    NativeCommandBuffer, PassProfiler, RhiDevice, ScopeToken, Task, TaskScheduler,
};
