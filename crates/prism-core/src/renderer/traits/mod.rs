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

//! Defines the contracts a backend implements.
//!
//! - [`RhiDevice`]: compiles shaders, builds pipelines, owns the queue and the frame timeline.
//! - [`NativeCommandBuffer`]: receives the validated command stream of one recording.
//! - [`TaskScheduler`]: runs background work such as asynchronous shader compilation.
//! - [`PassProfiler`]: observes the marker scopes opened by command lists.

mod command_buffer;
mod device;
mod profiler;
mod scheduler;

pub use self::command_buffer::NativeCommandBuffer;
pub use self::device::RhiDevice;
pub use self::profiler::{PassProfiler, ScopeToken};
pub use self::scheduler::{Task, TaskScheduler};
