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

//! Backend-agnostic RHI value types.
//!
//! Organized into several logical sub-modules:
//!
//! - **[`core`]**: Opaque IDs, settings, statistics and binding limits.
//! - **[`shader`]**: Shader stages, sources and compilation states.
//! - **[`pipeline`]**: Fixed-function state, input layouts and the pipeline descriptor.
//! - **[`command`]**: The recorded command stream and the list state enum.
//! - **[`resource`]**: Non-owning handles to buffers, textures and samplers.
//! - **[`util`]**: Formats and backend enums.

pub mod command;
pub mod core;
pub mod pipeline;
pub mod resource;
pub mod shader;
pub mod util;

pub use self::command::*;
pub use self::core::*;
pub use self::pipeline::*;
pub use self::resource::*;
pub use self::shader::*;
pub use self::util::*;
