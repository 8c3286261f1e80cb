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

//! IDs, settings, statistics and binding limits.

/// The number of constant buffer slots per shader scope.
pub const MAX_CONSTANT_BUFFER_SLOTS: u32 = 14;
/// The number of sampler slots.
pub const MAX_SAMPLER_SLOTS: u32 = 16;
/// The number of texture slots.
pub const MAX_TEXTURE_SLOTS: u32 = 32;
/// The maximum number of simultaneously bound color render targets.
pub const MAX_RENDER_TARGETS: usize = 8;

pub mod ids;
pub mod settings;
pub mod stats;

pub use self::ids::*;
pub use self::settings::*;
pub use self::stats::*;
