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

//! The recorded command stream and the command list's state enum.

pub mod stream;
pub mod types;

pub use self::stream::*;
pub use self::types::*;

use std::fmt;

/// The recording state of a [`CommandList`](crate::renderer::CommandList).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandListState {
    /// Ready to start a recording.
    #[default]
    Idle,
    /// Submitted; waiting for the GPU to signal before the list can be reused.
    IdleSyncCpuToGpu,
    /// Between `begin` and `end`; state setters and draws are accepted.
    Recording,
    /// Recording closed; ready for `submit`.
    Ended,
}

impl fmt::Display for CommandListState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandListState::Idle => "Idle",
            CommandListState::IdleSyncCpuToGpu => "Idle_Sync_Cpu_To_Gpu",
            CommandListState::Recording => "Recording",
            CommandListState::Ended => "Ended",
        };
        f.write_str(name)
    }
}
