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

//! Counters reported by the pipeline cache and the command lists.

/// A snapshot of the pipeline cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    /// Resolves that found an existing pipeline.
    pub hits: u64,
    /// Resolves that had to build (or wait for) a pipeline.
    pub misses: u64,
    /// Native pipelines created.
    pub builds: u64,
    /// Builds the backend rejected.
    pub failures: u64,
    /// Entries dropped by frame-based eviction.
    pub evictions: u64,
    /// Entries currently held.
    pub live_entries: usize,
}

/// Counters for a single recording of a [`CommandList`](crate::renderer::CommandList).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandListStats {
    /// Commands encoded into the native buffer.
    pub commands_encoded: u32,
    /// Non-indexed and indexed draws.
    pub draw_calls: u32,
    /// Compute dispatches.
    pub dispatches: u32,
    /// Pipeline binds that changed the active pipeline.
    pub pipeline_switches: u32,
    /// Bindings dropped because the same value was already bound.
    pub redundant_bindings_skipped: u32,
}
