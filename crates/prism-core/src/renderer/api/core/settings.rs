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

//! Global settings for the RHI.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by the pipeline cache, the command lists and the schedulers.
///
/// Every field has a default, so a JSON document only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhiSettings {
    /// The number of command lists a [`FrameCommandLists`](crate::renderer::FrameCommandLists) rotates through.
    pub max_frames_in_flight: usize,
    /// Upper bound in milliseconds for fence and flush waits.
    pub gpu_wait_timeout_ms: u64,
    /// Frames an unreferenced pipeline stays cached before eviction.
    pub pipeline_eviction_frames: u64,
    /// Number of threads in the background shader compile pool.
    pub compile_worker_threads: usize,
    /// If `true`, re-binding an identical value is not re-encoded.
    pub skip_redundant_bindings: bool,
}

impl Default for RhiSettings {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            gpu_wait_timeout_ms: 5000,
            pipeline_eviction_frames: 240,
            compile_worker_threads: 2,
            skip_redundant_bindings: true,
        }
    }
}

impl RhiSettings {
    /// Parses settings from a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let settings: RhiSettings = serde_json::from_str(json)?;
        Ok(settings.sanitized())
    }

    /// The fence wait bound as a [`Duration`].
    pub fn gpu_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.gpu_wait_timeout_ms)
    }

    /// Clamps counts that must be at least one.
    pub fn sanitized(mut self) -> Self {
        if self.max_frames_in_flight == 0 {
            log::warn!("RhiSettings: max_frames_in_flight was 0, using 1");
            self.max_frames_in_flight = 1;
        }
        if self.compile_worker_threads == 0 {
            log::warn!("RhiSettings: compile_worker_threads was 0, using 1");
            self.compile_worker_threads = 1;
        }
        self
    }
}
