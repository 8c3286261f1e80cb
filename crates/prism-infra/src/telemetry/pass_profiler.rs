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

//! CPU-side timing of command list marker scopes.

use prism_core::renderer::{PassProfiler, ScopeToken};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One closed scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeTiming {
    /// The marker name.
    pub name: String,
    /// Time between `begin_scope` and `end_scope`.
    pub duration: Duration,
}

/// Smoothed timing of every scope seen under one name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScopeSummary {
    /// Number of closed scopes.
    pub count: u64,
    /// The most recent duration in milliseconds.
    pub last_ms: f32,
    /// Exponential moving average in milliseconds.
    pub smoothed_ms: f32,
}

#[derive(Debug, Default)]
struct ProfilerState {
    open: HashMap<ScopeToken, (String, Instant)>,
    completed: Vec<ScopeTiming>,
    summaries: HashMap<String, ScopeSummary>,
}

/// Measures how long each marker scope stays open on the recording thread.
///
/// This is recording time, not GPU execution time. Scopes from several
/// command lists may interleave; tokens keep them apart.
#[derive(Debug)]
pub struct CpuPassProfiler {
    next_token: AtomicU64,
    ema_alpha: f32,
    state: Mutex<ProfilerState>,
}

impl Default for CpuPassProfiler {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl CpuPassProfiler {
    /// Creates a profiler smoothing with factor `ema_alpha` (clamped to `0.0..=1.0`).
    pub fn new(ema_alpha: f32) -> Self {
        Self {
            next_token: AtomicU64::new(0),
            ema_alpha: ema_alpha.clamp(0.0, 1.0),
            state: Mutex::new(ProfilerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProfilerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Removes and returns the scopes closed since the last call.
    pub fn drain_completed(&self) -> Vec<ScopeTiming> {
        std::mem::take(&mut self.lock().completed)
    }

    /// The summary for scopes named `name`.
    pub fn summary(&self, name: &str) -> Option<ScopeSummary> {
        self.lock().summaries.get(name).copied()
    }

    /// The number of scopes opened and not yet closed.
    pub fn open_scopes(&self) -> usize {
        self.lock().open.len()
    }
}

impl PassProfiler for CpuPassProfiler {
    fn begin_scope(&self, name: &str) -> ScopeToken {
        let token = ScopeToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .open
            .insert(token, (name.to_string(), Instant::now()));
        token
    }

    fn end_scope(&self, token: ScopeToken) {
        let mut state = self.lock();
        let Some((name, started)) = state.open.remove(&token) else {
            log::warn!("CpuPassProfiler: end_scope for unknown {token:?}");
            return;
        };
        let duration = started.elapsed();
        let ms = duration.as_secs_f32() * 1000.0;
        let alpha = self.ema_alpha;
        state
            .summaries
            .entry(name.clone())
            .and_modify(|s| {
                s.count += 1;
                s.last_ms = ms;
                s.smoothed_ms = alpha * ms + (1.0 - alpha) * s.smoothed_ms;
            })
            .or_insert(ScopeSummary {
                count: 1,
                last_ms: ms,
                smoothed_ms: ms,
            });
        log::trace!("Pass '{name}' recorded in {ms:.3} ms");
        state.completed.push(ScopeTiming { name, duration });
    }
}
