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

use prism_core::renderer::{Task, TaskScheduler};
use tokio::runtime::Handle;

/// Runs tasks on a tokio runtime's blocking pool.
///
/// Shader compilation is CPU-bound, so tasks go through `spawn_blocking`
/// rather than onto the async workers. The runtime must outlive every task
/// scheduled on it.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Schedules onto the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedules onto the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        // The join handle is not needed; completion is observed through the task's own state.
        drop(self.handle.spawn_blocking(task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn current_is_none_outside_a_runtime() {
        assert!(TokioScheduler::current().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tasks_run_on_the_blocking_pool() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = mpsc::channel();

        scheduler.schedule(Box::new(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));

        let ran_on = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(ran_on, std::thread::current().id());
    }
}
