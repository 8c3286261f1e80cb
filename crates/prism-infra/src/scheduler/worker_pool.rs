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

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use prism_core::renderer::{RhiSettings, Task, TaskScheduler};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use std::thread;

/// A fixed set of threads draining a shared task queue.
///
/// Tasks scheduled after [`shutdown`](Self::shutdown) run inline on the
/// caller's thread. A panicking task is logged and does not take its worker
/// down.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("threads", &self.threads())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WorkerPool {
    /// Starts `threads` workers (at least one) named `"{name}-{index}"`.
    pub fn new(name: &str, threads: usize) -> anyhow::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<Task>();
        let workers = (0..threads.max(1))
            .map(|index| {
                let rx = rx.clone();
                let thread_name = format!("{name}-{index}");
                thread::Builder::new()
                    .name(thread_name.clone())
                    .spawn(move || run_worker(&thread_name, rx))
                    .with_context(|| format!("Failed to spawn worker '{name}-{index}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        log::info!("Worker pool '{name}' started with {} thread(s)", workers.len());
        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    /// The shader compile pool sized by `compile_worker_threads`.
    pub fn for_shader_compilation(settings: &RhiSettings) -> anyhow::Result<Self> {
        Self::new("prism-compile", settings.compile_worker_threads)
    }

    /// The number of running workers.
    pub fn threads(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Lets the workers finish the queued tasks, then joins them.
    pub fn shutdown(&self) {
        lock(&self.sender).take();
        let workers = std::mem::take(&mut *lock(&self.workers));
        if workers.is_empty() {
            return;
        }
        for worker in workers {
            if worker.join().is_err() {
                log::warn!("Worker pool '{}': a worker thread panicked", self.name);
            }
        }
        log::info!("Worker pool '{}' stopped", self.name);
    }
}

fn run_worker(name: &str, rx: Receiver<Task>) {
    log::debug!("Worker '{name}' started.");
    for task in rx.iter() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            log::error!("Worker '{name}': task panicked");
        }
    }
    log::debug!("Worker '{name}' stopped.");
}

impl TaskScheduler for WorkerPool {
    fn schedule(&self, task: Task) {
        let rejected = match lock(&self.sender).as_ref() {
            Some(tx) => tx.send(task).err().map(|e| e.into_inner()),
            None => Some(task),
        };
        if let Some(task) = rejected {
            log::debug!("Worker pool '{}' is shut down, running task inline", self.name);
            task();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
