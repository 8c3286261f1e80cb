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

//! # Prism Infra
//!
//! Concrete implementations of the `prism-core` contracts:
//!
//! - [`graphics::headless::HeadlessDevice`]: a deterministic device with a
//!   simulated GPU timeline, used by tests and tools without a GPU.
//! - `graphics::wgpu::WgpuDevice` (feature `wgpu`): the real backend.
//! - [`scheduler`]: a thread pool and a tokio adapter for [`TaskScheduler`](prism_core::renderer::TaskScheduler).
//! - [`telemetry::CpuPassProfiler`]: wall-clock timings of marker scopes.

#![warn(missing_docs)]

pub mod graphics;
pub mod scheduler;
pub mod telemetry;

pub use graphics::headless::{HeadlessDevice, HeadlessDeviceConfig};
pub use scheduler::{TokioScheduler, WorkerPool};
pub use telemetry::CpuPassProfiler;

/// Installs an `env_logger` logger filtered by `RUST_LOG`, defaulting to `info`.
///
/// Does nothing if a logger is already installed.
pub fn init_logging() {
    use env_logger::{Builder, Env};

    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .try_init();
}
