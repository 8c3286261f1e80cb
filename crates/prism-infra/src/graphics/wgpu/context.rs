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

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use wgpu::Features;

/// Features turned on when the adapter has them.
fn optional_features() -> Features {
    Features::POLYGON_MODE_LINE | Features::DEPTH_CLIP_CONTROL
}

/// How [`WgpuContext::with_options`] picks its adapter.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Preference between integrated and discrete GPUs.
    pub power_preference: wgpu::PowerPreference,
    /// Ask for a software adapter, e.g. on CI machines without a GPU.
    pub force_fallback_adapter: bool,
    /// Debug label of the logical device.
    pub label: &'static str,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            label: "prism device",
        }
    }
}

/// The WGPU objects a [`WgpuDevice`](super::WgpuDevice) drives.
///
/// No surface is attached: render targets are views registered with the
/// device, so the context works the same with or without a window.
#[derive(Debug)]
pub struct WgpuContext {
    /// The logical device.
    pub device: wgpu::Device,
    /// The queue every submission goes to.
    pub queue: wgpu::Queue,
    /// The adapter the device was opened on.
    pub adapter: wgpu::AdapterInfo,
    /// Features enabled on the device.
    pub features: Features,
    lost: Arc<AtomicBool>,
    uncaptured_errors: Arc<AtomicUsize>,
}

impl WgpuContext {
    /// Opens a device on the default high-performance adapter.
    pub async fn new() -> Result<Self> {
        Self::with_options(ContextOptions::default()).await
    }

    /// Opens a device on the adapter selected by `options`.
    ///
    /// ## Returns
    /// * `Result<Self>` - The context, or an error if no adapter or device is available.
    pub async fn with_options(options: ContextOptions) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await
            .context("no graphics adapter matches the requested options")?;

        let info = adapter.get_info();
        log::info!("Opening '{}' on {:?} ({:?})", options.label, info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(options.label),
                required_features: adapter.features() & optional_features(),
                ..Default::default()
            })
            .await
            .with_context(|| format!("adapter '{}' refused to open a device", info.name))?;

        let label = options.label;
        let uncaptured_errors = Arc::new(AtomicUsize::new(0));
        let errors = Arc::clone(&uncaptured_errors);
        device.on_uncaptured_error(Box::new(move |e| {
            errors.fetch_add(1, Ordering::Relaxed);
            log::error!("Uncaptured error on '{label}': {e}");
        }));

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            flag.store(true, Ordering::Release);
            log::error!("'{label}' lost ({reason:?}): {message}");
        });

        let features = device.features();
        log::debug!("'{}' features: {features:?}", options.label);

        Ok(Self {
            device,
            queue,
            adapter: info,
            features,
            lost,
            uncaptured_errors,
        })
    }

    /// Whether the device reported itself lost.
    ///
    /// The flag is raised from wgpu's device-lost callback, which runs during
    /// a device poll.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Validation and out-of-memory errors raised outside an error scope so far.
    pub fn uncaptured_errors(&self) -> usize {
        self.uncaptured_errors.load(Ordering::Relaxed)
    }
}
