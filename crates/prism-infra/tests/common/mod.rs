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

#![allow(dead_code)]

use prism_core::renderer::*;
use prism_infra::{HeadlessDevice, HeadlessDeviceConfig};
use std::sync::Arc;

pub const QUAD_SHADER: &str = "
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
";

pub const BLUR_SHADER: &str = "
@compute @workgroup_size(8, 8)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
}
";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A headless device with a cache and settings wired together.
pub struct Fixture {
    pub device: Arc<HeadlessDevice>,
    pub cache: Arc<PipelineCache>,
    pub settings: RhiSettings,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(HeadlessDeviceConfig::default(), RhiSettings::default())
    }

    pub fn with_config(config: HeadlessDeviceConfig, settings: RhiSettings) -> Self {
        init_logger();
        let device = HeadlessDevice::new(config).expect("headless device");
        let cache = Arc::new(PipelineCache::new(device.clone(), &settings));
        Self {
            device,
            cache,
            settings,
        }
    }

    pub fn command_list(&self, name: &str) -> CommandList {
        CommandList::new(name, self.device.clone(), self.cache.clone(), &self.settings)
    }

    pub fn quad_unit(&self) -> ShaderUnit {
        ShaderUnit::compiled(
            self.device.clone(),
            ShaderKind::VertexPixel,
            ShaderSource::inline("quad", QUAD_SHADER),
            InputLayoutSignature::POSITION,
        )
    }

    pub fn blur_unit(&self) -> ShaderUnit {
        ShaderUnit::compiled(
            self.device.clone(),
            ShaderKind::Compute,
            ShaderSource::inline("blur", BLUR_SHADER),
            InputLayoutSignature::EMPTY,
        )
    }
}

pub fn quad_descriptor(unit: &ShaderUnit) -> PipelineStateDescriptor {
    PipelineStateDescriptor::builder()
        .stages(&unit.compiled_stages().expect("quad shader is built"))
        .render_target(TextureFormat::Rgba8Unorm)
        .build()
        .expect("valid quad descriptor")
}

pub fn color_target() -> RenderTargetHandle {
    RenderTargetHandle {
        view: TextureViewId(1),
        format: TextureFormat::Rgba8Unorm,
        width: 64,
        height: 64,
    }
}

pub fn depth_target() -> RenderTargetHandle {
    RenderTargetHandle {
        view: TextureViewId(2),
        format: TextureFormat::Depth24PlusStencil8,
        width: 64,
        height: 64,
    }
}

pub fn triangle() -> VertexBufferHandle {
    VertexBufferHandle {
        buffer: BufferId(1),
        offset: 0,
        stride: 12,
        vertex_count: 3,
    }
}

/// Records a full single-triangle pass into `list` and ends it.
pub fn record_triangle(
    list: &mut CommandList,
    descriptor: &PipelineStateDescriptor,
) -> Result<(), CommandListError> {
    list.begin_pass("triangle", descriptor)?;
    list.set_render_target(color_target(), None)?;
    list.clear_render_target(color_target(), ClearColor::BLACK)?;
    list.set_viewport(Viewport::from_size(64, 64))?;
    list.set_vertex_buffer(triangle())?;
    list.draw(3)?;
    list.end()
}
