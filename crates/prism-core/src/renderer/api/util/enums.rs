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

//! Small enums shared by the command stream, the pipeline state and the devices.

/// Width of the indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// `u16` indices.
    Uint16,
    /// `u32` indices.
    Uint32,
}

/// The native API a device runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GraphicsBackendType {
    /// Vulkan.
    Vulkan,
    /// Metal.
    Metal,
    /// Direct3D 12.
    Dx12,
    /// OpenGL or GLES.
    OpenGL,
    /// The browser's WebGPU.
    WebGpu,
    /// No GPU: commands are executed by a simulated timeline.
    Headless,
    /// Anything else.
    #[default]
    Unknown,
}

/// Multisample count of a render target and of the pipelines drawing into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleCount {
    /// Single-sampled.
    #[default]
    X1,
    /// 2x MSAA.
    X2,
    /// 4x MSAA.
    X4,
    /// 8x MSAA.
    X8,
}

impl SampleCount {
    /// Samples per pixel.
    pub fn count(&self) -> u32 {
        1 << (*self as u32)
    }
}

/// Pixel format of a render target or texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, linear.
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB encoded.
    Rgba8UnormSrgb,
    /// 8-bit BGRA, linear.
    Bgra8Unorm,
    /// 8-bit BGRA, sRGB encoded. The usual swap chain format.
    Bgra8UnormSrgb,
    /// Half-float RGBA.
    Rgba16Float,
    /// Float RGBA.
    Rgba32Float,
    /// 16-bit normalized depth.
    Depth16Unorm,
    /// Depth with an 8-bit stencil.
    Depth24PlusStencil8,
    /// Float depth.
    Depth32Float,
}

impl TextureFormat {
    /// Returns `true` if the format can back a depth attachment.
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth24PlusStencil8
                | TextureFormat::Depth32Float
        )
    }

    /// Returns `true` if the format carries a stencil aspect.
    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }
}
