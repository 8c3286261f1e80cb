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

//! Small value types carried by recorded commands.

use crate::prism_bitflags;

/// The rectangle and depth range the rasterizer maps clip space to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: f32,
    /// Top edge in pixels.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Minimum depth, usually `0.0`.
    pub min_depth: f32,
    /// Maximum depth, usually `1.0`.
    pub max_depth: f32,
}

impl Viewport {
    /// A full-target viewport with the default depth range.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// A scissor rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

/// A linear RGBA clear color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl ClearColor {
    /// Opaque black.
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::rgba(0.0, 0.0, 0.0, 0.0);

    /// Creates a color from its components.
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Which aspects of a depth/stencil target to clear, and to what.
///
/// An aspect left as `None` keeps its contents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilClear {
    /// The depth clear value.
    pub depth: Option<f32>,
    /// The stencil clear value.
    pub stencil: Option<u32>,
}

impl DepthStencilClear {
    /// Clears depth only.
    pub fn depth(value: f32) -> Self {
        Self {
            depth: Some(value),
            stencil: None,
        }
    }

    /// Clears both aspects.
    pub fn depth_stencil(depth: f32, stencil: u32) -> Self {
        Self {
            depth: Some(depth),
            stencil: Some(stencil),
        }
    }

    /// Returns `true` if no aspect is cleared.
    pub fn is_noop(&self) -> bool {
        self.depth.is_none() && self.stencil.is_none()
    }
}

prism_bitflags! {
    /// The shader stages a constant buffer binding is visible to.
    pub struct BufferScope: u8 {
        /// Visible to the vertex stage.
        const VERTEX = 1 << 0;
        /// Visible to the pixel stage.
        const PIXEL = 1 << 1;
        /// Visible to the compute stage.
        const COMPUTE = 1 << 2;
        /// Visible to both graphics stages.
        const GRAPHICS = (1 << 0) | (1 << 1);
    }
}
