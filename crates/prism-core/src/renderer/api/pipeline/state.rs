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

//! Fixed-function state blocks of a pipeline.
//!
//! Every block is `Eq + Hash` so it can be part of a cache key. Float fields
//! are compared and hashed by their bit pattern: `0.0` and `-0.0` are
//! different keys, and a `NaN` equals itself.

use super::enums::*;
use crate::prism_bitflags;
use std::hash::{Hash, Hasher};

/// Rasterizer state: culling, winding, fill mode and depth bias.
#[derive(Debug, Clone, Copy)]
pub struct RasterizerState {
    /// The face culling mode.
    pub cull_mode: CullMode,
    /// The vertex winding order that determines the "front" face.
    pub front_face: FrontFace,
    /// Solid or wireframe rasterization.
    pub polygon_mode: PolygonMode,
    /// A constant value added to the depth of each fragment.
    pub depth_bias: i32,
    /// A factor that scales with the fragment's depth slope.
    pub depth_bias_slope_scale: f32,
    /// The maximum bias that can be applied.
    pub depth_bias_clamp: f32,
    /// If `false`, fragments outside the near/far planes are not clipped.
    pub depth_clip_enabled: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_face: FrontFace::Ccw,
            polygon_mode: PolygonMode::Fill,
            depth_bias: 0,
            depth_bias_slope_scale: 0.0,
            depth_bias_clamp: 0.0,
            depth_clip_enabled: true,
        }
    }
}

impl RasterizerState {
    /// Back-face culled, filled.
    pub fn cull_back() -> Self {
        Self::default()
    }

    /// No culling, filled.
    pub fn cull_none() -> Self {
        Self {
            cull_mode: CullMode::None,
            ..Self::default()
        }
    }

    /// No culling, wireframe.
    pub fn wireframe() -> Self {
        Self {
            cull_mode: CullMode::None,
            polygon_mode: PolygonMode::Line,
            ..Self::default()
        }
    }

    fn key(&self) -> (CullMode, FrontFace, PolygonMode, i32, u32, u32, bool) {
        (
            self.cull_mode,
            self.front_face,
            self.polygon_mode,
            self.depth_bias,
            self.depth_bias_slope_scale.to_bits(),
            self.depth_bias_clamp.to_bits(),
            self.depth_clip_enabled,
        )
    }
}

impl PartialEq for RasterizerState {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RasterizerState {}

impl Hash for RasterizerState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Describes the stencil test and operations for a single face of a primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    /// The comparison function used for the stencil test.
    pub compare: CompareFunction,
    /// The operation to perform if the stencil test fails.
    pub fail_op: StencilOperation,
    /// The operation to perform if the stencil test passes but the depth test fails.
    pub depth_fail_op: StencilOperation,
    /// The operation to perform if both the stencil and depth tests pass.
    pub pass_op: StencilOperation,
}

/// Depth and stencil testing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    /// If `false`, the depth test always passes and nothing is written.
    pub depth_test_enabled: bool,
    /// If `true`, depth values are written to the depth buffer.
    pub depth_write_enabled: bool,
    /// The comparison function used for the depth test.
    pub depth_compare: CompareFunction,
    /// If `true`, the stencil test runs.
    pub stencil_enabled: bool,
    /// The stencil state for front-facing primitives.
    pub stencil_front: StencilFaceState,
    /// The stencil state for back-facing primitives.
    pub stencil_back: StencilFaceState,
    /// A bitmask for reading from the stencil buffer.
    pub stencil_read_mask: u8,
    /// A bitmask for writing to the stencil buffer.
    pub stencil_write_mask: u8,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self::disabled()
    }
}

impl DepthStencilState {
    /// No depth or stencil testing.
    pub fn disabled() -> Self {
        Self {
            depth_test_enabled: false,
            depth_write_enabled: false,
            depth_compare: CompareFunction::Always,
            stencil_enabled: false,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
        }
    }

    /// Depth test with `Less` and depth writes.
    pub fn read_write() -> Self {
        Self {
            depth_test_enabled: true,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            ..Self::disabled()
        }
    }

    /// Depth test with `LessEqual`, no writes.
    pub fn read_only() -> Self {
        Self {
            depth_test_enabled: true,
            depth_write_enabled: false,
            depth_compare: CompareFunction::LessEqual,
            ..Self::disabled()
        }
    }

    /// Returns `true` if the state needs a depth attachment.
    pub fn uses_depth(&self) -> bool {
        self.depth_test_enabled || self.depth_write_enabled
    }
}

/// A blend equation for the color or alpha components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    /// The blend factor for the source color (from the pixel shader).
    pub src_factor: BlendFactor,
    /// The blend factor for the destination color (already in the target).
    pub dst_factor: BlendFactor,
    /// The operation to combine the two.
    pub operation: BlendOperation,
}

impl BlendComponent {
    /// Source replaces destination.
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        operation: BlendOperation::Add,
    };
}

prism_bitflags! {
    /// A bitmask to enable or disable writes to individual color channels.
    pub struct ColorWrites: u8 {
        /// Enable writes to the Red channel.
        const R = 0b0001;
        /// Enable writes to the Green channel.
        const G = 0b0010;
        /// Enable writes to the Blue channel.
        const B = 0b0100;
        /// Enable writes to the Alpha channel.
        const A = 0b1000;
        /// Enable writes to all channels.
        const ALL = 0b1111;
    }
}

/// Blend state applied to every color target of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// If `false`, the color and alpha equations are ignored.
    pub enabled: bool,
    /// The blend equation for the RGB components.
    pub color: BlendComponent,
    /// The blend equation for the alpha component.
    pub alpha: BlendComponent,
    /// Which channels are written.
    pub write_mask: ColorWrites,
}

impl Default for BlendState {
    fn default() -> Self {
        Self::opaque()
    }
}

impl BlendState {
    /// Blending off, all channels written.
    pub fn opaque() -> Self {
        Self {
            enabled: false,
            color: BlendComponent::REPLACE,
            alpha: BlendComponent::REPLACE,
            write_mask: ColorWrites::ALL,
        }
    }

    /// Standard `src.a` / `1 - src.a` transparency.
    pub fn alpha_blending() -> Self {
        Self {
            enabled: true,
            color: BlendComponent {
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
            write_mask: ColorWrites::ALL,
        }
    }

    /// `src + dst`, used for light accumulation.
    pub fn additive() -> Self {
        let add = BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        };
        Self {
            enabled: true,
            color: add,
            alpha: add,
            write_mask: ColorWrites::ALL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn rasterizer_floats_compare_by_bits() {
        let a = RasterizerState {
            depth_bias_slope_scale: 1.5,
            ..RasterizerState::default()
        };
        let b = RasterizerState {
            depth_bias_slope_scale: 1.5,
            ..RasterizerState::default()
        };
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let positive_zero = RasterizerState::default();
        let negative_zero = RasterizerState {
            depth_bias_clamp: -0.0,
            ..RasterizerState::default()
        };
        assert_ne!(positive_zero, negative_zero);
    }

    #[test]
    fn nan_bias_is_equal_to_itself() {
        let a = RasterizerState {
            depth_bias_clamp: f32::NAN,
            ..RasterizerState::default()
        };
        assert_eq!(a, a);
    }

    #[test]
    fn presets_differ() {
        assert_ne!(BlendState::opaque(), BlendState::alpha_blending());
        assert_ne!(BlendState::alpha_blending(), BlendState::additive());
        assert!(DepthStencilState::read_write().uses_depth());
        assert!(!DepthStencilState::disabled().uses_depth());
        assert_ne!(RasterizerState::cull_none(), RasterizerState::wireframe());
    }
}
