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

use prism_core::renderer::api::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, ClearColor, ColorWrites,
    CompareFunction, CullMode, DepthStencilState, FrontFace, IndexFormat, PolygonMode,
    PrimitiveTopology, SampleCount, StencilFaceState, StencilOperation, TextureFormat,
    VertexFormat,
};

/// Conversion from a prism value into its wgpu counterpart.
///
/// The orphan rule forbids `From` impls between two foreign crates' types in
/// this crate, hence a local trait.
pub trait IntoWgpu<T> {
    /// Converts `self`.
    fn into_wgpu(self) -> T;
}

/// Implements [`IntoWgpu`] for an enum whose variants have the same names in wgpu.
macro_rules! same_name_variants {
    ($($ours:ident => $theirs:ty { $($variant:ident),+ $(,)? })+) => {
        $(
            impl IntoWgpu<$theirs> for $ours {
                fn into_wgpu(self) -> $theirs {
                    match self {
                        $($ours::$variant => <$theirs>::$variant,)+
                    }
                }
            }
        )+
    };
}

same_name_variants! {
    TextureFormat => wgpu::TextureFormat {
        Rgba8Unorm, Rgba8UnormSrgb, Bgra8Unorm, Bgra8UnormSrgb,
        Rgba16Float, Rgba32Float, Depth16Unorm, Depth24PlusStencil8, Depth32Float,
    }
    VertexFormat => wgpu::VertexFormat {
        Unorm8x4, Float32, Float32x2, Float32x3, Float32x4, Uint32x4,
    }
    IndexFormat => wgpu::IndexFormat { Uint16, Uint32 }
    PrimitiveTopology => wgpu::PrimitiveTopology {
        PointList, LineList, LineStrip, TriangleList, TriangleStrip,
    }
    FrontFace => wgpu::FrontFace { Ccw, Cw }
    PolygonMode => wgpu::PolygonMode { Fill, Line }
    CompareFunction => wgpu::CompareFunction {
        Never, Less, Equal, LessEqual, Greater, NotEqual, GreaterEqual, Always,
    }
    StencilOperation => wgpu::StencilOperation {
        Keep, Zero, Replace, Invert, IncrementClamp, DecrementClamp,
    }
    BlendFactor => wgpu::BlendFactor {
        Zero, One, SrcAlpha, OneMinusSrcAlpha, DstAlpha, OneMinusDstAlpha,
    }
    BlendOperation => wgpu::BlendOperation {
        Add, Subtract, ReverseSubtract, Min, Max,
    }
}

impl IntoWgpu<u32> for SampleCount {
    fn into_wgpu(self) -> u32 {
        self.count()
    }
}

impl IntoWgpu<wgpu::Color> for ClearColor {
    fn into_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: f64::from(self.r),
            g: f64::from(self.g),
            b: f64::from(self.b),
            a: f64::from(self.a),
        }
    }
}

impl IntoWgpu<Option<wgpu::Face>> for CullMode {
    fn into_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        }
    }
}

impl IntoWgpu<wgpu::StencilFaceState> for StencilFaceState {
    fn into_wgpu(self) -> wgpu::StencilFaceState {
        wgpu::StencilFaceState {
            compare: self.compare.into_wgpu(),
            fail_op: self.fail_op.into_wgpu(),
            depth_fail_op: self.depth_fail_op.into_wgpu(),
            pass_op: self.pass_op.into_wgpu(),
        }
    }
}

/// Builds the wgpu depth/stencil state for a pipeline writing to `format`.
///
/// A disabled depth test becomes `Always` without writes, which is how wgpu
/// expresses "no depth test" on a pass that still has a depth attachment.
pub fn depth_stencil_state(
    state: &DepthStencilState,
    format: TextureFormat,
    rasterizer_bias: (i32, f32, f32),
) -> wgpu::DepthStencilState {
    let (constant, slope_scale, clamp) = rasterizer_bias;
    let stencil = if state.stencil_enabled {
        wgpu::StencilState {
            front: state.stencil_front.into_wgpu(),
            back: state.stencil_back.into_wgpu(),
            read_mask: state.stencil_read_mask as u32,
            write_mask: state.stencil_write_mask as u32,
        }
    } else {
        wgpu::StencilState::default()
    };

    wgpu::DepthStencilState {
        format: format.into_wgpu(),
        depth_write_enabled: state.depth_test_enabled && state.depth_write_enabled,
        depth_compare: if state.depth_test_enabled {
            state.depth_compare.into_wgpu()
        } else {
            wgpu::CompareFunction::Always
        },
        stencil,
        bias: wgpu::DepthBiasState {
            constant,
            slope_scale,
            clamp,
        },
    }
}

impl IntoWgpu<wgpu::BlendComponent> for BlendComponent {
    fn into_wgpu(self) -> wgpu::BlendComponent {
        wgpu::BlendComponent {
            src_factor: self.src_factor.into_wgpu(),
            dst_factor: self.dst_factor.into_wgpu(),
            operation: self.operation.into_wgpu(),
        }
    }
}

impl IntoWgpu<wgpu::ColorWrites> for ColorWrites {
    fn into_wgpu(self) -> wgpu::ColorWrites {
        let mut writes = wgpu::ColorWrites::empty();
        if self.contains(ColorWrites::R) {
            writes |= wgpu::ColorWrites::RED;
        }
        if self.contains(ColorWrites::G) {
            writes |= wgpu::ColorWrites::GREEN;
        }
        if self.contains(ColorWrites::B) {
            writes |= wgpu::ColorWrites::BLUE;
        }
        if self.contains(ColorWrites::A) {
            writes |= wgpu::ColorWrites::ALPHA;
        }
        writes
    }
}

impl IntoWgpu<Option<wgpu::BlendState>> for BlendState {
    fn into_wgpu(self) -> Option<wgpu::BlendState> {
        self.enabled.then(|| wgpu::BlendState {
            color: self.color.into_wgpu(),
            alpha: self.alpha.into_wgpu(),
        })
    }
}
