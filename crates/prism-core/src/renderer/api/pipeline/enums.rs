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

//! Fixed-function enums that take part in pipeline identity.
//!
//! Every type here is `Hash + Eq` so a [`PipelineStateDescriptor`](super::PipelineStateDescriptor)
//! can be used directly as a cache key.

/// Layout of one vertex attribute in a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// `vec4<f32>` unpacked from four normalized bytes.
    Unorm8x4,
    /// `f32`.
    Float32,
    /// `vec2<f32>`.
    Float32x2,
    /// `vec3<f32>`.
    Float32x3,
    /// `vec4<f32>`.
    Float32x4,
    /// `vec4<u32>`.
    Uint32x4,
}

impl VertexFormat {
    /// Bytes the attribute occupies in a tightly packed vertex.
    pub fn size(&self) -> u32 {
        match self {
            VertexFormat::Unorm8x4 | VertexFormat::Float32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 | VertexFormat::Uint32x4 => 16,
        }
    }
}

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// One point per vertex.
    PointList,
    /// Independent segments, two vertices each.
    LineList,
    /// Connected segments sharing endpoints.
    LineStrip,
    /// Independent triangles, three vertices each.
    #[default]
    TriangleList,
    /// Connected triangles sharing an edge.
    TriangleStrip,
}

/// Triangles discarded by facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both faces.
    None,
    /// Discard front faces.
    Front,
    /// Discard back faces.
    #[default]
    Back,
}

/// Winding of a front-facing triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise.
    #[default]
    Ccw,
    /// Clockwise.
    Cw,
}

/// Fill mode for rasterized polygons.
///
/// `Line` needs device support; the wgpu backend rejects it at pipeline
/// build time when the adapter lacks the feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Solid.
    #[default]
    Fill,
    /// Wireframe.
    Line,
}

/// Comparison applied between an incoming value and the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// `incoming < stored`.
    Less,
    /// `incoming == stored`.
    Equal,
    /// `incoming <= stored`.
    LessEqual,
    /// `incoming > stored`.
    Greater,
    /// `incoming != stored`.
    NotEqual,
    /// `incoming >= stored`.
    GreaterEqual,
    /// Always passes.
    #[default]
    Always,
}

/// What happens to the stencil value after a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    /// Leave it unchanged.
    #[default]
    Keep,
    /// Write `0`.
    Zero,
    /// Write the reference value.
    Replace,
    /// Flip every bit.
    Invert,
    /// Add one, saturating.
    IncrementClamp,
    /// Subtract one, saturating at zero.
    DecrementClamp,
}

/// Multiplier applied to a source or destination term when blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// `0`.
    Zero,
    /// `1`.
    One,
    /// Source alpha.
    SrcAlpha,
    /// `1 - source alpha`.
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// `1 - destination alpha`.
    OneMinusDstAlpha,
}

/// How the weighted source and destination terms are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    /// `src + dst`.
    Add,
    /// `src - dst`.
    Subtract,
    /// `dst - src`.
    ReverseSubtract,
    /// Component-wise minimum. Factors are ignored.
    Min,
    /// Component-wise maximum. Factors are ignored.
    Max,
}
