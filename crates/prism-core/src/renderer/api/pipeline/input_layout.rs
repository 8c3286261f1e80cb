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

//! Vertex input layouts derived from an attribute signature.

use super::enums::VertexFormat;
use crate::prism_bitflags;

prism_bitflags! {
    /// The set of per-vertex attributes a vertex stage consumes.
    ///
    /// Attributes are always laid out in declaration order, tightly packed
    /// in a single interleaved buffer.
    pub struct InputLayoutSignature: u8 {
        /// `vec3<f32>` object-space position.
        const POSITION = 1 << 0;
        /// `vec2<f32>` texture coordinate.
        const TEXCOORD = 1 << 1;
        /// `vec4<f32>` vertex color.
        const COLOR = 1 << 2;
        /// `vec3<f32>` normal.
        const NORMAL = 1 << 3;
        /// `vec4<f32>` tangent with handedness in `w`.
        const TANGENT = 1 << 4;
        /// Position and texture coordinate.
        const POSITION_TEXCOORD = (1 << 0) | (1 << 1);
        /// Position and color.
        const POSITION_COLOR = (1 << 0) | (1 << 2);
        /// The full lit-mesh layout.
        const POSITION_TEXCOORD_NORMAL_TANGENT = (1 << 0) | (1 << 1) | (1 << 3) | (1 << 4);
    }
}

/// The semantic meaning of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    /// Object-space position.
    Position,
    /// Texture coordinate.
    TexCoord,
    /// Vertex color.
    Color,
    /// Normal vector.
    Normal,
    /// Tangent vector.
    Tangent,
}

impl VertexSemantic {
    const ORDER: [(InputLayoutSignature, VertexSemantic, VertexFormat); 5] = [
        (
            InputLayoutSignature::POSITION,
            VertexSemantic::Position,
            VertexFormat::Float32x3,
        ),
        (
            InputLayoutSignature::TEXCOORD,
            VertexSemantic::TexCoord,
            VertexFormat::Float32x2,
        ),
        (
            InputLayoutSignature::COLOR,
            VertexSemantic::Color,
            VertexFormat::Float32x4,
        ),
        (
            InputLayoutSignature::NORMAL,
            VertexSemantic::Normal,
            VertexFormat::Float32x3,
        ),
        (
            InputLayoutSignature::TANGENT,
            VertexSemantic::Tangent,
            VertexFormat::Float32x4,
        ),
    ];
}

/// A single attribute within an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// What the attribute means.
    pub semantic: VertexSemantic,
    /// The data format.
    pub format: VertexFormat,
    /// The shader input location.
    pub shader_location: u32,
    /// The byte offset from the start of the vertex.
    pub offset: u32,
}

/// The layout of the single interleaved vertex buffer a pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputLayout {
    signature: InputLayoutSignature,
    attributes: Vec<VertexAttribute>,
    stride: u32,
}

impl InputLayout {
    /// Builds the layout for `signature`.
    ///
    /// Returns `None` if the signature names no attribute.
    pub fn from_signature(signature: InputLayoutSignature) -> Option<Self> {
        if signature.is_empty() {
            return None;
        }

        let mut attributes = Vec::new();
        let mut offset = 0;
        for (flag, semantic, format) in VertexSemantic::ORDER {
            if signature.contains(flag) {
                attributes.push(VertexAttribute {
                    semantic,
                    format,
                    shader_location: attributes.len() as u32,
                    offset,
                });
                offset += format.size();
            }
        }

        Some(Self {
            signature,
            attributes,
            stride: offset,
        })
    }

    /// The signature this layout was derived from.
    pub fn signature(&self) -> InputLayoutSignature {
        self.signature
    }

    /// The attributes, ordered by shader location.
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// The byte size of one vertex.
    pub fn stride(&self) -> u32 {
        self.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_tightly_packed_in_declaration_order() {
        let layout =
            InputLayout::from_signature(InputLayoutSignature::POSITION_TEXCOORD_NORMAL_TANGENT)
                .unwrap();

        let offsets: Vec<_> = layout
            .attributes()
            .iter()
            .map(|a| (a.semantic, a.shader_location, a.offset))
            .collect();
        assert_eq!(
            offsets,
            vec![
                (VertexSemantic::Position, 0, 0),
                (VertexSemantic::TexCoord, 1, 12),
                (VertexSemantic::Normal, 2, 20),
                (VertexSemantic::Tangent, 3, 32),
            ]
        );
        assert_eq!(layout.stride(), 48);
    }

    #[test]
    fn empty_signature_has_no_layout() {
        assert!(InputLayout::from_signature(InputLayoutSignature::EMPTY).is_none());
    }

    #[test]
    fn different_signatures_give_different_layouts() {
        let a = InputLayout::from_signature(InputLayoutSignature::POSITION_COLOR);
        let b = InputLayout::from_signature(InputLayoutSignature::POSITION_TEXCOORD);
        assert_ne!(a, b);
    }
}
