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

//! The pipeline state descriptor: the cache key for native pipelines.

use super::enums::PrimitiveTopology;
use super::input_layout::InputLayout;
use super::state::{BlendState, DepthStencilState, RasterizerState};
use crate::renderer::api::core::{ShaderModuleId, MAX_RENDER_TARGETS};
use crate::renderer::api::shader::CompiledStages;
use crate::renderer::api::util::{SampleCount, TextureFormat};
use crate::renderer::error::PipelineError;

/// Whether a descriptor describes a raster or a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    /// Vertex (and optionally pixel) stages.
    Graphics,
    /// A single compute stage.
    Compute,
}

/// Everything needed to build one native pipeline.
///
/// Two descriptors that compare equal always resolve to the same cached
/// pipeline. The value holds no pointers, so it can be hashed, cloned and
/// sent across threads freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineStateDescriptor {
    /// The compiled vertex stage.
    pub vertex_shader: Option<ShaderModuleId>,
    /// The compiled pixel stage. A depth-only pass leaves it empty.
    pub pixel_shader: Option<ShaderModuleId>,
    /// The compiled compute stage. Exclusive with the graphics stages.
    pub compute_shader: Option<ShaderModuleId>,
    /// The vertex input layout.
    pub input_layout: Option<InputLayout>,
    /// Rasterizer state.
    pub rasterizer: RasterizerState,
    /// Blend state for every color target.
    pub blend: BlendState,
    /// Depth and stencil state.
    pub depth_stencil: DepthStencilState,
    /// How vertices assemble into primitives.
    pub topology: PrimitiveTopology,
    /// The formats of the bound color targets, in slot order.
    pub render_target_formats: Vec<TextureFormat>,
    /// The format of the depth/stencil target, if any.
    pub depth_stencil_format: Option<TextureFormat>,
    /// MSAA sample count.
    pub sample_count: SampleCount,
    /// If `true`, viewport and scissor come from the command stream.
    pub dynamic_viewport_scissor: bool,
}

impl Default for PipelineStateDescriptor {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            pixel_shader: None,
            compute_shader: None,
            input_layout: None,
            rasterizer: RasterizerState::default(),
            blend: BlendState::default(),
            depth_stencil: DepthStencilState::default(),
            topology: PrimitiveTopology::TriangleList,
            render_target_formats: Vec::new(),
            depth_stencil_format: None,
            sample_count: SampleCount::X1,
            dynamic_viewport_scissor: true,
        }
    }
}

impl PipelineStateDescriptor {
    /// Starts a builder from the default state.
    pub fn builder() -> PipelineStateBuilder {
        PipelineStateBuilder::default()
    }

    /// The kind of pipeline this descriptor builds.
    pub fn kind(&self) -> PipelineKind {
        if self.compute_shader.is_some() {
            PipelineKind::Compute
        } else {
            PipelineKind::Graphics
        }
    }

    /// A label for logs and backend debug names, built from the stage IDs.
    pub fn label(&self) -> String {
        match (self.vertex_shader, self.pixel_shader, self.compute_shader) {
            (_, _, Some(cs)) => format!("pso[cs{}]", cs.0),
            (Some(vs), Some(ps), None) => format!("pso[vs{}+ps{}]", vs.0, ps.0),
            (Some(vs), None, None) => format!("pso[vs{}]", vs.0),
            _ => "pso[empty]".to_string(),
        }
    }

    /// Checks that the descriptor names a buildable combination of state.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let incomplete = |msg: &str| Err(PipelineError::IncompleteDescriptor(msg.to_string()));

        if self.compute_shader.is_some() {
            if self.vertex_shader.is_some() || self.pixel_shader.is_some() {
                return incomplete("compute stage mixed with graphics stages");
            }
            return Ok(());
        }

        if self.vertex_shader.is_none() {
            return if self.pixel_shader.is_some() {
                incomplete("pixel stage without a vertex stage")
            } else {
                incomplete("no shader stage")
            };
        }

        if self.input_layout.is_none() {
            return incomplete("graphics pipeline without an input layout");
        }
        if self.render_target_formats.len() > MAX_RENDER_TARGETS {
            return incomplete("too many render targets");
        }
        if self.pixel_shader.is_some() && self.render_target_formats.is_empty() {
            return incomplete("pixel stage without a render target");
        }
        if let Some(format) = self.render_target_formats.iter().find(|f| f.is_depth()) {
            return Err(PipelineError::IncompleteDescriptor(format!(
                "depth format {format:?} bound as a color target"
            )));
        }
        match self.depth_stencil_format {
            Some(format) if !format.is_depth() => {
                return Err(PipelineError::IncompleteDescriptor(format!(
                    "{format:?} is not a depth format"
                )));
            }
            None if self.depth_stencil.uses_depth() => {
                return incomplete("depth testing without a depth target");
            }
            _ => {}
        }
        Ok(())
    }
}

/// A chaining builder for [`PipelineStateDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct PipelineStateBuilder {
    descriptor: PipelineStateDescriptor,
}

impl PipelineStateBuilder {
    /// Sets every stage and the input layout from a built shader unit.
    pub fn stages(mut self, stages: &CompiledStages) -> Self {
        self.descriptor.vertex_shader = stages.vertex;
        self.descriptor.pixel_shader = stages.pixel;
        self.descriptor.compute_shader = stages.compute;
        self.descriptor.input_layout = stages.input_layout.clone();
        self
    }

    /// Sets the vertex stage.
    pub fn vertex_shader(mut self, id: ShaderModuleId) -> Self {
        self.descriptor.vertex_shader = Some(id);
        self
    }

    /// Sets the pixel stage.
    pub fn pixel_shader(mut self, id: ShaderModuleId) -> Self {
        self.descriptor.pixel_shader = Some(id);
        self
    }

    /// Sets the compute stage.
    pub fn compute_shader(mut self, id: ShaderModuleId) -> Self {
        self.descriptor.compute_shader = Some(id);
        self
    }

    /// Sets the input layout.
    pub fn input_layout(mut self, layout: InputLayout) -> Self {
        self.descriptor.input_layout = Some(layout);
        self
    }

    /// Sets the rasterizer state.
    pub fn rasterizer(mut self, state: RasterizerState) -> Self {
        self.descriptor.rasterizer = state;
        self
    }

    /// Sets the blend state.
    pub fn blend(mut self, state: BlendState) -> Self {
        self.descriptor.blend = state;
        self
    }

    /// Sets the depth/stencil state and its target format.
    pub fn depth_stencil(mut self, state: DepthStencilState, format: TextureFormat) -> Self {
        self.descriptor.depth_stencil = state;
        self.descriptor.depth_stencil_format = Some(format);
        self
    }

    /// Sets the primitive topology.
    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.descriptor.topology = topology;
        self
    }

    /// Appends a color target format.
    pub fn render_target(mut self, format: TextureFormat) -> Self {
        self.descriptor.render_target_formats.push(format);
        self
    }

    /// Sets the MSAA sample count.
    pub fn sample_count(mut self, count: SampleCount) -> Self {
        self.descriptor.sample_count = count;
        self
    }

    /// Bakes viewport and scissor into the pipeline instead of the command stream.
    pub fn static_viewport_scissor(mut self) -> Self {
        self.descriptor.dynamic_viewport_scissor = false;
        self
    }

    /// Returns the descriptor without validating it.
    pub fn build_unchecked(self) -> PipelineStateDescriptor {
        self.descriptor
    }

    /// Validates and returns the descriptor.
    pub fn build(self) -> Result<PipelineStateDescriptor, PipelineError> {
        self.descriptor.validate()?;
        Ok(self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::pipeline::InputLayoutSignature;
    use std::collections::HashSet;

    fn graphics() -> PipelineStateBuilder {
        PipelineStateDescriptor::builder()
            .vertex_shader(ShaderModuleId(1))
            .pixel_shader(ShaderModuleId(2))
            .input_layout(InputLayout::from_signature(InputLayoutSignature::POSITION).unwrap())
            .render_target(TextureFormat::Bgra8UnormSrgb)
    }

    #[test]
    fn identical_descriptors_are_one_key() {
        let a = graphics().build().unwrap();
        let b = graphics().build().unwrap();
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn a_single_field_discriminates() {
        let base = graphics().build().unwrap();
        let variants = [
            graphics()
                .topology(PrimitiveTopology::LineList)
                .build()
                .unwrap(),
            graphics().blend(BlendState::additive()).build().unwrap(),
            graphics()
                .rasterizer(RasterizerState::wireframe())
                .build()
                .unwrap(),
            graphics().sample_count(SampleCount::X4).build().unwrap(),
            graphics().static_viewport_scissor().build().unwrap(),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn validate_rejects_incomplete_stage_sets() {
        assert!(PipelineStateDescriptor::default().validate().is_err());

        let pixel_only = PipelineStateDescriptor::builder()
            .pixel_shader(ShaderModuleId(2))
            .render_target(TextureFormat::Rgba8Unorm)
            .build();
        assert!(matches!(
            pixel_only,
            Err(PipelineError::IncompleteDescriptor(_))
        ));

        let mixed = graphics().compute_shader(ShaderModuleId(3)).build();
        assert!(mixed.is_err());
    }

    #[test]
    fn depth_test_requires_a_depth_target() {
        let mut descriptor = graphics().build().unwrap();
        descriptor.depth_stencil = DepthStencilState::read_write();
        assert!(descriptor.validate().is_err());

        let ok = graphics()
            .depth_stencil(DepthStencilState::read_write(), TextureFormat::Depth32Float)
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn compute_descriptor_is_compute_kind() {
        let descriptor = PipelineStateDescriptor::builder()
            .compute_shader(ShaderModuleId(9))
            .build()
            .unwrap();
        assert_eq!(descriptor.kind(), PipelineKind::Compute);
        assert_eq!(descriptor.label(), "pso[cs9]");
    }
}
