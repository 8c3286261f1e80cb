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

//! Shader stage, source and compilation-state types.

use crate::renderer::api::core::ShaderModuleId;
use crate::renderer::api::pipeline::InputLayout;
use std::fmt;
use std::path::PathBuf;

/// A single programmable stage of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    /// The vertex shader stage.
    Vertex,
    /// The pixel (fragment) shader stage.
    Pixel,
    /// The compute shader stage.
    Compute,
}

impl ShaderStage {
    /// All stages, in slot order.
    pub const ALL: [ShaderStage; 3] = [ShaderStage::Vertex, ShaderStage::Pixel, ShaderStage::Compute];

    /// The entry point a source must define for this stage.
    pub fn entry_point(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Pixel => "fs_main",
            ShaderStage::Compute => "cs_main",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Pixel => 1,
            ShaderStage::Compute => 2,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Pixel => write!(f, "pixel"),
            ShaderStage::Compute => write!(f, "compute"),
        }
    }
}

/// Selects which stages a [`ShaderUnit`](crate::renderer::ShaderUnit) compile request builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Only the vertex stage.
    Vertex,
    /// Only the pixel stage.
    Pixel,
    /// Only the compute stage.
    Compute,
    /// Both the vertex and the pixel stage, from the same source.
    VertexPixel,
}

impl ShaderKind {
    /// The stages this kind compiles.
    pub fn stages(&self) -> &'static [ShaderStage] {
        match self {
            ShaderKind::Vertex => &[ShaderStage::Vertex],
            ShaderKind::Pixel => &[ShaderStage::Pixel],
            ShaderKind::Compute => &[ShaderStage::Compute],
            ShaderKind::VertexPixel => &[ShaderStage::Vertex, ShaderStage::Pixel],
        }
    }

    /// Returns `true` if this kind compiles `stage`.
    pub fn includes(&self, stage: ShaderStage) -> bool {
        self.stages().contains(&stage)
    }
}

/// Where a shader's source text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderSource {
    /// A file read from disk at compile time.
    File(PathBuf),
    /// Source text held in memory, with a name used in diagnostics.
    Inline {
        /// The name reported in logs and errors.
        name: String,
        /// The shader source text.
        code: String,
    },
}

impl ShaderSource {
    /// Creates an inline source.
    pub fn inline(name: impl Into<String>, code: impl Into<String>) -> Self {
        ShaderSource::Inline {
            name: name.into(),
            code: code.into(),
        }
    }

    /// A short name for logs: the file name, or the inline name.
    pub fn label(&self) -> String {
        match self {
            ShaderSource::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ShaderSource::Inline { name, .. } => name.clone(),
        }
    }
}

/// The compilation state of a whole shader unit or of one of its stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompilationState {
    /// Nothing has been requested yet.
    #[default]
    Idle,
    /// A compile request is in progress.
    Compiling,
    /// The last request succeeded.
    Built,
    /// The last request failed. The diagnostic is available on the unit.
    Failed,
}

impl CompilationState {
    /// Returns `true` for `Built` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompilationState::Built | CompilationState::Failed)
    }
}

/// Describes one stage to be compiled by an [`RhiDevice`](crate::renderer::RhiDevice).
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    /// A label for diagnostics.
    pub label: &'a str,
    /// The full source text.
    pub source: &'a str,
    /// The stage to compile.
    pub stage: ShaderStage,
    /// The entry point the stage starts from.
    pub entry_point: &'a str,
    /// The vertex input layout, for vertex stages only.
    pub input_layout: Option<&'a InputLayout>,
}

/// The native stage handles of a built shader unit, ready to go into a
/// [`PipelineStateDescriptor`](crate::renderer::PipelineStateDescriptor).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompiledStages {
    /// The vertex stage, if compiled.
    pub vertex: Option<ShaderModuleId>,
    /// The pixel stage, if compiled.
    pub pixel: Option<ShaderModuleId>,
    /// The compute stage, if compiled.
    pub compute: Option<ShaderModuleId>,
    /// The layout the vertex stage was compiled against.
    pub input_layout: Option<InputLayout>,
}
