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

use super::conversions::IntoWgpu;
use super::device::{WgpuDevice, WgpuPipeline};
use super::reflection::BindingSlot;
use prism_core::renderer::api::{
    ConstantBufferHandle, IndexBufferHandle, RenderCommand, RenderTargetHandle, ScissorRect,
    VertexBufferHandle, Viewport,
};
use prism_core::renderer::{DeviceError, NativeCommandBuffer};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bind group holding constant buffers, one binding per slot.
const CONSTANT_GROUP: u32 = 0;
/// Bind group holding texture views, one binding per slot.
const TEXTURE_GROUP: u32 = 1;
/// Bind group holding samplers, one binding per slot.
const SAMPLER_GROUP: u32 = 2;

/// A recorded command stream waiting for submission.
///
/// Encoding into a `wgpu::CommandEncoder` happens at submit time, because
/// wgpu render passes need their attachments up front while the stream
/// binds targets and state incrementally.
#[derive(Debug)]
pub struct WgpuCommandBuffer {
    label: String,
    commands: Vec<RenderCommand>,
}

impl WgpuCommandBuffer {
    pub(super) fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            commands: Vec::new(),
        }
    }

    pub(super) fn into_parts(self) -> (String, Vec<RenderCommand>) {
        (self.label, self.commands)
    }
}

impl NativeCommandBuffer for WgpuCommandBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn encode(&mut self, command: RenderCommand) -> Result<(), DeviceError> {
        self.commands.push(command);
        Ok(())
    }

    fn command_count(&self) -> usize {
        self.commands.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

enum OpenPass {
    None,
    Render(wgpu::RenderPass<'static>),
    Compute(wgpu::ComputePass<'static>),
}

/// The state carried between commands while a stream is replayed.
struct Replay<'d> {
    device: &'d WgpuDevice,
    label: &'d str,
    pass: OpenPass,
    color: Vec<Arc<wgpu::TextureView>>,
    depth: Option<(Arc<wgpu::TextureView>, bool)>,
    pipeline: Option<(WgpuPipeline, Arc<[BindingSlot]>)>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    vertex_buffer: Option<(Arc<wgpu::Buffer>, VertexBufferHandle)>,
    index_buffer: Option<(Arc<wgpu::Buffer>, IndexBufferHandle)>,
    constants: BTreeMap<u32, (Arc<wgpu::Buffer>, ConstantBufferHandle)>,
    textures: BTreeMap<u32, Arc<wgpu::TextureView>>,
    samplers: BTreeMap<u32, Arc<wgpu::Sampler>>,
    /// Set when a resource or the pipeline changed since `bind_groups` was built.
    resources_dirty: bool,
    bind_groups: Vec<(u32, wgpu::BindGroup)>,
}

fn missing(label: &str, what: String) -> DeviceError {
    DeviceError::SubmissionFailed(format!("'{label}' references {what}"))
}

impl<'d> Replay<'d> {
    fn close_pass(&mut self) {
        self.pass = OpenPass::None;
    }

    fn view(&self, target: &RenderTargetHandle) -> Result<Arc<wgpu::TextureView>, DeviceError> {
        self.device
            .get_wgpu_texture_view(target.view)
            .ok_or_else(|| missing(self.label, format!("unknown view {:?}", target.view)))
    }

    /// Opens a render pass unless one is open. Returns whether it opened one.
    fn open_render_pass(&mut self, encoder: &mut wgpu::CommandEncoder) -> bool {
        if matches!(self.pass, OpenPass::Render(_)) {
            return false;
        }
        self.close_pass();
        let color_attachments: Vec<_> = self
            .color
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view: view.as_ref(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let load_store = || wgpu::Operations {
            load: wgpu::LoadOp::Load,
            store: wgpu::StoreOp::Store,
        };
        let depth_stencil_attachment =
            self.depth
                .as_ref()
                .map(|(view, has_stencil)| wgpu::RenderPassDepthStencilAttachment {
                    view: view.as_ref(),
                    depth_ops: Some(load_store()),
                    stencil_ops: has_stencil.then(load_store),
                });

        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(self.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();

        // A new pass starts with no state; bring back what the stream set.
        if let Some((WgpuPipeline::Render(pipeline), _)) = &self.pipeline {
            pass.set_pipeline(pipeline);
        }
        if let Some(v) = self.viewport {
            pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
        }
        if let Some(s) = self.scissor {
            pass.set_scissor_rect(s.x, s.y, s.width, s.height);
        }
        if let Some((buffer, handle)) = &self.vertex_buffer {
            pass.set_vertex_buffer(0, buffer.slice(handle.offset..));
        }
        if let Some((buffer, handle)) = &self.index_buffer {
            pass.set_index_buffer(buffer.slice(handle.offset..), handle.format.into_wgpu());
        }
        self.pass = OpenPass::Render(pass);
        true
    }

    /// The render pass a draw goes into, with the current bind groups set.
    fn draw_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<&mut wgpu::RenderPass<'static>, DeviceError> {
        let rebuilt = self.refresh_bind_groups()?;
        let opened = self.open_render_pass(encoder);
        match &mut self.pass {
            OpenPass::Render(pass) => {
                if rebuilt || opened {
                    for (index, group) in &self.bind_groups {
                        pass.set_bind_group(*index, group, &[]);
                    }
                }
                Ok(pass)
            }
            _ => Err(DeviceError::Backend("render pass did not open".to_string())),
        }
    }

    /// The compute pass a dispatch goes into, with the current bind groups set.
    fn dispatch_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Result<&mut wgpu::ComputePass<'static>, DeviceError> {
        let rebuilt = self.refresh_bind_groups()?;
        let opened = !matches!(self.pass, OpenPass::Compute(_));
        if opened {
            self.close_pass();
            let mut pass = encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(self.label),
                    timestamp_writes: None,
                })
                .forget_lifetime();
            if let Some((WgpuPipeline::Compute(pipeline), _)) = &self.pipeline {
                pass.set_pipeline(pipeline);
            }
            self.pass = OpenPass::Compute(pass);
        }
        match &mut self.pass {
            OpenPass::Compute(pass) => {
                if rebuilt || opened {
                    for (index, group) in &self.bind_groups {
                        pass.set_bind_group(*index, group, &[]);
                    }
                }
                Ok(pass)
            }
            _ => Err(DeviceError::Backend("compute pass did not open".to_string())),
        }
    }

    /// The resource bound to `slot`, or an error naming the empty slot.
    fn binding_resource(&self, slot: BindingSlot) -> Result<wgpu::BindingResource<'_>, DeviceError> {
        let unbound = |kind: &str| {
            missing(
                self.label,
                format!(
                    "no {kind} at slot {} (@group({}) @binding({}))",
                    slot.binding, slot.group, slot.binding
                ),
            )
        };
        match slot.group {
            CONSTANT_GROUP => {
                let (buffer, handle) = self
                    .constants
                    .get(&slot.binding)
                    .ok_or_else(|| unbound("constant buffer"))?;
                Ok(wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: buffer.as_ref(),
                    offset: handle.offset,
                    size: wgpu::BufferSize::new(handle.size),
                }))
            }
            TEXTURE_GROUP => self
                .textures
                .get(&slot.binding)
                .map(|view| wgpu::BindingResource::TextureView(view.as_ref()))
                .ok_or_else(|| unbound("texture")),
            SAMPLER_GROUP => self
                .samplers
                .get(&slot.binding)
                .map(|sampler| wgpu::BindingResource::Sampler(sampler.as_ref()))
                .ok_or_else(|| unbound("sampler")),
            group => Err(missing(
                self.label,
                format!("resources in unsupported bind group {group}"),
            )),
        }
    }

    /// Rebuilds the bind groups of the current pipeline if anything they
    /// depend on changed. Returns whether they were rebuilt.
    fn refresh_bind_groups(&mut self) -> Result<bool, DeviceError> {
        if !self.resources_dirty {
            return Ok(false);
        }
        let Some((pipeline, slots)) = &self.pipeline else {
            self.bind_groups.clear();
            self.resources_dirty = false;
            return Ok(true);
        };

        // Groups below the highest one in use exist in the auto layout even
        // when empty, and every one of them must be set before drawing.
        let group_count = slots.last().map_or(0, |slot| slot.group + 1);
        let mut bind_groups = Vec::new();
        for group in 0..group_count {
            let entries = slots
                .iter()
                .filter(|slot| slot.group == group)
                .map(|slot| {
                    self.binding_resource(*slot).map(|resource| wgpu::BindGroupEntry {
                        binding: slot.binding,
                        resource,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let layout = match pipeline {
                WgpuPipeline::Render(p) => p.get_bind_group_layout(group),
                WgpuPipeline::Compute(p) => p.get_bind_group_layout(group),
            };
            let bind_group =
                self.device
                    .context()
                    .device
                    .create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(self.label),
                        layout: &layout,
                        entries: &entries,
                    });
            bind_groups.push((group, bind_group));
        }
        self.bind_groups = bind_groups;
        self.resources_dirty = false;
        Ok(true)
    }

    fn clear_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        color: Option<wgpu::RenderPassColorAttachment<'_>>,
        depth: Option<wgpu::RenderPassDepthStencilAttachment<'_>>,
    ) {
        self.close_pass();
        let color_attachments: Vec<_> = color.into_iter().map(Some).collect();
        // Dropped right away: the load op does the clearing.
        drop(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        }));
    }

    fn apply(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        command: &RenderCommand,
    ) -> Result<(), DeviceError> {
        match command {
            RenderCommand::PushDebugGroup(name) => {
                self.close_pass();
                encoder.push_debug_group(name);
            }
            RenderCommand::PopDebugGroup => {
                self.close_pass();
                encoder.pop_debug_group();
            }
            RenderCommand::SetPipeline(id) => {
                let pipeline = self
                    .device
                    .get_wgpu_pipeline(*id)
                    .ok_or_else(|| missing(self.label, format!("destroyed pipeline {id:?}")))?;
                match (&mut self.pass, &pipeline.0) {
                    (OpenPass::Render(pass), WgpuPipeline::Render(p)) => pass.set_pipeline(p),
                    (OpenPass::Compute(pass), WgpuPipeline::Compute(p)) => pass.set_pipeline(p),
                    _ => {}
                }
                self.pipeline = Some(pipeline);
                self.resources_dirty = true;
            }
            RenderCommand::SetViewport(v) => {
                if let OpenPass::Render(pass) = &mut self.pass {
                    pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
                }
                self.viewport = Some(*v);
            }
            RenderCommand::SetScissor(s) => {
                if let OpenPass::Render(pass) = &mut self.pass {
                    pass.set_scissor_rect(s.x, s.y, s.width, s.height);
                }
                self.scissor = Some(*s);
            }
            RenderCommand::SetVertexBuffer(handle) => {
                let buffer = self.device.get_wgpu_buffer(handle.buffer).ok_or_else(|| {
                    missing(self.label, format!("unknown buffer {:?}", handle.buffer))
                })?;
                if let OpenPass::Render(pass) = &mut self.pass {
                    pass.set_vertex_buffer(0, buffer.slice(handle.offset..));
                }
                self.vertex_buffer = Some((buffer, *handle));
            }
            RenderCommand::SetIndexBuffer(handle) => {
                let buffer = self.device.get_wgpu_buffer(handle.buffer).ok_or_else(|| {
                    missing(self.label, format!("unknown buffer {:?}", handle.buffer))
                })?;
                if let OpenPass::Render(pass) = &mut self.pass {
                    pass.set_index_buffer(buffer.slice(handle.offset..), handle.format.into_wgpu());
                }
                self.index_buffer = Some((buffer, *handle));
            }
            // Visibility comes from the pipeline's layout, so the scope is not needed here.
            RenderCommand::SetConstantBuffer { slot, buffer, .. } => {
                let wgpu_buffer = self.device.get_wgpu_buffer(buffer.buffer).ok_or_else(|| {
                    missing(self.label, format!("unknown buffer {:?}", buffer.buffer))
                })?;
                self.constants.insert(*slot, (wgpu_buffer, *buffer));
                self.resources_dirty = true;
            }
            RenderCommand::SetTexture { slot, texture } => {
                match texture {
                    Some(texture) => {
                        let view = self.device.get_wgpu_texture_view(texture.view).ok_or_else(|| {
                            missing(self.label, format!("unknown view {:?}", texture.view))
                        })?;
                        self.textures.insert(*slot, view);
                    }
                    None => {
                        self.textures.remove(slot);
                    }
                }
                self.resources_dirty = true;
            }
            RenderCommand::SetSampler { slot, sampler } => {
                let wgpu_sampler = self.device.get_wgpu_sampler(sampler.sampler).ok_or_else(|| {
                    missing(self.label, format!("unknown sampler {:?}", sampler.sampler))
                })?;
                self.samplers.insert(*slot, wgpu_sampler);
                self.resources_dirty = true;
            }
            RenderCommand::SetRenderTargets { color, depth } => {
                self.close_pass();
                self.color = color.iter().map(|t| self.view(t)).collect::<Result<_, _>>()?;
                self.depth = depth
                    .as_ref()
                    .map(|t| self.view(t).map(|view| (view, t.format.has_stencil())))
                    .transpose()?;
            }
            RenderCommand::ClearRenderTarget { target, color } => {
                let view = self.view(target)?;
                self.clear_pass(
                    encoder,
                    Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear((*color).into_wgpu()),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    }),
                    None,
                );
            }
            RenderCommand::ClearDepthStencil { target, clear } => {
                let view = self.view(target)?;
                let depth_ops = wgpu::Operations {
                    load: clear.depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                    store: wgpu::StoreOp::Store,
                };
                let stencil_ops = target.format.has_stencil().then(|| wgpu::Operations {
                    load: clear.stencil.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                    store: wgpu::StoreOp::Store,
                });
                self.clear_pass(
                    encoder,
                    None,
                    Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &view,
                        depth_ops: Some(depth_ops),
                        stencil_ops,
                    }),
                );
            }
            RenderCommand::Draw {
                vertex_count,
                first_vertex,
            } => {
                let pass = self.draw_pass(encoder)?;
                pass.draw(*first_vertex..first_vertex + vertex_count, 0..1);
            }
            RenderCommand::DrawIndexed {
                index_count,
                first_index,
                base_vertex,
            } => {
                let pass = self.draw_pass(encoder)?;
                pass.draw_indexed(*first_index..first_index + index_count, *base_vertex, 0..1);
            }
            RenderCommand::Dispatch { x, y, z } => {
                let pass = self.dispatch_pass(encoder)?;
                pass.dispatch_workgroups(*x, *y, *z);
            }
        }
        Ok(())
    }
}

/// Replays `commands` into `encoder`.
pub(super) fn encode_stream(
    device: &WgpuDevice,
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    commands: &[RenderCommand],
) -> Result<(), DeviceError> {
    let mut replay = Replay {
        device,
        label,
        pass: OpenPass::None,
        color: Vec::new(),
        depth: None,
        pipeline: None,
        viewport: None,
        scissor: None,
        vertex_buffer: None,
        index_buffer: None,
        constants: BTreeMap::new(),
        textures: BTreeMap::new(),
        samplers: BTreeMap::new(),
        resources_dirty: false,
        bind_groups: Vec::new(),
    };
    for command in commands {
        replay.apply(encoder, command)?;
    }
    replay.close_pass();
    Ok(())
}
