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

//! Shader units: source to native stages, with pollable per-stage state.
//!
//! A [`ShaderUnit`] is a shared handle. Every compile request bumps a
//! generation counter; only the newest request may publish its result, so
//! overlapping synchronous and asynchronous compiles always settle on the
//! most recent request. Results are published by swapping the whole
//! snapshot under one lock, so readers see either the complete old set of
//! stage handles or the complete new one.

use crate::renderer::api::{
    CompilationState, CompiledStages, InputLayout, InputLayoutSignature, ShaderKind,
    ShaderModuleDescriptor, ShaderModuleId, ShaderSource, ShaderStage,
};
use crate::renderer::error::ShaderError;
use crate::renderer::traits::{RhiDevice, TaskScheduler};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

/// A compiled native stage. Releases the backend object when dropped.
pub(crate) struct NativeShader {
    id: ShaderModuleId,
    stage: ShaderStage,
    device: Arc<dyn RhiDevice>,
}

impl NativeShader {
    pub(crate) fn id(&self) -> ShaderModuleId {
        self.id
    }
}

impl fmt::Debug for NativeShader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeShader")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .finish()
    }
}

impl Drop for NativeShader {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_shader(self.id) {
            log::warn!(
                "Failed to release {} stage {:?}: {}",
                self.stage,
                self.id,
                e
            );
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    label: String,
    kind: Option<ShaderKind>,
    signature: InputLayoutSignature,
    state: CompilationState,
    stage_states: [CompilationState; 3],
    stages: [Option<Arc<NativeShader>>; 3],
    input_layout: Option<InputLayout>,
    diagnostic: Option<ShaderError>,
    generation: u64,
}

struct CompileOutcome {
    label: String,
    stages: Vec<(ShaderStage, Result<NativeShader, ShaderError>)>,
    input_layout: Option<InputLayout>,
}

struct ShaderUnitInner {
    device: Arc<dyn RhiDevice>,
    snapshot: Mutex<Snapshot>,
    settled: Condvar,
}

impl ShaderUnitInner {
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        // A panic while holding the lock can only happen between two plain
        // field writes; the snapshot is still coherent enough to read.
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new request and returns its generation.
    fn begin_request(
        &self,
        kind: ShaderKind,
        source: &ShaderSource,
        signature: InputLayoutSignature,
    ) -> u64 {
        let mut snapshot = self.lock();
        snapshot.generation += 1;
        snapshot.label = source.label();
        snapshot.kind = Some(kind);
        snapshot.signature = signature;
        snapshot.state = CompilationState::Compiling;
        for stage in kind.stages() {
            snapshot.stage_states[stage.index()] = CompilationState::Compiling;
        }
        snapshot.generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    fn compile_stages(
        &self,
        kind: ShaderKind,
        source: &ShaderSource,
        signature: InputLayoutSignature,
    ) -> CompileOutcome {
        let label = source.label();
        let code = match source {
            ShaderSource::File(path) => match std::fs::read_to_string(path) {
                Ok(code) => code,
                Err(e) => {
                    let error = ShaderError::LoadError {
                        path: path.display().to_string(),
                        source_error: e.to_string(),
                    };
                    return CompileOutcome {
                        label,
                        stages: kind
                            .stages()
                            .iter()
                            .map(|stage| (*stage, Err(error.clone())))
                            .collect(),
                        input_layout: None,
                    };
                }
            },
            ShaderSource::Inline { code, .. } => code.clone(),
        };

        let layout = InputLayout::from_signature(signature);
        let mut stages = Vec::with_capacity(kind.stages().len());
        let mut built_layout = None;

        // Stages are attempted independently: a pixel failure keeps the vertex handle.
        for &stage in kind.stages() {
            let result = if stage == ShaderStage::Vertex && layout.is_none() {
                Err(ShaderError::EmptyInputLayout {
                    label: label.clone(),
                })
            } else {
                let descriptor = ShaderModuleDescriptor {
                    label: &label,
                    source: &code,
                    stage,
                    entry_point: stage.entry_point(),
                    input_layout: if stage == ShaderStage::Vertex {
                        layout.as_ref()
                    } else {
                        None
                    },
                };
                self.device
                    .compile_shader(&descriptor)
                    .map(|id| NativeShader {
                        id,
                        stage,
                        device: Arc::clone(&self.device),
                    })
            };
            if stage == ShaderStage::Vertex && result.is_ok() {
                built_layout = layout.clone();
            }
            stages.push((stage, result));
        }

        CompileOutcome {
            label,
            stages,
            input_layout: built_layout,
        }
    }

    /// Publishes `outcome` if `generation` is still the newest request.
    fn publish(&self, generation: u64, outcome: CompileOutcome) {
        let mut snapshot = self.lock();
        if snapshot.generation != generation {
            log::debug!(
                "Discarding stale compile of '{}' (generation {} superseded by {})",
                outcome.label,
                generation,
                snapshot.generation
            );
            // Dropping the outcome releases the stale native stages.
            return;
        }

        let mut next = snapshot.clone();
        let mut first_error = None;
        let mut built = Vec::new();
        for (stage, result) in outcome.stages {
            let slot = stage.index();
            match result {
                Ok(native) => {
                    next.stages[slot] = Some(Arc::new(native));
                    next.stage_states[slot] = CompilationState::Built;
                    built.push(stage);
                }
                Err(error) => {
                    next.stages[slot] = None;
                    next.stage_states[slot] = CompilationState::Failed;
                    first_error.get_or_insert(error);
                }
            }
            if stage == ShaderStage::Vertex {
                next.input_layout = outcome.input_layout.clone();
            }
        }

        match first_error {
            None => {
                next.state = CompilationState::Built;
                next.diagnostic = None;
                log::info!(
                    "Successfully compiled shader '{}' ({})",
                    next.label,
                    stage_list(&built)
                );
            }
            Some(error) => {
                next.state = CompilationState::Failed;
                log::error!("Failed to compile shader '{}': {}", next.label, error);
                next.diagnostic = Some(error);
            }
        }

        *snapshot = next;
        drop(snapshot);
        self.settled.notify_all();
    }
}

fn stage_list(stages: &[ShaderStage]) -> String {
    stages
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The message an asynchronous compile carries to the worker.
struct CompileJob {
    unit: Weak<ShaderUnitInner>,
    generation: u64,
    kind: ShaderKind,
    source: ShaderSource,
    signature: InputLayoutSignature,
}

impl CompileJob {
    fn run(self) {
        let Some(inner) = self.unit.upgrade() else {
            log::debug!(
                "Shader '{}' was dropped before its compile ran",
                self.source.label()
            );
            return;
        };
        if !inner.is_current(self.generation) {
            // A newer request will publish; nothing to do.
            return;
        }
        let outcome = inner.compile_stages(self.kind, &self.source, self.signature);
        inner.publish(self.generation, outcome);
    }
}

/// A shader program made of one or two native stages.
///
/// Cloning the handle shares the unit. The native stages are released when
/// the last clone and the last pipeline recording using them are dropped.
#[derive(Clone)]
pub struct ShaderUnit {
    inner: Arc<ShaderUnitInner>,
}

impl fmt::Debug for ShaderUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.inner.lock();
        f.debug_struct("ShaderUnit")
            .field("label", &snapshot.label)
            .field("kind", &snapshot.kind)
            .field("state", &snapshot.state)
            .field("stage_states", &snapshot.stage_states)
            .finish()
    }
}

impl ShaderUnit {
    /// Creates an idle unit compiling through `device`.
    pub fn new(device: Arc<dyn RhiDevice>) -> Self {
        Self {
            inner: Arc::new(ShaderUnitInner {
                device,
                snapshot: Mutex::new(Snapshot {
                    label: "unnamed".to_string(),
                    ..Snapshot::default()
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Creates a unit and compiles it synchronously.
    pub fn compiled(
        device: Arc<dyn RhiDevice>,
        kind: ShaderKind,
        source: ShaderSource,
        signature: InputLayoutSignature,
    ) -> Self {
        let unit = Self::new(device);
        unit.compile(kind, source, signature);
        unit
    }

    /// Compiles the stages selected by `kind` on the calling thread.
    ///
    /// Never fails: the outcome is visible through [`state`](Self::state),
    /// [`stage_state`](Self::stage_state) and [`diagnostic`](Self::diagnostic).
    pub fn compile(
        &self,
        kind: ShaderKind,
        source: ShaderSource,
        signature: InputLayoutSignature,
    ) -> CompilationState {
        let generation = self.inner.begin_request(kind, &source, signature);
        let outcome = self.inner.compile_stages(kind, &source, signature);
        self.inner.publish(generation, outcome);
        self.state()
    }

    /// Marks the unit `Compiling` and compiles on `scheduler`.
    ///
    /// The job holds a weak reference, so dropping every handle before the
    /// job runs cancels it.
    pub fn compile_async(
        &self,
        scheduler: &dyn TaskScheduler,
        kind: ShaderKind,
        source: ShaderSource,
        signature: InputLayoutSignature,
    ) {
        let generation = self.inner.begin_request(kind, &source, signature);
        let job = CompileJob {
            unit: Arc::downgrade(&self.inner),
            generation,
            kind,
            source,
            signature,
        };
        scheduler.schedule(Box::new(move || job.run()));
    }

    /// Blocks until the newest request settles or `timeout` elapses, and
    /// returns the state at that point.
    pub fn wait_until_settled(&self, timeout: Duration) -> CompilationState {
        let deadline = Instant::now() + timeout;
        let mut snapshot = self.inner.lock();
        while snapshot.state == CompilationState::Compiling {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            snapshot = match self.inner.settled.wait_timeout(snapshot, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        snapshot.state
    }

    /// The overall state: `Built` only if every requested stage built.
    pub fn state(&self) -> CompilationState {
        self.inner.lock().state
    }

    /// The state of a single stage.
    pub fn stage_state(&self, stage: ShaderStage) -> CompilationState {
        self.inner.lock().stage_states[stage.index()]
    }

    /// The native handle of a stage, if it is built.
    pub fn stage_id(&self, stage: ShaderStage) -> Option<ShaderModuleId> {
        self.inner.lock().stages[stage.index()]
            .as_ref()
            .map(|native| native.id())
    }

    /// The layout derived for the vertex stage.
    pub fn input_layout(&self) -> Option<InputLayout> {
        self.inner.lock().input_layout.clone()
    }

    /// The error of the last failed request.
    pub fn diagnostic(&self) -> Option<ShaderError> {
        self.inner.lock().diagnostic.clone()
    }

    /// The label of the last requested source.
    pub fn label(&self) -> String {
        self.inner.lock().label.clone()
    }

    /// The kind of the last request.
    pub fn kind(&self) -> Option<ShaderKind> {
        self.inner.lock().kind
    }

    /// Returns `true` if two handles share the same unit.
    pub fn ptr_eq(&self, other: &ShaderUnit) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Every built stage and the input layout, if the unit is `Built`.
    pub fn compiled_stages(&self) -> Option<CompiledStages> {
        let snapshot = self.inner.lock();
        if snapshot.state != CompilationState::Built {
            return None;
        }
        let id = |stage: ShaderStage| {
            snapshot.stages[stage.index()]
                .as_ref()
                .map(|native| native.id())
        };
        Some(CompiledStages {
            vertex: id(ShaderStage::Vertex),
            pixel: id(ShaderStage::Pixel),
            compute: id(ShaderStage::Compute),
            input_layout: snapshot.input_layout.clone(),
        })
    }

    /// The native stage for binding, if the unit as a whole is `Built`.
    pub(crate) fn bindable_stage(
        &self,
        stage: ShaderStage,
    ) -> Option<(Arc<NativeShader>, Option<InputLayout>)> {
        let snapshot = self.inner.lock();
        if snapshot.state != CompilationState::Built {
            return None;
        }
        let native = snapshot.stages[stage.index()].clone()?;
        Some((native, snapshot.input_layout.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDevice, InlineScheduler, QueuedScheduler, VS_PS_SOURCE};

    fn vertex_pixel(device: &Arc<FakeDevice>, code: &str) -> ShaderUnit {
        ShaderUnit::compiled(
            device.clone(),
            ShaderKind::VertexPixel,
            ShaderSource::inline("quad", code),
            InputLayoutSignature::POSITION_TEXCOORD,
        )
    }

    #[test]
    fn vertex_pixel_builds_both_stages() {
        let device = FakeDevice::new();
        let unit = vertex_pixel(&device, VS_PS_SOURCE);

        assert_eq!(unit.state(), CompilationState::Built);
        assert_eq!(unit.stage_state(ShaderStage::Vertex), CompilationState::Built);
        assert_eq!(unit.stage_state(ShaderStage::Pixel), CompilationState::Built);
        assert_eq!(unit.stage_state(ShaderStage::Compute), CompilationState::Idle);
        assert!(unit.stage_id(ShaderStage::Vertex).is_some());
        assert_eq!(unit.input_layout().unwrap().stride(), 20);
        assert!(unit.diagnostic().is_none());
    }

    #[test]
    fn failed_pixel_stage_keeps_vertex_stage() {
        let device = FakeDevice::new();
        let unit = vertex_pixel(&device, "fn vs_main() {}");

        assert_eq!(unit.state(), CompilationState::Failed);
        assert_eq!(unit.stage_state(ShaderStage::Vertex), CompilationState::Built);
        assert_eq!(unit.stage_state(ShaderStage::Pixel), CompilationState::Failed);
        assert!(unit.stage_id(ShaderStage::Vertex).is_some());
        assert!(unit.stage_id(ShaderStage::Pixel).is_none());
        assert!(matches!(
            unit.diagnostic(),
            Some(ShaderError::MissingEntryPoint {
                stage: ShaderStage::Pixel,
                ..
            })
        ));
        assert!(unit.compiled_stages().is_none());
        assert!(unit.bindable_stage(ShaderStage::Vertex).is_none());
    }

    #[test]
    fn empty_signature_fails_the_vertex_stage() {
        let device = FakeDevice::new();
        let unit = ShaderUnit::compiled(
            device.clone(),
            ShaderKind::Vertex,
            ShaderSource::inline("no_inputs", VS_PS_SOURCE),
            InputLayoutSignature::EMPTY,
        );
        assert_eq!(unit.state(), CompilationState::Failed);
        assert!(matches!(
            unit.diagnostic(),
            Some(ShaderError::EmptyInputLayout { .. })
        ));
        assert_eq!(device.live_shaders(), 0);
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let device = FakeDevice::new();
        let unit = ShaderUnit::compiled(
            device.clone(),
            ShaderKind::Pixel,
            ShaderSource::File("definitely/not/here.wgsl".into()),
            InputLayoutSignature::EMPTY,
        );
        assert_eq!(unit.state(), CompilationState::Failed);
        assert_eq!(unit.label(), "here.wgsl");
        assert!(matches!(
            unit.diagnostic(),
            Some(ShaderError::LoadError { .. })
        ));
    }

    #[test]
    fn recompile_replaces_stages_and_releases_old_ones() {
        let device = FakeDevice::new();
        let unit = vertex_pixel(&device, VS_PS_SOURCE);
        let first = unit.stage_id(ShaderStage::Vertex).unwrap();
        assert_eq!(device.live_shaders(), 2);

        unit.compile(
            ShaderKind::VertexPixel,
            ShaderSource::inline("quad", VS_PS_SOURCE),
            InputLayoutSignature::POSITION_TEXCOORD,
        );
        let second = unit.stage_id(ShaderStage::Vertex).unwrap();

        assert_ne!(first, second);
        assert_eq!(device.live_shaders(), 2);
    }

    #[test]
    fn pixel_only_recompile_keeps_the_vertex_stage() {
        let device = FakeDevice::new();
        let unit = vertex_pixel(&device, VS_PS_SOURCE);
        let vertex = unit.stage_id(ShaderStage::Vertex);

        unit.compile(
            ShaderKind::Pixel,
            ShaderSource::inline("quad", "fn fs_main() {}"),
            InputLayoutSignature::EMPTY,
        );
        assert_eq!(unit.state(), CompilationState::Built);
        assert_eq!(unit.stage_id(ShaderStage::Vertex), vertex);
    }

    #[test]
    fn async_compile_settles_like_sync() {
        let device = FakeDevice::new();
        let scheduler = InlineScheduler;
        let unit = ShaderUnit::new(device.clone());
        unit.compile_async(
            &scheduler,
            ShaderKind::VertexPixel,
            ShaderSource::inline("quad", VS_PS_SOURCE),
            InputLayoutSignature::POSITION,
        );
        assert_eq!(unit.state(), CompilationState::Built);
    }

    #[test]
    fn superseded_request_never_publishes() {
        let device = FakeDevice::new();
        let scheduler = QueuedScheduler::default();
        let unit = ShaderUnit::new(device.clone());

        // Queue a failing request, then supersede it synchronously.
        unit.compile_async(
            &scheduler,
            ShaderKind::Pixel,
            ShaderSource::inline("broken", "#error"),
            InputLayoutSignature::EMPTY,
        );
        assert_eq!(unit.state(), CompilationState::Compiling);
        unit.compile(
            ShaderKind::Pixel,
            ShaderSource::inline("good", "fn fs_main() {}"),
            InputLayoutSignature::EMPTY,
        );
        scheduler.run_all();

        assert_eq!(unit.state(), CompilationState::Built);
        assert_eq!(unit.label(), "good");
    }

    #[test]
    fn dropped_unit_cancels_queued_job() {
        let device = FakeDevice::new();
        let scheduler = QueuedScheduler::default();
        let unit = ShaderUnit::new(device.clone());
        unit.compile_async(
            &scheduler,
            ShaderKind::Pixel,
            ShaderSource::inline("late", "fn fs_main() {}"),
            InputLayoutSignature::EMPTY,
        );
        drop(unit);
        scheduler.run_all();
        assert_eq!(device.compiles(), 0);
    }

    #[test]
    fn wait_until_settled_times_out_while_queued() {
        let device = FakeDevice::new();
        let scheduler = QueuedScheduler::default();
        let unit = ShaderUnit::new(device.clone());
        unit.compile_async(
            &scheduler,
            ShaderKind::Pixel,
            ShaderSource::inline("queued", "fn fs_main() {}"),
            InputLayoutSignature::EMPTY,
        );
        assert_eq!(
            unit.wait_until_settled(Duration::from_millis(10)),
            CompilationState::Compiling
        );
        scheduler.run_all();
        assert_eq!(
            unit.wait_until_settled(Duration::from_millis(10)),
            CompilationState::Built
        );
    }
}
