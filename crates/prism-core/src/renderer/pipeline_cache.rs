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

//! Deduplicating cache from pipeline state descriptors to native pipelines.
//!
//! The first caller to miss on a descriptor becomes its builder and runs
//! the backend build outside the cache lock. Callers arriving while the
//! build runs wait on that build's slot and receive the same pipeline, or
//! the same error. Failed builds leave no entry behind, so the next resolve
//! tries again.

use crate::renderer::api::{
    PipelineCacheStats, PipelineKind, PipelineStateDescriptor, RenderPipelineId, RhiSettings,
};
use crate::renderer::error::PipelineError;
use crate::renderer::traits::RhiDevice;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// A native pipeline owned by the cache. Destroyed when the last reference drops.
pub struct CachedPipeline {
    id: RenderPipelineId,
    kind: PipelineKind,
    label: String,
    last_used_frame: AtomicU64,
    device: Arc<dyn RhiDevice>,
}

impl CachedPipeline {
    /// The backend handle.
    pub fn id(&self) -> RenderPipelineId {
        self.id
    }

    /// Graphics or compute.
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// The label derived from the descriptor.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The last frame this pipeline was resolved in.
    pub fn last_used_frame(&self) -> u64 {
        self.last_used_frame.load(Ordering::Relaxed)
    }

    fn touch(&self, frame: u64) {
        self.last_used_frame.fetch_max(frame, Ordering::Relaxed);
    }
}

impl fmt::Debug for CachedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedPipeline")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .finish()
    }
}

impl Drop for CachedPipeline {
    fn drop(&mut self) {
        match self.device.destroy_pipeline(self.id) {
            Ok(()) => log::debug!("Released pipeline '{}' ({:?})", self.label, self.id),
            Err(e) => log::warn!("Failed to release pipeline '{}': {}", self.label, e),
        }
    }
}

type BuildResult = Result<Arc<CachedPipeline>, PipelineError>;

/// The rendezvous point for callers waiting on an in-progress build.
#[derive(Default)]
struct PendingBuild {
    result: Mutex<Option<BuildResult>>,
    done: Condvar,
}

impl PendingBuild {
    fn complete(&self, result: BuildResult) {
        let mut slot = self
            .result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(result);
        self.done.notify_all();
    }

    fn wait(&self) -> BuildResult {
        let mut slot = self
            .result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self
                .done
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

enum Slot {
    Building(Arc<PendingBuild>),
    Ready(Arc<CachedPipeline>),
}

enum Lookup {
    Hit(Arc<CachedPipeline>),
    Wait(Arc<PendingBuild>),
    Build(Arc<PendingBuild>),
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

/// Maps each distinct [`PipelineStateDescriptor`] to one native pipeline.
///
/// Shared between command lists through an `Arc`.
pub struct PipelineCache {
    device: Arc<dyn RhiDevice>,
    slots: Mutex<HashMap<PipelineStateDescriptor, Slot>>,
    current_frame: AtomicU64,
    eviction_frames: u64,
    counters: Counters,
}

impl fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineCache")
            .field("stats", &self.stats())
            .field("eviction_frames", &self.eviction_frames)
            .finish()
    }
}

/// Cleans up the slot if the builder unwinds before publishing.
struct BuildGuard<'a> {
    cache: &'a PipelineCache,
    descriptor: &'a PipelineStateDescriptor,
    pending: Arc<PendingBuild>,
    finished: bool,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.cache.lock().remove(self.descriptor);
        self.pending
            .complete(Err(PipelineError::CompilationFailed {
                label: Some(self.descriptor.label()),
                details: "pipeline build was abandoned".to_string(),
            }));
    }
}

impl PipelineCache {
    /// Creates an empty cache building through `device`.
    pub fn new(device: Arc<dyn RhiDevice>, settings: &RhiSettings) -> Self {
        Self {
            device,
            slots: Mutex::new(HashMap::new()),
            current_frame: AtomicU64::new(0),
            eviction_frames: settings.pipeline_eviction_frames,
            counters: Counters::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PipelineStateDescriptor, Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the pipeline for `descriptor`, building it on first use.
    ///
    /// # Errors
    /// Returns the validation error for an incomplete descriptor, or the
    /// backend error if the build fails. Nothing is cached on failure.
    pub fn resolve(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<Arc<CachedPipeline>, PipelineError> {
        descriptor.validate()?;
        let frame = self.current_frame.load(Ordering::Relaxed);

        let lookup = {
            let mut slots = self.lock();
            match slots.get(descriptor) {
                Some(Slot::Ready(pipeline)) => Lookup::Hit(Arc::clone(pipeline)),
                Some(Slot::Building(pending)) => Lookup::Wait(Arc::clone(pending)),
                None => {
                    let pending = Arc::new(PendingBuild::default());
                    slots.insert(descriptor.clone(), Slot::Building(Arc::clone(&pending)));
                    Lookup::Build(pending)
                }
            }
        };

        match lookup {
            Lookup::Hit(pipeline) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                pipeline.touch(frame);
                log::trace!("Pipeline cache hit for '{}'", pipeline.label());
                Ok(pipeline)
            }
            Lookup::Wait(pending) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "Waiting for in-flight build of '{}'",
                    descriptor.label()
                );
                let pipeline = pending.wait()?;
                pipeline.touch(frame);
                Ok(pipeline)
            }
            Lookup::Build(pending) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.build(descriptor, pending, frame)
            }
        }
    }

    fn build(
        &self,
        descriptor: &PipelineStateDescriptor,
        pending: Arc<PendingBuild>,
        frame: u64,
    ) -> BuildResult {
        let mut guard = BuildGuard {
            cache: self,
            descriptor,
            pending: Arc::clone(&pending),
            finished: false,
        };

        let label = descriptor.label();
        let result = match self.device.create_pipeline(descriptor) {
            Ok(id) => {
                self.counters.builds.fetch_add(1, Ordering::Relaxed);
                log::info!("Built pipeline '{label}' ({id:?})");
                let pipeline = Arc::new(CachedPipeline {
                    id,
                    kind: descriptor.kind(),
                    label,
                    last_used_frame: AtomicU64::new(frame),
                    device: Arc::clone(&self.device),
                });
                self.lock()
                    .insert(descriptor.clone(), Slot::Ready(Arc::clone(&pipeline)));
                Ok(pipeline)
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                log::error!("Failed to build pipeline '{label}': {e}");
                self.lock().remove(descriptor);
                Err(e)
            }
        };

        guard.finished = true;
        pending.complete(result.clone());
        result
    }

    /// Returns `true` if a built pipeline exists for `descriptor`.
    pub fn contains(&self, descriptor: &PipelineStateDescriptor) -> bool {
        matches!(self.lock().get(descriptor), Some(Slot::Ready(_)))
    }

    /// The number of built pipelines.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Returns `true` if no pipeline is built.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records the start of `frame` and evicts stale pipelines.
    ///
    /// Returns the number of evicted entries.
    pub fn begin_frame(&self, frame: u64) -> usize {
        self.current_frame.fetch_max(frame, Ordering::Relaxed);
        self.evict_unused()
    }

    /// Drops pipelines that nothing outside the cache references and that
    /// were last resolved more than `pipeline_eviction_frames` frames ago.
    pub fn evict_unused(&self) -> usize {
        let frame = self.current_frame.load(Ordering::Relaxed);
        let threshold = self.eviction_frames;
        let mut evicted = Vec::new();
        {
            let mut slots = self.lock();
            slots.retain(|_, slot| match slot {
                Slot::Ready(pipeline) => {
                    let stale = frame.saturating_sub(pipeline.last_used_frame()) > threshold;
                    if stale && Arc::strong_count(pipeline) == 1 {
                        evicted.push(Arc::clone(pipeline));
                        false
                    } else {
                        true
                    }
                }
                Slot::Building(_) => true,
            });
        }
        let count = evicted.len();
        if count > 0 {
            self.counters
                .evictions
                .fetch_add(count as u64, Ordering::Relaxed);
            log::debug!("Evicted {count} unused pipeline(s) at frame {frame}");
        }
        // Native objects are released here, outside the lock.
        drop(evicted);
        count
    }

    /// Drops every built pipeline, for example after a device reset.
    /// Pipelines still referenced by in-flight recordings live until those
    /// references drop.
    pub fn clear(&self) -> usize {
        let removed: Vec<_> = {
            let mut slots = self.lock();
            let keys: Vec<_> = slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter().filter_map(|key| slots.remove(key)).collect()
        };
        log::info!("Cleared {} pipeline(s) from the cache", removed.len());
        removed.len()
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            builds: self.counters.builds.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            live_entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::*;
    use crate::test_support::{FakeDevice, VS_PS_SOURCE};
    use crate::renderer::ShaderUnit;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    fn unit(device: &Arc<FakeDevice>) -> ShaderUnit {
        ShaderUnit::compiled(
            device.clone(),
            ShaderKind::VertexPixel,
            ShaderSource::inline("quad", VS_PS_SOURCE),
            InputLayoutSignature::POSITION,
        )
    }

    fn descriptor(unit: &ShaderUnit) -> PipelineStateDescriptor {
        PipelineStateDescriptor::builder()
            .stages(&unit.compiled_stages().unwrap())
            .render_target(TextureFormat::Bgra8UnormSrgb)
            .build()
            .unwrap()
    }

    #[test]
    fn second_resolve_is_a_hit() {
        let device = FakeDevice::new();
        let cache = PipelineCache::new(device.clone(), &RhiSettings::default());
        let shader = unit(&device);

        let a = cache.resolve(&descriptor(&shader)).unwrap();
        let b = cache.resolve(&descriptor(&shader)).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(device.pipeline_builds(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.builds), (1, 1, 1));
    }

    #[test]
    fn differing_field_builds_a_second_pipeline() {
        let device = FakeDevice::new();
        let cache = PipelineCache::new(device.clone(), &RhiSettings::default());
        let shader = unit(&device);

        let a = cache.resolve(&descriptor(&shader)).unwrap();
        let mut other = descriptor(&shader);
        other.topology = PrimitiveTopology::LineList;
        let b = cache.resolve(&other).unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_build_is_not_cached() {
        let device = FakeDevice::new();
        let cache = PipelineCache::new(device.clone(), &RhiSettings::default());
        let shader = unit(&device);
        let desc = descriptor(&shader);

        device.fail_builds.store(true, Ordering::SeqCst);
        assert!(matches!(
            cache.resolve(&desc),
            Err(PipelineError::CompilationFailed { .. })
        ));
        assert!(!cache.contains(&desc));

        device.fail_builds.store(false, Ordering::SeqCst);
        assert!(cache.resolve(&desc).is_ok());
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn incomplete_descriptor_never_reaches_the_device() {
        let device = FakeDevice::new();
        let cache = PipelineCache::new(device.clone(), &RhiSettings::default());
        let result = cache.resolve(&PipelineStateDescriptor::default());
        assert!(matches!(result, Err(PipelineError::IncompleteDescriptor(_))));
        assert_eq!(device.pipeline_builds(), 0);
    }

    #[test]
    fn concurrent_misses_build_once() {
        let device = FakeDevice::with_build_delay(Duration::from_millis(30));
        let cache = Arc::new(PipelineCache::new(device.clone(), &RhiSettings::default()));
        let shader = unit(&device);
        let desc = descriptor(&shader);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let desc = desc.clone();
                thread::spawn(move || cache.resolve(&desc).unwrap())
            })
            .collect();
        let pipelines: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(device.pipeline_builds(), 1);
        for pipeline in &pipelines[1..] {
            assert!(Arc::ptr_eq(&pipelines[0], pipeline));
        }
    }

    #[test]
    fn eviction_skips_referenced_and_recent_pipelines() {
        let device = FakeDevice::new();
        let settings = RhiSettings {
            pipeline_eviction_frames: 2,
            ..RhiSettings::default()
        };
        let cache = PipelineCache::new(device.clone(), &settings);
        let shader = unit(&device);

        let held = cache.resolve(&descriptor(&shader)).unwrap();
        let mut other = descriptor(&shader);
        other.blend = BlendState::additive();
        drop(cache.resolve(&other).unwrap());

        assert_eq!(cache.begin_frame(2), 0);
        assert_eq!(cache.begin_frame(10), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(device.live_pipelines(), 1);

        drop(held);
        assert_eq!(cache.evict_unused(), 1);
        assert_eq!(device.live_pipelines(), 0);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn clear_releases_unreferenced_pipelines() {
        let device = FakeDevice::new();
        let cache = PipelineCache::new(device.clone(), &RhiSettings::default());
        let shader = unit(&device);
        drop(cache.resolve(&descriptor(&shader)).unwrap());

        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
        assert_eq!(device.live_pipelines(), 0);
    }
}
