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

use super::CommandList;
use crate::renderer::api::RhiSettings;
use crate::renderer::error::CommandListError;
use crate::renderer::pipeline_cache::PipelineCache;
use crate::renderer::traits::{PassProfiler, RhiDevice};
use std::sync::Arc;

/// One [`CommandList`] per frame-in-flight slot.
///
/// Frame `n` records into slot `n % max_frames_in_flight`, so the CPU can
/// record a frame while the GPU is still executing the previous ones. A slot
/// that comes around again waits for its own previous submission on `begin`.
#[derive(Debug)]
pub struct FrameCommandLists {
    lists: Vec<CommandList>,
}

impl FrameCommandLists {
    /// Creates `settings.max_frames_in_flight` lists named `"{name}[slot]"`.
    pub fn new(
        name: &str,
        device: Arc<dyn RhiDevice>,
        cache: Arc<PipelineCache>,
        profiler: Option<Arc<dyn PassProfiler>>,
        settings: &RhiSettings,
    ) -> Self {
        let slots = settings.max_frames_in_flight.max(1);
        let lists = (0..slots)
            .map(|slot| {
                let list = CommandList::new(
                    format!("{name}[{slot}]"),
                    Arc::clone(&device),
                    Arc::clone(&cache),
                    settings,
                );
                match &profiler {
                    Some(profiler) => list.with_profiler(Arc::clone(profiler)),
                    None => list,
                }
            })
            .collect();
        Self { lists }
    }

    /// The number of slots.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Always `false`; there is at least one slot.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// The list for `frame_index`.
    pub fn for_frame(&mut self, frame_index: u64) -> &mut CommandList {
        let slot = (frame_index % self.lists.len() as u64) as usize;
        &mut self.lists[slot]
    }

    /// Iterates over every slot.
    pub fn iter(&self) -> impl Iterator<Item = &CommandList> {
        self.lists.iter()
    }

    /// Waits for the device to go idle and returns every slot to `Idle`.
    pub fn flush_all(&mut self) -> Result<(), CommandListError> {
        for list in &mut self.lists {
            list.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::*;
    use crate::test_support::{FakeDevice, VS_PS_SOURCE};
    use crate::renderer::ShaderUnit;

    #[test]
    fn frames_rotate_through_the_slots() {
        let device = FakeDevice::new();
        let settings = RhiSettings {
            max_frames_in_flight: 3,
            ..RhiSettings::default()
        };
        let cache = Arc::new(PipelineCache::new(device.clone(), &settings));
        let mut lists = FrameCommandLists::new("frame", device, cache, None, &settings);

        assert_eq!(lists.len(), 3);
        assert_eq!(lists.for_frame(0).name(), "frame[0]");
        assert_eq!(lists.for_frame(4).name(), "frame[1]");
        assert_eq!(lists.for_frame(5).name(), "frame[2]");
    }

    #[test]
    fn flush_all_returns_every_slot_to_idle() {
        let device = FakeDevice::new();
        let settings = RhiSettings::default();
        let cache = Arc::new(PipelineCache::new(device.clone(), &settings));
        let unit = ShaderUnit::compiled(
            device.clone(),
            ShaderKind::VertexPixel,
            ShaderSource::inline("quad", VS_PS_SOURCE),
            InputLayoutSignature::POSITION,
        );
        let descriptor = PipelineStateDescriptor::builder()
            .stages(&unit.compiled_stages().unwrap())
            .render_target(TextureFormat::Bgra8UnormSrgb)
            .build()
            .unwrap();
        let mut lists = FrameCommandLists::new("frame", device.clone(), cache, None, &settings);

        for frame in 0..2 {
            let list = lists.for_frame(frame);
            list.begin(&descriptor).unwrap();
            list.end().unwrap();
            list.submit().unwrap();
        }
        assert!(lists
            .iter()
            .all(|l| l.state() == CommandListState::IdleSyncCpuToGpu));

        lists.flush_all().unwrap();

        assert!(lists.iter().all(|l| l.state() == CommandListState::Idle));
        assert_eq!(device.pipeline_builds(), 1);
    }
}
