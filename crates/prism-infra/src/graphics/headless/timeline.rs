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

//! A monotonic fence counter shared by the CPU side and the GPU thread.

use prism_core::renderer::{DeviceError, FenceId};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TimelineState {
    issued: u64,
    completed: u64,
    lost: bool,
}

/// Fence `n` is signaled once `completed >= n`. Fences are issued in
/// submission order and the GPU thread completes them in the same order.
#[derive(Debug, Default)]
pub(crate) struct Timeline {
    state: Mutex<TimelineState>,
    progressed: Condvar,
}

impl Timeline {
    fn lock(&self) -> MutexGuard<'_, TimelineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserves the next fence value.
    pub(crate) fn issue(&self) -> Result<FenceId, DeviceError> {
        let mut state = self.lock();
        if state.lost {
            return Err(DeviceError::DeviceLost);
        }
        state.issued += 1;
        Ok(FenceId(state.issued))
    }

    /// Gives back the most recently issued fence if it never reached the GPU.
    pub(crate) fn revoke(&self, fence: FenceId) {
        let mut state = self.lock();
        if state.issued == fence.0 {
            state.issued -= 1;
        }
    }

    pub(crate) fn signal(&self, fence: FenceId) {
        let mut state = self.lock();
        state.completed = state.completed.max(fence.0);
        self.progressed.notify_all();
    }

    pub(crate) fn mark_lost(&self) {
        self.lock().lost = true;
        self.progressed.notify_all();
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lock().lost
    }

    pub(crate) fn issued(&self) -> FenceId {
        FenceId(self.lock().issued)
    }

    pub(crate) fn completed(&self) -> FenceId {
        FenceId(self.lock().completed)
    }

    pub(crate) fn is_signaled(&self, fence: FenceId) -> Result<bool, DeviceError> {
        let state = self.lock();
        if state.lost {
            return Err(DeviceError::DeviceLost);
        }
        if fence.0 > state.issued {
            return Err(DeviceError::UnknownFence(fence));
        }
        Ok(state.completed >= fence.0)
    }

    /// Blocks until `fence` signals, the device is lost, or `timeout` elapses.
    pub(crate) fn wait(&self, fence: FenceId, timeout: Duration) -> Result<(), DeviceError> {
        let start = Instant::now();
        let mut state = self.lock();
        if fence.0 > state.issued {
            return Err(DeviceError::UnknownFence(fence));
        }
        loop {
            if state.lost {
                return Err(DeviceError::DeviceLost);
            }
            if state.completed >= fence.0 {
                return Ok(());
            }
            let waited = start.elapsed();
            let Some(remaining) = timeout.checked_sub(waited).filter(|d| !d.is_zero()) else {
                return Err(DeviceError::Timeout {
                    fence: Some(fence),
                    waited,
                });
            };
            state = self
                .progressed
                .wait_timeout(state, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fences_signal_in_order() {
        let timeline = Timeline::default();
        let first = timeline.issue().unwrap();
        let second = timeline.issue().unwrap();

        timeline.signal(first);

        assert!(timeline.is_signaled(first).unwrap());
        assert!(!timeline.is_signaled(second).unwrap());
        assert!(matches!(
            timeline.is_signaled(FenceId(9)),
            Err(DeviceError::UnknownFence(FenceId(9)))
        ));
    }

    #[test]
    fn wait_times_out_without_progress() {
        let timeline = Timeline::default();
        let fence = timeline.issue().unwrap();

        let err = timeline.wait(fence, Duration::from_millis(20)).unwrap_err();

        assert!(matches!(err, DeviceError::Timeout { fence: Some(f), .. } if f == fence));
    }

    #[test]
    fn wait_wakes_on_signal_from_another_thread() {
        let timeline = Arc::new(Timeline::default());
        let fence = timeline.issue().unwrap();
        let signaler = Arc::clone(&timeline);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            signaler.signal(fence);
        });

        timeline.wait(fence, Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn loss_wakes_waiters_with_an_error() {
        let timeline = Arc::new(Timeline::default());
        let fence = timeline.issue().unwrap();
        let killer = Arc::clone(&timeline);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            killer.mark_lost();
        });

        assert!(matches!(
            timeline.wait(fence, Duration::from_secs(5)),
            Err(DeviceError::DeviceLost)
        ));
        handle.join().unwrap();
        assert!(matches!(timeline.issue(), Err(DeviceError::DeviceLost)));
    }
}
