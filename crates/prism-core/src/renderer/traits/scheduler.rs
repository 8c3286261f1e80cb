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

/// A unit of background work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks off the calling thread.
///
/// There is no ordering guarantee between tasks. A scheduler that can no
/// longer accept work (for example after shutdown) must still run the task,
/// inline if necessary, so that work such as a shader compile always reaches
/// a terminal state.
pub trait TaskScheduler: Send + Sync {
    /// Enqueues `task`.
    fn schedule(&self, task: Task);
}
