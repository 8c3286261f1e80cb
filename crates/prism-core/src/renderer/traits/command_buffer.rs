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

use crate::renderer::api::RenderCommand;
use crate::renderer::error::DeviceError;
use std::any::Any;

/// A backend command buffer receiving one recording.
///
/// It must also implement `Any` so the device that allocated it can recover
/// the concrete type on submit.
pub trait NativeCommandBuffer: Any + Send {
    /// The debug label given at allocation.
    fn label(&self) -> &str;

    /// Appends a validated command.
    fn encode(&mut self, command: RenderCommand) -> Result<(), DeviceError>;

    /// The number of commands encoded so far.
    fn command_count(&self) -> usize;

    /// Returns a reference to the underlying `Any` trait object.
    fn as_any(&self) -> &dyn Any;

    /// Converts the box into `Box<dyn Any>` for downcasting by value.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}
