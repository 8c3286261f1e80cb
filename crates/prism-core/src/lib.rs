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

//! # Prism Core
//!
//! Backend-agnostic contracts for the Prism render hardware interface: the value
//! types describing pipeline state, the device and scheduler traits a backend
//! implements, and the recording logic built on top of them (shader units,
//! the pipeline cache and the command list state machine).

#![warn(missing_docs)]

pub mod renderer;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
