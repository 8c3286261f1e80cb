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

/// Identifies an open profiling scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeToken(pub u64);

/// Observes the marker scopes of command lists.
///
/// `begin_scope` is called when a marker opens and `end_scope` with the same
/// token when it closes, on the recording thread.
pub trait PassProfiler: Send + Sync {
    /// A marker scope named `name` opened.
    fn begin_scope(&self, name: &str) -> ScopeToken;

    /// The scope identified by `token` closed.
    fn end_scope(&self, token: ScopeToken);
}
