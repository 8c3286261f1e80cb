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

//! Finds the resource bindings a WGSL entry point reaches.
//!
//! Pipelines use wgpu's automatic layout, which only contains the bindings
//! the entry points actually reference. A bind group must match that layout
//! exactly, so the backend needs the same set when it replays a stream.

use std::collections::{HashMap, HashSet};

/// One `@group(g) @binding(b)` resource declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(super) struct BindingSlot {
    pub(super) group: u32,
    pub(super) binding: u32,
}

/// Returns the sorted bindings referenced by `entry_point` or by any function
/// it calls.
pub(super) fn used_bindings(source: &str, entry_point: &str) -> Vec<BindingSlot> {
    let source = strip_comments(source);
    let functions = function_bodies(&source);

    let mut referenced = HashSet::new();
    let mut reached = HashSet::new();
    let mut pending = vec![entry_point];
    while let Some(name) = pending.pop() {
        if !reached.insert(name) {
            continue;
        }
        let Some(body) = functions.get(name) else {
            continue;
        };
        for ident in identifiers(body) {
            if functions.contains_key(ident) {
                pending.push(ident);
            }
            referenced.insert(ident);
        }
    }

    let mut slots: Vec<_> = declarations(&source)
        .into_iter()
        .filter(|(_, name)| referenced.contains(name))
        .map(|(slot, _)| slot)
        .collect();
    slots.sort_unstable();
    slots.dedup();
    slots
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_ident_char(c))
        .filter(|word| word.chars().next().is_some_and(|c| !c.is_ascii_digit()))
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut block_depth = 0usize;
    while let Some(c) = chars.next() {
        if block_depth > 0 {
            match (c, chars.peek()) {
                ('*', Some('/')) => {
                    chars.next();
                    block_depth -= 1;
                }
                ('/', Some('*')) => {
                    chars.next();
                    block_depth += 1;
                }
                _ => {}
            }
            continue;
        }
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                block_depth = 1;
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Maps each function name to the text between its outer braces.
fn function_bodies(source: &str) -> HashMap<&str, &str> {
    let mut bodies = HashMap::new();
    for (at, _) in source.match_indices("fn") {
        let starts_word = source[..at].chars().next_back().is_none_or(|c| !is_ident_char(c));
        let rest = &source[at + 2..];
        if !starts_word || !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let rest = rest.trim_start();
        let name_len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        let name = &rest[..name_len];
        let Some(open) = rest.find('{') else {
            continue;
        };
        let body = &rest[open + 1..];
        let mut depth = 1usize;
        let close = body.char_indices().find_map(|(i, c)| {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            (depth == 0).then_some(i)
        });
        match close {
            Some(close) if !name.is_empty() => {
                bodies.insert(name, &body[..close]);
            }
            _ => {}
        }
    }
    bodies
}

fn attribute_value(declaration: &str, attribute: &str) -> Option<u32> {
    let at = declaration.find(attribute)?;
    let rest = declaration[at + attribute.len()..].trim_start().strip_prefix('(')?;
    let close = rest.find(')')?;
    rest[..close].trim().parse().ok()
}

/// Every module-scope resource variable with its slot and name.
fn declarations(source: &str) -> Vec<(BindingSlot, &str)> {
    source
        .split(';')
        .filter_map(|statement| {
            let start = match (statement.find("@group"), statement.find("@binding")) {
                (Some(a), Some(b)) => a.min(b),
                _ => return None,
            };
            let declaration = &statement[start..];
            let slot = BindingSlot {
                group: attribute_value(declaration, "@group")?,
                binding: attribute_value(declaration, "@binding")?,
            };
            let (at, _) = declaration.match_indices("var").find(|(at, _)| {
                let before = declaration[..*at].chars().next_back();
                let after = declaration[at + 3..].chars().next();
                before.is_none_or(|c| !is_ident_char(c)) && after.is_none_or(|c| !is_ident_char(c))
            })?;
            let mut rest = declaration[at + 3..].trim_start();
            if let Some(spaced) = rest.strip_prefix('<') {
                rest = spaced[spaced.find('>')? + 1..].trim_start();
            }
            let name_len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
            (name_len > 0).then(|| (slot, &rest[..name_len]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINTED: &str = "
@group(0) @binding(0) var<uniform> tint: vec4<f32>;
@group(1) @binding(2) var albedo: texture_2d<f32>;
@binding(3) @group(2) var albedo_sampler: sampler;
@group(0) @binding(5) var<uniform> unused: vec4<f32>;

fn shade(uv: vec2<f32>) -> vec4<f32> {
    return textureSample(albedo, albedo_sampler, uv);
}

@vertex
fn vs_main(@location(0) p: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(p, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    // unused is only mentioned here
    return tint * shade(vec2<f32>(0.5, 0.5));
}
";

    fn slot(group: u32, binding: u32) -> BindingSlot {
        BindingSlot { group, binding }
    }

    #[test]
    fn vertex_entry_without_resources_uses_nothing() {
        assert!(used_bindings(TINTED, "vs_main").is_empty());
    }

    #[test]
    fn bindings_reached_through_helpers_are_included() {
        assert_eq!(
            used_bindings(TINTED, "fs_main"),
            vec![slot(0, 0), slot(1, 2), slot(2, 3)]
        );
    }

    #[test]
    fn storage_address_space_is_skipped_when_reading_the_name() {
        let source = "
@group(0) @binding(1) var<storage, read_write> counts: array<u32>;
@compute @workgroup_size(1)
fn cs_main() { counts[0] = 1u; }
";
        assert_eq!(used_bindings(source, "cs_main"), vec![slot(0, 1)]);
    }

    #[test]
    fn unknown_entry_point_uses_nothing() {
        assert!(used_bindings(TINTED, "missing").is_empty());
    }
}
