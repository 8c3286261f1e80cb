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

//! A structural shader checker standing in for a real compiler.
//!
//! It accepts WGSL-shaped text and rejects, in order: an empty source, a
//! `#error` directive, unbalanced braces or parentheses, and a missing
//! `fn <entry_point>`.

use prism_core::renderer::{ShaderError, ShaderModuleDescriptor};

pub(crate) fn check(descriptor: &ShaderModuleDescriptor<'_>) -> Result<(), ShaderError> {
    let label = descriptor.label;
    let fail = |details: String| ShaderError::CompilationError {
        label: label.to_string(),
        details,
    };

    if descriptor.source.trim().is_empty() {
        return Err(fail("source is empty".to_string()));
    }

    let mut braces = 0i64;
    let mut parens = 0i64;
    for (index, line) in descriptor.source.lines().enumerate() {
        let line_no = index + 1;
        let code = line.split("//").next().unwrap_or_default();
        if let Some(message) = code.trim_start().strip_prefix("#error") {
            return Err(fail(format!("line {line_no}: #error{message}")));
        }
        for c in code.chars() {
            match c {
                '{' => braces += 1,
                '}' => braces -= 1,
                '(' => parens += 1,
                ')' => parens -= 1,
                _ => {}
            }
            if braces < 0 || parens < 0 {
                return Err(fail(format!("line {line_no}: unexpected '{c}'")));
            }
        }
    }
    if braces != 0 {
        return Err(fail(format!("{braces} unclosed '{{'")));
    }
    if parens != 0 {
        return Err(fail(format!("{parens} unclosed '('")));
    }

    if !declares_function(descriptor.source, descriptor.entry_point) {
        return Err(ShaderError::MissingEntryPoint {
            label: label.to_string(),
            stage: descriptor.stage,
            entry_point: descriptor.entry_point.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn declares_function(source: &str, name: &str) -> bool {
    source.match_indices("fn ").any(|(at, _)| {
        let rest = source[at + 3..].trim_start();
        rest.strip_prefix(name)
            .is_some_and(|after| after.trim_start().starts_with('('))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::ShaderStage;

    fn descriptor<'a>(source: &'a str, stage: ShaderStage) -> ShaderModuleDescriptor<'a> {
        ShaderModuleDescriptor {
            label: "test",
            source,
            stage,
            entry_point: stage.entry_point(),
            input_layout: None,
        }
    }

    #[test]
    fn accepts_a_declared_entry_point() {
        let source = "@vertex\nfn vs_main(@location(0) p: vec3<f32>) -> @builtin(position) vec4<f32> {\n  return vec4<f32>(p, 1.0);\n}";
        assert!(check(&descriptor(source, ShaderStage::Vertex)).is_ok());
    }

    #[test]
    fn rejects_prefix_matches_of_the_entry_point() {
        let source = "fn vs_main_helper() { }";
        assert!(matches!(
            check(&descriptor(source, ShaderStage::Vertex)),
            Err(ShaderError::MissingEntryPoint { .. })
        ));
    }

    #[test]
    fn rejects_unbalanced_braces() {
        let err = check(&descriptor("fn fs_main() {", ShaderStage::Pixel)).unwrap_err();
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn error_directive_reports_its_line() {
        let source = "fn cs_main() { }\n#error not supported";
        let err = check(&descriptor(source, ShaderStage::Compute)).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn braces_in_comments_are_ignored() {
        let source = "fn cs_main() { } // }";
        assert!(check(&descriptor(source, ShaderStage::Compute)).is_ok());
    }
}
