/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;

use crate::artifact::Artifact;
use crate::artifact::ArtifactSet;
use crate::label::Label;
use crate::repo_mapping::RepositoryMapping;

/// What a progress message template can refer to.
pub struct ProgressContext<'a> {
    pub owner: &'a Label,
    pub inputs: &'a ArtifactSet,
    pub outputs: &'a [Artifact],
    pub mapping: Option<&'a RepositoryMapping>,
}

/// A progress message with placeholders, expanded lazily when the message is
/// displayed:
///
/// * `%{label}`: the owner label, with apparent repository names if a mapping is given
/// * `%{input}`: the exec path of the first input
/// * `%{output}`: the exec path of the first output
///
/// Unknown placeholders, and placeholders with nothing to substitute, are kept verbatim.
#[derive(Clone, Dupe, Debug, PartialEq, Eq, Hash, Allocative)]
pub struct ProgressMessageTemplate(Arc<str>);

impl ProgressMessageTemplate {
    pub fn new(template: &str) -> ProgressMessageTemplate {
        ProgressMessageTemplate(Arc::from(template))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether rendering can depend on the repository mapping.
    pub fn mentions_label(&self) -> bool {
        self.0.contains("%{label}")
    }

    pub fn render(&self, ctx: &ProgressContext<'_>) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut rest = &*self.0;
        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    match substitution(&after[..end], ctx) {
                        Some(value) => out.push_str(&value),
                        None => out.push_str(&rest[start..start + 2 + end + 1]),
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn substitution(placeholder: &str, ctx: &ProgressContext<'_>) -> Option<String> {
    match placeholder {
        "label" => Some(ctx.owner.display_form(ctx.mapping)),
        "input" => ctx.inputs.first().map(|a| a.exec_path().to_owned()),
        "output" => ctx.outputs.first().map(|a| a.exec_path().to_owned()),
        _ => None,
    }
}
