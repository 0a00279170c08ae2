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

use crate::action::Action;
use crate::action::ActionBehavior;
use crate::action::ActionCore;
use crate::action::ActionKind;
use crate::action::ArtifactArity;
use crate::artifact::Artifact;
use crate::artifact::ArtifactSet;
use crate::describe::KeyDescription;
use crate::identity::ActionIdentity;
use crate::key::Fingerprint;
use crate::runfiles::EmptyRunfilesSupplier;

/// Writes fixed contents to a single output. Has no inputs.
#[derive(Debug, Allocative)]
pub struct WriteAction {
    contents: Arc<str>,
    is_executable: bool,
}

impl WriteAction {
    pub fn new(
        identity: ActionIdentity,
        output: Artifact,
        contents: &str,
        is_executable: bool,
    ) -> anyhow::Result<Action> {
        Action::new(
            identity,
            ArtifactSet::empty(),
            vec![output],
            EmptyRunfilesSupplier::get(),
            WriteAction {
                contents: Arc::from(contents),
                is_executable,
            },
        )
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }
}

impl ActionBehavior for WriteAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Write
    }

    fn mnemonic(&self) -> &str {
        "FileWrite"
    }

    fn progress_message(&self, core: &ActionCore) -> Option<String> {
        let what = if self.is_executable { "script" } else { "file" };
        Some(format!("Writing {} {}", what, core.primary_output()))
    }

    fn describe_key(&self, core: &ActionCore) -> Option<KeyDescription> {
        let summary = self.progress_message(core)?;
        Some(
            KeyDescription::new(summary)
                .field("Content", &*self.contents)
                .field("Executable", self.is_executable.to_string()),
        )
    }

    fn add_to_key(&self, _core: &ActionCore, fp: &mut Fingerprint) {
        fp.add_str(&self.contents);
        fp.add_bool(self.is_executable);
    }

    fn arity(&self) -> ArtifactArity {
        ArtifactArity::exactly(0, 1)
    }
}
