/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use allocative::Allocative;
use dupe::Dupe;

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

/// Creates `link` pointing at `target`.
///
/// The link's content is the target's content, and creating it never reads
/// that content, so the action insensitively propagates its input. Only
/// `SymlinkAction::new` can build one, which keeps it to exactly one input
/// and one output.
#[derive(Debug, Allocative)]
pub struct SymlinkAction {
    target: Artifact,
}

impl SymlinkAction {
    pub fn new(
        identity: ActionIdentity,
        target: Artifact,
        link: Artifact,
    ) -> anyhow::Result<Action> {
        Action::new(
            identity,
            ArtifactSet::new([target.dupe()]),
            vec![link],
            EmptyRunfilesSupplier::get(),
            SymlinkAction { target },
        )
    }

    pub fn target(&self) -> &Artifact {
        &self.target
    }
}

impl ActionBehavior for SymlinkAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Symlink
    }

    fn mnemonic(&self) -> &str {
        "Symlink"
    }

    fn progress_message(&self, core: &ActionCore) -> Option<String> {
        Some(format!("Creating symlink {}", core.primary_output()))
    }

    fn describe_key(&self, core: &ActionCore) -> Option<KeyDescription> {
        Some(
            KeyDescription::new(format!("Creating symlink {}", core.primary_output()))
                .field("Target", self.target.exec_path()),
        )
    }

    // Target and link are the action's only input and output, which the
    // caller already fingerprints.
    fn add_to_key(&self, _core: &ActionCore, _fp: &mut Fingerprint) {}

    fn arity(&self) -> ArtifactArity {
        ArtifactArity::exactly(1, 1)
    }

    fn may_insensitively_propagate_inputs(&self) -> bool {
        true
    }

    fn propagated_input(&self, core: &ActionCore, output: &Artifact) -> Option<Artifact> {
        if output == core.primary_output() && core.inputs().contains(&self.target) {
            Some(self.target.dupe())
        } else {
            None
        }
    }
}
