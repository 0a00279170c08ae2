/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

use allocative::Allocative;
use derive_more::Display;
use dupe::Dupe;
use indexmap::IndexSet;
use thiserror::Error;

use crate::artifact::Artifact;
use crate::artifact::ArtifactSet;
use crate::describe::KeyDescription;
use crate::discovery::DiscoveredInputs;
use crate::discovery::DiscoveryState;
use crate::discovery::ExecutionAttempt;
use crate::discovery::InputDiscovery;
use crate::identity::ActionIdentity;
use crate::key::ActionCacheKey;
use crate::key::ActionKeyContext;
use crate::key::Fingerprint;
use crate::label::Label;
use crate::progress::ProgressContext;
use crate::repo_mapping::RepositoryMapping;
use crate::runfiles::RunfilesSupplier;

#[derive(Debug, Error)]
pub enum ActionValidationError {
    #[error("Action `{0}` must declare at least one output")]
    NoOutputs(ActionIdentity),
    #[error("Action `{0}` declares source artifact `{1}` as an output")]
    SourceOutput(ActionIdentity, Artifact),
    #[error("Action `{0}` declares output `{1}` more than once")]
    DuplicateOutput(ActionIdentity, Artifact),
    #[error("Action `{0}` declares `{1}` as both an input and an output")]
    OutputIsInput(ActionIdentity, Artifact),
    #[error("Action `{identity}` of kind `{kind}` takes {expected} input(s), got {actual}")]
    InputCount {
        identity: ActionIdentity,
        kind: ActionKind,
        expected: usize,
        actual: usize,
    },
    #[error("Action `{identity}` of kind `{kind}` takes {expected} output(s), got {actual}")]
    OutputCount {
        identity: ActionIdentity,
        kind: ActionKind,
        expected: usize,
        actual: usize,
    },
}

/// How many inputs and outputs an action kind accepts. `None` means any number.
#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq, Default)]
pub struct ArtifactArity {
    pub inputs: Option<usize>,
    pub outputs: Option<usize>,
}

impl ArtifactArity {
    pub const fn exactly(inputs: usize, outputs: usize) -> ArtifactArity {
        ArtifactArity {
            inputs: Some(inputs),
            outputs: Some(outputs),
        }
    }
}

#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq, Hash, Display, Allocative)]
pub enum ActionKind {
    #[display("symlink")]
    Symlink,
    #[display("write")]
    Write,
    #[display("run")]
    Run,
}

/// Behaviour specific to one kind of action.
///
/// Everything here is a pure function of the kind and the immutable
/// `ActionCore`. `discovers_inputs` and `may_insensitively_propagate_inputs`
/// are read once when the action is constructed and never asked again.
pub trait ActionBehavior: Allocative + Debug + Send + Sync + 'static {
    fn kind(&self) -> ActionKind;

    /// Short name for what the action does, e.g. `CppCompile`.
    fn mnemonic(&self) -> &str;

    /// Message to show while the action runs. `None` suppresses reporting.
    fn progress_message(&self, core: &ActionCore) -> Option<String>;

    /// Like `progress_message`, but labels may be rendered with the apparent
    /// repository names of `mapping`.
    fn progress_message_with_mapping(
        &self,
        core: &ActionCore,
        _mapping: &RepositoryMapping,
    ) -> Option<String> {
        self.progress_message(core)
    }

    /// Describes the kind-specific inputs of the cache key, i.e. exactly what
    /// `add_to_key` fingerprints.
    fn describe_key(&self, _core: &ActionCore) -> Option<KeyDescription> {
        None
    }

    /// Adds kind-specific fields to the cache key. Inputs, outputs and
    /// runfiles are added by the caller.
    fn add_to_key(&self, core: &ActionCore, fp: &mut Fingerprint);

    /// Checked once at construction.
    fn arity(&self) -> ArtifactArity {
        ArtifactArity::default()
    }

    fn discovers_inputs(&self) -> bool {
        false
    }

    /// True only if the outputs' contents equal (a subset of) the inputs'
    /// contents and the action never reads those contents, e.g. symlinks.
    fn may_insensitively_propagate_inputs(&self) -> bool {
        false
    }

    /// The input whose content `output` carries, for actions that
    /// insensitively propagate their inputs.
    fn propagated_input(&self, _core: &ActionCore, _output: &Artifact) -> Option<Artifact> {
        None
    }
}

/// The kind-independent, immutable part of an action.
#[derive(Debug, Allocative)]
pub struct ActionCore {
    identity: ActionIdentity,
    inputs: ArtifactSet,
    outputs: Box<[Artifact]>,
    runfiles: Arc<dyn RunfilesSupplier>,
    discovers_inputs: bool,
    may_insensitively_propagate_inputs: bool,
}

impl ActionCore {
    pub fn identity(&self) -> &ActionIdentity {
        &self.identity
    }

    pub fn owner(&self) -> &Label {
        self.identity.owner()
    }

    pub fn inputs(&self) -> &ArtifactSet {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Artifact] {
        &self.outputs
    }

    pub fn primary_output(&self) -> &Artifact {
        self.outputs
            .first()
            .expect("at least one output by construction")
    }

    pub fn runfiles(&self) -> &Arc<dyn RunfilesSupplier> {
        &self.runfiles
    }

    pub fn progress_context<'a>(
        &'a self,
        mapping: Option<&'a RepositoryMapping>,
    ) -> ProgressContext<'a> {
        ProgressContext {
            owner: self.owner(),
            inputs: &self.inputs,
            outputs: &self.outputs,
            mapping,
        }
    }
}

/// One node of the action graph: an immutable core, the behaviour of its
/// kind, and the discovery state of the current instance.
///
/// All queries are lock-free and may be called from any number of threads.
#[derive(Allocative)]
pub struct Action {
    core: Arc<ActionCore>,
    behavior: Arc<dyn ActionBehavior>,
    #[allocative(skip)]
    discovery: InputDiscovery,
}

impl Action {
    pub fn new(
        identity: ActionIdentity,
        inputs: ArtifactSet,
        outputs: Vec<Artifact>,
        runfiles: Arc<dyn RunfilesSupplier>,
        behavior: impl ActionBehavior,
    ) -> anyhow::Result<Action> {
        validate_arity(&identity, behavior.kind(), behavior.arity(), &inputs, &outputs)?;
        validate_outputs(&identity, &inputs, &outputs)?;

        let discovers_inputs = behavior.discovers_inputs();
        let action = Action {
            core: Arc::new(ActionCore {
                identity,
                inputs,
                outputs: outputs.into_boxed_slice(),
                runfiles,
                discovers_inputs,
                may_insensitively_propagate_inputs: behavior.may_insensitively_propagate_inputs(),
            }),
            behavior: Arc::new(behavior),
            discovery: InputDiscovery::new(discovers_inputs),
        };
        action.assert_discovery_invariant();
        Ok(action)
    }

    /// An action that does not discover inputs must always report them as
    /// discovered. A violation is a bug in the action, not a runtime condition.
    pub(crate) fn assert_discovery_invariant(&self) {
        assert!(
            self.discovers_inputs() || self.inputs_discovered(),
            "action `{}` does not discover inputs but reports them as undiscovered",
            self.identity()
        );
        assert_eq!(
            self.discovers_inputs(),
            self.discovery_state() != DiscoveryState::NotApplicable,
            "action `{}` has inconsistent discovery state",
            self.identity()
        );
    }

    /// A fresh instance of this action for its next execution after the
    /// owning node was invalidated.
    pub(crate) fn reset(&self) -> Action {
        Action {
            core: self.core.dupe(),
            behavior: self.behavior.dupe(),
            discovery: self.discovery.reset(),
        }
    }

    pub(crate) fn discovery(&self) -> &InputDiscovery {
        &self.discovery
    }

    pub fn core(&self) -> &ActionCore {
        &self.core
    }

    pub fn identity(&self) -> &ActionIdentity {
        self.core.identity()
    }

    pub fn owner(&self) -> &Label {
        self.core.owner()
    }

    pub fn kind(&self) -> ActionKind {
        self.behavior.kind()
    }

    pub fn mnemonic(&self) -> &str {
        self.behavior.mnemonic()
    }

    /// Declared inputs. Possibly incomplete while `inputs_discovered()` is false.
    pub fn inputs(&self) -> &ArtifactSet {
        self.core.inputs()
    }

    pub fn outputs(&self) -> &[Artifact] {
        self.core.outputs()
    }

    pub fn primary_output(&self) -> &Artifact {
        self.core.primary_output()
    }

    pub fn progress_message(&self, mapping: Option<&RepositoryMapping>) -> Option<String> {
        match mapping {
            Some(mapping) => self
                .behavior
                .progress_message_with_mapping(&self.core, mapping),
            None => self.behavior.progress_message(&self.core),
        }
    }

    pub fn key_description(&self) -> Option<KeyDescription> {
        self.behavior.describe_key(&self.core)
    }

    /// `--explain` text for this action, `None` if the kind provides none.
    pub fn describe_key(&self) -> Option<String> {
        self.key_description().map(|d| d.render())
    }

    pub fn runfiles_supplier(&self) -> Arc<dyn RunfilesSupplier> {
        self.core.runfiles().dupe()
    }

    /// Whether `inputs()` plus `discovered_inputs()` is known to be complete.
    /// A scheduler must execute the action unconditionally while this is false.
    pub fn inputs_discovered(&self) -> bool {
        self.discovery.state() != DiscoveryState::Pending
    }

    /// Whether `inputs_discovered()` can ever be false. Fixed at construction.
    pub fn discovers_inputs(&self) -> bool {
        self.core.discovers_inputs
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    pub fn discovered_inputs(&self) -> Option<&DiscoveredInputs> {
        self.discovery.discovered()
    }

    /// Number of times the owning node was invalidated since the action was
    /// first constructed.
    pub fn attempt_generation(&self) -> u32 {
        self.discovery.generation()
    }

    pub fn may_insensitively_propagate_inputs(&self) -> bool {
        self.core.may_insensitively_propagate_inputs
    }

    /// The input whose content is carried by `output`, if this action
    /// insensitively propagates its inputs.
    pub fn propagated_input(&self, output: &Artifact) -> Option<Artifact> {
        if !self.may_insensitively_propagate_inputs() || !self.outputs().contains(output) {
            return None;
        }
        self.behavior
            .propagated_input(&self.core, output)
            .filter(|input| self.inputs().contains(input))
    }

    pub fn key(&self, ctx: &dyn ActionKeyContext) -> ActionCacheKey {
        let mut fp = Fingerprint::new();
        fp.add_str(&self.kind().to_string());
        fp.add_str(self.mnemonic());
        self.behavior.add_to_key(&self.core, &mut fp);
        ctx.add_artifacts(self.inputs(), &mut fp);
        fp.add_u64(self.outputs().len() as u64);
        for output in self.outputs() {
            fp.add_artifact(output);
        }
        self.core.runfiles().add_to_fingerprint(&mut fp);
        fp.add_bool(self.discovers_inputs());
        fp.finish()
    }

    /// Claims the single in-flight execution attempt of this instance.
    pub fn begin_execution(self: &Arc<Self>) -> anyhow::Result<ExecutionAttempt> {
        ExecutionAttempt::claim(self)
    }
}

impl Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("identity", self.identity())
            .field("kind", &self.kind())
            .field("behavior", &self.behavior)
            .field("discovery", &self.discovery_state())
            .finish()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mnemonic(), self.identity())
    }
}

fn validate_arity(
    identity: &ActionIdentity,
    kind: ActionKind,
    arity: ArtifactArity,
    inputs: &ArtifactSet,
    outputs: &[Artifact],
) -> anyhow::Result<()> {
    if let Some(expected) = arity.inputs {
        if inputs.len() != expected {
            return Err(ActionValidationError::InputCount {
                identity: identity.dupe(),
                kind,
                expected,
                actual: inputs.len(),
            }
            .into());
        }
    }
    if let Some(expected) = arity.outputs {
        if outputs.len() != expected {
            return Err(ActionValidationError::OutputCount {
                identity: identity.dupe(),
                kind,
                expected,
                actual: outputs.len(),
            }
            .into());
        }
    }
    Ok(())
}

fn validate_outputs(
    identity: &ActionIdentity,
    inputs: &ArtifactSet,
    outputs: &[Artifact],
) -> anyhow::Result<()> {
    if outputs.is_empty() {
        return Err(ActionValidationError::NoOutputs(identity.dupe()).into());
    }
    let mut seen = IndexSet::with_capacity(outputs.len());
    for output in outputs {
        if output.is_source() {
            return Err(ActionValidationError::SourceOutput(identity.dupe(), output.dupe()).into());
        }
        if !seen.insert(output) {
            return Err(
                ActionValidationError::DuplicateOutput(identity.dupe(), output.dupe()).into(),
            );
        }
        if inputs.contains(output) {
            return Err(ActionValidationError::OutputIsInput(identity.dupe(), output.dupe()).into());
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Behaviour with every optional method left at its default.
    #[derive(Debug, Allocative)]
    pub(crate) struct PlainBehavior;

    impl ActionBehavior for PlainBehavior {
        fn kind(&self) -> ActionKind {
            ActionKind::Run
        }

        fn mnemonic(&self) -> &str {
            "Plain"
        }

        fn progress_message(&self, core: &ActionCore) -> Option<String> {
            Some(format!("Plain {}", core.primary_output()))
        }

        fn add_to_key(&self, _core: &ActionCore, _fp: &mut Fingerprint) {}
    }

    pub(crate) fn plain_action(index: u32, output: &str) -> Action {
        Action::new(
            ActionIdentity::testing_new("//pkg:plain", index),
            ArtifactSet::new([Artifact::testing_source("pkg/in.txt")]),
            vec![Artifact::testing_build(output)],
            crate::runfiles::EmptyRunfilesSupplier::get(),
            PlainBehavior,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::testing::*;
    use super::*;
    use crate::key::DefaultActionKeyContext;
    use crate::repo_mapping::RepoName;
    use crate::runfiles::EmptyRunfilesSupplier;

    #[test]
    fn defaults() {
        let action = plain_action(0, "out/a");
        assert!(!action.discovers_inputs());
        assert!(action.inputs_discovered());
        assert_eq!(action.discovery_state(), DiscoveryState::NotApplicable);
        assert!(!action.may_insensitively_propagate_inputs());
        assert_eq!(action.propagated_input(&Artifact::testing_build("out/a")), None);
        assert_eq!(action.describe_key(), None);
    }

    #[test]
    fn progress_message_with_mapping_defaults_to_plain() {
        let action = plain_action(0, "out/a");
        let mapping = RepositoryMapping::new(
            RepoName::main(),
            [("x".to_owned(), RepoName::testing_new("x+"))],
        )
        .unwrap();
        assert_eq!(
            action.progress_message(Some(&mapping)),
            action.progress_message(None)
        );
        assert_eq!(action.progress_message(None).as_deref(), Some("Plain out/a"));
    }

    #[test]
    fn runfiles_supplier_is_shared() {
        let action = plain_action(0, "out/a");
        assert!(Arc::ptr_eq(
            &action.runfiles_supplier(),
            &EmptyRunfilesSupplier::get()
        ));
    }

    #[test]
    fn reset_keeps_core() {
        let action = plain_action(0, "out/a");
        let fresh = action.reset();
        assert!(Arc::ptr_eq(&action.core, &fresh.core));
        assert_eq!(fresh.attempt_generation(), 1);
    }

    #[test]
    fn key_is_stable_and_output_sensitive() {
        let ctx = DefaultActionKeyContext::new();
        let a = plain_action(0, "out/a");
        assert_eq!(a.key(&ctx), plain_action(0, "out/a").key(&ctx));
        assert_ne!(a.key(&ctx), plain_action(0, "out/b").key(&ctx));
        // Identity is not part of the key: equal work at a different index caches the same.
        assert_eq!(a.key(&ctx), plain_action(7, "out/a").key(&ctx));
    }

    fn new_with_outputs(outputs: Vec<Artifact>) -> anyhow::Result<Action> {
        Action::new(
            ActionIdentity::testing_new("//pkg:bad", 0),
            ArtifactSet::new([Artifact::testing_build("out/in")]),
            outputs,
            EmptyRunfilesSupplier::get(),
            PlainBehavior,
        )
    }

    #[test]
    fn validates_outputs() {
        assert_matches!(
            new_with_outputs(vec![]).unwrap_err().downcast_ref::<ActionValidationError>(),
            Some(ActionValidationError::NoOutputs(..))
        );
        assert_matches!(
            new_with_outputs(vec![Artifact::testing_source("src")])
                .unwrap_err()
                .downcast_ref::<ActionValidationError>(),
            Some(ActionValidationError::SourceOutput(..))
        );
        assert_matches!(
            new_with_outputs(vec![
                Artifact::testing_build("out/x"),
                Artifact::testing_build("out/x"),
            ])
            .unwrap_err()
            .downcast_ref::<ActionValidationError>(),
            Some(ActionValidationError::DuplicateOutput(..))
        );
        assert_matches!(
            new_with_outputs(vec![Artifact::testing_build("out/in")])
                .unwrap_err()
                .downcast_ref::<ActionValidationError>(),
            Some(ActionValidationError::OutputIsInput(..))
        );
    }
}
