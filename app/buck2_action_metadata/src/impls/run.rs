/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use allocative::Allocative;
use thiserror::Error;

use crate::action::Action;
use crate::action::ActionBehavior;
use crate::action::ActionCore;
use crate::action::ActionKind;
use crate::artifact::Artifact;
use crate::artifact::ArtifactSet;
use crate::describe::KeyDescription;
use crate::identity::ActionIdentity;
use crate::key::Fingerprint;
use crate::progress::ProgressMessageTemplate;
use crate::repo_mapping::RepositoryMapping;
use crate::runfiles::EmptyRunfilesSupplier;
use crate::runfiles::RunfilesSupplier;

#[derive(Debug, Error)]
enum RunActionValidationError {
    #[error("Run action `{0}` must have a non-empty command line")]
    EmptyArgv(ActionIdentity),
    #[error("Run action `{0}` must have a non-empty mnemonic")]
    EmptyMnemonic(ActionIdentity),
    #[error("Invalid environment variable name `{0}`")]
    InvalidEnvName(String),
}

/// Runs a command line.
///
/// Whether the action discovers inputs is decided when it is built: compile
/// actions that parse a dep file after running set it, everything else
/// leaves it off.
#[derive(Debug, Allocative)]
pub struct RunAction {
    mnemonic: Arc<str>,
    argv: Box<[String]>,
    env: Box<[(String, String)]>,
    progress: Option<ProgressMessageTemplate>,
    discovers_inputs: bool,
}

impl RunAction {
    fn default_progress_message(&self, core: &ActionCore) -> String {
        format!("Running {} {}", self.mnemonic, core.primary_output())
    }

    fn render_progress(&self, core: &ActionCore, mapping: Option<&RepositoryMapping>) -> String {
        match &self.progress {
            Some(template) if template.mentions_label() => {
                template.render(&core.progress_context(mapping))
            }
            Some(template) => template.render(&core.progress_context(None)),
            None => self.default_progress_message(core),
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl ActionBehavior for RunAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Run
    }

    fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    fn progress_message(&self, core: &ActionCore) -> Option<String> {
        Some(self.render_progress(core, None))
    }

    fn progress_message_with_mapping(
        &self,
        core: &ActionCore,
        mapping: &RepositoryMapping,
    ) -> Option<String> {
        Some(self.render_progress(core, Some(mapping)))
    }

    fn describe_key(&self, core: &ActionCore) -> Option<KeyDescription> {
        let (command, args) = self.argv.split_first()?;
        Some(
            KeyDescription::new(self.render_progress(core, None))
                .field("Command", command)
                .fields("Argument", args)
                .fields("Environment", self.env.iter().map(|(k, v)| format!("{k}={v}")))
                .fields("Output", core.outputs().iter().map(|o| o.exec_path())),
        )
    }

    fn add_to_key(&self, _core: &ActionCore, fp: &mut Fingerprint) {
        fp.add_strings(&self.argv);
        fp.add_u64(self.env.len() as u64);
        for (k, v) in self.env.iter() {
            fp.add_str(k);
            fp.add_str(v);
        }
    }

    fn discovers_inputs(&self) -> bool {
        self.discovers_inputs
    }
}

/// Builds a `RunAction`.
pub struct RunActionBuilder {
    identity: ActionIdentity,
    mnemonic: String,
    argv: Vec<String>,
    env: BTreeMap<String, String>,
    inputs: Vec<Artifact>,
    outputs: Vec<Artifact>,
    progress: Option<ProgressMessageTemplate>,
    runfiles: Option<Arc<dyn RunfilesSupplier>>,
    discovers_inputs: bool,
}

impl RunActionBuilder {
    pub fn new(identity: ActionIdentity, mnemonic: &str) -> RunActionBuilder {
        RunActionBuilder {
            identity,
            mnemonic: mnemonic.to_owned(),
            argv: Vec::new(),
            env: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            progress: None,
            runfiles: None,
            discovers_inputs: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable; a later value for the same name wins.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn input(mut self, input: Artifact) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn inputs(mut self, inputs: impl IntoIterator<Item = Artifact>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn output(mut self, output: Artifact) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn progress_message(mut self, template: &str) -> Self {
        self.progress = Some(ProgressMessageTemplate::new(template));
        self
    }

    pub fn runfiles(mut self, runfiles: Arc<dyn RunfilesSupplier>) -> Self {
        self.runfiles = Some(runfiles);
        self
    }

    pub fn discovers_inputs(mut self, discovers_inputs: bool) -> Self {
        self.discovers_inputs = discovers_inputs;
        self
    }

    pub fn build(self) -> anyhow::Result<Action> {
        if self.mnemonic.is_empty() {
            return Err(RunActionValidationError::EmptyMnemonic(self.identity).into());
        }
        if self.argv.is_empty() {
            return Err(RunActionValidationError::EmptyArgv(self.identity).into());
        }
        if let Some(name) = self
            .env
            .keys()
            .find(|k| k.is_empty() || k.contains('='))
        {
            return Err(RunActionValidationError::InvalidEnvName(name.clone()).into());
        }

        Action::new(
            self.identity,
            ArtifactSet::new(self.inputs),
            self.outputs,
            self.runfiles.unwrap_or_else(EmptyRunfilesSupplier::get),
            RunAction {
                mnemonic: Arc::from(self.mnemonic),
                argv: self.argv.into_boxed_slice(),
                env: self.env.into_iter().collect(),
                progress: self.progress,
                discovers_inputs: self.discovers_inputs,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::describe::escape_value;
    use crate::discovery::DiscoveryState;
    use crate::key::DefaultActionKeyContext;
    use crate::repo_mapping::RepoName;
    use crate::runfiles::SingleRunfilesSupplier;

    fn compile() -> RunActionBuilder {
        RunActionBuilder::new(
            ActionIdentity::testing_new("@@rules_cc+//cc:lib", 0),
            "CppCompile",
        )
        .args(["/usr/bin/gcc", "-c", "cc/lib.cc", "-o", "out/cc/lib.o"])
        .input(Artifact::testing_source("cc/lib.cc"))
        .output(Artifact::testing_build("out/cc/lib.o"))
    }

    fn mapping() -> RepositoryMapping {
        RepositoryMapping::new(
            RepoName::main(),
            [("cc".to_owned(), RepoName::testing_new("rules_cc+"))],
        )
        .unwrap()
    }

    #[test]
    fn describe_key() {
        let a = compile()
            .env("PATH", "/bin")
            .env("LANG", "C")
            .progress_message("Compiling %{input}")
            .build()
            .unwrap();
        assert_eq!(
            a.describe_key().unwrap(),
            format!(
                "Compiling cc/lib.cc\n  \
                 Command: /usr/bin/gcc\n  \
                 Argument: -c\n  \
                 Argument: cc/lib.cc\n  \
                 Argument: -o\n  \
                 Argument: out/cc/lib.o\n  \
                 Environment: {}\n  \
                 Environment: {}\n  \
                 Output: out/cc/lib.o",
                escape_value("LANG=C"),
                escape_value("PATH=/bin"),
            )
        );
    }

    #[test]
    fn default_progress_message() {
        let a = compile().build().unwrap();
        assert_eq!(
            a.progress_message(None).as_deref(),
            Some("Running CppCompile out/cc/lib.o")
        );
        assert_eq!(a.progress_message(Some(&mapping())), a.progress_message(None));
    }

    #[test]
    fn label_in_progress_message_uses_mapping() {
        let a = compile()
            .progress_message("Compiling %{label}")
            .build()
            .unwrap();
        assert_eq!(
            a.progress_message(None).as_deref(),
            Some("Compiling @@rules_cc+//cc:lib")
        );
        assert_eq!(
            a.progress_message(Some(&mapping())).as_deref(),
            Some("Compiling @cc//cc:lib")
        );
    }

    #[test]
    fn discovery_flag_is_fixed_at_build() {
        let plain = compile().build().unwrap();
        assert!(!plain.discovers_inputs());
        assert_eq!(plain.discovery_state(), DiscoveryState::NotApplicable);

        let discovering = compile().discovers_inputs(true).build().unwrap();
        assert!(discovering.discovers_inputs());
        assert!(!discovering.inputs_discovered());
        assert!(!discovering.may_insensitively_propagate_inputs());
    }

    #[test]
    fn key_sensitivity() {
        let ctx = DefaultActionKeyContext::new();
        let base = compile().build().unwrap().key(&ctx);
        assert_eq!(base, compile().build().unwrap().key(&ctx));
        assert_ne!(base, compile().arg("-O2").build().unwrap().key(&ctx));
        assert_ne!(base, compile().env("A", "1").build().unwrap().key(&ctx));
        assert_ne!(
            base,
            compile().discovers_inputs(true).build().unwrap().key(&ctx)
        );
        let runfiles = Arc::new(SingleRunfilesSupplier::new(
            "out/cc/lib.runfiles",
            [("data".to_owned(), Artifact::testing_source("cc/data"))],
        ));
        assert_ne!(base, compile().runfiles(runfiles).build().unwrap().key(&ctx));
        // The progress message is not an input of the key.
        assert_eq!(
            base,
            compile().progress_message("x").build().unwrap().key(&ctx)
        );
    }

    #[test]
    fn validation() {
        let id = ActionIdentity::testing_new("//a:b", 0);
        assert_matches!(
            RunActionBuilder::new(id.clone(), "X")
                .output(Artifact::testing_build("out"))
                .build()
                .unwrap_err()
                .downcast_ref::<RunActionValidationError>(),
            Some(RunActionValidationError::EmptyArgv(..))
        );
        assert_matches!(
            RunActionBuilder::new(id.clone(), "")
                .arg("true")
                .build()
                .unwrap_err()
                .downcast_ref::<RunActionValidationError>(),
            Some(RunActionValidationError::EmptyMnemonic(..))
        );
        assert_matches!(
            RunActionBuilder::new(id.clone(), "X")
                .arg("true")
                .env("A=B", "c")
                .output(Artifact::testing_build("out"))
                .build()
                .unwrap_err()
                .downcast_ref::<RunActionValidationError>(),
            Some(RunActionValidationError::InvalidEnvName(..))
        );
        assert!(RunActionBuilder::new(id, "X").arg("true").build().is_err());
    }
}
