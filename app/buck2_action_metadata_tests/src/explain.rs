/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use buck2_action_metadata::action::Action;
use buck2_action_metadata::artifact::Artifact;
use buck2_action_metadata::identity::ActionIdentity;
use buck2_action_metadata::impls::run::RunActionBuilder;
use buck2_action_metadata::impls::symlink::SymlinkAction;
use buck2_action_metadata::impls::write::WriteAction;
use buck2_action_metadata::label::Label;
use buck2_action_metadata::repo_mapping::RepoName;
use buck2_action_metadata::repo_mapping::RepositoryMapping;
use buck2_action_metadata::scheduler::Staleness;
use buck2_action_metadata::scheduler::decide_execution;

fn actions() -> anyhow::Result<Vec<Action>> {
    Ok(vec![
        SymlinkAction::new(
            ActionIdentity::testing_new("//pkg:link", 0),
            Artifact::source("pkg/src file")?,
            Artifact::build("out/pkg/link")?,
        )?,
        WriteAction::new(
            ActionIdentity::testing_new("//pkg:gen", 0),
            Artifact::build("out/pkg/gen.sh")?,
            "#!/bin/sh\n\techo 'hi'\n",
            true,
        )?,
        RunActionBuilder::new(ActionIdentity::testing_new("//pkg:lib", 0), "CppCompile")
            .args(["cc", "-DMSG=hello world", "-c", "pkg/lib.cc"])
            .env("LINES", "a\nb")
            .input(Artifact::source("pkg/lib.cc")?)
            .output(Artifact::build("out/pkg/lib.o")?)
            .progress_message("Compiling\n  %{input}")
            .build()?,
    ])
}

#[test]
fn test_describe_key_layout() -> anyhow::Result<()> {
    for action in actions()? {
        let text = action.describe_key().unwrap();
        let mut lines = text.split('\n');
        let summary = lines.next().unwrap();
        assert!(!summary.is_empty(), "{action}");
        assert!(!summary.starts_with(' '), "{action}: {text:?}");
        for line in lines {
            assert!(line.starts_with("  "), "{action}: {text:?}");
            assert!(!line.starts_with("   "), "{action}: {text:?}");
            let (name, value) = line.trim_start().split_once(": ").unwrap();
            assert!(!name.is_empty() && !value.is_empty(), "{action}: {text:?}");
        }
    }
    Ok(())
}

#[test]
fn test_run_action_summary_is_one_line() -> anyhow::Result<()> {
    let actions = actions()?;
    let text = actions[2].describe_key().unwrap();
    assert!(text.starts_with("Compiling pkg/lib.cc\n  Command: cc\n"));
    Ok(())
}

#[test]
fn test_explain_includes_description() -> anyhow::Result<()> {
    for action in actions()? {
        let explained = decide_execution(&action, Staleness::Stale).explain(&action);
        let (header, rest) = explained.split_once('\n').unwrap();
        assert!(header.starts_with("Executing action "), "{header}");
        assert!(header.ends_with(": action is stale."), "{header}");
        assert_eq!(Some(rest.to_owned()), action.describe_key());
    }
    Ok(())
}

#[test]
fn test_progress_message_with_repo_mapping() -> anyhow::Result<()> {
    let owner = Label::parse("@@rules_cc+//cc:lib")?;
    let action = RunActionBuilder::new(ActionIdentity::new(owner, 3), "CppCompile")
        .arg("cc")
        .output(Artifact::build("out/cc/lib.o")?)
        .progress_message("Compiling %{label} into %{output}")
        .build()?;
    let mapping = RepositoryMapping::new(
        RepoName::main(),
        [
            ("rules_cc".to_owned(), RepoName::new("rules_cc+")?),
            ("cc".to_owned(), RepoName::new("rules_cc+")?),
        ],
    )?;

    assert_eq!(
        action.progress_message(None).as_deref(),
        Some("Compiling @@rules_cc+//cc:lib into out/cc/lib.o")
    );
    assert_eq!(
        action.progress_message(Some(&mapping)).as_deref(),
        Some("Compiling @cc//cc:lib into out/cc/lib.o")
    );
    Ok(())
}
