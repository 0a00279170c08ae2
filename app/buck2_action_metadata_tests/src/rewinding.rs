/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use buck2_action_metadata::artifact::Artifact;
use buck2_action_metadata::graph::ActionGraph;
use buck2_action_metadata::identity::ActionIdentity;
use buck2_action_metadata::impls::run::RunActionBuilder;
use buck2_action_metadata::impls::symlink::SymlinkAction;
use buck2_action_metadata::knobs::ActionGraphKnobs;
use buck2_action_metadata::logging::init_tracing_for_tests;
use buck2_action_metadata::rewind::plan_rewind;
use buck2_action_metadata::scheduler::ExecutionDecision;
use buck2_action_metadata::scheduler::Staleness;
use buck2_action_metadata::scheduler::decide_execution;
use dupe::Dupe;

#[test]
fn test_symlink_is_substituted_when_consumer_fails() -> anyhow::Result<()> {
    init_tracing_for_tests();

    let graph = ActionGraph::new(ActionGraphKnobs::default());
    let src = Artifact::source("pkg/src")?;
    let link = Artifact::build("out/pkg/link")?;
    let a = graph.register(SymlinkAction::new(
        ActionIdentity::testing_new("//pkg:link", 0),
        src.dupe(),
        link.dupe(),
    )?)?;
    graph.register(
        RunActionBuilder::new(ActionIdentity::testing_new("//pkg:consumer", 0), "Consume")
            .args(["consume", "out/pkg/link"])
            .input(link.dupe())
            .output(Artifact::build("out/pkg/consumed")?)
            .build()?,
    )?;

    assert!(!a.discovers_inputs());
    assert!(a.may_insensitively_propagate_inputs());
    assert!(a.inputs_discovered());
    assert_eq!(
        decide_execution(&a, Staleness::UpToDate),
        ExecutionDecision::Skip
    );

    // The consumer failed because `link` is gone.
    let plan = plan_rewind(&graph, &link)?;
    assert!(plan.substitutes_input());
    assert_eq!(plan.origin(), &src);
    assert_eq!(plan.skipped(), &[a.identity().dupe()]);
    assert_eq!(plan.reexecute(), None);
    Ok(())
}

#[test]
fn test_non_propagating_producer_is_rewound() -> anyhow::Result<()> {
    let graph = ActionGraph::new(ActionGraphKnobs::default());
    let out = Artifact::build("out/pkg/lib.o")?;
    let compile = graph.register(
        RunActionBuilder::new(ActionIdentity::testing_new("//pkg:lib", 0), "CppCompile")
            .args(["cc", "-c", "pkg/lib.cc"])
            .input(Artifact::source("pkg/lib.cc")?)
            .output(out.dupe())
            .discovers_inputs(true)
            .build()?,
    )?;

    let plan = plan_rewind(&graph, &out)?;
    assert!(!plan.substitutes_input());
    assert_eq!(plan.reexecute(), Some(compile.identity()));
    Ok(())
}
