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

use assert_matches::assert_matches;
use buck2_action_metadata::action::Action;
use buck2_action_metadata::artifact::Artifact;
use buck2_action_metadata::discovery::DiscoverySource;
use buck2_action_metadata::discovery::DiscoveryState;
use buck2_action_metadata::discovery::InputDiscoveryError;
use buck2_action_metadata::graph::ActionGraph;
use buck2_action_metadata::identity::ActionIdentity;
use buck2_action_metadata::impls::run::RunActionBuilder;
use buck2_action_metadata::knobs::ActionGraphKnobs;
use buck2_action_metadata::logging::init_tracing_for_tests;
use buck2_action_metadata::scheduler::ExecuteReason;
use buck2_action_metadata::scheduler::ExecutionDecision;
use buck2_action_metadata::scheduler::Staleness;
use buck2_action_metadata::scheduler::decide_execution;
use buck2_action_metadata::scheduler::prerequisites;

fn compile() -> anyhow::Result<Action> {
    RunActionBuilder::new(ActionIdentity::testing_new("//app:main", 0), "CppCompile")
        .args(["cc", "-c", "app/main.cc", "-o", "out/app/main.o"])
        .input(Artifact::source("app/main.cc")?)
        .output(Artifact::build("out/app/main.o")?)
        .discovers_inputs(true)
        .build()
}

fn headers() -> Vec<Artifact> {
    vec![
        Artifact::testing_source("app/h1.h"),
        Artifact::testing_source("app/h2.h"),
    ]
}

fn assert_discovery_error(e: anyhow::Error, expected: fn(&InputDiscoveryError) -> bool) {
    let inner = e
        .downcast_ref::<InputDiscoveryError>()
        .unwrap_or_else(|| panic!("unexpected error: {e:#}"));
    assert!(expected(inner), "unexpected error: {inner}");
}

#[test]
fn test_discovery_lifecycle() -> anyhow::Result<()> {
    init_tracing_for_tests();

    let graph = ActionGraph::new(ActionGraphKnobs::default());
    let b = graph.register(compile()?)?;

    assert!(b.discovers_inputs());
    assert!(!b.inputs_discovered());
    for staleness in [Staleness::UpToDate, Staleness::Stale, Staleness::Unknown] {
        assert_eq!(
            decide_execution(&b, staleness),
            ExecutionDecision::Execute(ExecuteReason::InputsNotDiscovered)
        );
    }
    assert_eq!(prerequisites(&b), vec![Artifact::source("app/main.cc")?]);

    let attempt = b.begin_execution()?;
    attempt.complete_discovery(DiscoverySource::Executed, headers())?;
    assert!(b.inputs_discovered());
    assert_eq!(b.discovery_state(), DiscoveryState::Complete);
    let discovered = b.discovered_inputs().unwrap();
    assert_eq!(discovered.source(), DiscoverySource::Executed);
    assert_eq!(discovered.inputs().to_vec(), headers());
    assert_eq!(
        decide_execution(&b, Staleness::UpToDate),
        ExecutionDecision::Skip
    );

    let fresh = graph.invalidate(b.identity())?;
    assert!(!fresh.inputs_discovered());
    assert!(fresh.discovered_inputs().is_none());
    assert_eq!(fresh.attempt_generation(), b.attempt_generation() + 1);
    assert!(Arc::ptr_eq(&graph.get(b.identity()).unwrap(), &fresh));
    Ok(())
}

#[test]
fn test_restore_from_cache() -> anyhow::Result<()> {
    let b = Arc::new(compile()?);
    b.begin_execution()?
        .complete_discovery(DiscoverySource::RestoredFromCache, headers())?;
    assert!(b.inputs_discovered());
    assert_eq!(
        b.discovered_inputs().map(|d| d.source()),
        Some(DiscoverySource::RestoredFromCache)
    );
    Ok(())
}

#[test]
fn test_complete_twice_is_an_error() -> anyhow::Result<()> {
    let b = Arc::new(compile()?);
    b.begin_execution()?
        .complete_discovery(DiscoverySource::Executed, headers())?;
    let e = b
        .begin_execution()?
        .complete_discovery(DiscoverySource::Executed, Vec::new())
        .unwrap_err();
    assert_discovery_error(e, |e| {
        matches!(e, InputDiscoveryError::AlreadyComplete(..))
    });
    // The first set is kept.
    assert_eq!(b.discovered_inputs().unwrap().inputs().len(), 2);
    Ok(())
}

#[test]
fn test_one_attempt_in_flight() -> anyhow::Result<()> {
    let b = Arc::new(compile()?);
    let attempt = b.begin_execution()?;
    assert_matches!(
        b.begin_execution()
            .err()
            .as_ref()
            .and_then(|e| e.downcast_ref::<InputDiscoveryError>()),
        Some(InputDiscoveryError::AttemptInFlight(..))
    );
    drop(attempt);
    assert!(!b.inputs_discovered());
    b.begin_execution()?.finish();
    assert!(!b.inputs_discovered());
    Ok(())
}

#[test]
fn test_own_output_is_rejected() -> anyhow::Result<()> {
    let b = Arc::new(compile()?);
    let e = b
        .begin_execution()?
        .complete_discovery(
            DiscoverySource::Executed,
            [Artifact::testing_build("out/app/main.o")],
        )
        .unwrap_err();
    assert_discovery_error(e, |e| matches!(e, InputDiscoveryError::OwnOutput(..)));
    assert!(!b.inputs_discovered());
    Ok(())
}

#[test]
fn test_non_discovering_action_rejects_completion() -> anyhow::Result<()> {
    let a = Arc::new(
        RunActionBuilder::new(ActionIdentity::testing_new("//app:link", 0), "CppLink")
            .args(["cc", "-o", "out/app/main", "out/app/main.o"])
            .input(Artifact::build("out/app/main.o")?)
            .output(Artifact::build("out/app/main")?)
            .build()?,
    );
    assert!(a.inputs_discovered());
    let e = a
        .begin_execution()?
        .complete_discovery(DiscoverySource::Executed, headers())
        .unwrap_err();
    assert_discovery_error(e, |e| matches!(e, InputDiscoveryError::NotSupported(..)));
    assert_eq!(a.discovery_state(), DiscoveryState::NotApplicable);
    Ok(())
}
