/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

//! What a scheduler must do with an action, given its discovery state.
//!
//! While an action's inputs are not known to be complete, nothing about the
//! declared inputs can be trusted: the action always runs, whatever the
//! dependency checker concluded.

use allocative::Allocative;
use derive_more::Display;
use dupe::Dupe;
use dupe::IterDupedExt;
use indexmap::IndexSet;

use crate::action::Action;
use crate::artifact::Artifact;

/// Verdict of the dependency checker on the action's recorded inputs and
/// outputs.
#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq, Hash, Display, Allocative)]
pub enum Staleness {
    #[display("up to date")]
    UpToDate,
    #[display("stale")]
    Stale,
    /// Nothing is recorded for the action's cache key.
    #[display("unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq, Hash, Display, Allocative)]
pub enum ExecuteReason {
    #[display("inputs have not been discovered")]
    InputsNotDiscovered,
    #[display("action is stale")]
    Stale,
    #[display("no cache entry")]
    NoCacheEntry,
}

#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq, Hash, Allocative)]
pub enum ExecutionDecision {
    Execute(ExecuteReason),
    Skip,
}

pub fn decide_execution(action: &Action, staleness: Staleness) -> ExecutionDecision {
    if !action.inputs_discovered() {
        return ExecutionDecision::Execute(ExecuteReason::InputsNotDiscovered);
    }
    match staleness {
        Staleness::UpToDate => ExecutionDecision::Skip,
        Staleness::Stale => ExecutionDecision::Execute(ExecuteReason::Stale),
        Staleness::Unknown => ExecutionDecision::Execute(ExecuteReason::NoCacheEntry),
    }
}

/// Artifacts that must be available before the action runs: the declared
/// inputs, then any discovered input that was not declared.
///
/// While discovery is pending this is only the declared set. It must still be
/// scheduled in full.
pub fn prerequisites(action: &Action) -> Vec<Artifact> {
    let mut res: IndexSet<Artifact> = action.inputs().iter().duped().collect();
    if let Some(discovered) = action.discovered_inputs() {
        res.extend(discovered.inputs().iter().duped());
    }
    res.into_iter().collect()
}

impl ExecutionDecision {
    pub fn must_execute(&self) -> bool {
        matches!(self, ExecutionDecision::Execute(_))
    }

    /// `--explain` record for this decision.
    pub fn explain(&self, action: &Action) -> String {
        let mut res = match self {
            ExecutionDecision::Execute(reason) => {
                format!("Executing action {action}: {reason}.")
            }
            ExecutionDecision::Skip => format!("Skipping action {action}: up to date."),
        };
        if let Some(description) = action.describe_key() {
            res.push('\n');
            res.push_str(&description);
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use test_case::test_case;

    use super::*;
    use crate::action::testing::plain_action;
    use crate::discovery::DiscoverySource;
    use crate::identity::ActionIdentity;
    use crate::impls::run::RunActionBuilder;

    fn compile(discovers_inputs: bool) -> Arc<Action> {
        Arc::new(
            RunActionBuilder::new(ActionIdentity::testing_new("//cc:lib", 0), "CppCompile")
                .args(["cc", "-c", "lib.cc"])
                .input(Artifact::testing_source("cc/lib.cc"))
                .input(Artifact::testing_source("cc/lib.h"))
                .output(Artifact::testing_build("out/cc/lib.o"))
                .discovers_inputs(discovers_inputs)
                .build()
                .unwrap(),
        )
    }

    #[test_case(Staleness::UpToDate)]
    #[test_case(Staleness::Stale)]
    #[test_case(Staleness::Unknown)]
    fn pending_discovery_always_executes(staleness: Staleness) {
        let decision = decide_execution(&compile(true), staleness);
        assert_eq!(
            decision,
            ExecutionDecision::Execute(ExecuteReason::InputsNotDiscovered)
        );
        assert!(decision.must_execute());
    }

    #[test_case(Staleness::UpToDate, ExecutionDecision::Skip)]
    #[test_case(Staleness::Stale, ExecutionDecision::Execute(ExecuteReason::Stale))]
    #[test_case(Staleness::Unknown, ExecutionDecision::Execute(ExecuteReason::NoCacheEntry))]
    fn known_inputs_follow_staleness(staleness: Staleness, expected: ExecutionDecision) {
        let decision = decide_execution(&compile(false), staleness);
        assert_eq!(decision, expected);
        assert_eq!(decision.must_execute(), staleness != Staleness::UpToDate);

        let discovering = compile(true);
        discovering
            .begin_execution()
            .unwrap()
            .complete_discovery(DiscoverySource::RestoredFromCache, Vec::new())
            .unwrap();
        assert_eq!(decide_execution(&discovering, staleness), expected);
    }

    #[test]
    fn prerequisites_before_discovery_are_declared_inputs() {
        let a = compile(true);
        assert_eq!(
            prerequisites(&a),
            vec![
                Artifact::testing_source("cc/lib.cc"),
                Artifact::testing_source("cc/lib.h"),
            ]
        );
    }

    #[test]
    fn prerequisites_append_new_discovered_inputs() {
        let a = compile(true);
        a.begin_execution()
            .unwrap()
            .complete_discovery(
                DiscoverySource::Executed,
                [
                    Artifact::testing_source("cc/lib.h"),
                    Artifact::testing_source("base/base.h"),
                ],
            )
            .unwrap();
        assert_eq!(
            prerequisites(&a),
            vec![
                Artifact::testing_source("cc/lib.cc"),
                Artifact::testing_source("cc/lib.h"),
                Artifact::testing_source("base/base.h"),
            ]
        );
    }

    #[test]
    fn explain() {
        let a = compile(true);
        let text = decide_execution(&a, Staleness::UpToDate).explain(&a);
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Executing action CppCompile //cc:lib (#0): inputs have not been discovered.")
        );
        assert_eq!(lines.next(), Some("Running CppCompile out/cc/lib.o"));
        assert_eq!(lines.next(), Some("  Command: cc"));

        let plain = plain_action(0, "out/a");
        assert_eq!(
            ExecutionDecision::Skip.explain(&plain),
            "Skipping action Plain //pkg:plain (#0): up to date."
        );
    }
}
