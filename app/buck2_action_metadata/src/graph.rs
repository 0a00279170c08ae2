/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

//! The set of registered actions, indexed by identity and by output.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dupe::Dupe;
use thiserror::Error;

use crate::action::Action;
use crate::artifact::Artifact;
use crate::identity::ActionIdentity;
use crate::key::ActionCacheKey;
use crate::key::ActionKeyContext;
use crate::knobs::ActionGraphKnobs;

#[derive(Debug, Error)]
pub enum ActionGraphError {
    #[error("Action `{0}` is already registered")]
    DuplicateIdentity(ActionIdentity),
    #[error("Output `{artifact}` of action `{action}` is already produced by `{existing}`")]
    ConflictingOutput {
        artifact: Artifact,
        action: ActionIdentity,
        existing: ActionIdentity,
    },
    #[error("Unknown action `{0}`")]
    UnknownAction(ActionIdentity),
}

/// Registered actions. Every method takes `&self` and may be called from
/// any number of worker threads.
pub struct ActionGraph {
    knobs: ActionGraphKnobs,
    actions: DashMap<ActionIdentity, Arc<Action>>,
    producers: DashMap<Artifact, ActionIdentity>,
}

impl ActionGraph {
    pub fn new(knobs: ActionGraphKnobs) -> ActionGraph {
        ActionGraph {
            knobs,
            actions: DashMap::new(),
            producers: DashMap::new(),
        }
    }

    pub fn knobs(&self) -> &ActionGraphKnobs {
        &self.knobs
    }

    pub fn register(&self, action: Action) -> anyhow::Result<Arc<Action>> {
        if self.knobs.verify_discovery_invariants {
            action.assert_discovery_invariant();
        }

        let identity = action.identity().dupe();
        let slot = match self.actions.entry(identity.dupe()) {
            Entry::Occupied(_) => {
                return Err(ActionGraphError::DuplicateIdentity(identity).into());
            }
            Entry::Vacant(slot) => slot,
        };

        let mut claimed = Vec::with_capacity(action.outputs().len());
        for output in action.outputs() {
            let existing = match self.producers.entry(output.dupe()) {
                Entry::Occupied(e) => e.get().dupe(),
                Entry::Vacant(e) => {
                    e.insert(identity.dupe());
                    claimed.push(output);
                    continue;
                }
            };
            for output in claimed {
                self.producers.remove(output);
            }
            return Err(ActionGraphError::ConflictingOutput {
                artifact: output.dupe(),
                action: identity,
                existing,
            }
            .into());
        }

        tracing::debug!(
            action = %identity,
            kind = %action.kind(),
            discovers_inputs = action.discovers_inputs(),
            "action registered"
        );
        let action = Arc::new(action);
        slot.insert(action.dupe());
        Ok(action)
    }

    /// The current instance of the action. Callers holding an older instance
    /// keep it alive, but it is no longer part of the graph.
    pub fn get(&self, identity: &ActionIdentity) -> Option<Arc<Action>> {
        self.actions.get(identity).map(|a| a.dupe())
    }

    pub fn producer_of(&self, artifact: &Artifact) -> Option<Arc<Action>> {
        let identity = self.producers.get(artifact)?.dupe();
        self.get(&identity)
    }

    /// Discards the action's discovery state: the node now holds a fresh
    /// instance that shares the immutable core of the old one.
    pub fn invalidate(&self, identity: &ActionIdentity) -> anyhow::Result<Arc<Action>> {
        let mut entry = self
            .actions
            .get_mut(identity)
            .ok_or_else(|| ActionGraphError::UnknownAction(identity.dupe()))?;
        let fresh = Arc::new(entry.reset());
        *entry = fresh.dupe();
        drop(entry);

        tracing::debug!(
            action = %identity,
            generation = fresh.attempt_generation(),
            state = %fresh.discovery_state(),
            "action invalidated"
        );
        Ok(fresh)
    }

    pub fn cache_key(
        &self,
        identity: &ActionIdentity,
        ctx: &dyn ActionKeyContext,
    ) -> anyhow::Result<ActionCacheKey> {
        let action = self
            .get(identity)
            .ok_or_else(|| ActionGraphError::UnknownAction(identity.dupe()))?;
        let key = action.key(ctx);
        if self.knobs.log_action_keys {
            tracing::debug!(
                action = %identity,
                %key,
                description = action.describe_key().as_deref().unwrap_or(""),
                "action key computed"
            );
        }
        Ok(key)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::action::testing::plain_action;
    use crate::discovery::DiscoverySource;
    use crate::discovery::DiscoveryState;
    use crate::impls::run::RunActionBuilder;
    use crate::impls::symlink::SymlinkAction;
    use crate::key::DefaultActionKeyContext;

    fn graph() -> ActionGraph {
        ActionGraph::new(ActionGraphKnobs::default())
    }

    #[test]
    fn default_knobs_verify_invariants() {
        let g = graph();
        assert!(g.knobs().verify_discovery_invariants);
        assert!(!g.knobs().log_action_keys);
    }

    fn compile() -> Action {
        RunActionBuilder::new(ActionIdentity::testing_new("//cc:lib", 0), "CppCompile")
            .args(["cc", "-c", "lib.cc"])
            .input(Artifact::testing_source("cc/lib.cc"))
            .output(Artifact::testing_build("out/cc/lib.o"))
            .discovers_inputs(true)
            .build()
            .unwrap()
    }

    #[test]
    fn register_and_lookup() {
        let g = graph();
        assert!(g.is_empty());
        let a = g.register(plain_action(0, "out/a")).unwrap();
        assert_eq!(g.len(), 1);
        assert!(Arc::ptr_eq(&g.get(a.identity()).unwrap(), &a));
        assert!(Arc::ptr_eq(
            &g.producer_of(&Artifact::testing_build("out/a")).unwrap(),
            &a
        ));
        assert!(g.producer_of(&Artifact::testing_build("out/b")).is_none());
    }

    #[test]
    fn duplicate_identity() {
        let g = graph();
        g.register(plain_action(0, "out/a")).unwrap();
        assert_matches!(
            g.register(plain_action(0, "out/b"))
                .unwrap_err()
                .downcast_ref::<ActionGraphError>(),
            Some(ActionGraphError::DuplicateIdentity(..))
        );
        // The rejected action did not claim its output.
        assert!(g.producer_of(&Artifact::testing_build("out/b")).is_none());
    }

    #[test]
    fn conflicting_output() {
        let g = graph();
        g.register(plain_action(0, "out/a")).unwrap();
        assert_matches!(
            g.register(plain_action(1, "out/a"))
                .unwrap_err()
                .downcast_ref::<ActionGraphError>(),
            Some(ActionGraphError::ConflictingOutput { .. })
        );
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn conflicting_output_releases_earlier_claims() {
        let g = graph();
        g.register(plain_action(0, "out/b")).unwrap();
        let two_outputs = RunActionBuilder::new(ActionIdentity::testing_new("//x:y", 0), "X")
            .arg("true")
            .output(Artifact::testing_build("out/a"))
            .output(Artifact::testing_build("out/b"))
            .build()
            .unwrap();
        assert!(g.register(two_outputs).is_err());
        assert!(g.producer_of(&Artifact::testing_build("out/a")).is_none());
        g.register(plain_action(1, "out/a")).unwrap();
    }

    #[test]
    fn invalidate_resets_discovery() {
        let g = graph();
        let a = g.register(compile()).unwrap();
        let attempt = a.begin_execution().unwrap();
        attempt
            .complete_discovery(
                DiscoverySource::Executed,
                [Artifact::testing_source("cc/lib.h")],
            )
            .unwrap();
        assert!(a.inputs_discovered());

        let fresh = g.invalidate(a.identity()).unwrap();
        assert_eq!(fresh.discovery_state(), DiscoveryState::Pending);
        assert_eq!(fresh.attempt_generation(), 1);
        assert!(Arc::ptr_eq(&g.get(a.identity()).unwrap(), &fresh));
        // The old instance is detached but unchanged.
        assert_eq!(a.discovery_state(), DiscoveryState::Complete);
    }

    #[test]
    fn invalidate_non_discovering() {
        let g = graph();
        let a = g
            .register(
                SymlinkAction::new(
                    ActionIdentity::testing_new("//pkg:link", 0),
                    Artifact::testing_source("pkg/src"),
                    Artifact::testing_build("out/link"),
                )
                .unwrap(),
            )
            .unwrap();
        let fresh = g.invalidate(a.identity()).unwrap();
        assert!(fresh.inputs_discovered());
    }

    #[test]
    fn unknown_action() {
        let g = graph();
        let id = ActionIdentity::testing_new("//nope:nope", 0);
        assert_matches!(
            g.invalidate(&id)
                .unwrap_err()
                .downcast_ref::<ActionGraphError>(),
            Some(ActionGraphError::UnknownAction(..))
        );
        assert!(g.cache_key(&id, &DefaultActionKeyContext::new()).is_err());
    }

    #[test]
    fn cache_key_survives_invalidation() {
        let g = ActionGraph::new(ActionGraphKnobs {
            log_action_keys: true,
            ..ActionGraphKnobs::default()
        });
        let ctx = DefaultActionKeyContext::new();
        let a = g.register(compile()).unwrap();
        let before = g.cache_key(a.identity(), &ctx).unwrap();
        g.invalidate(a.identity()).unwrap();
        assert_eq!(before, g.cache_key(a.identity(), &ctx).unwrap());
    }
}
