/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

//! Input discovery.
//!
//! Some actions (C++ compilation is the classic example) only learn their full
//! input set by running: the declared inputs are a lower bound until the
//! executor reports what was actually read. An action instance moves through
//!
//! ```text
//! NotApplicable                      (never discovers inputs)
//! Pending --complete_discovery--> Complete
//! ```
//!
//! `Complete` is only left by replacing the action with a reset clone when
//! its graph node is invalidated; nothing flips it back in place.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use allocative::Allocative;
use derive_more::Display;
use dupe::Dupe;
use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::action::Action;
use crate::artifact::Artifact;
use crate::artifact::ArtifactSet;
use crate::identity::ActionIdentity;

#[derive(Debug, Error)]
pub enum InputDiscoveryError {
    #[error("Action `{0}` does not discover inputs")]
    NotSupported(ActionIdentity),
    #[error("Inputs of action `{0}` were already discovered; invalidate it to discover again")]
    AlreadyComplete(ActionIdentity),
    #[error("Action `{0}` already has an execution attempt in flight")]
    AttemptInFlight(ActionIdentity),
    #[error("Action `{0}` reported its own output `{1}` as a discovered input")]
    OwnOutput(ActionIdentity, Artifact),
}

#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq, Hash, Display, Allocative)]
pub enum DiscoveryState {
    /// The action never discovers inputs; its declared inputs are authoritative.
    #[display("not applicable")]
    NotApplicable,
    /// The declared inputs may be incomplete. The action must be executed.
    #[display("pending")]
    Pending,
    #[display("complete")]
    Complete,
}

/// How the complete input set was obtained.
#[derive(Debug, Clone, Copy, Dupe, PartialEq, Eq, Hash, Display, Allocative)]
pub enum DiscoverySource {
    #[display("executed")]
    Executed,
    #[display("restored from cache")]
    RestoredFromCache,
}

#[derive(Debug, Clone, Dupe, Allocative)]
pub struct DiscoveredInputs {
    source: DiscoverySource,
    inputs: ArtifactSet,
}

impl DiscoveredInputs {
    pub fn source(&self) -> DiscoverySource {
        self.source
    }

    pub fn inputs(&self) -> &ArtifactSet {
        &self.inputs
    }
}

/// Discovery state of one action instance.
///
/// The discovered set lives in a write-once cell: readers on other threads
/// observe either nothing or the fully written set.
#[derive(Debug)]
pub(crate) struct InputDiscovery {
    discovers_inputs: bool,
    generation: u32,
    attempt_in_flight: AtomicBool,
    discovered: OnceCell<DiscoveredInputs>,
}

impl InputDiscovery {
    pub(crate) fn new(discovers_inputs: bool) -> InputDiscovery {
        InputDiscovery {
            discovers_inputs,
            generation: 0,
            attempt_in_flight: AtomicBool::new(false),
            discovered: OnceCell::new(),
        }
    }

    /// Fresh state for the next instance of the same action.
    pub(crate) fn reset(&self) -> InputDiscovery {
        InputDiscovery {
            discovers_inputs: self.discovers_inputs,
            generation: self.generation.wrapping_add(1),
            attempt_in_flight: AtomicBool::new(false),
            discovered: OnceCell::new(),
        }
    }

    pub(crate) fn state(&self) -> DiscoveryState {
        if !self.discovers_inputs {
            DiscoveryState::NotApplicable
        } else if self.discovered.get().is_some() {
            DiscoveryState::Complete
        } else {
            DiscoveryState::Pending
        }
    }

    pub(crate) fn discovered(&self) -> Option<&DiscoveredInputs> {
        self.discovered.get()
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }

    fn try_claim(&self) -> bool {
        self.attempt_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.attempt_in_flight.store(false, Ordering::Release);
    }
}

/// The right to execute an action once and report what it read.
///
/// Only one attempt per action instance can be in flight; dropping the
/// attempt releases it. Completing discovery is the only way to move an
/// action from `Pending` to `Complete`.
#[must_use]
pub struct ExecutionAttempt {
    action: Arc<Action>,
}

impl ExecutionAttempt {
    pub(crate) fn claim(action: &Arc<Action>) -> anyhow::Result<ExecutionAttempt> {
        if !action.discovery().try_claim() {
            return Err(InputDiscoveryError::AttemptInFlight(action.identity().dupe()).into());
        }
        tracing::trace!(
            action = %action.identity(),
            generation = action.attempt_generation(),
            "execution attempt started"
        );
        Ok(ExecutionAttempt {
            action: action.dupe(),
        })
    }

    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    /// Records the complete input set of the action, either parsed from the
    /// execution that just finished or restored from a cache hit.
    pub fn complete_discovery(
        self,
        source: DiscoverySource,
        inputs: impl IntoIterator<Item = Artifact>,
    ) -> anyhow::Result<()> {
        let action = &self.action;
        let identity = action.identity();
        if !action.discovers_inputs() {
            return Err(InputDiscoveryError::NotSupported(identity.dupe()).into());
        }

        let inputs = ArtifactSet::new(inputs);
        if let Some(own) = inputs.iter().find(|a| action.outputs().contains(a)) {
            return Err(InputDiscoveryError::OwnOutput(identity.dupe(), own.dupe()).into());
        }

        let count = inputs.len();
        if action
            .discovery()
            .discovered
            .set(DiscoveredInputs { source, inputs })
            .is_err()
        {
            tracing::warn!(action = %identity, "input discovery completed twice");
            return Err(InputDiscoveryError::AlreadyComplete(identity.dupe()).into());
        }

        tracing::debug!(
            action = %identity,
            %source,
            discovered = count,
            "inputs discovered"
        );
        Ok(())
    }

    /// Ends the attempt without touching discovery state.
    pub fn finish(self) {}
}

impl Drop for ExecutionAttempt {
    fn drop(&mut self) {
        self.action.discovery().release();
        tracing::trace!(action = %self.action.identity(), "execution attempt released");
    }
}
