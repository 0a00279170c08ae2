/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

//! Planning the recovery of a lost output.
//!
//! When a consumer fails because an input it needs is gone, the producer of
//! that input normally has to run again. A producer whose output is a
//! content-transparent copy of one of its inputs can instead be skipped: the
//! consumer reads the input directly. Chains of such producers are followed
//! until an artifact is reached that either is a source file or is produced
//! by an action that really has to run.

use std::collections::HashSet;

use allocative::Allocative;
use dupe::Dupe;
use thiserror::Error;

use crate::artifact::Artifact;
use crate::graph::ActionGraph;
use crate::identity::ActionIdentity;

#[derive(Debug, Error)]
pub enum RewindError {
    #[error("Source artifact `{0}` cannot be rewound")]
    SourceArtifact(Artifact),
    #[error("No registered action produces `{0}`")]
    NoProducer(Artifact),
    #[error("Cycle while rewinding `{lost}`: action `{action}` was reached twice")]
    Cycle {
        lost: Artifact,
        action: ActionIdentity,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Allocative)]
pub struct RewindPlan {
    lost: Artifact,
    origin: Artifact,
    skipped: Vec<ActionIdentity>,
    reexecute: Option<ActionIdentity>,
}

impl RewindPlan {
    /// The artifact the failed consumer could not read.
    pub fn lost(&self) -> &Artifact {
        &self.lost
    }

    /// The artifact whose content the lost artifact carries.
    pub fn origin(&self) -> &Artifact {
        &self.origin
    }

    /// Pass-through actions that need not run again, nearest to the consumer first.
    pub fn skipped(&self) -> &[ActionIdentity] {
        &self.skipped
    }

    /// The action to run again to recreate `origin`. `None` if `origin` is a
    /// source artifact.
    pub fn reexecute(&self) -> Option<&ActionIdentity> {
        self.reexecute.as_ref()
    }

    /// Whether the consumer can read `origin` in place of the lost artifact.
    pub fn substitutes_input(&self) -> bool {
        !self.skipped.is_empty()
    }
}

pub fn plan_rewind(graph: &ActionGraph, lost: &Artifact) -> anyhow::Result<RewindPlan> {
    if lost.is_source() {
        return Err(RewindError::SourceArtifact(lost.dupe()).into());
    }

    let mut visited = HashSet::new();
    let mut skipped = Vec::new();
    let mut current = lost.dupe();
    let reexecute = loop {
        let producer = graph
            .producer_of(&current)
            .ok_or_else(|| RewindError::NoProducer(current.dupe()))?;
        if !visited.insert(producer.identity().dupe()) {
            return Err(RewindError::Cycle {
                lost: lost.dupe(),
                action: producer.identity().dupe(),
            }
            .into());
        }

        let Some(input) = producer.propagated_input(&current) else {
            break Some(producer.identity().dupe());
        };
        tracing::trace!(
            action = %producer.identity(),
            output = %current,
            %input,
            "skipping pass-through action"
        );
        skipped.push(producer.identity().dupe());
        current = input;
        if current.is_source() {
            break None;
        }
    };

    tracing::debug!(
        %lost,
        origin = %current,
        skipped = skipped.len(),
        reexecute = reexecute.as_ref().map(|id| id.to_string()).as_deref(),
        "rewind planned"
    );

    Ok(RewindPlan {
        lost: lost.dupe(),
        origin: current,
        skipped,
        reexecute,
    })
}
