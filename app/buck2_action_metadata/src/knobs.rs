/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use dupe::Dupe;

/// Graph-level config that tweaks how actions are registered and keyed.
#[derive(Clone, Dupe, Debug)]
pub struct ActionGraphKnobs {
    /// Whether to emit action keys and their descriptions to the debug log (those are
    /// pretty verbose and omitted by default).
    pub log_action_keys: bool,

    /// Whether to re-check the discovery invariant of every action as it is registered.
    pub verify_discovery_invariants: bool,
}

impl ActionGraphKnobs {
    pub fn new() -> ActionGraphKnobs {
        ActionGraphKnobs {
            log_action_keys: false,
            verify_discovery_invariants: true,
        }
    }
}

impl Default for ActionGraphKnobs {
    fn default() -> Self {
        Self::new()
    }
}
