/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use allocative::Allocative;
use derive_more::Display;
use dupe::Dupe;

use crate::label::Label;

/// Stable identity of an action: the target that registered it and the
/// position at which it was registered.
///
/// Both components are derived from analysis alone, so the identity survives
/// incremental builds and can be used to look up state from a prior build.
#[derive(Clone, Dupe, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd, Allocative)]
#[display("{} (#{})", owner, index)]
pub struct ActionIdentity {
    owner: Label,
    index: u32,
}

impl ActionIdentity {
    pub fn new(owner: Label, index: u32) -> ActionIdentity {
        ActionIdentity { owner, index }
    }

    pub fn testing_new(owner: &str, index: u32) -> ActionIdentity {
        ActionIdentity::new(Label::testing_parse(owner), index)
    }

    pub fn owner(&self) -> &Label {
        &self.owner
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}
