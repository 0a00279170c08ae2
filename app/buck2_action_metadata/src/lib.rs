/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

//! Side-effect-free metadata of a build action, plus the one mutable bit of
//! state an action carries: whether its input set is known to be complete.
//!
//! Schedulers read this metadata from many threads at once; the executor that
//! owns an execution attempt is the only writer of discovery state.

pub mod action;
pub mod artifact;
pub mod describe;
pub mod discovery;
pub mod graph;
pub mod identity;
pub mod impls;
pub mod key;
pub mod knobs;
pub mod label;
pub mod logging;
pub mod progress;
pub mod repo_mapping;
pub mod rewind;
pub mod runfiles;
pub mod scheduler;
