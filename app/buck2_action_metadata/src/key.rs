/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

//! Cache key derivation.

use std::hash::Hash;
use std::hash::Hasher;

use allocative::Allocative;
use dashmap::DashMap;
use derive_more::Display;
use dupe::Dupe;
use sha2::Digest;
use sha2::Sha256;

use crate::artifact::Artifact;
use crate::artifact::ArtifactSet;

/// The number of bytes in an action cache key.
pub const ACTION_CACHE_KEY_SIZE: usize = 32;

/// Summary of everything that determines an action's outputs. Two actions
/// with the same key are interchangeable for caching purposes.
#[derive(Clone, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd, Allocative)]
#[display("{}", hex::encode(_0))]
pub struct ActionCacheKey([u8; ACTION_CACHE_KEY_SIZE]);

// We consider copying 32 bytes is cheap enough not to qualify for Dupe
impl Dupe for ActionCacheKey {}

impl ActionCacheKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Incremental SHA-256 over a sequence of typed fields.
///
/// Every variable-length field is length-prefixed, so `["ab", "c"]` and
/// `["a", "bc"]` produce different fingerprints.
pub struct Fingerprint {
    hasher: Sha256,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprint {
    pub fn new() -> Fingerprint {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.add_u64(bytes.len() as u64);
        self.hasher.update(bytes);
    }

    pub fn add_str(&mut self, s: &str) {
        self.add_bytes(s.as_bytes());
    }

    pub fn add_bool(&mut self, b: bool) {
        self.hasher.update([b as u8]);
    }

    pub fn add_u64(&mut self, v: u64) {
        self.hasher.update(v.to_le_bytes());
    }

    pub fn add_strings<S: AsRef<str>>(&mut self, items: &[S]) {
        self.add_u64(items.len() as u64);
        for item in items {
            self.add_str(item.as_ref());
        }
    }

    pub fn add_artifact(&mut self, artifact: &Artifact) {
        self.add_str(&artifact.kind().to_string());
        self.add_str(artifact.exec_path());
    }

    fn finish_raw(self) -> [u8; ACTION_CACHE_KEY_SIZE] {
        self.hasher.finalize().into()
    }

    pub fn finish(self) -> ActionCacheKey {
        ActionCacheKey(self.finish_raw())
    }
}

/// Shared capability used by actions to fold their inputs into a cache key.
///
/// One context is shared by every action of a build; implementations are
/// free to memoize, but the fingerprint they produce must only depend on
/// the contents of the set.
pub trait ActionKeyContext: Send + Sync {
    fn add_artifacts(&self, artifacts: &ArtifactSet, fp: &mut Fingerprint);
}

fn digest_artifacts(artifacts: &ArtifactSet) -> [u8; ACTION_CACHE_KEY_SIZE] {
    let mut fp = Fingerprint::new();
    fp.add_u64(artifacts.len() as u64);
    for artifact in artifacts {
        fp.add_artifact(artifact);
    }
    fp.finish_raw()
}

/// Compares artifact sets by storage identity. Holding the set keeps the
/// storage alive, so an address is never reused while it is a key.
struct ArtifactSetByIdentity(ArtifactSet);

impl PartialEq for ArtifactSetByIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.0.storage_addr() == other.0.storage_addr()
    }
}

impl Eq for ArtifactSetByIdentity {}

impl Hash for ArtifactSetByIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.storage_addr().hash(state)
    }
}

/// Memoizes the digest of each artifact set it has seen. Actions sharing a
/// declared-input set (common for compile actions of one target) digest it
/// once.
///
/// The memo keeps every set it has seen alive and never shrinks on its own:
/// use one context per build and drop it (or `clear` it) afterwards.
#[derive(Default)]
pub struct DefaultActionKeyContext {
    digests: DashMap<ArtifactSetByIdentity, [u8; ACTION_CACHE_KEY_SIZE]>,
}

impl DefaultActionKeyContext {
    pub fn new() -> DefaultActionKeyContext {
        Self::default()
    }

    pub fn memoized_sets(&self) -> usize {
        self.digests.len()
    }

    /// Forgets all memoized digests, releasing the sets they kept alive.
    pub fn clear(&self) {
        let released = self.digests.len();
        self.digests.clear();
        tracing::debug!(released, "action key memo cleared");
    }
}

impl ActionKeyContext for DefaultActionKeyContext {
    fn add_artifacts(&self, artifacts: &ArtifactSet, fp: &mut Fingerprint) {
        let digest = *self
            .digests
            .entry(ArtifactSetByIdentity(artifacts.dupe()))
            .or_insert_with(|| digest_artifacts(artifacts));
        fp.add_bytes(&digest);
    }
}
