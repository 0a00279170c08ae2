/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use allocative::Allocative;
use derive_more::Display;
use dupe::Dupe;
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Error)]
enum ArtifactPathError {
    #[error("Artifact path must be non-empty")]
    Empty,
    #[error("Artifact path must be relative, got `{0}`")]
    Absolute(String),
    #[error("Artifact path `{0}` must not contain empty, `.` or `..` components")]
    NotNormalized(String),
}

#[derive(
    Debug, Clone, Copy, Dupe, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Allocative
)]
pub enum ArtifactKind {
    /// Checked into the source tree.
    #[display("source")]
    Source,
    /// Produced by exactly one action.
    #[display("build")]
    Build,
}

/// A file consumed or produced by an action, identified by its exec path.
#[derive(Debug, Clone, Dupe, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Allocative)]
#[display("{}", path)]
pub struct Artifact {
    kind: ArtifactKind,
    path: Arc<str>,
}

impl Artifact {
    pub fn source(path: &str) -> anyhow::Result<Artifact> {
        Self::new(ArtifactKind::Source, path)
    }

    pub fn build(path: &str) -> anyhow::Result<Artifact> {
        Self::new(ArtifactKind::Build, path)
    }

    fn new(kind: ArtifactKind, path: &str) -> anyhow::Result<Artifact> {
        validate_path(path)?;
        Ok(Artifact {
            kind,
            path: Arc::from(path),
        })
    }

    pub fn testing_source(path: &str) -> Artifact {
        Self::source(path).unwrap()
    }

    pub fn testing_build(path: &str) -> Artifact {
        Self::build(path).unwrap()
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn is_source(&self) -> bool {
        self.kind == ArtifactKind::Source
    }

    pub fn exec_path(&self) -> &str {
        &self.path
    }
}

fn validate_path(path: &str) -> anyhow::Result<()> {
    if path.is_empty() {
        return Err(ArtifactPathError::Empty.into());
    }
    if path.starts_with('/') {
        return Err(ArtifactPathError::Absolute(path.to_owned()).into());
    }
    if path
        .split('/')
        .any(|c| c.is_empty() || c == "." || c == "..")
    {
        return Err(ArtifactPathError::NotNormalized(path.to_owned()).into());
    }
    Ok(())
}

/// Immutable, insertion-ordered set of artifacts.
///
/// Cloning shares the underlying storage, which also gives the set an identity
/// that key derivation can memoize on (see `DefaultActionKeyContext`).
/// Equality and hashing are order-sensitive.
#[derive(Debug, Clone, Dupe, Allocative)]
pub struct ArtifactSet(Arc<IndexSet<Artifact>>);

static EMPTY_ARTIFACT_SET: Lazy<ArtifactSet> =
    Lazy::new(|| ArtifactSet(Arc::new(IndexSet::new())));

impl ArtifactSet {
    pub fn empty() -> ArtifactSet {
        EMPTY_ARTIFACT_SET.dupe()
    }

    pub fn new(artifacts: impl IntoIterator<Item = Artifact>) -> ArtifactSet {
        ArtifactSet(Arc::new(artifacts.into_iter().collect()))
    }

    pub fn iter(&self) -> indexmap::set::Iter<'_, Artifact> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&Artifact> {
        self.0.get_index(0)
    }

    pub fn contains(&self, artifact: &Artifact) -> bool {
        self.0.contains(artifact)
    }

    pub fn to_vec(&self) -> Vec<Artifact> {
        self.0.iter().cloned().collect()
    }

    /// Address of the shared storage. Two sets with the same address are the same set.
    pub(crate) fn storage_addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for ArtifactSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.iter().eq(other.0.iter())
    }
}

impl Eq for ArtifactSet {}

impl Hash for ArtifactSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for artifact in self.0.iter() {
            artifact.hash(state);
        }
    }
}

impl FromIterator<Artifact> for ArtifactSet {
    fn from_iter<T: IntoIterator<Item = Artifact>>(iter: T) -> Self {
        ArtifactSet::new(iter)
    }
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type Item = &'a Artifact;
    type IntoIter = indexmap::set::Iter<'a, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use dupe::Dupe;
    use test_case::test_case;

    use super::*;

    #[test_case("pkg/foo.cc" ; "nested")]
    #[test_case("foo" ; "top level")]
    #[test_case("buck-out/v2/gen/foo.o" ; "deep")]
    fn accepts_normalized_paths(path: &str) {
        assert_eq!(Artifact::testing_source(path).exec_path(), path);
    }

    #[test_case("" ; "empty")]
    #[test_case("/abs/foo" ; "absolute")]
    #[test_case("pkg//foo" ; "empty component")]
    #[test_case("pkg/./foo" ; "dot")]
    #[test_case("pkg/../foo" ; "dot dot")]
    #[test_case("pkg/" ; "trailing slash")]
    fn rejects_bad_paths(path: &str) {
        let err = Artifact::build(path).unwrap_err();
        assert!(err.downcast_ref::<ArtifactPathError>().is_some());
    }

    #[test]
    fn absolute_path_error() {
        assert_matches!(
            Artifact::source("/tmp/x").unwrap_err().downcast_ref::<ArtifactPathError>(),
            Some(ArtifactPathError::Absolute(p)) => assert_eq!(p, "/tmp/x")
        );
    }

    #[test]
    fn source_and_build_are_distinct() {
        let src = Artifact::testing_source("pkg/a");
        let out = Artifact::testing_build("pkg/a");
        assert_ne!(src, out);
        assert!(src.is_source());
        assert!(!out.is_source());
        assert_eq!(out.to_string(), "pkg/a");
    }

    #[test]
    fn set_dedupes_preserving_order() {
        let a = Artifact::testing_source("a");
        let b = Artifact::testing_source("b");
        let set = ArtifactSet::new([b.dupe(), a.dupe(), b.dupe()]);
        assert_eq!(set.to_vec(), vec![b.dupe(), a.dupe()]);
        assert_eq!(set.first(), Some(&b));
        assert!(set.contains(&a));
        assert_ne!(set, ArtifactSet::new([a, b]));
    }

    #[test]
    fn empty_sets_share_storage() {
        assert_eq!(
            ArtifactSet::empty().storage_addr(),
            ArtifactSet::empty().storage_addr()
        );
        assert_eq!(ArtifactSet::empty(), ArtifactSet::new(Vec::new()));
        assert!(ArtifactSet::empty().first().is_none());
    }

    #[test]
    fn set_clones_share_storage() {
        let set: ArtifactSet = [Artifact::testing_source("a")].into_iter().collect();
        let other = ArtifactSet::new([Artifact::testing_source("a")]);
        assert_eq!(set.storage_addr(), set.dupe().storage_addr());
        assert_eq!(set, other);
        assert_ne!(set.storage_addr(), other.storage_addr());
    }
}
