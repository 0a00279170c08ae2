/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use allocative::Allocative;
use derive_more::Display;
use dupe::Dupe;
use thiserror::Error;

#[derive(Debug, Error)]
enum RepoNameError {
    #[error("Invalid character `{1}` in repository name `{0}`")]
    InvalidChar(String, char),
    #[error("Apparent repository name must be non-empty")]
    EmptyApparentName,
}

/// A canonical repository name. The empty name is the main repository.
#[derive(Clone, Dupe, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd, Allocative)]
pub struct RepoName(Arc<str>);

impl RepoName {
    pub fn main() -> RepoName {
        RepoName(Arc::from(""))
    }

    pub fn new(name: &str) -> anyhow::Result<RepoName> {
        if let Some(c) = name.chars().find(|c| !is_repo_name_char(*c)) {
            return Err(RepoNameError::InvalidChar(name.to_owned(), c).into());
        }
        Ok(RepoName(Arc::from(name)))
    }

    pub fn testing_new(name: &str) -> RepoName {
        RepoName::new(name).unwrap()
    }

    pub fn is_main(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_repo_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '~')
}

/// Mapping from the apparent repository names visible in one repository to
/// canonical repository names.
///
/// Used only for display: labels are rendered with apparent names when the
/// mapping provides one.
#[derive(Debug, Clone, Allocative)]
pub struct RepositoryMapping {
    owner: RepoName,
    entries: BTreeMap<String, RepoName>,
    #[allocative(skip)]
    inverse: HashMap<RepoName, String>,
}

impl RepositoryMapping {
    pub fn new(
        owner: RepoName,
        entries: impl IntoIterator<Item = (String, RepoName)>,
    ) -> anyhow::Result<RepositoryMapping> {
        let mut map = BTreeMap::new();
        for (apparent, canonical) in entries {
            if apparent.is_empty() {
                return Err(RepoNameError::EmptyApparentName.into());
            }
            // Apparent names follow the same character rules as canonical ones.
            RepoName::new(&apparent)?;
            map.insert(apparent, canonical);
        }

        // BTreeMap iterates in key order, so the first apparent name seen for
        // a canonical repository is the lexicographically smallest one.
        let mut inverse = HashMap::new();
        for (apparent, canonical) in &map {
            inverse
                .entry(canonical.dupe())
                .or_insert_with(|| apparent.clone());
        }

        Ok(RepositoryMapping {
            owner,
            entries: map,
            inverse,
        })
    }

    pub fn empty(owner: RepoName) -> RepositoryMapping {
        RepositoryMapping {
            owner,
            entries: BTreeMap::new(),
            inverse: HashMap::new(),
        }
    }

    /// The repository whose view of names this mapping describes.
    pub fn owner(&self) -> &RepoName {
        &self.owner
    }

    pub fn get(&self, apparent: &str) -> Option<&RepoName> {
        self.entries.get(apparent)
    }

    /// Apparent name under which `canonical` is visible, if any.
    pub fn apparent_name(&self, canonical: &RepoName) -> Option<&str> {
        self.inverse.get(canonical).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
