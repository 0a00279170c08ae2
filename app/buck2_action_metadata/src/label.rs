/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::fmt;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use thiserror::Error;

use crate::repo_mapping::RepoName;
use crate::repo_mapping::RepositoryMapping;

#[derive(Debug, Error)]
enum LabelParseError {
    #[error("Label `{0}` must start with `//` or `@@<repo>//`")]
    MissingRoot(String),
    #[error("Label `{0}` has an invalid package")]
    InvalidPackage(String),
    #[error("Label `{0}` has an empty target name")]
    EmptyName(String),
}

/// Label of the target that owns an action, e.g. `@@rules_cc+//cc:toolchain`.
#[derive(Clone, Dupe, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Allocative)]
pub struct Label {
    repo: RepoName,
    package: Arc<str>,
    name: Arc<str>,
}

impl Label {
    pub fn new(repo: RepoName, package: &str, name: &str) -> anyhow::Result<Label> {
        let display = || format!("@@{}//{}:{}", repo, package, name);
        if !package.is_empty()
            && package
                .split('/')
                .any(|c| c.is_empty() || c == "." || c == "..")
        {
            return Err(LabelParseError::InvalidPackage(display()).into());
        }
        if name.is_empty() {
            return Err(LabelParseError::EmptyName(display()).into());
        }
        Ok(Label {
            repo,
            package: Arc::from(package),
            name: Arc::from(name),
        })
    }

    /// Parses the canonical form: `//pkg:name`, `@@repo//pkg:name` or `//pkg`.
    pub fn parse(s: &str) -> anyhow::Result<Label> {
        let (repo, rest) = if let Some(rest) = s.strip_prefix("@@") {
            let (repo, rest) = rest
                .split_once("//")
                .ok_or_else(|| LabelParseError::MissingRoot(s.to_owned()))?;
            (RepoName::new(repo)?, rest)
        } else if let Some(rest) = s.strip_prefix("//") {
            (RepoName::main(), rest)
        } else {
            return Err(LabelParseError::MissingRoot(s.to_owned()).into());
        };

        let (package, name) = match rest.split_once(':') {
            Some((package, name)) => (package, name),
            None => {
                let name = rest.rsplit('/').next().unwrap_or(rest);
                (rest, name)
            }
        };
        Label::new(repo, package, name)
    }

    pub fn testing_parse(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    pub fn repo(&self) -> &RepoName {
        &self.repo
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the label the way a user of the main repository would write it.
    ///
    /// Without a mapping this is the canonical form.
    pub fn display_form(&self, mapping: Option<&RepositoryMapping>) -> String {
        if self.repo.is_main() {
            return format!("//{}:{}", self.package, self.name);
        }
        match mapping.and_then(|m| m.apparent_name(&self.repo)) {
            Some(apparent) => format!("@{}//{}:{}", apparent, self.package, self.name),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.repo.is_main() {
            write!(f, "//{}:{}", self.package, self.name)
        } else {
            write!(f, "@@{}//{}:{}", self.repo, self.package, self.name)
        }
    }
}
