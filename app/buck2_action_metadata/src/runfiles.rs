/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::fmt::Debug;
use std::sync::Arc;

use allocative::Allocative;
use dupe::Dupe;
use indexmap::IndexMap;
use indexmap::IndexSet;
use once_cell::sync::Lazy;

use crate::artifact::Artifact;
use crate::key::Fingerprint;

/// Supplies the runtime-support files an action's outputs need when they are
/// executed later (e.g. by a test action).
///
/// Suppliers are shared between actions and are never mutated through this
/// interface.
pub trait RunfilesSupplier: Allocative + Debug + Send + Sync + 'static {
    /// Runfiles directories, relative to the exec root.
    fn runfiles_dirs(&self) -> Vec<&str>;

    fn artifacts(&self) -> Vec<Artifact>;

    fn is_empty(&self) -> bool {
        self.artifacts().is_empty()
    }

    fn add_to_fingerprint(&self, fp: &mut Fingerprint) {
        fp.add_strings(&self.runfiles_dirs());
        let artifacts = self.artifacts();
        fp.add_u64(artifacts.len() as u64);
        for artifact in &artifacts {
            fp.add_artifact(artifact);
        }
    }
}

#[derive(Debug, Allocative)]
pub struct EmptyRunfilesSupplier;

static EMPTY_RUNFILES: Lazy<Arc<dyn RunfilesSupplier>> =
    Lazy::new(|| Arc::new(EmptyRunfilesSupplier));

impl EmptyRunfilesSupplier {
    /// The shared empty supplier.
    pub fn get() -> Arc<dyn RunfilesSupplier> {
        EMPTY_RUNFILES.dupe()
    }
}

impl RunfilesSupplier for EmptyRunfilesSupplier {
    fn runfiles_dirs(&self) -> Vec<&str> {
        Vec::new()
    }

    fn artifacts(&self) -> Vec<Artifact> {
        Vec::new()
    }

    fn is_empty(&self) -> bool {
        true
    }
}

/// One runfiles directory, mapping relative paths inside it to artifacts.
#[derive(Debug, Allocative)]
pub struct SingleRunfilesSupplier {
    dir: Arc<str>,
    mappings: IndexMap<Arc<str>, Artifact>,
}

impl SingleRunfilesSupplier {
    /// Later mappings for the same relative path win.
    pub fn new(
        dir: &str,
        mappings: impl IntoIterator<Item = (String, Artifact)>,
    ) -> SingleRunfilesSupplier {
        SingleRunfilesSupplier {
            dir: Arc::from(dir),
            mappings: mappings
                .into_iter()
                .map(|(path, artifact)| (Arc::from(path), artifact))
                .collect(),
        }
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn mappings(&self) -> impl Iterator<Item = (&str, &Artifact)> {
        self.mappings.iter().map(|(p, a)| (&**p, a))
    }
}

impl RunfilesSupplier for SingleRunfilesSupplier {
    fn runfiles_dirs(&self) -> Vec<&str> {
        vec![&*self.dir]
    }

    fn artifacts(&self) -> Vec<Artifact> {
        self.mappings.iter().map(|(_, a)| a.dupe()).collect()
    }

    fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    fn add_to_fingerprint(&self, fp: &mut Fingerprint) {
        fp.add_str(&self.dir);
        fp.add_u64(self.mappings.len() as u64);
        for (path, artifact) in &self.mappings {
            fp.add_str(path);
            fp.add_artifact(artifact);
        }
    }
}

/// Concatenation of several suppliers.
#[derive(Debug, Allocative)]
pub struct CompositeRunfilesSupplier {
    suppliers: Vec<Arc<dyn RunfilesSupplier>>,
}

impl CompositeRunfilesSupplier {
    /// Empty suppliers are dropped; if at most one remains it is returned as is.
    pub fn of(
        suppliers: impl IntoIterator<Item = Arc<dyn RunfilesSupplier>>,
    ) -> Arc<dyn RunfilesSupplier> {
        let mut suppliers: Vec<_> = suppliers
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        match suppliers.len() {
            0 => EmptyRunfilesSupplier::get(),
            1 => suppliers.pop().unwrap_or_else(EmptyRunfilesSupplier::get),
            _ => Arc::new(CompositeRunfilesSupplier { suppliers }),
        }
    }
}

impl RunfilesSupplier for CompositeRunfilesSupplier {
    fn runfiles_dirs(&self) -> Vec<&str> {
        self.suppliers.iter().flat_map(|s| s.runfiles_dirs()).collect()
    }

    fn artifacts(&self) -> Vec<Artifact> {
        self.suppliers
            .iter()
            .flat_map(|s| s.artifacts())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    fn add_to_fingerprint(&self, fp: &mut Fingerprint) {
        fp.add_u64(self.suppliers.len() as u64);
        for supplier in &self.suppliers {
            supplier.add_to_fingerprint(fp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(dir: &str, files: &[&str]) -> Arc<dyn RunfilesSupplier> {
        Arc::new(SingleRunfilesSupplier::new(
            dir,
            files
                .iter()
                .map(|f| ((*f).to_owned(), Artifact::testing_source(f))),
        ))
    }

    #[test]
    fn empty_is_shared() {
        assert!(Arc::ptr_eq(
            &EmptyRunfilesSupplier::get(),
            &EmptyRunfilesSupplier::get()
        ));
        assert!(EmptyRunfilesSupplier::get().is_empty());
    }

    #[test]
    fn single_overrides_duplicate_paths() {
        let s = SingleRunfilesSupplier::new(
            "bin/test.runfiles",
            [
                ("data.txt".to_owned(), Artifact::testing_source("a/data.txt")),
                ("data.txt".to_owned(), Artifact::testing_source("b/data.txt")),
            ],
        );
        assert_eq!(
            s.mappings().collect::<Vec<_>>(),
            vec![("data.txt", &Artifact::testing_source("b/data.txt"))]
        );
        assert_eq!(s.runfiles_dirs(), vec!["bin/test.runfiles"]);
    }

    #[test]
    fn composite_drops_empty_and_dedupes() {
        let only = single("x.runfiles", &["a"]);
        let c = CompositeRunfilesSupplier::of([EmptyRunfilesSupplier::get(), only.dupe()]);
        assert!(Arc::ptr_eq(&c, &only));

        let c = CompositeRunfilesSupplier::of([
            single("x.runfiles", &["a", "b"]),
            single("y.runfiles", &["b", "c"]),
        ]);
        assert_eq!(c.runfiles_dirs(), vec!["x.runfiles", "y.runfiles"]);
        assert_eq!(
            c.artifacts(),
            vec![
                Artifact::testing_source("a"),
                Artifact::testing_source("b"),
                Artifact::testing_source("c"),
            ]
        );
        assert!(CompositeRunfilesSupplier::of(Vec::new()).is_empty());
    }

    #[test]
    fn fingerprint_depends_on_mapping() {
        let key = |s: &Arc<dyn RunfilesSupplier>| {
            let mut fp = Fingerprint::new();
            s.add_to_fingerprint(&mut fp);
            fp.finish()
        };
        assert_eq!(key(&single("d", &["a"])), key(&single("d", &["a"])));
        assert_ne!(key(&single("d", &["a"])), key(&single("e", &["a"])));
    }
}
