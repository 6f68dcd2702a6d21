/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-git/src/commit.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! The Commit Helper (component B, spec §4.2): builds a new commit that
//! differs from its parent only in the subtree rooted at a package path,
//! without ever materializing a working tree.
//!
//! Dirtiness is tracked implicitly: a directory is "dirty" exactly when its
//! path is a key in `trees`. Ancestors of the package path are always
//! loaded by `new`, so they are always dirty; everything else starts
//! unloaded and is bit-identical to the parent unless a caller's
//! `store_file`/`store_tree` pulls it in.

use porch_core::backend::{Backend, NewCommit, ObjectId, ObjectKind, TreeEntry};
use porch_core::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const GIT_MODE_TREE: u32 = 0o040000;
const GIT_MODE_FILE: u32 = 0o100644;
const PROCESS_IDENTITY_NAME: &str = "porch";
const PROCESS_IDENTITY_EMAIL: &str = "porch@localhost";

#[derive(Debug, Clone)]
enum Entry {
    Blob(ObjectId),
    Tree(ObjectId),
}

pub struct CommitBuilder {
    backend: Arc<dyn Backend>,
    trees: HashMap<String, BTreeMap<String, Entry>>,
    package_path: String,
    parent: Option<ObjectId>,
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn split_dir_name(path: &str) -> Result<(&str, &str)> {
    if path.is_empty() {
        return Err(Error::validation("path must not be empty"));
    }
    match path.rfind('/') {
        Some(idx) => Ok((&path[..idx], &path[idx + 1..])),
        None => Ok(("", path)),
    }
}

fn depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.matches('/').count() + 1
    }
}

/// Git orders tree entries as if directory names carried a trailing `/`.
fn sort_key(name: &str, kind: ObjectKind) -> String {
    if kind == ObjectKind::Tree {
        format!("{name}/")
    } else {
        name.to_string()
    }
}

async fn read_dir_entries(
    backend: &Arc<dyn Backend>,
    id: &ObjectId,
) -> Result<BTreeMap<String, Entry>> {
    let raw = backend.read_tree(id).await?;
    let mut map = BTreeMap::new();
    for e in raw {
        let entry = match e.kind {
            ObjectKind::Tree => Entry::Tree(e.id),
            ObjectKind::Blob => Entry::Blob(e.id),
            ObjectKind::Commit => {
                return Err(Error::validation(
                    "submodule (commit) tree entries are not supported",
                ))
            }
        };
        map.insert(e.name, entry);
    }
    Ok(map)
}

impl CommitBuilder {
    /// Implements spec §4.2 steps 1-3: loads the parent's root tree, loads
    /// every ancestor of `package_path`, and installs `starting_package_tree`
    /// (or removes the package entry entirely if `None`).
    pub async fn new(
        backend: Arc<dyn Backend>,
        parent: Option<ObjectId>,
        package_path: &str,
        starting_package_tree: Option<ObjectId>,
    ) -> Result<Self> {
        let root_entries = match &parent {
            Some(parent_id) => {
                let commit = backend.read_commit(parent_id).await?;
                read_dir_entries(&backend, &commit.tree).await?
            }
            None => BTreeMap::new(),
        };
        let mut trees = HashMap::new();
        trees.insert(String::new(), root_entries);

        let package_path = package_path.trim_matches('/').to_string();
        let parts = split_path(&package_path);
        if parts.is_empty() {
            return Err(Error::validation("package path must not be empty"));
        }

        let mut builder = CommitBuilder {
            backend,
            trees,
            package_path,
            parent,
        };

        let mut current = String::new();
        for part in &parts[..parts.len() - 1] {
            builder.load_one_level(&current, part).await?;
            current = if current.is_empty() {
                part.to_string()
            } else {
                format!("{current}/{part}")
            };
        }

        let name = parts[parts.len() - 1];
        let parent_map = builder
            .trees
            .get_mut(&current)
            .ok_or_else(|| Error::corruption("ancestor directory was not loaded"))?;
        if matches!(parent_map.get(name), Some(Entry::Blob(_))) {
            return Err(Error::validation(format!(
                "'{name}' already exists as a file, not a directory"
            )));
        }
        match starting_package_tree {
            Some(id) => {
                parent_map.insert(name.to_string(), Entry::Tree(id));
            }
            None => {
                parent_map.remove(name);
            }
        }

        Ok(builder)
    }

    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// Loads the child of `parent_path` named `name` into `trees`, erroring
    /// with a validation error if that child is a blob (spec's `ErrPathIsFile`).
    async fn load_one_level(&mut self, parent_path: &str, name: &str) -> Result<()> {
        let next = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{parent_path}/{name}")
        };
        if self.trees.contains_key(&next) {
            return Ok(());
        }
        let entry = self
            .trees
            .get(parent_path)
            .and_then(|m| m.get(name))
            .cloned();
        let loaded = match entry {
            None => BTreeMap::new(),
            Some(Entry::Blob(_)) => {
                return Err(Error::validation(format!(
                    "path component '{name}' under '{parent_path}' is a file, not a directory"
                )))
            }
            Some(Entry::Tree(id)) => read_dir_entries(&self.backend, &id).await?,
        };
        self.trees.insert(next, loaded);
        Ok(())
    }

    async fn ensure_loaded_dir(&mut self, path: &str) -> Result<()> {
        if path.is_empty() || self.trees.contains_key(path) {
            return Ok(());
        }
        let mut current = String::new();
        for part in split_path(path) {
            let next = if current.is_empty() {
                part.to_string()
            } else {
                format!("{current}/{part}")
            };
            if !self.trees.contains_key(&next) {
                self.load_one_level(&current, part).await?;
            }
            current = next;
        }
        Ok(())
    }

    pub async fn store_file(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        let path = path.trim_matches('/');
        let (dir, name) = split_dir_name(path)?;
        self.ensure_loaded_dir(dir).await?;
        let blob_id = self.backend.write_blob(bytes).await?;
        let map = self
            .trees
            .get_mut(dir)
            .expect("ensure_loaded_dir just populated this entry");
        map.insert(name.to_string(), Entry::Blob(blob_id));
        Ok(())
    }

    /// Installs an already-written tree object at `path` without expanding
    /// its children into the sparse map. Used by the Draft Engine's publish
    /// replay to graft a draft's whole package tree onto a new main commit
    /// (spec §4.6 step 3) without walking its contents.
    pub async fn store_tree(&mut self, path: &str, tree_id: ObjectId) -> Result<()> {
        let path = path.trim_matches('/');
        let (dir, name) = split_dir_name(path)?;
        self.ensure_loaded_dir(dir).await?;
        let map = self
            .trees
            .get_mut(dir)
            .expect("ensure_loaded_dir just populated this entry");
        map.insert(name.to_string(), Entry::Tree(tree_id));
        Ok(())
    }

    pub async fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let path = path.trim_matches('/');
        let (dir, name) = split_dir_name(path)?;
        self.ensure_loaded_dir(dir).await?;
        let entry = self.trees.get(dir).and_then(|m| m.get(name)).cloned();
        match entry {
            Some(Entry::Blob(id)) => self.backend.read_blob(&id).await,
            Some(Entry::Tree(_)) => Err(Error::validation(format!("'{path}' is a directory"))),
            None => Err(Error::not_found(format!("'{path}' does not exist"))),
        }
    }

    /// Implements spec §4.2 step 5: walks the sparse map bottom-up, writing
    /// every loaded directory, then writes the commit object itself.
    pub async fn commit(
        &mut self,
        message: String,
        author: Option<(String, String)>,
        additional_parents: Vec<ObjectId>,
    ) -> Result<ObjectId> {
        let mut paths: Vec<String> = self.trees.keys().cloned().collect();
        paths.sort_by(|a, b| depth(b).cmp(&depth(a)).then_with(|| b.cmp(a)));

        let mut resolved: HashMap<String, ObjectId> = HashMap::new();
        for path in &paths {
            let map = self
                .trees
                .get(path)
                .expect("path was collected from trees.keys()");
            let mut entries = Vec::with_capacity(map.len());
            for (name, entry) in map {
                let (kind, mode, id) = match entry {
                    Entry::Blob(id) => (ObjectKind::Blob, GIT_MODE_FILE, id.clone()),
                    Entry::Tree(id) => {
                        let child_path = if path.is_empty() {
                            name.clone()
                        } else {
                            format!("{path}/{name}")
                        };
                        let resolved_id = resolved.get(&child_path).cloned().unwrap_or_else(|| id.clone());
                        (ObjectKind::Tree, GIT_MODE_TREE, resolved_id)
                    }
                };
                entries.push(TreeEntry {
                    name: name.clone(),
                    mode,
                    kind,
                    id,
                });
            }
            entries.sort_by(|a, b| sort_key(&a.name, a.kind).cmp(&sort_key(&b.name, b.kind)));
            let tree_id = self.backend.write_tree(&entries).await?;
            resolved.insert(path.clone(), tree_id);
        }

        let root_tree = resolved
            .get("")
            .cloned()
            .ok_or_else(|| Error::corruption("root tree was never resolved"))?;

        let mut parents = Vec::new();
        if let Some(p) = &self.parent {
            parents.push(p.clone());
        }
        parents.extend(additional_parents);

        let (author_name, author_email) = author
            .unwrap_or_else(|| (PROCESS_IDENTITY_NAME.to_string(), PROCESS_IDENTITY_EMAIL.to_string()));

        let new_commit = NewCommit {
            tree: root_tree,
            parents,
            message,
            author_name,
            author_email,
        };
        self.backend.write_commit(&new_commit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git2_backend::Git2Backend;
    use porch_core::backend::ObjectKind;

    fn open_backend() -> (tempfile::TempDir, Arc<dyn Backend>) {
        let dir = tempfile::tempdir().unwrap();
        let backend = Git2Backend::open_or_init(dir.path(), "https://example.invalid/repo.git").unwrap();
        (dir, Arc::new(backend))
    }

    #[tokio::test]
    async fn commit_is_path_local() {
        let (_dir, backend) = open_backend();

        // Seed a commit with content both inside and outside the package path.
        let mut seed = CommitBuilder::new(backend.clone(), None, "pkg/a", None).await.unwrap();
        seed.store_file("pkg/a/Kptfile", b"seed").await.unwrap();
        seed.store_file("other/unrelated.txt", b"untouched").await.unwrap();
        let seed_commit = seed.commit("seed".to_string(), None, Vec::new()).await.unwrap();
        let seed_tree = backend.read_commit(&seed_commit).await.unwrap().tree;
        let seed_other = backend
            .read_tree(&seed_tree)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.name == "other")
            .unwrap();

        // A second commit only touches the package path.
        let mut edit = CommitBuilder::new(backend.clone(), Some(seed_commit), "pkg/a", None)
            .await
            .unwrap();
        edit.store_file("pkg/a/Kptfile", b"seed").await.unwrap();
        edit.store_file("pkg/a/hello", b"world").await.unwrap();
        let new_commit = edit.commit("edit".to_string(), None, Vec::new()).await.unwrap();
        let new_tree = backend.read_commit(&new_commit).await.unwrap().tree;
        let new_other = backend
            .read_tree(&new_tree)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.name == "other")
            .unwrap();

        assert_eq!(seed_other.id, new_other.id);
        assert_eq!(new_other.kind, ObjectKind::Tree);
    }

    #[tokio::test]
    async fn store_file_round_trips_through_read_file() {
        let (_dir, backend) = open_backend();
        let mut builder = CommitBuilder::new(backend.clone(), None, "pkg/a", None).await.unwrap();
        builder.store_file("pkg/a/Kptfile", b"apiVersion: v1").await.unwrap();
        let bytes = builder.read_file("pkg/a/Kptfile").await.unwrap();
        assert_eq!(bytes, b"apiVersion: v1");
    }

    #[tokio::test]
    async fn empty_package_with_no_starting_tree_removes_the_entry() {
        let (_dir, backend) = open_backend();
        let mut seed = CommitBuilder::new(backend.clone(), None, "pkg/a", None).await.unwrap();
        seed.store_file("pkg/a/Kptfile", b"seed").await.unwrap();
        let seed_commit = seed.commit("seed".to_string(), None, Vec::new()).await.unwrap();

        let mut remove = CommitBuilder::new(backend.clone(), Some(seed_commit), "pkg/a", None)
            .await
            .unwrap();
        let removed_commit = remove.commit("remove".to_string(), None, Vec::new()).await.unwrap();
        let tree = backend.read_commit(&removed_commit).await.unwrap().tree;
        let entries = backend.read_tree(&tree).await.unwrap();
        assert!(entries.iter().all(|e| e.name != "pkg"));
    }

    #[tokio::test]
    async fn ancestor_that_is_a_file_is_rejected() {
        let (_dir, backend) = open_backend();
        // Commit a parent where `pkg` is a blob, not a directory.
        let mut seed = CommitBuilder::new(backend.clone(), None, "seed-only", None).await.unwrap();
        seed.store_file("pkg", b"not a directory").await.unwrap();
        let seed_commit = seed.commit("seed".to_string(), None, Vec::new()).await.unwrap();

        // A package path nested under `pkg` must fail to load it as an
        // ancestor, not silently treat it as an empty directory.
        let result = CommitBuilder::new(backend.clone(), Some(seed_commit), "pkg/a", None).await;
        assert!(result.is_err());
    }
}
