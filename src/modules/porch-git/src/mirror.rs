/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-git/src/mirror.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Repository Mirror (component D, spec §4.4): the single source of truth
//! for reads within a process, backed by a bare local clone.

use porch_core::annotation;
use porch_core::auth::CredentialProvider;
use porch_core::backend::{
    Backend, CommitInfo, GitAuth, NewCommit, ObjectId, ObjectKind, PushRequest, RefPrecondition,
    RefUpdate, TreeEntry,
};
use porch_core::error::{Error, Result};
use porch_core::model::MainBranchStrategy;
use porch_core::refs::{self, LocalRef, RefClass};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

/// Capacity of the change-notification broadcast channel (§4.8 step 1). A
/// lagged subscriber just means its next recv resyncs via a full diff rather
/// than missing an event outright, so this only needs to absorb bursts.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

const PROCESS_IDENTITY_NAME: &str = "porch";
const PROCESS_IDENTITY_EMAIL: &str = "porch@localhost";
const README_CONTENTS: &[u8] = b"# Managed by porch\n\nThis branch was initialized automatically.\n";

pub struct RepositoryMirror {
    backend: Arc<dyn Backend>,
    credentials: Arc<dyn CredentialProvider>,
    main_branch: String,
    known_refs: RwLock<HashSet<LocalRef>>,
    deletion_proposed: RwLock<HashSet<LocalRef>>,
    changed: broadcast::Sender<()>,
}

impl RepositoryMirror {
    pub fn new(
        backend: Arc<dyn Backend>,
        credentials: Arc<dyn CredentialProvider>,
        main_branch: String,
    ) -> Self {
        let (changed, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        RepositoryMirror {
            backend,
            credentials,
            main_branch,
            known_refs: RwLock::new(HashSet::new()),
            deletion_proposed: RwLock::new(HashSet::new()),
            changed,
        }
    }

    /// The Watcher Fan-Out's change notifier (§4.8 step 1): a subscription
    /// taken out before an initial list sees every reindex from that point
    /// on, so changes racing the list land in the subscriber's backlog
    /// instead of being missed.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<()> {
        self.changed.subscribe()
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    pub fn main_branch(&self) -> &str {
        &self.main_branch
    }

    /// `git fetch origin --prune` through the backend, retrying once with a
    /// force-refreshed credential on an authentication failure (§4.4).
    pub async fn fetch(&self) -> Result<()> {
        let auth = self.credentials.credential(false).await?;
        match self.backend.fetch(&auth).await {
            Ok(()) => {}
            Err(Error::Auth(_)) => {
                warn!("fetch rejected, refreshing credential and retrying once");
                let auth = self.credentials.credential(true).await?;
                self.backend.fetch(&auth).await?;
            }
            Err(e) => return Err(e),
        }
        self.reindex_refs().await
    }

    async fn reindex_refs(&self) -> Result<()> {
        let refs = self.backend.list_local_refs().await?;
        let mut known = self.known_refs.write().await;
        let mut deletion = self.deletion_proposed.write().await;
        known.clear();
        deletion.clear();
        for r in refs {
            if matches!(
                refs::classify(&r, &self.main_branch),
                RefClass::DeletionProposed { .. }
            ) {
                deletion.insert(r.clone());
            }
            known.insert(r);
        }
        drop(known);
        drop(deletion);
        // No subscribers is not an error; it just means nobody's watching yet.
        let _ = self.changed.send(());
        Ok(())
    }

    pub async fn known_refs(&self) -> HashSet<LocalRef> {
        self.known_refs.read().await.clone()
    }

    pub async fn is_deletion_proposed(&self, r: &LocalRef) -> bool {
        self.deletion_proposed.read().await.contains(r)
    }

    /// Every local ref currently classified as `deletionProposed`, for the
    /// registry's periodic stranding check (§4.10).
    pub async fn deletion_proposed_refs(&self) -> HashSet<LocalRef> {
        self.deletion_proposed.read().await.clone()
    }

    /// Applies the configured `MainBranchStrategy` (§4.4 `verify`).
    pub async fn verify(&self, strategy: MainBranchStrategy) -> Result<()> {
        let main_local = refs::main_branch(&self.main_branch).to_local();
        let exists = self.backend.resolve_local_ref(&main_local).await?.is_some();
        match strategy {
            MainBranchStrategy::ErrorIfMissing => {
                if exists {
                    Ok(())
                } else {
                    Err(Error::validation(format!(
                        "main branch '{}' does not exist",
                        self.main_branch
                    )))
                }
            }
            MainBranchStrategy::CreateIfMissing => {
                if exists {
                    Ok(())
                } else {
                    self.synthesize_initial_commit().await
                }
            }
            MainBranchStrategy::SkipVerification => Ok(()),
        }
    }

    async fn synthesize_initial_commit(&self) -> Result<()> {
        let blob = self.backend.write_blob(README_CONTENTS).await?;
        let entries = vec![TreeEntry {
            name: "README.md".to_string(),
            mode: 0o100644,
            kind: ObjectKind::Blob,
            id: blob,
        }];
        let tree = self.backend.write_tree(&entries).await?;
        let new_commit = NewCommit {
            tree,
            parents: vec![],
            message: "porch: initialize repository".to_string(),
            author_name: PROCESS_IDENTITY_NAME.to_string(),
            author_email: PROCESS_IDENTITY_EMAIL.to_string(),
        };
        let commit_id = self.backend.write_commit(&new_commit).await?;
        let remote = refs::main_branch(&self.main_branch);
        self.backend.set_local_ref(&remote.to_local(), &commit_id).await?;

        let request = PushRequest {
            updates: vec![RefUpdate {
                target: remote.clone(),
                new_value: Some(commit_id),
            }],
            preconditions: vec![RefPrecondition {
                target: remote,
                expected: None,
            }],
        };
        self.push(request).await
    }

    /// Pushes `request`, retrying once with a force-refreshed credential on
    /// an authentication failure, and reindexes local refs on success.
    pub async fn push(&self, request: PushRequest) -> Result<()> {
        let auth = self.credentials.credential(false).await?;
        self.push_with_auth(&request, &auth).await
    }

    async fn push_with_auth(&self, request: &PushRequest, auth: &GitAuth) -> Result<()> {
        match self.backend.push(request, auth).await {
            Ok(()) => self.reindex_refs().await,
            Err(Error::Auth(_)) => {
                warn!("push rejected, refreshing credential and retrying once");
                let auth = self.credentials.credential(true).await?;
                self.backend.push(request, &auth).await?;
                self.reindex_refs().await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn resolve_commit(&self, r: &LocalRef) -> Result<Option<CommitInfo>> {
        match self.backend.resolve_local_ref(r).await? {
            Some(id) => Ok(Some(self.backend.read_commit(&id).await?)),
            None => Ok(None),
        }
    }

    /// Walks history from `from`, returning commits whose extracted
    /// annotations satisfy `predicate` (§4.4 read-side helper).
    pub async fn history_where<F>(&self, from: &ObjectId, mut predicate: F) -> Result<Vec<CommitInfo>>
    where
        F: FnMut(&[annotation::Annotation]) -> bool,
    {
        let ids = self.backend.log(from).await?;
        let mut out = Vec::new();
        for id in ids {
            let commit = self.backend.read_commit(&id).await?;
            let annotations = annotation::extract_all(&commit.message);
            if predicate(&annotations) {
                out.push(commit);
            }
        }
        Ok(out)
    }

    /// The most recent commit reachable from `from` whose annotations
    /// reference `package_path`.
    pub async fn find_latest_for_package(
        &self,
        from: &ObjectId,
        package_path: &str,
    ) -> Result<Option<CommitInfo>> {
        let matches = self
            .history_where(from, |annotations| {
                annotations.iter().any(|a| a.package_path == package_path)
            })
            .await?;
        Ok(matches.into_iter().next())
    }

    /// Reads every blob under `tree_id`/`prefix` as UTF-8 text, keyed by its
    /// Resolves `path` (slash-separated, relative to `tree_id`) to the
    /// object it names, or `None` if any component is missing or is a blob
    /// where a directory was expected. Shared by discovery's package-path
    /// lookup and the Draft Engine's replay logic.
    pub async fn walk_into_tree(&self, tree_id: &ObjectId, path: &str) -> Result<Option<ObjectId>> {
        let mut current = tree_id.clone();
        for part in path.split('/').filter(|s| !s.is_empty()) {
            let entries = self.backend.read_tree(&current).await?;
            match entries.into_iter().find(|e| e.name == part) {
                Some(e) if e.kind == ObjectKind::Tree => current = e.id,
                _ => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// path relative to `prefix`.
    pub async fn read_subtree_as_text(
        &self,
        tree_id: &ObjectId,
        prefix: &str,
    ) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        let mut stack = vec![(tree_id.clone(), prefix.trim_matches('/').to_string())];
        while let Some((id, path)) = stack.pop() {
            let entries = self.backend.read_tree(&id).await?;
            for e in entries {
                let full = if path.is_empty() {
                    e.name.clone()
                } else {
                    format!("{path}/{}", e.name)
                };
                match e.kind {
                    ObjectKind::Blob => {
                        let bytes = self.backend.read_blob(&e.id).await?;
                        out.insert(full, String::from_utf8_lossy(&bytes).into_owned());
                    }
                    ObjectKind::Tree => stack.push((e.id, full)),
                    ObjectKind::Commit => {}
                }
            }
        }
        Ok(out)
    }
}
