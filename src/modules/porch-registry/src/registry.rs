/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-registry/src/registry.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Repository Registry (component J, spec §4.10): opens a mirror for each
//! registered repository and keeps it refreshed on a per-repository
//! interval. Grounded on `multi_cluster_orchestrator/src/cluster_manager.rs`'s
//! `ClusterManager` — a map of named, already-initialized handles built
//! from config — generalized from a map of Kubernetes clients to a map of
//! `RepositoryMirror`s, plus a background refresh task per entry that
//! `cluster_manager.rs` has no equivalent of.

use porch_core::auth::CredentialProvider;
use porch_core::backend::Backend;
use porch_core::error::{Error, Result};
use porch_core::model::{Repository, RepositoryId};
use porch_core::refs::{self, RefClass};
use porch_git::{cache_dir_for, Git2Backend, RepositoryMirror};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::warn;

/// Floor applied to a misconfigured (zero) `repo_sync_frequency_secs` so the
/// refresh loop never spins on a zero-duration `tokio::time::interval`
/// (which panics).
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

struct Entry {
    repository: Repository,
    mirror: Arc<RepositoryMirror>,
    cache_dir: PathBuf,
    refresh_task: JoinHandle<()>,
}

/// Opens, verifies, and indexes registered repositories (§4.10). `cache_root`
/// is the directory under which every repository's bare clone is cached,
/// named by `porch_git::cache_dir_for`.
pub struct RepositoryRegistry {
    cache_root: PathBuf,
    entries: RwLock<HashMap<RepositoryId, Entry>>,
}

impl RepositoryRegistry {
    pub fn new(cache_root: PathBuf) -> Self {
        RepositoryRegistry {
            cache_root,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn list(&self) -> Vec<Repository> {
        self.entries
            .read()
            .await
            .values()
            .map(|e| e.repository.clone())
            .collect()
    }

    pub async fn get(&self, id: &RepositoryId) -> Option<Arc<RepositoryMirror>> {
        self.entries.read().await.get(id).map(|e| e.mirror.clone())
    }

    /// The registered config for `id`, e.g. so a caller can read its
    /// directory scope without also wanting its mirror.
    pub async fn repository(&self, id: &RepositoryId) -> Option<Repository> {
        self.entries.read().await.get(id).map(|e| e.repository.clone())
    }

    /// Registers `repository`: creates its cache directory, opens or
    /// initializes the bare clone, wires the remote, performs the first
    /// fetch and verification, and starts the periodic refresh task.
    pub async fn create(
        &self,
        repository: Repository,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Arc<RepositoryMirror>> {
        let id = repository.id();
        {
            let entries = self.entries.read().await;
            if entries.contains_key(&id) {
                return Err(Error::conflict(format!("repository '{id}' is already registered")));
            }
        }

        let cache_dir = cache_dir_for(&self.cache_root, &repository.remote_url);
        let backend = open_backend(cache_dir.clone(), repository.remote_url.clone()).await?;

        let main_branch = if repository.branch.is_empty() {
            "main".to_string()
        } else {
            repository.branch.clone()
        };
        let mirror = Arc::new(RepositoryMirror::new(
            Arc::new(backend),
            credentials,
            main_branch,
        ));

        mirror.fetch().await?;
        mirror.verify(repository.main_branch_strategy).await?;

        let refresh_task = spawn_refresh_task(
            id.clone(),
            mirror.clone(),
            Duration::from_secs(repository.repo_sync_frequency_secs).max(MIN_REFRESH_INTERVAL),
        );

        let mut entries = self.entries.write().await;
        entries.insert(
            id,
            Entry {
                repository,
                mirror: mirror.clone(),
                cache_dir,
                refresh_task,
            },
        );
        Ok(mirror)
    }

    /// Deregisters `id`: cancels its refresh task and removes its cache
    /// directory (§4.10).
    pub async fn delete(&self, id: &RepositoryId) -> Result<()> {
        let entry = {
            let mut entries = self.entries.write().await;
            entries.remove(id)
        };
        let Some(entry) = entry else {
            return Err(Error::not_found(format!("repository '{id}' is not registered")));
        };
        entry.refresh_task.abort();
        let cache_dir = entry.cache_dir;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = std::fs::remove_dir_all(&cache_dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %cache_dir.display(), error = %e, "failed to remove cache directory");
                }
            }
        })
        .await
        .map_err(|e| Error::transport(format!("registry cleanup task panicked: {e}")))?;
        Ok(())
    }
}

async fn open_backend(cache_dir: PathBuf, remote_url: String) -> Result<Git2Backend> {
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&cache_dir)
            .map_err(|e| Error::transport(format!("failed to create cache directory: {e}")))?;
        Git2Backend::open_or_init(&cache_dir, &remote_url)
    })
    .await
    .map_err(|e| Error::transport(format!("registry open task panicked: {e}")))?
}

fn spawn_refresh_task(
    id: RepositoryId,
    mirror: Arc<RepositoryMirror>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately; the initial fetch already happened.
        loop {
            ticker.tick().await;
            match mirror.fetch().await {
                Ok(()) => warn_on_stranded_deletion_proposals(&id, &mirror).await,
                Err(e) => warn!(repository = %id, error = %e, "periodic refresh failed"),
            }
        }
    })
}

/// Reports (at `warn!`, not an error) any `deletionProposed` branch whose
/// corresponding package tag no longer exists — the tag is what
/// `Published -> Deleted`/cancellation consult, so a branch stranded without
/// one likely means a prior deletion finished without cleaning up after
/// itself (§4.10).
async fn warn_on_stranded_deletion_proposals(id: &RepositoryId, mirror: &RepositoryMirror) {
    let main_branch = mirror.main_branch().to_string();
    for r in mirror.deletion_proposed_refs().await {
        let RefClass::DeletionProposed { package_path, revision } = refs::classify(&r, &main_branch)
        else {
            continue;
        };
        let tag_local = refs::package_tag(&package_path, &revision).to_local();
        match mirror.backend().resolve_local_ref(&tag_local).await {
            Ok(None) => warn!(
                repository = %id,
                package = %package_path,
                revision = %revision,
                "deletionProposed branch has no corresponding package tag"
            ),
            Ok(Some(_)) => {}
            Err(e) => warn!(
                repository = %id,
                package = %package_path,
                revision = %revision,
                error = %e,
                "failed to check package tag for deletionProposed branch"
            ),
        }
    }
}
