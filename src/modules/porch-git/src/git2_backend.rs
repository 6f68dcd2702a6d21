/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-git/src/git2_backend.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! The `git2`-backed `Backend` implementation.
//!
//! `git2::Repository` is a blocking, `!Sync` handle, exactly like the
//! `git2::Repository` the teacher holds in `sync_engine/src/sync.rs`'s
//! `SyncEngine`. Every method here follows `git_sync/src/git_ops.rs`'s
//! `create_reconciliation_pr`: wrap the blocking call in
//! `tokio::task::spawn_blocking`, await the join handle, and flatten the
//! double `Result`.

use async_trait::async_trait;
use git2::{ErrorClass, FetchOptions, ObjectType, Oid, RemoteCallbacks, Repository, Signature};
use porch_core::backend::{
    Backend, CommitInfo, GitAuth, NewCommit, ObjectId, ObjectKind, PushRequest, RefPrecondition,
    RefUpdate, TreeEntry,
};
use porch_core::error::{Error, Result};
use porch_core::refs::LocalRef;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// The identity this process commits as when no authenticated user is
/// available (spec §4.2 "committer = process identity").
pub const PROCESS_IDENTITY_NAME: &str = "porch";
pub const PROCESS_IDENTITY_EMAIL: &str = "porch@localhost";

pub struct Git2Backend {
    repo: Arc<Mutex<Repository>>,
}

impl Git2Backend {
    /// Opens the bare clone at `path`, initializing it (and wiring
    /// `origin`) if it doesn't exist yet.
    pub fn open_or_init(path: &Path, remote_url: &str) -> Result<Self> {
        let repo = match Repository::open_bare(path) {
            Ok(r) => r,
            Err(_) => Repository::init_bare(path).map_err(map_git_err)?,
        };
        if repo.find_remote("origin").is_err() {
            repo.remote("origin", remote_url).map_err(map_git_err)?;
        }
        Ok(Git2Backend {
            repo: Arc::new(Mutex::new(repo)),
        })
    }

    fn repo_handle(&self) -> Arc<Mutex<Repository>> {
        self.repo.clone()
    }

    async fn list_remote_refs(&self, auth: &GitAuth) -> Result<Vec<(String, Oid)>> {
        let repo = self.repo_handle();
        let auth = auth.clone();
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let mut remote = repo.find_remote("origin").map_err(map_git_err)?;
            let callbacks = credential_callbacks(&auth);
            let conn = remote
                .connect_auth(git2::Direction::Fetch, Some(callbacks), None)
                .map_err(map_git_err)?;
            let heads = conn
                .list()
                .map_err(map_git_err)?
                .iter()
                .map(|h| (h.name().to_string(), h.oid()))
                .collect();
            Ok(heads)
        })
        .await
    }
}

/// Runs `f` on the blocking thread pool, flattening the join error into
/// `Error::transport` — a blocking task only panics if `git2` itself
/// panics, which we treat as a transport-layer failure rather than a bug
/// in the caller.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::transport(format!("git worker task panicked: {e}")))?
}

fn parse_oid(id: &ObjectId) -> Result<Oid> {
    Oid::from_str(&id.0).map_err(|e| Error::corruption(format!("invalid object id {}: {e}", id.0)))
}

fn map_git_err(e: git2::Error) -> Error {
    if e.code() == git2::ErrorCode::NotFound {
        return Error::not_found(e.message().to_string());
    }
    let msg = e.message().to_lowercase();
    if msg.contains("auth") || msg.contains("credential") {
        Error::auth(e.message().to_string())
    } else if matches!(
        e.class(),
        ErrorClass::Net | ErrorClass::Ssh | ErrorClass::Http
    ) || msg.contains("network")
    {
        Error::transport(e.message().to_string())
    } else {
        Error::corruption(e.message().to_string())
    }
}

/// Per spec §4.4: "Ignores 'already up to date'; recognizes
/// empty-repository errors as non-fatal."
fn is_benign_fetch_error(e: &git2::Error) -> bool {
    let msg = e.message().to_lowercase();
    msg.contains("up to date")
        || msg.contains("up-to-date")
        || msg.contains("empty")
        || msg.contains("could not find repository")
        || msg.contains("remote repository is empty")
}

fn credential_callbacks(auth: &GitAuth) -> RemoteCallbacks<'static> {
    let auth = auth.clone();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, _allowed| match &auth {
        GitAuth::Anonymous => git2::Cred::default(),
        GitAuth::Basic { username, password } => {
            git2::Cred::userpass_plaintext(username, password)
        }
        // Workload-identity tokens are presented as the password half of
        // basic auth, the same convention `git_sync/src/git_ops.rs` uses
        // for its GitHub PAT (`Cred::userpass_plaintext(token, "")`).
        GitAuth::Bearer { token } => {
            git2::Cred::userpass_plaintext(username_from_url.unwrap_or("x-access-token"), token)
        }
    });
    callbacks
}

fn to_git_tree_entry(entry: &TreeEntry) -> Result<(Oid, u32)> {
    Ok((parse_oid(&entry.id)?, entry.mode))
}

#[async_trait]
impl Backend for Git2Backend {
    async fn fetch(&self, auth: &GitAuth) -> Result<()> {
        let repo = self.repo_handle();
        let auth = auth.clone();
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let mut remote = repo.find_remote("origin").map_err(map_git_err)?;
            let mut fo = FetchOptions::new();
            fo.prune(git2::FetchPrune::On);
            fo.remote_callbacks(credential_callbacks(&auth));
            let refspecs = [
                "+refs/heads/*:refs/remotes/origin/*",
                "+refs/tags/*:refs/tags/*",
            ];
            match remote.fetch(&refspecs, Some(&mut fo), None) {
                Ok(()) => Ok(()),
                Err(e) if is_benign_fetch_error(&e) => {
                    debug!(error = %e, "fetch no-op");
                    Ok(())
                }
                Err(e) => Err(map_git_err(e)),
            }
        })
        .await
    }

    async fn push(&self, request: &PushRequest, auth: &GitAuth) -> Result<()> {
        // Preconditions are enforced at the application level (spec §4.7):
        // we read the live remote ref set and compare before pushing, then
        // push with `force` for every ref the push itself is allowed to
        // move. This mirrors the spec's split between the `RequireRemoteRefs`
        // precondition list and the forced push specs.
        let remote_refs = self.list_remote_refs(auth).await?;
        for RefPrecondition { target, expected } in &request.preconditions {
            let current = remote_refs
                .iter()
                .find(|(name, _)| name == target.as_str())
                .map(|(_, oid)| ObjectId(oid.to_string()));
            if &current != expected {
                return Err(Error::conflict(format!(
                    "ref {target} changed concurrently (expected {expected:?}, found {current:?})"
                )));
            }
        }

        let repo = self.repo_handle();
        let auth_clone = auth.clone();
        let updates = request.updates.clone();
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let mut remote = repo.find_remote("origin").map_err(map_git_err)?;
            let mut specs = Vec::new();
            for RefUpdate { target, new_value } in &updates {
                // The refspec source must be an OID or an existing local ref
                // already pointing at the desired value — never the local
                // tracking ref's *name*, which may not exist yet (a brand
                // new draft/proposed branch or package tag) or may still
                // point at the stale value (an advancing main). The object
                // the caller wants pushed is always already in this repo
                // (it was written here before the push was requested), so
                // pushing it by raw OID works unconditionally.
                let spec = match new_value {
                    Some(id) => format!("+{id}:{target}"),
                    None => format!(":{target}"),
                };
                specs.push(spec);
            }
            let mut push_options = git2::PushOptions::new();
            push_options.remote_callbacks(credential_callbacks(&auth_clone));
            remote
                .push(&specs, Some(&mut push_options))
                .map_err(map_git_err)
        })
        .await
    }

    async fn resolve_local_ref(&self, r: &LocalRef) -> Result<Option<ObjectId>> {
        let repo = self.repo_handle();
        let name = r.as_str().to_string();
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            match repo.find_reference(&name) {
                Ok(reference) => {
                    let oid = match reference.peel_to_commit() {
                        Ok(c) => c.id(),
                        Err(_) => reference
                            .target()
                            .ok_or_else(|| Error::corruption(format!("ref {name} is symbolic")))?,
                    };
                    Ok(Some(ObjectId(oid.to_string())))
                }
                Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
                Err(e) => Err(map_git_err(e)),
            }
        })
        .await
    }

    async fn list_local_refs(&self) -> Result<Vec<LocalRef>> {
        let repo = self.repo_handle();
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let mut out = Vec::new();
            for glob in ["refs/remotes/origin/*", "refs/tags/*"] {
                let iter = repo.references_glob(glob).map_err(map_git_err)?;
                for r in iter {
                    let r = r.map_err(map_git_err)?;
                    if let Some(name) = r.name() {
                        out.push(LocalRef::new(name.to_string()));
                    }
                }
            }
            Ok(out)
        })
        .await
    }

    async fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let repo = self.repo_handle();
        let oid = parse_oid(id)?;
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let blob = repo.find_blob(oid).map_err(map_git_err)?;
            Ok(blob.content().to_vec())
        })
        .await
    }

    async fn read_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>> {
        let repo = self.repo_handle();
        let oid = parse_oid(id)?;
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let tree = repo.find_tree(oid).map_err(map_git_err)?;
            let mut out = Vec::with_capacity(tree.len());
            for entry in tree.iter() {
                let kind = match entry.kind() {
                    Some(ObjectType::Blob) => ObjectKind::Blob,
                    Some(ObjectType::Tree) => ObjectKind::Tree,
                    other => {
                        return Err(Error::corruption(format!(
                            "unsupported tree entry kind {other:?}"
                        )))
                    }
                };
                out.push(TreeEntry {
                    name: entry.name().unwrap_or_default().to_string(),
                    mode: entry.filemode() as u32,
                    kind,
                    id: ObjectId(entry.id().to_string()),
                });
            }
            Ok(out)
        })
        .await
    }

    async fn read_commit(&self, id: &ObjectId) -> Result<CommitInfo> {
        let repo = self.repo_handle();
        let oid = parse_oid(id)?;
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let commit = repo.find_commit(oid).map_err(map_git_err)?;
            let time = commit.time();
            let committer_time = chrono::DateTime::from_timestamp(time.seconds(), 0)
                .unwrap_or_default();
            Ok(CommitInfo {
                id: ObjectId(commit.id().to_string()),
                tree: ObjectId(commit.tree_id().to_string()),
                parents: commit.parent_ids().map(|p| ObjectId(p.to_string())).collect(),
                message: commit.message().unwrap_or_default().to_string(),
                author_name: commit.author().name().unwrap_or_default().to_string(),
                author_email: commit.author().email().unwrap_or_default().to_string(),
                committer_time,
            })
        })
        .await
    }

    async fn log(&self, from: &ObjectId) -> Result<Vec<ObjectId>> {
        let repo = self.repo_handle();
        let oid = parse_oid(from)?;
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let mut walk = repo.revwalk().map_err(map_git_err)?;
            walk.push(oid).map_err(map_git_err)?;
            walk.set_sorting(git2::Sort::TIME).map_err(map_git_err)?;
            let mut out = Vec::new();
            for oid in walk {
                out.push(ObjectId(oid.map_err(map_git_err)?.to_string()));
            }
            Ok(out)
        })
        .await
    }

    async fn write_blob(&self, data: &[u8]) -> Result<ObjectId> {
        let repo = self.repo_handle();
        let data = data.to_vec();
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let oid = repo.blob(&data).map_err(map_git_err)?;
            Ok(ObjectId(oid.to_string()))
        })
        .await
    }

    async fn write_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId> {
        let repo = self.repo_handle();
        let entries = entries.to_vec();
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let mut builder = repo.treebuilder(None).map_err(map_git_err)?;
            for entry in &entries {
                let (oid, mode) = to_git_tree_entry(entry)?;
                builder
                    .insert(&entry.name, oid, mode as i32)
                    .map_err(map_git_err)?;
            }
            let oid = builder.write().map_err(map_git_err)?;
            Ok(ObjectId(oid.to_string()))
        })
        .await
    }

    async fn write_commit(&self, commit: &NewCommit) -> Result<ObjectId> {
        let repo = self.repo_handle();
        let commit = commit.clone();
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            let tree_oid = parse_oid(&commit.tree)?;
            let tree = repo.find_tree(tree_oid).map_err(map_git_err)?;
            let author = Signature::now(&commit.author_name, &commit.author_email)
                .map_err(map_git_err)?;
            let committer = Signature::now(PROCESS_IDENTITY_NAME, PROCESS_IDENTITY_EMAIL)
                .map_err(map_git_err)?;
            let parent_commits = commit
                .parents
                .iter()
                .map(|p| parse_oid(p).and_then(|oid| repo.find_commit(oid).map_err(map_git_err)))
                .collect::<Result<Vec<_>>>()?;
            let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();
            let oid = repo
                .commit(None, &author, &committer, &commit.message, &tree, &parent_refs)
                .map_err(map_git_err)?;
            Ok(ObjectId(oid.to_string()))
        })
        .await
    }

    async fn set_local_ref(&self, r: &LocalRef, id: &ObjectId) -> Result<()> {
        let repo = self.repo_handle();
        let name = r.as_str().to_string();
        let oid = parse_oid(id)?;
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            repo.reference(&name, oid, true, "porch: update ref")
                .map_err(map_git_err)?;
            Ok(())
        })
        .await
    }

    async fn delete_local_ref(&self, r: &LocalRef) -> Result<()> {
        let repo = self.repo_handle();
        let name = r.as_str().to_string();
        run_blocking(move || {
            let repo = repo.lock().expect("repo mutex poisoned");
            match repo.find_reference(&name) {
                Ok(mut reference) => reference.delete().map_err(map_git_err),
                Err(e) if e.code() == git2::ErrorCode::NotFound => {
                    warn!(%name, "ref already absent locally");
                    Ok(())
                }
                Err(e) => Err(map_git_err(e)),
            }
        })
        .await
    }
}
