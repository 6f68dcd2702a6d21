/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-core/src/backend.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! The git backend contract (spec §6) and the `Backend` trait the core is
//! generic over (design note, §9: "keep the core generic over a thing that
//! can list refs and push commit-graphs"). `porch-git` provides the only
//! implementation today (`Git2Backend`); an OCI-backed implementation is
//! mentioned in the source material but is a peripheral, not specified
//! here.
//!
//! Grounded on `issue_tracker/src/issue_service.rs`'s `IssueTrackerService`
//! trait: one trait describing the operation, one concrete implementation,
//! `async_trait` throughout.

use crate::error::Result;
use crate::refs::{LocalRef, RemoteRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A content hash, opaque to everything above `porch-git`. Kept as a string
/// rather than `git2::Oid` so nothing outside `porch-git` takes a direct
/// dependency on `git2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub String);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    /// Standard git file mode (0o100644, 0o100755, 0o040000 for trees, ...).
    pub mode: u32,
    pub kind: ObjectKind,
    pub id: ObjectId,
}

#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_time: DateTime<Utc>,
}

/// A commit not yet written; passed to `Backend::write_commit`.
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
}

/// Resolved transport credentials, as handed out by the credential broker
/// (`porch-auth`). Defined here rather than in `porch-auth` so `Backend`
/// implementations don't need to depend on the broker crate, only on the
/// shape of its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitAuth {
    Anonymous,
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// One ref update to apply in a push (spec §4.7 "Push"/"Delete").
/// `new_value: None` means delete the ref both locally and remotely.
#[derive(Debug, Clone)]
pub struct RefUpdate {
    pub target: RemoteRef,
    pub new_value: Option<ObjectId>,
}

/// One precondition a push must satisfy to proceed (spec §4.7 "Require").
/// `expected: None` means the ref must not currently exist on the remote.
#[derive(Debug, Clone)]
pub struct RefPrecondition {
    pub target: RemoteRef,
    pub expected: Option<ObjectId>,
}

#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    pub updates: Vec<RefUpdate>,
    pub preconditions: Vec<RefPrecondition>,
}

/// The git backend contract consumed by the core (spec §6). No working tree
/// is required; implementations are expected to operate on a bare clone.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `git fetch origin --prune`, translating remote branches into
    /// `refs/remotes/origin/*` and tags into `refs/tags/*` (§4.4).
    async fn fetch(&self, auth: &GitAuth) -> Result<()>;

    /// Applies `request` as a single push: either every ref update in it
    /// lands, or none do (§4.7, §8 property 6).
    async fn push(&self, request: &PushRequest, auth: &GitAuth) -> Result<()>;

    /// Resolves a local ref to the object it points at, or `None` if it
    /// does not exist.
    async fn resolve_local_ref(&self, r: &LocalRef) -> Result<Option<ObjectId>>;

    /// Every local ref currently known to the mirror.
    async fn list_local_refs(&self) -> Result<Vec<LocalRef>>;

    async fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>>;
    async fn read_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>>;
    async fn read_commit(&self, id: &ObjectId) -> Result<CommitInfo>;

    /// Commit history reachable from `from`, newest first (a seeded log
    /// iterator per §6).
    async fn log(&self, from: &ObjectId) -> Result<Vec<ObjectId>>;

    async fn write_blob(&self, data: &[u8]) -> Result<ObjectId>;
    async fn write_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId>;
    async fn write_commit(&self, commit: &NewCommit) -> Result<ObjectId>;

    /// Creates or updates a *local* ref directly, bypassing the remote.
    /// Used to reconcile local state after a push (§4.7) and to point
    /// fresh draft branches at their starting commit.
    async fn set_local_ref(&self, r: &LocalRef, id: &ObjectId) -> Result<()>;

    async fn delete_local_ref(&self, r: &LocalRef) -> Result<()>;
}
