/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-core/src/model.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Data model (spec §3): `Repository`, `PackageRevision`, `Task`, and the
//! lifecycle enum. Grounded on `crds.rs`'s split of a custom resource into a
//! user-supplied spec and a controller-owned status — here that split is
//! identity (repository, package path, workspace) vs. lifecycle-derived
//! state (tree hash, commit hash, revision string).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A registered backend repository (spec §3 "Repository").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub namespace: String,
    pub name: String,
    pub remote_url: String,
    /// Defaults to "main" when unspecified, per §6.
    pub branch: String,
    /// Path prefix under which packages live; empty means the whole repo.
    pub directory: String,
    pub secret_ref: Option<String>,
    pub main_branch_strategy: MainBranchStrategy,
    /// Whether published revisions should materialize a package-context
    /// resource on publish (§3, SPEC_FULL.md §F.5). The core only surfaces
    /// the flag and fires the publish hook; materializing the resource is
    /// the aggregated API server's job.
    pub deployment: bool,
    pub repo_sync_frequency_secs: u64,
}

impl Repository {
    pub fn id(&self) -> RepositoryId {
        RepositoryId {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepositoryId {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MainBranchStrategy {
    ErrorIfMissing,
    CreateIfMissing,
    #[default]
    SkipVerification,
}

/// One of the states in the draft lifecycle state machine (spec §4.6).
/// `Deleted` is terminal and has no on-disk representation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Draft,
    Proposed,
    Published,
    DeletionProposed,
    Deleted,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Draft => "Draft",
            Lifecycle::Proposed => "Proposed",
            Lifecycle::Published => "Published",
            Lifecycle::DeletionProposed => "DeletionProposed",
            Lifecycle::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// Resolves the first Open Question in §9 (see DESIGN.md): the main branch
/// is exposed as a distinct kind rather than conflated with tag-backed
/// Published revisions, even though both report `Lifecycle::Published`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RevisionKind {
    /// Backed by a package-scoped tag plus a commit on main (§3).
    Tagged,
    /// A directory containing a `Kptfile` found directly on the main
    /// branch's tree, with no per-package tag (§4.5 rule 5, Scenario 4).
    LatestOnBranch,
}

/// Identity of a package revision: (repository, package path, workspace).
/// The `revision` string is only assigned once a draft is published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PackageRevisionId {
    pub repository: RepositoryId,
    /// Scope-relative package path (§4.5 rule 6).
    pub package_path: String,
    pub workspace_name: String,
    /// Empty for drafts and proposed revisions.
    pub revision: String,
}

impl fmt::Display for PackageRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            self.repository, self.package_path, self.workspace_name
        )
    }
}

/// The central entity of spec §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageRevision {
    pub id: PackageRevisionId,
    pub kind: RevisionKind,
    pub lifecycle: Lifecycle,
    pub tree_hash: String,
    pub commit_hash: String,
    pub tasks: Vec<Task>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub updated_by: String,
}

/// An immutable, append-only record of a semantic operation (spec §3
/// "Task"). Reconstructed from commit annotations on read (component C).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    /// Free-form task-specific payload (e.g. the upstream repo/ref for a
    /// clone task, or the function name for an eval task).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Init,
    CloneFromUpstream,
    Edit,
    EvalFunction,
}

/// The full set of `(path -> text)` pairs in a package tree (spec §3
/// "PackageRevisionResources"). Always recomputed; never cached across API
/// calls.
pub type Resources = std::collections::BTreeMap<String, String>;

/// Filter recognized by `ListPackageRevisions` and `Watch` (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub package_path_prefix: Option<String>,
    pub workspace_name: Option<String>,
    pub revision: Option<String>,
    pub lifecycle: Option<Lifecycle>,
}

impl Filter {
    pub fn matches(&self, rev: &PackageRevision) -> bool {
        if let Some(prefix) = &self.package_path_prefix {
            if !rev.id.package_path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(ws) = &self.workspace_name {
            if &rev.id.workspace_name != ws {
                return false;
            }
        }
        if let Some(r) = &self.revision {
            if &rev.id.revision != r {
                return false;
            }
        }
        if let Some(lc) = &self.lifecycle {
            if &rev.lifecycle != lc {
                return false;
            }
        }
        true
    }
}
