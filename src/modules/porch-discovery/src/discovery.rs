/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-discovery/src/discovery.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Package Discovery (component E, spec §4.5): given a refreshed mirror,
//! produce the set of package revisions currently visible in it.
//!
//! The ordering of emitted revisions is not guaranteed (spec §4.5) —
//! callers sort if they need determinism.

use porch_core::annotation;
use porch_core::backend::{Backend, ObjectId, ObjectKind};
use porch_core::error::Result;
use porch_core::model::{
    Lifecycle, PackageRevision, PackageRevisionId, Repository, RevisionKind,
};
use porch_core::refs::{self, LocalRef, RefClass};
use porch_core::scope::normalize_scope;
use porch_git::RepositoryMirror;
use std::sync::Arc;
use tracing::warn;

/// Walks `repo`'s package-path scope and returns every draft, proposed,
/// and published revision currently reachable in `mirror`'s local refs.
pub async fn discover(mirror: &RepositoryMirror, repo: &Repository) -> Result<Vec<PackageRevision>> {
    let backend = mirror.backend();
    let main_branch = mirror.main_branch().to_string();
    let scope = repo.directory.trim_matches('/');
    let repository = repo.id();

    let mut out = Vec::new();
    for r in mirror.known_refs().await {
        match refs::classify(&r, &main_branch) {
            RefClass::Draft { package_path, workspace } => {
                if let Some(rev) = discover_branch(
                    &backend,
                    mirror,
                    &repository,
                    &package_path,
                    &workspace,
                    scope,
                    &r,
                    Lifecycle::Draft,
                )
                .await?
                {
                    out.push(rev);
                }
            }
            RefClass::Proposed { package_path, workspace } => {
                if let Some(rev) = discover_branch(
                    &backend,
                    mirror,
                    &repository,
                    &package_path,
                    &workspace,
                    scope,
                    &r,
                    Lifecycle::Proposed,
                )
                .await?
                {
                    out.push(rev);
                }
            }
            RefClass::PackageTag { package_path, revision } => {
                if let Some(rev) =
                    discover_tag(&backend, mirror, &repository, &package_path, &revision, scope, &r)
                        .await?
                {
                    out.push(rev);
                }
            }
            RefClass::Main => {
                out.extend(
                    discover_main(&backend, mirror, &repository, &main_branch, scope, &r).await?,
                );
            }
            RefClass::DeletionProposed { .. } | RefClass::Other => {}
        }
    }
    Ok(out)
}

async fn has_kptfile(backend: &Arc<dyn Backend>, tree_id: &ObjectId) -> Result<bool> {
    let entries = backend.read_tree(tree_id).await?;
    Ok(entries
        .iter()
        .any(|e| e.kind == ObjectKind::Blob && e.name == "Kptfile"))
}

/// Scans history backward from `commit_id` for the most recent annotation
/// naming `package_path`, the way spec §4.5 rule 5 resolves a main-branch
/// package's workspace name. Returns an empty string if none is found
/// (e.g. a pre-existing directory porch never annotated).
async fn resolve_workspace(
    mirror: &RepositoryMirror,
    commit_id: &ObjectId,
    package_path: &str,
) -> Result<String> {
    let found = mirror.find_latest_for_package(commit_id, package_path).await?;
    Ok(found
        .and_then(|commit| {
            annotation::extract_all(&commit.message)
                .into_iter()
                .find(|a| a.package_path == package_path)
        })
        .map(|a| a.workspace_name)
        .unwrap_or_default())
}

#[allow(clippy::too_many_arguments)]
async fn discover_branch(
    backend: &Arc<dyn Backend>,
    mirror: &RepositoryMirror,
    repository: &porch_core::model::RepositoryId,
    package_path: &str,
    workspace: &str,
    scope: &str,
    r: &LocalRef,
    lifecycle: Lifecycle,
) -> Result<Option<PackageRevision>> {
    let Some(scoped_path) = normalize_scope(package_path, scope) else {
        return Ok(None);
    };
    let Some(commit_id) = backend.resolve_local_ref(r).await? else {
        return Ok(None);
    };
    let commit = backend.read_commit(&commit_id).await?;
    let Some(pkg_tree) = mirror.walk_into_tree(&commit.tree, package_path).await? else {
        warn!(%package_path, branch = %r, "branch tip has no package directory, skipping");
        return Ok(None);
    };
    if !has_kptfile(backend, &pkg_tree).await? {
        warn!(%package_path, branch = %r, "package directory has no Kptfile, skipping");
        return Ok(None);
    }
    Ok(Some(PackageRevision {
        id: PackageRevisionId {
            repository: repository.clone(),
            package_path: scoped_path,
            workspace_name: workspace.to_string(),
            revision: String::new(),
        },
        kind: RevisionKind::Tagged,
        lifecycle,
        tree_hash: pkg_tree.to_string(),
        commit_hash: commit_id.to_string(),
        tasks: Vec::new(),
        updated_at: commit.committer_time,
        updated_by: commit.author_email,
    }))
}

async fn discover_tag(
    backend: &Arc<dyn Backend>,
    mirror: &RepositoryMirror,
    repository: &porch_core::model::RepositoryId,
    package_path: &str,
    revision: &str,
    scope: &str,
    r: &LocalRef,
) -> Result<Option<PackageRevision>> {
    let Some(scoped_path) = normalize_scope(package_path, scope) else {
        return Ok(None);
    };
    let Some(commit_id) = backend.resolve_local_ref(r).await? else {
        return Ok(None);
    };
    let commit = backend.read_commit(&commit_id).await?;
    let Some(pkg_tree) = mirror.walk_into_tree(&commit.tree, package_path).await? else {
        warn!(%package_path, tag = %r, "package tag points at a commit with no matching package directory, skipping");
        return Ok(None);
    };
    let workspace_name = resolve_workspace(mirror, &commit_id, package_path).await?;
    Ok(Some(PackageRevision {
        id: PackageRevisionId {
            repository: repository.clone(),
            package_path: scoped_path,
            workspace_name,
            revision: revision.to_string(),
        },
        kind: RevisionKind::Tagged,
        lifecycle: Lifecycle::Published,
        tree_hash: pkg_tree.to_string(),
        commit_hash: commit_id.to_string(),
        tasks: Vec::new(),
        updated_at: commit.committer_time,
        updated_by: commit.author_email,
    }))
}

async fn discover_main(
    backend: &Arc<dyn Backend>,
    mirror: &RepositoryMirror,
    repository: &porch_core::model::RepositoryId,
    main_branch: &str,
    scope: &str,
    r: &LocalRef,
) -> Result<Vec<PackageRevision>> {
    let Some(commit_id) = backend.resolve_local_ref(r).await? else {
        return Ok(Vec::new());
    };
    let commit = backend.read_commit(&commit_id).await?;
    let mut out = Vec::new();
    let mut stack = vec![(commit.tree.clone(), String::new())];
    while let Some((tree_id, path)) = stack.pop() {
        let entries = backend.read_tree(&tree_id).await?;
        let has_kptfile = entries
            .iter()
            .any(|e| e.kind == ObjectKind::Blob && e.name == "Kptfile");
        if has_kptfile {
            if let Some(scoped_path) = normalize_scope(&path, scope) {
                let workspace_name = resolve_workspace(mirror, &commit_id, &path).await?;
                out.push(PackageRevision {
                    id: PackageRevisionId {
                        repository: repository.clone(),
                        package_path: scoped_path,
                        workspace_name,
                        revision: main_branch.to_string(),
                    },
                    kind: RevisionKind::LatestOnBranch,
                    lifecycle: Lifecycle::Published,
                    tree_hash: tree_id.to_string(),
                    commit_hash: commit_id.to_string(),
                    tasks: Vec::new(),
                    updated_at: commit.committer_time,
                    updated_by: commit.author_email.clone(),
                });
            }
        }
        for e in entries {
            if e.kind == ObjectKind::Tree {
                let child_path = if path.is_empty() {
                    e.name.clone()
                } else {
                    format!("{path}/{}", e.name)
                };
                stack.push((e.id, child_path));
            }
        }
    }
    Ok(out)
}
