/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-draft/src/publish.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Commit replay on publish (spec §4.6 "Commit replay on publish").
//!
//! A draft's history is never fast-forward-merged into main — main has
//! typically diverged. Instead, every commit the draft contributed to its
//! package is re-issued against main's current tip, carrying only that
//! commit's package tree forward.

use chrono::{DateTime, Utc};
use porch_core::annotation::{self, Annotation};
use porch_core::backend::{CommitInfo, ObjectId};
use porch_core::error::Result;
use porch_git::{CommitBuilder, RepositoryMirror};
use std::sync::Arc;

/// Resolves Open Question 3 (see DESIGN.md): when two replayed commits tie
/// on committer timestamp, order is broken by object id so replay order is
/// fully deterministic across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ReplayKey {
    committer_time: DateTime<Utc>,
    id: ObjectId,
}

impl From<&CommitInfo> for ReplayKey {
    fn from(c: &CommitInfo) -> Self {
        ReplayKey {
            committer_time: c.committer_time,
            id: c.id.clone(),
        }
    }
}

/// Oldest-first history of `draft_tip` whose annotations name
/// `(package_path, workspace_name)` — the chain spec §4.6 step 2 replays.
async fn annotated_chain(
    mirror: &RepositoryMirror,
    draft_tip: &ObjectId,
    package_path: &str,
    workspace_name: &str,
) -> Result<Vec<CommitInfo>> {
    let mut matches = mirror
        .history_where(draft_tip, |annotations| {
            annotation::find_for_identity(annotations, package_path, workspace_name).is_some()
        })
        .await?;
    matches.sort_by_key(ReplayKey::from);
    Ok(matches)
}

pub struct ReplayOutcome {
    pub new_main_tip: ObjectId,
}

/// Replays `draft_tip`'s annotated commits (or, if none are found, squashes
/// its whole package tree) onto `main_tip`, then appends a final "Approve"
/// commit (§4.6 steps 1-4, minus the fetch, which is the caller's job since
/// it also needs the post-fetch main tip for the push precondition).
pub async fn replay_onto_main(
    mirror: &RepositoryMirror,
    main_tip: &ObjectId,
    draft_tip: &ObjectId,
    package_path: &str,
    workspace_name: &str,
    revision: &str,
) -> Result<ReplayOutcome> {
    let backend = mirror.backend();
    let chain = annotated_chain(mirror, draft_tip, package_path, workspace_name).await?;

    let mut running_tip = main_tip.clone();
    let mut last_pkg_tree: Option<ObjectId> = None;

    if chain.is_empty() {
        let draft_commit = backend.read_commit(draft_tip).await?;
        let pkg_tree = mirror
            .walk_into_tree(&draft_commit.tree, package_path)
            .await?;
        running_tip = write_commit(
            backend.clone(),
            running_tip,
            package_path,
            pkg_tree.clone(),
            format!("Squash {package_path}@{workspace_name}"),
            &draft_commit.author_name,
            &draft_commit.author_email,
        )
        .await?;
        last_pkg_tree = pkg_tree;
    } else {
        for commit in &chain {
            let pkg_tree = mirror.walk_into_tree(&commit.tree, package_path).await?;
            running_tip = write_commit(
                backend.clone(),
                running_tip,
                package_path,
                pkg_tree.clone(),
                commit.message.clone(),
                &commit.author_name,
                &commit.author_email,
            )
            .await?;
            last_pkg_tree = pkg_tree;
        }
    }

    let approve_annotation = Annotation {
        package_path: package_path.to_string(),
        workspace_name: workspace_name.to_string(),
        revision: revision.to_string(),
        task: None,
    };
    let message = format!(
        "Approve {package_path}/{revision}\n\n{}",
        approve_annotation.encode()
    );
    let new_main_tip = write_commit(
        backend,
        running_tip,
        package_path,
        last_pkg_tree,
        message,
        "porch",
        "porch@localhost",
    )
    .await?;

    Ok(ReplayOutcome { new_main_tip })
}

async fn write_commit(
    backend: Arc<dyn porch_core::backend::Backend>,
    parent: ObjectId,
    package_path: &str,
    package_tree: Option<ObjectId>,
    message: String,
    author_name: &str,
    author_email: &str,
) -> Result<ObjectId> {
    let mut builder =
        CommitBuilder::new(backend, Some(parent), package_path, package_tree).await?;
    builder
        .commit(
            message,
            Some((author_name.to_string(), author_email.to_string())),
            Vec::new(),
        )
        .await
}
