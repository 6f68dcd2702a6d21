/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-draft/src/lifecycle.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Draft Engine (component F, spec §4.6): creates, edits, and closes
//! package-revision drafts, and drives the lifecycle state machine's
//! ref-topology transitions. Grounded on the finalizer-driven reconciler in
//! `k8s/operators/phgit_operator/src/controllers/preview_controller.rs` —
//! every transition here is, like that controller's reconcile loop, a pure
//! function from (current state, desired state) to a batch of idempotent
//! side effects.

use crate::deployment::{DeploymentHook, NoopDeploymentHook};
use crate::publish;
use crate::push::PushBuilder;
use porch_core::annotation::Annotation;
use porch_core::backend::ObjectId;
use porch_core::error::{Error, Result};
use porch_core::model::{Lifecycle, PackageRevisionId, Repository, Task};
use porch_core::refs;
use porch_git::{CommitBuilder, RepositoryMirror};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct DraftEngine {
    mirror: Arc<RepositoryMirror>,
    deployment_hook: Arc<dyn DeploymentHook>,
}

impl DraftEngine {
    pub fn new(mirror: Arc<RepositoryMirror>) -> Self {
        DraftEngine {
            mirror,
            deployment_hook: Arc::new(NoopDeploymentHook),
        }
    }

    /// Registers the hook called on publish for `deployment`-flagged
    /// repositories (§F.5). Unset by default, in which case publish is a
    /// no-op for that flag beyond carrying it on `Repository`.
    pub fn with_deployment_hook(mut self, hook: Arc<dyn DeploymentHook>) -> Self {
        self.deployment_hook = hook;
        self
    }

    /// `CreatePackageRevision` (§6): creates the draft branch at the current
    /// main tip and, if initial resources are supplied, stages them as a
    /// local (unpushed) commit carrying `initial_task`'s annotation. Actually
    /// performing a task's side effect (fetching an upstream repo, running a
    /// function) is the caller's job — the engine only records what the
    /// caller already computed.
    pub async fn create_draft(
        &self,
        repo: &Repository,
        package_path: &str,
        workspace_name: &str,
        initial_task: Option<Task>,
        initial_resources: Option<BTreeMap<String, String>>,
    ) -> Result<PackageRevisionId> {
        validate_workspace_name(workspace_name)?;
        let relative = porch_core::scope::normalize_scope(package_path, &repo.directory)
            .ok_or_else(|| {
                Error::validation(format!(
                    "package path '{package_path}' is outside repository scope '{}'",
                    repo.directory
                ))
            })?;

        let backend = self.mirror.backend();
        let main_local = refs::main_branch(self.mirror.main_branch()).to_local();
        let tip = backend
            .resolve_local_ref(&main_local)
            .await?
            .ok_or_else(|| Error::not_found("main branch has no commits"))?;

        let draft_remote = refs::draft_branch(package_path, workspace_name);
        PushBuilder::new()
            .push(draft_remote.clone(), tip)
            .require(draft_remote, None)
            .apply(&self.mirror)
            .await?;

        let id = PackageRevisionId {
            repository: repo.id(),
            package_path: relative,
            workspace_name: workspace_name.to_string(),
            revision: String::new(),
        };

        if let Some(resources) = initial_resources {
            self.stage_resources(package_path, &id, &resources, initial_task, "Init")
                .await?;
        }

        Ok(id)
    }

    /// `UpdatePackageRevision` (§6): the per-edit operation. Replaces the
    /// package tree wholesale with `resources` (the caller supplies the full
    /// desired content, not a diff) and advances the draft's local commit
    /// pointer without pushing — the draft branch ref is only pushed at
    /// `close_draft`.
    pub async fn update_resources(
        &self,
        repo: &Repository,
        id: &PackageRevisionId,
        resources: &BTreeMap<String, String>,
        task: Option<Task>,
    ) -> Result<()> {
        let absolute = join_scope(&repo.directory, &id.package_path);
        self.stage_resources(&absolute, id, resources, task, "Edit")
            .await
    }

    async fn stage_resources(
        &self,
        absolute: &str,
        id: &PackageRevisionId,
        resources: &BTreeMap<String, String>,
        task: Option<Task>,
        message_verb: &str,
    ) -> Result<()> {
        if !resources.contains_key("Kptfile") {
            return Err(Error::validation(
                "package must contain a Kptfile at its root",
            ));
        }

        let backend = self.mirror.backend();
        let draft_local = refs::draft_branch(absolute, &id.workspace_name).to_local();
        let parent = backend.resolve_local_ref(&draft_local).await?.ok_or_else(|| {
            Error::not_found(format!("draft '{draft_local}' has no local commit"))
        })?;

        let mut builder = CommitBuilder::new(backend.clone(), Some(parent), absolute, None).await?;
        for (path, content) in resources {
            let full = format!("{absolute}/{path}");
            builder.store_file(&full, content.as_bytes()).await?;
        }

        let annotation = Annotation {
            package_path: id.package_path.clone(),
            workspace_name: id.workspace_name.clone(),
            revision: String::new(),
            task,
        };
        let message = format!(
            "{message_verb} {}\n\n{}",
            id.package_path,
            annotation.encode()
        );
        let new_commit = builder.commit(message, None, Vec::new()).await?;
        backend.set_local_ref(&draft_local, &new_commit).await?;
        Ok(())
    }

    /// `CloseDraft` (§6): pushes the local commit chain accumulated by
    /// `update_resources` since the draft branch was last pushed.
    pub async fn close_draft(
        &self,
        repo: &Repository,
        id: &PackageRevisionId,
    ) -> Result<PackageRevisionId> {
        let absolute = join_scope(&repo.directory, &id.package_path);
        let backend = self.mirror.backend();
        let draft_remote = refs::draft_branch(&absolute, &id.workspace_name);
        let draft_local = draft_remote.to_local();
        let tip = backend.resolve_local_ref(&draft_local).await?.ok_or_else(|| {
            Error::not_found(format!("draft '{draft_local}' has no local commit"))
        })?;

        PushBuilder::new()
            .push(draft_remote, tip)
            .apply(&self.mirror)
            .await?;
        Ok(id.clone())
    }

    /// `UpdateLifecycle` (§6): dispatches one transition of §4.6's state
    /// machine. `published_commit` is only consulted for
    /// `Published -> DeletionProposed`, where there is no local branch to
    /// read the published commit id from.
    pub async fn update_lifecycle(
        &self,
        repo: &Repository,
        id: &PackageRevisionId,
        from: Lifecycle,
        to: Lifecycle,
        published_commit: Option<ObjectId>,
    ) -> Result<PackageRevisionId> {
        let absolute = join_scope(&repo.directory, &id.package_path);
        match (from, to) {
            (Lifecycle::Draft, Lifecycle::Proposed) => {
                self.propose(&absolute, &id.workspace_name).await?;
                Ok(id.clone())
            }
            (Lifecycle::Proposed, Lifecycle::Draft) => {
                self.unpropose(&absolute, &id.workspace_name).await?;
                Ok(id.clone())
            }
            (Lifecycle::Proposed, Lifecycle::Published) => self.publish(repo, id).await,
            (Lifecycle::Published, Lifecycle::DeletionProposed) => {
                let commit = published_commit.ok_or_else(|| {
                    Error::validation("DeletionProposed requires the published commit")
                })?;
                self.propose_deletion(&absolute, &id.revision, commit).await?;
                Ok(id.clone())
            }
            (Lifecycle::DeletionProposed, Lifecycle::Published) => {
                self.cancel_deletion(&absolute, &id.revision).await?;
                Ok(id.clone())
            }
            (Lifecycle::Published, Lifecycle::Deleted)
            | (Lifecycle::DeletionProposed, Lifecycle::Deleted) => {
                self.delete_published(repo, id).await?;
                Ok(id.clone())
            }
            (from, to) => Err(Error::validation(format!(
                "illegal lifecycle transition {from} -> {to}"
            ))),
        }
    }

    /// `DeletePackageRevision` (§6) for a revision still in `Draft` or
    /// `Proposed`: there is no main-branch history to rewrite yet, so
    /// deletion is just removing the branch that names it.
    pub async fn delete_unpublished(
        &self,
        repo: &Repository,
        id: &PackageRevisionId,
        lifecycle: Lifecycle,
    ) -> Result<()> {
        let absolute = join_scope(&repo.directory, &id.package_path);
        let remote = match lifecycle {
            Lifecycle::Draft => refs::draft_branch(&absolute, &id.workspace_name),
            Lifecycle::Proposed => refs::proposed_branch(&absolute, &id.workspace_name),
            other => {
                return Err(Error::validation(format!(
                    "delete_unpublished called for lifecycle {other}, expected Draft or Proposed"
                )))
            }
        };
        PushBuilder::new().delete(remote).apply(&self.mirror).await
    }

    async fn propose(&self, absolute: &str, workspace_name: &str) -> Result<()> {
        let backend = self.mirror.backend();
        let draft_remote = refs::draft_branch(absolute, workspace_name);
        let draft_local = draft_remote.to_local();
        let tip = backend.resolve_local_ref(&draft_local).await?.ok_or_else(|| {
            Error::not_found(format!("draft '{draft_local}' has no local commit"))
        })?;
        let proposed_remote = refs::proposed_branch(absolute, workspace_name);
        PushBuilder::new()
            .push(proposed_remote, tip)
            .delete(draft_remote)
            .apply(&self.mirror)
            .await
    }

    async fn unpropose(&self, absolute: &str, workspace_name: &str) -> Result<()> {
        let backend = self.mirror.backend();
        let proposed_remote = refs::proposed_branch(absolute, workspace_name);
        let proposed_local = proposed_remote.to_local();
        let tip = backend.resolve_local_ref(&proposed_local).await?.ok_or_else(|| {
            Error::not_found(format!("proposed branch '{proposed_local}' has no local commit"))
        })?;
        let draft_remote = refs::draft_branch(absolute, workspace_name);
        PushBuilder::new()
            .push(draft_remote, tip)
            .delete(proposed_remote)
            .apply(&self.mirror)
            .await
    }

    /// Commit-replay on publish (§4.6). The replayed revision string is the
    /// draft's workspace name — Porch's convention of naming a published
    /// revision after the workspace that produced it (see DESIGN.md).
    async fn publish(&self, repo: &Repository, id: &PackageRevisionId) -> Result<PackageRevisionId> {
        let absolute = join_scope(&repo.directory, &id.package_path);
        self.mirror.fetch().await?;
        let backend = self.mirror.backend();

        let proposed_remote = refs::proposed_branch(&absolute, &id.workspace_name);
        let proposed_local = proposed_remote.to_local();
        let proposed_tip = backend.resolve_local_ref(&proposed_local).await?.ok_or_else(|| {
            Error::not_found(format!(
                "proposed branch '{proposed_local}' has no local commit"
            ))
        })?;

        let main_remote = refs::main_branch(self.mirror.main_branch());
        let main_local = main_remote.to_local();
        let main_tip = backend
            .resolve_local_ref(&main_local)
            .await?
            .ok_or_else(|| Error::not_found("main branch has no commits"))?;

        let revision = id.workspace_name.clone();
        let outcome = publish::replay_onto_main(
            &self.mirror,
            &main_tip,
            &proposed_tip,
            &absolute,
            &id.workspace_name,
            &revision,
        )
        .await?;

        let tag_remote = refs::package_tag(&absolute, &revision);
        PushBuilder::new()
            .push(main_remote.clone(), outcome.new_main_tip.clone())
            .push(tag_remote, outcome.new_main_tip)
            .delete(proposed_remote)
            .require(main_remote, Some(main_tip))
            .apply(&self.mirror)
            .await?;

        let published_id = PackageRevisionId {
            repository: repo.id(),
            package_path: id.package_path.clone(),
            workspace_name: id.workspace_name.clone(),
            revision,
        };

        if repo.deployment {
            self.deployment_hook.on_publish(repo, &published_id).await;
        }

        Ok(published_id)
    }

    async fn propose_deletion(
        &self,
        absolute: &str,
        revision: &str,
        published_commit: ObjectId,
    ) -> Result<()> {
        let deletion_remote = refs::deletion_proposed_branch(absolute, revision);
        PushBuilder::new()
            .push(deletion_remote, published_commit)
            .apply(&self.mirror)
            .await
    }

    async fn cancel_deletion(&self, absolute: &str, revision: &str) -> Result<()> {
        let deletion_remote = refs::deletion_proposed_branch(absolute, revision);
        PushBuilder::new().delete(deletion_remote).apply(&self.mirror).await
    }

    /// `Published -> Deleted` (§4.6): removes the package tag and any
    /// pending deletionProposed branch, and appends a commit on main that
    /// drops the package subtree entirely.
    async fn delete_published(&self, repo: &Repository, id: &PackageRevisionId) -> Result<()> {
        let absolute = join_scope(&repo.directory, &id.package_path);
        self.mirror.fetch().await?;
        let backend = self.mirror.backend();

        let main_remote = refs::main_branch(self.mirror.main_branch());
        let main_local = main_remote.to_local();
        let main_tip = backend
            .resolve_local_ref(&main_local)
            .await?
            .ok_or_else(|| Error::not_found("main branch has no commits"))?;

        let mut builder =
            CommitBuilder::new(backend, Some(main_tip.clone()), &absolute, None).await?;
        let message = format!("Delete {}/{}", id.package_path, id.revision);
        let new_main_tip = builder.commit(message, None, Vec::new()).await?;

        let tag_remote = refs::package_tag(&absolute, &id.revision);
        let deletion_remote = refs::deletion_proposed_branch(&absolute, &id.revision);

        PushBuilder::new()
            .push(main_remote.clone(), new_main_tip)
            .delete(tag_remote)
            .delete(deletion_remote)
            .require(main_remote, Some(main_tip))
            .apply(&self.mirror)
            .await
    }
}

/// Workspace names are the final path segment of a draft/proposed branch
/// (§3) — reject anything that would produce a malformed ref or an
/// ambiguous path split.
fn validate_workspace_name(name: &str) -> Result<()> {
    let is_valid = !name.is_empty()
        && !name.starts_with('.')
        && name != "HEAD"
        && !name.contains(['/', ' ', '\t', '\n', '~', '^', ':', '?', '*', '[']);
    if is_valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid workspace name '{name}'")))
    }
}

fn join_scope(scope: &str, relative: &str) -> String {
    let scope = scope.trim_matches('/');
    let relative = relative.trim_matches('/');
    match (scope.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => scope.to_string(),
        (false, false) => format!("{scope}/{relative}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use porch_core::auth::CredentialProvider;
    use porch_core::backend::{Backend, GitAuth};
    use porch_core::model::MainBranchStrategy;
    use porch_core::refs::LocalRef;
    use porch_git::Git2Backend;

    struct NoAuth;

    #[async_trait]
    impl CredentialProvider for NoAuth {
        async fn credential(&self, _force_refresh: bool) -> Result<GitAuth> {
            Ok(GitAuth::Anonymous)
        }
    }

    /// Exercises `create_draft -> close_draft -> propose -> publish` against
    /// two real bare `git2` repositories (an "origin" and the mirror that
    /// clones it), then reads the published tree straight back off the
    /// origin — not the mirror's local tracking refs — so a push that only
    /// looked like it worked locally would still be caught (§8 Scenario 1).
    #[tokio::test]
    async fn full_lifecycle_round_trip_through_git2() {
        let origin_dir = tempfile::tempdir().unwrap();
        let origin_url = origin_dir.path().to_string_lossy().into_owned();
        // Just touches the bare repo into existence; its own "origin" remote
        // is never used.
        Git2Backend::open_or_init(origin_dir.path(), "unused").unwrap();

        let mirror_dir = tempfile::tempdir().unwrap();
        let backend = Git2Backend::open_or_init(mirror_dir.path(), &origin_url).unwrap();
        let mirror = Arc::new(RepositoryMirror::new(
            Arc::new(backend),
            Arc::new(NoAuth),
            "main".to_string(),
        ));

        mirror.fetch().await.unwrap();
        mirror.verify(MainBranchStrategy::CreateIfMissing).await.unwrap();

        let repo = Repository {
            namespace: "ns".to_string(),
            name: "repo".to_string(),
            remote_url: origin_url,
            branch: "main".to_string(),
            directory: String::new(),
            secret_ref: None,
            main_branch_strategy: MainBranchStrategy::CreateIfMissing,
            deployment: false,
            repo_sync_frequency_secs: 60,
        };

        let engine = DraftEngine::new(mirror.clone());
        let mut resources = BTreeMap::new();
        resources.insert("Kptfile".to_string(), "apiVersion: v1".to_string());
        resources.insert("hello".to_string(), "world".to_string());

        let id = engine
            .create_draft(&repo, "catalog/pkg", "v1", None, Some(resources))
            .await
            .unwrap();

        engine.close_draft(&repo, &id).await.unwrap();
        engine
            .update_lifecycle(&repo, &id, Lifecycle::Draft, Lifecycle::Proposed, None)
            .await
            .unwrap();
        let published = engine
            .update_lifecycle(&repo, &id, Lifecycle::Proposed, Lifecycle::Published, None)
            .await
            .unwrap();
        assert_eq!(published.revision, "v1");

        // Read back from the origin repository directly: if the push
        // silently sent the old tip, or never created the ref at all,
        // these resolve to nothing or the wrong commit.
        let origin_backend = Git2Backend::open_or_init(origin_dir.path(), "unused").unwrap();
        let tag_commit = origin_backend
            .resolve_local_ref(&LocalRef::new("refs/tags/catalog/pkg/v1"))
            .await
            .unwrap()
            .expect("package tag pushed to the remote");
        let main_commit = origin_backend
            .resolve_local_ref(&LocalRef::new("refs/heads/main"))
            .await
            .unwrap()
            .expect("main branch pushed to the remote");
        assert_eq!(tag_commit, main_commit);

        let commit_info = origin_backend.read_commit(&main_commit).await.unwrap();
        let pkg_tree = mirror
            .walk_into_tree(&commit_info.tree, "catalog/pkg")
            .await
            .unwrap()
            .expect("published package tree exists on main");
        let published_resources = mirror.read_subtree_as_text(&pkg_tree, "").await.unwrap();
        assert_eq!(
            published_resources.get("Kptfile").map(String::as_str),
            Some("apiVersion: v1")
        );
        assert_eq!(published_resources.get("hello").map(String::as_str), Some("world"));
    }

    #[test]
    fn rejects_workspace_names_with_slashes() {
        assert!(validate_workspace_name("v1/extra").is_err());
    }

    #[test]
    fn accepts_ordinary_workspace_names() {
        assert!(validate_workspace_name("v123").is_ok());
    }

    #[test]
    fn join_scope_handles_empty_scope() {
        assert_eq!(join_scope("", "catalog/a"), "catalog/a");
    }

    #[test]
    fn join_scope_joins_prefix() {
        assert_eq!(join_scope("catalog", "a"), "catalog/a");
    }

    #[test]
    fn join_scope_exact_match_is_scope_itself() {
        assert_eq!(join_scope("catalog", ""), "catalog");
    }
}
