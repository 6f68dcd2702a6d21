/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/store.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! `OrchestratorStore` (SPEC_FULL.md §A): the single `Store` implementation
//! an aggregated API server links against, wiring together the Repository
//! Registry (J), the Draft Engine (F), Package Discovery (E), and the
//! Watcher Fan-Out (H) behind the store-shaped interface of spec §6.
//! Grounded on `phgit_operator/src/main.rs`'s `Context` struct: one shared
//! handle, cloned cheaply (`Arc`s inside), threaded through every entry
//! point.

use async_trait::async_trait;
use porch_auth::{CredentialBroker, SecretSource};
use porch_core::backend::ObjectId;
use porch_core::error::{Error, Result};
use porch_core::model::{
    Filter, Lifecycle, PackageRevision, PackageRevisionId, Resources, RepositoryId, Task,
};
use porch_discovery::discover;
use porch_draft::{DeploymentHook, DraftEngine, NoopDeploymentHook};
use porch_git::RepositoryMirror;
use porch_registry::{RepositoryConfig, RepositoryRegistry};
use porch_watch::{watch, Subscription};
use std::sync::Arc;

/// The store-shaped interface of spec §6. Implemented by `OrchestratorStore`;
/// kept as a trait so a caller only ever depends on the shape of the API,
/// not on this crate's concrete wiring.
#[async_trait]
pub trait Store: Send + Sync {
    async fn register_repository(
        &self,
        config: RepositoryConfig,
        secrets: Arc<dyn SecretSource>,
    ) -> Result<()>;

    async fn deregister_repository(&self, repo: &RepositoryId) -> Result<()>;

    async fn list_package_revisions(
        &self,
        repo: &RepositoryId,
        filter: &Filter,
    ) -> Result<Vec<PackageRevision>>;

    async fn get_package_revision(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
    ) -> Result<PackageRevision>;

    async fn create_package_revision(
        &self,
        repo: &RepositoryId,
        package_path: &str,
        workspace_name: &str,
        initial_task: Option<Task>,
        initial_resources: Option<Resources>,
    ) -> Result<PackageRevisionId>;

    async fn update_package_revision(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
        resources: &Resources,
        task: Option<Task>,
    ) -> Result<()>;

    async fn update_lifecycle(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
        from: Lifecycle,
        to: Lifecycle,
    ) -> Result<PackageRevisionId>;

    async fn close_draft(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
    ) -> Result<PackageRevisionId>;

    async fn delete_package_revision(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
        lifecycle: Lifecycle,
    ) -> Result<()>;

    async fn get_resources(&self, repo: &RepositoryId, id: &PackageRevisionId) -> Result<Resources>;

    /// Starts a watch; the returned `Subscription` owns the background fan-
    /// out task's lifetime (spec §4.8).
    async fn watch(&self, repo: &RepositoryId, filter: Filter) -> Result<Subscription>;
}

pub struct OrchestratorStore {
    registry: Arc<RepositoryRegistry>,
    deployment_hook: Arc<dyn DeploymentHook>,
}

impl OrchestratorStore {
    pub fn new(registry: Arc<RepositoryRegistry>) -> Self {
        OrchestratorStore {
            registry,
            deployment_hook: Arc::new(NoopDeploymentHook),
        }
    }

    /// Registers the hook the Draft Engine calls on publish for
    /// `deployment`-flagged repositories (SPEC_FULL.md §F.5) — an
    /// aggregated API server wires one in to actually apply the published
    /// revision against a cluster.
    pub fn with_deployment_hook(mut self, hook: Arc<dyn DeploymentHook>) -> Self {
        self.deployment_hook = hook;
        self
    }

    fn engine(&self, mirror: Arc<RepositoryMirror>) -> DraftEngine {
        DraftEngine::new(mirror).with_deployment_hook(self.deployment_hook.clone())
    }

    async fn mirror(&self, repo: &RepositoryId) -> Result<Arc<RepositoryMirror>> {
        self.registry
            .get(repo)
            .await
            .ok_or_else(|| Error::not_found(format!("repository '{repo}' is not registered")))
    }

    async fn repository(&self, repo: &RepositoryId) -> Result<porch_core::model::Repository> {
        self.registry
            .repository(repo)
            .await
            .ok_or_else(|| Error::not_found(format!("repository '{repo}' is not registered")))
    }

    /// Finds the revision matching `id` exactly (package path, workspace,
    /// and — once assigned — revision string) among everything discovery
    /// currently sees, which is what `GetPackageRevision` and the
    /// `published_commit` lookup for `Published -> DeletionProposed` both
    /// need.
    async fn find(
        &self,
        mirror: &RepositoryMirror,
        repository: &porch_core::model::Repository,
        id: &PackageRevisionId,
    ) -> Result<PackageRevision> {
        let all = discover(mirror, repository).await?;
        all.into_iter()
            .find(|r| {
                r.id.package_path == id.package_path
                    && r.id.workspace_name == id.workspace_name
                    && (id.revision.is_empty() || r.id.revision == id.revision)
            })
            .ok_or_else(|| Error::not_found(format!("package revision '{id}' not found")))
    }
}

#[async_trait]
impl Store for OrchestratorStore {
    async fn register_repository(
        &self,
        config: RepositoryConfig,
        secrets: Arc<dyn SecretSource>,
    ) -> Result<()> {
        let secret_ref = config.secret_ref.clone();
        let repository = config.into_repository();
        let credentials = Arc::new(CredentialBroker::new(secrets, secret_ref));
        self.registry.create(repository, credentials).await?;
        Ok(())
    }

    async fn deregister_repository(&self, repo: &RepositoryId) -> Result<()> {
        self.registry.delete(repo).await
    }

    async fn list_package_revisions(
        &self,
        repo: &RepositoryId,
        filter: &Filter,
    ) -> Result<Vec<PackageRevision>> {
        let mirror = self.mirror(repo).await?;
        let repository = self.repository(repo).await?;
        let all = discover(&mirror, &repository).await?;
        Ok(all.into_iter().filter(|r| filter.matches(r)).collect())
    }

    async fn get_package_revision(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
    ) -> Result<PackageRevision> {
        let mirror = self.mirror(repo).await?;
        let repository = self.repository(repo).await?;
        self.find(&mirror, &repository, id).await
    }

    async fn create_package_revision(
        &self,
        repo: &RepositoryId,
        package_path: &str,
        workspace_name: &str,
        initial_task: Option<Task>,
        initial_resources: Option<Resources>,
    ) -> Result<PackageRevisionId> {
        let mirror = self.mirror(repo).await?;
        let repository = self.repository(repo).await?;
        let engine = self.engine(mirror);
        engine
            .create_draft(
                &repository,
                package_path,
                workspace_name,
                initial_task,
                initial_resources,
            )
            .await
    }

    async fn update_package_revision(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
        resources: &Resources,
        task: Option<Task>,
    ) -> Result<()> {
        let mirror = self.mirror(repo).await?;
        let repository = self.repository(repo).await?;
        let engine = self.engine(mirror);
        engine.update_resources(&repository, id, resources, task).await
    }

    async fn update_lifecycle(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
        from: Lifecycle,
        to: Lifecycle,
    ) -> Result<PackageRevisionId> {
        let mirror = self.mirror(repo).await?;
        let repository = self.repository(repo).await?;

        // `Published -> DeletionProposed` needs the published commit id,
        // which only exists in discovery's view (there's no local draft/
        // proposed branch for a published revision to read it from).
        let published_commit = if from == Lifecycle::Published && to == Lifecycle::DeletionProposed {
            let current = self.find(&mirror, &repository, id).await?;
            Some(ObjectId(current.commit_hash))
        } else {
            None
        };

        let engine = self.engine(mirror);
        engine
            .update_lifecycle(&repository, id, from, to, published_commit)
            .await
    }

    async fn close_draft(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
    ) -> Result<PackageRevisionId> {
        let mirror = self.mirror(repo).await?;
        let repository = self.repository(repo).await?;
        let engine = self.engine(mirror);
        engine.close_draft(&repository, id).await
    }

    async fn delete_package_revision(
        &self,
        repo: &RepositoryId,
        id: &PackageRevisionId,
        lifecycle: Lifecycle,
    ) -> Result<()> {
        let mirror = self.mirror(repo).await?;
        let repository = self.repository(repo).await?;
        let engine = self.engine(mirror);
        match lifecycle {
            Lifecycle::Draft | Lifecycle::Proposed => {
                engine.delete_unpublished(&repository, id, lifecycle).await
            }
            Lifecycle::Published | Lifecycle::DeletionProposed => {
                engine
                    .update_lifecycle(&repository, id, lifecycle, Lifecycle::Deleted, None)
                    .await
                    .map(|_| ())
            }
            Lifecycle::Deleted => Err(Error::validation(
                "package revision is already Deleted".to_string(),
            )),
        }
    }

    async fn get_resources(&self, repo: &RepositoryId, id: &PackageRevisionId) -> Result<Resources> {
        let mirror = self.mirror(repo).await?;
        let repository = self.repository(repo).await?;
        let current = self.find(&mirror, &repository, id).await?;
        // `tree_hash` is already the package's own subtree (see
        // `porch-discovery`), so resources come back keyed by in-package
        // path, not by the repository-absolute path.
        let tree = ObjectId(current.tree_hash);
        mirror.read_subtree_as_text(&tree, "").await
    }

    async fn watch(&self, repo: &RepositoryId, filter: Filter) -> Result<Subscription> {
        let mirror = self.mirror(repo).await?;
        let repository = self.repository(repo).await?;
        Ok(watch(mirror, repository, filter))
    }
}
