/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/lib.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! `porch` — the facade crate: wires the Repository Registry, Credential
//! Broker, Draft Engine, Package Discovery, and Watcher Fan-Out behind a
//! single `Store` implementation (`OrchestratorStore`), and owns
//! configuration loading and tracing subscriber setup for anything that
//! links against this crate (see DESIGN.md).

pub mod config;
pub mod store;

pub use config::OrchestratorConfig;
pub use porch_core::backend::ObjectId;
pub use porch_core::error::{Error, Result};
pub use porch_core::model::{
    Filter, Lifecycle, MainBranchStrategy, PackageRevision, PackageRevisionId, Repository,
    RepositoryId, Resources, RevisionKind, Task, TaskKind,
};
pub use porch_core::watch::WatchEvent;
pub use porch_auth::{CredentialBroker, RawCredential, SecretSource};
pub use porch_draft::{DeploymentHook, NoopDeploymentHook};
pub use porch_registry::{RepositoryConfig, RepositoryRegistry};
pub use porch_watch::Subscription;
pub use store::{OrchestratorStore, Store};

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs the process-wide `tracing` subscriber, reading filter
/// directives from `config.log_filter` (falling back to `RUST_LOG` if
/// that's unset). Mirrors `phgit_operator`'s startup sequence — only a
/// binary or test harness that links this crate should call this, never
/// another library crate.
pub fn init_tracing(config: &OrchestratorConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Builds an `OrchestratorStore` backed by a fresh `RepositoryRegistry`
/// rooted at `config.cache_root`.
pub fn new_store(config: &OrchestratorConfig) -> OrchestratorStore {
    let registry = Arc::new(RepositoryRegistry::new(config.cache_root.clone()));
    OrchestratorStore::new(registry)
}
