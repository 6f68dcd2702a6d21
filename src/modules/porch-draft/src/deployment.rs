/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-draft/src/deployment.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! The deployment publish hook (SPEC_FULL.md §F.5): the core's obligation
//! for a `deployment`-flagged repository is to surface the flag and notify
//! a listener at the moment of publish, not to act on it — applying the
//! published revision against a cluster belongs to whatever sits above the
//! Draft Engine. Grounded on `CredentialProvider`/`SecretSource`'s shape:
//! a small async trait injected at construction, with a no-op default so a
//! caller that doesn't care never has to know the hook exists.

use async_trait::async_trait;
use porch_core::model::{PackageRevisionId, Repository};

#[async_trait]
pub trait DeploymentHook: Send + Sync {
    /// Called once, after `Proposed -> Published` lands, for any repository
    /// registered with `deployment: true`.
    async fn on_publish(&self, repo: &Repository, id: &PackageRevisionId);
}

pub struct NoopDeploymentHook;

#[async_trait]
impl DeploymentHook for NoopDeploymentHook {
    async fn on_publish(&self, _repo: &Repository, _id: &PackageRevisionId) {}
}
