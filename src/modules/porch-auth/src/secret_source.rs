/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-auth/src/secret_source.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! The narrow interface the Credential Broker wraps with caching and a
//! circuit breaker (§4.9). Actually resolving a `secretRef` to secret
//! material — reading a Kubernetes `Secret`, calling a workload-identity
//! token-exchange service — is an external collaborator's job (spec §1
//! "Out of scope": "credential resolvers... referenced only through narrow
//! interfaces"); this crate only consumes whatever comes back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use porch_core::error::Result;

/// The two credential shapes spec §4.9 recognizes.
#[derive(Debug, Clone)]
pub enum RawCredential {
    Basic {
        username: String,
        password: String,
    },
    /// `expires_at` is `None` for a long-lived or non-expiring bearer token;
    /// the broker treats such a token as always valid once cached.
    Bearer {
        token: String,
        expires_at: Option<DateTime<Utc>>,
    },
}

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn resolve(&self, secret_ref: &str) -> Result<RawCredential>;
}
