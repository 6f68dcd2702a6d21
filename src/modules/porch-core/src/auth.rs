/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-core/src/auth.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! The credential-provider contract the Repository Mirror consumes (spec
//! §4.9). Defined here, not in `porch-auth`, for the same reason as
//! `Backend`: so `porch-git` can depend on the shape of a credential
//! without depending on the broker crate that produces one.

use crate::backend::GitAuth;
use crate::error::Result;
use async_trait::async_trait;

/// Hands out transport credentials for a single repository's remote.
/// `force_refresh` asks the implementation to discard any cached value —
/// used by the mirror's "auth failure, refresh, retry once" rule (§4.4).
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self, force_refresh: bool) -> Result<GitAuth>;
}
