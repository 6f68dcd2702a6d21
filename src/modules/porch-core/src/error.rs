/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-core/src/error.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Error taxonomy (spec §7). Every `porch-*` crate returns this type from its
//! public API; internal plumbing (git2, serde_json, I/O) converts into it at
//! the crate boundary instead of leaking into `anyhow`, because callers of
//! the `Store` surface must be able to match on *kind*, not just display a
//! message (see SPEC_FULL.md §C).

use thiserror::Error;

/// The error taxonomy of spec §7. Variant names are the "kinds" named there,
/// not a 1:1 mapping of every possible failure — callers match on kind and
/// read the message for detail.
#[derive(Debug, Error)]
pub enum Error {
    /// A ref, revision, or package was not present where expected.
    #[error("not found: {0}")]
    NotFound(String),

    /// A push precondition failed because another writer raced us. The
    /// caller owns retry semantics (§7 "Propagation") — this is never
    /// retried inside the core.
    #[error("concurrent update: {0}")]
    Conflict(String),

    /// Invalid workspace name, package path outside scope, missing
    /// `Kptfile`, or an illegal lifecycle transition. Always raised before
    /// any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Credential resolution failed, or the token-exchange circuit breaker
    /// is open.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A network or remote-side git error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The mirror references a hash the backend cannot resolve.
    #[error("corrupt mirror state: {0}")]
    Corruption(String),

    /// Raised from a cancellation handle.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Error::Auth(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// True for errors the caller might plausibly resolve by retrying
    /// (transport hiccups), as opposed to validation/conflict errors which
    /// require the caller to change its request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
