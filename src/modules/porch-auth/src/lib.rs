/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-auth/src/lib.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! `porch-auth` — the Credential Broker (component I): resolves a
//! repository's `secretRef` to transport auth, cached and circuit-broken.

pub mod broker;
pub mod secret_source;

pub use broker::CredentialBroker;
pub use secret_source::{RawCredential, SecretSource};
