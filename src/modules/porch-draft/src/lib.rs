/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-draft/src/lib.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! `porch-draft` — the Draft Engine (component F), Conflict-Safe Push
//! (component G), and commit-replay-on-publish logic (§4.6) that together
//! drive the package-revision lifecycle state machine.

pub mod deployment;
pub mod lifecycle;
pub mod publish;
pub mod push;

pub use deployment::{DeploymentHook, NoopDeploymentHook};
pub use lifecycle::DraftEngine;
pub use push::PushBuilder;
