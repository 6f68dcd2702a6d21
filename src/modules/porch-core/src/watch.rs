/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-core/src/watch.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Shared watch event vocabulary (spec §4.8). Defined in `porch-core` (not
//! `porch-watch`) so the facade crate can name `WatchEvent` without pulling
//! in the fan-out implementation's channel/backlog machinery.

use crate::model::PackageRevision;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "revision", rename_all = "camelCase")]
pub enum WatchEvent {
    Added(PackageRevision),
    Modified(PackageRevision),
    Deleted(PackageRevision),
    /// Terminal: the subscription ended abnormally (spec §4.8 step 5).
    Error(String),
}
