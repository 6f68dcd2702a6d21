/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-watch/src/lib.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! `porch-watch` — the Watcher Fan-Out (component H): list-then-watch
//! event streams over discovered package revisions.

pub mod watcher;

pub use watcher::{watch, Subscription};
