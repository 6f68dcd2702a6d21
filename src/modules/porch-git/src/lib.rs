/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-git/src/lib.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! `porch-git` — the `git2`-backed `Backend` implementation, the Commit
//! Helper (component B), and the Repository Mirror (component D).

pub mod commit;
pub mod git2_backend;
pub mod mirror;

pub use commit::CommitBuilder;
pub use git2_backend::Git2Backend;
pub use mirror::RepositoryMirror;

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Names a mirror's cache directory by hashing its remote URL (spec §4.4
/// "a bare local clone in a cache directory named by hashing the remote
/// URL"), so two `Repository`s pointed at the same remote share a mirror
/// and a typo'd URL never collides with another repository's clone.
pub fn cache_dir_for(cache_root: &Path, remote_url: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(remote_url.as_bytes());
    cache_root.join(hex::encode(hasher.finalize()))
}
