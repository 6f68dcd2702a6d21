/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-core/src/refs.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Ref Naming & Translation (component A, spec §4.1 and §3).
//!
//! The single most common source of bugs the spec calls out is mixing local
//! and remote ref forms, so — per spec §4.1 — they are distinct types here,
//! not both `String`. Nothing in this crate or `porch-git` accepts a bare
//! `&str` where a ref name is expected.

use std::fmt;

const ORIGIN_PREFIX: &str = "refs/remotes/origin/";
const HEADS_PREFIX: &str = "refs/heads/";
const TAGS_PREFIX: &str = "refs/tags/";

/// A ref as the *remote* (origin) names it: `refs/heads/...` or
/// `refs/tags/...`. This is the form passed to `Backend::push`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteRef(String);

/// A ref as the local mirror names it: branches live under
/// `refs/remotes/origin/...`, tags are fetched verbatim into
/// `refs/tags/...` (spec §4.4). This is the form every read in
/// `porch-git`/`porch-discovery`/`porch-draft` operates on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalRef(String);

impl RemoteRef {
    pub fn new(name: impl Into<String>) -> Self {
        RemoteRef(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_local(&self) -> LocalRef {
        if let Some(rest) = self.0.strip_prefix(HEADS_PREFIX) {
            LocalRef(format!("{ORIGIN_PREFIX}{rest}"))
        } else {
            // Tags (and anything else) are unchanged.
            LocalRef(self.0.clone())
        }
    }
}

impl LocalRef {
    pub fn new(name: impl Into<String>) -> Self {
        LocalRef(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_remote(&self) -> RemoteRef {
        if let Some(rest) = self.0.strip_prefix(ORIGIN_PREFIX) {
            RemoteRef(format!("{HEADS_PREFIX}{rest}"))
        } else {
            RemoteRef(self.0.clone())
        }
    }

    /// The path after the `refs/remotes/origin/` or `refs/tags/` prefix,
    /// i.e. the part that actually carries package identity.
    fn suffix(&self) -> Option<&str> {
        self.0
            .strip_prefix(ORIGIN_PREFIX)
            .or_else(|| self.0.strip_prefix(TAGS_PREFIX))
    }

    fn is_tag(&self) -> bool {
        self.0.starts_with(TAGS_PREFIX)
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for LocalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The result of classifying a local ref (spec §4.1 `classify`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefClass {
    Main,
    Draft { package_path: String, workspace: String },
    Proposed { package_path: String, workspace: String },
    DeletionProposed { package_path: String, revision: String },
    PackageTag { package_path: String, revision: String },
    Other,
}

/// Splits `drafts/<pkg>/<workspace>` (or `proposed/...`) into `(pkg,
/// workspace)`. The workspace is always the final path segment; everything
/// before it is the package path, which may itself contain slashes. A
/// branch with no workspace segment (no `/` after the family prefix) is
/// invalid per §6 and classifies as `Other`.
fn split_pkg_and_tail(rest: &str) -> Option<(String, String)> {
    let idx = rest.rfind('/')?;
    let (pkg, tail) = rest.split_at(idx);
    let tail = &tail[1..];
    if pkg.is_empty() || tail.is_empty() {
        return None;
    }
    Some((pkg.to_string(), tail.to_string()))
}

pub fn classify(r: &LocalRef, main_branch: &str) -> RefClass {
    let Some(suffix) = r.suffix() else {
        return RefClass::Other;
    };

    if r.is_tag() {
        return match split_pkg_and_tail(suffix) {
            Some((package_path, revision)) => RefClass::PackageTag {
                package_path,
                revision,
            },
            None => RefClass::Other,
        };
    }

    if suffix == main_branch {
        return RefClass::Main;
    }
    if let Some(rest) = suffix.strip_prefix("drafts/") {
        return match split_pkg_and_tail(rest) {
            Some((package_path, workspace)) => RefClass::Draft {
                package_path,
                workspace,
            },
            None => RefClass::Other,
        };
    }
    if let Some(rest) = suffix.strip_prefix("proposed/") {
        return match split_pkg_and_tail(rest) {
            Some((package_path, workspace)) => RefClass::Proposed {
                package_path,
                workspace,
            },
            None => RefClass::Other,
        };
    }
    if let Some(rest) = suffix.strip_prefix("deletionProposed/") {
        return match split_pkg_and_tail(rest) {
            Some((package_path, revision)) => RefClass::DeletionProposed {
                package_path,
                revision,
            },
            None => RefClass::Other,
        };
    }
    RefClass::Other
}

/// Constructors for each of the five ref families (spec §3), all returning
/// the *remote* form since that is what gets created/pushed; call
/// `.to_local()` for the mirror-side view.
pub fn main_branch(branch: &str) -> RemoteRef {
    RemoteRef::new(format!("{HEADS_PREFIX}{branch}"))
}

pub fn draft_branch(package_path: &str, workspace: &str) -> RemoteRef {
    RemoteRef::new(format!("{HEADS_PREFIX}drafts/{package_path}/{workspace}"))
}

pub fn proposed_branch(package_path: &str, workspace: &str) -> RemoteRef {
    RemoteRef::new(format!("{HEADS_PREFIX}proposed/{package_path}/{workspace}"))
}

pub fn deletion_proposed_branch(package_path: &str, revision: &str) -> RemoteRef {
    RemoteRef::new(format!(
        "{HEADS_PREFIX}deletionProposed/{package_path}/{revision}"
    ))
}

pub fn package_tag(package_path: &str, revision: &str) -> RemoteRef {
    RemoteRef::new(format!("{TAGS_PREFIX}{package_path}/{revision}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_remote_round_trip_for_branches() {
        let remote = draft_branch("catalog/gcp/bucket", "v1");
        let local = remote.to_local();
        assert_eq!(local.as_str(), "refs/remotes/origin/drafts/catalog/gcp/bucket/v1");
        assert_eq!(local.to_remote(), remote);
    }

    #[test]
    fn tags_are_unchanged_across_local_remote() {
        let remote = package_tag("a/b", "v1");
        let local = remote.to_local();
        assert_eq!(local.as_str(), remote.as_str());
        assert_eq!(local.to_remote(), remote);
    }

    #[test]
    fn classify_draft_branch() {
        let local = draft_branch("a/b", "v123").to_local();
        assert_eq!(
            classify(&local, "main"),
            RefClass::Draft {
                package_path: "a/b".into(),
                workspace: "v123".into(),
            }
        );
    }

    #[test]
    fn classify_package_tag_requires_slash() {
        let versioned = LocalRef::new("refs/tags/v1.2.3");
        assert_eq!(classify(&versioned, "main"), RefClass::Other);

        let pkg_tag = package_tag("a/b", "v1").to_local();
        assert_eq!(
            classify(&pkg_tag, "main"),
            RefClass::PackageTag {
                package_path: "a/b".into(),
                revision: "v1".into(),
            }
        );
    }

    #[test]
    fn classify_main_branch() {
        let local = main_branch("main").to_local();
        assert_eq!(classify(&local, "main"), RefClass::Main);
    }

    #[test]
    fn draft_branch_without_workspace_is_invalid() {
        let local = LocalRef::new("refs/remotes/origin/drafts/a");
        assert_eq!(classify(&local, "main"), RefClass::Other);
    }
}
