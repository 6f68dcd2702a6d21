/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-core/src/annotation.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Annotation Codec (component C, spec §4.3 and §6).
//!
//! Commit messages carry structured task metadata as a trailing line
//! matching `^kpt:<json>$`. The codec is deliberately permissive on read —
//! malformed lines are silently skipped, and a caller must be prepared to
//! see zero, one, or (in theory) several annotations on one commit.

use crate::model::Task;
use serde::{Deserialize, Serialize};

const SENTINEL: &str = "kpt:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub package_path: String,
    pub workspace_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

impl Annotation {
    /// Renders the trailing commit-message line for this annotation. The
    /// caller appends this to the rest of the message body with a newline.
    pub fn encode(&self) -> String {
        format!(
            "{SENTINEL}{}",
            serde_json::to_string(self).expect("Annotation serializes infallibly")
        )
    }
}

/// Scans every line of `message` for the `kpt:` sentinel and parses each
/// match as JSON, discarding lines that don't parse. Order is preserved
/// (top to bottom of the message body).
pub fn extract_all(message: &str) -> Vec<Annotation> {
    message
        .lines()
        .filter_map(|line| line.strip_prefix(SENTINEL))
        .filter_map(|json| serde_json::from_str::<Annotation>(json).ok())
        .collect()
}

/// Convenience for the common case of "does this commit carry an
/// annotation for this exact (package_path, workspace_name)".
pub fn find_for_identity<'a>(
    annotations: &'a [Annotation],
    package_path: &str,
    workspace_name: &str,
) -> Option<&'a Annotation> {
    annotations
        .iter()
        .find(|a| a.package_path == package_path && a.workspace_name == workspace_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskKind;

    #[test]
    fn round_trips_through_a_commit_message() {
        let annotation = Annotation {
            package_path: "catalog/gcp/bucket".into(),
            workspace_name: "v123".into(),
            revision: String::new(),
            task: Some(Task {
                kind: TaskKind::Edit,
                payload: Default::default(),
            }),
        };
        let message = format!("Edit catalog/gcp/bucket\n\n{}\n", annotation.encode());
        let found = extract_all(&message);
        assert_eq!(found, vec![annotation]);
    }

    #[test]
    fn ignores_malformed_lines() {
        let message = "Some commit\n\nkpt:{not valid json\nkpt:{\"packagePath\":\"a\"}\n";
        // Second line is missing `workspaceName`, so it fails to deserialize
        // too (no default) and is also dropped — only genuinely valid
        // annotations survive.
        let found = extract_all(message);
        assert!(found.is_empty());
    }

    #[test]
    fn tolerates_multiple_annotations_on_one_commit() {
        let a = Annotation {
            package_path: "a".into(),
            workspace_name: "v1".into(),
            revision: String::new(),
            task: None,
        };
        let b = Annotation {
            package_path: "b".into(),
            workspace_name: "v1".into(),
            revision: String::new(),
            task: None,
        };
        let message = format!("msg\n{}\n{}\n", a.encode(), b.encode());
        assert_eq!(extract_all(&message), vec![a, b]);
    }
}
