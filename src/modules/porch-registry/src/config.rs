/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-registry/src/config.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Wire-format configuration for a repository registration (spec §6
//! "Configuration knobs"), distinct from `porch_core::model::Repository`:
//! this struct is what an external caller deserializes and hands to
//! `RepositoryRegistry::create`, with every optional knob defaulted exactly
//! as §6 states. `Repository` itself has no `Default` — its identity
//! fields (namespace, name, remote URL) are never implicit.

use porch_core::model::{MainBranchStrategy, Repository, RepositoryId};
use serde::{Deserialize, Serialize};

fn default_branch() -> String {
    "main".to_string()
}

fn default_repo_sync_frequency_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    pub namespace: String,
    pub name: String,
    pub remote_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub secret_ref: Option<String>,
    #[serde(default)]
    pub main_branch_strategy: MainBranchStrategy,
    #[serde(default)]
    pub deployment: bool,
    #[serde(default = "default_repo_sync_frequency_secs")]
    pub repo_sync_frequency_secs: u64,
}

impl RepositoryConfig {
    pub fn id(&self) -> RepositoryId {
        RepositoryId {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn into_repository(self) -> Repository {
        Repository {
            namespace: self.namespace,
            name: self.name,
            remote_url: self.remote_url,
            branch: self.branch,
            directory: self.directory,
            secret_ref: self.secret_ref,
            main_branch_strategy: self.main_branch_strategy,
            deployment: self.deployment,
            repo_sync_frequency_secs: self.repo_sync_frequency_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configuration_knobs() {
        let json = r#"{"namespace":"ns","name":"repo","remoteUrl":"https://example/repo.git"}"#;
        let config: RepositoryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.branch, "main");
        assert_eq!(config.directory, "");
        assert_eq!(config.secret_ref, None);
        assert_eq!(config.main_branch_strategy, MainBranchStrategy::SkipVerification);
        assert!(!config.deployment);
        assert_eq!(config.repo_sync_frequency_secs, 60);
    }
}
