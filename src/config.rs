/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/config.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Facade-level configuration (SPEC_FULL.md §D): the knobs that govern the
//! orchestrator itself rather than any one registered repository — where
//! mirrors are cached on disk and how verbose the tracing subscriber should
//! be. Grounded on the same "deserialize a config struct, then drive
//! behavior off it" pattern as `release_orchestrator/src/config.rs` and
//! `git_sync/src/config.rs`.

use serde::Deserialize;
use std::path::PathBuf;

fn default_cache_root() -> PathBuf {
    PathBuf::from("./porch-cache")
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Directory under which every registered repository's bare clone is
    /// cached (passed straight through to `porch_registry::RepositoryRegistry`).
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    /// `tracing_subscriber::EnvFilter` directive used by `init_tracing`.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            cache_root: default_cache_root(),
            log_filter: default_log_filter(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = OrchestratorConfig::from_toml("").unwrap();
        assert_eq!(config.cache_root, default_cache_root());
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn overrides_individual_knobs() {
        let config = OrchestratorConfig::from_toml("cacheRoot = \"/var/lib/porch\"\n").unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/var/lib/porch"));
        assert_eq!(config.log_filter, "info");
    }
}
