/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-auth/src/broker.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! The Credential Broker (component I, spec §4.9): caches a resolved
//! credential until it reports itself invalid, and short-circuits repeated
//! token-exchange failures through a circuit breaker. Grounded on
//! `secret_manager/src/providers/vault.rs`'s "construct once, cache the
//! resolved value" shape, generalized from one Vault call to any
//! `SecretSource` and given a breaker the teacher's one-shot Vault reads
//! never needed.

use crate::secret_source::{RawCredential, SecretSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use porch_core::auth::CredentialProvider;
use porch_core::backend::GitAuth;
use porch_core::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Tokens are treated as invalid this far ahead of their real expiry, so a
/// git operation never starts with a credential that expires mid-flight.
const EXPIRY_SAFETY_MARGIN: chrono::Duration = chrono::Duration::minutes(5);
const BREAKER_INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const BREAKER_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

struct Breaker {
    open_until: Option<Instant>,
    next_backoff: Duration,
}

impl Breaker {
    fn new() -> Self {
        Breaker {
            open_until: None,
            next_backoff: BREAKER_INITIAL_BACKOFF,
        }
    }

    fn is_open(&self) -> bool {
        self.open_until.map(|until| Instant::now() < until).unwrap_or(false)
    }

    fn record_failure(&mut self) {
        self.open_until = Some(Instant::now() + self.next_backoff);
        self.next_backoff = (self.next_backoff * 2).min(BREAKER_MAX_BACKOFF);
    }

    fn record_success(&mut self) {
        self.open_until = None;
        self.next_backoff = BREAKER_INITIAL_BACKOFF;
    }
}

struct Cached {
    credential: RawCredential,
}

impl Cached {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match &self.credential {
            RawCredential::Basic { .. } => true,
            RawCredential::Bearer { expires_at: None, .. } => true,
            RawCredential::Bearer { expires_at: Some(exp), .. } => *exp - EXPIRY_SAFETY_MARGIN > now,
        }
    }
}

fn to_git_auth(credential: &RawCredential) -> GitAuth {
    match credential {
        RawCredential::Basic { username, password } => GitAuth::Basic {
            username: username.clone(),
            password: password.clone(),
        },
        RawCredential::Bearer { token, .. } => GitAuth::Bearer {
            token: token.clone(),
        },
    }
}

struct BrokerState {
    cached: Option<Cached>,
    breaker: Breaker,
}

/// Resolves `secret_ref` (absent ⇒ anonymous, per spec §6) to `GitAuth`,
/// implementing `porch_core::auth::CredentialProvider` so `porch-git`'s
/// `RepositoryMirror` can consume it without depending on this crate.
pub struct CredentialBroker {
    source: Arc<dyn SecretSource>,
    secret_ref: Option<String>,
    state: Mutex<BrokerState>,
}

impl CredentialBroker {
    pub fn new(source: Arc<dyn SecretSource>, secret_ref: Option<String>) -> Self {
        CredentialBroker {
            source,
            secret_ref,
            state: Mutex::new(BrokerState {
                cached: None,
                breaker: Breaker::new(),
            }),
        }
    }
}

#[async_trait]
impl CredentialProvider for CredentialBroker {
    async fn credential(&self, force_refresh: bool) -> Result<GitAuth> {
        let Some(secret_ref) = &self.secret_ref else {
            return Ok(GitAuth::Anonymous);
        };

        let mut state = self.state.lock().await;
        let now = Utc::now();
        if !force_refresh {
            if let Some(cached) = &state.cached {
                if cached.is_valid(now) {
                    return Ok(to_git_auth(&cached.credential));
                }
            }
        }

        if state.breaker.is_open() {
            return Err(Error::auth(format!(
                "credential circuit breaker open for '{secret_ref}'"
            )));
        }

        match self.source.resolve(secret_ref).await {
            Ok(credential) => {
                state.breaker.record_success();
                let auth = to_git_auth(&credential);
                state.cached = Some(Cached { credential });
                Ok(auth)
            }
            Err(e) => {
                warn!(%secret_ref, error = %e, "credential resolution failed, opening circuit breaker");
                state.breaker.record_failure();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        fail_until: usize,
    }

    #[async_trait]
    impl SecretSource for CountingSource {
        async fn resolve(&self, _secret_ref: &str) -> Result<RawCredential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_until {
                Err(Error::transport("token exchange unreachable"))
            } else {
                Ok(RawCredential::Bearer {
                    token: format!("token-{n}"),
                    expires_at: None,
                })
            }
        }
    }

    #[tokio::test]
    async fn no_secret_ref_is_anonymous() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail_until: 0,
        });
        let broker = CredentialBroker::new(source, None);
        assert!(matches!(
            broker.credential(false).await.unwrap(),
            GitAuth::Anonymous
        ));
    }

    #[tokio::test]
    async fn caches_until_force_refresh() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail_until: 0,
        });
        let broker = CredentialBroker::new(source.clone(), Some("ref".into()));
        let first = broker.credential(false).await.unwrap();
        let second = broker.credential(false).await.unwrap();
        assert!(matches!(first, GitAuth::Bearer { token } if token == "token-1"));
        assert!(matches!(second, GitAuth::Bearer { token } if token == "token-1"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let third = broker.credential(true).await.unwrap();
        assert!(matches!(third, GitAuth::Bearer { token } if token == "token-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_on_failure_and_resets_on_success() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail_until: 1,
        });
        let broker = CredentialBroker::new(source, Some("ref".into()));

        assert!(broker.credential(false).await.is_err());
        // Breaker is open immediately after the failure.
        assert!(broker.credential(false).await.is_err());

        tokio::time::advance(Duration::from_secs(6)).await;
        let recovered = broker.credential(false).await.unwrap();
        assert!(matches!(recovered, GitAuth::Bearer { token } if token == "token-2"));
    }
}
