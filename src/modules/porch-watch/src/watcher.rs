/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-watch/src/watcher.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Watcher Fan-Out (component H, spec §4.8): list-then-watch over Package
//! Discovery, fed by `RepositoryMirror`'s change notifier. Grounded on
//! `phgit_operator/src/main.rs`'s `Controller::run().for_each` event loop —
//! here the notifier is a plain `tokio::sync::broadcast` channel rather than
//! a `kube` watch, but the shape (subscribe, reconcile once per signal) is
//! the same.

use porch_core::model::{Filter, PackageRevision, PackageRevisionId, Repository};
use porch_core::watch::WatchEvent;
use porch_discovery::discover;
use porch_git::RepositoryMirror;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::warn;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A live subscription returned by `watch`. Dropping it without calling
/// `stop` is fine — the background task notices the receiver is gone the
/// next time it tries to send and exits.
pub struct Subscription {
    events: mpsc::Receiver<WatchEvent>,
    stop: Arc<Notify>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Requests the background task end the subscription (§4.8 step 5,
    /// "context cancellation"). Idempotent; safe to call more than once.
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

/// Starts a watch over `repo`'s package revisions matching `filter`,
/// spawning the fan-out loop as a background task.
pub fn watch(mirror: Arc<RepositoryMirror>, repo: Repository, filter: Filter) -> Subscription {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let stop = Arc::new(Notify::new());
    let task_stop = stop.clone();
    tokio::spawn(run(mirror, repo, filter, tx, task_stop));
    Subscription { events: rx, stop }
}

async fn run(
    mirror: Arc<RepositoryMirror>,
    repo: Repository,
    filter: Filter,
    tx: mpsc::Sender<WatchEvent>,
    stop: Arc<Notify>,
) {
    // Step 1: subscribe *before* the initial list, so anything that changes
    // while we're listing lands in our backlog instead of being missed.
    let mut changes = mirror.subscribe_changes();
    let mut known: HashMap<PackageRevisionId, PackageRevision> = HashMap::new();

    // Step 2: filtered initial list, emitting Added for every match.
    if sync_once(&mirror, &repo, &filter, &tx, &mut known).await.is_err() {
        return;
    }

    // Steps 3-4: drain whatever piled up on the backlog during the list,
    // re-diffing once per signal until a pass finds the channel empty.
    loop {
        match changes.try_recv() {
            Ok(()) => {
                if sync_once(&mirror, &repo, &filter, &tx, &mut known).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::TryRecvError::Empty) => break,
            Err(broadcast::error::TryRecvError::Lagged(_)) => {
                warn!("watch backlog lagged during drain, resyncing via full diff");
                continue;
            }
            Err(broadcast::error::TryRecvError::Closed) => return,
        }
    }

    // Step 4 (streaming mode): one recompute per subsequent signal, until
    // stopped or the mirror's notifier goes away.
    loop {
        tokio::select! {
            _ = stop.notified() => return,
            recvd = changes.recv() => match recvd {
                Ok(()) => {
                    if sync_once(&mirror, &repo, &filter, &tx, &mut known).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    warn!("watch stream lagged, resyncing via full diff");
                    if sync_once(&mirror, &repo, &filter, &tx, &mut known).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

/// One list+diff pass, shared by the initial list and every subsequent
/// redraw: discovers the current revision set, diffs it against `known`,
/// and emits Added/Modified/Deleted for whatever moved. Returns `Err` once
/// discovery fails or the subscriber is gone, at which point the caller
/// should stop driving the loop.
async fn sync_once(
    mirror: &RepositoryMirror,
    repo: &Repository,
    filter: &Filter,
    tx: &mpsc::Sender<WatchEvent>,
    known: &mut HashMap<PackageRevisionId, PackageRevision>,
) -> std::result::Result<(), ()> {
    let current = match discover(mirror, repo).await {
        Ok(revisions) => revisions,
        Err(e) => {
            let _ = tx.send(WatchEvent::Error(e.to_string())).await;
            return Err(());
        }
    };

    let mut seen = HashSet::new();
    for rev in current.into_iter().filter(|r| filter.matches(r)) {
        seen.insert(rev.id.clone());
        match known.get(&rev.id) {
            None => {
                known.insert(rev.id.clone(), rev.clone());
                tx.send(WatchEvent::Added(rev)).await.map_err(|_| ())?;
            }
            Some(previous)
                if previous.commit_hash != rev.commit_hash || previous.tree_hash != rev.tree_hash =>
            {
                known.insert(rev.id.clone(), rev.clone());
                tx.send(WatchEvent::Modified(rev)).await.map_err(|_| ())?;
            }
            Some(_) => {}
        }
    }

    let removed: Vec<PackageRevisionId> =
        known.keys().filter(|id| !seen.contains(*id)).cloned().collect();
    for id in removed {
        if let Some(rev) = known.remove(&id) {
            tx.send(WatchEvent::Deleted(rev)).await.map_err(|_| ())?;
        }
    }
    Ok(())
}

