/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/porch-draft/src/push.rs
 *
 * SPDX-License-Identifier: Apache-2.0
 */

//! Conflict-Safe Push (component G, spec §4.7): a small builder over
//! `porch_core::backend::PushRequest` that keeps the local mirror
//! consistent with whatever actually landed on the remote.

use porch_core::backend::{ObjectId, PushRequest, RefPrecondition, RefUpdate};
use porch_core::error::Result;
use porch_core::refs::RemoteRef;
use porch_git::RepositoryMirror;

/// Accumulates Push/Delete/Require operations, then executes them as one
/// all-or-nothing push (§4.7). Every push and delete here is applied with
/// `Force=true` at the transport layer (`Git2Backend::push`); correctness
/// comes entirely from the `require` preconditions batched alongside them.
#[derive(Debug, Default)]
pub struct PushBuilder {
    updates: Vec<RefUpdate>,
    preconditions: Vec<RefPrecondition>,
}

impl PushBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, target: RemoteRef, new_value: ObjectId) -> Self {
        self.updates.push(RefUpdate {
            target,
            new_value: Some(new_value),
        });
        self
    }

    pub fn delete(mut self, target: RemoteRef) -> Self {
        self.updates.push(RefUpdate {
            target,
            new_value: None,
        });
        self
    }

    pub fn require(mut self, target: RemoteRef, expected: Option<ObjectId>) -> Self {
        self.preconditions.push(RefPrecondition { target, expected });
        self
    }

    /// Executes the push, then reconciles every local ref this push touched
    /// — set for creations/updates, delete for deletions — so a caller
    /// doesn't have to wait for the next periodic fetch to see its own
    /// write (§4.7's trailing local-ref cleanup step).
    pub async fn apply(self, mirror: &RepositoryMirror) -> Result<()> {
        let backend = mirror.backend();
        let request = PushRequest {
            updates: self.updates.clone(),
            preconditions: self.preconditions,
        };
        mirror.push(request).await?;
        for update in &self.updates {
            let local = update.target.to_local();
            match &update.new_value {
                Some(id) => backend.set_local_ref(&local, id).await?,
                None => backend.delete_local_ref(&local).await?,
            }
        }
        Ok(())
    }
}
