//! Public operations. Each one is a single read or write transaction over
//! the store, logged once at this boundary.

mod blocks;
mod materials;
mod shelves;
#[cfg(test)]
mod tests;

pub use blocks::{
    BlockGroupContentInput, BlockGroupWithBlocks, BlockPackWithGroups, IngestReport, SyncReport,
};
pub use shelves::{
    CreatedRootShelf, MoveSubShelfInput, MoveSubShelvesInput, ShareInput, ShelfChildren,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::context::RequestContext;
use crate::error::{HubError, Result};
use crate::limits::Limits;
use crate::store::{Db, NewUser, Store, User};
use crate::trash::TrashListing;

/// Result of a single move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub updated_at: DateTime<Utc>,
}

/// Result of a batch move; `moved_ids` lists only what was moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveManyOutcome {
    pub updated_at: DateTime<Utc>,
    pub moved_ids: Vec<Uuid>,
}

/// Batch move of leaf items into one sub-shelf.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItemsInput {
    pub ids: Vec<Uuid>,
    pub destination_sub_shelf_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdsInput {
    pub ids: Vec<Uuid>,
}

/// Log a failed operation once: client mistakes at warn, the rest at error.
pub(crate) fn logged<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.kind().is_client_error() {
            warn!(operation, kind = %e.kind(), error = %e, "operation rejected");
        } else {
            error!(operation, kind = %e.kind(), error = %e, "operation failed");
        }
    }
    result
}

pub(crate) fn ensure_batch(limits: &Limits, len: usize) -> Result<()> {
    if len == 0 {
        return Err(HubError::InvalidDto("at least one id is required".into()));
    }
    if len > limits.max_batch_size {
        return Err(HubError::InvalidDto(format!(
            "at most {} ids may be processed at once, got {len}",
            limits.max_batch_size
        )));
    }
    Ok(())
}

/// Entry point to every hierarchy operation.
#[derive(Clone)]
pub struct ShelfService {
    db: Arc<Db>,
    limits: Arc<Limits>,
    clock: Arc<dyn Clock>,
}

impl ShelfService {
    pub fn new(db: Arc<Db>, limits: Arc<Limits>, clock: Arc<dyn Clock>) -> Self {
        Self { db, limits, clock }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Run `f` against a store inside one write transaction.
    pub(crate) async fn write<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T>
    where
        F: FnOnce(&Store<'_>) -> Result<T>,
    {
        let now = self.clock.now();
        let limits = &*self.limits;
        let user_id = ctx.user_id;
        self.db
            .write(ctx, |tx| {
                let store = Store::new(tx, user_id, limits, now);
                f(&store)
            })
            .await
    }

    pub(crate) async fn read<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T>
    where
        F: FnOnce(&Store<'_>) -> Result<T>,
    {
        ctx.ensure_active()?;
        let now = self.clock.now();
        let limits = &*self.limits;
        let user_id = ctx.user_id;
        self.db
            .read(|conn| {
                let store = Store::new(conn, user_id, limits, now);
                f(&store)
            })
            .await
    }

    /// Seed a user row. Used by the administrative CLI; no caller identity.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_user(&self, input: &NewUser) -> Result<User> {
        let ctx = RequestContext::new(Uuid::nil());
        let result = self.write(&ctx, |store| store.create_one_user(input)).await;
        logged("create_user", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_me(&self, ctx: &RequestContext) -> Result<User> {
        let result = self
            .read(ctx, |store| store.get_one_user_by_id(store.user_id()))
            .await;
        logged("get_me", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn list_my_trash(&self, ctx: &RequestContext) -> Result<TrashListing> {
        let result = self.read(ctx, |store| store.list_my_trash()).await;
        logged("list_my_trash", result)
    }
}
