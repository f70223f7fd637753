//! Transactional hierarchy store on SQLite.
//!
//! ## Tables
//!
//! - `root_shelves` / `users_to_shelves` - shelves and the permission edges on them
//! - `sub_shelves` - folder tree; `path` holds ancestor ids as a JSON array
//! - `block_packs`, `block_groups`, `blocks` - documents and their block trees
//! - `materials` - file-like items attached to sub-shelves
//!
//! Every entity shares the same generic read path through [`Entity`].
//! Liveness is decided on read: a row is live when it and every ancestor
//! up to its root shelf have no `deleted_at`.

pub mod block_groups;
pub mod block_packs;
pub mod blocks;
pub mod materials;
pub mod members;
pub mod root_shelves;
pub mod schema;
pub mod sub_shelves;
pub mod users;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::{AccessOracle, Permission};
use crate::clock::from_micros;
use crate::context::RequestContext;
use crate::error::{HubError, Result};
use crate::limits::{Limits, MAX_BATCH_CREATE_BLOCK_SIZE};

pub use block_groups::BlockGroup;
pub use block_packs::{BlockPack, BlockPackNullable, BlockPackValues, NewBlockPack};
pub use blocks::Block;
pub use materials::{Material, MaterialType, MaterialValues, NewMaterial};
pub use members::Member;
pub use root_shelves::{RootShelf, RootShelfValues};
pub use sub_shelves::{SubShelf, SubShelfValues};
pub use users::{NewUser, User, UserPlan, UserRole, UserStatus};

const POOL_SIZE: u32 = 8;
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// SQLite database shared by every operation.
///
/// Readers each take a pooled connection and run side by side under WAL.
/// Writers also queue on `write_lock`, so they wait on the runtime rather
/// than inside SQLite's busy handler.
pub struct Db {
    pool: Pool<SqliteConnectionManager>,
    write_lock: Mutex<()>,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        info!("opening database at {:?}", path);
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout={BUSY_TIMEOUT_MS};"
            ))?;
            schema::configure_connection(conn)
        });
        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;
        Self::with_pool(pool)
    }

    /// Each in-memory connection is a separate database, so this pool holds
    /// exactly one connection and never recycles it.
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory database");
        let manager =
            SqliteConnectionManager::memory().with_init(|conn| schema::configure_connection(conn));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        Self::with_pool(pool)
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self> {
        schema::init_schema(&*pool.get()?)?;
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    /// Run a read-only closure on a pooled connection.
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.pool.get()?;
        f(&conn)
    }

    /// Run `f` inside an immediate transaction. The transaction is rolled
    /// back when `f` fails or the request is cancelled before commit.
    pub async fn write<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        ctx.ensure_active()?;
        let _writer = self.write_lock.lock().await;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        ctx.ensure_active()?;
        tx.commit().map_err(HubError::FailedToCommitTransaction)?;
        Ok(value)
    }
}

/// Which rows a read may see with respect to soft deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnlyDeleted {
    /// The row itself is soft-deleted.
    Positive,
    /// The row and all of its ancestors are live.
    #[default]
    Negative,
    Either,
}

impl OnlyDeleted {
    fn predicate(self, live_ancestors: &str) -> String {
        match self {
            OnlyDeleted::Positive => "t.deleted_at IS NOT NULL".to_string(),
            OnlyDeleted::Negative => format!("t.deleted_at IS NULL AND {live_ancestors}"),
            OnlyDeleted::Either => "1 = 1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub only_deleted: OnlyDeleted,
    /// Set when the caller has already gated the operation.
    pub skip_permission_check: bool,
    pub batch_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            only_deleted: OnlyDeleted::Negative,
            skip_permission_check: false,
            batch_size: MAX_BATCH_CREATE_BLOCK_SIZE,
        }
    }
}

impl Options {
    pub fn deleted(only_deleted: OnlyDeleted) -> Self {
        Self {
            only_deleted,
            ..Self::default()
        }
    }

    pub fn skipping_permission_check(mut self) -> Self {
        self.skip_permission_check = true;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Partial update: `values` holds fields to set, `set_null` names optional
/// fields to clear. A field may not appear in both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "V: Deserialize<'de>, F: Deserialize<'de> + Ord")
)]
pub struct PartialUpdate<V, F> {
    pub values: V,
    #[serde(default)]
    pub set_null: BTreeSet<F>,
}

/// A hierarchy row with the uniform generic read path.
pub trait Entity: Sized {
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Select list over `t` (the entity) and `rs` (its root shelf).
    const COLUMNS: &'static str;
    /// Joins from `t` up to `rs`.
    const JOINS: &'static str;
    /// Holds when every ancestor of `t` is live.
    const LIVE_ANCESTORS: &'static str;
    /// Permissions required to soft-delete or restore.
    const TRASH_PERMISSIONS: &'static [Permission];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn id(&self) -> Uuid;
    fn root_shelf_id(&self) -> Uuid;
}

pub(crate) fn select_sql<E: Entity>(only_deleted: OnlyDeleted, condition: &str) -> String {
    format!(
        "SELECT {} FROM {} t {} WHERE {} AND {}",
        E::COLUMNS,
        E::TABLE,
        E::JOINS,
        condition,
        only_deleted.predicate(E::LIVE_ANCESTORS)
    )
}

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        Uuid::parse_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(from_micros(row.get(idx)?))
}

pub(crate) fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(from_micros))
}

pub(crate) fn opt_uuid_param(id: Option<Uuid>) -> Option<String> {
    id.map(|id| id.to_string())
}

/// JSON array parameter for `json_each`.
pub(crate) fn ids_param(ids: &[Uuid]) -> String {
    let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    serde_json::Value::from(ids).to_string()
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Typed access to the hierarchy for one acting user inside one
/// connection or transaction.
pub struct Store<'c> {
    conn: &'c Connection,
    user_id: Uuid,
    limits: &'c Limits,
    now: DateTime<Utc>,
    oracle: AccessOracle<'c>,
}

impl<'c> Store<'c> {
    pub fn new(conn: &'c Connection, user_id: Uuid, limits: &'c Limits, now: DateTime<Utc>) -> Self {
        Self {
            conn,
            user_id,
            limits,
            now,
            oracle: AccessOracle::new(conn),
        }
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn limits(&self) -> &'c Limits {
        self.limits
    }

    /// Timestamp shared by every write of the current operation.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn oracle(&self) -> &AccessOracle<'c> {
        &self.oracle
    }

    pub fn capability(&self, root_shelf_id: Uuid) -> Result<Option<Permission>> {
        self.oracle.capability(self.user_id, root_shelf_id)
    }

    pub fn require(&self, root_shelf_id: Uuid, allowed: &[Permission]) -> Result<Permission> {
        self.oracle.require(self.user_id, root_shelf_id, allowed)
    }

    pub fn get_one_by_id<E: Entity>(&self, id: Uuid, only_deleted: OnlyDeleted) -> Result<E> {
        let sql = select_sql::<E>(only_deleted, "t.id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query_map(params![id.to_string()], E::from_row)?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Err(HubError::not_found(E::NAME, id)),
        }
    }

    /// Rows for `ids` in input order; missing ids are skipped.
    pub fn get_many_by_ids<E: Entity>(
        &self,
        ids: &[Uuid],
        only_deleted: OnlyDeleted,
    ) -> Result<Vec<E>> {
        let ids = dedup(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = select_sql::<E>(only_deleted, "t.id IN (SELECT value FROM json_each(?1))");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut found: HashMap<Uuid, E> = stmt
            .query_map(params![ids_param(&ids)], E::from_row)?
            .map(|row| row.map(|e| (e.id(), e)))
            .collect::<rusqlite::Result<_>>()?;
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    pub fn check_permission_and_get_one_by_id<E: Entity>(
        &self,
        id: Uuid,
        allowed: &[Permission],
        opts: &Options,
    ) -> Result<E> {
        let entity: E = self.get_one_by_id(id, opts.only_deleted)?;
        if !opts.skip_permission_check {
            self.require(entity.root_shelf_id(), allowed)?;
        }
        Ok(entity)
    }

    /// Like [`Store::get_many_by_ids`], dropping rows the user may not touch.
    pub fn check_permissions_and_get_many_by_ids<E: Entity>(
        &self,
        ids: &[Uuid],
        allowed: &[Permission],
        opts: &Options,
    ) -> Result<Vec<E>> {
        let entities: Vec<E> = self.get_many_by_ids(ids, opts.only_deleted)?;
        if opts.skip_permission_check {
            return Ok(entities);
        }
        let mut permitted = Vec::with_capacity(entities.len());
        for entity in entities {
            match self.capability(entity.root_shelf_id())? {
                Some(p) if allowed.contains(&p) => permitted.push(entity),
                _ => warn!(
                    entity = E::NAME,
                    id = %entity.id(),
                    user_id = %self.user_id,
                    "dropping item without permission"
                ),
            }
        }
        Ok(permitted)
    }
}
