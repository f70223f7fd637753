use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{
    ids_param, opt_ts_at, opt_uuid_at, select_sql, ts_at, uuid_at, Entity, OnlyDeleted, Options,
    Store,
};
use crate::access::{self, Permission};
use crate::block::EditorBlock;
use crate::clock::to_micros;
use crate::error::{HubError, Result};
use crate::limits::Limits;
use crate::tree::FlattenedBlock;

/// A stored block row. Props and content stay as JSON text until decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: Uuid,
    pub block_group_id: Uuid,
    pub root_shelf_id: Uuid,
    pub parent_block_id: Option<Uuid>,
    pub kind: String,
    pub props: String,
    pub content: Option<String>,
    pub position: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Block {
    pub fn to_flattened(&self, limits: &Limits) -> Result<FlattenedBlock> {
        Ok(FlattenedBlock {
            id: self.id,
            parent_block_id: self.parent_block_id,
            block: EditorBlock::decode_stored(
                &self.kind,
                &self.props,
                self.content.as_deref(),
                limits,
            )?,
        })
    }
}

impl Entity for Block {
    const NAME: &'static str = "Block";
    const TABLE: &'static str = "blocks";
    const COLUMNS: &'static str = "t.id, t.block_group_id, rs.id, t.parent_block_id, t.type, \
         t.props, t.content, t.position, t.deleted_at, t.created_at, t.updated_at";
    const JOINS: &'static str = "JOIN block_groups bg ON bg.id = t.block_group_id \
         JOIN block_packs bp ON bp.id = bg.block_pack_id \
         JOIN sub_shelves ps ON ps.id = bp.parent_sub_shelf_id \
         JOIN root_shelves rs ON rs.id = ps.root_shelf_id";
    const LIVE_ANCESTORS: &'static str = "rs.deleted_at IS NULL AND ps.deleted_at IS NULL \
         AND bp.deleted_at IS NULL AND bg.deleted_at IS NULL AND NOT EXISTS (\
         SELECT 1 FROM json_each(ps.path) je JOIN sub_shelves anc ON anc.id = je.value \
         WHERE anc.deleted_at IS NOT NULL)";
    const TRASH_PERMISSIONS: &'static [Permission] = access::WRITE;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            block_group_id: uuid_at(row, 1)?,
            root_shelf_id: uuid_at(row, 2)?,
            parent_block_id: opt_uuid_at(row, 3)?,
            kind: row.get(4)?,
            props: row.get(5)?,
            content: row.get(6)?,
            position: row.get(7)?,
            deleted_at: opt_ts_at(row, 8)?,
            created_at: ts_at(row, 9)?,
            updated_at: ts_at(row, 10)?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn root_shelf_id(&self) -> Uuid {
        self.root_shelf_id
    }
}

struct EncodedBlock {
    kind: &'static str,
    props: String,
    content: Option<String>,
}

fn encode(block: &EditorBlock) -> Result<EncodedBlock> {
    Ok(EncodedBlock {
        kind: block.kind.as_str(),
        props: serde_json::to_string(&block.props)?,
        content: block
            .content
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    })
}

/// Outcome of replacing a group's blocks with a client tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSync {
    pub inserted_ids: Vec<Uuid>,
    pub updated_ids: Vec<Uuid>,
    pub deleted_ids: Vec<Uuid>,
}

const BLOCK_COLUMNS: usize = 9;

impl Store<'_> {
    fn ensure_block_ids_unused(&self, block_group_id: Option<Uuid>, ids: &[Uuid]) -> Result<()> {
        let taken: Option<String> = self
            .conn()
            .query_row(
                "SELECT id FROM blocks WHERE id IN (SELECT value FROM json_each(?1))
                 AND block_group_id IS NOT ?2 LIMIT 1",
                params![ids_param(ids), block_group_id.map(|id| id.to_string())],
                |row| row.get(0),
            )
            .optional()?;
        match taken.map(|raw| Uuid::parse_str(&raw)) {
            Some(Ok(id)) => Err(HubError::DuplicateBlockId(id)),
            Some(Err(e)) => Err(HubError::Internal(format!("corrupt block id: {e}"))),
            None => Ok(()),
        }
    }

    /// Insert flattened blocks into a group with multi-row statements of
    /// `opts.batch_size` rows. Ids are returned in input order.
    pub fn create_many_blocks(
        &self,
        block_group_id: Uuid,
        blocks: &[FlattenedBlock],
        opts: &Options,
    ) -> Result<Vec<Uuid>> {
        if blocks.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = blocks.iter().map(|b| b.id).collect();
        self.ensure_block_ids_unused(None, &ids)?;

        let now = to_micros(self.now());
        let group = block_group_id.to_string();
        for (chunk_index, chunk) in blocks.chunks(opts.batch_size.max(1)).enumerate() {
            let placeholders = (0..chunk.len())
                .map(|i| {
                    let base = i * BLOCK_COLUMNS;
                    let slots: Vec<String> =
                        (1..=BLOCK_COLUMNS).map(|c| format!("?{}", base + c)).collect();
                    format!("({})", slots.join(", "))
                })
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO blocks (id, block_group_id, parent_block_id, type, props, content, position, created_at, updated_at)
                 VALUES {placeholders}"
            );
            let mut args: Vec<SqlValue> = Vec::with_capacity(chunk.len() * BLOCK_COLUMNS);
            for (i, record) in chunk.iter().enumerate() {
                let encoded = encode(&record.block)?;
                let position = (chunk_index * opts.batch_size.max(1) + i) as i64;
                args.push(SqlValue::Text(record.id.to_string()));
                args.push(SqlValue::Text(group.clone()));
                args.push(
                    record
                        .parent_block_id
                        .map(|id| SqlValue::Text(id.to_string()))
                        .unwrap_or(SqlValue::Null),
                );
                args.push(SqlValue::Text(encoded.kind.to_string()));
                args.push(SqlValue::Text(encoded.props));
                args.push(encoded.content.map(SqlValue::Text).unwrap_or(SqlValue::Null));
                args.push(SqlValue::Integer(position));
                args.push(SqlValue::Integer(now));
                args.push(SqlValue::Integer(now));
            }
            self.conn()
                .execute(&sql, params_from_iter(args))
                .map_err(|e| HubError::FailedToCreate(format!("blocks: {e}")))?;
        }
        Ok(ids)
    }

    /// Blocks of a group in stored pre-order.
    pub fn list_blocks(&self, block_group_id: Uuid, only_deleted: OnlyDeleted) -> Result<Vec<Block>> {
        let sql = format!(
            "{} ORDER BY t.position, t.id",
            select_sql::<Block>(only_deleted, "t.block_group_id = ?1")
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![block_group_id.to_string()], Block::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Make the stored blocks of a group match `blocks`: upsert what is
    /// present, soft-delete live blocks that are gone.
    pub fn sync_blocks(&self, block_group_id: Uuid, blocks: &[FlattenedBlock]) -> Result<BlockSync> {
        let ids: Vec<Uuid> = blocks.iter().map(|b| b.id).collect();
        self.ensure_block_ids_unused(Some(block_group_id), &ids)?;

        let existing: HashMap<Uuid, Block> = self
            .list_blocks(block_group_id, OnlyDeleted::Either)?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();
        let now = to_micros(self.now());
        let group = block_group_id.to_string();
        let mut outcome = BlockSync::default();

        let mut insert = self.conn().prepare_cached(
            "INSERT INTO blocks (id, block_group_id, parent_block_id, type, props, content, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        )?;
        let mut update = self.conn().prepare_cached(
            "UPDATE blocks SET parent_block_id = ?1, type = ?2, props = ?3, content = ?4,
                 position = ?5, deleted_at = NULL, updated_at = ?6
             WHERE id = ?7",
        )?;
        for (position, record) in blocks.iter().enumerate() {
            let encoded = encode(&record.block)?;
            let parent = record.parent_block_id.map(|id| id.to_string());
            let position = position as i64;
            match existing.get(&record.id) {
                None => {
                    insert
                        .execute(params![
                            record.id.to_string(),
                            group,
                            parent,
                            encoded.kind,
                            encoded.props,
                            encoded.content,
                            position,
                            now
                        ])
                        .map_err(|e| HubError::FailedToCreate(format!("block: {e}")))?;
                    outcome.inserted_ids.push(record.id);
                }
                Some(stored) => {
                    let unchanged = stored.deleted_at.is_none()
                        && stored.parent_block_id == record.parent_block_id
                        && stored.kind == encoded.kind
                        && stored.props == encoded.props
                        && stored.content == encoded.content
                        && stored.position == position;
                    if unchanged {
                        continue;
                    }
                    update
                        .execute(params![
                            parent,
                            encoded.kind,
                            encoded.props,
                            encoded.content,
                            position,
                            now,
                            record.id.to_string()
                        ])
                        .map_err(|e| HubError::FailedToUpdate(format!("block: {e}")))?;
                    outcome.updated_ids.push(record.id);
                }
            }
        }

        let keep: HashSet<Uuid> = ids.into_iter().collect();
        let mut gone: Vec<&Block> = existing
            .values()
            .filter(|b| b.deleted_at.is_none() && !keep.contains(&b.id))
            .collect();
        gone.sort_by_key(|b| b.position);
        outcome.deleted_ids = gone.iter().map(|b| b.id).collect();
        if !outcome.deleted_ids.is_empty() {
            self.conn()
                .execute(
                    "UPDATE blocks SET deleted_at = ?1, updated_at = ?1
                     WHERE id IN (SELECT value FROM json_each(?2))",
                    params![now, ids_param(&outcome.deleted_ids)],
                )
                .map_err(|e| HubError::FailedToDelete(format!("blocks: {e}")))?;
        }
        Ok(outcome)
    }

    /// Encoded size of the live blocks of a group.
    pub fn block_group_bytes(&self, block_group_id: Uuid) -> Result<usize> {
        let bytes: i64 = self.conn().query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(props AS BLOB)) + COALESCE(LENGTH(CAST(content AS BLOB)), 0)), 0)
             FROM blocks WHERE block_group_id = ?1 AND deleted_at IS NULL",
            params![block_group_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(bytes.max(0) as usize)
    }
}
