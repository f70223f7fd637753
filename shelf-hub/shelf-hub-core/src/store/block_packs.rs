use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    opt_ts_at, select_sql, ts_at, uuid_at, Entity, OnlyDeleted, Options, PartialUpdate, Store,
    SubShelf,
};
use crate::access::{self, Permission};
use crate::clock::to_micros;
use crate::error::{HubError, Result};
use crate::validation::{validate_item_name, validate_length, validate_url};

const MAX_ICON_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPack {
    pub id: Uuid,
    pub parent_sub_shelf_id: Uuid,
    pub root_shelf_id: Uuid,
    pub name: String,
    pub icon: Option<String>,
    pub header_background_url: Option<String>,
    pub block_count: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockPack {
    pub parent_sub_shelf_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub header_background_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPackValues {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub header_background_url: Option<String>,
}

/// Block-pack fields that may be cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockPackNullable {
    Icon,
    HeaderBackgroundUrl,
}

impl Entity for BlockPack {
    const NAME: &'static str = "BlockPack";
    const TABLE: &'static str = "block_packs";
    const COLUMNS: &'static str = "t.id, t.parent_sub_shelf_id, rs.id, t.name, t.icon, \
         t.header_background_url, t.block_count, t.deleted_at, t.created_at, t.updated_at";
    const JOINS: &'static str = "JOIN sub_shelves ps ON ps.id = t.parent_sub_shelf_id \
         JOIN root_shelves rs ON rs.id = ps.root_shelf_id";
    const LIVE_ANCESTORS: &'static str = "rs.deleted_at IS NULL AND ps.deleted_at IS NULL \
         AND NOT EXISTS (SELECT 1 FROM json_each(ps.path) je JOIN sub_shelves anc \
         ON anc.id = je.value WHERE anc.deleted_at IS NOT NULL)";
    const TRASH_PERMISSIONS: &'static [Permission] = access::WRITE;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            parent_sub_shelf_id: uuid_at(row, 1)?,
            root_shelf_id: uuid_at(row, 2)?,
            name: row.get(3)?,
            icon: row.get(4)?,
            header_background_url: row.get(5)?,
            block_count: row.get(6)?,
            deleted_at: opt_ts_at(row, 7)?,
            created_at: ts_at(row, 8)?,
            updated_at: ts_at(row, 9)?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn root_shelf_id(&self) -> Uuid {
        self.root_shelf_id
    }
}

fn validate_icon(icon: &str) -> Result<()> {
    if icon.trim().is_empty() {
        return Err(HubError::InvalidDto("icon must not be blank".into()));
    }
    validate_length("icon", icon, MAX_ICON_LENGTH)
}

impl Store<'_> {
    pub fn create_one_block_pack(&self, input: &NewBlockPack, opts: &Options) -> Result<BlockPack> {
        validate_item_name(&input.name, self.limits().max_item_name_length)?;
        if let Some(icon) = &input.icon {
            validate_icon(icon)?;
        }
        if let Some(url) = &input.header_background_url {
            validate_url("headerBackgroundUrl", url, self.limits().max_url_length)?;
        }
        let parent: SubShelf = self.check_permission_and_get_one_by_id(
            input.parent_sub_shelf_id,
            access::WRITE,
            &Options {
                only_deleted: OnlyDeleted::Negative,
                ..*opts
            },
        )?;

        let id = Uuid::new_v4();
        let now = to_micros(self.now());
        self.conn()
            .execute(
                "INSERT INTO block_packs (id, parent_sub_shelf_id, name, icon, header_background_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id.to_string(),
                    parent.id.to_string(),
                    input.name,
                    input.icon,
                    input.header_background_url,
                    now
                ],
            )
            .map_err(|e| HubError::FailedToCreate(format!("block pack: {e}")))?;
        self.touch_root_shelf(parent.root_shelf_id)?;
        self.get_one_by_id(id, OnlyDeleted::Negative)
    }

    pub fn update_one_block_pack_by_id(
        &self,
        id: Uuid,
        update: &PartialUpdate<BlockPackValues, BlockPackNullable>,
        opts: &Options,
    ) -> Result<BlockPack> {
        let pack: BlockPack = self.check_permission_and_get_one_by_id(id, access::WRITE, opts)?;
        let values = &update.values;
        let clears = |field: BlockPackNullable| update.set_null.contains(&field);
        if (values.icon.is_some() && clears(BlockPackNullable::Icon))
            || (values.header_background_url.is_some() && clears(BlockPackNullable::HeaderBackgroundUrl))
        {
            return Err(HubError::InvalidDto(
                "a field cannot be both set and cleared".into(),
            ));
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();
        if let Some(name) = &values.name {
            validate_item_name(name, self.limits().max_item_name_length)?;
            if *name != pack.name {
                assignments.push("name = ?");
                args.push(SqlValue::Text(name.clone()));
            }
        }
        if let Some(icon) = &values.icon {
            validate_icon(icon)?;
            if pack.icon.as_ref() != Some(icon) {
                assignments.push("icon = ?");
                args.push(SqlValue::Text(icon.clone()));
            }
        } else if clears(BlockPackNullable::Icon) && pack.icon.is_some() {
            assignments.push("icon = NULL");
        }
        if let Some(url) = &values.header_background_url {
            validate_url("headerBackgroundUrl", url, self.limits().max_url_length)?;
            if pack.header_background_url.as_ref() != Some(url) {
                assignments.push("header_background_url = ?");
                args.push(SqlValue::Text(url.clone()));
            }
        } else if clears(BlockPackNullable::HeaderBackgroundUrl) && pack.header_background_url.is_some()
        {
            assignments.push("header_background_url = NULL");
        }

        if assignments.is_empty() {
            return Err(HubError::NoChanges(format!("block pack {id}")));
        }
        assignments.push("updated_at = ?");
        args.push(SqlValue::Integer(to_micros(self.now())));
        args.push(SqlValue::Text(id.to_string()));
        let sql = format!(
            "UPDATE block_packs SET {} WHERE id = ?",
            assignments.join(", ")
        );
        self.conn()
            .execute(&sql, params_from_iter(args))
            .map_err(|e| HubError::FailedToUpdate(format!("block pack: {e}")))?;
        self.get_one_by_id(id, opts.only_deleted)
    }

    /// Live block packs directly inside a sub-shelf.
    pub fn list_block_packs(&self, parent_sub_shelf_id: Uuid) -> Result<Vec<BlockPack>> {
        let sql = format!(
            "{} ORDER BY t.name, t.created_at, t.id",
            select_sql::<BlockPack>(OnlyDeleted::Negative, "t.parent_sub_shelf_id = ?1")
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![parent_sub_shelf_id.to_string()], BlockPack::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn move_block_pack(&self, pack: &BlockPack, destination: &SubShelf) -> Result<()> {
        if pack.parent_sub_shelf_id == destination.id {
            return Err(HubError::NoChanges(format!(
                "block pack {} is already there",
                pack.id
            )));
        }
        self.conn()
            .execute(
                "UPDATE block_packs SET parent_sub_shelf_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    destination.id.to_string(),
                    to_micros(self.now()),
                    pack.id.to_string()
                ],
            )
            .map_err(|e| HubError::FailedToUpdate(format!("block pack: {e}")))?;
        Ok(())
    }

    /// Recount live blocks in live groups of a pack.
    pub fn refresh_block_count(&self, block_pack_id: Uuid) -> Result<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM blocks b JOIN block_groups g ON g.id = b.block_group_id
             WHERE g.block_pack_id = ?1 AND g.deleted_at IS NULL AND b.deleted_at IS NULL",
            params![block_pack_id.to_string()],
            |row| row.get(0),
        )?;
        self.conn().execute(
            "UPDATE block_packs SET block_count = ?1, updated_at = ?2 WHERE id = ?3",
            params![count, to_micros(self.now()), block_pack_id.to_string()],
        )?;
        Ok(count)
    }
}
