use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{opt_ts_at, ts_at, uuid_at, Entity, Options, Store};
use crate::access::{self, Permission};
use crate::clock::to_micros;
use crate::error::{HubError, Result};
use crate::validation::validate_shelf_name;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootShelf {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub total_shelf_nodes: i64,
    pub total_materials: i64,
    pub last_analyzed_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootShelfValues {
    pub name: Option<String>,
}

impl Entity for RootShelf {
    const NAME: &'static str = "RootShelf";
    const TABLE: &'static str = "root_shelves";
    const COLUMNS: &'static str = "t.id, t.owner_id, t.name, t.total_shelf_nodes, t.total_materials, \
         t.last_analyzed_at, t.deleted_at, t.created_at, t.updated_at";
    const JOINS: &'static str = "JOIN root_shelves rs ON rs.id = t.id";
    const LIVE_ANCESTORS: &'static str = "1 = 1";
    const TRASH_PERMISSIONS: &'static [Permission] = access::OWNER;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            owner_id: uuid_at(row, 1)?,
            name: row.get(2)?,
            total_shelf_nodes: row.get(3)?,
            total_materials: row.get(4)?,
            last_analyzed_at: ts_at(row, 5)?,
            deleted_at: opt_ts_at(row, 6)?,
            created_at: ts_at(row, 7)?,
            updated_at: ts_at(row, 8)?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn root_shelf_id(&self) -> Uuid {
        self.id
    }
}

impl Store<'_> {
    /// Create a root shelf owned by the acting user.
    pub fn create_one_root_shelf(&self, name: &str) -> Result<RootShelf> {
        validate_shelf_name(name, self.limits().max_shelf_name_length)?;
        let id = Uuid::new_v4();
        let now = to_micros(self.now());
        self.conn()
            .execute(
                "INSERT INTO root_shelves (id, owner_id, name, last_analyzed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?4)",
                params![id.to_string(), self.user_id().to_string(), name, now],
            )
            .map_err(|e| HubError::FailedToCreate(format!("root shelf: {e}")))?;
        self.grant_permission(id, self.user_id(), Permission::Owner)?;
        self.get_one_by_id(id, super::OnlyDeleted::Negative)
    }

    pub fn update_one_root_shelf_by_id(
        &self,
        id: Uuid,
        values: &RootShelfValues,
        opts: &Options,
    ) -> Result<RootShelf> {
        let shelf: RootShelf = self.check_permission_and_get_one_by_id(id, access::WRITE, opts)?;
        let name = match &values.name {
            Some(name) if *name != shelf.name => name,
            _ => return Err(HubError::NoChanges(format!("root shelf {id}"))),
        };
        validate_shelf_name(name, self.limits().max_shelf_name_length)?;
        let updated = self
            .conn()
            .execute(
                "UPDATE root_shelves SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, to_micros(self.now()), id.to_string()],
            )
            .map_err(|e| HubError::FailedToUpdate(format!("root shelf: {e}")))?;
        if updated == 0 {
            return Err(HubError::FailedToUpdate(format!("root shelf {id}")));
        }
        self.get_one_by_id(id, opts.only_deleted)
    }

    /// Shift the node and material counters of a root shelf.
    pub fn adjust_root_shelf_counters(
        &self,
        id: Uuid,
        shelf_nodes: i64,
        materials: i64,
    ) -> Result<()> {
        if shelf_nodes == 0 && materials == 0 {
            return Ok(());
        }
        self.conn().execute(
            "UPDATE root_shelves
             SET total_shelf_nodes = MAX(total_shelf_nodes + ?1, 0),
                 total_materials = MAX(total_materials + ?2, 0),
                 updated_at = ?3
             WHERE id = ?4",
            params![shelf_nodes, materials, to_micros(self.now()), id.to_string()],
        )?;
        Ok(())
    }

    /// Bump `updated_at` of a root shelf after a change below it.
    pub fn touch_root_shelf(&self, id: Uuid) -> Result<()> {
        self.conn().execute(
            "UPDATE root_shelves SET updated_at = ?1 WHERE id = ?2",
            params![to_micros(self.now()), id.to_string()],
        )?;
        Ok(())
    }
}
