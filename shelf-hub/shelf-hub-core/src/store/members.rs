use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use super::{ts_at, uuid_at, Store};
use crate::access::Permission;
use crate::clock::to_micros;
use crate::error::{HubError, Result};

/// A permission edge between a user and a root shelf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: Uuid,
    pub root_shelf_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub permission: Permission,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store<'_> {
    /// Insert or replace the edge of `user_id` on `root_shelf_id`.
    pub fn grant_permission(
        &self,
        root_shelf_id: Uuid,
        user_id: Uuid,
        permission: Permission,
    ) -> Result<()> {
        let now = to_micros(self.now());
        self.conn()
            .execute(
                "INSERT INTO users_to_shelves (user_id, root_shelf_id, permission, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (user_id, root_shelf_id)
                 DO UPDATE SET permission = excluded.permission, updated_at = excluded.updated_at",
                params![user_id.to_string(), root_shelf_id.to_string(), permission, now],
            )
            .map_err(|e| HubError::FailedToCreate(format!("permission edge: {e}")))?;
        self.oracle().forget(root_shelf_id);
        Ok(())
    }

    pub fn revoke_permission(&self, root_shelf_id: Uuid, user_id: Uuid) -> Result<()> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM users_to_shelves WHERE user_id = ?1 AND root_shelf_id = ?2",
                params![user_id.to_string(), root_shelf_id.to_string()],
            )
            .map_err(|e| HubError::FailedToDelete(format!("permission edge: {e}")))?;
        if removed == 0 {
            return Err(HubError::not_found("Member", user_id));
        }
        self.oracle().forget(root_shelf_id);
        Ok(())
    }

    /// Permission of any user on a root shelf, bypassing the memo.
    pub fn member_permission(&self, root_shelf_id: Uuid, user_id: Uuid) -> Result<Option<Permission>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT permission FROM users_to_shelves WHERE user_id = ?1 AND root_shelf_id = ?2",
                params![user_id.to_string(), root_shelf_id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn list_members(&self, root_shelf_id: Uuid) -> Result<Vec<Member>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT m.user_id, m.root_shelf_id, u.name, u.display_name, m.permission, m.created_at, m.updated_at
             FROM users_to_shelves m JOIN users u ON u.id = m.user_id
             WHERE m.root_shelf_id = ?1
             ORDER BY m.created_at, u.name",
        )?;
        let members = stmt
            .query_map(params![root_shelf_id.to_string()], |row| {
                Ok(Member {
                    user_id: uuid_at(row, 0)?,
                    root_shelf_id: uuid_at(row, 1)?,
                    name: row.get(2)?,
                    display_name: row.get(3)?,
                    permission: row.get(4)?,
                    created_at: ts_at(row, 5)?,
                    updated_at: ts_at(row, 6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }
}
