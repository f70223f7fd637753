use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    opt_ts_at, opt_uuid_at, opt_uuid_param, select_sql, ts_at, uuid_at, Entity, OnlyDeleted,
    Options, RootShelf, Store,
};
use crate::access::{self, Permission};
use crate::clock::to_micros;
use crate::error::{HubError, Result};
use crate::planner::SubShelfMovePlan;
use crate::validation::validate_shelf_name;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubShelf {
    pub id: Uuid,
    pub name: String,
    pub root_shelf_id: Uuid,
    /// Direct parent; `None` when the sub-shelf hangs off the root shelf.
    pub prev_sub_shelf_id: Option<Uuid>,
    /// Ancestor sub-shelf ids from the top down, parent last.
    pub path: Vec<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubShelf {
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Path a direct child of this sub-shelf would have.
    pub fn child_path(&self) -> Vec<Uuid> {
        let mut path = self.path.clone();
        path.push(self.id);
        path
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubShelfValues {
    pub name: Option<String>,
}

impl Entity for SubShelf {
    const NAME: &'static str = "SubShelf";
    const TABLE: &'static str = "sub_shelves";
    const COLUMNS: &'static str = "t.id, t.name, t.root_shelf_id, t.prev_sub_shelf_id, t.path, \
         t.deleted_at, t.created_at, t.updated_at";
    const JOINS: &'static str = "JOIN root_shelves rs ON rs.id = t.root_shelf_id";
    const LIVE_ANCESTORS: &'static str = "rs.deleted_at IS NULL AND NOT EXISTS (\
         SELECT 1 FROM json_each(t.path) je JOIN sub_shelves anc ON anc.id = je.value \
         WHERE anc.deleted_at IS NOT NULL)";
    const TRASH_PERMISSIONS: &'static [Permission] = access::WRITE;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_path: String = row.get(4)?;
        let path = serde_json::from_str(&raw_path)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Ok(Self {
            id: uuid_at(row, 0)?,
            name: row.get(1)?,
            root_shelf_id: uuid_at(row, 2)?,
            prev_sub_shelf_id: opt_uuid_at(row, 3)?,
            path,
            deleted_at: opt_ts_at(row, 5)?,
            created_at: ts_at(row, 6)?,
            updated_at: ts_at(row, 7)?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn root_shelf_id(&self) -> Uuid {
        self.root_shelf_id
    }
}

pub(crate) fn path_param(path: &[Uuid]) -> Result<String> {
    Ok(serde_json::to_string(path)?)
}

impl Store<'_> {
    /// Create a sub-shelf under a live root shelf, optionally below a live parent.
    pub fn create_one_sub_shelf(
        &self,
        root_shelf_id: Uuid,
        prev_sub_shelf_id: Option<Uuid>,
        name: &str,
        opts: &Options,
    ) -> Result<SubShelf> {
        validate_shelf_name(name, self.limits().max_shelf_name_length)?;
        let root: RootShelf =
            self.check_permission_and_get_one_by_id(root_shelf_id, access::WRITE, opts)?;
        let path = match prev_sub_shelf_id {
            Some(parent_id) => {
                let parent: SubShelf = self.get_one_by_id(parent_id, OnlyDeleted::Negative)?;
                if parent.root_shelf_id != root.id {
                    return Err(HubError::InvalidDto(format!(
                        "sub-shelf {parent_id} belongs to another root shelf"
                    )));
                }
                parent.child_path()
            }
            None => Vec::new(),
        };
        let max = self.limits().max_sub_shelves_of_root_shelf;
        if path.len() > max {
            return Err(HubError::MaximumDepthExceeded {
                depth: path.len(),
                max,
            });
        }

        let id = Uuid::new_v4();
        let now = to_micros(self.now());
        self.conn()
            .execute(
                "INSERT INTO sub_shelves (id, name, root_shelf_id, prev_sub_shelf_id, path, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id.to_string(),
                    name,
                    root.id.to_string(),
                    opt_uuid_param(prev_sub_shelf_id),
                    path_param(&path)?,
                    now
                ],
            )
            .map_err(|e| HubError::FailedToCreate(format!("sub-shelf: {e}")))?;
        self.adjust_root_shelf_counters(root.id, 1, 0)?;
        self.get_one_by_id(id, OnlyDeleted::Negative)
    }

    pub fn update_one_sub_shelf_by_id(
        &self,
        id: Uuid,
        values: &SubShelfValues,
        opts: &Options,
    ) -> Result<SubShelf> {
        let shelf: SubShelf = self.check_permission_and_get_one_by_id(id, access::WRITE, opts)?;
        let name = match &values.name {
            Some(name) if *name != shelf.name => name,
            _ => return Err(HubError::NoChanges(format!("sub-shelf {id}"))),
        };
        validate_shelf_name(name, self.limits().max_shelf_name_length)?;
        self.conn()
            .execute(
                "UPDATE sub_shelves SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, to_micros(self.now()), id.to_string()],
            )
            .map_err(|e| HubError::FailedToUpdate(format!("sub-shelf: {e}")))?;
        self.get_one_by_id(id, opts.only_deleted)
    }

    /// Live sub-shelves directly below `parent` (or the root shelf itself).
    pub fn list_sub_shelves(&self, root_shelf_id: Uuid, parent: Option<Uuid>) -> Result<Vec<SubShelf>> {
        let sql = format!(
            "{} ORDER BY t.name, t.created_at, t.id",
            select_sql::<SubShelf>(
                OnlyDeleted::Negative,
                "t.root_shelf_id = ?1 AND t.prev_sub_shelf_id IS ?2",
            )
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt
            .query_map(
                params![root_shelf_id.to_string(), opt_uuid_param(parent)],
                SubShelf::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every sub-shelf below `id`, deleted or not, shallowest first.
    pub fn list_descendant_sub_shelves(&self, id: Uuid) -> Result<Vec<SubShelf>> {
        let sql = format!(
            "{} ORDER BY json_array_length(t.path), t.id",
            select_sql::<SubShelf>(
                OnlyDeleted::Either,
                "EXISTS (SELECT 1 FROM json_each(t.path) WHERE value = ?1)",
            )
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![id.to_string()], SubShelf::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Write a planned move: the source row, every rewritten descendant path,
    /// and, across root shelves, the owning root of everything moved.
    pub fn apply_sub_shelf_move(&self, plan: &SubShelfMovePlan) -> Result<()> {
        let now = to_micros(self.now());
        let root = plan.destination_root_shelf_id.to_string();
        let updated = self
            .conn()
            .execute(
                "UPDATE sub_shelves SET root_shelf_id = ?1, prev_sub_shelf_id = ?2, path = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    root,
                    opt_uuid_param(plan.new_prev_sub_shelf_id),
                    path_param(&plan.new_path)?,
                    now,
                    plan.source_id.to_string()
                ],
            )
            .map_err(|e| HubError::FailedToUpdate(format!("sub-shelf: {e}")))?;
        if updated == 0 {
            return Err(HubError::FailedToUpdate(format!("sub-shelf {}", plan.source_id)));
        }

        let mut stmt = self.conn().prepare_cached(
            "UPDATE sub_shelves SET root_shelf_id = ?1, path = ?2, updated_at = ?3 WHERE id = ?4",
        )?;
        for (descendant, path) in &plan.descendant_paths {
            stmt.execute(params![root, path_param(path)?, now, descendant.to_string()])
                .map_err(|e| HubError::FailedToUpdate(format!("sub-shelf: {e}")))?;
        }

        if plan.crosses_root_shelves() {
            let moved: Vec<Uuid> = std::iter::once(plan.source_id)
                .chain(plan.descendant_paths.iter().map(|(id, _)| *id))
                .collect();
            let materials = self.conn().execute(
                "UPDATE materials SET root_shelf_id = ?1, updated_at = ?2
                 WHERE parent_shelf_id IN (SELECT value FROM json_each(?3))",
                params![root, now, super::ids_param(&moved)],
            )? as i64;
            let nodes = moved.len() as i64;
            self.adjust_root_shelf_counters(plan.source_root_shelf_id, -nodes, -materials)?;
            self.adjust_root_shelf_counters(plan.destination_root_shelf_id, nodes, materials)?;
        } else {
            self.touch_root_shelf(plan.destination_root_shelf_id)?;
        }
        Ok(())
    }
}
