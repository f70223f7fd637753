use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::users::text_enum;
use super::{opt_ts_at, select_sql, ts_at, uuid_at, Entity, OnlyDeleted, Options, Store, SubShelf};
use crate::access::{self, Permission};
use crate::clock::to_micros;
use crate::error::{HubError, Result};
use crate::validation::{validate_item_name, validate_length, validate_url};

const MAX_CONTENT_TYPE_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialType {
    #[default]
    Textbook,
    Notebook,
}
text_enum!(MaterialType { Textbook => "Textbook", Notebook => "Notebook" });

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: Uuid,
    pub root_shelf_id: Uuid,
    pub parent_sub_shelf_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MaterialType,
    pub content_url: String,
    pub content_type: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMaterial {
    pub parent_sub_shelf_id: Uuid,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: MaterialType,
    pub content_url: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialValues {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<MaterialType>,
    pub content_url: Option<String>,
    pub content_type: Option<String>,
}

impl Entity for Material {
    const NAME: &'static str = "Material";
    const TABLE: &'static str = "materials";
    const COLUMNS: &'static str = "t.id, rs.id, t.parent_shelf_id, t.name, t.type, t.content_url, \
         t.content_type, t.deleted_at, t.created_at, t.updated_at";
    const JOINS: &'static str = "JOIN sub_shelves ps ON ps.id = t.parent_shelf_id \
         JOIN root_shelves rs ON rs.id = t.root_shelf_id";
    const LIVE_ANCESTORS: &'static str = "rs.deleted_at IS NULL AND ps.deleted_at IS NULL \
         AND NOT EXISTS (SELECT 1 FROM json_each(ps.path) je JOIN sub_shelves anc \
         ON anc.id = je.value WHERE anc.deleted_at IS NOT NULL)";
    const TRASH_PERMISSIONS: &'static [Permission] = access::WRITE;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            root_shelf_id: uuid_at(row, 1)?,
            parent_sub_shelf_id: uuid_at(row, 2)?,
            name: row.get(3)?,
            kind: row.get(4)?,
            content_url: row.get(5)?,
            content_type: row.get(6)?,
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

fn validate_content_type(content_type: &str) -> Result<()> {
    if content_type.trim().is_empty() {
        return Err(HubError::InvalidDto("contentType must not be blank".into()));
    }
    validate_length("contentType", content_type, MAX_CONTENT_TYPE_LENGTH)
}

impl Store<'_> {
    pub fn create_one_material(&self, input: &NewMaterial, opts: &Options) -> Result<Material> {
        validate_item_name(&input.name, self.limits().max_item_name_length)?;
        validate_url("contentUrl", &input.content_url, self.limits().max_url_length)?;
        validate_content_type(&input.content_type)?;
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
                "INSERT INTO materials (id, root_shelf_id, parent_shelf_id, name, type, content_url, content_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id.to_string(),
                    parent.root_shelf_id.to_string(),
                    parent.id.to_string(),
                    input.name,
                    input.kind,
                    input.content_url,
                    input.content_type,
                    now
                ],
            )
            .map_err(|e| HubError::FailedToCreate(format!("material: {e}")))?;
        self.adjust_root_shelf_counters(parent.root_shelf_id, 0, 1)?;
        self.get_one_by_id(id, OnlyDeleted::Negative)
    }

    pub fn update_one_material_by_id(
        &self,
        id: Uuid,
        values: &MaterialValues,
        opts: &Options,
    ) -> Result<Material> {
        let material: Material = self.check_permission_and_get_one_by_id(id, access::WRITE, opts)?;
        let mut assignments: Vec<&str> = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();
        if let Some(name) = &values.name {
            validate_item_name(name, self.limits().max_item_name_length)?;
            if *name != material.name {
                assignments.push("name = ?");
                args.push(SqlValue::Text(name.clone()));
            }
        }
        if let Some(kind) = values.kind {
            if kind != material.kind {
                assignments.push("type = ?");
                args.push(SqlValue::Text(kind.as_str().to_string()));
            }
        }
        if let Some(url) = &values.content_url {
            validate_url("contentUrl", url, self.limits().max_url_length)?;
            if *url != material.content_url {
                assignments.push("content_url = ?");
                args.push(SqlValue::Text(url.clone()));
            }
        }
        if let Some(content_type) = &values.content_type {
            validate_content_type(content_type)?;
            if *content_type != material.content_type {
                assignments.push("content_type = ?");
                args.push(SqlValue::Text(content_type.clone()));
            }
        }
        if assignments.is_empty() {
            return Err(HubError::NoChanges(format!("material {id}")));
        }
        assignments.push("updated_at = ?");
        args.push(SqlValue::Integer(to_micros(self.now())));
        args.push(SqlValue::Text(id.to_string()));
        let sql = format!("UPDATE materials SET {} WHERE id = ?", assignments.join(", "));
        self.conn()
            .execute(&sql, params_from_iter(args))
            .map_err(|e| HubError::FailedToUpdate(format!("material: {e}")))?;
        self.get_one_by_id(id, opts.only_deleted)
    }

    /// Live materials directly inside a sub-shelf.
    pub fn list_materials(&self, parent_sub_shelf_id: Uuid) -> Result<Vec<Material>> {
        let sql = format!(
            "{} ORDER BY t.name, t.created_at, t.id",
            select_sql::<Material>(OnlyDeleted::Negative, "t.parent_shelf_id = ?1")
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![parent_sub_shelf_id.to_string()], Material::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Re-parent a material, following its new sub-shelf into another root if needed.
    pub fn move_material(&self, material: &Material, destination: &SubShelf) -> Result<()> {
        if material.parent_sub_shelf_id == destination.id {
            return Err(HubError::NoChanges(format!(
                "material {} is already there",
                material.id
            )));
        }
        self.conn()
            .execute(
                "UPDATE materials SET parent_shelf_id = ?1, root_shelf_id = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    destination.id.to_string(),
                    destination.root_shelf_id.to_string(),
                    to_micros(self.now()),
                    material.id.to_string()
                ],
            )
            .map_err(|e| HubError::FailedToUpdate(format!("material: {e}")))?;
        if material.root_shelf_id != destination.root_shelf_id {
            self.adjust_root_shelf_counters(material.root_shelf_id, 0, -1)?;
            self.adjust_root_shelf_counters(destination.root_shelf_id, 0, 1)?;
        } else {
            self.touch_root_shelf(destination.root_shelf_id)?;
        }
        Ok(())
    }
}
