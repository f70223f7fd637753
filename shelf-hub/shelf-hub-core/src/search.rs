//! Keyset pagination over live root shelves and materials.
//!
//! A cursor carries every sort key of the row it was issued for, so the next
//! page starts strictly after that row whatever the chosen ordering.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use crate::clock::to_micros;
use crate::error::{HubError, Result};
use crate::store::{schema, select_sql, Entity, Material, OnlyDeleted, RootShelf, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    Name,
    #[default]
    LastUpdate,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchInput {
    pub query: Option<String>,
    pub after: Option<String>,
    pub first: Option<usize>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CursorFields {
    pub id: Uuid,
    pub name: String,
    /// Microseconds since the epoch.
    pub updated_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchCursor {
    pub fields: CursorFields,
}

impl SearchCursor {
    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| HubError::FailedToUnmarshalSearchCursor(e.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| HubError::FailedToUnmarshalSearchCursor(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEdge<T> {
    pub encoded_search_cursor: String,
    pub node: T,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_encoded_search_cursor: Option<String>,
    pub end_encoded_search_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConnection<T> {
    pub search_edges: Vec<SearchEdge<T>>,
    pub search_page_info: SearchPageInfo,
    pub total_count: usize,
    /// Milliseconds spent serving the page.
    pub search_time: f64,
}

/// Entities with a name and timestamps that can be paged through.
pub trait Searchable: Entity {
    fn cursor_fields(&self) -> CursorFields;
}

impl Searchable for RootShelf {
    fn cursor_fields(&self) -> CursorFields {
        CursorFields {
            id: self.id,
            name: self.name.clone(),
            updated_at: to_micros(self.updated_at),
            created_at: to_micros(self.created_at),
        }
    }
}

impl Searchable for Material {
    fn cursor_fields(&self) -> CursorFields {
        CursorFields {
            id: self.id,
            name: self.name.clone(),
            updated_at: to_micros(self.updated_at),
            created_at: to_micros(self.created_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Name,
    UpdatedAt,
    CreatedAt,
    Id,
}

impl Key {
    fn column(self) -> &'static str {
        match self {
            Key::Name => "t.name",
            Key::UpdatedAt => "t.updated_at",
            Key::CreatedAt => "t.created_at",
            Key::Id => "t.id",
        }
    }

    fn value(self, fields: &CursorFields) -> SqlValue {
        match self {
            Key::Name => SqlValue::Text(fields.name.clone()),
            Key::UpdatedAt => SqlValue::Integer(fields.updated_at),
            Key::CreatedAt => SqlValue::Integer(fields.created_at),
            Key::Id => SqlValue::Text(fields.id.to_string()),
        }
    }
}

/// Total order for a sort: the primary key, the other two, then id.
fn sort_keys(sort_by: SortBy) -> [Key; 4] {
    match sort_by {
        SortBy::Name => [Key::Name, Key::UpdatedAt, Key::CreatedAt, Key::Id],
        SortBy::LastUpdate => [Key::UpdatedAt, Key::Name, Key::CreatedAt, Key::Id],
        SortBy::CreatedAt => [Key::CreatedAt, Key::Name, Key::UpdatedAt, Key::Id],
    }
}

/// `LIKE` pattern matching `query` anywhere, with wildcards escaped.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Store<'_> {
    fn search<E: Searchable>(&self, input: &SearchInput) -> Result<SearchConnection<E>> {
        let started = Instant::now();
        let after = input.after.as_deref().map(SearchCursor::decode).transpose()?;
        let limit = self.limits().search_limit(input.first);
        let keys = sort_keys(input.sort_by);
        let (direction, comparison) = match input.sort_order {
            SortOrder::Asc => ("ASC", ">"),
            SortOrder::Desc => ("DESC", "<"),
        };

        let mut args = vec![SqlValue::Text(self.user_id().to_string())];
        let mut condition = String::from(
            "EXISTS (SELECT 1 FROM users_to_shelves m WHERE m.root_shelf_id = rs.id AND m.user_id = ?)",
        );
        if let Some(query) = input.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            condition.push_str(&format!(" AND {}(t.name) LIKE ? ESCAPE '\\'", schema::FOLD_CASE));
            args.push(SqlValue::Text(like_pattern(query)));
        }
        let columns: Vec<&str> = keys.iter().map(|k| k.column()).collect();
        if let Some(cursor) = &after {
            condition.push_str(&format!(
                " AND ({}) {comparison} (?, ?, ?, ?)",
                columns.join(", ")
            ));
            args.extend(keys.iter().map(|k| k.value(&cursor.fields)));
        }
        let order = columns
            .iter()
            .map(|c| format!("{c} {direction}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{} ORDER BY {order} LIMIT ?",
            select_sql::<E>(OnlyDeleted::Negative, &condition)
        );
        args.push(SqlValue::Integer((limit + 1) as i64));

        let mut stmt = self.conn().prepare(&sql)?;
        let mut rows = stmt
            .query_map(params_from_iter(args), E::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let has_next_page = rows.len() > limit;
        rows.truncate(limit);

        let search_edges = rows
            .into_iter()
            .map(|node| {
                let cursor = SearchCursor {
                    fields: node.cursor_fields(),
                };
                Ok(SearchEdge {
                    encoded_search_cursor: cursor.encode()?,
                    node,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let search_page_info = SearchPageInfo {
            has_next_page,
            has_previous_page: after.is_some(),
            start_encoded_search_cursor: search_edges
                .first()
                .map(|e| e.encoded_search_cursor.clone()),
            end_encoded_search_cursor: search_edges
                .last()
                .map(|e| e.encoded_search_cursor.clone()),
        };
        Ok(SearchConnection {
            total_count: search_edges.len(),
            search_edges,
            search_page_info,
            search_time: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Live root shelves the caller is a member of.
    pub fn search_recent_root_shelves(&self, input: &SearchInput) -> Result<SearchConnection<RootShelf>> {
        self.search(input)
    }

    /// Live materials under root shelves the caller is a member of.
    pub fn search_my_materials(&self, input: &SearchInput) -> Result<SearchConnection<Material>> {
        self.search(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;
    use crate::store::{schema, NewUser};
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use rusqlite::Connection;

    fn seeded(names: &[&str]) -> (Connection, Uuid) {
        let conn = Connection::open_in_memory().unwrap();
        schema::configure_connection(&conn).unwrap();
        schema::init_schema(&conn).unwrap();
        let limits = Limits::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let user = Store::new(&conn, Uuid::nil(), &limits, start)
            .create_one_user(&NewUser {
                name: "u".into(),
                display_name: "U".into(),
                email: "u@example.com".into(),
                ..Default::default()
            })
            .unwrap()
            .id;
        for (i, name) in names.iter().enumerate() {
            let store = Store::new(&conn, user, &limits, start + Duration::seconds(i as i64));
            store.create_one_root_shelf(name).unwrap();
        }
        (conn, user)
    }

    fn names<T: Searchable>(page: &SearchConnection<T>) -> Vec<String> {
        page.search_edges
            .iter()
            .map(|e| e.node.cursor_fields().name)
            .collect()
    }

    #[test]
    fn pages_follow_cursors_without_gaps() {
        let (conn, user) = seeded(&["a", "b", "c", "d", "e"]);
        let limits = Limits::default();
        let store = Store::new(&conn, user, &limits, Utc::now());
        let mut input = SearchInput {
            first: Some(2),
            sort_by: SortBy::Name,
            sort_order: SortOrder::Asc,
            ..Default::default()
        };
        let mut seen = Vec::new();
        loop {
            let page = store.search_recent_root_shelves(&input).unwrap();
            assert_eq!(page.search_page_info.has_previous_page, input.after.is_some());
            seen.extend(names(&page));
            if !page.search_page_info.has_next_page {
                break;
            }
            input.after = page.search_page_info.end_encoded_search_cursor.clone();
        }
        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn recent_first_by_default_and_query_filters() {
        let (conn, user) = seeded(&["Physics", "Maths", "physics notes"]);
        let limits = Limits::default();
        let store = Store::new(&conn, user, &limits, Utc::now());
        let all = store
            .search_recent_root_shelves(&SearchInput::default())
            .unwrap();
        assert_eq!(names(&all), vec!["physics notes", "Maths", "Physics"]);

        let filtered = store
            .search_recent_root_shelves(&SearchInput {
                query: Some("  PHYS ".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(filtered.total_count, 2);

        let wildcard = store
            .search_recent_root_shelves(&SearchInput {
                query: Some("%".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(wildcard.total_count, 0);
    }

    #[test]
    fn query_folds_case_beyond_ascii() {
        let (conn, user) = seeded(&["Économie", "ÉCOLE", "Physics"]);
        let limits = Limits::default();
        let store = Store::new(&conn, user, &limits, Utc::now());
        let search = |query: &str| {
            store
                .search_recent_root_shelves(&SearchInput {
                    query: Some(query.into()),
                    ..Default::default()
                })
                .unwrap()
        };
        assert_eq!(names(&search("économie")), vec!["Économie"]);
        assert_eq!(names(&search("éco")), vec!["ÉCOLE", "Économie"]);
    }

    #[test]
    fn members_only() {
        let (conn, _) = seeded(&["mine"]);
        let limits = Limits::default();
        let stranger = Store::new(&conn, Uuid::new_v4(), &limits, Utc::now());
        let page = stranger
            .search_recent_root_shelves(&SearchInput::default())
            .unwrap();
        assert!(page.search_edges.is_empty());
        assert!(!page.search_page_info.has_next_page);
    }

    #[test]
    fn malformed_cursors_are_rejected() {
        let bad_cursors = vec![
            "not base64!".to_string(),
            STANDARD.encode(b"{}"),
            STANDARD.encode(br#"{"fields":{"id":"x"}}"#),
            STANDARD.encode(
                br#"{"fields":{"id":"00000000-0000-0000-0000-000000000000","name":"n","updatedAt":1,"createdAt":1},"extra":1}"#,
            ),
        ];
        for bad in &bad_cursors {
            assert!(matches!(
                SearchCursor::decode(bad),
                Err(HubError::FailedToUnmarshalSearchCursor(_))
            ));
        }
    }

    proptest! {
        #[test]
        fn cursor_round_trip(name in ".{0,40}", updated in any::<i64>(), created in any::<i64>(), raw in any::<u128>()) {
            let cursor = SearchCursor {
                fields: CursorFields {
                    id: Uuid::from_u128(raw),
                    name,
                    updated_at: updated,
                    created_at: created,
                },
            };
            let encoded = cursor.encode().unwrap();
            prop_assert_eq!(SearchCursor::decode(&encoded).unwrap(), cursor);
        }
    }
}
