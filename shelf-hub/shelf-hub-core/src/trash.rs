//! Soft delete and restore.
//!
//! Only the named row is stamped or cleared. Descendants drop out of live
//! reads through the ancestor filter of each entity, and stay hidden after
//! an ancestor is restored unless they were never deleted themselves.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::to_micros;
use crate::error::{HubError, Result};
use crate::store::{
    ids_param, select_sql, BlockGroup, BlockPack, Entity, Material, OnlyDeleted, Options,
    RootShelf, Store, SubShelf,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashOutcome {
    pub affected_ids: Vec<Uuid>,
    pub updated_at: DateTime<Utc>,
}

/// Soft-deleted items the caller can still see through a membership edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashListing {
    pub root_shelves: Vec<RootShelf>,
    pub sub_shelves: Vec<SubShelf>,
    pub block_packs: Vec<BlockPack>,
    pub block_groups: Vec<BlockGroup>,
    pub materials: Vec<Material>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Delete,
    Restore,
}

impl Direction {
    /// Rows a direction may act on.
    fn source(self) -> OnlyDeleted {
        match self {
            Direction::Delete => OnlyDeleted::Negative,
            Direction::Restore => OnlyDeleted::Positive,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Direction::Delete => "soft-delete",
            Direction::Restore => "restore",
        }
    }
}

impl Store<'_> {
    fn stamp<E: Entity>(&self, ids: &[Uuid], direction: Direction) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = to_micros(self.now());
        let deleted_at = match direction {
            Direction::Delete => Some(now),
            Direction::Restore => None,
        };
        let sql = format!(
            "UPDATE {} SET deleted_at = ?1, updated_at = ?2 WHERE id IN (SELECT value FROM json_each(?3))",
            E::TABLE
        );
        self.conn()
            .execute(&sql, params![deleted_at, now, ids_param(ids)])
            .map_err(|e| match direction {
                Direction::Delete => HubError::FailedToDelete(format!("{}: {e}", E::NAME)),
                Direction::Restore => HubError::FailedToUpdate(format!("{}: {e}", E::NAME)),
            })?;
        Ok(())
    }

    fn trash_one<E: Entity>(&self, id: Uuid, direction: Direction) -> Result<E> {
        let entity: E = self.check_permission_and_get_one_by_id(
            id,
            E::TRASH_PERMISSIONS,
            &Options::deleted(direction.source()),
        )?;
        self.stamp::<E>(&[id], direction)?;
        debug!(entity = E::NAME, %id, "{} one", direction.verb());
        self.get_one_by_id(id, OnlyDeleted::Either)
    }

    fn trash_many<E: Entity>(&self, ids: &[Uuid], direction: Direction) -> Result<TrashOutcome> {
        let max = self.limits().max_batch_size;
        if ids.len() > max {
            return Err(HubError::InvalidDto(format!(
                "at most {max} ids may be processed at once, got {}",
                ids.len()
            )));
        }
        let permitted: Vec<E> = self.check_permissions_and_get_many_by_ids(
            ids,
            E::TRASH_PERMISSIONS,
            &Options::deleted(direction.source()),
        )?;
        let affected_ids: Vec<Uuid> = permitted.iter().map(Entity::id).collect();
        let kept: HashSet<Uuid> = affected_ids.iter().copied().collect();
        for id in ids.iter().filter(|id| !kept.contains(id)) {
            warn!(
                entity = E::NAME,
                %id,
                user_id = %self.user_id(),
                "skipping {}: not found, not permitted or already in that state",
                direction.verb()
            );
        }
        self.stamp::<E>(&affected_ids, direction)?;
        Ok(TrashOutcome {
            affected_ids,
            updated_at: self.now(),
        })
    }

    pub fn soft_delete_one_by_id<E: Entity>(&self, id: Uuid) -> Result<E> {
        self.trash_one(id, Direction::Delete)
    }

    /// Soft-delete what may be deleted among `ids`, skipping the rest.
    pub fn soft_delete_many_by_ids<E: Entity>(&self, ids: &[Uuid]) -> Result<TrashOutcome> {
        self.trash_many::<E>(ids, Direction::Delete)
    }

    pub fn restore_soft_deleted_one_by_id<E: Entity>(&self, id: Uuid) -> Result<E> {
        self.trash_one(id, Direction::Restore)
    }

    pub fn restore_soft_deleted_many_by_ids<E: Entity>(&self, ids: &[Uuid]) -> Result<TrashOutcome> {
        self.trash_many::<E>(ids, Direction::Restore)
    }

    fn trashed<E: Entity>(&self) -> Result<Vec<E>> {
        let sql = format!(
            "{} ORDER BY t.deleted_at DESC, t.id",
            select_sql::<E>(
                OnlyDeleted::Positive,
                "EXISTS (SELECT 1 FROM users_to_shelves m WHERE m.root_shelf_id = rs.id AND m.user_id = ?1)",
            )
        );
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![self.user_id().to_string()], E::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_my_trash(&self) -> Result<TrashListing> {
        Ok(TrashListing {
            root_shelves: self.trashed()?,
            sub_shelves: self.trashed()?,
            block_packs: self.trashed()?,
            block_groups: self.trashed()?,
            materials: self.trashed()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Permission;
    use crate::limits::Limits;
    use crate::store::{schema, NewUser};
    use rusqlite::Connection;

    fn setup() -> (Connection, Limits) {
        let conn = Connection::open_in_memory().unwrap();
        schema::configure_connection(&conn).unwrap();
        schema::init_schema(&conn).unwrap();
        (conn, Limits::default())
    }

    fn user(conn: &Connection, limits: &Limits, name: &str) -> Uuid {
        let store = Store::new(conn, Uuid::nil(), limits, Utc::now());
        store
            .create_one_user(&NewUser {
                name: name.into(),
                display_name: name.into(),
                email: format!("{name}@example.com"),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    #[test]
    fn deleting_a_root_hides_the_subtree_and_restore_does_not_cascade() {
        let (conn, limits) = setup();
        let owner = user(&conn, &limits, "owner");
        let store = Store::new(&conn, owner, &limits, Utc::now());
        let root = store.create_one_root_shelf("Notes").unwrap();
        let s1 = store
            .create_one_sub_shelf(root.id, None, "S1", &Options::default())
            .unwrap();
        let s2 = store
            .create_one_sub_shelf(root.id, Some(s1.id), "S2", &Options::default())
            .unwrap();

        store.soft_delete_one_by_id::<SubShelf>(s1.id).unwrap();
        assert!(store
            .get_one_by_id::<SubShelf>(s2.id, OnlyDeleted::Negative)
            .is_err());

        store.soft_delete_one_by_id::<RootShelf>(root.id).unwrap();
        assert!(store.list_sub_shelves(root.id, None).unwrap().is_empty());

        store
            .restore_soft_deleted_one_by_id::<RootShelf>(root.id)
            .unwrap();
        assert!(store
            .get_one_by_id::<RootShelf>(root.id, OnlyDeleted::Negative)
            .is_ok());
        assert!(store.list_sub_shelves(root.id, None).unwrap().is_empty());

        store.restore_soft_deleted_one_by_id::<SubShelf>(s1.id).unwrap();
        assert_eq!(store.list_sub_shelves(root.id, None).unwrap().len(), 1);
        assert!(store
            .get_one_by_id::<SubShelf>(s2.id, OnlyDeleted::Negative)
            .is_ok());
    }

    #[test]
    fn batch_delete_skips_what_it_cannot_touch() {
        let (conn, limits) = setup();
        let owner = user(&conn, &limits, "owner");
        let other = user(&conn, &limits, "other");
        let mine = Store::new(&conn, owner, &limits, Utc::now());
        let root = mine.create_one_root_shelf("Mine").unwrap();
        let a = mine
            .create_one_sub_shelf(root.id, None, "A", &Options::default())
            .unwrap();
        let theirs = Store::new(&conn, other, &limits, Utc::now());
        let foreign_root = theirs.create_one_root_shelf("Theirs").unwrap();
        let foreign = theirs
            .create_one_sub_shelf(foreign_root.id, None, "F", &Options::default())
            .unwrap();

        let outcome = mine
            .soft_delete_many_by_ids::<SubShelf>(&[a.id, foreign.id, Uuid::new_v4()])
            .unwrap();
        assert_eq!(outcome.affected_ids, vec![a.id]);

        let again = mine.soft_delete_many_by_ids::<SubShelf>(&[a.id]).unwrap();
        assert!(again.affected_ids.is_empty());

        let trash = mine.list_my_trash().unwrap();
        assert_eq!(trash.sub_shelves.len(), 1);
        assert!(theirs.list_my_trash().unwrap().sub_shelves.is_empty());
    }

    #[test]
    fn root_shelf_trash_requires_ownership() {
        let (conn, limits) = setup();
        let owner = user(&conn, &limits, "owner");
        let writer = user(&conn, &limits, "writer");
        let store = Store::new(&conn, owner, &limits, Utc::now());
        let root = store.create_one_root_shelf("Shared").unwrap();
        store
            .grant_permission(root.id, writer, Permission::Write)
            .unwrap();

        let as_writer = Store::new(&conn, writer, &limits, Utc::now());
        let err = as_writer
            .soft_delete_one_by_id::<RootShelf>(root.id)
            .unwrap_err();
        assert!(matches!(err, HubError::PermissionDenied(_)));
    }

    #[test]
    fn batch_size_is_bounded() {
        let (conn, _) = setup();
        let limits = Limits {
            max_batch_size: 2,
            ..Limits::default()
        };
        let owner = user(&conn, &limits, "owner");
        let store = Store::new(&conn, owner, &limits, Utc::now());
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let err = store.soft_delete_many_by_ids::<Material>(&ids).unwrap_err();
        assert!(matches!(err, HubError::InvalidDto(_)));
    }
}
