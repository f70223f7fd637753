use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{
    opt_ts_at, opt_uuid_at, opt_uuid_param, select_sql, ts_at, uuid_at, Entity, OnlyDeleted,
    Store,
};
use crate::access::{self, Permission};
use crate::clock::to_micros;
use crate::error::{HubError, Result};
use crate::planner::{chain_updates, insert_after, plan_block_group_move};

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockGroup {
    pub id: Uuid,
    pub block_pack_id: Uuid,
    pub root_shelf_id: Uuid,
    pub prev_block_group_id: Option<Uuid>,
    pub sync_block_group_id: Option<Uuid>,
    pub mega_byte_size: f64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for BlockGroup {
    const NAME: &'static str = "BlockGroup";
    const TABLE: &'static str = "block_groups";
    const COLUMNS: &'static str = "t.id, t.block_pack_id, rs.id, t.prev_block_group_id, \
         t.sync_block_group_id, t.mega_byte_size, t.deleted_at, t.created_at, t.updated_at";
    const JOINS: &'static str = "JOIN block_packs bp ON bp.id = t.block_pack_id \
         JOIN sub_shelves ps ON ps.id = bp.parent_sub_shelf_id \
         JOIN root_shelves rs ON rs.id = ps.root_shelf_id";
    const LIVE_ANCESTORS: &'static str = "rs.deleted_at IS NULL AND ps.deleted_at IS NULL \
         AND bp.deleted_at IS NULL AND NOT EXISTS (SELECT 1 FROM json_each(ps.path) je \
         JOIN sub_shelves anc ON anc.id = je.value WHERE anc.deleted_at IS NOT NULL)";
    const TRASH_PERMISSIONS: &'static [Permission] = access::WRITE;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            block_pack_id: uuid_at(row, 1)?,
            root_shelf_id: uuid_at(row, 2)?,
            prev_block_group_id: opt_uuid_at(row, 3)?,
            sync_block_group_id: opt_uuid_at(row, 4)?,
            mega_byte_size: row.get(5)?,
            deleted_at: opt_ts_at(row, 6)?,
            created_at: ts_at(row, 7)?,
            updated_at: ts_at(row, 8)?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn root_shelf_id(&self) -> Uuid {
        self.root_shelf_id
    }
}

/// Order groups by following prev pointers from the head. Groups not
/// reachable from the head are appended by creation time.
fn order_chain(mut groups: Vec<BlockGroup>) -> Vec<BlockGroup> {
    groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    let mut next_of: HashMap<Option<Uuid>, Vec<usize>> = HashMap::new();
    for (i, group) in groups.iter().enumerate() {
        next_of.entry(group.prev_block_group_id).or_default().push(i);
    }
    let mut placed = HashSet::with_capacity(groups.len());
    let mut order = Vec::with_capacity(groups.len());
    let mut cursor = None;
    while let Some(i) = next_of
        .get(&cursor)
        .and_then(|candidates| candidates.iter().copied().find(|i| !placed.contains(i)))
    {
        placed.insert(i);
        order.push(i);
        cursor = Some(groups[i].id);
    }
    order.extend((0..groups.len()).filter(|i| !placed.contains(i)));

    let mut slots: Vec<Option<BlockGroup>> = groups.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

pub fn mega_bytes(bytes: usize) -> f64 {
    bytes as f64 / BYTES_PER_MEGABYTE
}

impl Store<'_> {
    /// Every group of a pack, live or not, in chain order.
    pub fn block_group_chain(&self, block_pack_id: Uuid) -> Result<Vec<BlockGroup>> {
        let sql = select_sql::<BlockGroup>(OnlyDeleted::Either, "t.block_pack_id = ?1");
        let mut stmt = self.conn().prepare_cached(&sql)?;
        let groups = stmt
            .query_map(params![block_pack_id.to_string()], BlockGroup::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(order_chain(groups))
    }

    /// The live slice of a pack's chain.
    pub fn list_block_groups(&self, block_pack_id: Uuid) -> Result<Vec<BlockGroup>> {
        Ok(self
            .block_group_chain(block_pack_id)?
            .into_iter()
            .filter(|g| g.deleted_at.is_none())
            .collect())
    }

    /// Insert one group per entry of `prevs`, ids index-aligned with it.
    ///
    /// An explicit prev must be a live group of the pack. `None` places the
    /// group after the one inserted just before it, or at the head for the first.
    pub fn create_many_block_groups(
        &self,
        block_pack_id: Uuid,
        prevs: &[Option<Uuid>],
    ) -> Result<Vec<Uuid>> {
        let chain = self.block_group_chain(block_pack_id)?;
        let live: HashSet<Uuid> = chain
            .iter()
            .filter(|g| g.deleted_at.is_none())
            .map(|g| g.id)
            .collect();
        let old: Vec<Uuid> = chain.iter().map(|g| g.id).collect();
        let mut order = old.clone();
        let now = to_micros(self.now());
        let mut ids = Vec::with_capacity(prevs.len());

        let mut stmt = self.conn().prepare_cached(
            "INSERT INTO block_groups (id, block_pack_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        )?;
        for prev in prevs {
            let after = match prev {
                Some(prev) if live.contains(prev) => Some(*prev),
                Some(prev) => return Err(HubError::not_found("BlockGroup", *prev)),
                None => ids.last().copied(),
            };
            let id = Uuid::new_v4();
            stmt.execute(params![id.to_string(), block_pack_id.to_string(), now])
                .map_err(|e| HubError::FailedToCreate(format!("block group: {e}")))?;
            insert_after(&mut order, id, after)?;
            ids.push(id);
        }
        self.relink_block_groups(&chain_updates(&old, &order))?;
        Ok(ids)
    }

    /// Re-insert a live group after `new_prev` (a live group of the same pack) or at the head.
    pub fn move_block_group(&self, group: &BlockGroup, new_prev: Option<Uuid>) -> Result<()> {
        let chain = self.block_group_chain(group.block_pack_id)?;
        let live: Vec<Uuid> = chain
            .iter()
            .filter(|g| g.deleted_at.is_none())
            .map(|g| g.id)
            .collect();
        if let Some(prev) = new_prev {
            if !live.contains(&prev) {
                return Err(HubError::not_found("BlockGroup", prev));
            }
        }
        let live_prev = live
            .iter()
            .position(|id| *id == group.id)
            .and_then(|i| i.checked_sub(1))
            .map(|i| live[i]);
        if live_prev == new_prev {
            return Err(HubError::NoChanges(format!(
                "block group {} is already there",
                group.id
            )));
        }
        let old: Vec<Uuid> = chain.iter().map(|g| g.id).collect();
        let order = plan_block_group_move(&old, group.id, new_prev)?;
        self.relink_block_groups(&chain_updates(&old, &order))
    }

    fn relink_block_groups(&self, updates: &[(Uuid, Option<Uuid>)]) -> Result<()> {
        let now = to_micros(self.now());
        let mut stmt = self.conn().prepare_cached(
            "UPDATE block_groups SET prev_block_group_id = ?1, updated_at = ?2 WHERE id = ?3",
        )?;
        for (id, prev) in updates {
            stmt.execute(params![opt_uuid_param(*prev), now, id.to_string()])
                .map_err(|e| HubError::FailedToUpdate(format!("block group: {e}")))?;
        }
        Ok(())
    }

    pub fn set_block_group_size(&self, id: Uuid, bytes: usize) -> Result<()> {
        self.conn().execute(
            "UPDATE block_groups SET mega_byte_size = ?1, updated_at = ?2 WHERE id = ?3",
            params![mega_bytes(bytes), to_micros(self.now()), id.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn group(prev: Option<Uuid>, age: i64) -> BlockGroup {
        BlockGroup {
            id: Uuid::new_v4(),
            block_pack_id: Uuid::nil(),
            root_shelf_id: Uuid::nil(),
            prev_block_group_id: prev,
            sync_block_group_id: None,
            mega_byte_size: 0.0,
            deleted_at: None,
            created_at: Utc::now() - Duration::seconds(age),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn chain_follows_prev_pointers_not_creation_time() {
        let a = group(None, 1);
        let b = group(Some(a.id), 3);
        let c = group(Some(b.id), 2);
        let ordered = order_chain(vec![c.clone(), a.clone(), b.clone()]);
        let ids: Vec<_> = ordered.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn unreachable_groups_are_kept() {
        let a = group(None, 1);
        let stray = group(Some(Uuid::new_v4()), 5);
        let ordered = order_chain(vec![stray.clone(), a.clone()]);
        let ids: Vec<_> = ordered.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![a.id, stray.id]);
    }
}
