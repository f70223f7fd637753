use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ensure_batch, logged, MoveItemsInput, MoveManyOutcome, MoveOutcome, ShelfService};
use crate::access;
use crate::context::RequestContext;
use crate::error::{HubError, Result};
use crate::ingest::{partition, validate_block_trees, BlockGroupAndBlockIds};
use crate::store::{
    BlockGroup, BlockPack, BlockPackNullable, BlockPackValues, NewBlockPack, OnlyDeleted, Options,
    PartialUpdate, Store, SubShelf,
};
use crate::trash::TrashOutcome;
use crate::tree::{arborize_group, ArborizedBlock, BlockTreeInput};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockGroupContentInput {
    #[serde(default)]
    pub prev_block_group_id: Option<Uuid>,
    pub arborized_editable_block: BlockTreeInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub is_all_success: bool,
    pub failed_indexes: Vec<usize>,
    pub success_indexes: Vec<usize>,
    pub success_block_group_and_block_ids: Vec<BlockGroupAndBlockIds>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub block_group_id: Uuid,
    pub inserted_ids: Vec<Uuid>,
    pub updated_ids: Vec<Uuid>,
    pub deleted_ids: Vec<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockGroupWithBlocks {
    pub block_group: BlockGroup,
    /// `None` for a group whose blocks were all deleted.
    pub arborized_editable_block: Option<ArborizedBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPackWithGroups {
    pub block_pack: BlockPack,
    pub block_groups: Vec<BlockGroupWithBlocks>,
}

fn group_with_blocks(store: &Store<'_>, group: BlockGroup) -> Result<BlockGroupWithBlocks> {
    let records = store
        .list_blocks(group.id, OnlyDeleted::Negative)?
        .iter()
        .map(|block| block.to_flattened(store.limits()))
        .collect::<Result<Vec<_>>>()?;
    let arborized_editable_block = if records.is_empty() {
        None
    } else {
        Some(arborize_group(records)?)
    };
    Ok(BlockGroupWithBlocks {
        block_group: group,
        arborized_editable_block,
    })
}

/// Recompute derived sizes after the blocks of `group` changed.
fn refresh_group(store: &Store<'_>, group: &BlockGroup) -> Result<()> {
    let bytes = store.block_group_bytes(group.id)?;
    store.set_block_group_size(group.id, bytes)?;
    store.refresh_block_count(group.block_pack_id)?;
    store.touch_root_shelf(group.root_shelf_id)
}

fn refresh_packs_of(store: &Store<'_>, ids: &[Uuid]) -> Result<()> {
    let groups: Vec<BlockGroup> = store.get_many_by_ids(ids, OnlyDeleted::Either)?;
    let mut packs: Vec<Uuid> = groups.iter().map(|g| g.block_pack_id).collect();
    packs.sort();
    packs.dedup();
    for pack in packs {
        store.refresh_block_count(pack)?;
    }
    Ok(())
}

impl ShelfService {
    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, parent = %input.parent_sub_shelf_id))]
    pub async fn create_block_pack(&self, ctx: &RequestContext, input: &NewBlockPack) -> Result<BlockPack> {
        let result = self
            .write(ctx, |store| store.create_one_block_pack(input, &Options::default()))
            .await;
        logged("create_block_pack", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_my_block_pack_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<BlockPack> {
        let result = self
            .read(ctx, |store| {
                store.check_permission_and_get_one_by_id(id, access::READ, &Options::default())
            })
            .await;
        logged("get_my_block_pack_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx, update), fields(user_id = %ctx.user_id))]
    pub async fn update_my_block_pack_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        update: &PartialUpdate<BlockPackValues, BlockPackNullable>,
    ) -> Result<BlockPack> {
        let result = self
            .write(ctx, |store| store.update_one_block_pack_by_id(id, update, &Options::default()))
            .await;
        logged("update_my_block_pack_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn delete_my_block_pack_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<BlockPack> {
        let result = self
            .write(ctx, |store| store.soft_delete_one_by_id::<BlockPack>(id))
            .await;
        logged("delete_my_block_pack_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn restore_my_block_pack_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<BlockPack> {
        let result = self
            .write(ctx, |store| store.restore_soft_deleted_one_by_id::<BlockPack>(id))
            .await;
        logged("restore_my_block_pack_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn delete_my_block_packs_by_ids(&self, ctx: &RequestContext, ids: &[Uuid]) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| store.soft_delete_many_by_ids::<BlockPack>(ids))
            .await;
        logged("delete_my_block_packs_by_ids", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn restore_my_block_packs_by_ids(&self, ctx: &RequestContext, ids: &[Uuid]) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| store.restore_soft_deleted_many_by_ids::<BlockPack>(ids))
            .await;
        logged("restore_my_block_packs_by_ids", result)
    }

    /// Move block packs into one live sub-shelf, skipping those that cannot go.
    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, count = input.ids.len()))]
    pub async fn move_my_block_packs(&self, ctx: &RequestContext, input: &MoveItemsInput) -> Result<MoveManyOutcome> {
        let result = self
            .write(ctx, |store| {
                ensure_batch(store.limits(), input.ids.len())?;
                let destination: SubShelf = store.check_permission_and_get_one_by_id(
                    input.destination_sub_shelf_id,
                    access::WRITE,
                    &Options::default(),
                )?;
                let mut moved_ids = Vec::new();
                for &id in &input.ids {
                    let attempt = store
                        .check_permission_and_get_one_by_id::<BlockPack>(id, access::WRITE, &Options::default())
                        .and_then(|pack| store.move_block_pack(&pack, &destination));
                    match attempt {
                        Ok(()) => moved_ids.push(id),
                        Err(e) => warn!(block_pack_id = %id, kind = %e.kind(), error = %e, "skipping block pack move"),
                    }
                }
                if !moved_ids.is_empty() {
                    store.touch_root_shelf(destination.root_shelf_id)?;
                }
                Ok(MoveManyOutcome {
                    updated_at: store.now(),
                    moved_ids,
                })
            })
            .await;
        logged("move_my_block_packs", result)
    }

    /// Validate editor trees in parallel, then store one block group per
    /// accepted tree in a single transaction. Rejected trees are reported by
    /// index and leave nothing behind.
    #[tracing::instrument(skip(self, ctx, contents), fields(user_id = %ctx.user_id, groups = contents.len()))]
    pub async fn insert_block_groups_and_their_blocks_by_block_pack_id(
        &self,
        ctx: &RequestContext,
        block_pack_id: Uuid,
        contents: Vec<BlockGroupContentInput>,
    ) -> Result<IngestReport> {
        let result = self.ingest(ctx, block_pack_id, contents).await;
        logged("insert_block_groups_and_their_blocks_by_block_pack_id", result)
    }

    async fn ingest(
        &self,
        ctx: &RequestContext,
        block_pack_id: Uuid,
        contents: Vec<BlockGroupContentInput>,
    ) -> Result<IngestReport> {
        ensure_batch(self.limits(), contents.len())?;
        self.read(ctx, |store| {
            store.check_permission_and_get_one_by_id::<BlockPack>(block_pack_id, access::WRITE, &Options::default())
        })
        .await?;

        let (prevs, trees): (Vec<Option<Uuid>>, Vec<Vec<ArborizedBlock>>) = contents
            .into_iter()
            .map(|c| (c.prev_block_group_id, c.arborized_editable_block.into_roots()))
            .unzip();
        let limits = Arc::new(self.limits().clone());
        let results = validate_block_trees(trees, limits, ctx.cancel.clone()).await?;
        let split = partition(results);
        if split.accepted.is_empty() {
            return Err(HubError::FailedToCreate(format!(
                "none of the {} block trees is valid",
                split.failed_indexes.len()
            )));
        }
        let success_indexes = split.success_indexes();
        let failed_indexes = split.failed_indexes;
        let accepted = split.accepted;

        self.write(ctx, |store| {
            let pack: BlockPack = store.check_permission_and_get_one_by_id(
                block_pack_id,
                access::WRITE,
                &Options::default(),
            )?;
            let accepted_prevs: Vec<Option<Uuid>> =
                accepted.iter().map(|(index, _)| prevs[*index]).collect();
            let group_ids = store.create_many_block_groups(pack.id, &accepted_prevs)?;
            let opts = Options::default()
                .skipping_permission_check()
                .with_batch_size(store.limits().max_batch_create_block_size);

            let mut created = Vec::with_capacity(group_ids.len());
            for (group_id, (_, blocks)) in group_ids.iter().zip(&accepted) {
                let block_ids = store.create_many_blocks(*group_id, blocks, &opts)?;
                let bytes = store.block_group_bytes(*group_id)?;
                store.set_block_group_size(*group_id, bytes)?;
                created.push(BlockGroupAndBlockIds {
                    block_group_id: *group_id,
                    block_ids,
                });
            }
            store.refresh_block_count(pack.id)?;
            store.touch_root_shelf(pack.root_shelf_id)?;
            info!(
                block_pack_id = %pack.id,
                created = created.len(),
                failed = failed_indexes.len(),
                "block groups ingested"
            );
            Ok(IngestReport {
                is_all_success: failed_indexes.is_empty(),
                failed_indexes: failed_indexes.clone(),
                success_indexes: success_indexes.clone(),
                success_block_group_and_block_ids: created,
                created_at: store.now(),
            })
        })
        .await
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_my_block_group_and_its_blocks_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<BlockGroupWithBlocks> {
        let result = self
            .read(ctx, |store| {
                let group: BlockGroup =
                    store.check_permission_and_get_one_by_id(id, access::READ, &Options::default())?;
                group_with_blocks(store, group)
            })
            .await;
        logged("get_my_block_group_and_its_blocks_by_id", result)
    }

    /// A block pack with its live groups in chain order.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_my_block_pack_and_its_block_groups(
        &self,
        ctx: &RequestContext,
        block_pack_id: Uuid,
    ) -> Result<BlockPackWithGroups> {
        let result = self
            .read(ctx, |store| {
                let block_pack: BlockPack = store.check_permission_and_get_one_by_id(
                    block_pack_id,
                    access::READ,
                    &Options::default(),
                )?;
                let block_groups = store
                    .list_block_groups(block_pack.id)?
                    .into_iter()
                    .map(|group| group_with_blocks(store, group))
                    .collect::<Result<Vec<_>>>()?;
                Ok(BlockPackWithGroups {
                    block_pack,
                    block_groups,
                })
            })
            .await;
        logged("get_my_block_pack_and_its_block_groups", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn move_my_block_group(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        new_prev_block_group_id: Option<Uuid>,
    ) -> Result<MoveOutcome> {
        let result = self
            .write(ctx, |store| {
                let group: BlockGroup =
                    store.check_permission_and_get_one_by_id(id, access::WRITE, &Options::default())?;
                store.move_block_group(&group, new_prev_block_group_id)?;
                store.touch_root_shelf(group.root_shelf_id)?;
                Ok(MoveOutcome {
                    updated_at: store.now(),
                })
            })
            .await;
        logged("move_my_block_group", result)
    }

    /// Replace the blocks of a group with a client-edited tree.
    #[tracing::instrument(skip(self, ctx, tree), fields(user_id = %ctx.user_id))]
    pub async fn sync_my_block_group_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        tree: BlockTreeInput,
    ) -> Result<SyncReport> {
        let result = self.sync(ctx, id, tree).await;
        logged("sync_my_block_group_by_id", result)
    }

    async fn sync(&self, ctx: &RequestContext, id: Uuid, tree: BlockTreeInput) -> Result<SyncReport> {
        self.read(ctx, |store| {
            store.check_permission_and_get_one_by_id::<BlockGroup>(id, access::WRITE, &Options::default())
        })
        .await?;
        let limits = Arc::new(self.limits().clone());
        let flattened = validate_block_trees(vec![tree.into_roots()], limits, ctx.cancel.clone())
            .await?
            .pop()
            .ok_or_else(|| HubError::Internal("missing validation result".into()))??;

        self.write(ctx, |store| {
            let group: BlockGroup =
                store.check_permission_and_get_one_by_id(id, access::WRITE, &Options::default())?;
            let sync = store.sync_blocks(group.id, &flattened)?;
            if sync.inserted_ids.is_empty() && sync.updated_ids.is_empty() && sync.deleted_ids.is_empty() {
                return Err(HubError::NoChanges(format!("block group {id}")));
            }
            refresh_group(store, &group)?;
            Ok(SyncReport {
                block_group_id: group.id,
                inserted_ids: sync.inserted_ids,
                updated_ids: sync.updated_ids,
                deleted_ids: sync.deleted_ids,
                updated_at: store.now(),
            })
        })
        .await
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn delete_my_block_group_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<BlockGroup> {
        let result = self
            .write(ctx, |store| {
                let group = store.soft_delete_one_by_id::<BlockGroup>(id)?;
                store.refresh_block_count(group.block_pack_id)?;
                Ok(group)
            })
            .await;
        logged("delete_my_block_group_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn restore_my_block_group_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<BlockGroup> {
        let result = self
            .write(ctx, |store| {
                let group = store.restore_soft_deleted_one_by_id::<BlockGroup>(id)?;
                store.refresh_block_count(group.block_pack_id)?;
                Ok(group)
            })
            .await;
        logged("restore_my_block_group_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn delete_my_block_groups_by_ids(&self, ctx: &RequestContext, ids: &[Uuid]) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| {
                let outcome = store.soft_delete_many_by_ids::<BlockGroup>(ids)?;
                refresh_packs_of(store, &outcome.affected_ids)?;
                Ok(outcome)
            })
            .await;
        logged("delete_my_block_groups_by_ids", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn restore_my_block_groups_by_ids(&self, ctx: &RequestContext, ids: &[Uuid]) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| {
                let outcome = store.restore_soft_deleted_many_by_ids::<BlockGroup>(ids)?;
                refresh_packs_of(store, &outcome.affected_ids)?;
                Ok(outcome)
            })
            .await;
        logged("restore_my_block_groups_by_ids", result)
    }
}
