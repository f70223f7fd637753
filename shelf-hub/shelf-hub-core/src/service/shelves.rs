use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{ensure_batch, logged, MoveManyOutcome, MoveOutcome, ShelfService};
use crate::access::{self, can_grant, Permission};
use crate::context::RequestContext;
use crate::error::{HubError, Result};
use crate::planner::{plan_sub_shelf_move, SubShelfMovePlan};
use crate::search::{SearchConnection, SearchInput};
use crate::store::{
    BlockPack, Material, Member, OnlyDeleted, Options, RootShelf, RootShelfValues, Store,
    SubShelf, SubShelfValues,
};
use crate::trash::TrashOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRootShelf {
    pub id: Uuid,
    pub last_analyzed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSubShelfInput {
    pub source_root_shelf_id: Uuid,
    pub source_sub_shelf_id: Uuid,
    pub destination_root_shelf_id: Uuid,
    #[serde(default)]
    pub destination_sub_shelf_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSubShelvesInput {
    pub source_sub_shelf_ids: Vec<Uuid>,
    pub destination_root_shelf_id: Uuid,
    #[serde(default)]
    pub destination_sub_shelf_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareInput {
    pub user_id: Uuid,
    pub permission: Permission,
}

/// Live items directly below a root shelf or one of its sub-shelves.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfChildren {
    pub sub_shelves: Vec<SubShelf>,
    pub block_packs: Vec<BlockPack>,
    pub materials: Vec<Material>,
}

/// Validate a sub-shelf move against the current state and plan it.
fn plan_move(
    store: &Store<'_>,
    source: &SubShelf,
    destination_root_shelf_id: Uuid,
    destination_sub_shelf_id: Option<Uuid>,
) -> Result<SubShelfMovePlan> {
    let destination_root: RootShelf = store.check_permission_and_get_one_by_id(
        destination_root_shelf_id,
        access::WRITE,
        &Options::default(),
    )?;
    let destination = match destination_sub_shelf_id {
        Some(id) => {
            let shelf: SubShelf = store.get_one_by_id(id, OnlyDeleted::Negative)?;
            if shelf.root_shelf_id != destination_root.id {
                return Err(HubError::InvalidDto(format!(
                    "sub-shelf {id} is not inside root shelf {}",
                    destination_root.id
                )));
            }
            Some(shelf)
        }
        None => None,
    };
    let descendants = store.list_descendant_sub_shelves(source.id)?;
    plan_sub_shelf_move(
        source,
        &descendants,
        destination_root.id,
        destination.as_ref(),
        store.limits().max_sub_shelves_of_root_shelf,
    )
}

impl ShelfService {
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn create_root_shelf(&self, ctx: &RequestContext, name: &str) -> Result<CreatedRootShelf> {
        let result = self
            .write(ctx, |store| {
                let shelf = store.create_one_root_shelf(name)?;
                info!(root_shelf_id = %shelf.id, "root shelf created");
                Ok(CreatedRootShelf {
                    id: shelf.id,
                    last_analyzed_at: shelf.last_analyzed_at,
                    created_at: shelf.created_at,
                })
            })
            .await;
        logged("create_root_shelf", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_my_root_shelf_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<RootShelf> {
        let result = self
            .read(ctx, |store| {
                store.check_permission_and_get_one_by_id(id, access::READ, &Options::default())
            })
            .await;
        logged("get_my_root_shelf_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx, values), fields(user_id = %ctx.user_id))]
    pub async fn update_my_root_shelf_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        values: &RootShelfValues,
    ) -> Result<RootShelf> {
        let result = self
            .write(ctx, |store| {
                store.update_one_root_shelf_by_id(id, values, &Options::default())
            })
            .await;
        logged("update_my_root_shelf_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn delete_my_root_shelf_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<RootShelf> {
        let result = self
            .write(ctx, |store| store.soft_delete_one_by_id::<RootShelf>(id))
            .await;
        logged("delete_my_root_shelf_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn restore_my_root_shelf_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<RootShelf> {
        let result = self
            .write(ctx, |store| store.restore_soft_deleted_one_by_id::<RootShelf>(id))
            .await;
        logged("restore_my_root_shelf_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn delete_my_root_shelves_by_ids(
        &self,
        ctx: &RequestContext,
        ids: &[Uuid],
    ) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| store.soft_delete_many_by_ids::<RootShelf>(ids))
            .await;
        logged("delete_my_root_shelves_by_ids", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn restore_my_root_shelves_by_ids(
        &self,
        ctx: &RequestContext,
        ids: &[Uuid],
    ) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| store.restore_soft_deleted_many_by_ids::<RootShelf>(ids))
            .await;
        logged("restore_my_root_shelves_by_ids", result)
    }

    /// Live children of a root shelf, or of one of its sub-shelves.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn list_my_root_shelf_children(
        &self,
        ctx: &RequestContext,
        root_shelf_id: Uuid,
        parent_sub_shelf_id: Option<Uuid>,
    ) -> Result<ShelfChildren> {
        let result = self
            .read(ctx, |store| {
                let root: RootShelf = store.check_permission_and_get_one_by_id(
                    root_shelf_id,
                    access::READ,
                    &Options::default(),
                )?;
                let Some(parent_id) = parent_sub_shelf_id else {
                    return Ok(ShelfChildren {
                        sub_shelves: store.list_sub_shelves(root.id, None)?,
                        ..ShelfChildren::default()
                    });
                };
                let parent: SubShelf = store.get_one_by_id(parent_id, OnlyDeleted::Negative)?;
                if parent.root_shelf_id != root.id {
                    return Err(HubError::not_found("SubShelf", parent_id));
                }
                Ok(ShelfChildren {
                    sub_shelves: store.list_sub_shelves(root.id, Some(parent.id))?,
                    block_packs: store.list_block_packs(parent.id)?,
                    materials: store.list_materials(parent.id)?,
                })
            })
            .await;
        logged("list_my_root_shelf_children", result)
    }

    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id))]
    pub async fn search_recent_root_shelves(
        &self,
        ctx: &RequestContext,
        input: &SearchInput,
    ) -> Result<SearchConnection<RootShelf>> {
        let result = self
            .read(ctx, |store| store.search_recent_root_shelves(input))
            .await;
        logged("search_recent_root_shelves", result)
    }

    /// Grant or change another user's permission on a root shelf.
    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, target = %input.user_id))]
    pub async fn share_my_root_shelf(
        &self,
        ctx: &RequestContext,
        root_shelf_id: Uuid,
        input: &ShareInput,
    ) -> Result<Member> {
        let result = self
            .write(ctx, |store| {
                let root: RootShelf = store.get_one_by_id(root_shelf_id, OnlyDeleted::Negative)?;
                let actor = store.require(root.id, access::MANAGE)?;
                if input.user_id == store.user_id() {
                    return Err(HubError::InvalidDto("cannot share a root shelf with yourself".into()));
                }
                store.get_one_user_by_id(input.user_id)?;
                let existing = store.member_permission(root.id, input.user_id)?;
                if existing == Some(input.permission) {
                    return Err(HubError::NoChanges(format!(
                        "user {} already holds {}",
                        input.user_id, input.permission
                    )));
                }
                if !can_grant(actor, input.permission, existing) {
                    return Err(HubError::PermissionDenied(root.id));
                }
                store.grant_permission(root.id, input.user_id, input.permission)?;
                store
                    .list_members(root.id)?
                    .into_iter()
                    .find(|m| m.user_id == input.user_id)
                    .ok_or_else(|| HubError::Internal("granted member is missing".into()))
            })
            .await;
        logged("share_my_root_shelf", result)
    }

    /// Remove a member. Anyone but the owner may always remove themselves.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn unshare_my_root_shelf(
        &self,
        ctx: &RequestContext,
        root_shelf_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<()> {
        let result = self
            .write(ctx, |store| {
                let root: RootShelf = store.get_one_by_id(root_shelf_id, OnlyDeleted::Negative)?;
                let actor = store.require(root.id, access::READ)?;
                let leaving = target_user_id == store.user_id() && actor != Permission::Owner;
                if !leaving {
                    if !access::MANAGE.contains(&actor) {
                        return Err(HubError::PermissionDenied(root.id));
                    }
                    let existing = store
                        .member_permission(root.id, target_user_id)?
                        .ok_or_else(|| HubError::not_found("Member", target_user_id))?;
                    if existing >= actor {
                        return Err(HubError::PermissionDenied(root.id));
                    }
                }
                store.revoke_permission(root.id, target_user_id)
            })
            .await;
        logged("unshare_my_root_shelf", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn list_my_root_shelf_members(
        &self,
        ctx: &RequestContext,
        root_shelf_id: Uuid,
    ) -> Result<Vec<Member>> {
        let result = self
            .read(ctx, |store| {
                let root: RootShelf =
                    store.check_permission_and_get_one_by_id(root_shelf_id, access::READ, &Options::default())?;
                store.list_members(root.id)
            })
            .await;
        logged("list_my_root_shelf_members", result)
    }

    #[tracing::instrument(skip(self, ctx, name), fields(user_id = %ctx.user_id))]
    pub async fn create_sub_shelf_by_root_shelf_id(
        &self,
        ctx: &RequestContext,
        root_shelf_id: Uuid,
        prev_sub_shelf_id: Option<Uuid>,
        name: &str,
    ) -> Result<SubShelf> {
        let result = self
            .write(ctx, |store| {
                store.create_one_sub_shelf(root_shelf_id, prev_sub_shelf_id, name, &Options::default())
            })
            .await;
        logged("create_sub_shelf_by_root_shelf_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_my_sub_shelf_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<SubShelf> {
        let result = self
            .read(ctx, |store| {
                store.check_permission_and_get_one_by_id(id, access::READ, &Options::default())
            })
            .await;
        logged("get_my_sub_shelf_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx, values), fields(user_id = %ctx.user_id))]
    pub async fn update_my_sub_shelf_by_id(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        values: &SubShelfValues,
    ) -> Result<SubShelf> {
        let result = self
            .write(ctx, |store| store.update_one_sub_shelf_by_id(id, values, &Options::default()))
            .await;
        logged("update_my_sub_shelf_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn delete_my_sub_shelf_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<SubShelf> {
        let result = self
            .write(ctx, |store| {
                let shelf = store.soft_delete_one_by_id::<SubShelf>(id)?;
                store.touch_root_shelf(shelf.root_shelf_id)?;
                Ok(shelf)
            })
            .await;
        logged("delete_my_sub_shelf_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn restore_my_sub_shelf_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<SubShelf> {
        let result = self
            .write(ctx, |store| {
                let shelf = store.restore_soft_deleted_one_by_id::<SubShelf>(id)?;
                store.touch_root_shelf(shelf.root_shelf_id)?;
                Ok(shelf)
            })
            .await;
        logged("restore_my_sub_shelf_by_id", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn delete_my_sub_shelves_by_ids(
        &self,
        ctx: &RequestContext,
        ids: &[Uuid],
    ) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| store.soft_delete_many_by_ids::<SubShelf>(ids))
            .await;
        logged("delete_my_sub_shelves_by_ids", result)
    }

    #[tracing::instrument(skip(self, ctx, ids), fields(user_id = %ctx.user_id, count = ids.len()))]
    pub async fn restore_my_sub_shelves_by_ids(
        &self,
        ctx: &RequestContext,
        ids: &[Uuid],
    ) -> Result<TrashOutcome> {
        let result = self
            .write(ctx, |store| store.restore_soft_deleted_many_by_ids::<SubShelf>(ids))
            .await;
        logged("restore_my_sub_shelves_by_ids", result)
    }

    /// Move one sub-shelf and its subtree under another parent, possibly in
    /// another root shelf.
    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, source = %input.source_sub_shelf_id))]
    pub async fn move_my_sub_shelf(
        &self,
        ctx: &RequestContext,
        input: &MoveSubShelfInput,
    ) -> Result<MoveOutcome> {
        let result = self
            .write(ctx, |store| {
                let source: SubShelf = store.check_permission_and_get_one_by_id(
                    input.source_sub_shelf_id,
                    access::WRITE,
                    &Options::default(),
                )?;
                if source.root_shelf_id != input.source_root_shelf_id {
                    return Err(HubError::not_found("SubShelf", input.source_sub_shelf_id));
                }
                let plan = plan_move(
                    store,
                    &source,
                    input.destination_root_shelf_id,
                    input.destination_sub_shelf_id,
                )?;
                store.apply_sub_shelf_move(&plan)?;
                Ok(MoveOutcome {
                    updated_at: store.now(),
                })
            })
            .await;
        logged("move_my_sub_shelf", result)
    }

    /// Move several sub-shelves under one destination. Each candidate is
    /// checked against the state left by the ones before it; rejected ones
    /// are logged and skipped.
    #[tracing::instrument(skip(self, ctx, input), fields(user_id = %ctx.user_id, count = input.source_sub_shelf_ids.len()))]
    pub async fn move_my_sub_shelves(
        &self,
        ctx: &RequestContext,
        input: &MoveSubShelvesInput,
    ) -> Result<MoveManyOutcome> {
        let result = self
            .write(ctx, |store| {
                ensure_batch(store.limits(), input.source_sub_shelf_ids.len())?;
                let mut moved_ids = Vec::new();
                for &id in &input.source_sub_shelf_ids {
                    let attempt = store
                        .check_permission_and_get_one_by_id::<SubShelf>(id, access::WRITE, &Options::default())
                        .and_then(|source| {
                            plan_move(
                                store,
                                &source,
                                input.destination_root_shelf_id,
                                input.destination_sub_shelf_id,
                            )
                        });
                    match attempt {
                        Ok(plan) => {
                            store.apply_sub_shelf_move(&plan)?;
                            moved_ids.push(id);
                        }
                        Err(e) => warn!(sub_shelf_id = %id, kind = %e.kind(), error = %e, "skipping sub-shelf move"),
                    }
                }
                Ok(MoveManyOutcome {
                    updated_at: store.now(),
                    moved_ids,
                })
            })
            .await;
        logged("move_my_sub_shelves", result)
    }
}
