//! Block packs, block groups and their blocks.

use axum::extract::State;
use serde::Deserialize;
use shelf_hub_core::{
    service::{
        BlockGroupContentInput, BlockGroupWithBlocks, BlockPackWithGroups, IdsInput, IngestReport,
        MoveItemsInput, MoveManyOutcome, MoveOutcome, SyncReport,
    },
    store::{BlockGroup, BlockPack, BlockPackNullable, BlockPackValues, NewBlockPack, PartialUpdate},
    trash::TrashOutcome,
    tree::BlockTreeInput,
};
use uuid::Uuid;

use super::{ok, ApiJson, ApiPath, ApiResult, AppState, AuthContext};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertBlockGroupsRequest {
    block_group_contents: Vec<BlockGroupContentInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveBlockGroupRequest {
    #[serde(default)]
    prev_block_group_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBlockGroupRequest {
    arborized_editable_block: BlockTreeInput,
}

pub async fn create_block_pack(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewBlockPack>,
) -> ApiResult<BlockPack> {
    ok(state.service.create_block_pack(&auth.ctx, &input).await?)
}

pub async fn get_block_pack(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<BlockPack> {
    ok(state.service.get_my_block_pack_by_id(&auth.ctx, id).await?)
}

pub async fn update_block_pack(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<PartialUpdate<BlockPackValues, BlockPackNullable>>,
) -> ApiResult<BlockPack> {
    ok(state.service.update_my_block_pack_by_id(&auth.ctx, id, &update).await?)
}

pub async fn delete_block_pack(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<BlockPack> {
    ok(state.service.delete_my_block_pack_by_id(&auth.ctx, id).await?)
}

pub async fn restore_block_pack(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<BlockPack> {
    ok(state.service.restore_my_block_pack_by_id(&auth.ctx, id).await?)
}

pub async fn delete_block_packs(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.delete_my_block_packs_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn restore_block_packs(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.restore_my_block_packs_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn move_block_packs(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<MoveItemsInput>,
) -> ApiResult<MoveManyOutcome> {
    ok(state.service.move_my_block_packs(&auth.ctx, &input).await?)
}

pub async fn insert_block_groups(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<InsertBlockGroupsRequest>,
) -> ApiResult<IngestReport> {
    ok(state
        .service
        .insert_block_groups_and_their_blocks_by_block_pack_id(&auth.ctx, id, req.block_group_contents)
        .await?)
}

pub async fn get_block_pack_with_groups(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<BlockPackWithGroups> {
    ok(state.service.get_my_block_pack_and_its_block_groups(&auth.ctx, id).await?)
}

pub async fn get_block_group(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<BlockGroupWithBlocks> {
    ok(state.service.get_my_block_group_and_its_blocks_by_id(&auth.ctx, id).await?)
}

pub async fn delete_block_group(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<BlockGroup> {
    ok(state.service.delete_my_block_group_by_id(&auth.ctx, id).await?)
}

pub async fn restore_block_group(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<BlockGroup> {
    ok(state.service.restore_my_block_group_by_id(&auth.ctx, id).await?)
}

pub async fn delete_block_groups(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.delete_my_block_groups_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn restore_block_groups(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.restore_my_block_groups_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn move_block_group(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<MoveBlockGroupRequest>,
) -> ApiResult<MoveOutcome> {
    ok(state
        .service
        .move_my_block_group(&auth.ctx, id, req.prev_block_group_id)
        .await?)
}

pub async fn sync_block_group(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SyncBlockGroupRequest>,
) -> ApiResult<SyncReport> {
    ok(state
        .service
        .sync_my_block_group_by_id(&auth.ctx, id, req.arborized_editable_block)
        .await?)
}
