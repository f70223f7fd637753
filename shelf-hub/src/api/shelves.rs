//! Root shelves, their members, and sub-shelves.

use axum::extract::State;
use serde::Deserialize;
use shelf_hub_core::{
    search::{SearchConnection, SearchInput},
    service::{
        CreatedRootShelf, IdsInput, MoveManyOutcome, MoveOutcome, MoveSubShelfInput,
        MoveSubShelvesInput, ShareInput, ShelfChildren,
    },
    store::{Member, RootShelf, RootShelfValues, SubShelf, SubShelfValues},
    trash::TrashOutcome,
};
use uuid::Uuid;

use super::{ok, ApiJson, ApiPath, ApiQuery, ApiResult, AppState, AuthContext};

#[derive(Debug, Deserialize)]
pub struct CreateRootShelfRequest {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildrenQuery {
    parent_sub_shelf_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubShelfRequest {
    root_shelf_id: Uuid,
    #[serde(default)]
    prev_sub_shelf_id: Option<Uuid>,
    name: String,
}

pub async fn create_root_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateRootShelfRequest>,
) -> ApiResult<CreatedRootShelf> {
    ok(state.service.create_root_shelf(&auth.ctx, &req.name).await?)
}

pub async fn search_recent_root_shelves(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(input): ApiQuery<SearchInput>,
) -> ApiResult<SearchConnection<RootShelf>> {
    ok(state.service.search_recent_root_shelves(&auth.ctx, &input).await?)
}

pub async fn get_root_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<RootShelf> {
    ok(state.service.get_my_root_shelf_by_id(&auth.ctx, id).await?)
}

pub async fn update_root_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(values): ApiJson<RootShelfValues>,
) -> ApiResult<RootShelf> {
    ok(state.service.update_my_root_shelf_by_id(&auth.ctx, id, &values).await?)
}

pub async fn delete_root_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<RootShelf> {
    ok(state.service.delete_my_root_shelf_by_id(&auth.ctx, id).await?)
}

pub async fn restore_root_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<RootShelf> {
    ok(state.service.restore_my_root_shelf_by_id(&auth.ctx, id).await?)
}

pub async fn delete_root_shelves(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.delete_my_root_shelves_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn restore_root_shelves(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.restore_my_root_shelves_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn list_children(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ChildrenQuery>,
) -> ApiResult<ShelfChildren> {
    ok(state
        .service
        .list_my_root_shelf_children(&auth.ctx, id, query.parent_sub_shelf_id)
        .await?)
}

pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Vec<Member>> {
    ok(state.service.list_my_root_shelf_members(&auth.ctx, id).await?)
}

pub async fn share_root_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<ShareInput>,
) -> ApiResult<Member> {
    ok(state.service.share_my_root_shelf(&auth.ctx, id, &input).await?)
}

pub async fn unshare_root_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath((id, user_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<()> {
    ok(state.service.unshare_my_root_shelf(&auth.ctx, id, user_id).await?)
}

pub async fn create_sub_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateSubShelfRequest>,
) -> ApiResult<SubShelf> {
    ok(state
        .service
        .create_sub_shelf_by_root_shelf_id(&auth.ctx, req.root_shelf_id, req.prev_sub_shelf_id, &req.name)
        .await?)
}

pub async fn get_sub_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<SubShelf> {
    ok(state.service.get_my_sub_shelf_by_id(&auth.ctx, id).await?)
}

pub async fn update_sub_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(values): ApiJson<SubShelfValues>,
) -> ApiResult<SubShelf> {
    ok(state.service.update_my_sub_shelf_by_id(&auth.ctx, id, &values).await?)
}

pub async fn delete_sub_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<SubShelf> {
    ok(state.service.delete_my_sub_shelf_by_id(&auth.ctx, id).await?)
}

pub async fn restore_sub_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<SubShelf> {
    ok(state.service.restore_my_sub_shelf_by_id(&auth.ctx, id).await?)
}

pub async fn delete_sub_shelves(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.delete_my_sub_shelves_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn restore_sub_shelves(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.restore_my_sub_shelves_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn move_sub_shelf(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<MoveSubShelfInput>,
) -> ApiResult<MoveOutcome> {
    ok(state.service.move_my_sub_shelf(&auth.ctx, &input).await?)
}

pub async fn move_sub_shelves(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<MoveSubShelvesInput>,
) -> ApiResult<MoveManyOutcome> {
    ok(state.service.move_my_sub_shelves(&auth.ctx, &input).await?)
}
