use axum::extract::State;
use shelf_hub_core::{
    search::{SearchConnection, SearchInput},
    service::{IdsInput, MoveItemsInput, MoveManyOutcome},
    store::{Material, MaterialValues, NewMaterial},
    trash::TrashOutcome,
};
use uuid::Uuid;

use super::{ok, ApiJson, ApiPath, ApiQuery, ApiResult, AppState, AuthContext};

pub async fn create_material(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewMaterial>,
) -> ApiResult<Material> {
    ok(state.service.create_material(&auth.ctx, &input).await?)
}

pub async fn search_materials(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiQuery(input): ApiQuery<SearchInput>,
) -> ApiResult<SearchConnection<Material>> {
    ok(state.service.search_my_materials(&auth.ctx, &input).await?)
}

pub async fn get_material(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Material> {
    ok(state.service.get_my_material_by_id(&auth.ctx, id).await?)
}

pub async fn update_material(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(values): ApiJson<MaterialValues>,
) -> ApiResult<Material> {
    ok(state.service.update_my_material_by_id(&auth.ctx, id, &values).await?)
}

pub async fn delete_material(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Material> {
    ok(state.service.delete_my_material_by_id(&auth.ctx, id).await?)
}

pub async fn restore_material(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Material> {
    ok(state.service.restore_my_material_by_id(&auth.ctx, id).await?)
}

pub async fn delete_materials(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.delete_my_materials_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn restore_materials(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<IdsInput>,
) -> ApiResult<TrashOutcome> {
    ok(state.service.restore_my_materials_by_ids(&auth.ctx, &input.ids).await?)
}

pub async fn move_materials(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<MoveItemsInput>,
) -> ApiResult<MoveManyOutcome> {
    ok(state.service.move_my_materials(&auth.ctx, &input).await?)
}
