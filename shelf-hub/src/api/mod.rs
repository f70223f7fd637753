//! HTTP API layer. Every response uses the same envelope:
//! `{success, data, exception}` with `exception = {kind, message}` on failure.

mod auth_middleware;
mod blocks;
mod materials;
mod shelves;

pub use auth_middleware::AuthContext;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use shelf_hub_core::{
    auth::TokenVerifier,
    store::User,
    trash::TrashListing,
    ErrorKind, HubError, ShelfService,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: ShelfService,
    pub verifier: Arc<dyn TokenVerifier>,
}

#[derive(Debug, Serialize)]
pub struct Exception {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub exception: Option<Exception>,
}

/// A core error rendered as an envelope with the status of its kind.
#[derive(Debug)]
pub struct ApiError(pub HubError);

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        Self(e)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidDto
        | ErrorKind::BlockKindUnknown
        | ErrorKind::InvalidBlockTree
        | ErrorKind::DuplicateBlockId
        | ErrorKind::RepeatedRootBlockInBlockGroup
        | ErrorKind::OrphanBlock
        | ErrorKind::FailedToUnmarshalSearchCursor => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated
        | ErrorKind::WrongAccessToken
        | ErrorKind::WrongRefreshToken
        | ErrorKind::WrongPassword => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::EntityNotFound => StatusCode::NOT_FOUND,
        ErrorKind::NoChanges
        | ErrorKind::MaximumDepthExceeded
        | ErrorKind::InsertParentIntoItsChildren => StatusCode::CONFLICT,
        ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::FailedToCreate
        | ErrorKind::FailedToUpdate
        | ErrorKind::FailedToDelete
        | ErrorKind::FailedToCommitTransaction
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        // server-side details stay in the logs
        let message = if kind.is_client_error() {
            self.0.to_string()
        } else {
            "the request could not be completed".to_string()
        };
        let body = Envelope::<()> {
            success: false,
            data: None,
            exception: Some(Exception { kind, message }),
        };
        (status_for(kind), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data: Some(data),
        exception: None,
    }))
}

/// `Json` whose rejections become `InvalidDto` envelopes.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| HubError::InvalidDto(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query` whose rejections become `InvalidDto` envelopes.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| HubError::InvalidDto(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Path` whose rejections become `InvalidDto` envelopes.
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| HubError::InvalidDto(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub fn router(state: AppState, permissive_cors: bool) -> Router {
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/users/me", get(get_me))
        .route("/trash", get(list_my_trash))
        .route("/root-shelves", post(shelves::create_root_shelf))
        .route("/root-shelves/search", get(shelves::search_recent_root_shelves))
        .route("/root-shelves/batch-delete", post(shelves::delete_root_shelves))
        .route("/root-shelves/batch-restore", post(shelves::restore_root_shelves))
        .route(
            "/root-shelves/{id}",
            get(shelves::get_root_shelf)
                .put(shelves::update_root_shelf)
                .delete(shelves::delete_root_shelf),
        )
        .route("/root-shelves/{id}/restore", post(shelves::restore_root_shelf))
        .route("/root-shelves/{id}/children", get(shelves::list_children))
        .route(
            "/root-shelves/{id}/members",
            get(shelves::list_members).post(shelves::share_root_shelf),
        )
        .route(
            "/root-shelves/{id}/members/{user_id}",
            delete(shelves::unshare_root_shelf),
        )
        .route("/sub-shelves", post(shelves::create_sub_shelf))
        .route("/sub-shelves/move", put(shelves::move_sub_shelf))
        .route("/sub-shelves/move-many", put(shelves::move_sub_shelves))
        .route("/sub-shelves/batch-delete", post(shelves::delete_sub_shelves))
        .route("/sub-shelves/batch-restore", post(shelves::restore_sub_shelves))
        .route(
            "/sub-shelves/{id}",
            get(shelves::get_sub_shelf)
                .put(shelves::update_sub_shelf)
                .delete(shelves::delete_sub_shelf),
        )
        .route("/sub-shelves/{id}/restore", post(shelves::restore_sub_shelf))
        .route("/block-packs", post(blocks::create_block_pack))
        .route("/block-packs/move", put(blocks::move_block_packs))
        .route("/block-packs/batch-delete", post(blocks::delete_block_packs))
        .route("/block-packs/batch-restore", post(blocks::restore_block_packs))
        .route(
            "/block-packs/{id}",
            get(blocks::get_block_pack)
                .put(blocks::update_block_pack)
                .delete(blocks::delete_block_pack),
        )
        .route("/block-packs/{id}/restore", post(blocks::restore_block_pack))
        .route(
            "/block-packs/{id}/block-groups",
            get(blocks::get_block_pack_with_groups).post(blocks::insert_block_groups),
        )
        .route("/block-groups/batch-delete", post(blocks::delete_block_groups))
        .route("/block-groups/batch-restore", post(blocks::restore_block_groups))
        .route(
            "/block-groups/{id}",
            get(blocks::get_block_group).delete(blocks::delete_block_group),
        )
        .route("/block-groups/{id}/restore", post(blocks::restore_block_group))
        .route("/block-groups/{id}/move", put(blocks::move_block_group))
        .route("/block-groups/{id}/blocks", put(blocks::sync_block_group))
        .route("/materials", post(materials::create_material))
        .route("/materials/search", get(materials::search_materials))
        .route("/materials/move", put(materials::move_materials))
        .route("/materials/batch-delete", post(materials::delete_materials))
        .route("/materials/batch-restore", post(materials::restore_materials))
        .route(
            "/materials/{id}",
            get(materials::get_material)
                .put(materials::update_material)
                .delete(materials::delete_material),
        )
        .route("/materials/{id}/restore", post(materials::restore_material))
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if permissive_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn get_me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<User> {
    ok(state.service.get_me(&auth.ctx).await?)
}

async fn list_my_trash(State(state): State<AppState>, auth: AuthContext) -> ApiResult<TrashListing> {
    ok(state.service.list_my_trash(&auth.ctx).await?)
}
