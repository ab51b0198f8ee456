use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{Pagination, SerializationGroup, UpdateUserDto, UserDto, UserListResponse};
use super::repo_types::User;
use super::services;
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    validation::{ApiPath, ApiQuery, ValidatedJson},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(get_me).patch(update_me).delete(delete_me))
        .route("/users/:id", get(get_user))
}

#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user", body = UserDto),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<UserDto>> {
    // a valid token for a deleted account
    let user = services::load(&state, user_id).await.map_err(|e| match e {
        ApiError::NotFound(msg) => ApiError::Unauthorized(msg),
        other => other,
    })?;
    let dto = services::render(&state, &user, &[SerializationGroup::Me]).await?;
    Ok(Json(dto))
}

#[utoipa::path(
    patch,
    path = "/users/me",
    request_body = UpdateUserDto,
    responses(
        (status = 200, description = "Updated user", body = UserDto),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Validation failed"),
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidatedJson(payload): ValidatedJson<UpdateUserDto>,
) -> ApiResult<Json<UserDto>> {
    let user = services::update(&state, user_id, payload).await?;
    let dto = services::render(&state, &user, &[SerializationGroup::Me]).await?;
    Ok(Json(dto))
}

#[utoipa::path(
    delete,
    path = "/users/me",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<StatusCode> {
    services::remove(&state, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Admins see the `admin` view, the owner sees `me`, everyone else the public one.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserDto),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found"),
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<UserDto>> {
    let user = services::load(&state, id).await?;
    let groups: &[SerializationGroup] = if requester == id {
        &[SerializationGroup::Me]
    } else if User::find_by_id(&state.db, requester)
        .await?
        .is_some_and(|r| r.is_admin())
    {
        &[SerializationGroup::Admin]
    } else {
        &[]
    };
    let dto = services::render(&state, &user, groups).await?;
    Ok(Json(dto))
}

#[utoipa::path(
    get,
    path = "/users",
    params(Pagination),
    responses(
        (status = 200, description = "Users page", body = UserListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiQuery(p): ApiQuery<Pagination>,
) -> ApiResult<Json<UserListResponse>> {
    services::require_admin(&state, user_id).await?;

    let (limit, offset) = p.clamped();
    // one extra row tells whether another page exists
    let mut users = User::list(&state.db, limit + 1, offset).await?;
    let has_next_page = users.len() as i64 > limit;
    users.truncate(limit as usize);

    let mut data = Vec::with_capacity(users.len());
    for u in &users {
        data.push(services::render(&state, u, &[SerializationGroup::Admin]).await?);
    }
    Ok(Json(UserListResponse {
        data,
        has_next_page,
    }))
}
