use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        credentials::{hash_password, is_valid_email, normalize_email, verify_password},
        dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest},
        jwt::{JwtKeys, TokenKind},
    },
    error::{ApiError, ApiResult},
    state::AppState,
    users::{
        dto::SerializationGroup,
        repo::violated_unique_constraint,
        repo_types::{NewUser, User},
        services as user_services,
    },
    validation::ValidatedJson,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/email/register", post(register))
        .route("/auth/email/login", post(login))
        .route("/auth/refresh", post(refresh))
}

async fn issue(state: &AppState, user: &User) -> ApiResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let tokens = keys.pair(user.id).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        ApiError::Internal(e)
    })?;
    let user = user_services::render(state, user, &[SerializationGroup::Me]).await?;
    Ok(AuthResponse {
        access_token: tokens.access,
        refresh_token: tokens.refresh,
        user,
    })
}

#[utoipa::path(
    post,
    path = "/auth/email/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 422, description = "Invalid input or email already registered"),
    ),
    tag = "Auth"
)]
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(mut payload): ValidatedJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::field("email", "invalid email"));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::field("email", "emailAlreadyExists"));
    }
    if let Some(username) = payload.username.as_deref() {
        if User::username_taken(&state.db, username).await? {
            warn!(%username, "username already taken");
            return Err(ApiError::field("username", "usernameAlreadyExists"));
        }
    }

    let hash = hash_password(&payload.password)?;

    let new = NewUser {
        email: &payload.email,
        password_hash: &hash,
        username: payload.username.as_deref(),
        name: payload.name.as_deref(),
    };
    let user = match User::create(&state.db, new).await {
        Ok(u) => u,
        // lost a race against a concurrent registration
        Err(e) => {
            return Err(match violated_unique_constraint(&e).as_deref() {
                Some("users_email_key") => ApiError::field("email", "emailAlreadyExists"),
                Some("users_username_key") => ApiError::field("username", "usernameAlreadyExists"),
                _ => {
                    error!(error = %e, "create user failed");
                    ApiError::Internal(e)
                }
            });
        }
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(issue(&state, &user).await?)))
}

#[utoipa::path(
    post,
    path = "/auth/email/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    ),
    tag = "Auth"
)]
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(mut payload): ValidatedJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::field("email", "invalid email"));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::Unauthorized("Invalid credentials".into()));
        }
    };

    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, "login for account without password");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(&payload.password, hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(issue(&state, &user).await?))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthResponse),
        (status = 401, description = "Invalid refresh token"),
    ),
    tag = "Auth"
)]
#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            ApiError::Unauthorized("Invalid refresh token".into())
        })?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

    Ok(Json(issue(&state, &user).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn post_json(uri: &str, body: &'static str) -> (StatusCode, serde_json::Value) {
        let app = auth_routes().with_state(AppState::fake());
        let res = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let (status, body) = post_json(
            "/auth/email/register",
            r#"{"email":"a@b.co","password":"short"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["password"].is_string());
    }

    #[tokio::test]
    async fn register_rejects_invalid_email() {
        let (status, body) = post_json(
            "/auth/email/register",
            r#"{"email":"not-an-email","password":"long-enough-pw"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"]["email"], "invalid email");
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let state = AppState::fake();
        let token = JwtKeys::from_ref(&state).sign(Uuid::new_v4(), TokenKind::Access).unwrap();
        let app = auth_routes().with_state(state);
        let res = app
            .oneshot(
                Request::post("/auth/refresh")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(r#"{{"refreshToken":"{}"}}"#, token)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let (status, _) = post_json("/auth/email/login", r#"{"email":"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
