use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::users::dto::UserDto;

/// Request body for email registration.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "john.doe@example.com")]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    #[schema(format = Password)]
    pub password: String,
    #[validate(length(min = 2, max = 50, message = "username must be 2 to 50 characters"))]
    #[schema(example = "johndoe")]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 255, message = "name must be 1 to 255 characters"))]
    #[schema(example = "John Doe")]
    pub name: Option<String>,
}

/// Request body for email login.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "john.doe@example.com")]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    #[schema(format = Password)]
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    #[validate(length(min = 1, message = "refreshToken is required"))]
    pub refresh_token: String,
}

/// Response returned after login, register or refresh.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserDto,
}
