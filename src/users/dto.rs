use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::users::repo_types::User;
use crate::validation::{nullable, nullable_rfc3339};

/// Audience a user is rendered for. Controls which fields are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationGroup {
    /// The user looking at their own account.
    Me,
    Admin,
}

/// Public shape of a user. There is no password field at all.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    #[schema(example = "johndoe")]
    pub username: Option<String>,
    #[schema(example = "John Doe")]
    pub name: Option<String>,
    /// Only present for the `me` and `admin` groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "john.doe@example.com")]
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub email_verified: Option<OffsetDateTime>,
    #[schema(example = "https://image_url.com")]
    pub image_url: Option<String>,
    #[schema(default = false)]
    pub is_two_factor_enabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserDto {
    pub fn render(user: &User, image_url: Option<String>, groups: &[SerializationGroup]) -> Self {
        let exposes_email = groups
            .iter()
            .any(|g| matches!(g, SerializationGroup::Me | SerializationGroup::Admin));
        Self {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
            email: exposes_email.then(|| user.email.clone()),
            email_verified: user.email_verified,
            image_url,
            is_two_factor_enabled: user.is_two_factor_enabled,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Partial profile update. Absent fields are kept, `null` clears.
/// Only types are checked; any string is accepted for `name` and `password`.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserDto {
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub image_id: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, example = "John Doe")]
    pub name: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable_rfc3339")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub email_verified: Option<Option<OffsetDateTime>>,

    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, format = Password)]
    pub password: Option<Option<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub data: Vec<UserDto>,
    pub has_next_page: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

impl Pagination {
    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 100), self.offset.max(0))
    }
}
