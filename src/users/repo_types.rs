use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const ROLE_ADMIN: &str = "admin";

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: String,
    pub email_verified: Option<OffsetDateTime>, // null until verified
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 hash, not exposed in JSON
    pub image_id: Option<Uuid>,
    pub is_two_factor_enabled: bool,
    pub role: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Fields required to insert a user.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub username: Option<&'a str>,
    pub name: Option<&'a str>,
}
