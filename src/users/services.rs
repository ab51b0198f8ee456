use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::credentials::hash_password;
use crate::error::{ApiError, ApiResult};
use crate::files::{repo as files_repo, services as files_services};
use crate::state::AppState;
use crate::users::dto::{SerializationGroup, UpdateUserDto, UserDto};
use crate::users::repo_types::User;

/// Update already checked and resolved: ids parsed, password hashed.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub image_id: Option<Option<Uuid>>,
    pub name: Option<Option<String>>,
    pub email_verified: Option<Option<OffsetDateTime>>,
    pub password_hash: Option<Option<String>>,
}

impl UserPatch {
    /// Absent fields keep their value, `Some(None)` clears.
    pub fn apply(self, user: &mut User) {
        if let Some(image_id) = self.image_id {
            user.image_id = image_id;
        }
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email_verified) = self.email_verified {
            user.email_verified = email_verified;
        }
        if let Some(password_hash) = self.password_hash {
            user.password_hash = password_hash;
        }
    }
}

pub async fn load(state: &AppState, user_id: Uuid) -> ApiResult<User> {
    User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

/// Loads the caller and rejects anyone who is not an admin.
pub async fn require_admin(state: &AppState, user_id: Uuid) -> ApiResult<User> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    if !user.is_admin() {
        warn!(%user_id, "admin route denied");
        return Err(ApiError::Forbidden("Admin role required".into()));
    }
    Ok(user)
}

/// Renders a user for the given groups, resolving the image to a URL.
pub async fn render(
    state: &AppState,
    user: &User,
    groups: &[SerializationGroup],
) -> anyhow::Result<UserDto> {
    let image_url = match user.image_id {
        Some(id) => files_services::presign_by_id(state, id).await?,
        None => None,
    };
    Ok(UserDto::render(user, image_url, groups))
}

async fn resolve(state: &AppState, dto: UpdateUserDto) -> ApiResult<UserPatch> {
    let image_id = match dto.image_id {
        Some(Some(raw)) => {
            let id = Uuid::parse_str(&raw).map_err(|_| ApiError::field("imageId", "imageNotExists"))?;
            if files_repo::find_by_id(&state.db, id).await?.is_none() {
                return Err(ApiError::field("imageId", "imageNotExists"));
            }
            Some(Some(id))
        }
        Some(None) => Some(None),
        None => None,
    };

    let password_hash = match dto.password {
        Some(Some(plain)) => Some(Some(hash_password(&plain)?)),
        Some(None) => Some(None),
        None => None,
    };

    Ok(UserPatch {
        image_id,
        name: dto.name,
        email_verified: dto.email_verified,
        password_hash,
    })
}

pub async fn update(state: &AppState, user_id: Uuid, dto: UpdateUserDto) -> ApiResult<User> {
    let mut user = load(state, user_id).await?;
    let patch = resolve(state, dto).await?;
    patch.apply(&mut user);
    let saved = user.save(&state.db).await?;
    info!(%user_id, "user updated");
    Ok(saved)
}

pub async fn remove(state: &AppState, user_id: Uuid) -> ApiResult<()> {
    if !User::delete(&state.db, user_id).await? {
        return Err(ApiError::NotFound("User not found".into()));
    }
    info!(%user_id, "user deleted");
    Ok(())
}
