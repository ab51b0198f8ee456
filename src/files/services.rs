use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use super::repo::{self, FileRecord};
use crate::error::ApiError;
use crate::state::AppState;

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Checks type and size, writes the object, then records it.
pub async fn upload_file(
    st: &AppState,
    user_id: Uuid,
    item: UploadItem,
) -> Result<FileRecord, ApiError> {
    let ext = ext_from_mime(&item.content_type)
        .ok_or_else(|| ApiError::field("file", "cantUploadFileType"))?;
    if item.body.is_empty() {
        return Err(ApiError::field("file", "selectFile"));
    }
    if item.body.len() > st.config.storage.max_file_size {
        return Err(ApiError::PayloadTooLarge(format!(
            "file exceeds {} bytes",
            st.config.storage.max_file_size
        )));
    }

    let id = Uuid::new_v4();
    let key = object_key(user_id, id, ext);
    let size = item.body.len() as i64;
    st.storage.put(&key, item.body, &item.content_type).await?;

    let record = match repo::insert_file(&st.db, id, user_id, &key, &item.content_type, size).await
    {
        Ok(r) => r,
        Err(e) => {
            // don't leave an orphaned object behind
            if let Err(del) = st.storage.delete(&key).await {
                tracing::warn!(error = %del, %key, "cleanup after failed insert");
            }
            return Err(e.into());
        }
    };

    info!(file_id = %record.id, %user_id, size, "file uploaded");
    Ok(record)
}

pub async fn presign(st: &AppState, key: &str) -> anyhow::Result<String> {
    let ttl = Duration::from_secs(st.config.storage.url_ttl_seconds);
    st.storage
        .signed_url(key, ttl)
        .await
        .with_context(|| format!("presign url for key {}", key))
}

/// Time-limited URL for a file id, `None` when the file is gone.
pub async fn presign_by_id(st: &AppState, file_id: Uuid) -> anyhow::Result<Option<String>> {
    match repo::find_key(&st.db, file_id).await? {
        Some(key) => Ok(Some(presign(st, &key).await?)),
        None => Ok(None),
    }
}

fn object_key(user_id: Uuid, file_id: Uuid, ext: &str) -> String {
    format!("files/{}/{}.{}", user_id, file_id, ext)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/gif"), Some("gif"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
        assert_eq!(ext_from_mime("image/svg+xml"), None);
    }

    #[test]
    fn object_key_is_scoped_by_user() {
        let user = Uuid::nil();
        let file = Uuid::nil();
        assert_eq!(
            object_key(user, file, "png"),
            format!("files/{}/{}.png", user, file)
        );
    }

    #[tokio::test]
    async fn rejects_bad_type_and_size_before_storage() {
        let state = AppState::fake();

        let err = upload_file(
            &state,
            Uuid::new_v4(),
            UploadItem {
                body: Bytes::from_static(b"<svg/>"),
                content_type: "image/svg+xml".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        // fake config caps uploads at 1 KiB
        let err = upload_file(
            &state,
            Uuid::new_v4(),
            UploadItem {
                body: Bytes::from(vec![0u8; 2048]),
                content_type: "image/png".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn failed_insert_removes_stored_object() {
        let store = std::sync::Arc::new(crate::storage::MemoryStore::default());
        let mut state = AppState::fake();
        state.storage = store.clone();

        let err = upload_file(
            &state,
            Uuid::new_v4(),
            UploadItem {
                body: Bytes::from_static(b"\x89PNG"),
                content_type: "image/png".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn presign_uses_storage() {
        let state = AppState::fake();
        let url = presign(&state, "files/a/b.png").await.unwrap();
        assert!(url.contains("files/a/b.png"));
    }
}
