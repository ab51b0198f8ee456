use anyhow::Context;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Uploaded file entry. The bytes live in the object store under `key`.
#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub key: String,
    pub content_type: String,
    pub size: i64,
    pub created_at: OffsetDateTime,
}

pub async fn insert_file(
    db: &PgPool,
    id: Uuid,
    user_id: Uuid,
    key: &str,
    content_type: &str,
    size: i64,
) -> anyhow::Result<FileRecord> {
    let row = sqlx::query_as::<_, FileRecord>(
        r#"
        INSERT INTO files (id, user_id, key, content_type, size)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, key, content_type, size, created_at
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(key)
    .bind(content_type)
    .bind(size)
    .fetch_one(db)
    .await
    .context("insert file")?;

    Ok(row)
}

// ---- Queries ----

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<FileRecord>> {
    let row = sqlx::query_as::<_, FileRecord>(
        r#"
        SELECT id, key, content_type, size, created_at
          FROM files
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("find file by id")?;

    Ok(row)
}

/// Object-store key of a file, if it exists.
pub async fn find_key(db: &PgPool, id: Uuid) -> anyhow::Result<Option<String>> {
    let key = sqlx::query_scalar::<_, String>(r#"SELECT key FROM files WHERE id = $1"#)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find file key")?;

    Ok(key)
}
