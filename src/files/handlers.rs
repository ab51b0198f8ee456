use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::dto::{FileDto, FileResponse, FileUploadForm};
use super::repo;
use super::services::{self, upload_file, UploadItem};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    validation::ApiPath,
};

pub fn file_routes(max_file_size: usize) -> Router<AppState> {
    Router::new()
        // multipart framing on top of the file itself
        .route(
            "/files/upload",
            post(upload).layer(DefaultBodyLimit::max(max_file_size + 64 * 1024)),
        )
        .route("/files/:id", get(download))
}

#[utoipa::path(
    post,
    path = "/files/upload",
    request_body(content = FileUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = FileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "File too large"),
        (status = 422, description = "Missing file or unsupported type"),
    ),
    security(("bearer" = [])),
    tag = "Files"
)]
#[instrument(skip(state, mp))]
pub async fn upload(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> ApiResult<(StatusCode, Json<FileResponse>)> {
    let (form, content_type) = read_form(mp).await?;
    let item = UploadItem {
        body: form.file,
        content_type,
    };
    let record = upload_file(&state, user_id, item).await?;
    let path = services::presign(&state, &record.key).await?;

    Ok((
        StatusCode::CREATED,
        Json(FileResponse {
            file: FileDto {
                id: record.id,
                path,
                content_type: record.content_type,
                size: record.size,
                created_at: record.created_at,
            },
        }),
    ))
}

/// Temporary redirect to a presigned URL of the stored object.
#[utoipa::path(
    get,
    path = "/files/{id}",
    params(("id" = Uuid, Path, description = "File id")),
    responses(
        (status = 307, description = "Redirect to the file"),
        (status = 404, description = "File not found"),
    ),
    tag = "Files"
)]
#[instrument(skip(state))]
pub async fn download(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Redirect> {
    let Some(record) = repo::find_by_id(&state.db, id).await? else {
        warn!(file_id = %id, "file not found");
        return Err(ApiError::NotFound("File not found".into()));
    };
    let url = services::presign(&state, &record.key).await?;
    Ok(Redirect::temporary(&url))
}

/// The `file` part and its declared content type. Other parts are ignored.
async fn read_form(mut mp: Multipart) -> ApiResult<(FileUploadForm, String)> {
    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let file = field.bytes().await.map_err(multipart_error)?;
        return Ok((FileUploadForm { file }, content_type));
    }
    Err(ApiError::field("file", "selectFile"))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}
