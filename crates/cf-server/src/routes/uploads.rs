//! Upload route handlers: chunked sessions and whole-file multipart uploads.

use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::rejection::BytesRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use cf_core::{Error, UploadId};

use crate::context::AppContext;
use crate::error::AppError;
use crate::ingest::{self, PendingUpload, StagedFile, UploadResponse};
use crate::sessions::ChunkReceipt;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateUploadResponse {
    #[schema(value_type = String)]
    pub upload_id: UploadId,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ChunkParams {
    /// Expected position of this chunk; must equal the number already stored.
    pub index: Option<usize>,
}

/// POST /api/uploads
#[utoipa::path(
    post,
    path = "/api/uploads",
    responses(
        (status = 201, description = "Upload session created", body = CreateUploadResponse)
    )
)]
pub async fn create_upload(State(ctx): State<AppContext>) -> Result<impl IntoResponse, AppError> {
    let upload_id = ctx.sessions.create().await?;
    Ok((StatusCode::CREATED, Json(CreateUploadResponse { upload_id })))
}

/// POST /api/uploads/{upload_id}/chunks
#[utoipa::path(
    post,
    path = "/api/uploads/{upload_id}/chunks",
    params(("upload_id" = String, Path, description = "Upload session ID"), ChunkParams),
    request_body(content = String, content_type = "application/octet-stream", description = "Raw chunk bytes"),
    responses(
        (status = 200, description = "Chunk stored", body = ChunkReceipt),
        (status = 400, description = "Empty or out-of-order chunk"),
        (status = 404, description = "Upload not found"),
        (status = 413, description = "Chunk or upload too large")
    )
)]
pub async fn upload_chunk(
    State(ctx): State<AppContext>,
    Path(upload_id): Path<String>,
    Query(params): Query<ChunkParams>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChunkReceipt>, AppError> {
    let id = parse_upload_id(&upload_id)?;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge(format!(
                "chunk exceeds {} bytes",
                ctx.config.ingest.max_chunk_bytes
            ))
        } else {
            Error::Validation(rejection.body_text())
        }
    })?;

    let receipt = ctx.sessions.append_chunk(id, params.index, &body).await?;
    tracing::debug!(
        upload_id = %id,
        index = receipt.index,
        total_bytes = receipt.total_bytes,
        "Chunk stored"
    );
    Ok(Json(receipt))
}

/// POST /api/uploads/{upload_id}/complete
#[utoipa::path(
    post,
    path = "/api/uploads/{upload_id}/complete",
    params(("upload_id" = String, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Video stored", body = UploadResponse),
        (status = 400, description = "Upload has no chunks"),
        (status = 404, description = "Upload not found"),
        (status = 502, description = "Compilation failed")
    )
)]
pub async fn complete_upload(
    State(ctx): State<AppContext>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadResponse>, AppError> {
    let id = parse_upload_id(&upload_id)?;
    let session = ctx.sessions.take(id).await?;
    let response = ingest::complete_session(&ctx, session).await?;
    Ok(Json(response))
}

/// DELETE /api/uploads/{upload_id}
#[utoipa::path(
    delete,
    path = "/api/uploads/{upload_id}",
    params(("upload_id" = String, Path, description = "Upload session ID")),
    responses(
        (status = 204, description = "Upload discarded"),
        (status = 404, description = "Upload not found")
    )
)]
pub async fn cancel_upload(
    State(ctx): State<AppContext>,
    Path(upload_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_upload_id(&upload_id)?;
    if ctx.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Upload", id).into())
    }
}

/// POST /api/upload
///
/// Every file field is staged in arrival order. Fields without a file name
/// are ignored.
#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = String, content_type = "multipart/form-data", description = "One or more video files"),
    responses(
        (status = 200, description = "Video stored", body = UploadResponse),
        (status = 400, description = "No files or unsupported file type"),
        (status = 413, description = "Upload too large")
    )
)]
pub async fn upload_files(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut pending = PendingUpload::new(&ctx.store)?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let container = ctx
            .config
            .ingest
            .accepts(&file_name)
            .ok_or_else(|| Error::Validation(format!("unsupported file type: {file_name}")))?;

        let path = pending.next_path(container);
        let budget = ctx
            .config
            .ingest
            .max_upload_bytes
            .saturating_sub(pending.total_bytes());
        let size_bytes = stage_field(field, &path, budget).await?;

        if size_bytes == 0 {
            return Err(Error::Validation(format!("{file_name} is empty")).into());
        }

        tracing::debug!(file = %file_name, bytes = size_bytes, "Staged upload file");
        pending.push(StagedFile {
            path,
            container,
            size_bytes,
        });
    }

    let response = ingest::complete_files(&ctx, pending).await?;
    Ok(Json(response))
}

/// Stream one multipart field to `path`, failing once `budget` is exceeded.
async fn stage_field(mut field: Field<'_>, path: &std::path::Path, budget: u64) -> cf_core::Result<u64> {
    let mut writer = BufWriter::new(File::create(path).await?);
    let mut written = 0u64;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len() as u64;
        if written > budget {
            return Err(Error::PayloadTooLarge("upload exceeds the size limit".into()));
        }
        writer.write_all(&chunk).await?;
    }

    writer.flush().await?;
    Ok(written)
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(e.body_text())
    } else {
        Error::Validation(format!("invalid multipart body: {}", e.body_text()))
    }
}

/// Unknown and malformed ids are both reported as a missing upload.
fn parse_upload_id(raw: &str) -> cf_core::Result<UploadId> {
    raw.parse().map_err(|_| Error::not_found("Upload", raw))
}
