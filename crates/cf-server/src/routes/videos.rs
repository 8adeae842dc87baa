//! Stored video delivery and listing.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use cf_core::{Error, VideoId};

use crate::context::AppContext;
use crate::error::AppError;
use crate::ingest::video_link;

use super::streaming_helpers::serve_video;

/// One entry of `GET /api/videos`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VideoListItem {
    #[schema(value_type = String)]
    pub id: VideoId,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    pub link: String,
}

/// GET /videos/{video_id}
///
/// Streams the stored file, honoring a single `Range: bytes=start-end`
/// request. The id may carry the `.webm` suffix used by upload links.
#[utoipa::path(
    get,
    path = "/videos/{video_id}",
    params(
        ("video_id" = String, Path, description = "Video ID, optionally suffixed with .webm"),
        ("Range" = Option<String>, Header, description = "Single byte range, e.g. bytes=0-1023")
    ),
    responses(
        (status = 200, description = "Whole video", content_type = "video/webm"),
        (status = 206, description = "Requested byte range", content_type = "video/webm"),
        (status = 404, description = "Video not found"),
        (status = 416, description = "Range not satisfiable")
    )
)]
pub async fn stream_video(
    State(ctx): State<AppContext>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = resolve_id(&ctx, &video_id)?;

    // A header that is not visible ASCII cannot be a valid range.
    let range_header = headers
        .get(header::RANGE)
        .map(|v| v.to_str().unwrap_or_default());

    Ok(serve_video(&ctx.store, &id, range_header).await?)
}

/// GET /api/videos
#[utoipa::path(
    get,
    path = "/api/videos",
    responses(
        (status = 200, description = "All stored videos, sorted by id", body = Vec<VideoListItem>)
    )
)]
pub async fn list_videos(State(ctx): State<AppContext>) -> Result<Json<Vec<VideoListItem>>, AppError> {
    let items = ctx
        .store
        .list()
        .await?
        .into_iter()
        .map(|entry| VideoListItem {
            link: video_link(&entry.id),
            id: entry.id,
            size_bytes: entry.size_bytes,
            modified: entry.modified,
        })
        .collect();

    Ok(Json(items))
}

/// Map a path segment to a stored video id.
///
/// Anything that is not a valid id cannot name a stored file, so it is
/// reported exactly like a missing video.
fn resolve_id(ctx: &AppContext, raw: &str) -> cf_core::Result<VideoId> {
    let suffix = format!(".{}", ctx.store.container().extension());
    let stem = raw.strip_suffix(suffix.as_str()).unwrap_or(raw);
    stem.parse().map_err(|_| Error::not_found("Video", stem))
}
