//! Byte-range resolution and streamed responses for stored videos.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use futures::TryStreamExt;

use cf_core::{Error, VideoId};

use crate::store::{ByteStream, MediaStore};

/// An inclusive, satisfiable byte range within a resource of `size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

impl ByteRange {
    /// Resolve a `Range` header against the current resource size.
    ///
    /// Only the single-range forms `bytes=a-b` and `bytes=a-` are accepted.
    /// Suffix ranges, multiple ranges, inverted bounds and anything past the
    /// last byte are rejected rather than clamped.
    pub fn resolve(header: &str, size: u64) -> cf_core::Result<Self> {
        let invalid = || Error::invalid_range(header, size);

        let bounds = header.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
        let (first, last) = bounds.split_once('-').ok_or_else(invalid)?;
        let (first, last) = (first.trim(), last.trim());

        let start = parse_offset(first).ok_or_else(invalid)?;
        let end = if last.is_empty() {
            size.checked_sub(1).ok_or_else(invalid)?
        } else {
            parse_offset(last).ok_or_else(invalid)?
        };

        if start > end || end >= size {
            return Err(invalid());
        }
        Ok(Self { start, end, size })
    }

    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value, e.g. `bytes 200-499/1000`.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.size)
    }
}

/// Digits only; `u64::from_str` would also take a leading `+`.
fn parse_offset(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Answer a video request: 200 with the whole file, or 206 with the
/// requested range.
///
/// The body is read in the store's chunk size. Read errors after the headers
/// are sent can only cut the body short, so they are logged here.
pub async fn serve_video(
    store: &MediaStore,
    id: &VideoId,
    range_header: Option<&str>,
) -> cf_core::Result<Response> {
    let size = store.size(id).await?;

    let (status, length, content_range, stream) = match range_header {
        Some(value) => {
            let range = ByteRange::resolve(value, size)?;
            tracing::debug!(
                video_id = %id,
                start = range.start,
                end = range.end,
                size,
                "serving range"
            );
            let opened = store.open_range(id, range.start, range.end).await;
            let stream = opened_after_sizing(id, opened)?;
            (
                StatusCode::PARTIAL_CONTENT,
                range.content_length(),
                Some(range.content_range()),
                stream,
            )
        }
        None => {
            let stream = opened_after_sizing(id, store.open_full(id).await)?;
            (StatusCode::OK, size, None, stream)
        }
    };

    let mut response = Response::new(body_from(stream, id));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(store.container().mime_type()),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(value) = content_range {
        headers.insert(
            header::CONTENT_RANGE,
            HeaderValue::try_from(value).map_err(|e| Error::Internal(e.to_string()))?,
        );
    }

    Ok(response)
}

/// The video existed when it was sized, so a missing file at open time is a
/// server failure rather than a 404.
fn opened_after_sizing<T>(id: &VideoId, opened: cf_core::Result<T>) -> cf_core::Result<T> {
    opened.map_err(|e| match e {
        Error::NotFound { .. } => {
            Error::Internal(format!("video {id} vanished before it could be opened"))
        }
        other => other,
    })
}

fn body_from(stream: ByteStream, id: &VideoId) -> Body {
    let id = id.clone();
    Body::from_stream(stream.inspect_err(move |e| {
        tracing::warn!(video_id = %id, error = %e, "video stream aborted");
    }))
}
