//! Axum router construction.
//!
//! Builds the application router with all routes, per-route body limits,
//! middleware layers and the OpenAPI document.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Slack on top of the upload limit for multipart boundaries and headers.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::videos::stream_video,
        routes::videos::list_videos,
        routes::uploads::create_upload,
        routes::uploads::upload_chunk,
        routes::uploads::complete_upload,
        routes::uploads::cancel_upload,
        routes::uploads::upload_files,
        routes::admin::tools,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::videos::VideoListItem,
        routes::uploads::CreateUploadResponse,
        crate::sessions::ChunkReceipt,
        crate::ingest::UploadResponse,
        cf_av::ToolInfo,
    ))
)]
pub struct ApiDoc;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let ingest = &ctx.config.ingest;
    let chunk_limit = DefaultBodyLimit::max(ingest.max_chunk_bytes);
    let multipart_limit = DefaultBodyLimit::max(
        usize::try_from(ingest.max_upload_bytes)
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD),
    );

    let api = Router::new()
        .route("/videos", get(routes::videos::list_videos))
        .route("/uploads", post(routes::uploads::create_upload))
        .route(
            "/uploads/{upload_id}/chunks",
            post(routes::uploads::upload_chunk).layer(chunk_limit),
        )
        .route(
            "/uploads/{upload_id}/complete",
            post(routes::uploads::complete_upload),
        )
        .route(
            "/uploads/{upload_id}",
            axum::routing::delete(routes::uploads::cancel_upload),
        )
        .route(
            "/upload",
            post(routes::uploads::upload_files).layer(multipart_limit),
        )
        .route("/admin/tools", get(routes::admin::tools));

    let cors_enabled = ctx.config.server.cors;

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/videos/{video_id}", get(routes::videos::stream_video))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any);
        app.layer(cors)
    } else {
        app
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use cf_av::ToolRegistry;
    use cf_core::config::Config;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(root: &std::path::Path) -> Router {
        let mut config = Config::default();
        config.storage.root = root.to_path_buf();
        config.transcription.enabled = false;
        config.ingest.max_chunk_bytes = 8;
        build_router(AppContext::from_config(config, ToolRegistry::empty()))
    }

    async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
        resp.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(dir.path())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_bytes(resp).await, br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn openapi_lists_video_route() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(dir.path())
            .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let doc: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert!(doc["paths"]["/videos/{video_id}"].is_object());
        assert!(doc["paths"]["/api/uploads/{upload_id}/chunks"].is_object());
    }

    #[tokio::test]
    async fn streams_with_suffix_and_range() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.webm"), b"0123456789").unwrap();

        let resp = app(dir.path())
            .oneshot(
                Request::get("/videos/clip.webm")
                    .header(header::RANGE, "bytes=2-5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(body_bytes(resp).await, b"2345");
    }

    #[tokio::test]
    async fn invalid_video_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(dir.path())
            .oneshot(Request::get("/videos/..%2Fsecret").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_bytes(resp).await, br#"{"error":"Video not found"}"#);
    }

    #[tokio::test]
    async fn oversized_chunk_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let resp = app
            .clone()
            .oneshot(Request::post("/api/uploads").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        let id = created["upload_id"].as_str().unwrap().to_string();

        let resp = app
            .oneshot(
                Request::post(format!("/api/uploads/{id}/chunks"))
                    .body(Body::from(vec![0u8; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(dir.path())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.headers().contains_key("x-request-id"));
    }
}
