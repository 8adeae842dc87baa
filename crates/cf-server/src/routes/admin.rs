//! Operational route handlers.

use axum::extract::State;
use axum::Json;

use crate::context::AppContext;
use crate::error::AppError;

/// GET /api/admin/tools
#[utoipa::path(
    get,
    path = "/api/admin/tools",
    responses(
        (status = 200, description = "List external tool availability", body = Vec<cf_av::ToolInfo>)
    )
)]
pub async fn tools(State(ctx): State<AppContext>) -> Result<Json<Vec<cf_av::ToolInfo>>, AppError> {
    // Version probing spawns processes synchronously.
    let infos = tokio::task::spawn_blocking(move || ctx.tools.check_all())
        .await
        .map_err(|e| cf_core::Error::Internal(format!("spawn_blocking join error: {e}")))?;
    Ok(Json(infos))
}
