use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use serde_json::json;

use crate::context::RequestContext;

pub async fn health(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "request_id": ctx.request_id() })),
    )
}
