use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Extension, Json, Router};
use chrono::Utc;

use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new().route("/summary", get(summary))
}

pub async fn summary(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.summary(Utc::now()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
