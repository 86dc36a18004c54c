use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::Utc;

use ledger_core::RepairId;
use ledger_warranty::RepairStatus;

use crate::app::{
    dto::{CreateRepairRequest, RepairListQuery, UpdateRepairStatusRequest},
    errors,
    services::AppServices,
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_repairs).post(create_repair))
        .route("/:id", get(get_repair).patch(update_status))
}

fn parse_repair_id(raw: &str) -> Result<RepairId, axum::response::Response> {
    raw.parse().map_err(errors::domain_error_to_response)
}

pub async fn create_repair(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<CreateRepairRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let cmd = match req.into_command() {
        Ok(cmd) => cmd,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.open_repair(cmd, Utc::now()).await {
        Ok(repair) => (StatusCode::CREATED, Json(repair)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_repairs(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<RepairListQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection_to_response(rejection),
    };
    let status = match query.status() {
        Ok(status) => status,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.list_repairs(status).await {
        Ok(repairs) => Json(repairs).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_repair(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_repair_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.get_repair(id).await {
        Ok(repair) => Json(repair).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateRepairStatusRequest>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_repair_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let next = match req.status.parse::<RepairStatus>() {
        Ok(next) => next,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.transition_repair(id, next, Utc::now()).await {
        Ok(repair) => Json(repair).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
