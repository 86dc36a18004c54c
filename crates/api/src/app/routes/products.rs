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

use ledger_core::ProductId;
use ledger_warranty::{RegisterProduct, EXPIRING_SOON_DAYS};

use crate::app::{
    dto::{self, CreateProductRequest, ExpiringQuery, ProductSearchQuery},
    errors,
    services::AppServices,
};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/expiring", get(expiring_products))
        .route("/:id", get(get_product).delete(delete_product))
        .route("/:id/in-warranty", get(in_warranty))
        .route("/:id/repairs", get(product_repairs))
}

fn parse_product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    raw.parse().map_err(errors::domain_error_to_response)
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let cmd = match RegisterProduct::try_from(req) {
        Ok(cmd) => cmd,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.register_product(cmd).await {
        Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ProductSearchQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection_to_response(rejection),
    };

    match services.list_products(query.q.as_deref()).await {
        Ok(products) => Json(products).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.get_product(id).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.delete_product(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn in_warranty(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let today = Utc::now().date_naive();
    match services.warranty_status(id, today).await {
        Ok((product, window)) => Json(dto::warranty_to_json(&product, &window)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn product_repairs(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.product_repairs(id).await {
        Ok(repairs) => Json(repairs).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn expiring_products(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ExpiringQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection_to_response(rejection),
    };

    let days = query.days.unwrap_or(EXPIRING_SOON_DAYS);
    let today = Utc::now().date_naive();
    match services.expiring_products(days, today).await {
        Ok(expiring) => Json(expiring).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
