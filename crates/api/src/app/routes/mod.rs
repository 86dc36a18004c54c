use axum::Router;

pub mod products;
pub mod repairs;
pub mod reports;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/repairs", repairs::router())
        .nest("/reports", reports::router())
}
