use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Unauthenticated, read-only endpoints. The wall handler only ever returns
/// approved student/faculty records and college records.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /wall?category=&type=&year=&department=
        // The public gallery for one category, with filter facets.
        .route("/wall", get(handlers::get_wall))
}
