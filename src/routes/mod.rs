use axum::{
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, security_headers};
use crate::handlers::{health_check, scan, AppState};

pub fn create_routes(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/api/scan", post(scan::scan_ticket))
        .route("/api/scan/batch", post(scan::scan_batch))
        .route("/api/scan/sync", post(scan::scan_sync))
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer())
        .with_state(state);

    for (name, value) in security_headers() {
        router = router.layer(SetResponseHeaderLayer::overriding(name, value));
    }

    router
}
