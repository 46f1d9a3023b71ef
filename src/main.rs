use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use gatecheck_server::config::Config;
use gatecheck_server::handlers::AppState;
use gatecheck_server::routes::create_routes;
use gatecheck_server::scan::{PgScanStore, ScanEngine, TracingAuditSink};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store = Arc::new(PgScanStore::new(pool));
    let engine = ScanEngine::new(store, Arc::new(TracingAuditSink));
    let app: Router = create_routes(AppState { engine });

    tracing::info!("Check-in API listening at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
