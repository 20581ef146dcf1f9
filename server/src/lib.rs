//! # Bagcraft server
//!
//! Order management backend for a bag repair and manufacturing shop.
//!
//! Two order collections (repairs and job orders) live behind a dual-mode
//! order store: a shared Redis backend when `REDIS_URL` is configured, a
//! local JSON-file fallback otherwise. Successful writes are mirrored
//! best-effort into a Google Sheets spreadsheet when a sync config is
//! present; mirror failures downgrade the response to a partial success and
//! never touch the primary write. All order data sits behind an allow-listed
//! session guard.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod sheets;
pub mod state;
pub mod store;
pub mod sync;

use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let guarded = Router::new()
        .route(
            "/api/repairs",
            post(routes::create_repair).get(routes::list_repairs),
        )
        .route(
            "/api/repairs/{id}",
            put(routes::update_repair).delete(routes::delete_repair),
        )
        .route(
            "/api/repairs/{id}/attachment",
            post(routes::upload_repair_attachment),
        )
        .route("/api/repairs/live", get(routes::live_repairs))
        .route("/api/jobs", post(routes::create_job).get(routes::list_jobs))
        .route(
            "/api/jobs/{id}",
            put(routes::update_job).delete(routes::delete_job),
        )
        .route("/api/jobs/live", get(routes::live_jobs))
        .route(
            "/api/attachments/{collection}/{id}/{filename}",
            get(routes::get_attachment),
        )
        .route("/api/dashboard", get(routes::get_dashboard))
        .route("/api/sheets/repairs", get(routes::import_sheet_repairs))
        .route("/api/sheets/jobs", get(routes::import_sheet_jobs))
        .route(
            "/api/sheets/config",
            get(routes::get_sheets_config)
                .put(routes::save_sheets_config)
                .delete(routes::clear_sheets_config),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let app = Router::new()
        .merge(guarded)
        .route(
            "/api/auth/session",
            post(routes::create_session)
                .get(routes::current_session)
                .delete(routes::delete_session),
        )
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
