//! HTTP surface: routing, shared state, and the serve loop.
//!
//! The API is a thin session-scoped façade over the library: every
//! authenticated route reads the `x-session-id` header, resolves the
//! session in the [`SessionStore`], and delegates to the client or the
//! pipeline. CORS is wide open because the expected caller is a browser
//! front-end served from a different origin.

pub mod handlers;
pub mod types;

pub use handlers::SESSION_HEADER;

use crate::cleanup::CleanupHandle;
use crate::config::AppConfig;
use crate::error::ReportError;
use crate::session::SessionStore;
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub config: Arc<AppConfig>,
    /// Pending deferred-cleanup sweeps, keyed by session id, so a combine,
    /// reset, or logout can cancel an earlier one instead of racing it.
    pub cleanups: Arc<Mutex<HashMap<String, CleanupHandle>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            store: SessionStore::new(),
            config: Arc::new(config),
            cleanups: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/login", post(handlers::login))
        .route("/api/v1/logout", post(handlers::logout))
        .route("/api/v1/session", get(handlers::session_status))
        .route("/api/v1/slots", post(handlers::set_slots))
        .route("/api/v1/projects", get(handlers::list_projects))
        .route(
            "/api/v1/projects/{project_name}/workbooks",
            get(handlers::list_workbooks),
        )
        .route(
            "/api/v1/workbooks/{workbook_id}/views",
            get(handlers::list_views),
        )
        .route("/api/v1/export", post(handlers::export))
        .route("/api/v1/crop", post(handlers::crop))
        .route("/api/v1/combine", post(handlers::combine))
        .route("/api/v1/download", get(handlers::download))
        .route("/api/v1/reset", post(handlers::reset))
        .route("/api/v1/images/{filename}", get(handlers::serve_image))
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(config: AppConfig, addr: SocketAddr) -> Result<(), ReportError> {
    config.ensure_dirs()?;
    let state = AppState::new(config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ReportError::Internal(format!("failed to bind {addr}: {e}")))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| ReportError::Internal(format!("server error: {e}")))
}
