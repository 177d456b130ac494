pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::wine::handlers;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Sessions
        .route(
            "/api/v1/sessions",
            post(handlers::handle_login).delete(handlers::handle_logout),
        )
        // Imports
        .route("/api/v1/imports", post(handlers::handle_import))
        // Library
        .route(
            "/api/v1/library",
            get(handlers::handle_list_library).delete(handlers::handle_clear_library),
        )
        .route(
            "/api/v1/library/records",
            post(handlers::handle_commit_record),
        )
        .route(
            "/api/v1/library/records/:id",
            get(handlers::handle_get_record)
                .put(handlers::handle_update_record)
                .delete(handlers::handle_delete_record),
        )
        .route("/api/v1/library/export", get(handlers::handle_export))
        // Review
        .route(
            "/api/v1/suggestions",
            get(handlers::handle_list_suggestions),
        )
        .route(
            "/api/v1/suggestions/:id",
            post(handlers::handle_resolve_suggestion),
        )
        .route("/api/v1/selection", post(handlers::handle_selection))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}
