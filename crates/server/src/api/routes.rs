use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{favorites, handlers, middleware::metrics_middleware, movies, sync, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Reads: popular, top_rated, favorites, favorites/{id}
        .route("/movies/{*path}", get(movies::list_movies))
        // Favorites
        .route("/favorites", post(favorites::add_favorite))
        .route("/favorites/{id}", delete(favorites::remove_favorite))
        .route("/favorites/{id}/enrich", post(favorites::enrich_favorite))
        // Sync
        .route("/sync/status", get(sync::get_status))
        .route("/sync/{sort_key}", post(sync::run_sync))
        .route("/sort-mode/{sort_key}", put(sync::select_sort_mode));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws", get(ws::ws_handler))
        .route("/metrics", get(handlers::metrics))
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
