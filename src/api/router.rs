// src/api/router.rs
// Route composition for the HTTP runtime.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{admin, handlers, settings, tenants};
use crate::state::AppState;

pub fn http_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Query surface
        .route("/ask", post(handlers::ask))
        .route("/classify", post(handlers::classify))
        .route("/chat", post(handlers::chat))
        .route("/search", post(handlers::search))
        .route("/summary", post(handlers::summarize))
        // Tenant control plane
        .route("/tenants/{id}/channels", get(tenants::list_channels))
        .route(
            "/tenants/{id}/channels/{cid}/index",
            patch(tenants::set_channel_indexed),
        )
        .route("/tenants/{id}/stats", get(tenants::tenant_stats))
        .route("/tenants/{id}/stats/timeseries", get(tenants::stats_timeseries))
        .route("/tenants/{id}/stats/top-channels", get(tenants::top_channels))
        .route("/tenants/{id}/topics", get(tenants::topics))
        .route(
            "/tenants/{id}/personality-directive",
            get(tenants::get_personality_directive).put(tenants::put_personality_directive),
        )
        // Settings
        .route(
            "/settings/provider",
            get(settings::get_provider).put(settings::put_provider),
        )
        .route(
            "/settings/api-keys",
            get(settings::get_api_keys).put(settings::put_api_keys),
        )
        // Operator surface
        .route("/admin/queue/stats", get(admin::queue_stats))
        .route("/admin/queue/dead-letters/drain", post(admin::drain_dead_letters))
        .route("/admin/tenants/{id}/sync-health", get(admin::sync_health))
        .route("/admin/tenants/{id}/reindex", post(admin::reindex))
        .route("/admin/tenants/{id}/orphans", get(admin::scan_orphans))
        .route("/admin/tenants/{id}/topics/rebuild", post(admin::rebuild_topics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
