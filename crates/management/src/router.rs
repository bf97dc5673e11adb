//! Funnel builder API router: mounts all endpoints under /api/v1.

use crate::handlers::{self, ManagementState};
use crate::store::ManagementStore;
use axum::routing::{get, post, put};
use axum::Router;
use funnel_core::event_bus::tracing_sink;
use funnel_core::AppConfig;
use std::sync::Arc;

/// Build the API router backed by a fresh in-memory store.
/// Returns a Router that should be merged into the main app.
pub fn management_router(config: &AppConfig) -> Router {
    let store = ManagementStore::new(config.editor.clone()).with_event_sink(tracing_sink());
    if config.store.seed_demo_data {
        store.seed_demo_data();
    }
    router_with_store(Arc::new(store))
}

pub fn router_with_store(store: Arc<ManagementStore>) -> Router {
    let state = ManagementState { store };

    Router::new()
        // Funnels
        .route("/api/v1/funnels", get(handlers::list_funnels).post(handlers::create_funnel))
        .route("/api/v1/funnels/:id", get(handlers::get_funnel).put(handlers::update_funnel).delete(handlers::delete_funnel))
        .route("/api/v1/funnels/:id/publish", post(handlers::publish_funnel))
        .route("/api/v1/funnels/:id/archive", post(handlers::archive_funnel))
        .route("/api/v1/funnels/:id/validate", get(handlers::validate_funnel))
        .route("/api/v1/funnels/:id/actions", post(handlers::apply_actions))
        // Runtime
        .route("/api/v1/funnels/:id/pages/:page_id/next", post(handlers::next_page))
        .route("/api/v1/funnels/:id/pages/:page_id/elements/:element_id/quiz-result", post(handlers::quiz_result))
        .route("/api/v1/funnels/:id/views", post(handlers::record_view))
        // A/B tests
        .route("/api/v1/funnels/:id/ab-tests", post(handlers::create_ab_test))
        .route("/api/v1/funnels/:id/ab-tests/:test_id/variants", post(handlers::add_variant))
        .route("/api/v1/funnels/:id/ab-tests/:test_id/variants/:variant_id", axum::routing::delete(handlers::delete_variant))
        .route("/api/v1/funnels/:id/ab-tests/:test_id/variants/:variant_id/allocation", put(handlers::set_allocation))
        .route("/api/v1/funnels/:id/ab-tests/:test_id/start", post(handlers::start_ab_test))
        .route("/api/v1/funnels/:id/ab-tests/:test_id/pause", post(handlers::pause_ab_test))
        .route("/api/v1/funnels/:id/ab-tests/:test_id/resume", post(handlers::resume_ab_test))
        .route("/api/v1/funnels/:id/ab-tests/:test_id/complete", post(handlers::complete_ab_test))
        .route("/api/v1/funnels/:id/ab-tests/:test_id/evaluation", get(handlers::evaluate_ab_test))
        // Leads & analytics
        .route("/api/v1/funnels/:id/leads", get(handlers::list_leads).post(handlers::capture_lead))
        .route("/api/v1/funnels/:id/stats", get(handlers::funnel_stats))
        // Templates
        .route("/api/v1/templates", get(handlers::list_templates).post(handlers::create_template))
        .route("/api/v1/templates/:id/instantiate", post(handlers::instantiate_template))
        // Admin
        .route("/api/v1/admin/overview", get(handlers::admin_overview))
        .route("/api/v1/admin/audit-log", get(handlers::audit_log))
        .with_state(state)
}
