use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Moderation, user management, audit and export. Each handler takes the
/// `AdminUser` extractor, which re-checks admin membership against the store
/// on every request instead of trusting the role cache.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        .route("/stats", get(handlers::get_admin_stats))
        // --- Moderation ---
        // GET /admin/queue
        // Pending student and faculty achievements, merged.
        .route("/queue", get(handlers::get_moderation_queue))
        // PUT /admin/achievements/{category}/{id}/status
        // Approve or reject. The first decision wins; later ones get 409.
        .route(
            "/achievements/{category}/{id}/status",
            put(handlers::update_achievement_status),
        )
        // --- Users ---
        .route(
            "/users",
            get(handlers::list_users).post(handlers::upsert_user),
        )
        // POST /admin/users/import?format=csv|xlsx
        .route("/users/import", post(handlers::import_users))
        .route("/users/{email}/role", put(handlers::change_user_role))
        // DELETE /admin/users/{email}?role=
        .route("/users/{email}", delete(handlers::delete_user))
        // --- Audit ---
        // GET /admin/audit?all=true
        .route("/audit", get(handlers::get_audit_log))
        // --- Export ---
        .route("/export", get(handlers::export_preview))
        .route("/export/pdf", get(handlers::export_pdf))
        .route("/export/xlsx", get(handlers::export_xlsx))
}
