use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Endpoints for any user whose email resolves to a role group. Every handler
/// takes the resolved `AuthUser`; the submitter identity is never read from a
/// request body.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /session    login: resolve the role and the dashboard to open
        // DELETE /session  logout: drop the cached role
        .route(
            "/session",
            post(handlers::create_session).delete(handlers::end_session),
        )
        // GET /me
        .route("/me", get(handlers::get_me))
        // GET /me/achievements?type=&status=&date=
        // The caller's own submissions, including pending and rejected ones.
        .route("/me/achievements", get(handlers::get_my_achievements))
        // POST /achievements
        // Submission into the caller's group. Admin submissions are college achievements.
        .route("/achievements", post(handlers::create_achievement))
}
