use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod dates;
pub mod error;
pub mod export;
pub mod handlers;
pub mod import;
pub mod models;
pub mod repository;
pub mod roles;
pub mod wall;

// Routing, split by access level (public, authenticated, admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use roles::{RoleCache, RoleCacheState};

/// Inline data-URL images make submissions large; allow up to 10 MiB bodies.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// ApiDoc
///
/// OpenAPI document for every `#[utoipa::path]` handler and the schemas they
/// use. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session, handlers::end_session, handlers::get_me,
        handlers::get_wall, handlers::create_achievement, handlers::get_my_achievements,
        handlers::get_moderation_queue, handlers::update_achievement_status,
        handlers::list_users, handlers::upsert_user, handlers::change_user_role,
        handlers::delete_user, handlers::import_users, handlers::get_audit_log,
        handlers::get_admin_stats, handlers::export_preview, handlers::export_pdf,
        handlers::export_xlsx
    ),
    components(
        schemas(
            models::Role, models::AchievementCategory, models::AchievementStatus,
            models::UserRecord, models::Achievement, models::AuditEntry,
            models::CreateAchievementRequest, models::StatusUpdateRequest,
            models::UpsertUserRequest, models::ChangeRoleRequest, models::SessionResponse,
            models::ImportSummary, models::WallFacets, models::WallResponse,
            models::AdminDashboardStats, export::ExportRecord, import::ImportFormat,
            error::ErrorBody,
        )
    ),
    tags(
        (name = "achievements-portal", description = "College Achievements Portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared state: every service a handler or extractor may need.
/// Cloned per request; all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Persistence (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Resolved roles per email, with a bounded staleness window.
    pub roles: RoleCacheState,
    pub config: AppConfig,
    /// Outbound client used to fetch remote images during PDF export.
    pub http: reqwest::Client,
}

impl AppState {
    /// Builds the state around a repository, with a fresh role cache sized
    /// from the config.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            repo,
            roles: std::sync::Arc::new(RoleCache::new(config.role_cache_ttl)),
            config,
            http: reqwest::Client::new(),
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for RoleCacheState {
    fn from_ref(app_state: &AppState) -> RoleCacheState {
        app_state.roles.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards the authenticated routes. Extracting `AuthUser` runs token
/// validation and role resolution; a failure short-circuits with the
/// extractor's 401/403 before the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles all routes, the scoped auth middleware, the shared state and the
/// observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin handlers authorize themselves through the `AdminUser` extractor.
        .nest("/admin", admin::admin_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens one span per request carrying method, URI and the `x-request-id`
/// set by `SetRequestIdLayer`, so every log line of a request correlates.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
