use crate::{
    AppState,
    auth::{AdminUser, AuthUser},
    error::{AppError, AppResult, ErrorBody},
    export::{self, ExportRecord, pdf, xlsx},
    import::{self, ImportFormat},
    models::{
        Achievement, AchievementCategory, AchievementStatus, AdminDashboardStats, AuditEntry,
        ChangeRoleRequest, CreateAchievementRequest, ImportSummary, NewAchievement, Role,
        SessionResponse, StatusUpdateRequest, UpsertUserRequest, UserRecord, WallResponse,
    },
    repository::ModerationOutcome,
    wall::{self, WallFilter},
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

// --- Filter Structs ---

/// MyAchievementsFilter
///
/// Query parameters of `GET /me/achievements`. All filters are exact matches.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct MyAchievementsFilter {
    #[serde(rename = "type")]
    pub achievement_type: Option<String>,
    pub status: Option<AchievementStatus>,
    pub date: Option<String>,
}

/// DeleteUserQuery
///
/// The group to remove the user from.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct DeleteUserQuery {
    pub role: Role,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ImportQuery {
    /// csv or xlsx. Falls back to the request Content-Type.
    pub format: Option<ImportFormat>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct AuditQuery {
    /// Every admin's entries instead of only the caller's.
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ExportQuery {
    /// Exact achievement date, `YYYY-MM-DD`.
    pub date: Option<String>,
}

// --- Validation Helpers ---

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// --- Session ---

/// create_session
///
/// [Authenticated Route] Login. Resolves the caller's role (admin, then faculty,
/// then student) and tells the client which dashboard to open. An email found
/// in no group never gets here: the extractor answers 403.
#[utoipa::path(
    post,
    path = "/session",
    responses(
        (status = 200, description = "Role resolved", body = SessionResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Email not found in system", body = ErrorBody)
    )
)]
pub async fn create_session(user: AuthUser) -> Json<SessionResponse> {
    tracing::info!(email = %user.email, role = %user.role, "session started");
    Json(SessionResponse {
        home: user.role.home().to_string(),
        email: user.email,
        name: user.name,
        role: user.role,
    })
}

/// end_session
///
/// [Authenticated Route] Logout. Drops the cached role so the next login
/// resolves against the store again.
#[utoipa::path(
    delete,
    path = "/session",
    responses((status = 204, description = "Logged out"))
)]
pub async fn end_session(user: AuthUser, State(state): State<AppState>) -> StatusCode {
    state.roles.invalidate(&user.email).await;
    StatusCode::NO_CONTENT
}

/// get_me
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserRecord))
)]
pub async fn get_me(user: AuthUser) -> Json<UserRecord> {
    Json(UserRecord {
        name: user.name,
        email: user.email,
        role: user.role,
    })
}

// --- Public Wall ---

/// get_wall
///
/// [Public Route] Approved achievements of one category (college: all of them),
/// filtered and sorted newest first, with the facets of the unfiltered set.
/// No matches is a 200 with a message, never an error.
#[utoipa::path(
    get,
    path = "/wall",
    params(WallFilter),
    responses((status = 200, description = "Public wall", body = WallResponse))
)]
pub async fn get_wall(
    State(state): State<AppState>,
    Query(filter): Query<WallFilter>,
) -> AppResult<Json<WallResponse>> {
    let category = filter.category.unwrap_or_default();
    let status = category
        .is_moderated()
        .then_some(AchievementStatus::Approved);
    let records = state.repo.list_achievements(category, status).await?;
    Ok(Json(wall::build_wall(category, records, &filter)))
}

// --- Submissions ---

/// create_achievement
///
/// [Authenticated Route] Submits an achievement into the caller's group:
/// students and faculty into their moderated tables (starting `pending`),
/// admins into the public college table. Identity comes from the session.
#[utoipa::path(
    post,
    path = "/achievements",
    request_body = CreateAchievementRequest,
    responses(
        (status = 201, description = "Created", body = Achievement),
        (status = 400, description = "Missing field or bad image", body = ErrorBody)
    )
)]
pub async fn create_achievement(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateAchievementRequest>,
) -> AppResult<(StatusCode, Json<Achievement>)> {
    let category = user.role.submission_category();

    let title = required("title", &payload.title)?;
    let date = required("date", &payload.date)?;
    let achievement_type = required("type", &payload.achievement_type)?;
    let image = required("image", &payload.image)?;
    if !image.starts_with("data:image/") {
        return Err(AppError::Validation(
            "image must be an inline data:image/ URL".to_string(),
        ));
    }
    let description = match category {
        AchievementCategory::College => {
            required("description", payload.description.as_deref().unwrap_or_default())?
        }
        _ => optional(payload.description).unwrap_or_default(),
    };

    let new = NewAchievement {
        title,
        description,
        date,
        achievement_type,
        image,
        email: user.email,
        name: user.name,
        roll_no: optional(payload.roll_no),
        department: optional(payload.department),
    };

    let achievement = state.repo.create_achievement(category, new).await?;
    tracing::info!(id = %achievement.id, %category, "achievement submitted");
    Ok((StatusCode::CREATED, Json(achievement)))
}

/// get_my_achievements
///
/// [Authenticated Route] The caller's own submissions in every state, newest first.
#[utoipa::path(
    get,
    path = "/me/achievements",
    params(MyAchievementsFilter),
    responses((status = 200, description = "My submissions", body = [Achievement]))
)]
pub async fn get_my_achievements(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<MyAchievementsFilter>,
) -> AppResult<Json<Vec<Achievement>>> {
    let mut achievements = state
        .repo
        .list_submissions(user.role.submission_category(), &user.email)
        .await?;

    let wanted_type = blank_to_none(&filter.achievement_type);
    let wanted_date = blank_to_none(&filter.date);
    achievements.retain(|a| {
        wanted_type.is_none_or(|t| a.achievement_type == t)
            && filter.status.is_none_or(|s| a.status == Some(s))
            && wanted_date.is_none_or(|d| a.date == d)
    });
    wall::sort_newest_first(&mut achievements);
    Ok(Json(achievements))
}

// --- Moderation ---

/// get_moderation_queue
///
/// [Admin Route] Every pending student and faculty achievement in one list,
/// each tagged with its source category.
#[utoipa::path(
    get,
    path = "/admin/queue",
    responses(
        (status = 200, description = "Pending achievements", body = [Achievement]),
        (status = 403, description = "Not an admin", body = ErrorBody)
    )
)]
pub async fn get_moderation_queue(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Achievement>>> {
    let mut queue = state
        .repo
        .list_achievements(AchievementCategory::Student, Some(AchievementStatus::Pending))
        .await?;
    queue.extend(
        state
            .repo
            .list_achievements(AchievementCategory::Faculty, Some(AchievementStatus::Pending))
            .await?,
    );
    Ok(Json(queue))
}

/// update_achievement_status
///
/// [Admin Route] Approves or rejects a pending achievement and records the
/// decision in the audit log. Only a pending record can be decided; a second
/// decision is a 409.
#[utoipa::path(
    put,
    path = "/admin/achievements/{category}/{id}/status",
    params(
        ("category" = AchievementCategory, Path, description = "student or faculty"),
        ("id" = Uuid, Path, description = "Achievement ID")
    ),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Decision applied", body = Achievement),
        (status = 400, description = "Invalid decision", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody),
        (status = 409, description = "Already decided", body = ErrorBody)
    )
)]
pub async fn update_achievement_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path((category, id)): Path<(AchievementCategory, Uuid)>,
    Json(payload): Json<StatusUpdateRequest>,
) -> AppResult<Json<Achievement>> {
    if !category.is_moderated() {
        return Err(AppError::Validation(
            "college achievements are not moderated".to_string(),
        ));
    }
    if payload.status == AchievementStatus::Pending {
        return Err(AppError::Validation(
            "status must be approved or rejected".to_string(),
        ));
    }

    match state
        .repo
        .decide(category, id, payload.status, &admin.email)
        .await?
    {
        ModerationOutcome::Applied(achievement) => {
            tracing::info!(
                %id,
                %category,
                status = %payload.status,
                admin = %admin.email,
                "achievement moderated"
            );
            Ok(Json(achievement))
        }
        ModerationOutcome::AlreadyDecided(current) => Err(AppError::Conflict(format!(
            "Achievement already {current}"
        ))),
        ModerationOutcome::NotFound => Err(AppError::NotFound("Achievement".to_string())),
    }
}

// --- User Management ---

/// list_users
///
/// [Admin Route] Every user of every group: admins, then faculty, then students.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "All users", body = [UserRecord]))
)]
pub async fn list_users(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<UserRecord>>> {
    Ok(Json(state.repo.list_users().await?))
}

/// upsert_user
///
/// [Admin Route] Adds a user, or moves an existing one into the group of the
/// given role. Any other group membership is removed in the same transaction.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = UpsertUserRequest,
    responses(
        (status = 200, description = "Saved", body = UserRecord),
        (status = 400, description = "Blank name or email", body = ErrorBody)
    )
)]
pub async fn upsert_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<UpsertUserRequest>,
) -> AppResult<Json<UserRecord>> {
    let user = UserRecord {
        name: required("name", &payload.name)?,
        email: required("email", &payload.email)?,
        role: payload.role,
    };
    let saved = state.repo.upsert_user(user, &admin.email).await?;
    state.roles.invalidate(&saved.email).await;
    Ok(Json(saved))
}

/// change_user_role
///
/// [Admin Route] Moves a user to another group. The move and its single
/// `role_changed` audit entry happen atomically.
#[utoipa::path(
    put,
    path = "/admin/users/{email}/role",
    params(("email" = String, Path, description = "User email")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserRecord),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn change_user_role(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(payload): Json<ChangeRoleRequest>,
) -> AppResult<Json<UserRecord>> {
    let updated = state
        .repo
        .change_role(&email, payload.role, &admin.email)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;
    state.roles.invalidate(&email).await;
    tracing::info!(%email, role = %payload.role, admin = %admin.email, "role changed");
    Ok(Json(updated))
}

/// delete_user
///
/// [Admin Route] Removes a user from one group.
#[utoipa::path(
    delete,
    path = "/admin/users/{email}",
    params(("email" = String, Path, description = "User email"), DeleteUserQuery),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(email): Path<String>,
    Query(query): Query<DeleteUserQuery>,
) -> AppResult<StatusCode> {
    let deleted = state
        .repo
        .delete_user(&email, query.role, &admin.email)
        .await?;
    state.roles.invalidate(&email).await;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("User".to_string()))
    }
}

/// import_users
///
/// [Admin Route] Bulk upsert from a CSV or XLSX body with `name`, `email` and
/// `role` columns. Bad rows are counted, never fatal; only an unreadable file
/// is rejected.
#[utoipa::path(
    post,
    path = "/admin/users/import",
    params(ImportQuery),
    request_body(
        content = Vec<u8>,
        description = "CSV or workbook file",
        content_type = "application/octet-stream"
    ),
    responses(
        (status = 200, description = "Import finished", body = ImportSummary),
        (status = 400, description = "Unreadable file", body = ErrorBody)
    )
)]
pub async fn import_users(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ImportSummary>> {
    let format = query
        .format
        .or_else(|| {
            headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(ImportFormat::from_content_type)
        })
        .ok_or_else(|| {
            AppError::Validation("unsupported file; use ?format=csv or ?format=xlsx".to_string())
        })?;

    let rows = import::parse_rows(format, &body)?;
    let outcome = import::import_users(state.repo.as_ref(), &rows, &admin.email).await;
    for email in &outcome.imported {
        state.roles.invalidate(email).await;
    }

    tracing::info!(
        ?format,
        succeeded = outcome.summary.succeeded,
        failed = outcome.summary.failed,
        admin = %admin.email,
        "bulk import"
    );
    Ok(Json(outcome.summary))
}

// --- Audit & Stats ---

/// get_audit_log
///
/// [Admin Route] Audit entries, newest first. Only the caller's own actions
/// unless `all=true`.
#[utoipa::path(
    get,
    path = "/admin/audit",
    params(AuditQuery),
    responses((status = 200, description = "Audit entries", body = [AuditEntry]))
)]
pub async fn get_audit_log(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<Vec<AuditEntry>>> {
    let scope = (!query.all).then_some(admin.email.as_str());
    Ok(Json(state.repo.list_audit(scope).await?))
}

/// get_admin_stats
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Stats", body = AdminDashboardStats))
)]
pub async fn get_admin_stats(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<AdminDashboardStats>> {
    Ok(Json(state.repo.stats().await?))
}

// --- Export ---

fn attachment(content_type: &str, file_name: String, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// export_preview
///
/// [Admin Route] The rows a PDF or XLSX export would contain, as JSON.
#[utoipa::path(
    get,
    path = "/admin/export",
    params(ExportQuery),
    responses((status = 200, description = "Export rows", body = [ExportRecord]))
)]
pub async fn export_preview(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Json<Vec<ExportRecord>>> {
    let achievements = export::collect_approved(state.repo.as_ref(), query.date.as_deref()).await?;
    Ok(Json(achievements.iter().map(ExportRecord::from).collect()))
}

/// export_pdf
///
/// [Admin Route] Approved achievements as an A4 report, one per page.
#[utoipa::path(
    get,
    path = "/admin/export/pdf",
    params(ExportQuery),
    responses(
        (
            status = 200,
            description = "PDF report",
            content_type = "application/pdf",
            body = Vec<u8>
        ),
        (status = 500, description = "Rendering failed", body = ErrorBody)
    )
)]
pub async fn export_pdf(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let achievements = export::collect_approved(state.repo.as_ref(), query.date.as_deref()).await?;
    let images =
        export::load_images(&state.http, &achievements, state.config.image_fetch_timeout).await;
    let records: Vec<ExportRecord> = achievements.iter().map(ExportRecord::from).collect();

    let bytes = tokio::task::spawn_blocking(move || pdf::render_pdf(&records, &images))
        .await
        .map_err(export::ExportError::from)??;

    tracing::info!(pages = achievements.len().max(1), admin = %admin.email, "pdf export");
    let file_name = export::file_name(
        &state.config.export_file_prefix,
        "Achievements_Report",
        "pdf",
    );
    Ok(attachment("application/pdf", file_name, bytes))
}

/// export_xlsx
///
/// [Admin Route] Approved achievements as a single-sheet workbook.
#[utoipa::path(
    get,
    path = "/admin/export/xlsx",
    params(ExportQuery),
    responses(
        (
            status = 200,
            description = "Workbook",
            content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            body = Vec<u8>
        ),
        (status = 500, description = "Rendering failed", body = ErrorBody)
    )
)]
pub async fn export_xlsx(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let achievements = export::collect_approved(state.repo.as_ref(), query.date.as_deref()).await?;
    let records: Vec<ExportRecord> = achievements.iter().map(ExportRecord::from).collect();
    let bytes = xlsx::render_xlsx(&records)?;

    tracing::info!(rows = records.len(), admin = %admin.email, "xlsx export");
    let file_name = export::file_name(&state.config.export_file_prefix, "Achievements", "xlsx");
    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        file_name,
        bytes,
    ))
}
