use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enumerations ---

/// ParseEnumError
///
/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Role
///
/// The three role groups a user can belong to. Serialized exactly as the
/// import files spell them: `Admin`, `Faculty`, `Student`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Role {
    Admin,
    Faculty,
    Student,
}

impl Role {
    /// Fixed priority used by role resolution. First match wins.
    pub const RESOLUTION_ORDER: [Role; 3] = [Role::Admin, Role::Faculty, Role::Student];

    /// Name of the table holding this role group.
    pub fn group(self) -> &'static str {
        match self {
            Role::Admin => "admins",
            Role::Faculty => "faculty",
            Role::Student => "students",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Faculty => "Faculty",
            Role::Student => "Student",
        }
    }

    /// Dashboard the client routes to after login.
    pub fn home(self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Faculty => "/faculty",
            Role::Student => "/student",
        }
    }

    /// Group a submission from this role lands in. Admins publish college achievements.
    pub fn submission_category(self) -> AchievementCategory {
        match self {
            Role::Admin => AchievementCategory::College,
            Role::Faculty => AchievementCategory::Faculty,
            Role::Student => AchievementCategory::Student,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    /// Case-sensitive, matching the import file contract.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(Role::Admin),
            "Faculty" => Ok(Role::Faculty),
            "Student" => Ok(Role::Student),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// AchievementCategory
///
/// Which submitter group an achievement belongs to. Each category has its own table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AchievementCategory {
    #[default]
    Student,
    Faculty,
    College,
}

impl AchievementCategory {
    pub fn table(self) -> &'static str {
        match self {
            AchievementCategory::Student => "student_achievements",
            AchievementCategory::Faculty => "faculty_achievements",
            AchievementCategory::College => "college_achievements",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AchievementCategory::Student => "student",
            AchievementCategory::Faculty => "faculty",
            AchievementCategory::College => "college",
        }
    }

    /// College achievements carry no status and skip moderation.
    pub fn is_moderated(self) -> bool {
        !matches!(self, AchievementCategory::College)
    }
}

impl fmt::Display for AchievementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AchievementStatus
///
/// Moderation state. `Pending` is the only state a decision can move out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AchievementStatus {
    Pending,
    Approved,
    Rejected,
}

impl AchievementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AchievementStatus::Pending => "pending",
            AchievementStatus::Approved => "approved",
            AchievementStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AchievementStatus::Pending),
            "approved" => Ok(AchievementStatus::Approved),
            "rejected" => Ok(AchievementStatus::Rejected),
            other => Err(ParseEnumError {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// AuditAction
///
/// The kinds of entries written to `audit_logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserAdded,
    UserRemoved,
    RoleChanged,
    AchievementApproved,
    AchievementRejected,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::UserAdded => "user_added",
            AuditAction::UserRemoved => "user_removed",
            AuditAction::RoleChanged => "role_changed",
            AuditAction::AchievementApproved => "achievement_approved",
            AuditAction::AchievementRejected => "achievement_rejected",
        }
    }

    pub fn for_decision(status: AchievementStatus) -> Self {
        match status {
            AchievementStatus::Rejected => AuditAction::AchievementRejected,
            _ => AuditAction::AchievementApproved,
        }
    }
}

// --- Core Records ---

/// UserRecord
///
/// A member of one role group, keyed by email. The role is implied by the table
/// the record lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Achievement
///
/// A submitted achievement, tagged with the category (table) it was read from.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Achievement {
    pub id: Uuid,
    pub category: AchievementCategory,
    pub title: String,
    pub description: String,
    /// Date as entered by the submitter, normally `YYYY-MM-DD`.
    pub date: String,
    #[serde(rename = "type")]
    pub achievement_type: String,
    /// Inline data URL (or remote URL for legacy records).
    pub image: String,
    /// Always `None` for college achievements.
    pub status: Option<AchievementStatus>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub roll_no: Option<String>,
    pub department: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl Achievement {
    /// Public visibility rule: approved, or any college achievement.
    pub fn is_publicly_visible(&self) -> bool {
        !self.category.is_moderated() || self.status == Some(AchievementStatus::Approved)
    }
}

/// NewAchievement
///
/// Validated submission ready for insertion. The submitter identity comes from
/// the resolved session, never from the request body.
#[derive(Debug, Clone)]
pub struct NewAchievement {
    pub title: String,
    pub description: String,
    pub date: String,
    pub achievement_type: String,
    pub image: String,
    pub email: String,
    pub name: String,
    pub roll_no: Option<String>,
    pub department: Option<String>,
}

/// AuditEntry
///
/// One append-only row of `audit_logs`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    /// Email of the user (or submitter) the action concerns.
    pub user: String,
    pub updated_by: String,
    pub new_role: Option<String>,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

/// NewAuditEntry
///
/// Written by the repository inside the same transaction as the mutation it records.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub user: String,
    pub updated_by: String,
    pub new_role: Option<Role>,
}

// --- Request Payloads ---

/// CreateAchievementRequest
///
/// Body of `POST /achievements`. The category is implied by the caller's role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateAchievementRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: String,
    #[serde(rename = "type")]
    pub achievement_type: String,
    /// `data:image/...;base64,...`
    pub image: String,
    #[serde(default)]
    pub roll_no: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

/// StatusUpdateRequest
///
/// Moderation decision. Only `approved` and `rejected` are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StatusUpdateRequest {
    pub status: AchievementStatus,
}

/// UpsertUserRequest
///
/// Manual add/update of one user from the admin "users" screen.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpsertUserRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// ChangeRoleRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

// --- Responses ---

/// SessionResponse
///
/// Outcome of a successful login: the resolved role and where to route the client.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionResponse {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub home: String,
}

/// ImportSummary
///
/// Counts reported after a bulk user import. Row-level detail is not retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ImportSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// WallFacets
///
/// Filter values available for the unfiltered result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct WallFacets {
    pub types: Vec<String>,
    pub years: Vec<String>,
    pub departments: Vec<String>,
}

/// WallResponse
///
/// Public Wall payload. `message` is set when no achievement matches the filters.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct WallResponse {
    pub category: AchievementCategory,
    pub achievements: Vec<Achievement>,
    pub facets: WallFacets,
    pub message: Option<String>,
}

/// AdminDashboardStats
///
/// Counters for the admin landing page (GET /admin/stats).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub admins: i64,
    pub faculty: i64,
    pub students: i64,
    pub pending_student: i64,
    pub pending_faculty: i64,
    pub approved_student: i64,
    pub approved_faculty: i64,
    pub college: i64,
}
