use crate::models::{
    Achievement, AchievementCategory, AchievementStatus, AdminDashboardStats, AuditEntry,
    NewAchievement, Role, UserRecord,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Failures of the persistence layer. Callers never retry; the operation is abandoned.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored value is invalid: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// ModerationOutcome
///
/// Result of a conditional status update. A decision only applies to a record
/// that is still pending; the first decision wins.
#[derive(Debug, Clone)]
pub enum ModerationOutcome {
    Applied(Achievement),
    AlreadyDecided(AchievementStatus),
    NotFound,
}

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers only see this
/// trait, so the Postgres store and the in-memory store are interchangeable.
///
/// Mutations that touch several records (group moves, decision + audit entry)
/// are atomic in every implementation.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Role Groups ---
    /// Looks the email up in exactly one role group.
    async fn find_in_group(&self, role: Role, email: &str) -> RepoResult<Option<UserRecord>>;
    /// Every user of every group, in admins, faculty, students order.
    async fn list_users(&self) -> RepoResult<Vec<UserRecord>>;
    /// Inserts or updates the user in the group implied by `user.role` and removes
    /// them from any other group. Writes `user_added` for a new user or
    /// `role_changed` when the user moved groups.
    async fn upsert_user(&self, user: UserRecord, actor: &str) -> RepoResult<UserRecord>;
    /// Deletes from one group and writes `user_removed`. Returns false if absent.
    async fn delete_user(&self, email: &str, role: Role, actor: &str) -> RepoResult<bool>;
    /// Moves an existing user to `new_role` and writes `role_changed`.
    /// `None` if the user is in no group.
    async fn change_role(
        &self,
        email: &str,
        new_role: Role,
        actor: &str,
    ) -> RepoResult<Option<UserRecord>>;

    // --- Achievements ---
    /// Inserts into the category's table. Moderated categories start `pending`.
    async fn create_achievement(
        &self,
        category: AchievementCategory,
        new: NewAchievement,
    ) -> RepoResult<Achievement>;
    /// Lists a category, optionally restricted to one status. The status filter
    /// does not apply to college achievements, which have none.
    async fn list_achievements(
        &self,
        category: AchievementCategory,
        status: Option<AchievementStatus>,
    ) -> RepoResult<Vec<Achievement>>;
    /// A submitter's own records in one category.
    async fn list_submissions(
        &self,
        category: AchievementCategory,
        email: &str,
    ) -> RepoResult<Vec<Achievement>>;
    /// Applies a moderation decision and its audit entry in one transaction.
    async fn decide(
        &self,
        category: AchievementCategory,
        id: Uuid,
        status: AchievementStatus,
        actor: &str,
    ) -> RepoResult<ModerationOutcome>;

    // --- Audit & Stats ---
    /// Newest first. `updated_by` restricts to entries written by one admin.
    async fn list_audit(&self, updated_by: Option<&str>) -> RepoResult<Vec<AuditEntry>>;
    async fn stats(&self) -> RepoResult<AdminDashboardStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
