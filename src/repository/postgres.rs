use super::{ModerationOutcome, RepoResult, Repository, RepositoryError};
use crate::models::{
    Achievement, AchievementCategory, AchievementStatus, AdminDashboardStats, AuditAction,
    AuditEntry, NewAchievement, NewAuditEntry, Role, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Table names are only ever taken from `Role::group` and
/// `AchievementCategory::table`, never from request input.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// --- Row Mappings ---

#[derive(FromRow)]
struct UserRow {
    name: String,
    email: String,
}

impl UserRow {
    fn with_role(self, role: Role) -> UserRecord {
        UserRecord {
            name: self.name,
            email: self.email,
            role,
        }
    }
}

#[derive(FromRow)]
struct AchievementRow {
    id: Uuid,
    title: String,
    description: String,
    date: String,
    #[sqlx(rename = "type")]
    achievement_type: String,
    image: String,
    status: Option<String>,
    email: Option<String>,
    name: Option<String>,
    roll_no: Option<String>,
    department: Option<String>,
    created_at: DateTime<Utc>,
}

impl AchievementRow {
    fn into_achievement(self, category: AchievementCategory) -> RepoResult<Achievement> {
        let status = self
            .status
            .map(|s| s.parse::<AchievementStatus>())
            .transpose()
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        Ok(Achievement {
            id: self.id,
            category,
            title: self.title,
            description: self.description,
            date: self.date,
            achievement_type: self.achievement_type,
            image: self.image,
            status,
            email: self.email,
            name: self.name,
            roll_no: self.roll_no,
            department: self.department,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: Uuid,
    action: String,
    user_email: String,
    updated_by: String,
    new_role: Option<String>,
    timestamp: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            id: row.id,
            action: row.action,
            user: row.user_email,
            updated_by: row.updated_by,
            new_role: row.new_role,
            timestamp: row.timestamp,
        }
    }
}

/// Column list shared by every achievement query. College rows have no status.
fn achievement_columns(category: AchievementCategory) -> &'static str {
    if category.is_moderated() {
        "id, title, description, date, type, image, status, \
         email, name, roll_no, department, created_at"
    } else {
        "id, title, description, date, type, image, NULL::TEXT AS status, \
         email, name, roll_no, department, created_at"
    }
}

fn into_achievements(
    rows: Vec<AchievementRow>,
    category: AchievementCategory,
) -> RepoResult<Vec<Achievement>> {
    rows.into_iter()
        .map(|row| row.into_achievement(category))
        .collect()
}

/// Appends one audit row on the caller's connection (normally an open transaction).
async fn insert_audit(conn: &mut PgConnection, entry: &NewAuditEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_logs (id, action, user_email, updated_by, new_role, timestamp) \
         VALUES ($1, $2, $3, $4, $5, NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(entry.action.as_str())
    .bind(&entry.user)
    .bind(&entry.updated_by)
    .bind(entry.new_role.map(Role::as_str))
    .execute(conn)
    .await?;
    Ok(())
}

/// Serializes group writes for one email until the transaction ends. Row locks
/// cannot do this: a user being added has no row to lock yet.
async fn lock_email(conn: &mut PgConnection, email: &str) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(email)
        .execute(conn)
        .await?;
    Ok(())
}

/// Inserts or renames a user inside `role`'s group. Returns true on a fresh insert.
async fn put_in_group(
    conn: &mut PgConnection,
    role: Role,
    email: &str,
    name: &str,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "INSERT INTO {} (email, name) VALUES ($1, $2) \
         ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name \
         RETURNING (xmax = 0) AS inserted",
        role.group()
    );
    sqlx::query_scalar::<_, bool>(&sql)
        .bind(email)
        .bind(name)
        .fetch_one(conn)
        .await
}

async fn count(pool: &PgPool, sql: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
}

#[async_trait]
impl Repository for PostgresRepository {
    /// find_in_group
    ///
    /// Single keyed lookup in one role table.
    async fn find_in_group(&self, role: Role, email: &str) -> RepoResult<Option<UserRecord>> {
        let sql = format!("SELECT name, email FROM {} WHERE email = $1", role.group());
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.with_role(role)))
    }

    async fn list_users(&self) -> RepoResult<Vec<UserRecord>> {
        let mut users = Vec::new();
        for role in Role::RESOLUTION_ORDER {
            let sql = format!("SELECT name, email FROM {} ORDER BY name", role.group());
            let rows = sqlx::query_as::<_, UserRow>(&sql)
                .fetch_all(&self.pool)
                .await?;
            users.extend(rows.into_iter().map(|r| r.with_role(role)));
        }
        Ok(users)
    }

    /// upsert_user
    ///
    /// Removes the email from the other two groups, then inserts or renames it in
    /// the target group, all in one transaction with its audit entry.
    async fn upsert_user(&self, user: UserRecord, actor: &str) -> RepoResult<UserRecord> {
        let mut tx = self.pool.begin().await?;
        lock_email(&mut *tx, &user.email).await?;

        let mut moved = false;
        for other in Role::RESOLUTION_ORDER.into_iter().filter(|r| *r != user.role) {
            let sql = format!("DELETE FROM {} WHERE email = $1", other.group());
            let res = sqlx::query(&sql).bind(&user.email).execute(&mut *tx).await?;
            moved |= res.rows_affected() > 0;
        }

        let inserted = put_in_group(&mut *tx, user.role, &user.email, &user.name).await?;

        let action = if moved {
            Some(AuditAction::RoleChanged)
        } else if inserted {
            Some(AuditAction::UserAdded)
        } else {
            None
        };
        if let Some(action) = action {
            let entry = NewAuditEntry {
                action,
                user: user.email.clone(),
                updated_by: actor.to_string(),
                new_role: Some(user.role),
            };
            insert_audit(&mut *tx, &entry).await?;
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn delete_user(&self, email: &str, role: Role, actor: &str) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;
        lock_email(&mut *tx, email).await?;

        let sql = format!("DELETE FROM {} WHERE email = $1", role.group());
        let res = sqlx::query(&sql).bind(email).execute(&mut *tx).await?;
        if res.rows_affected() == 0 {
            return Ok(false);
        }

        let entry = NewAuditEntry {
            action: AuditAction::UserRemoved,
            user: email.to_string(),
            updated_by: actor.to_string(),
            new_role: None,
        };
        insert_audit(&mut *tx, &entry).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// change_role
    ///
    /// Delete from the old group, insert into the new one and append the audit
    /// entry in a single transaction, under the per-email advisory lock.
    async fn change_role(
        &self,
        email: &str,
        new_role: Role,
        actor: &str,
    ) -> RepoResult<Option<UserRecord>> {
        let mut tx = self.pool.begin().await?;
        lock_email(&mut *tx, email).await?;

        let mut current: Option<UserRecord> = None;
        for role in Role::RESOLUTION_ORDER {
            let sql = format!(
                "SELECT name, email FROM {} WHERE email = $1 FOR UPDATE",
                role.group()
            );
            if let Some(row) = sqlx::query_as::<_, UserRow>(&sql)
                .bind(email)
                .fetch_optional(&mut *tx)
                .await?
            {
                current = Some(row.with_role(role));
                break;
            }
        }

        let Some(current) = current else {
            return Ok(None);
        };
        if current.role == new_role {
            return Ok(Some(current));
        }

        let sql = format!("DELETE FROM {} WHERE email = $1", current.role.group());
        sqlx::query(&sql).bind(email).execute(&mut *tx).await?;
        put_in_group(&mut *tx, new_role, email, &current.name).await?;

        let entry = NewAuditEntry {
            action: AuditAction::RoleChanged,
            user: email.to_string(),
            updated_by: actor.to_string(),
            new_role: Some(new_role),
        };
        insert_audit(&mut *tx, &entry).await?;

        tx.commit().await?;
        Ok(Some(UserRecord {
            role: new_role,
            ..current
        }))
    }

    /// create_achievement
    ///
    /// Moderated categories are inserted as `pending`; college rows have no status.
    async fn create_achievement(
        &self,
        category: AchievementCategory,
        new: NewAchievement,
    ) -> RepoResult<Achievement> {
        let sql = if category.is_moderated() {
            format!(
                "INSERT INTO {} (id, title, description, date, type, image, \
                 email, name, roll_no, department, status, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', NOW()) RETURNING {}",
                category.table(),
                achievement_columns(category)
            )
        } else {
            format!(
                "INSERT INTO {} (id, title, description, date, type, image, \
                 email, name, roll_no, department, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW()) RETURNING {}",
                category.table(),
                achievement_columns(category)
            )
        };

        let row = sqlx::query_as::<_, AchievementRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.date)
            .bind(&new.achievement_type)
            .bind(&new.image)
            .bind(&new.email)
            .bind(&new.name)
            .bind(&new.roll_no)
            .bind(&new.department)
            .fetch_one(&self.pool)
            .await?;

        row.into_achievement(category)
    }

    async fn list_achievements(
        &self,
        category: AchievementCategory,
        status: Option<AchievementStatus>,
    ) -> RepoResult<Vec<Achievement>> {
        let columns = achievement_columns(category);
        let rows = match status.filter(|_| category.is_moderated()) {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE status = $1 ORDER BY created_at DESC",
                    columns,
                    category.table()
                );
                sqlx::query_as::<_, AchievementRow>(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM {} ORDER BY created_at DESC",
                    columns,
                    category.table()
                );
                sqlx::query_as::<_, AchievementRow>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        into_achievements(rows, category)
    }

    async fn list_submissions(
        &self,
        category: AchievementCategory,
        email: &str,
    ) -> RepoResult<Vec<Achievement>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE email = $1 ORDER BY created_at DESC",
            achievement_columns(category),
            category.table()
        );
        let rows = sqlx::query_as::<_, AchievementRow>(&sql)
            .bind(email)
            .fetch_all(&self.pool)
            .await?;
        into_achievements(rows, category)
    }

    /// decide
    ///
    /// The `status = 'pending'` guard makes the update conditional: of two admins
    /// deciding the same record, only the first changes it.
    async fn decide(
        &self,
        category: AchievementCategory,
        id: Uuid,
        status: AchievementStatus,
        actor: &str,
    ) -> RepoResult<ModerationOutcome> {
        if !category.is_moderated() {
            return Ok(ModerationOutcome::NotFound);
        }

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE {} SET status = $1 WHERE id = $2 AND status = 'pending' RETURNING {}",
            category.table(),
            achievement_columns(category)
        );
        let updated = sqlx::query_as::<_, AchievementRow>(&sql)
            .bind(status.as_str())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = updated else {
            let sql = format!("SELECT status FROM {} WHERE id = $1", category.table());
            let current = sqlx::query_scalar::<_, String>(&sql)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            return match current {
                None => Ok(ModerationOutcome::NotFound),
                Some(s) => s
                    .parse::<AchievementStatus>()
                    .map(ModerationOutcome::AlreadyDecided)
                    .map_err(|e| RepositoryError::Corrupt(e.to_string())),
            };
        };

        let achievement = row.into_achievement(category)?;
        let entry = NewAuditEntry {
            action: AuditAction::for_decision(status),
            user: achievement.email.clone().unwrap_or_default(),
            updated_by: actor.to_string(),
            new_role: None,
        };
        insert_audit(&mut *tx, &entry).await?;

        tx.commit().await?;
        Ok(ModerationOutcome::Applied(achievement))
    }

    async fn list_audit(&self, updated_by: Option<&str>) -> RepoResult<Vec<AuditEntry>> {
        let rows = match updated_by {
            Some(admin) => {
                sqlx::query_as::<_, AuditRow>(
                    "SELECT id, action, user_email, updated_by, new_role, timestamp \
                     FROM audit_logs WHERE updated_by = $1 ORDER BY timestamp DESC",
                )
                .bind(admin)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, AuditRow>(
                    "SELECT id, action, user_email, updated_by, new_role, timestamp \
                     FROM audit_logs ORDER BY timestamp DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }

    /// stats
    ///
    /// Compiles all dashboard counters in one call.
    async fn stats(&self) -> RepoResult<AdminDashboardStats> {
        let pool = &self.pool;
        Ok(AdminDashboardStats {
            admins: count(pool, "SELECT COUNT(*) FROM admins").await?,
            faculty: count(pool, "SELECT COUNT(*) FROM faculty").await?,
            students: count(pool, "SELECT COUNT(*) FROM students").await?,
            pending_student: count(
                pool,
                "SELECT COUNT(*) FROM student_achievements WHERE status = 'pending'",
            )
            .await?,
            pending_faculty: count(
                pool,
                "SELECT COUNT(*) FROM faculty_achievements WHERE status = 'pending'",
            )
            .await?,
            approved_student: count(
                pool,
                "SELECT COUNT(*) FROM student_achievements WHERE status = 'approved'",
            )
            .await?,
            approved_faculty: count(
                pool,
                "SELECT COUNT(*) FROM faculty_achievements WHERE status = 'approved'",
            )
            .await?,
            college: count(pool, "SELECT COUNT(*) FROM college_achievements").await?,
        })
    }
}
