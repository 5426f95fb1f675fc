use super::{ModerationOutcome, RepoResult, Repository, RepositoryError};
use crate::models::{
    Achievement, AchievementCategory, AchievementStatus, AdminDashboardStats, AuditAction,
    AuditEntry, NewAchievement, NewAuditEntry, Role, UserRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    // email -> name, per role group
    groups: HashMap<Role, BTreeMap<String, String>>,
    achievements: HashMap<AchievementCategory, Vec<Achievement>>,
    audit: Vec<AuditEntry>,
}

impl State {
    fn group(&self, role: Role) -> Option<&BTreeMap<String, String>> {
        self.groups.get(&role)
    }

    fn group_mut(&mut self, role: Role) -> &mut BTreeMap<String, String> {
        self.groups.entry(role).or_default()
    }

    fn append_audit(&mut self, entry: NewAuditEntry) {
        self.audit.push(AuditEntry {
            id: Uuid::new_v4(),
            action: entry.action.as_str().to_string(),
            user: entry.user,
            updated_by: entry.updated_by,
            new_role: entry.new_role.map(|r| r.as_str().to_string()),
            timestamp: Utc::now(),
        });
    }

    fn count(&self, category: AchievementCategory, status: Option<AchievementStatus>) -> i64 {
        self.achievements
            .get(&category)
            .map(|list| {
                list.iter()
                    .filter(|a| status.is_none() || a.status == status)
                    .count() as i64
            })
            .unwrap_or(0)
    }
}

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory. Every operation runs under one
/// lock, so multi-record mutations are atomic just like the Postgres transactions.
///
/// Used by the test suite. Writes for selected emails, or the whole store, can be
/// made to fail to exercise error paths.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
    failing_emails: Mutex<HashSet<String>>,
    unavailable: bool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails, as if the database were down.
    pub fn new_unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Makes every user write for `email` fail.
    pub async fn fail_writes_for(&self, email: &str) {
        self.failing_emails.lock().await.insert(email.to_string());
    }

    /// Places a user in a group without touching other groups or the audit log.
    /// Lets tests build states (such as double membership) the API never creates.
    pub async fn seed_user(&self, user: UserRecord) {
        let mut state = self.state.lock().await;
        state.group_mut(user.role).insert(user.email, user.name);
    }

    /// Stores an achievement exactly as given.
    pub async fn seed_achievement(&self, achievement: Achievement) {
        let mut state = self.state.lock().await;
        state
            .achievements
            .entry(achievement.category)
            .or_default()
            .push(achievement);
    }

    fn check_available(&self) -> RepoResult<()> {
        if self.unavailable {
            return Err(RepositoryError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_writable(&self, email: &str) -> RepoResult<()> {
        self.check_available()?;
        if self.failing_emails.lock().await.contains(email) {
            return Err(RepositoryError::Unavailable(format!(
                "write rejected for {email}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_in_group(&self, role: Role, email: &str) -> RepoResult<Option<UserRecord>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .group(role)
            .and_then(|g| g.get(email))
            .map(|name| UserRecord {
                name: name.clone(),
                email: email.to_string(),
                role,
            }))
    }

    async fn list_users(&self) -> RepoResult<Vec<UserRecord>> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut users = Vec::new();
        for role in Role::RESOLUTION_ORDER {
            let mut members: Vec<UserRecord> = state
                .group(role)
                .into_iter()
                .flatten()
                .map(|(email, name)| UserRecord {
                    name: name.clone(),
                    email: email.clone(),
                    role,
                })
                .collect();
            members.sort_by(|a, b| a.name.cmp(&b.name));
            users.extend(members);
        }
        Ok(users)
    }

    async fn upsert_user(&self, user: UserRecord, actor: &str) -> RepoResult<UserRecord> {
        self.check_writable(&user.email).await?;
        let mut state = self.state.lock().await;

        let mut moved = false;
        for other in Role::RESOLUTION_ORDER.into_iter().filter(|r| *r != user.role) {
            moved |= state.group_mut(other).remove(&user.email).is_some();
        }
        let inserted = state
            .group_mut(user.role)
            .insert(user.email.clone(), user.name.clone())
            .is_none();

        let action = if moved {
            Some(AuditAction::RoleChanged)
        } else if inserted {
            Some(AuditAction::UserAdded)
        } else {
            None
        };
        if let Some(action) = action {
            state.append_audit(NewAuditEntry {
                action,
                user: user.email.clone(),
                updated_by: actor.to_string(),
                new_role: Some(user.role),
            });
        }
        Ok(user)
    }

    async fn delete_user(&self, email: &str, role: Role, actor: &str) -> RepoResult<bool> {
        self.check_writable(email).await?;
        let mut state = self.state.lock().await;
        if state.group_mut(role).remove(email).is_none() {
            return Ok(false);
        }
        state.append_audit(NewAuditEntry {
            action: AuditAction::UserRemoved,
            user: email.to_string(),
            updated_by: actor.to_string(),
            new_role: None,
        });
        Ok(true)
    }

    async fn change_role(
        &self,
        email: &str,
        new_role: Role,
        actor: &str,
    ) -> RepoResult<Option<UserRecord>> {
        self.check_writable(email).await?;
        let mut state = self.state.lock().await;

        let current = Role::RESOLUTION_ORDER.into_iter().find_map(|role| {
            state
                .group(role)
                .and_then(|g| g.get(email))
                .map(|name| (role, name.clone()))
        });
        let Some((old_role, name)) = current else {
            return Ok(None);
        };
        if old_role != new_role {
            state.group_mut(old_role).remove(email);
            state
                .group_mut(new_role)
                .insert(email.to_string(), name.clone());
            state.append_audit(NewAuditEntry {
                action: AuditAction::RoleChanged,
                user: email.to_string(),
                updated_by: actor.to_string(),
                new_role: Some(new_role),
            });
        }
        Ok(Some(UserRecord {
            name,
            email: email.to_string(),
            role: new_role,
        }))
    }

    async fn create_achievement(
        &self,
        category: AchievementCategory,
        new: NewAchievement,
    ) -> RepoResult<Achievement> {
        self.check_available()?;
        let achievement = Achievement {
            id: Uuid::new_v4(),
            category,
            title: new.title,
            description: new.description,
            date: new.date,
            achievement_type: new.achievement_type,
            image: new.image,
            status: category
                .is_moderated()
                .then_some(AchievementStatus::Pending),
            email: Some(new.email),
            name: Some(new.name),
            roll_no: new.roll_no,
            department: new.department,
            created_at: Utc::now(),
        };
        self.seed_achievement(achievement.clone()).await;
        Ok(achievement)
    }

    async fn list_achievements(
        &self,
        category: AchievementCategory,
        status: Option<AchievementStatus>,
    ) -> RepoResult<Vec<Achievement>> {
        self.check_available()?;
        let status = status.filter(|_| category.is_moderated());
        let state = self.state.lock().await;
        Ok(state
            .achievements
            .get(&category)
            .into_iter()
            .flatten()
            .rev()
            .filter(|a| status.is_none() || a.status == status)
            .cloned()
            .collect())
    }

    async fn list_submissions(
        &self,
        category: AchievementCategory,
        email: &str,
    ) -> RepoResult<Vec<Achievement>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .achievements
            .get(&category)
            .into_iter()
            .flatten()
            .rev()
            .filter(|a| a.email.as_deref() == Some(email))
            .cloned()
            .collect())
    }

    async fn decide(
        &self,
        category: AchievementCategory,
        id: Uuid,
        status: AchievementStatus,
        actor: &str,
    ) -> RepoResult<ModerationOutcome> {
        self.check_available()?;
        if !category.is_moderated() {
            return Ok(ModerationOutcome::NotFound);
        }
        let mut state = self.state.lock().await;

        let Some(record) = state
            .achievements
            .get_mut(&category)
            .and_then(|list| list.iter_mut().find(|a| a.id == id))
        else {
            return Ok(ModerationOutcome::NotFound);
        };

        match record.status {
            Some(AchievementStatus::Pending) | None => {}
            Some(decided) => return Ok(ModerationOutcome::AlreadyDecided(decided)),
        }
        record.status = Some(status);
        let updated = record.clone();

        state.append_audit(NewAuditEntry {
            action: AuditAction::for_decision(status),
            user: updated.email.clone().unwrap_or_default(),
            updated_by: actor.to_string(),
            new_role: None,
        });
        Ok(ModerationOutcome::Applied(updated))
    }

    async fn list_audit(&self, updated_by: Option<&str>) -> RepoResult<Vec<AuditEntry>> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut entries: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| updated_by.is_none_or(|admin| e.updated_by == admin))
            .cloned()
            .collect();
        // Entries are appended in order; a stable sort keeps that order on equal timestamps.
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    async fn stats(&self) -> RepoResult<AdminDashboardStats> {
        self.check_available()?;
        let state = self.state.lock().await;
        let members = |role: Role| state.group(role).map(|g| g.len() as i64).unwrap_or(0);
        Ok(AdminDashboardStats {
            admins: members(Role::Admin),
            faculty: members(Role::Faculty),
            students: members(Role::Student),
            pending_student: state.count(
                AchievementCategory::Student,
                Some(AchievementStatus::Pending),
            ),
            pending_faculty: state.count(
                AchievementCategory::Faculty,
                Some(AchievementStatus::Pending),
            ),
            approved_student: state.count(
                AchievementCategory::Student,
                Some(AchievementStatus::Approved),
            ),
            approved_faculty: state.count(
                AchievementCategory::Faculty,
                Some(AchievementStatus::Approved),
            ),
            college: state.count(AchievementCategory::College, None),
        })
    }
}
