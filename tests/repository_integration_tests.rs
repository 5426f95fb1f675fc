use achievements_portal::{
    models::{AchievementCategory, AchievementStatus, NewAchievement, Role, UserRecord},
    repository::{InMemoryRepository, ModerationOutcome, PostgresRepository, Repository},
};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

// --- Test Context and Setup ---

/// Holds the pool of the database named by DATABASE_URL, migrated.
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Emails are unique per run so the Postgres tests can share one database.
fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@college.edu", Uuid::new_v4().simple())
}

fn user(email: &str, role: Role) -> UserRecord {
    UserRecord {
        name: "Test User".to_string(),
        email: email.to_string(),
        role,
    }
}

fn submission(email: &str) -> NewAchievement {
    NewAchievement {
        title: "Regional hackathon".to_string(),
        description: "First place".to_string(),
        date: "2024-09-12".to_string(),
        achievement_type: "Hackathon".to_string(),
        image: "data:image/png;base64,AAAA".to_string(),
        email: email.to_string(),
        name: "Test User".to_string(),
        roll_no: Some("22B81A0412".to_string()),
        department: Some("ECE".to_string()),
    }
}

// --- Shared Contract ---
// Both stores must behave identically; each check runs against either.

async fn check_upsert_moves_between_groups(repo: &dyn Repository) {
    let admin = unique_email("admin");
    let email = unique_email("mover");

    repo.upsert_user(user(&email, Role::Student), &admin).await.unwrap();
    let moved = repo.upsert_user(user(&email, Role::Faculty), &admin).await.unwrap();
    assert_eq!(moved.role, Role::Faculty);

    assert!(repo.find_in_group(Role::Student, &email).await.unwrap().is_none());
    assert!(repo.find_in_group(Role::Faculty, &email).await.unwrap().is_some());

    let actions: Vec<String> = repo
        .list_audit(Some(&admin))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec!["role_changed", "user_added"]);
}

async fn check_change_role_audits_once(repo: &dyn Repository) {
    let admin = unique_email("admin");
    let email = unique_email("promoted");
    repo.upsert_user(user(&email, Role::Student), &admin).await.unwrap();

    let updated = repo.change_role(&email, Role::Admin, &admin).await.unwrap();
    assert_eq!(updated.map(|u| u.role), Some(Role::Admin));

    let entries = repo.list_audit(Some(&admin)).await.unwrap();
    let role_changes: Vec<_> = entries.iter().filter(|e| e.action == "role_changed").collect();
    assert_eq!(role_changes.len(), 1);
    assert_eq!(role_changes[0].user, email);
    assert_eq!(role_changes[0].new_role.as_deref(), Some("Admin"));

    let missing = repo
        .change_role(&unique_email("ghost"), Role::Admin, &admin)
        .await
        .unwrap();
    assert!(missing.is_none());
}

async fn check_delete_user(repo: &dyn Repository) {
    let admin = unique_email("admin");
    let email = unique_email("leaver");
    repo.upsert_user(user(&email, Role::Faculty), &admin).await.unwrap();

    assert!(!repo.delete_user(&email, Role::Student, &admin).await.unwrap());
    assert!(repo.delete_user(&email, Role::Faculty, &admin).await.unwrap());
    assert!(repo.find_in_group(Role::Faculty, &email).await.unwrap().is_none());
}

async fn check_first_decision_wins(repo: &dyn Repository) {
    let admin = unique_email("admin");
    let email = unique_email("submitter");

    let created = repo
        .create_achievement(AchievementCategory::Student, submission(&email))
        .await
        .unwrap();
    assert_eq!(created.status, Some(AchievementStatus::Pending));

    let first = repo
        .decide(AchievementCategory::Student, created.id, AchievementStatus::Approved, &admin)
        .await
        .unwrap();
    assert!(matches!(
        first,
        ModerationOutcome::Applied(ref a) if a.status == Some(AchievementStatus::Approved)
    ));

    let second = repo
        .decide(AchievementCategory::Student, created.id, AchievementStatus::Rejected, &admin)
        .await
        .unwrap();
    assert!(matches!(second, ModerationOutcome::AlreadyDecided(AchievementStatus::Approved)));

    let wrong_table = repo
        .decide(AchievementCategory::Faculty, created.id, AchievementStatus::Approved, &admin)
        .await
        .unwrap();
    assert!(matches!(wrong_table, ModerationOutcome::NotFound));

    // Exactly one decision was audited.
    let entries = repo.list_audit(Some(&admin)).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "achievement_approved");
    assert_eq!(entries[0].user, email);
}

async fn check_college_achievements_have_no_status(repo: &dyn Repository) {
    let email = unique_email("principal");
    let created = repo
        .create_achievement(AchievementCategory::College, submission(&email))
        .await
        .unwrap();
    assert!(created.status.is_none());
    assert!(created.is_publicly_visible());

    let listed = repo
        .list_achievements(AchievementCategory::College, Some(AchievementStatus::Approved))
        .await
        .unwrap();
    assert!(listed.iter().any(|a| a.id == created.id));

    let decision = repo
        .decide(AchievementCategory::College, created.id, AchievementStatus::Approved, &email)
        .await
        .unwrap();
    assert!(matches!(decision, ModerationOutcome::NotFound));
}

async fn check_submissions_are_scoped_to_submitter(repo: &dyn Repository) {
    let mine = unique_email("mine");
    let theirs = unique_email("theirs");
    repo.create_achievement(AchievementCategory::Faculty, submission(&mine)).await.unwrap();
    repo.create_achievement(AchievementCategory::Faculty, submission(&theirs)).await.unwrap();

    let listed = repo
        .list_submissions(AchievementCategory::Faculty, &mine)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].email.as_deref(), Some(mine.as_str()));
    assert_eq!(listed[0].category, AchievementCategory::Faculty);
}

async fn check_concurrent_upserts_keep_one_group(repo: Arc<dyn Repository>, rounds: usize) {
    let admin = unique_email("admin");
    let mut double_memberships = 0;

    for _ in 0..rounds {
        let email = unique_email("racer");
        let as_student = {
            let (repo, email, admin) = (repo.clone(), email.clone(), admin.clone());
            tokio::spawn(async move {
                repo.upsert_user(user(&email, Role::Student), &admin).await
            })
        };
        let as_faculty = {
            let (repo, email, admin) = (repo.clone(), email.clone(), admin.clone());
            tokio::spawn(async move {
                repo.upsert_user(user(&email, Role::Faculty), &admin).await
            })
        };
        as_student.await.unwrap().unwrap();
        as_faculty.await.unwrap().unwrap();

        let in_students = repo.find_in_group(Role::Student, &email).await.unwrap();
        let in_faculty = repo.find_in_group(Role::Faculty, &email).await.unwrap();
        assert!(in_students.is_some() || in_faculty.is_some());
        if in_students.is_some() && in_faculty.is_some() {
            double_memberships += 1;
        }
    }
    assert_eq!(double_memberships, 0);

    // The second writer of each round saw the first one's row.
    let entries = repo.list_audit(Some(&admin)).await.unwrap();
    let added = entries.iter().filter(|e| e.action == "user_added").count();
    assert_eq!(added, rounds);
}

// --- In-Memory Store ---

#[tokio::test]
async fn test_memory_upsert_moves_between_groups() {
    check_upsert_moves_between_groups(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_change_role_audits_once() {
    check_change_role_audits_once(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_delete_user() {
    check_delete_user(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_first_decision_wins() {
    check_first_decision_wins(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_college_achievements_have_no_status() {
    check_college_achievements_have_no_status(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_submissions_are_scoped_to_submitter() {
    check_submissions_are_scoped_to_submitter(&InMemoryRepository::new()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_upserts_keep_one_group() {
    check_concurrent_upserts_keep_one_group(Arc::new(InMemoryRepository::new()), 50).await;
}

#[tokio::test]
async fn test_memory_unavailable_store_errors() {
    let repo = InMemoryRepository::new_unavailable();
    assert!(repo.list_users().await.is_err());
    assert!(repo.stats().await.is_err());
}

// --- PostgreSQL (requires DATABASE_URL) ---

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_postgres_upsert_moves_between_groups() {
    let ctx = DbTestContext::setup().await;
    check_upsert_moves_between_groups(&ctx.repository()).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_postgres_change_role_audits_once() {
    let ctx = DbTestContext::setup().await;
    check_change_role_audits_once(&ctx.repository()).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_postgres_delete_user() {
    let ctx = DbTestContext::setup().await;
    check_delete_user(&ctx.repository()).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_postgres_first_decision_wins() {
    let ctx = DbTestContext::setup().await;
    check_first_decision_wins(&ctx.repository()).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_postgres_college_achievements_have_no_status() {
    let ctx = DbTestContext::setup().await;
    check_college_achievements_have_no_status(&ctx.repository()).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_postgres_submissions_are_scoped_to_submitter() {
    let ctx = DbTestContext::setup().await;
    check_submissions_are_scoped_to_submitter(&ctx.repository()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_postgres_concurrent_upserts_keep_one_group() {
    let ctx = DbTestContext::setup().await;
    check_concurrent_upserts_keep_one_group(Arc::new(ctx.repository()), 200).await;
}
