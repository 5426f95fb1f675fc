use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    dates,
    models::{Achievement, AchievementCategory, AchievementStatus},
    repository::{RepoResult, Repository},
    wall,
};

pub mod images;
pub mod pdf;
pub mod xlsx;

pub use images::{ImageSlot, load_images};

/// ExportError
///
/// Rendering failures. Image problems are not errors; they degrade to a
/// placeholder on the page.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("spreadsheet rendering failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("pdf rendering failed: {0}")]
    Pdf(String),

    #[error("render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// ExportRecord
///
/// One row of the export, named after the spreadsheet columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "PascalCase")]
#[ts(export)]
pub struct ExportRecord {
    pub name: String,
    pub roll_no: String,
    pub achievement_type: String,
    pub title: String,
    pub description: String,
    pub academic_year: String,
    pub certificate_issued_date: String,
    pub submitted_by: String,
}

impl ExportRecord {
    pub const COLUMNS: [&'static str; 8] = [
        "Name",
        "RollNo",
        "AchievementType",
        "Title",
        "Description",
        "AcademicYear",
        "CertificateIssuedDate",
        "SubmittedBy",
    ];

    /// Cell values in `COLUMNS` order.
    pub fn cells(&self) -> [&str; 8] {
        [
            self.name.as_str(),
            self.roll_no.as_str(),
            self.achievement_type.as_str(),
            self.title.as_str(),
            self.description.as_str(),
            self.academic_year.as_str(),
            self.certificate_issued_date.as_str(),
            self.submitted_by.as_str(),
        ]
    }
}

fn or_not_available(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(dates::NOT_AVAILABLE)
        .to_string()
}

impl From<&Achievement> for ExportRecord {
    fn from(a: &Achievement) -> Self {
        // Roll numbers only exist for students.
        let roll_no = match a.category {
            AchievementCategory::Student => a.roll_no.clone().unwrap_or_default(),
            _ => String::new(),
        };
        Self {
            name: or_not_available(a.name.as_deref()),
            roll_no,
            achievement_type: or_not_available(Some(&a.achievement_type)),
            title: a.title.clone(),
            description: a.description.clone(),
            academic_year: dates::academic_year(&a.date),
            certificate_issued_date: a.date.clone(),
            submitted_by: a.category.as_str().to_string(),
        }
    }
}

/// collect_approved
///
/// Approved student and faculty achievements, optionally restricted to one
/// exact date string, newest first.
pub async fn collect_approved(
    repo: &dyn Repository,
    date: Option<&str>,
) -> RepoResult<Vec<Achievement>> {
    let mut achievements = repo
        .list_achievements(AchievementCategory::Student, Some(AchievementStatus::Approved))
        .await?;
    achievements.extend(
        repo.list_achievements(AchievementCategory::Faculty, Some(AchievementStatus::Approved))
            .await?,
    );

    if let Some(date) = date.map(str::trim).filter(|d| !d.is_empty()) {
        achievements.retain(|a| a.date == date);
    }
    wall::sort_newest_first(&mut achievements);
    Ok(achievements)
}

/// File name for a download, e.g. `Portal_Achievements_Report_2024-06-01.pdf`.
pub fn file_name(prefix: &str, kind: &str, extension: &str) -> String {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    format!("{prefix}_{kind}_{today}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn approved(category: AchievementCategory, date: &str) -> Achievement {
        Achievement {
            id: Uuid::new_v4(),
            category,
            title: "Best Paper".to_string(),
            description: "Awarded at the national conference".to_string(),
            date: date.to_string(),
            achievement_type: "Publication".to_string(),
            image: String::new(),
            status: Some(AchievementStatus::Approved),
            email: Some("x@college.edu".to_string()),
            name: None,
            roll_no: Some("21A91A0501".to_string()),
            department: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_faculty_rows_have_blank_roll_no() {
        let row = ExportRecord::from(&approved(AchievementCategory::Faculty, "2024-03-15"));
        assert_eq!(row.roll_no, "");
        assert_eq!(row.name, "N/A");
        assert_eq!(row.academic_year, "2023-2024");
        assert_eq!(row.submitted_by, "faculty");
    }

    #[test]
    fn test_student_rows_keep_roll_no() {
        let row = ExportRecord::from(&approved(AchievementCategory::Student, "2024-07-01"));
        assert_eq!(row.roll_no, "21A91A0501");
        assert_eq!(row.academic_year, "2024-2025");
        assert_eq!(row.certificate_issued_date, "2024-07-01");
    }

    #[test]
    fn test_rows_serialize_with_column_names() {
        let row = ExportRecord::from(&approved(AchievementCategory::Student, "2024-07-01"));
        let json = serde_json::to_value(&row).unwrap();
        for column in ExportRecord::COLUMNS {
            assert!(json.get(column).is_some(), "missing column {column}");
        }
    }

    #[test]
    fn test_file_name_shape() {
        let name = file_name("Portal", "Achievements_Report", "pdf");
        assert!(name.starts_with("Portal_Achievements_Report_"));
        assert!(name.ends_with(".pdf"));
    }
}
