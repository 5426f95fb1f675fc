use std::{io::Cursor, str::FromStr};

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    models::{ImportSummary, Role, UserRecord},
    repository::Repository,
};

/// ImportError
///
/// The uploaded file could not be read at all. Row-level problems never
/// surface here; they are counted as failed rows instead.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unreadable CSV file: {0}")]
    Csv(#[from] csv::Error),

    #[error("unreadable spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("spreadsheet has no worksheet")]
    EmptyWorkbook,
}

/// ImportFormat
///
/// `xlsx` covers every workbook calamine can sniff: .xlsx, legacy .xls,
/// .xlsb and .ods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Csv,
    #[serde(alias = "xls", alias = "xlsb", alias = "ods")]
    Xlsx,
}

impl ImportFormat {
    /// Guesses the format from a `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        match mime {
            "text/csv" | "application/csv" | "text/plain" => Some(ImportFormat::Csv),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel"
            | "application/vnd.ms-excel.sheet.binary.macroenabled.12"
            | "application/vnd.oasis.opendocument.spreadsheet" => Some(ImportFormat::Xlsx),
            _ => None,
        }
    }
}

/// ImportRow
///
/// One data row with the three expected columns, trimmed. A column that is
/// missing from the file, or a blank cell, is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRow {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl ImportRow {
    fn from_cells<'a>(columns: &Columns, cell: impl Fn(usize) -> Option<&'a str>) -> Self {
        let field = |idx: Option<usize>| {
            idx.and_then(&cell)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        Self {
            name: field(columns.name),
            email: field(columns.email),
            role: field(columns.role),
        }
    }

    /// The user this row describes, or `None` when a field is missing or the
    /// role is not exactly `Admin`, `Faculty` or `Student`.
    pub fn to_user(&self) -> Option<UserRecord> {
        let role = Role::from_str(self.role.as_deref()?).ok()?;
        Some(UserRecord {
            name: self.name.clone()?,
            email: self.email.clone()?,
            role,
        })
    }
}

/// Positions of the `name`, `email` and `role` headers (case-sensitive).
#[derive(Debug, Default)]
struct Columns {
    name: Option<usize>,
    email: Option<usize>,
    role: Option<usize>,
}

impl Columns {
    fn locate<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut columns = Columns::default();
        for (idx, header) in headers.into_iter().enumerate() {
            match header.trim() {
                "name" => columns.name = columns.name.or(Some(idx)),
                "email" => columns.email = columns.email.or(Some(idx)),
                "role" => columns.role = columns.role.or(Some(idx)),
                _ => {}
            }
        }
        columns
    }
}

/// parse_rows
///
/// Reads every data row below the header row. A row that cannot be decoded
/// becomes an empty `ImportRow`, which later counts as a failure.
pub fn parse_rows(format: ImportFormat, bytes: &[u8]) -> Result<Vec<ImportRow>, ImportError> {
    match format {
        ImportFormat::Csv => parse_csv(bytes),
        ImportFormat::Xlsx => parse_workbook(bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<ImportRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let columns = Columns::locate(reader.headers()?.iter());

    Ok(reader
        .records()
        .map(|record| match record {
            Ok(record) => ImportRow::from_cells(&columns, |idx| record.get(idx)),
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable CSV row");
                ImportRow::default()
            }
        })
        .collect())
}

fn parse_workbook(bytes: &[u8]) -> Result<Vec<ImportRow>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::EmptyWorkbook)??;

    let mut rows = range.rows().map(|row| {
        row.iter()
            .map(|cell| match cell {
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<String>>()
    });

    let Some(headers) = rows.next() else {
        return Ok(Vec::new());
    };
    let columns = Columns::locate(headers.iter().map(String::as_str));

    Ok(rows
        .map(|cells| {
            ImportRow::from_cells(&columns, |idx| cells.get(idx).map(String::as_str))
        })
        .collect())
}

/// ImportOutcome
///
/// The summary returned to the client plus the emails that were written, so
/// the caller can drop their cached roles.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    pub imported: Vec<String>,
}

/// import_users
///
/// Upserts each valid row into the group its role names. Invalid rows and
/// rows whose write fails are counted as failed; the batch always runs to
/// the end.
pub async fn import_users(repo: &dyn Repository, rows: &[ImportRow], actor: &str) -> ImportOutcome {
    let mut outcome = ImportOutcome::default();

    for (line, row) in rows.iter().enumerate() {
        let Some(user) = row.to_user() else {
            outcome.summary.failed += 1;
            continue;
        };
        let email = user.email.clone();
        match repo.upsert_user(user, actor).await {
            Ok(_) => {
                outcome.summary.succeeded += 1;
                outcome.imported.push(email);
            }
            Err(e) => {
                tracing::error!(row = line + 2, error = %e, "import row write failed");
                outcome.summary.failed += 1;
            }
        }
    }

    if outcome.summary.failed > 0 {
        tracing::warn!(
            succeeded = outcome.summary.succeeded,
            failed = outcome.summary.failed,
            "bulk import finished with failures"
        );
    }
    outcome
}
