//! Bulk student registration from uploaded spreadsheets.
//!
//! [`import_students`] reads every row of the first sheet and registers each student whose
//! email is not already on file. Rows are handled one at a time and committed as they go, so a
//! bad row never undoes the rows before it.

pub mod sample;
pub mod spreadsheet;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    AppState,
    api::{handlers::students::create_student, models::students::StudentForm},
    db::{errors::DbError, handlers::Students},
    errors::{Error, Result},
};

/// One data row of an uploaded sheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentRow {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

impl From<StudentRow> for StudentForm {
    fn from(row: StudentRow) -> Self {
        StudentForm {
            name: row.name,
            email: row.email,
            phone: row.phone,
            password: row.password,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRow {
    /// 1-based row number in the sheet as the uploader sees it
    pub row: usize,
    pub email: String,
    pub reason: String,
}

/// What happened to each row of an upload
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub added: Vec<String>,
    pub duplicates: Vec<String>,
    pub failed: Vec<FailedRow>,
}

impl ImportReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.duplicates.is_empty() && self.failed.is_empty()
    }

    /// Summary lines for the result page; empty categories are left out
    pub fn messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        if !self.added.is_empty() {
            messages.push(format!("Added: {}", self.added.join(", ")));
        }
        if !self.duplicates.is_empty() {
            messages.push(format!("Skipped duplicates: {}", self.duplicates.join(", ")));
        }
        if !self.failed.is_empty() {
            let failures: Vec<String> = self
                .failed
                .iter()
                .map(|f| {
                    let label = if f.email.is_empty() { format!("row {}", f.row) } else { f.email.clone() };
                    format!("{label} ({})", f.reason)
                })
                .collect();
            messages.push(format!("Failed: {}", failures.join(", ")));
        }
        messages
    }
}

/// Register every new student in an uploaded spreadsheet.
///
/// Returns an error only when the file as a whole is unusable (unreadable or over the row
/// limit); problems with individual rows end up in [`ImportReport::failed`].
#[instrument(skip(state, data), fields(size = data.len()))]
pub async fn import_students(state: &AppState, filename: &str, data: &[u8]) -> Result<ImportReport> {
    let rows = spreadsheet::read_rows(filename, data)?;

    let max_rows = state.config.uploads.max_import_rows;
    if rows.len() > max_rows {
        return Err(Error::BadRequest {
            message: format!("The spreadsheet has {} rows; at most {max_rows} can be imported at once.", rows.len()),
        });
    }

    let mut report = ImportReport::default();
    for (row_number, row) in rows {
        let form = StudentForm::from(row).normalized();
        let email = form.email.clone();

        let outcome = match import_row(state, form).await {
            Ok(RowOutcome::Added) => {
                report.added.push(email);
                "added"
            }
            Ok(RowOutcome::Duplicate) => {
                report.duplicates.push(email);
                "duplicate"
            }
            Err(e) => {
                warn!(row = row_number, email = %email, "Error importing row: {e:#}");
                report.failed.push(FailedRow {
                    row: row_number,
                    email,
                    reason: e.user_message(),
                });
                "failed"
            }
        };
        metrics::counter!("rollbook_import_rows_total", "outcome" => outcome).increment(1);
    }

    info!(
        added = report.added.len(),
        duplicates = report.duplicates.len(),
        failed = report.failed.len(),
        "Spreadsheet import finished"
    );
    Ok(report)
}

enum RowOutcome {
    Added,
    Duplicate,
}

async fn import_row(state: &AppState, form: StudentForm) -> Result<RowOutcome> {
    if !form.email.is_empty() {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        if Students::new(&mut conn).email_exists(&form.email).await? {
            return Ok(RowOutcome::Duplicate);
        }
    }

    match create_student(state, form).await {
        Ok(_) => Ok(RowOutcome::Added),
        // Registered by someone else between the check and the insert
        Err(Error::Database(e)) if e.is_duplicate_email() => Ok(RowOutcome::Duplicate),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{Repository, StudentFilter};
    use crate::test_utils::{create_test_state, create_test_student};

    #[test]
    fn test_report_messages_omit_empty_categories() {
        let report = ImportReport {
            added: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            duplicates: vec![],
            failed: vec![
                FailedRow {
                    row: 4,
                    email: String::new(),
                    reason: "Email is required.".to_string(),
                },
                FailedRow {
                    row: 5,
                    email: "x@example.com".to_string(),
                    reason: "Phone is required.".to_string(),
                },
            ],
        };

        assert_eq!(
            report.messages(),
            vec![
                "Added: a@example.com, b@example.com".to_string(),
                "Failed: row 4 (Email is required.), x@example.com (Phone is required.)".to_string(),
            ]
        );
        assert!(ImportReport::default().messages().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_import_adds_new_and_skips_duplicates() {
        let state = create_test_state().await;
        create_test_student(&state.db, "existing@example.com", "pass0123").await;

        let csv = "name,email,phone,password\n\
                   New One,new1@example.com,9000000001,pass1123\n\
                   Existing,EXISTING@example.com,9000000002,pass2123\n\
                   New Two,new2@example.com,9000000003,pass3123\n\
                   Again,new1@example.com,9000000004,pass4123\n\
                   No Phone,nophone@example.com,,pass5123\n";

        let report = import_students(&state, "students.csv", csv.as_bytes()).await.unwrap();

        assert_eq!(report.added, vec!["new1@example.com", "new2@example.com"]);
        assert_eq!(report.duplicates, vec!["EXISTING@example.com", "new1@example.com"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].row, 6);
        assert_eq!(report.failed[0].reason, "Phone is required.");

        let mut conn = state.db.acquire().await.unwrap();
        let students = Students::new(&mut conn).list(&StudentFilter::new()).await.unwrap();
        assert_eq!(students.len(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_import_rejects_too_many_rows() {
        let mut state = create_test_state().await;
        state.config.uploads.max_import_rows = 1;

        let csv = "name,email,phone,password\nA,a@example.com,1,pass1123\nB,b@example.com,2,pass2123\n";
        let err = import_students(&state, "students.csv", csv.as_bytes()).await.unwrap_err();

        assert!(matches!(err, Error::BadRequest { .. }));
        let mut conn = state.db.acquire().await.unwrap();
        assert!(Students::new(&mut conn).list(&StudentFilter::new()).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_import_sample_workbook() {
        let state = create_test_state().await;
        let bytes = sample::sample_workbook_bytes().unwrap();

        let report = import_students(&state, "sample_students.xlsx", &bytes).await.unwrap();

        assert_eq!(report.added.len(), 5);
        assert!(report.duplicates.is_empty());
        assert!(report.failed.is_empty());

        // Uploading the same sheet again only produces duplicates
        let report = import_students(&state, "sample_students.xlsx", &bytes).await.unwrap();
        assert!(report.added.is_empty());
        assert_eq!(report.duplicates.len(), 5);
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_row_number_matches_sheet_when_header_is_not_first() {
        let state = create_test_state().await;

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, title) in sample::SAMPLE_HEADER.iter().enumerate() {
            sheet.write_string(2, col as u16, *title).unwrap();
        }
        // Row 4 has no email
        sheet.write_string(3, 0, "Nobody").unwrap();
        sheet.write_string(3, 2, "9000000001").unwrap();
        sheet.write_string(3, 3, "pass1123").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let report = import_students(&state, "offset.xlsx", &bytes).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].row, 4);
        assert!(report.messages()[0].starts_with("Failed: row 4 ("));
    }
}
