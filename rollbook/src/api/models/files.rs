use crate::db::models::files::FileSummaryDBResponse;
use crate::types::{FileId, StudentId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// File metadata as listed on profile and detail pages
#[derive(Debug, Clone, Serialize)]
pub struct FileResponse {
    pub id: FileId,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub student_id: Option<StudentId>,
    pub created_at: DateTime<Utc>,
}

impl From<FileSummaryDBResponse> for FileResponse {
    fn from(db: FileSummaryDBResponse) -> Self {
        Self {
            id: db.id,
            filename: db.filename,
            content_type: db.content_type,
            size_bytes: db.size_bytes,
            student_id: db.student_id,
            created_at: db.created_at,
        }
    }
}
