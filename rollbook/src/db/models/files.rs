use crate::types::{FileId, StudentId};
use chrono::{DateTime, Utc};

/// Database request for storing a new file
#[derive(Debug, Clone)]
pub struct FileCreateDBRequest {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
    /// Not validated against `students`; attachments survive their student
    pub student_id: Option<StudentId>,
}

/// A stored file including its payload
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileDBResponse {
    pub id: FileId,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub size_bytes: i64,
    pub student_id: Option<StudentId>,
    pub created_at: DateTime<Utc>,
}

/// File metadata without the payload, for listings
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileSummaryDBResponse {
    pub id: FileId,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub student_id: Option<StudentId>,
    pub created_at: DateTime<Utc>,
}
