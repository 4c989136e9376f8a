//! Database repository for uploaded files.
//!
//! Files are stored as blobs next to their metadata. Listings go through
//! [`FileSummaryDBResponse`], as do ownership checks, so the payload is only loaded on download.

use crate::db::{
    errors::Result,
    models::files::{FileCreateDBRequest, FileDBResponse, FileSummaryDBResponse},
};
use crate::types::{FileId, StudentId};
use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::instrument;

pub struct Files<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Files<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(filename = %request.filename, size = request.data.len(), student_id = ?request.student_id), err)]
    pub async fn create(&mut self, request: &FileCreateDBRequest) -> Result<FileSummaryDBResponse> {
        let file = sqlx::query_as::<_, FileSummaryDBResponse>(
            "INSERT INTO files (filename, content_type, data, size_bytes, student_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id, filename, content_type, size_bytes, student_id, created_at",
        )
        .bind(&request.filename)
        .bind(&request.content_type)
        .bind(&request.data)
        .bind(request.data.len() as i64)
        .bind(request.student_id)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(file)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: FileId) -> Result<Option<FileDBResponse>> {
        let file = sqlx::query_as::<_, FileDBResponse>(
            "SELECT id, filename, content_type, data, size_bytes, student_id, created_at FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(file)
    }

    /// Metadata for one file, without loading its payload
    #[instrument(skip(self), err)]
    pub async fn get_summary(&mut self, id: FileId) -> Result<Option<FileSummaryDBResponse>> {
        let file = sqlx::query_as::<_, FileSummaryDBResponse>(
            "SELECT id, filename, content_type, size_bytes, student_id, created_at FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(file)
    }

    #[instrument(skip(self), err)]
    pub async fn list_for_student(&mut self, student_id: StudentId) -> Result<Vec<FileSummaryDBResponse>> {
        let files = sqlx::query_as::<_, FileSummaryDBResponse>(
            "SELECT id, filename, content_type, size_bytes, student_id, created_at
             FROM files WHERE student_id = ? ORDER BY id",
        )
        .bind(student_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(files)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: FileId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }
}
