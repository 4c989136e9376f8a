//! Database repository for students.

use crate::types::StudentId;
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::students::{StudentCreateDBRequest, StudentDBResponse, StudentUpdateDBRequest},
};
use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::instrument;

const STUDENT_COLUMNS: &str = "id, name, email, phone, password_hash, created_at, updated_at";

/// Filter for listing students
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    /// Case-insensitive substring matched against name OR email, with Unicode case folding
    pub search: Option<String>,
}

impl StudentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.search = if query.trim().is_empty() { None } else { Some(query) };
        self
    }
}

pub struct Students<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Students<'c> {
    type CreateRequest = StudentCreateDBRequest;
    type UpdateRequest = StudentUpdateDBRequest;
    type Response = StudentDBResponse;
    type Id = StudentId;
    type Filter = StudentFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let now = Utc::now();
        let student = sqlx::query_as::<_, StudentDBResponse>(&format!(
            "INSERT INTO students (name, email, phone, password_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(student)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let student = sqlx::query_as::<_, StudentDBResponse>(&format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(student)
    }

    #[instrument(skip(self, filter), fields(search = ?filter.search), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let students = sqlx::query_as::<_, StudentDBResponse>(&format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY id"))
            .fetch_all(&mut *self.db)
            .await?;

        // SQLite's LIKE and NOCASE only fold ASCII, so matching happens here
        let students = match &filter.search {
            Some(query) => {
                let needle = query.trim().to_lowercase();
                students
                    .into_iter()
                    .filter(|student| student.name.to_lowercase().contains(&needle) || student.email.to_lowercase().contains(&needle))
                    .collect()
            }
            None => students,
        };

        Ok(students)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM students WHERE id = ?").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let student = sqlx::query_as::<_, StudentDBResponse>(&format!(
            "UPDATE students SET
                name = ?,
                email = ?,
                phone = ?,
                password_hash = COALESCE(?, password_hash),
                updated_at = ?
             WHERE id = ?
             RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.password_hash)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(student)
    }
}

impl<'c> Students<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Look up a student by email. Matching is case-insensitive (the column is `COLLATE NOCASE`).
    #[instrument(skip(self, email), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<StudentDBResponse>> {
        let student = sqlx::query_as::<_, StudentDBResponse>(&format!("SELECT {STUDENT_COLUMNS} FROM students WHERE email = ?"))
            .bind(email.trim())
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(student)
    }

    pub async fn email_exists(&mut self, email: &str) -> Result<bool> {
        Ok(self.get_by_email(email).await?.is_some())
    }
}
