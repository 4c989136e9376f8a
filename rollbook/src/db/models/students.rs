//! Database models for students.

use crate::types::StudentId;
use chrono::{DateTime, Utc};

/// Database request for creating a new student
#[derive(Debug, Clone)]
pub struct StudentCreateDBRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
}

/// Database request for updating a student.
///
/// Every profile field is replaced; `password_hash` is only written when present.
#[derive(Debug, Clone)]
pub struct StudentUpdateDBRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: Option<String>,
}

/// Database response for a student
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudentDBResponse {
    pub id: StudentId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
