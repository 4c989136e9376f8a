//! Form and page models for students.

use crate::config::PasswordConfig;
use crate::db::models::students::StudentDBResponse;
use crate::errors::Error;
use crate::types::StudentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_NAME_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_PHONE_LEN: usize = 15;

/// Fields submitted by the registration and edit forms, and read from spreadsheet rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Never echoed back into re-rendered forms
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl StudentForm {
    /// Trim the profile fields. The password is taken exactly as typed.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            password: self.password,
        }
    }

    /// Check lengths and formats against the column limits.
    ///
    /// With `password_required` false an empty password is accepted and means "unchanged".
    pub fn validate(&self, rules: &PasswordConfig, password_required: bool) -> Result<(), Error> {
        let invalid = |message: String| -> Result<(), Error> { Err(Error::BadRequest { message }) };

        if self.name.is_empty() {
            return invalid("Name is required.".to_string());
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return invalid(format!("Name must be at most {MAX_NAME_LEN} characters."));
        }

        if self.email.is_empty() {
            return invalid("Email is required.".to_string());
        }
        if self.email.chars().count() > MAX_EMAIL_LEN {
            return invalid(format!("Email must be at most {MAX_EMAIL_LEN} characters."));
        }
        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !self.email.contains(char::is_whitespace) => {}
            _ => return invalid("Please enter a valid email address.".to_string()),
        }

        if self.phone.is_empty() {
            return invalid("Phone is required.".to_string());
        }
        if self.phone.chars().count() > MAX_PHONE_LEN {
            return invalid(format!("Phone must be at most {MAX_PHONE_LEN} characters."));
        }
        if !self.phone.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')')) {
            return invalid("Phone may only contain digits, spaces and + - ( ).".to_string());
        }

        if self.password.is_empty() && !password_required {
            return Ok(());
        }
        let length = self.password.chars().count();
        if length < rules.min_length {
            return invalid(format!("Password must be at least {} characters.", rules.min_length));
        }
        if length > rules.max_length {
            return invalid(format!("Password must be at most {} characters.", rules.max_length));
        }

        Ok(())
    }
}

/// Login form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Password prompt in front of a student's detail page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyForm {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

/// A student as shown on pages; the password hash stays behind
#[derive(Debug, Clone, Serialize)]
pub struct StudentResponse {
    pub id: StudentId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StudentDBResponse> for StudentResponse {
    fn from(db: StudentDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            phone: db.phone,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<&StudentResponse> for StudentForm {
    fn from(student: &StudentResponse) -> Self {
        Self {
            name: student.name.clone(),
            email: student.email.clone(),
            phone: student.phone.clone(),
            password: String::new(),
        }
    }
}
