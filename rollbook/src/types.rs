//! Common type definitions.
//!
//! Entity IDs are SQLite `INTEGER PRIMARY KEY` values wrapped in type aliases so signatures say
//! which table an id belongs to:
//!
//! - [`StudentId`]: Student record identifier
//! - [`FileId`]: Stored file identifier

use std::fmt;

pub type StudentId = i64;
pub type FileId = i64;

/// SMS-worthy lifecycle events on a student record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudentAction {
    Registered,
    Updated,
    Deleted,
}

impl StudentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentAction::Registered => "registered",
            StudentAction::Updated => "updated",
            StudentAction::Deleted => "deleted",
        }
    }
}

impl fmt::Display for StudentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
