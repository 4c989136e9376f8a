//! HTTP request handlers, organized by area of the site.
//!
//! - [`auth`]: Login, logout and the logged-in profile page with its files
//! - [`files`]: File download and the multipart reading shared by upload forms
//! - [`static_assets`]: Embedded stylesheet serving
//! - [`students`]: Listing, search, registration, verification, editing and deletion
//! - [`uploads`]: Spreadsheet bulk import
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Result`]. Errors a user can fix on the same page are caught
//! and rendered into the form; the rest become a plain-text error response, except
//! [`crate::errors::Error::Unauthenticated`] which redirects to `/login`.

pub mod auth;
pub mod files;
pub mod static_assets;
pub mod students;
pub mod uploads;
