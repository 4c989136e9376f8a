//! Database record models matching table schemas.
//!
//! Each table gets a create request, an optional update request and a response struct.
//! Database models are distinct from the API models in [`crate::api::models`] so that the
//! stored representation (e.g. the password hash) never leaks into rendered pages.
//!
//! - [`students`]: Student records and their credentials
//! - [`files`]: Uploaded binary blobs, optionally tied to a student

pub mod files;
pub mod students;
