//! Student authentication.
//!
//! - [`password`]: Argon2id hashing and verification
//! - [`session`]: JWT session tokens and the cookies that carry them
//! - [`current_student`]: Axum extractor for the logged-in student

pub mod current_student;
pub mod password;
pub mod session;
