//! Form and page models.
//!
//! Forms are deserialized from `application/x-www-form-urlencoded` bodies or assembled from
//! multipart fields; responses are serialized into template contexts.

pub mod files;
pub mod students;
