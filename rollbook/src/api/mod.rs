//! HTTP surface: page handlers and the form/response models they exchange.
//!
//! - **[`handlers`]**: Axum route handlers, one module per area of the site
//! - **[`models`]**: Form input and template-facing response structures
//!
//! Every page is server-rendered HTML. Form submissions that succeed answer with a
//! `303 See Other` redirect; ones that fail validation re-render the form with an error banner.

pub mod handlers;
pub mod models;
