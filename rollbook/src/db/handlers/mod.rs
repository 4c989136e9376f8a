//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed SQLite connection (or transaction) and returns the
//! records defined in [`crate::db::models`].
//!
//! - [`Students`]: student records, implements [`Repository`]
//! - [`Files`]: uploaded blobs and their metadata
//!
//! ```ignore
//! use rollbook::db::handlers::{Repository, Students};
//!
//! async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let mut repo = Students::new(&mut tx);
//!     let everyone = repo.list(&Default::default()).await?;
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod files;
pub mod repository;
pub mod students;

pub use files::Files;
pub use repository::Repository;
pub use students::{StudentFilter, Students};
