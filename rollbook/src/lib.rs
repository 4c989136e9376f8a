//! # rollbook: a small self-hosted student record manager
//!
//! `rollbook` is a server-rendered web application for keeping a register of students. Staff can
//! list and search students, register them one at a time (optionally with an attached file) or in
//! bulk from a spreadsheet, edit and delete them, and view a student's details after entering that
//! student's password. Students can log in to a profile page where they manage their own files.
//! Every registration, update and deletion sends the student a text message through Twilio.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum) serving HTML rendered by
//! [minijinja](https://github.com/mitsuhiko/minijinja); everything is persisted in SQLite through
//! sqlx, with migrations embedded at compile time.
//!
//! - The **API layer** ([`api`]) holds the page handlers and the form models they accept.
//! - The **authentication layer** ([`auth`]) hashes passwords with Argon2id and issues the
//!   JWT session cookie behind `/profile`.
//! - The **database layer** ([`db`]) uses the repository pattern: [`db::handlers::Students`] and
//!   [`db::handlers::Files`] wrap a borrowed connection and expose typed queries.
//! - **Spreadsheet import** ([`import`]) turns uploaded CSV or Excel sheets into registrations.
//! - **Notifications** ([`sms`]) never fail the request that triggered them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use rollbook::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = rollbook::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     rollbook::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod import;
pub mod sms;
mod static_assets;
pub mod telemetry;
pub mod templates;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::{str::FromStr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument};

use crate::{config::DatabaseConfig, sms::SmsService, templates::Templates};

pub use types::{FileId, StudentId};

/// Room for the multipart framing and text fields around an uploaded file
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state handed to every request handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .templates(Arc::new(Templates::new()?))
///     .sms(Arc::new(SmsService::new(&config.sms)?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub templates: Arc<Templates>,
    pub sms: Arc<SmsService>,
}

/// Get the rollbook database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Install rustls' aws-lc-rs provider as the process default.
///
/// Needed before building any TLS client. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Open (creating if needed) the SQLite database and run migrations
#[instrument(skip_all)]
pub async fn setup_database(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.pool.max_connections)
        .acquire_timeout(Duration::from_secs(config.pool.acquire_timeout_secs))
        .connect_with(options)
        .await?;

    migrator().run(&pool).await?;
    info!("Database ready at {}", config.url);

    Ok(pool)
}

/// Build the application router with every page, static asset and health route
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    use api::handlers::{auth, files, static_assets, students, uploads};

    let body_limit = state.config.uploads.max_file_size + MULTIPART_OVERHEAD_BYTES;
    let enable_metrics = state.config.enable_metrics;

    let router = Router::new()
        .route("/", get(students::list_students))
        .route("/students/", get(students::list_students))
        .route("/students/search/", get(students::search_students))
        .route("/register", get(students::register_form).post(students::register))
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/profile", get(auth::profile))
        .route("/profile/files", post(auth::upload_profile_file))
        .route("/profile/files/{file_id}/delete", post(auth::delete_profile_file))
        .route("/student/{id}/verify", get(students::verify_form).post(students::verify))
        .route("/student/{id}/edit/", get(students::edit_form).post(students::edit))
        .route("/student/{id}/delete", get(students::delete_student).post(students::delete_student))
        .route("/upload_excel", get(uploads::upload_excel_form).post(uploads::upload_excel))
        .route("/files/{file_id}", get(files::download_file))
        .route("/static/{*path}", get(static_assets::serve_embedded_asset))
        .route("/healthz", get(|| async { "OK" }))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    let router = if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router
            .route(
                "/internal/metrics",
                get(move || {
                    let handle = metric_handle.clone();
                    async move { handle.render() }
                }),
            )
            .layer(prometheus_layer)
    } else {
        router
    };

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// A configured server, ready to bind
pub struct Application {
    router: Router,
    config: Config,
    pool: SqlitePool,
}

impl Application {
    /// Create a new application, opening the configured database
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = setup_database(&config.database).await?;
        Self::new_with_pool(config, pool)
    }

    /// Create a new application on an existing, migrated pool
    pub fn new_with_pool(config: Config, pool: SqlitePool) -> anyhow::Result<Self> {
        debug!("Starting rollbook with configuration: {:#?}", config);

        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .templates(Arc::new(Templates::new()?))
            .sms(Arc::new(SmsService::new(&config.sms)?))
            .build();

        let router = build_router(state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Rollbook listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
