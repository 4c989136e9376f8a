//! Test utilities: configs, in-memory databases and running test servers.

use std::{str::FromStr, sync::Arc};

use axum_test::{TestServer, multipart::MultipartForm};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    AppState, Application,
    auth::password::{Argon2Params, hash_string_with_params},
    config::{Config, PasswordConfig, SmsConfig, SmsProviderConfig, UploadsConfig},
    db::{
        handlers::{Repository, Students},
        models::students::{StudentCreateDBRequest, StudentDBResponse},
    },
    sms::SmsService,
    templates::Templates,
};

/// Cheap Argon2 settings so tests don't spend their time hashing
const TEST_ARGON2: Argon2Params = Argon2Params {
    memory_kib: 128,
    iterations: 1,
    parallelism: 1,
};

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        session: crate::config::SessionConfig {
            cookie_secure: false,
            ..Default::default()
        },
        password: PasswordConfig {
            min_length: 4,
            argon2_memory_kib: TEST_ARGON2.memory_kib,
            argon2_iterations: TEST_ARGON2.iterations,
            argon2_parallelism: TEST_ARGON2.parallelism,
            ..Default::default()
        },
        uploads: UploadsConfig {
            max_file_size: 64 * 1024,
            ..Default::default()
        },
        sms: SmsConfig {
            provider: SmsProviderConfig::Log,
            ..Default::default()
        },
        // The Prometheus recorder is process-global
        enable_metrics: false,
        ..Default::default()
    }
}

/// A migrated in-memory database. One connection, so every handle sees the same data.
pub async fn create_test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").expect("Invalid in-memory database URL");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to open in-memory database");
    crate::migrator().run(&pool).await.expect("Failed to run migrations");
    pool
}

pub async fn create_test_state() -> AppState {
    create_test_state_with_config(create_test_config()).await
}

pub async fn create_test_state_with_config(config: Config) -> AppState {
    AppState::builder()
        .db(create_test_pool().await)
        .templates(Arc::new(Templates::new().expect("Failed to load templates")))
        .sms(Arc::new(SmsService::new(&config.sms).expect("Failed to create SMS service")))
        .config(config)
        .build()
}

/// A test server over a fresh database, plus state sharing that database
pub async fn create_test_app() -> (TestServer, AppState) {
    create_test_app_with_config(create_test_config()).await
}

/// Like [`create_test_app`], on a caller-supplied config
pub async fn create_test_app_with_config(config: Config) -> (TestServer, AppState) {
    let state = create_test_state_with_config(config).await;
    let server = Application::new_with_pool(state.config.clone(), state.db.clone())
        .expect("Failed to create application")
        .into_test_server();
    (server, state)
}

/// SMS settings pointing Twilio calls at `api_base_url`, typically a wiremock server
pub fn twilio_sms_config(api_base_url: &str) -> SmsConfig {
    SmsConfig {
        enabled: true,
        system_name: "Test School".to_string(),
        timeout: std::time::Duration::from_secs(2),
        default_country_code: Some("+91".to_string()),
        provider: SmsProviderConfig::Twilio {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from_number: "+15005550006".to_string(),
            api_base_url: api_base_url.to_string(),
        },
    }
}

/// Insert a student named "Test Student" with the given email and password
pub async fn create_test_student(pool: &SqlitePool, email: &str, password: &str) -> StudentDBResponse {
    let password_hash = hash_string_with_params(password, Some(TEST_ARGON2)).expect("Failed to hash password");
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Students::new(&mut conn)
        .create(&StudentCreateDBRequest {
            name: "Test Student".to_string(),
            email: email.to_string(),
            phone: "9123456789".to_string(),
            password_hash,
        })
        .await
        .expect("Failed to create test student")
}

/// Registration form fields as multipart, without a file
pub fn multipart_student(name: &str, email: &str, phone: &str, password: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text("name", name.to_string())
        .add_text("email", email.to_string())
        .add_text("phone", phone.to_string())
        .add_text("password", password.to_string())
}
