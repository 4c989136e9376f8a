//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `ROLLBOOK_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `ROLLBOOK_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `ROLLBOOK_SMS__ENABLED=false` sets the `sms.enabled` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use rollbook::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}", config.bind_address());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! ROLLBOOK_PORT=8080
//! ROLLBOOK_SECRET_KEY="change-me"
//! DATABASE_URL="sqlite:///var/lib/rollbook/rollbook.db"
//! ROLLBOOK_SMS__PROVIDER__TYPE=twilio
//! ROLLBOOK_SMS__PROVIDER__ACCOUNT_SID=AC...
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};

use crate::errors::Error;

pub const DEFAULT_TWILIO_API_BASE_URL: &str = "https://api.twilio.com";

/// CLI args
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "ROLLBOOK_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,

    /// Write a sample student spreadsheet to this path and exit.
    #[arg(long, value_name = "PATH")]
    pub sample_sheet: Option<PathBuf>,
}

/// Main application configuration.
///
/// All fields have defaults, so an empty YAML file plus `secret_key` is a valid configuration.
/// `Debug` output redacts `secret_key`.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Set from the raw `DATABASE_URL` environment variable, folded into `database.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub database: DatabaseConfig,
    /// Secret key for signing session tokens (required)
    pub secret_key: Option<String>,
    pub session: SessionConfig,
    pub password: PasswordConfig,
    pub uploads: UploadsConfig,
    pub sms: SmsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite connection string; the file is created if missing
    pub url: String,
    pub pool: PoolSettings,
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session timeout duration
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cookie name for session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
}

/// Password validation and hashing rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    /// Argon2 memory cost in KiB (default: 19456 KiB = 19 MB)
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

/// Upload limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Largest accepted upload in bytes, for attachments and spreadsheets alike
    pub max_file_size: usize,
    /// Largest accepted spreadsheet, in data rows (header excluded)
    pub max_import_rows: usize,
}

/// SMS notification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmsConfig {
    /// When false, notifications are skipped entirely
    pub enabled: bool,
    /// Name used in the welcome message
    pub system_name: String,
    /// Timeout for each provider request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Prepended to phone numbers that do not start with `+`, e.g. "+91"
    pub default_country_code: Option<String>,
    pub provider: SmsProviderConfig,
}

/// Where SMS messages go. `Debug` output redacts the Twilio auth token.
#[derive(Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SmsProviderConfig {
    /// Twilio Programmable Messaging REST API
    Twilio {
        account_sid: String,
        auth_token: String,
        /// Sender number in E.164 format
        from_number: String,
        #[serde(default = "default_twilio_api_base_url")]
        api_base_url: String,
    },
    /// Write messages to the log instead of sending them (development)
    Log,
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("database", &self.database)
            .field("secret_key", &self.secret_key.as_ref().map(|_| REDACTED))
            .field("session", &self.session)
            .field("password", &self.password)
            .field("uploads", &self.uploads)
            .field("sms", &self.sms)
            .field("enable_metrics", &self.enable_metrics)
            .field("enable_otel_export", &self.enable_otel_export)
            .finish()
    }
}

impl fmt::Debug for SmsProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Twilio {
                account_sid,
                auth_token: _,
                from_number,
                api_base_url,
            } => f
                .debug_struct("Twilio")
                .field("account_sid", account_sid)
                .field("auth_token", &REDACTED)
                .field("from_number", from_number)
                .field("api_base_url", api_base_url)
                .finish(),
            Self::Log => f.write_str("Log"),
        }
    }
}

fn default_twilio_api_base_url() -> String {
    DEFAULT_TWILIO_API_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_url: None,
            database: DatabaseConfig::default(),
            secret_key: None,
            session: SessionConfig::default(),
            password: PasswordConfig::default(),
            uploads: UploadsConfig::default(),
            sms: SmsConfig::default(),
            enable_metrics: true,
            enable_otel_export: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://rollbook.db".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(24 * 60 * 60), // 24 hours
            cookie_name: "rollbook_session".to_string(),
            cookie_secure: true,
            cookie_same_site: "lax".to_string(),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 4,
            max_length: 100,
            // Argon2id RFC recommendations
            argon2_memory_kib: 19456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            max_import_rows: 5000,
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            system_name: "Student Management System".to_string(),
            timeout: Duration::from_secs(10),
            default_country_code: None,
            provider: SmsProviderConfig::Log,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: secret_key is not configured. \
                     Please set ROLLBOOK_SECRET_KEY environment variable or add secret_key to config file."
                    .to_string(),
            });
        }

        if self.password.min_length < 1 {
            return Err(Error::Internal {
                operation: "Config validation: Invalid password configuration: min_length must be at least 1".to_string(),
            });
        }

        if self.password.min_length > self.password.max_length {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: Invalid password configuration: min_length ({}) cannot be greater than max_length ({})",
                    self.password.min_length, self.password.max_length
                ),
            });
        }

        if self.session.timeout.as_secs() < 300 {
            return Err(Error::Internal {
                operation: "Config validation: session timeout is too short (minimum 5 minutes)".to_string(),
            });
        }

        if self.session.timeout.as_secs() > 86400 * 30 {
            return Err(Error::Internal {
                operation: "Config validation: session timeout is too long (maximum 30 days)".to_string(),
            });
        }

        if self.uploads.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: uploads.max_file_size cannot be 0".to_string(),
            });
        }

        if self.uploads.max_import_rows == 0 {
            return Err(Error::Internal {
                operation: "Config validation: uploads.max_import_rows cannot be 0".to_string(),
            });
        }

        if self.sms.enabled
            && let SmsProviderConfig::Twilio {
                account_sid,
                auth_token,
                from_number,
                ..
            } = &self.sms.provider
            && (account_sid.is_empty() || auth_token.is_empty() || from_number.is_empty())
        {
            return Err(Error::Internal {
                operation: "Config validation: Twilio SMS provider requires account_sid, auth_token and from_number. \
                     Set them or disable SMS with sms.enabled=false."
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // ROLLBOOK_CONFIG names the file itself, it is not a config key
            .merge(Env::prefixed("ROLLBOOK_").ignore(&["config"]).split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
            sample_sheet: None,
        }
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\n")?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.bind_address(), "0.0.0.0:8000");
            assert_eq!(config.database.url, "sqlite://rollbook.db");
            assert_eq!(config.session.cookie_name, "rollbook_session");
            assert!(config.sms.enabled);
            assert!(matches!(config.sms.provider, SmsProviderConfig::Log));
            assert_eq!(config.uploads.max_file_size, 10 * 1024 * 1024);

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
sms:
  system_name: Springfield High
"#,
            )?;

            jail.set_env("ROLLBOOK_HOST", "127.0.0.1");
            jail.set_env("ROLLBOOK_PORT", "8080");
            jail.set_env("ROLLBOOK_SMS__ENABLED", "false");
            jail.set_env("ROLLBOOK_CONFIG", "test.yaml");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert!(!config.sms.enabled);
            // YAML values are preserved
            assert_eq!(config.sms.system_name, "Springfield High");

            Ok(())
        });
    }

    #[test]
    fn test_database_url_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
database:
  url: sqlite://from-yaml.db
  pool:
    max_connections: 2
"#,
            )?;
            jail.set_env("DATABASE_URL", "sqlite://from-env.db");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.database.url, "sqlite://from-env.db");
            assert_eq!(config.database.pool.max_connections, 2);
            assert!(config.database_url.is_none());

            Ok(())
        });
    }

    #[test]
    fn test_twilio_provider_and_durations() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
session:
  timeout: 2h
sms:
  timeout: 3s
  default_country_code: "+91"
  provider:
    type: twilio
    account_sid: AC123
    auth_token: token
    from_number: "+15005550006"
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.session.timeout, Duration::from_secs(2 * 60 * 60));
            assert_eq!(config.sms.timeout, Duration::from_secs(3));
            assert_eq!(config.sms.default_country_code.as_deref(), Some("+91"));
            match config.sms.provider {
                SmsProviderConfig::Twilio {
                    account_sid,
                    from_number,
                    api_base_url,
                    ..
                } => {
                    assert_eq!(account_sid, "AC123");
                    assert_eq!(from_number, "+15005550006");
                    assert_eq!(api_base_url, DEFAULT_TWILIO_API_BASE_URL);
                }
                other => panic!("expected twilio provider, got {other:?}"),
            }

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\nnot_a_setting: 1\n")?;

            assert!(Config::load(&args("test.yaml")).is_err());

            Ok(())
        });
    }

    #[test]
    fn test_misspelled_sms_setting_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\nsms:\n  enabeld: false\n")?;

            assert!(Config::load(&args("test.yaml")).is_err());

            Ok(())
        });
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let mut config = Config {
            secret_key: Some("session-signing-key".to_string()),
            ..Default::default()
        };
        config.sms.provider = SmsProviderConfig::Twilio {
            account_sid: "AC123".to_string(),
            auth_token: "twilio-auth-token".to_string(),
            from_number: "+15005550006".to_string(),
            api_base_url: DEFAULT_TWILIO_API_BASE_URL.to_string(),
        };

        for output in [format!("{config:?}"), format!("{config:#?}")] {
            assert!(!output.contains("session-signing-key"));
            assert!(!output.contains("twilio-auth-token"));
            assert!(output.contains("<redacted>"));
            assert!(output.contains("AC123"));
        }
    }

    #[test]
    fn test_missing_secret_key_fails_validation() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("secret_key"));
    }

    #[test]
    fn test_validation_rules() {
        let valid = Config {
            secret_key: Some("hello".to_string()),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let mut config = valid.clone();
        config.password.min_length = 0;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.password.min_length = 20;
        config.password.max_length = 10;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.session.timeout = Duration::from_secs(60);
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.session.timeout = Duration::from_secs(86400 * 31);
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.uploads.max_file_size = 0;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.uploads.max_import_rows = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_twilio_credentials_required_only_when_enabled() {
        let mut config = Config {
            secret_key: Some("hello".to_string()),
            ..Default::default()
        };
        config.sms.provider = SmsProviderConfig::Twilio {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            api_base_url: DEFAULT_TWILIO_API_BASE_URL.to_string(),
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Twilio"));

        config.sms.enabled = false;
        assert!(config.validate().is_ok());
    }
}
