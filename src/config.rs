//! Environment-driven configuration.
//!
//! Values come from the process environment after loading an optional `.env`
//! file. Everything except the secrets in production has a usable default so a
//! fresh checkout can run with no setup.

use std::env;
use std::time::Duration;

use thiserror::Error;

const DEV_SESSION_SECRET: &str = "dev-session-secret-change-me";
const DEV_JWT_SECRET: &str = "dev-jwt-secret-change-me";
const DEFAULT_BODY_LIMIT_MB: usize = 50;
const DEV_FRONTEND_URLS: [&str; 3] = [
    "http://localhost:8080",
    "http://localhost:5173",
    "http://localhost:3000",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set in production")]
    Missing(&'static str),
    #[error("environment variable {key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct SuperadminSeed {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_path: String,
    pub production: bool,
    pub session_secret: String,
    pub jwt_secret: String,
    pub python_api_url: String,
    pub scheduler_timeout: Duration,
    pub bcrypt_cost: u32,
    pub mail: Option<MailConfig>,
    pub superadmin: Option<SuperadminSeed>,
    pub log_format: LogFormat,
    pub log_dir: Option<String>,
    /// Browser origins allowed to call the API with credentials.
    pub frontend_urls: Vec<String>,
    /// Largest accepted request body in bytes; scheduler constraint payloads are big.
    pub body_limit: usize,
    /// Secrets that fell back to development values; `main` warns about them
    /// once logging is up.
    pub fallback_secrets: Vec<&'static str>,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let production = var("NODE_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));

        let mut fallback_secrets = Vec::new();
        let session_secret =
            secret("SESSION_SECRET", DEV_SESSION_SECRET, production, &mut fallback_secrets)?;
        let jwt_secret = secret("JWT_SECRET", DEV_JWT_SECRET, production, &mut fallback_secrets)?;

        let mail = match (var("MAIL_API_URL"), var("MAIL_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(MailConfig {
                api_url,
                api_key,
                from: var("MAIL_FROM").unwrap_or_else(|| "no-reply@timetable.local".to_string()),
            }),
            _ => None,
        };

        let superadmin = match (var("SUPERADMIN_EMAIL"), var("SUPERADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SuperadminSeed { email, password }),
            _ => None,
        };

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            port: parsed("PORT", 5000)?,
            database_path: var("DATABASE_PATH").unwrap_or_else(|| "timetable_data".to_string()),
            production,
            session_secret,
            jwt_secret,
            python_api_url: var("PYTHON_API_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            scheduler_timeout: Duration::from_secs(parsed("SCHEDULER_TIMEOUT_SECS", 20)?),
            bcrypt_cost: parsed("BCRYPT_COST", 10)?,
            mail,
            superadmin,
            log_format,
            log_dir: var("LOG_DIR"),
            frontend_urls: frontend_urls(var("FRONTEND_URLS")),
            body_limit: parsed::<usize>("BODY_LIMIT_MB", DEFAULT_BODY_LIMIT_MB)?.saturating_mul(1024 * 1024),
            fallback_secrets,
        })
    }

    /// Configuration for in-process tests: fixed secrets, cheapest bcrypt cost.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            database_path: String::new(),
            production: false,
            session_secret: "test-session-secret".to_string(),
            jwt_secret: "test-jwt-secret".to_string(),
            python_api_url: "http://127.0.0.1:9".to_string(),
            scheduler_timeout: Duration::from_secs(1),
            bcrypt_cost: 4,
            mail: None,
            superadmin: None,
            log_format: LogFormat::Pretty,
            log_dir: None,
            frontend_urls: vec!["http://localhost:5173".to_string()],
            body_limit: DEFAULT_BODY_LIMIT_MB * 1024 * 1024,
            fallback_secrets: Vec::new(),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Comma-separated list; trailing slashes are dropped since browsers send bare origins.
fn frontend_urls(raw: Option<String>) -> Vec<String> {
    match raw {
        Some(raw) => raw
            .split(',')
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect(),
        None => DEV_FRONTEND_URLS.iter().map(|url| url.to_string()).collect(),
    }
}

fn secret(
    key: &'static str,
    fallback: &str,
    production: bool,
    fell_back: &mut Vec<&'static str>,
) -> Result<String, ConfigError> {
    match var(key) {
        Some(value) => Ok(value),
        None if production => Err(ConfigError::Missing(key)),
        None => {
            fell_back.push(key);
            Ok(fallback.to_string())
        }
    }
}
