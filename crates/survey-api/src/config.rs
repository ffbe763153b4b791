use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Secrets that ship in examples and must never reach production.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me"];

/// Runtime settings, read once at startup from `SURVEY_*` environment
/// variables (a `.env` file is loaded first by the server binary).
#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub cookie_secure: bool,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("SURVEY_JWT_SECRET")
            .context("SURVEY_JWT_SECRET must be set")?;
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SURVEY_JWT_SECRET is a placeholder; set a real secret");
        }

        Ok(Self {
            jwt_secret,
            access_token_minutes: parse_var("SURVEY_ACCESS_TOKEN_MINUTES", 15)?,
            refresh_token_days: parse_var("SURVEY_REFRESH_TOKEN_DAYS", 30)?,
            db_path: PathBuf::from(var_or("SURVEY_DB_PATH", "survey.db")),
            host: var_or("SURVEY_HOST", "0.0.0.0"),
            port: parse_var("SURVEY_PORT", 8000)?,
            cookie_secure: parse_var("SURVEY_COOKIE_SECURE", false)?,
            admin_email: optional_var("SURVEY_ADMIN_EMAIL"),
            admin_password: optional_var("SURVEY_ADMIN_PASSWORD"),
        })
    }

    /// Settings for tests and tools: short-lived tokens, insecure cookies.
    pub fn for_secret(jwt_secret: impl Into<String>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_minutes: 15,
            refresh_token_days: 30,
            db_path: db_path.into(),
            host: "127.0.0.1".into(),
            port: 8000,
            cookie_secure: false,
            admin_email: None,
            admin_password: None,
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}
