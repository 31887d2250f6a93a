use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Process configuration, read from `KINSHIP_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub presence_debounce: Duration,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: var_or("KINSHIP_HOST", "0.0.0.0"),
            port: parse_var("KINSHIP_PORT", 3000)?,
            db_path: PathBuf::from(var_or("KINSHIP_DB_PATH", "kinship.db")),
            jwt_secret: var_or("KINSHIP_JWT_SECRET", "dev-secret-change-me"),
            presence_debounce: Duration::from_millis(parse_var("KINSHIP_PRESENCE_DEBOUNCE_MS", 500)?),
            token_ttl_days: parse_var("KINSHIP_TOKEN_TTL_DAYS", 30)?,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
