use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
#[error("Invalid value for {key}: {message}")]
pub struct ConfigError {
    key: &'static str,
    message: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_size: usize,
    pub cors_origin: String,
    pub admin_email: String,
    pub admin_password: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr: try_load("LISTEN_ADDR", "0.0.0.0:5000")?,
            database_path: try_load("DATABASE_PATH", "applicants.db")?,
            upload_dir: try_load("UPLOAD_DIR", "uploads")?,
            max_upload_size: try_load("MAX_UPLOAD_SIZE", "16777216")?,
            cors_origin: try_load("CORS_ORIGIN", "http://localhost:3000")?,
            admin_email: try_load("ADMIN_EMAIL", "admin@example.com")?,
            admin_password: try_load("ADMIN_PASSWORD", "admin123")?,
        })
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError {
            key,
            message: e.to_string(),
        })
}
