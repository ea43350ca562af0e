use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TMDB_API_URL: &str = "https://api.themoviedb.org/3";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("{0} has an invalid value: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub secret_key: String,
    pub tmdb_api_key: String,
    pub tmdb_api_url: String,
    pub tmdb_timeout: Duration,
    pub database_path: String,
    pub bind_address: String,
    pub bcrypt_cost: u32,
    pub cookie_secure: bool,
}

impl Settings {
    /// Reads the settings from the environment.
    ///
    /// `SECRET_KEY` (at least 32 bytes) and `TMDB_API_KEY` are required,
    /// everything else falls back to a development default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = required("SECRET_KEY")?;
        if secret_key.len() < 32 {
            return Err(ConfigError::Invalid(
                "SECRET_KEY",
                "must be at least 32 bytes long".to_owned(),
            ));
        }
        let tmdb_api_key = required("TMDB_API_KEY")?;

        Ok(Settings {
            secret_key,
            tmdb_api_key,
            tmdb_api_url: env::var("TMDB_API_URL")
                .unwrap_or_else(|_| DEFAULT_TMDB_API_URL.to_owned()),
            tmdb_timeout: Duration::from_secs(parsed("TMDB_TIMEOUT_SECS", 10)?),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "movies.db".to_owned()),
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:8080".to_owned()),
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            cookie_secure: parsed("SESSION_COOKIE_SECURE", false)?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid(name, value)),
        Err(_) => Ok(default),
    }
}
