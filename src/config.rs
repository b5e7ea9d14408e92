use std::{net::SocketAddr, str::FromStr, time::Duration};

use crate::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    /// Upper bound on every store call made while handling a client event.
    pub persist_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://trailmate.db".to_owned(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            allowed_origins: vec!["http://localhost:5173".to_owned()],
            persist_timeout: Duration::from_millis(5000),
        }
    }
}

impl Config {
    /// Reads the environment, including a `.env` file when present.
    pub fn from_env() -> AppResult<Self> {
        let defaults = Config::default();

        let database_url = dotenv::var("DATABASE_URL").unwrap_or(defaults.database_url);
        let bind_addr = parse_var("BIND_ADDR")?.unwrap_or(defaults.bind_addr);
        let allowed_origins = match dotenv::var("ALLOWED_ORIGINS") {
            Ok(origins) => split_origins(&origins),
            Err(_) => defaults.allowed_origins,
        };
        let persist_timeout = parse_var::<u64>("PERSIST_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.persist_timeout);

        Ok(Self {
            database_url,
            bind_addr,
            allowed_origins,
            persist_timeout,
        })
    }
}

fn parse_var<T: FromStr>(key: &str) -> AppResult<Option<T>> {
    let Ok(raw) = dotenv::var(key) else {
        return Ok(None);
    };

    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| AppError::Config(format!("{key}={raw:?} is not valid")))
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_owned)
        .collect()
}
