//! Runtime configuration loaded from the environment
//!
//! Values are read once at startup (after `.env` has been loaded by `dotenvy`).
//! Missing or malformed variables fall back to their defaults with a warning.

use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

/// Default number of items per page for paginated listings
pub const DEFAULT_PAGE_SIZE: usize = 6;

/// Hard upper bound for the `limit` query parameter
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to (`PORT`)
    pub port: u16,

    /// Path of the redb database file (`DATABASE_URL`)
    pub database_url: String,

    /// Public base address used when building short links (`URL` + `PORT`)
    pub public_url: String,

    /// Default page size for paginated listings (`PAGE_SIZE`)
    pub page_size: usize,

    /// Optional JSON or CSV file with ingredients to load at startup (`INGREDIENTS_PATH`)
    pub ingredients_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "data.db".to_string(),
            public_url: "http://localhost:8080".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            ingredients_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = try_load("PORT", defaults.port);
        let base_url = try_load("URL", "http://localhost".to_string());
        let page_size = try_load("PAGE_SIZE", defaults.page_size).clamp(1, MAX_PAGE_SIZE);

        Self {
            port,
            database_url: try_load("DATABASE_URL", defaults.database_url),
            public_url: format!("{}:{}", base_url.trim_end_matches('/'), port),
            page_size,
            ingredients_path: env::var("INGREDIENTS_PATH").ok().filter(|p| !p.is_empty()),
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
