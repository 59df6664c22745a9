use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::apply_security_headers;

const DEFAULT_DATABASE_URL: &str = "sqlite://events.db";
const DEFAULT_PORT: u16 = 10000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// What `delete_event` does for an event that was created without a password.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PasswordlessDelete {
    Allow,
    #[default]
    Forbid,
}

impl FromStr for PasswordlessDelete {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "forbid" => Ok(Self::Forbid),
            other => Err(format!("expected 'allow' or 'forbid', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub port: u16,
    pub passwordless_delete: PasswordlessDelete,
    pub legacy_json_path: Option<PathBuf>,
    pub cors_allowed_origins: Option<String>,
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            port: parse_or("PORT", DEFAULT_PORT),
            passwordless_delete: parse_or("PASSWORDLESS_DELETE", PasswordlessDelete::default()),
            legacy_json_path: env::var("LEGACY_EVENTS_JSON")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            port: DEFAULT_PORT,
            passwordless_delete: PasswordlessDelete::default(),
            legacy_json_path: None,
            cors_allowed_origins: None,
            production: false,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default {default:?}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default:?}");
            default
        }
    }
}
