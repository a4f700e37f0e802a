use std::env;
use thiserror::Error;

/// AppConfig
///
/// Holds the application's configuration. Immutable once loaded and shared through
/// the application state via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // sqlx SQLite URL, e.g. `sqlite://bookstore.db` or `sqlite::memory:`.
    pub db_url: String,
    // Runtime environment marker. Selects the log format and which settings are mandatory.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // bcrypt work factor used when hashing account passwords.
    pub bcrypt_cost: u32,
    // Whether the demo accounts, authors and books are inserted at startup.
    pub seed_data: bool,
}

/// Env
///
/// The runtime context: `Local` favours convenience (in-memory database, pretty logs),
/// `Production` requires every setting to be explicit and logs JSON.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const LOCAL_DB_URL: &str = "sqlite::memory:";

// bcrypt accepts work factors in this range.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

impl Default for AppConfig {
    /// default
    ///
    /// Test-friendly configuration: in-memory database, seeded, and the cheapest
    /// bcrypt cost so that hashing does not dominate test time.
    fn default() -> Self {
        Self {
            db_url: LOCAL_DB_URL.to_string(),
            env: Env::Local,
            bind_addr: "127.0.0.1:0".to_string(),
            bcrypt_cost: MIN_BCRYPT_COST,
            seed_data: true,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables (after `.env` has been applied
    /// by the caller). Production refuses to start without an explicit `DATABASE_URL`.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = match (env::var("DATABASE_URL"), &env) {
            (Ok(url), _) => url,
            (Err(_), Env::Production) => return Err(ConfigError::Missing("DATABASE_URL")),
            (Err(_), Env::Local) => LOCAL_DB_URL.to_string(),
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let bcrypt_cost = match env::var("BCRYPT_COST") {
            Ok(raw) => parse_cost(&raw)?,
            Err(_) => bcrypt::DEFAULT_COST,
        };

        let seed_data = match env::var("SEED_DATA") {
            Ok(raw) => parse_flag("SEED_DATA", &raw)?,
            Err(_) => true,
        };

        Ok(Self {
            db_url,
            env,
            bind_addr,
            bcrypt_cost,
            seed_data,
        })
    }
}

fn parse_cost(raw: &str) -> Result<u32, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        name: "BCRYPT_COST",
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let cost: u32 = raw.trim().parse().map_err(|_| invalid("not an integer"))?;
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(invalid("must be between 4 and 31"));
    }
    Ok(cost)
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
