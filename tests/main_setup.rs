use bookstore::{
    AppConfig,
    config::{ConfigError, DEFAULT_BIND_ADDR, Env, LOCAL_DB_URL},
};
use serial_test::serial;
use std::{env, panic};

const CONFIG_VARS: [&str; 5] = ["APP_ENV", "DATABASE_URL", "BIND_ADDR", "BCRYPT_COST", "SEED_DATA"];

// --- Setup/Teardown Utilities ---

/// Runs `test` with the given variables set (all other config variables unset),
/// then restores the original environment, even if the test panics.
fn run_with_env<T, R>(vars: &[(&str, &str)], test: T) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> = CONFIG_VARS
        .iter()
        .map(|&var| (var, env::var(var).ok()))
        .collect();

    unsafe {
        for var in CONFIG_VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    for (key, original_value) in originals {
        unsafe {
            match original_value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }

    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

// --- Tests ---

#[test]
#[serial]
fn test_local_defaults() {
    let config = run_with_env(&[], AppConfig::load).unwrap();

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.db_url, LOCAL_DB_URL);
    assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
    assert!(config.seed_data);
}

#[test]
#[serial]
fn test_production_requires_database_url() {
    let result = run_with_env(&[("APP_ENV", "production")], AppConfig::load);
    assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));
}

#[test]
#[serial]
fn test_production_with_explicit_settings() {
    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "sqlite://bookstore.db"),
            ("BIND_ADDR", "0.0.0.0:9000"),
            ("BCRYPT_COST", "10"),
            ("SEED_DATA", "false"),
        ],
        AppConfig::load,
    )
    .unwrap();

    assert_eq!(config.env, Env::Production);
    assert_eq!(config.db_url, "sqlite://bookstore.db");
    assert_eq!(config.bind_addr, "0.0.0.0:9000");
    assert_eq!(config.bcrypt_cost, 10);
    assert!(!config.seed_data);
}

#[test]
#[serial]
fn test_invalid_bcrypt_cost_is_rejected() {
    for raw in ["3", "32", "ten"] {
        let result = run_with_env(&[("BCRYPT_COST", raw)], AppConfig::load);
        assert!(
            matches!(result, Err(ConfigError::Invalid { name: "BCRYPT_COST", .. })),
            "BCRYPT_COST={raw} should be rejected"
        );
    }
}

#[test]
#[serial]
fn test_invalid_seed_flag_is_rejected() {
    let result = run_with_env(&[("SEED_DATA", "maybe")], AppConfig::load);
    assert!(matches!(result, Err(ConfigError::Invalid { name: "SEED_DATA", .. })));

    let config = run_with_env(&[("SEED_DATA", "0")], AppConfig::load).unwrap();
    assert!(!config.seed_data);
}

#[test]
fn test_default_config_is_test_friendly() {
    let config = AppConfig::default();
    assert_eq!(config.db_url, LOCAL_DB_URL);
    assert_eq!(config.bcrypt_cost, bookstore::config::MIN_BCRYPT_COST);
    assert_eq!(config.bind_addr, "127.0.0.1:0");
}
