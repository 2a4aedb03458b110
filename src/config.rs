//! Environment-based configuration.
//!
//! Loaded once at startup (after `dotenvy` has populated the environment).
//! Every value has a development default; the JWT secret warns when the
//! default is in use.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

const DEFAULT_JWT_SECRET: &str = "guia-local-dev-secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub upload_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl_secs: u64,
}

impl Config {
    pub fn load() -> Self {
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set, using development default");
            DEFAULT_JWT_SECRET.to_string()
        });

        Self {
            port: load_or("PORT", 5000),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "guia_local_data".to_string()),
            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| "public/uploads".to_string()),
            ),
            jwt_secret,
            // 30 days, matching the original token lifetime
            jwt_ttl_secs: load_or("JWT_TTL_SECS", 30 * 24 * 3600),
        }
    }
}

fn load_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid {key} value {raw:?}, using default {default}");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // Only assert keys this test does not share with the environment
        let config = Config::load();
        assert!(config.port > 0);
        assert!(config.jwt_ttl_secs > 0);
        assert!(!config.jwt_secret.is_empty());
    }

    #[test]
    fn test_load_or_parses_and_falls_back() {
        std::env::set_var("GUIA_TEST_NUM", "42");
        assert_eq!(load_or::<u16>("GUIA_TEST_NUM", 7), 42);
        std::env::set_var("GUIA_TEST_NUM", "not-a-number");
        assert_eq!(load_or::<u16>("GUIA_TEST_NUM", 7), 7);
        std::env::remove_var("GUIA_TEST_NUM");
        assert_eq!(load_or::<u16>("GUIA_TEST_NUM", 7), 7);
    }
}
