//! Configuration module for the Lingopath backend.

use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum connections held by the database pool
    pub database_pool_size: u32,
    /// Address to bind the server to
    pub bind_address: String,
    /// Prefix prepended to the `/api/v1` route tree. Empty mounts at the root.
    pub api_v1_prefix: String,
    /// Fallback adaptive-testing parameters for templates whose config rows
    /// omit them
    pub assessment: AssessmentDefaults,
}

/// Defaults for the adaptive engine, overridable via `ASSESSMENT_DEFAULT_*`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssessmentDefaults {
    pub min_questions: i32,
    pub max_questions: i32,
    pub standard_error: f64,
    pub time_limit_minutes: i64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env_var("DATABASE_URL")?,
            database_pool_size: parse_var("DATABASE_POOL_SIZE", 10)?,
            bind_address: env_var_or("BIND_ADDRESS", "0.0.0.0:8080"),
            api_v1_prefix: env_var_or("API_V1_PREFIX", ""),
            assessment: AssessmentDefaults {
                min_questions: parse_var("ASSESSMENT_DEFAULT_MIN_QUESTIONS", 5)?,
                max_questions: parse_var("ASSESSMENT_DEFAULT_MAX_QUESTIONS", 25)?,
                standard_error: parse_var("ASSESSMENT_DEFAULT_STANDARD_ERROR", 0.3)?,
                time_limit_minutes: parse_var("ASSESSMENT_DEFAULT_TIME_LIMIT_MINUTES", 120)?,
            },
        })
    }
}

fn env_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_uses_default() {
        let val = env_var_or("NON_EXISTENT_VAR_12345", "default_value");
        assert_eq!(val, "default_value");
    }

    #[test]
    fn test_parse_var_uses_default_when_unset() {
        let val: i32 = parse_var("NON_EXISTENT_VAR_67890", 25).unwrap();
        assert_eq!(val, 25);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        unsafe { env::set_var("LINGOPATH_TEST_BAD_INT", "not-a-number") };
        let result: Result<i32, _> = parse_var("LINGOPATH_TEST_BAD_INT", 0);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_, _))));
        unsafe { env::remove_var("LINGOPATH_TEST_BAD_INT") };
    }
}
