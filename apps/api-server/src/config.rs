//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use domain::CodePolicy;
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Sqlite
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (default: ./data/shortlinks.db)
    pub db_path: PathBuf,
    /// Log format
    pub log_format: LogFormat,
    /// Base for generated short URLs; derived from the Host header when unset
    pub shortlink_domain: Option<String>,
    /// Code generation and custom code rules
    pub code_policy: CodePolicy,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port
        let port = parse_or("PORT", var("PORT"), 3001)?;

        // CORS allow origin
        let cors_origin_str = var("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let storage_provider =
            StorageProvider::from_str(&var("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into()));

        // DB path (for sqlite)
        let db_path = var("DB_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/shortlinks.db"));

        // Log format
        let log_format = LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        // Shortlink domain
        let shortlink_domain = var("SHORTLINK_DOMAIN").filter(|s| !s.is_empty());

        // Code policy
        let defaults = CodePolicy::default();
        let code_policy = CodePolicy {
            length: parse_or("CODE_LENGTH", var("CODE_LENGTH"), defaults.length)?,
            min_length: parse_or("CODE_MIN_LENGTH", var("CODE_MIN_LENGTH"), defaults.min_length)?,
            max_length: parse_or("CODE_MAX_LENGTH", var("CODE_MAX_LENGTH"), defaults.max_length)?,
            max_attempts: parse_or(
                "CODE_MAX_ATTEMPTS",
                var("CODE_MAX_ATTEMPTS"),
                defaults.max_attempts,
            )?,
        };
        code_policy.check().map_err(|message| ConfigError {
            field: "CODE_*",
            message,
        })?;

        Ok(Self {
            port,
            cors_allow_origin,
            storage_provider,
            db_path,
            log_format,
            shortlink_domain,
            code_policy,
        })
    }

    /// Log warnings about settings that lose data or look unintended.
    pub fn warn_if_unusual(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: links are lost on restart.");
        }
        if self.code_policy.length < 5 {
            tracing::warn!(
                length = self.code_policy.length,
                "CODE_LENGTH is short; generated codes will collide often."
            );
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    field: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match raw.filter(|s| !s.trim().is_empty()) {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|e| ConfigError {
            field,
            message: format!("Invalid value '{}': {}", s, e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn storage_provider_parsing() {
        assert_eq!(StorageProvider::from_str("memory"), StorageProvider::Memory);
        assert_eq!(StorageProvider::from_str("MEMORY"), StorageProvider::Memory);
        assert_eq!(StorageProvider::from_str("sqlite"), StorageProvider::Sqlite);
        assert_eq!(StorageProvider::from_str("anything"), StorageProvider::Sqlite);
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("anything"), LogFormat::Pretty);
    }

    #[test]
    fn defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.storage_provider, StorageProvider::Sqlite);
        assert_eq!(cfg.db_path, PathBuf::from("./data/shortlinks.db"));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.shortlink_domain, None);
        assert_eq!(cfg.code_policy, CodePolicy::default());
    }

    #[test]
    fn overrides() {
        let cfg = load(&[
            ("PORT", "8080"),
            ("STORAGE_PROVIDER", "memory"),
            ("SHORTLINK_DOMAIN", "https://sho.rt"),
            ("CODE_LENGTH", "8"),
            ("CODE_MAX_ATTEMPTS", "10"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.storage_provider, StorageProvider::Memory);
        assert_eq!(cfg.shortlink_domain.as_deref(), Some("https://sho.rt"));
        assert_eq!(cfg.code_policy.length, 8);
        assert_eq!(cfg.code_policy.max_attempts, 10);
    }

    #[test]
    fn rejects_bad_numbers_and_policies() {
        let err = load(&[("PORT", "http")]).unwrap_err();
        assert_eq!(err.field, "PORT");
        let err = load(&[("CODE_MIN_LENGTH", "30")]).unwrap_err();
        assert_eq!(err.field, "CODE_*");
        let err = load(&[("CODE_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert_eq!(err.field, "CODE_*");
    }
}
