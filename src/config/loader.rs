//! Configuration loading from the process environment.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;

use crate::config::schema::{AllowList, Environment, LogLevel, Secret, Settings};
use crate::config::validation::{ConfigError, FieldReader, ValidationError};

/// Loads [`Settings`] from a snapshot of environment variables.
///
/// The first successful [`load`](ConfigLoader::load) is cached; later calls
/// return the same `Arc` until [`reset`](ConfigLoader::reset) is called.
/// Concurrent first callers serialize on an init lock so construction runs
/// once.
#[derive(Debug)]
pub struct ConfigLoader {
    vars: HashMap<String, String>,
    cached: ArcSwapOption<Settings>,
    init_lock: Mutex<()>,
}

impl ConfigLoader {
    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Load a `.env` file into the process environment, then snapshot it.
    ///
    /// Variables already present in the environment are not overridden. A
    /// missing file is not an error.
    pub fn from_env_with_dotenv(path: &Path) -> Result<Self, ConfigError> {
        match dotenvy::from_path(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Loaded env file");
            }
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ConfigError::EnvFile(e)),
        }
        Ok(Self::from_env())
    }

    /// Build from explicit key/value pairs. Keys are matched case-insensitively.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_uppercase(), v.into()))
            .collect();
        Self {
            vars,
            cached: ArcSwapOption::empty(),
            init_lock: Mutex::new(()),
        }
    }

    /// Return the cached settings, constructing them on first use.
    pub fn load(&self) -> Result<Arc<Settings>, ConfigError> {
        if let Some(settings) = self.cached.load_full() {
            return Ok(settings);
        }

        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Another caller may have finished while we waited.
        if let Some(settings) = self.cached.load_full() {
            return Ok(settings);
        }

        let settings = Arc::new(build_settings(&self.vars)?);
        self.cached.store(Some(settings.clone()));
        Ok(settings)
    }

    /// Drop the cached settings so the next `load` rebuilds them.
    pub fn reset(&self) {
        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.cached.store(None);
    }

    /// Replace the environment snapshot and drop the cache.
    pub fn reset_with<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        *self = Self::from_vars(vars);
    }
}

/// Coerce and validate every field.
fn build_settings(vars: &HashMap<String, String>) -> Result<Settings, ConfigError> {
    let mut r = FieldReader::new(vars);

    let project_name = r.string_or("PROJECT_NAME", "service-bootstrap");
    let project_description = r.string_or("PROJECT_DESCRIPTION", "");
    let version = r.string_or("VERSION", env!("CARGO_PKG_VERSION"));
    let environment = r.parsed_or("ENVIRONMENT", Environment::Development);
    let debug = r.bool_or("DEBUG", false);
    let host = r.string_or("HOST", "0.0.0.0");
    let port = r.number_or::<u16>("PORT", 8000);

    let secret_key = r.required("SECRET_KEY");
    let access_token_expire_minutes = r.number_or::<u64>("ACCESS_TOKEN_EXPIRE_MINUTES", 30);
    let refresh_token_expire_days = r.number_or::<u64>("REFRESH_TOKEN_EXPIRE_DAYS", 7);
    let algorithm = r.string_or("ALGORITHM", "HS256");

    let allowed_hosts = r.with_or(
        "ALLOWED_HOSTS",
        || AllowList::from_entries("ALLOWED_HOSTS", ["localhost", "127.0.0.1"]),
        |raw| parse_allow_list("ALLOWED_HOSTS", raw),
    );

    let database_url = r.required_url("DATABASE_URL");
    let database_pool_size = r.number_or::<u32>("DATABASE_POOL_SIZE", 5);
    let database_max_overflow = r.number_or::<u32>("DATABASE_MAX_OVERFLOW", 10);

    let redis_url = r.required_url("REDIS_URL");
    let redis_pool_size = r.number_or::<u32>("REDIS_POOL_SIZE", 10);

    let log_level = r.parsed_or("LOG_LEVEL", LogLevel::Info);
    let enable_metrics = r.bool_or("ENABLE_METRICS", true);
    let metrics_port = r.number_or::<u16>("METRICS_PORT", 9090);

    let rate_limit_requests = r.number_or::<u32>("RATE_LIMIT_REQUESTS", 100);
    let rate_limit_window = r.number_or::<u64>("RATE_LIMIT_WINDOW", 60);
    let cache_ttl = r.number_or::<u64>("CACHE_TTL", 300);
    let cache_max_size = r.number_or::<u64>("CACHE_MAX_SIZE", 1000);

    r.finish()?;

    // finish() only succeeds when every mandatory field was read.
    let (Some(secret_key), Some(allowed_hosts), Some(database_url), Some(redis_url)) =
        (secret_key, allowed_hosts, database_url, redis_url)
    else {
        return Err(ConfigError::Validation(Vec::new()));
    };

    Ok(Settings {
        project_name,
        project_description,
        version,
        environment,
        debug,
        host,
        port,
        secret_key: Secret::new(secret_key),
        access_token_expire_minutes,
        refresh_token_expire_days,
        algorithm,
        allowed_hosts,
        database_url,
        database_pool_size,
        database_max_overflow,
        redis_url,
        redis_pool_size,
        log_level,
        enable_metrics,
        metrics_port,
        rate_limit_requests,
        rate_limit_window,
        cache_ttl,
        cache_max_size,
    })
}

/// Accept either a JSON array literal or a comma-separated string.
pub fn parse_allow_list(key: &str, raw: &str) -> Result<AllowList, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let entries: Vec<String> = serde_json::from_str(trimmed)
            .map_err(|e| ValidationError::invalid(key, raw, format!("a JSON string array ({e})")))?;
        AllowList::from_entries(key, entries)
    } else {
        AllowList::parse_csv(key, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [(&str, &str); 3] = [
        ("SECRET_KEY", "s3cr3t"),
        ("DATABASE_URL", "postgres://app@db.internal:5432/app"),
        ("REDIS_URL", "redis://cache.internal:6379/0"),
    ];

    fn loader_with(extra: &[(&str, &str)]) -> ConfigLoader {
        ConfigLoader::from_vars(BASE.iter().chain(extra.iter()).copied())
    }

    #[test]
    fn test_defaults_applied() {
        let settings = loader_with(&[]).load().unwrap();
        assert_eq!(settings.project_name, "service-bootstrap");
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.database_pool_size, 5);
        assert_eq!(settings.database_max_overflow, 10);
        assert_eq!(settings.cache_ttl, 300);
        assert!(settings.enable_metrics);
        assert_eq!(settings.allowed_hosts.as_slice(), &["localhost", "127.0.0.1"]);
        assert_eq!(settings.bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn test_missing_secret_key() {
        let loader = ConfigLoader::from_vars([
            ("DATABASE_URL", "postgres://db/app"),
            ("REDIS_URL", "redis://cache"),
        ]);
        let err = loader.load().unwrap_err();
        assert!(err.mentions("SECRET_KEY"));
    }

    #[test]
    fn test_missing_database_and_redis_reported_together() {
        let loader = ConfigLoader::from_vars([("SECRET_KEY", "x")]);
        let err = loader.load().unwrap_err();
        assert!(err.mentions("DATABASE_URL"));
        assert!(err.mentions("REDIS_URL"));
    }

    #[test]
    fn test_invalid_environment_rejected() {
        let err = loader_with(&[("ENVIRONMENT", "qa")]).load().unwrap_err();
        assert!(err.mentions("ENVIRONMENT"));
    }

    #[test]
    fn test_log_level_normalized() {
        let settings = loader_with(&[("LOG_LEVEL", "debug")]).load().unwrap();
        assert_eq!(settings.log_level.as_str(), "DEBUG");
    }

    #[test]
    fn test_allowed_hosts_csv_and_json() {
        let csv = loader_with(&[("ALLOWED_HOSTS", "api.example.com, example.com")])
            .load()
            .unwrap();
        assert_eq!(csv.allowed_hosts.as_slice(), &["api.example.com", "example.com"]);

        let json = loader_with(&[("ALLOWED_HOSTS", r#"[" a.com", "b.com "]"#)])
            .load()
            .unwrap();
        assert_eq!(json.allowed_hosts.as_slice(), &["a.com", "b.com"]);
    }

    #[test]
    fn test_malformed_number_rejected() {
        let err = loader_with(&[("DATABASE_POOL_SIZE", "-3")]).load().unwrap_err();
        assert!(err.mentions("DATABASE_POOL_SIZE"));
    }

    #[test]
    fn test_keys_case_insensitive() {
        let settings = loader_with(&[("project_name", "orders")]).load().unwrap();
        assert_eq!(settings.project_name, "orders");
    }

    #[test]
    fn test_load_is_cached_until_reset() {
        let loader = loader_with(&[]);
        let first = loader.load().unwrap();
        let second = loader.load().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        loader.reset();
        let third = loader.load().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first.port, third.port);
    }

    #[test]
    fn test_reset_with_new_input() {
        let mut loader = loader_with(&[("PORT", "8000")]);
        assert_eq!(loader.load().unwrap().port, 8000);

        loader.reset_with(BASE.iter().copied().chain([("PORT", "9000")]));
        assert_eq!(loader.load().unwrap().port, 9000);
    }

    #[test]
    fn test_concurrent_first_load_yields_one_instance() {
        let loader = Arc::new(loader_with(&[]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let loader = loader.clone();
                std::thread::spawn(move || loader.load().unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let loader = ConfigLoader::from_vars([("SECRET_KEY", "x")]);
        assert!(loader.load().is_err());
        assert!(loader.load().is_err());
    }
}
