//! Configuration schema definitions.
//!
//! This module defines the validated, immutable settings record the service
//! runs with. Values are produced by [`ConfigLoader`](super::loader::ConfigLoader)
//! and shared via `Arc` with every subsystem.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::validation::ValidationError;

/// Prefix under which the business router is mounted.
pub const API_V1_PREFIX: &str = "/api/v1";

/// Root configuration for the service.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Service identity.
    pub project_name: String,
    pub project_description: String,
    pub version: String,

    /// Runtime mode.
    pub environment: Environment,
    pub debug: bool,

    /// Network binding.
    pub host: String,
    pub port: u16,

    /// Token signing material.
    pub secret_key: Secret,
    pub access_token_expire_minutes: u64,
    pub refresh_token_expire_days: u64,
    pub algorithm: String,

    /// Origins and hosts this service answers for.
    pub allowed_hosts: AllowList,

    /// Storage.
    pub database_url: String,
    pub database_pool_size: u32,
    pub database_max_overflow: u32,

    /// Cache.
    pub redis_url: String,
    pub redis_pool_size: u32,

    /// Observability.
    pub log_level: LogLevel,
    pub enable_metrics: bool,
    pub metrics_port: u16,

    /// Tuning.
    pub rate_limit_requests: u32,
    pub rate_limit_window: u64,
    pub cache_ttl: u64,
    pub cache_max_size: u64,
}

impl Settings {
    /// `HOST:PORT` as a bindable address string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address for the dedicated metrics exposition listener.
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.host, self.metrics_port)
    }

    pub fn api_prefix(&self) -> &'static str {
        API_V1_PREFIX
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Runtime mode. Matched exactly as given, no case folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub const ALLOWED: [&'static str; 3] = ["development", "staging", "production"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(ValidationError::invalid(
                "ENVIRONMENT",
                other,
                format!("one of {}", Environment::ALLOWED.join(", ")),
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging verbosity. Parsed case-insensitively, stored in upper-case form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALLOWED: [&'static str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Equivalent `tracing` filter directive.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(ValidationError::invalid(
                "LOG_LEVEL",
                s,
                format!("one of {}", LogLevel::ALLOWED.join(", ")),
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, non-empty list of trimmed origin/host patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AllowList(Vec<String>);

impl AllowList {
    /// Parse a comma-separated list, trimming each element.
    ///
    /// Elements that are empty after trimming are dropped; an input with no
    /// surviving element is rejected.
    pub fn parse_csv(key: &str, raw: &str) -> Result<Self, ValidationError> {
        Self::from_entries(key, raw.split(','))
    }

    /// Build from an already-structured sequence, keeping input order.
    pub fn from_entries<I, S>(key: &str, entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> = entries
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if items.is_empty() {
            return Err(ValidationError::Empty { key: key.to_string() });
        }
        Ok(Self(items))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the list contains the `*` wildcard.
    pub fn allows_any(&self) -> bool {
        self.0.iter().any(|s| s == "*")
    }
}

/// Secret material that never appears in logs or debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw secret value. Call sites should be limited to signing code.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(**********)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("**********")
    }
}

impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("**********")
    }
}
