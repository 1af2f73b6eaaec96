//! Configuration validation.
//!
//! # Responsibilities
//! - Coerce raw environment strings into typed fields
//! - Validate enum-like fields against their closed sets
//! - Reject absent mandatory fields
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation runs before any socket is opened

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A single field-level problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{key} is required")]
    Missing { key: String },

    #[error("{key} must not be empty")]
    Empty { key: String },

    #[error("{key}={value:?} is invalid, expected {expected}")]
    Invalid {
        key: String,
        value: String,
        expected: String,
    },
}

impl ValidationError {
    pub fn invalid(key: &str, value: &str, expected: impl Into<String>) -> Self {
        ValidationError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Name of the offending key.
    pub fn key(&self) -> &str {
        match self {
            ValidationError::Missing { key }
            | ValidationError::Empty { key }
            | ValidationError::Invalid { key, .. } => key,
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("invalid configuration: {}", Joined(.0))]
    Validation(Vec<ValidationError>),
}

impl ConfigError {
    /// Field errors carried by a validation failure.
    pub fn errors(&self) -> &[ValidationError] {
        match self {
            ConfigError::Validation(errors) => errors,
            ConfigError::EnvFile(_) => &[],
        }
    }

    /// True if `key` is among the reported field errors.
    pub fn mentions(&self, key: &str) -> bool {
        self.errors().iter().any(|e| e.key() == key)
    }
}

struct Joined<'a>(&'a [ValidationError]);

impl fmt::Display for Joined<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

/// Typed reader over an environment snapshot that accumulates errors.
pub(crate) struct FieldReader<'a> {
    vars: &'a HashMap<String, String>,
    errors: Vec<ValidationError>,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(vars: &'a HashMap<String, String>) -> Self {
        Self {
            vars,
            errors: Vec::new(),
        }
    }

    fn raw(&self, key: &str) -> Option<&'a str> {
        self.vars.get(key).map(String::as_str)
    }

    /// String with a default.
    pub(crate) fn string_or(&mut self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or(default).to_string()
    }

    /// Mandatory, non-empty string.
    pub(crate) fn required(&mut self, key: &str) -> Option<String> {
        match self.raw(key) {
            None => {
                self.errors.push(ValidationError::Missing { key: key.to_string() });
                None
            }
            Some(v) if v.trim().is_empty() => {
                self.errors.push(ValidationError::Empty { key: key.to_string() });
                None
            }
            Some(v) => Some(v.to_string()),
        }
    }

    /// Mandatory connection string that must parse as a URL.
    pub(crate) fn required_url(&mut self, key: &str) -> Option<String> {
        let value = self.required(key)?;
        match url::Url::parse(&value) {
            Ok(_) => Some(value),
            Err(e) => {
                self.errors
                    .push(ValidationError::invalid(key, &value, format!("a URL ({e})")));
                None
            }
        }
    }

    /// Numeric field, defaulted when absent.
    pub(crate) fn number_or<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr + Copy,
    {
        match self.raw(key) {
            None => default,
            Some(v) => match v.trim().parse::<T>() {
                Ok(n) => n,
                Err(_) => {
                    self.errors
                        .push(ValidationError::invalid(key, v, "a non-negative integer"));
                    default
                }
            },
        }
    }

    /// Boolean field, defaulted when absent.
    pub(crate) fn bool_or(&mut self, key: &str, default: bool) -> bool {
        match self.raw(key) {
            None => default,
            Some(v) => match parse_bool(v) {
                Some(b) => b,
                None => {
                    self.errors.push(ValidationError::invalid(key, v, "a boolean"));
                    default
                }
            },
        }
    }

    /// Field parsed with its own `FromStr` validation, defaulted when absent.
    pub(crate) fn parsed_or<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr<Err = ValidationError>,
    {
        match self.raw(key) {
            None => default,
            Some(v) => match v.parse::<T>() {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.errors.push(e);
                    default
                }
            },
        }
    }

    /// Field with arbitrary validation, defaulted when absent.
    pub(crate) fn with_or<T>(
        &mut self,
        key: &str,
        default: impl FnOnce() -> Result<T, ValidationError>,
        parse: impl FnOnce(&str) -> Result<T, ValidationError>,
    ) -> Option<T> {
        let result = match self.raw(key) {
            None => default(),
            Some(v) => parse(v),
        };
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    pub(crate) fn finish(self) -> Result<(), ConfigError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(self.errors))
        }
    }
}

/// Lenient boolean parsing (`true/false/1/0/yes/no/on/off`).
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_reader_collects_every_error() {
        let v = vars(&[("PORT", "eighty"), ("DEBUG", "perhaps")]);
        let mut reader = FieldReader::new(&v);
        let _ = reader.number_or::<u16>("PORT", 8000);
        let _ = reader.bool_or("DEBUG", false);
        let _ = reader.required("SECRET_KEY");

        let err = reader.finish().unwrap_err();
        assert_eq!(err.errors().len(), 3);
        assert!(err.mentions("PORT"));
        assert!(err.mentions("DEBUG"));
        assert!(err.mentions("SECRET_KEY"));
    }

    #[test]
    fn test_blank_required_is_empty_error() {
        let v = vars(&[("SECRET_KEY", "   ")]);
        let mut reader = FieldReader::new(&v);
        assert!(reader.required("SECRET_KEY").is_none());
        let err = reader.finish().unwrap_err();
        assert!(matches!(err.errors()[0], ValidationError::Empty { .. }));
    }

    #[test]
    fn test_required_url_rejects_garbage() {
        let v = vars(&[("DATABASE_URL", "not a url")]);
        let mut reader = FieldReader::new(&v);
        assert!(reader.required_url("DATABASE_URL").is_none());
        assert!(reader.finish().unwrap_err().mentions("DATABASE_URL"));
    }

    #[test]
    fn test_error_display_joins_fields() {
        let err = ConfigError::Validation(vec![
            ValidationError::Missing { key: "SECRET_KEY".into() },
            ValidationError::Missing { key: "DATABASE_URL".into() },
        ]);
        assert_eq!(
            err.to_string(),
            "invalid configuration: SECRET_KEY is required, DATABASE_URL is required"
        );
    }
}
