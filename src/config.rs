//! Client options and connection targets.

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::types::{DecimalMode, TypeRegistry};

/// Default number of rows fetched or bound per round trip.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Default ceiling for character columns of unknown or huge size.
pub const DEFAULT_MAX_TEXT_SIZE: usize = 4096;

/// Default ceiling for binary columns of unknown or huge size.
pub const DEFAULT_MAX_BINARY_SIZE: usize = 8192;

pub const ENV_BATCH_SIZE: &str = "CLI_COLUMNAR_BATCH_SIZE";
pub const ENV_DECIMAL_MODE: &str = "CLI_COLUMNAR_DECIMAL_MODE";
pub const ENV_MAX_TEXT_SIZE: &str = "CLI_COLUMNAR_MAX_TEXT_SIZE";
pub const ENV_MAX_BINARY_SIZE: &str = "CLI_COLUMNAR_MAX_BINARY_SIZE";
pub const ENV_STRICT_TYPES: &str = "CLI_COLUMNAR_STRICT_TYPES";

/// Client options.
///
/// Decimal columns default to [`DecimalMode::Exact`]: values are fetched as
/// text and parsed into `rust_decimal::Decimal`, which holds up to 28
/// significant digits. Wider values fail with `TypeConversion` rather than
/// being rounded; switch to [`DecimalMode::Approximate`] to read them as
/// `f64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Rows per fetch or parameter array (default: 1024).
    pub batch_size: usize,
    /// How DECIMAL and NUMERIC columns are read (default: exact).
    pub decimal_mode: DecimalMode,
    /// Buffer ceiling for character columns, in characters.
    pub max_text_size: usize,
    /// Buffer ceiling for binary columns, in bytes.
    pub max_binary_size: usize,
    /// Refuse columns of unknown SQL type instead of reading them as text.
    pub strict_types: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            decimal_mode: DecimalMode::Exact,
            max_text_size: DEFAULT_MAX_TEXT_SIZE,
            max_binary_size: DEFAULT_MAX_BINARY_SIZE,
            strict_types: false,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bulk batch size.
    ///
    /// # Example
    ///
    /// ```
    /// use cli_columnar_rs::Options;
    ///
    /// let options = Options::new().with_batch_size(100);
    /// assert!(options.validate().is_ok());
    /// assert!(Options::new().with_batch_size(0).validate().is_err());
    /// ```
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_decimal_mode(mut self, mode: DecimalMode) -> Self {
        self.decimal_mode = mode;
        self
    }

    pub fn with_max_text_size(mut self, size: usize) -> Self {
        self.max_text_size = size;
        self
    }

    pub fn with_max_binary_size(mut self, size: usize) -> Self {
        self.max_binary_size = size;
        self
    }

    pub fn with_strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }

    /// Check that every option is usable.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidBatchSize {
                batch_size: self.batch_size,
            });
        }
        if self.max_text_size == 0 {
            return Err(Error::config("max_text_size must be at least 1"));
        }
        if self.max_binary_size == 0 {
            return Err(Error::config("max_binary_size must be at least 1"));
        }
        Ok(())
    }

    /// Type registry configured by these options.
    pub fn registry(&self) -> TypeRegistry {
        TypeRegistry::new(self.decimal_mode, self.max_text_size, self.max_binary_size)
            .with_strict(self.strict_types)
    }

    /// Defaults overridden by the `CLI_COLUMNAR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();
        if let Some(v) = lookup(ENV_BATCH_SIZE) {
            options.batch_size = parse_size(ENV_BATCH_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_DECIMAL_MODE) {
            options.decimal_mode = v.parse()?;
        }
        if let Some(v) = lookup(ENV_MAX_TEXT_SIZE) {
            options.max_text_size = parse_size(ENV_MAX_TEXT_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_BINARY_SIZE) {
            options.max_binary_size = parse_size(ENV_MAX_BINARY_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_STRICT_TYPES) {
            options.strict_types = parse_bool(ENV_STRICT_TYPES, &v)?;
        }
        options.validate()?;
        Ok(options)
    }
}

fn parse_size(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::config(format!("{}: invalid size '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::config(format!("{}: invalid boolean '{}'", key, value))),
    }
}

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// A configured data source name with optional credentials.
    Dsn {
        name: String,
        user: Option<String>,
        password: Option<String>,
    },
    /// A complete driver connection string, passed through unchanged.
    ConnectionString(String),
}

impl ConnectTarget {
    /// Target a data source name without credentials.
    pub fn dsn(name: impl Into<String>) -> Self {
        ConnectTarget::Dsn {
            name: name.into(),
            user: None,
            password: None,
        }
    }

    /// Add credentials to a `Dsn` target. Connection strings are unchanged.
    pub fn with_credentials(self, user: impl Into<String>, password: impl Into<String>) -> Self {
        match self {
            ConnectTarget::Dsn { name, .. } => ConnectTarget::Dsn {
                name,
                user: Some(user.into()),
                password: Some(password.into()),
            },
            other => other,
        }
    }

    /// Render the driver connection string.
    ///
    /// Values containing `;`, `{` or `}` are wrapped in braces.
    pub fn to_connection_string(&self) -> String {
        match self {
            ConnectTarget::ConnectionString(s) => s.clone(),
            ConnectTarget::Dsn {
                name,
                user,
                password,
            } => {
                let mut out = String::new();
                let _ = write!(out, "DSN={};", escape(name));
                if let Some(user) = user {
                    let _ = write!(out, "UID={};", escape(user));
                }
                if let Some(password) = password {
                    let _ = write!(out, "PWD={};", escape(password));
                }
                out
            }
        }
    }
}

fn escape(value: &str) -> String {
    if value.contains([';', '{', '}']) || value.trim() != value {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.batch_size, 1024);
        assert_eq!(options.decimal_mode, DecimalMode::Exact);
        assert!(!options.strict_types);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_BATCH_SIZE, "100"),
            (ENV_DECIMAL_MODE, "approximate"),
            (ENV_STRICT_TYPES, "true"),
        ]
        .into_iter()
        .collect();
        let options = Options::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.decimal_mode, DecimalMode::Approximate);
        assert!(options.strict_types);
        assert_eq!(options.max_text_size, DEFAULT_MAX_TEXT_SIZE);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = Options::from_lookup(|k| (k == ENV_BATCH_SIZE).then(|| "0".to_string()));
        assert!(matches!(err, Err(Error::InvalidBatchSize { batch_size: 0 })));
        let err = Options::from_lookup(|k| (k == ENV_DECIMAL_MODE).then(|| "fuzzy".to_string()));
        assert!(matches!(err, Err(Error::Config { .. })));
        let err = Options::from_lookup(|k| (k == ENV_MAX_TEXT_SIZE).then(|| "big".to_string()));
        assert!(matches!(err, Err(Error::Config { .. })));
    }

    #[test]
    fn test_connection_string_rendering() {
        let target = ConnectTarget::dsn("memory").with_credentials("bob", "p;w}d");
        assert_eq!(
            target.to_connection_string(),
            "DSN=memory;UID=bob;PWD={p;w}}d};"
        );
        let raw = ConnectTarget::ConnectionString("DRIVER={Memory};DATABASE=x".into());
        assert_eq!(raw.to_connection_string(), "DRIVER={Memory};DATABASE=x");
    }
}
