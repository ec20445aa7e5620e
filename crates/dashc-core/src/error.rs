//! Error types for the dashc pipeline
//!
//! All fallible operations return `Result<T, Error>`. The first four variants
//! are the author-facing taxonomy; everything inside `compile` is converted
//! into a failed artifact before it reaches the caller.

use thiserror::Error;

/// dashc error types
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed markup or script syntax (message carries `line:column`)
    #[error("Parse error: {0}")]
    Parse(String),

    /// One or more security violations, reported together
    #[error("Security violation: {}", .0.join("; "))]
    Security(Vec<String>),

    /// The code generator rejected validated input
    #[error("Compile error: {0}")]
    Compile(String),

    /// The sandbox could not instantiate generated code
    #[error("Runtime load error: {0}")]
    RuntimeLoad(String),

    /// Invalid configuration file or value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Data-source collaborator failure
    #[error("Data source error: {0}")]
    DataSource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Taxonomy name, stable across releases
    pub fn category(&self) -> &'static str {
        match self {
            Error::Parse(_) => "ParseError",
            Error::Security(_) => "SecurityViolation",
            Error::Compile(_) => "CompileError",
            Error::RuntimeLoad(_) => "RuntimeLoadError",
            Error::Config(_) => "ConfigError",
            Error::Storage(_) => "StorageError",
            Error::DataSource(_) => "DataSourceError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
        }
    }

    /// Message as shown to authors, without the category prefix
    pub fn author_message(&self) -> String {
        match self {
            Error::Parse(msg)
            | Error::Compile(msg)
            | Error::RuntimeLoad(msg)
            | Error::Config(msg)
            | Error::Storage(msg)
            | Error::DataSource(msg) => msg.clone(),
            Error::Security(violations) => violations.join("\n"),
            Error::Io(e) => e.to_string(),
            Error::Json(e) => e.to_string(),
        }
    }
}

/// Result type alias for dashc operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_display_joins_violations() {
        let err = Error::Security(vec!["first".into(), "second".into()]);
        assert_eq!(err.to_string(), "Security violation: first; second");
        assert_eq!(err.author_message(), "first\nsecond");
        assert_eq!(err.category(), "SecurityViolation");
    }

    #[test]
    fn test_parse_error_category() {
        let err = Error::Parse("Unexpected '<' at 1:4".into());
        assert_eq!(err.category(), "ParseError");
        assert!(err.to_string().starts_with("Parse error:"));
    }
}
