use thiserror::Error;

/// Errors raised by the fusion, scoring and metrics engines.
///
/// Degenerate inputs (empty lists, empty judgments) are never errors; they
/// resolve to zero or empty results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl EvalError {
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput(reason.into())
    }

    /// Configuration errors abort a whole call, including a batch run.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { .. } => "invalid_configuration",
            Self::MalformedInput(_) => "malformed_input",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
