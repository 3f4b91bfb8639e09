//! Error types for SIEVE operations

use thiserror::Error;

/// Errors raised by a search client while executing a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Query failed on index {index}: {reason}")]
    QueryFailed { index: String, reason: String },

    #[error("Serialization failed for {entity_type}: {reason}")]
    Serialization { entity_type: String, reason: String },

    #[error("Search backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Search index lock poisoned")]
    LockPoisoned,
}

/// Errors raised by a filter provider while resolving an ACL filter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("No ACL filter registered for {entity_type}")]
    NotRegistered { entity_type: String },

    #[error("ACL filter resolution failed for {entity_type}: {reason}")]
    ResolutionFailed { entity_type: String, reason: String },

    #[error("Filter registry lock poisoned")]
    LockPoisoned,
}

/// Argument validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid argument '{parameter}': {reason}")]
    InvalidArgument { parameter: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all SIEVE errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SieveError {
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl SieveError {
    /// Shorthand for a [`ValidationError::InvalidArgument`].
    pub fn invalid_argument(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        SieveError::Validation(ValidationError::InvalidArgument {
            parameter: parameter.into(),
            reason: reason.into(),
        })
    }

    /// Whether this error was raised by local argument validation.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            SieveError::Validation(ValidationError::InvalidArgument { .. })
        )
    }
}

/// Result type alias for SIEVE operations.
pub type SieveResult<T> = Result<T, SieveError>;

// =============================================================================
// TESTS
// =============================================================================
