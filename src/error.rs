//! Structured error handling
//!
//! Provides a unified error type with:
//! - Error codes for programmatic handling
//! - Structured error responses (JSON-friendly)
//! - Context preservation through error chains
//!
//! # Error Categories
//!
//! - `ParseError` - Syntax errors in goal and context formulas
//! - `TypeMismatch` - Precondition failures against the type system
//! - `ReasoningError` - Strategy and proof construction failures
//! - `SolverError` - SMT delegation failures
//! - `ValidationError` - Input validation failures
//! - `ConfigError` - Configuration issues
//! - `InternalError` - Invariant violations
//!
//! # Example
//!
//! ```rust,ignore
//! use entail::error::{InferError, ErrorCode};
//!
//! fn check_goal(goal: &str) -> Result<(), InferError> {
//!     if goal.is_empty() {
//!         return Err(InferError::empty_input("goal")
//!             .with_hint("Pass a formula such as 'P(a) -> Q(a)'"));
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Error Codes
// ============================================================================

/// Unique error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Parse errors (1xxx)
    /// Generic parse error
    ParseError = 1000,
    /// Unexpected end of input
    UnexpectedEof = 1001,
    /// Malformed formula structure
    InvalidFormula = 1002,

    // Type errors (2xxx)
    /// Generic type error
    TypeError = 2000,
    /// Two terms have incompatible types
    TypeMismatch = 2001,
    /// Symbol has no resolved type
    UnknownType = 2002,
    /// Wrong number of arguments for a symbol
    ArityMismatch = 2003,

    // Reasoning errors (3xxx)
    /// Generic reasoning error
    ReasoningError = 3000,
    /// Proof reconstruction from derivation records failed
    ProofReconstructionFailed = 3001,
    /// No registered strategy can handle the goal shape
    NoApplicableStrategy = 3002,
    /// Strategy name not registered with the coordinator
    UnknownStrategy = 3003,
    /// Worker thread failed or panicked
    WorkerFailed = 3004,

    // Solver errors (4xxx)
    /// Generic SMT backend error
    SolverError = 4000,
    /// Backend process or library unavailable
    SolverUnavailable = 4001,
    /// Backend returned output the translation layer cannot read
    SolverProtocolError = 4002,

    // Validation errors (5xxx)
    /// Generic validation error
    ValidationError = 5000,
    /// Empty input
    EmptyInput = 5001,
    /// Input too large
    InputTooLarge = 5002,
    /// Invalid value
    InvalidValue = 5003,

    // Config errors (7xxx)
    /// Generic config error
    ConfigError = 7000,
    /// Config file not found
    ConfigNotFound = 7001,
    /// Invalid config syntax
    InvalidConfigSyntax = 7002,
    /// Invalid config value
    InvalidConfigValue = 7003,

    // Internal errors (9xxx)
    /// Internal error
    InternalError = 9000,
    /// Unexpected state
    UnexpectedState = 9002,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a short description of the error code
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::UnexpectedEof => "Unexpected end of input",
            ErrorCode::InvalidFormula => "Malformed formula",

            ErrorCode::TypeError => "Type error",
            ErrorCode::TypeMismatch => "Incompatible types",
            ErrorCode::UnknownType => "Unknown type",
            ErrorCode::ArityMismatch => "Wrong number of arguments",

            ErrorCode::ReasoningError => "Reasoning error",
            ErrorCode::ProofReconstructionFailed => "Proof reconstruction failed",
            ErrorCode::NoApplicableStrategy => "No applicable strategy",
            ErrorCode::UnknownStrategy => "Unknown strategy",
            ErrorCode::WorkerFailed => "Worker thread failed",

            ErrorCode::SolverError => "Solver error",
            ErrorCode::SolverUnavailable => "Solver unavailable",
            ErrorCode::SolverProtocolError => "Solver protocol error",

            ErrorCode::ValidationError => "Validation error",
            ErrorCode::EmptyInput => "Empty input",
            ErrorCode::InputTooLarge => "Input too large",
            ErrorCode::InvalidValue => "Invalid value",

            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::ConfigNotFound => "Configuration file not found",
            ErrorCode::InvalidConfigSyntax => "Invalid configuration syntax",
            ErrorCode::InvalidConfigValue => "Invalid configuration value",

            ErrorCode::InternalError => "Internal error",
            ErrorCode::UnexpectedState => "Unexpected state",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Error Context
// ============================================================================

/// Additional context information for an error
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Key-value pairs of context information
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, String>,
    /// Source location (file:line)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Stack of error causes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the context
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add a cause to the error chain
    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }
}

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type of the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferError {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    /// Hint for resolving the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl InferError {
    /// Create a new error with a code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    // ========================================================================
    // Factory methods for common error types
    // ========================================================================

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// Create a type mismatch error
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TypeMismatch, message)
    }

    /// Create a reasoning error
    pub fn reasoning(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ReasoningError, message)
    }

    /// Create an unknown strategy error
    pub fn unknown_strategy(name: &str) -> Self {
        Self::new(
            ErrorCode::UnknownStrategy,
            format!("No strategy registered under '{}'", name),
        )
    }

    /// Create a solver error
    pub fn solver(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SolverError, message)
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create an empty input error
    pub fn empty_input(field: &str) -> Self {
        Self::new(ErrorCode::EmptyInput, format!("{} cannot be empty", field))
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// Set the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::new);
        ctx.fields.insert(key.into(), value.into());
        self
    }

    /// Add a cause to the error chain
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::new);
        ctx.causes.push(cause.into());
        self
    }

    /// Add a hint for resolving the error
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":"INTERNAL_ERROR","message":"{}"}}"#, self.message)
        })
    }
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)?;

        if let Some(ref ctx) = self.context {
            if let Some(ref loc) = ctx.location {
                write!(f, " at {}", loc)?;
            }
            if !ctx.causes.is_empty() {
                write!(f, "\nCaused by:")?;
                for cause in &ctx.causes {
                    write!(f, "\n  - {}", cause)?;
                }
            }
        }

        if let Some(ref hint) = self.hint {
            write!(f, "\nHint: {}", hint)?;
        }

        Ok(())
    }
}

impl std::error::Error for InferError {}

impl From<std::io::Error> for InferError {
    fn from(err: std::io::Error) -> Self {
        InferError::internal(format!("I/O error: {}", err))
    }
}

impl From<toml::de::Error> for InferError {
    fn from(err: toml::de::Error) -> Self {
        InferError::new(ErrorCode::InvalidConfigSyntax, err.to_string())
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, InferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique_numbers() {
        assert_eq!(ErrorCode::ParseError.code(), 1000);
        assert_eq!(ErrorCode::TypeMismatch.code(), 2001);
        assert_eq!(ErrorCode::UnknownStrategy.code(), 3003);
        assert_eq!(ErrorCode::InternalError.code(), 9000);
    }

    #[test]
    fn test_factory_and_builder() {
        let err = InferError::unknown_strategy("tableau")
            .with_context("goal", "P(a)")
            .with_hint("Register the strategy before dispatch");
        assert_eq!(err.code, ErrorCode::UnknownStrategy);
        assert!(err.context.unwrap().fields.contains_key("goal"));
        assert!(err.hint.is_some());
    }

    #[test]
    fn test_display_includes_code_and_causes() {
        let err = InferError::reasoning("saturation failed").with_cause("clause limit hit");
        let shown = format!("{}", err);
        assert!(shown.contains("[3000]"));
        assert!(shown.contains("clause limit hit"));
    }

    #[test]
    fn test_json_round_trip() {
        let err = InferError::parse("bad token");
        let json = err.to_json();
        let back: InferError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, ErrorCode::ParseError);
    }
}
