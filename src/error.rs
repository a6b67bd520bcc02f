//! Error types for the persona engine.
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - HTTP status mapping for the JSON surface
//! - Exit codes for the CLI

use std::fmt;

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // Datastore errors (2xx)
    DatastoreOpen = 200,
    DatastoreQuery = 201,
    DatastoreMigration = 202,

    // Validation errors (3xx)
    ConsentWithheld = 300,
    MissingField = 301,
    EmptyPersonaSet = 302,
    MalformedBody = 303,

    // Audit errors (4xx)
    AuditWrite = 400,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E201")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to the 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // Datastore errors
            300..=399 => 30, // Validation errors
            400..=499 => 40, // Audit errors
            _ => 90,         // Internal errors
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration error (load, parse, or validation)
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // Datastore Errors
    // ─────────────────────────────────────────────────────────────

    /// Failed to open or create the database
    #[error("Failed to open database '{path}': {message}")]
    DatastoreOpen { path: String, message: String },

    /// A query or statement against the datastore failed
    #[error("Datastore error: {0}")]
    Datastore(#[from] rusqlite::Error),

    /// Schema migration failed
    #[error("Schema migration failed: {0}")]
    Migration(String),

    // ─────────────────────────────────────────────────────────────
    // Validation Errors (client-caused, surfaced as 400)
    // ─────────────────────────────────────────────────────────────

    /// The profile withheld consent; evaluation may not proceed
    #[error("Consent is required for persona evaluation")]
    ConsentWithheld,

    /// A mandatory profile field is missing
    #[error("Missing mandatory field: {field}")]
    MissingField { field: String },

    /// The stats endpoint was called with an empty persona set
    #[error("persona_ids must be a non-empty array")]
    EmptyPersonaSet,

    /// Request body could not be parsed
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    // ─────────────────────────────────────────────────────────────
    // Audit Errors (caught internally, never surfaced to callers)
    // ─────────────────────────────────────────────────────────────

    /// The audit trail could not be written
    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::DatastoreOpen { .. } => ErrorCode::DatastoreOpen,
            Error::Datastore(_) => ErrorCode::DatastoreQuery,
            Error::Migration(_) => ErrorCode::DatastoreMigration,

            Error::ConsentWithheld => ErrorCode::ConsentWithheld,
            Error::MissingField { .. } => ErrorCode::MissingField,
            Error::EmptyPersonaSet => ErrorCode::EmptyPersonaSet,
            Error::MalformedBody(_) => ErrorCode::MalformedBody,

            Error::AuditWrite(_) => ErrorCode::AuditWrite,

            Error::Io(_) => ErrorCode::InternalError,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error was caused by the client request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::ConsentWithheld
                | Error::MissingField { .. }
                | Error::EmptyPersonaSet
                | Error::MalformedBody(_)
        )
    }

    /// HTTP status code for the JSON surface
    pub fn http_status(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    /// Format the error for logging
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a missing-field validation error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Error::MissingField { field: field.into() }
    }

    /// Create a datastore open error
    pub fn datastore_open(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DatastoreOpen {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
