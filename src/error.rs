//! Error types for the command manager.
//!
//! Every failure raised while opening a connection, configuring a command,
//! executing it, converting its result or projecting a cursor surfaces as a
//! [`CommandError`]. The executor never swallows or rewrites these errors.

use thiserror::Error;

/// Main error type for command execution.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// A returned value could not be converted to the requested type.
    #[error("Cast error: cannot convert {found} to {expected}")]
    Cast {
        expected: &'static str,
        found: String,
    },

    /// A non-query command finished without populating its return value.
    #[error("Command '{command}' did not populate a return value")]
    MissingReturnValue { command: String },

    /// The driver does not support the requested command shape.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised by the sqlx driver, passed through untouched.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Internal errors (runtime construction, unexpected states, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a cast error for a value that does not fit `expected`.
    pub fn cast(expected: &'static str, found: impl Into<String>) -> Self {
        Self::Cast {
            expected,
            found: found.into(),
        }
    }

    /// Creates an unsupported-operation error with the given message.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Cast { .. } => "Cast Error",
            Self::MissingReturnValue { .. } => "Return Value Error",
            Self::Unsupported(_) => "Unsupported Operation",
            Self::Config(_) => "Configuration Error",
            Self::Database(_) => "Database Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using CommandError.
pub type Result<T> = std::result::Result<T, CommandError>;
