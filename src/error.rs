//! Error types for connection configuration resolution.
//!
//! Most absent values are not errors: they resolve to `None` or an empty
//! vector through their fallback chain. The variants below are the cases
//! that abort resolution of a whole [`ConnectionSpec`].
//!
//! [`ConnectionSpec`]: crate::source::ConnectionSpec

use thiserror::Error;

/// Result type alias for resolution operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for connection configuration resolution.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Plugin Option Errors
    // ========================================================================
    /// A plugin option could not be resolved and no fallback is permitted.
    #[error("Option '{option}' is not available from plugin '{plugin}': {message}")]
    FatalConfiguration {
        /// Transport name of the connection plugin
        plugin: String,
        /// Option name
        option: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Interpreter Errors
    // ========================================================================
    /// Interpreter discovery raised an error.
    #[error("Discovery of '{interpreter}' interpreter (mode '{mode}') failed: {source}")]
    Discovery {
        /// Interpreter family name
        interpreter: String,
        /// Discovery mode token
        mode: String,
        /// Source error
        #[source]
        source: BoxError,
    },

    /// Interpreter template could not be expanded.
    #[error("Template rendering failed for '{template}': {message}")]
    Template {
        /// Template source
        template: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Value Errors
    // ========================================================================
    /// Verbosity was set to something that is not an integer.
    #[error("Verbosity must be an integer, got '{value}'")]
    MalformedVerbosity {
        /// Offending value
        value: String,
    },

    /// A variable could not be coerced to the type its accessor returns.
    #[error("Invalid value for '{name}': {message}")]
    InvalidValue {
        /// Variable or option name
        name: String,
        /// Error message
        message: String,
    },

    /// A shell-syntax string could not be split into arguments.
    #[error("Cannot split '{input}' into arguments: {message}")]
    Argv {
        /// Input string
        input: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Defaults could not be loaded, or an unknown setting was requested.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an invalid value error.
    pub fn invalid_value(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidValue {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a fatal configuration error for a plugin option.
    pub fn fatal_option(
        plugin: impl Into<String>,
        option: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::FatalConfiguration {
            plugin: plugin.into(),
            option: option.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::FatalConfiguration { .. } => 2,
            Error::Discovery { .. } => 3,
            Error::MalformedVerbosity { .. }
            | Error::InvalidValue { .. }
            | Error::Argv { .. }
            | Error::Template { .. } => 4,
            Error::Config(_) => 5,
        }
    }
}
