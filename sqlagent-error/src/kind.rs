//! Error kinds for sqlagent operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to react, e.g. the session
/// loop renders every kind the same way but start-up aborts on any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    // =========================================================================
    // Database errors
    // =========================================================================
    /// The database could not be provisioned or opened
    DatabaseUnavailable,

    /// A SQL statement failed to prepare or execute
    QueryFailed,

    /// A requested table does not exist
    TableNotFound,

    // =========================================================================
    // Prompt errors
    // =========================================================================
    /// The prompt template could not be fetched
    PromptUnavailable,

    /// The prompt template is malformed or a variable is missing
    TemplateInvalid,

    // =========================================================================
    // Agent/tool errors
    // =========================================================================
    /// The model asked for a tool that does not exist
    ToolUnknown,

    /// The agent took more supersteps than allowed
    StepLimitExceeded,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Provider not available or rejected the credentials
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Serialization/deserialization failed
    SerializationFailed,

    /// Invalid argument passed to function
    InvalidArgument,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            // Database
            ErrorKind::DatabaseUnavailable => "DatabaseUnavailable",
            ErrorKind::QueryFailed => "QueryFailed",
            ErrorKind::TableNotFound => "TableNotFound",

            // Prompt
            ErrorKind::PromptUnavailable => "PromptUnavailable",
            ErrorKind::TemplateInvalid => "TemplateInvalid",

            // Agent/tool
            ErrorKind::ToolUnknown => "ToolUnknown",
            ErrorKind::StepLimitExceeded => "StepLimitExceeded",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",

            // Parse
            ErrorKind::SerializationFailed => "SerializationFailed",
            ErrorKind::InvalidArgument => "InvalidArgument",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
