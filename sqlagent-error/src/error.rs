//! The main Error type for sqlagent

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all sqlagent operations.
///
/// Carries what happened (`kind`), whether a retry could help (`status`),
/// where it happened (`operation` plus key/value `context`) and the wrapped
/// underlying error, if any.
///
/// # Example
///
/// ```rust
/// use sqlagent_error::{Error, ErrorKind};
///
/// let err = Error::new(ErrorKind::QueryFailed, "no such column: Nmae")
///     .with_operation("database::run")
///     .with_context("query", "SELECT Nmae FROM Artist");
///
/// assert_eq!(err.kind(), ErrorKind::QueryFailed);
/// assert!(!err.is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the operation that caused this error.
    ///
    /// An already-set operation is pushed to context as "called" so the
    /// call chain survives.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// =============================================================================
// Display - compact, single-line format for logs and the session error line
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn database_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatabaseUnavailable, message)
    }

    /// Create a QueryFailed error, keeping the offending statement as context
    pub fn query_failed(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueryFailed, reason).with_context("query", query)
    }

    pub fn table_not_found(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(ErrorKind::TableNotFound, format!("table '{}' not found", table))
            .with_context("table", table)
    }

    pub fn prompt_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PromptUnavailable, message)
    }

    pub fn template_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TemplateInvalid, message)
    }

    /// `valid` lists the tool names the model may pick from instead
    pub fn tool_unknown(tool: impl Into<String>, valid: &[&str]) -> Self {
        let tool = tool.into();
        Self::new(
            ErrorKind::ToolUnknown,
            format!("{} is not a valid tool, try one of [{}].", tool, valid.join(", ")),
        )
        .with_context("tool", tool)
    }

    pub fn step_limit_exceeded(limit: usize) -> Self {
        Self::new(
            ErrorKind::StepLimitExceeded,
            format!("agent did not finish within {} steps", limit),
        )
        .with_context("max_steps", limit.to_string())
    }

    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    pub fn network_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkFailed, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::TableNotFound, "table 'x' not found");
        assert_eq!(err.kind(), ErrorKind::TableNotFound);
        assert_eq!(err.message(), "table 'x' not found");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_tool_unknown() {
        let err = Error::tool_unknown("drop_table", &["sql_db_query", "sql_db_schema"]);
        assert_eq!(err.kind(), ErrorKind::ToolUnknown);
        assert_eq!(
            err.message(),
            "drop_table is not a valid tool, try one of [sql_db_query, sql_db_schema]."
        );
        assert_eq!(err.context()[0], ("tool", "drop_table".to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::database_unavailable("HTTP 404")
            .with_operation("database::fetch_script")
            .with_operation("database::provision");

        assert_eq!(err.operation(), "database::provision");
        assert_eq!(err.context()[0], ("called", "database::fetch_script".to_string()));
    }

    #[test]
    fn test_default_status_follows_kind() {
        assert!(Error::network_failed("connection reset").is_retryable());
        assert!(!Error::template_invalid("missing variable").is_retryable());

        let err = Error::inference_failed("upstream 503").persist();
        assert_eq!(err.status(), ErrorStatus::Persistent);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_display_is_single_line() {
        let err = Error::query_failed("SELECT * FROM nope", "no such table: nope")
            .with_operation("database::run");

        let display = err.to_string();
        assert!(!display.contains('\n'));
        assert!(display.starts_with("QueryFailed (permanent) at database::run"));
        assert!(display.contains("query: SELECT * FROM nope"));
        assert!(display.ends_with("=> no such table: nope"));
    }

    #[test]
    fn test_display_without_operation() {
        let err = Error::unexpected("boom");
        assert_eq!(err.to_string(), "Unexpected (permanent) => boom");
    }

    #[test]
    fn test_step_limit_context() {
        let err = Error::step_limit_exceeded(25);
        assert_eq!(err.kind(), ErrorKind::StepLimitExceeded);
        assert_eq!(err.context()[0], ("max_steps", "25".to_string()));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "example.db");
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(err.source_ref().is_some());
    }
}
