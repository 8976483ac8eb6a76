//! Structured error hierarchy for JavaScriptCore operations.
//!
//! Preserves JavaScript exception details — stack traces, line numbers,
//! error type — so callers above this crate can build rich diagnostics
//! instead of opaque strings.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Structured error type for JavaScriptCore operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Context creation failed: {message}")]
    ContextCreation { message: String },

    #[error("Syntax error{}: {message}", format_location(file, line, column))]
    SyntaxError {
        message: String,
        file: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
    },

    #[error("{error_type}: {message}")]
    ScriptError {
        error_type: String,
        message: String,
        file: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
        stack: Option<String>,
    },

    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    #[error("Internal engine error: {operation} returned null")]
    NullPointer { operation: String },

    #[error("String encoding error: {0}")]
    StringEncoding(String),

    #[error("Property error: {0}")]
    PropertyError(String),

    #[error("Call error: {0}")]
    CallError(String),

    #[error("Resource limit: {0}")]
    ResourceLimit(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_location(file: &Option<String>, line: &Option<u32>, column: &Option<u32>) -> String {
    match (file, line, column) {
        (Some(f), Some(l), Some(c)) => format!(" at {}:{}:{}", f, l, c),
        (Some(f), Some(l), None) => format!(" at {}:{}", f, l),
        (None, Some(l), Some(c)) => format!(" at line {}:{}", l, c),
        (None, Some(l), None) => format!(" at line {}", l),
        _ => String::new(),
    }
}

impl EngineError {
    pub fn script_error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScriptError {
            error_type: error_type.into(),
            message: message.into(),
            file: None,
            line: None,
            column: None,
            stack: None,
        }
    }

    pub fn script_error_with_location(
        error_type: impl Into<String>,
        message: impl Into<String>,
        file: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
        stack: Option<String>,
    ) -> Self {
        Self::ScriptError {
            error_type: error_type.into(),
            message: message.into(),
            file,
            line,
            column,
            stack,
        }
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::SyntaxError {
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    pub fn syntax_error_with_location(
        message: impl Into<String>,
        file: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
    ) -> Self {
        Self::SyntaxError {
            message: message.into(),
            file,
            line,
            column,
        }
    }

    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn null_pointer(operation: impl Into<String>) -> Self {
        Self::NullPointer {
            operation: operation.into(),
        }
    }

    /// Whether this originated from JS execution, as opposed to a host-side
    /// precondition or encoding failure.
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::ScriptError { .. } | Self::SyntaxError { .. })
    }

    pub fn stack_trace(&self) -> Option<&str> {
        match self {
            Self::ScriptError { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<(Option<&str>, Option<u32>, Option<u32>)> {
        match self {
            Self::ScriptError {
                file, line, column, ..
            }
            | Self::SyntaxError {
                file, line, column, ..
            } => Some((file.as_deref(), *line, *column)),
            _ => None,
        }
    }

    pub fn error_type(&self) -> &str {
        match self {
            Self::ScriptError { error_type, .. } => error_type,
            Self::SyntaxError { .. } => "SyntaxError",
            Self::TypeError { .. } => "TypeError",
            Self::ContextCreation { .. } => "ContextError",
            Self::NullPointer { .. } => "InternalError",
            Self::StringEncoding(_) => "EncodingError",
            Self::PropertyError(_) => "PropertyError",
            Self::CallError(_) => "CallError",
            Self::ResourceLimit(_) => "ResourceLimitError",
            Self::JsonError(_) => "JsonError",
            Self::Internal(_) => "InternalError",
        }
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        Self::Internal(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_error_display() {
        let err = EngineError::script_error("TypeError", "undefined is not a function");
        assert_eq!(err.to_string(), "TypeError: undefined is not a function");
    }

    #[test]
    fn script_error_with_location() {
        let err = EngineError::script_error_with_location(
            "ReferenceError",
            "x is not defined",
            Some("script.js".into()),
            Some(10),
            Some(5),
            Some("at foo (script.js:10:5)".into()),
        );

        assert!(err.is_script_error());
        assert_eq!(err.stack_trace(), Some("at foo (script.js:10:5)"));
        assert_eq!(err.error_type(), "ReferenceError");

        let (file, line, col) = err.location().unwrap();
        assert_eq!(file, Some("script.js"));
        assert_eq!(line, Some(10));
        assert_eq!(col, Some(5));
    }

    #[test]
    fn syntax_error() {
        let err = EngineError::SyntaxError {
            message: "Unexpected token".into(),
            file: Some("test.js".into()),
            line: Some(1),
            column: Some(10),
        };

        assert!(err.to_string().contains("Syntax error"));
        assert!(err.to_string().contains("test.js:1:10"));
        assert!(err.is_script_error());
    }

    #[test]
    fn type_error() {
        let err = EngineError::type_error("string", "number");
        assert!(err.to_string().contains("expected string"));
        assert!(err.to_string().contains("got number"));
        assert_eq!(err.error_type(), "TypeError");
    }

    #[test]
    fn null_pointer() {
        let err = EngineError::null_pointer("JSEvaluateScript");
        assert!(err.to_string().contains("JSEvaluateScript"));
        assert!(err.to_string().contains("returned null"));
    }

    #[test]
    fn location_none() {
        let err = EngineError::Internal("test".into());
        assert!(err.location().is_none());
        assert!(err.stack_trace().is_none());
    }
}
