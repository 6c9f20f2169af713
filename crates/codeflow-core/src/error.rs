//! Error taxonomy shared by every execution engine.
//!
//! Errors are captured at the boundary of a host or driver and returned as
//! data inside a [`TraceResult`](crate::model::TraceResult). Each variant is
//! distinct so a UI can explain "your program is too long-running to
//! visualize" instead of implying a bug in the user's code.

use serde::{Deserialize, Serialize};

/// An execution failure, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TraceError {
    /// The instrumented program failed to parse even though the user's
    /// source is valid. `excerpt` shows the rewritten lines around the fault.
    #[error("wrapper syntax error: {message}")]
    WrapperSyntax { message: String, excerpt: String },

    /// The user's program threw (or failed to parse). `line` is in the
    /// numbering of the original source.
    #[error("{message}")]
    Runtime { message: String, line: Option<u32> },

    /// Tracing stopped after `limit` steps.
    #[error("trace limit exceeded: program ran for more than {limit} steps")]
    TraceLimitExceeded { limit: usize },

    /// The wall-clock budget ran out and the sandbox was torn down.
    #[error("execution timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The host interpreter could not be loaded.
    #[error("interpreter failed to initialize: {message}")]
    Initialization { message: String },

    /// The caller violated the contract before anything ran.
    #[error("usage error: {message}")]
    Usage { message: String },

    /// A stepped session was terminated by its owner.
    #[error("execution terminated")]
    Terminated,
}

/// Discriminant of [`TraceError`], carried on results as `errorKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TraceErrorKind {
    WrapperSyntax,
    Runtime,
    TraceLimitExceeded,
    Timeout,
    Initialization,
    Usage,
    Terminated,
}

impl TraceError {
    pub fn runtime(message: impl Into<String>, line: Option<u32>) -> Self {
        TraceError::Runtime {
            message: message.into(),
            line,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        TraceError::Usage {
            message: message.into(),
        }
    }

    pub fn initialization(message: impl Into<String>) -> Self {
        TraceError::Initialization {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> TraceErrorKind {
        match self {
            TraceError::WrapperSyntax { .. } => TraceErrorKind::WrapperSyntax,
            TraceError::Runtime { .. } => TraceErrorKind::Runtime,
            TraceError::TraceLimitExceeded { .. } => TraceErrorKind::TraceLimitExceeded,
            TraceError::Timeout { .. } => TraceErrorKind::Timeout,
            TraceError::Initialization { .. } => TraceErrorKind::Initialization,
            TraceError::Usage { .. } => TraceErrorKind::Usage,
            TraceError::Terminated => TraceErrorKind::Terminated,
        }
    }

    /// Source line the error is attributed to, when the engine knows it.
    pub fn line(&self) -> Option<u32> {
        match self {
            TraceError::Runtime { line, .. } => *line,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(
            TraceError::runtime("boom", Some(2)).kind(),
            TraceErrorKind::Runtime
        );
        assert_eq!(
            TraceError::TraceLimitExceeded { limit: 10 }.kind(),
            TraceErrorKind::TraceLimitExceeded
        );
        assert_eq!(TraceError::Terminated.kind(), TraceErrorKind::Terminated);
    }

    #[test]
    fn only_runtime_errors_carry_lines() {
        assert_eq!(TraceError::runtime("x", Some(7)).line(), Some(7));
        assert_eq!(TraceError::Timeout { timeout_ms: 5 }.line(), None);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(TraceError::Timeout { timeout_ms: 50 }).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["timeout_ms"], 50);
    }

    #[test]
    fn messages_are_never_empty() {
        let errors = [
            TraceError::Terminated,
            TraceError::usage("entry function `f` not found"),
            TraceError::TraceLimitExceeded { limit: 3 },
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
