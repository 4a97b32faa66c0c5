//! Error types for tether-core.

use thiserror::Error;

use crate::status::StatusCode;

/// Result type for tether-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while crossing the native boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// A native call reported failure through a tagged result.
    #[error("native call failed ({code}): {reason}")]
    Foreign { code: StatusCode, reason: String },

    /// Operation attempted on a null, released, or never-created handle.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// No strategy or data kind is registered for the requested type.
    #[error("unregistered type: {0}")]
    UnregisteredType(String),

    /// The correlation store was used out of protocol (e.g. an output
    /// written for an execution id with no pending input).
    #[error("callback contract violated: {0}")]
    CallbackContract(String),

    /// A single-shot executor was entered while already running.
    #[error("re-entrant call into single-shot executor: {0}")]
    Reentrant(String),

    /// Host callback logic reported failure.
    #[error("callback failed: {0}")]
    Callback(String),

    /// Failed to load the native engine library.
    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// The native engine does not export an expected entry point.
    #[error("missing native symbol: {0}")]
    MissingSymbol(String),

    /// Execution was cancelled through a cancellation context.
    #[error("operation cancelled")]
    Cancelled,

    /// A stream was read past its last element.
    #[error("end of stream")]
    EndOfStream,

    /// A required edge's condition was not satisfied.
    #[error("edge condition not met: {0}")]
    ConditionNotMet(String),

    /// The forward edges of a graph contain a cycle.
    #[error("cyclic edges detected: {0}")]
    CyclicEdges(String),

    /// Node not found in the graph.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Invalid operation (e.g. processing a released node).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a graph walk may continue past this error on an optional edge.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidHandle(_) | Error::UnregisteredType(_) | Error::Callback(_)
        )
    }

    /// Format the error together with a recovery hint, for terminal display.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::LibraryLoad(_) => {
                Some("check that TETHER_LIBRARY points at the native engine build")
            }
            Error::MissingSymbol(_) => Some(
                "the engine prefix may be wrong; run `tether symbols` to list resolved entry points",
            ),
            Error::UnregisteredType(_) => {
                Some("register a strategy or data kind for this type before use")
            }
            Error::CallbackContract(_) => {
                Some("inputs must be stored for an execution id before its callback runs")
            }
            Error::CyclicEdges(_) => Some("mark back-edges with Edge::looping()"),
            Error::Config(_) => Some("see BridgeConfig for the accepted fields"),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_display() {
        let err = Error::Foreign {
            code: StatusCode::NotFound,
            reason: "no such model".to_string(),
        };
        assert_eq!(err.to_string(), "native call failed (not found): no such model");
    }

    #[test]
    fn test_with_hint() {
        let err = Error::MissingSymbol("engine_Node_create".to_string());
        let text = err.with_hint();
        assert!(text.starts_with("missing native symbol: engine_Node_create"));
        assert!(text.contains("hint:"));

        assert_eq!(Error::Cancelled.with_hint(), "operation cancelled");
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::UnregisteredType("Foo".into()).is_recoverable());
        assert!(!Error::CallbackContract("x".into()).is_recoverable());
    }
}
