//! Engine error taxonomy.
//!
//! Guest programs have no catch mechanism; every error unwinds the whole
//! execution. `Aborted` is the cooperative-cancellation case and is usually
//! swallowed by the host rather than reported.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("unsupported syntax node \"{0}\"")]
    UnsupportedNode(String),

    #[error("unsupported operator \"{0}\"")]
    UnsupportedOperator(String),

    #[error("unsupported parameter pattern \"{0}\"")]
    UnsupportedParam(String),

    #[error("\"{0}\" is not defined")]
    UndefinedIdentifier(String),

    #[error("cannot access \"{0}\" before initialization")]
    UninitializedRead(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("execution state invariant violated: {0}")]
    StateInvariant(String),

    /// A promise this execution awaited was rejected; carries the rejection
    /// reason rendered as text.
    #[error("unhandled rejection: {0}")]
    Rejected(String),

    /// The cancellation sentinel observed through an aborted await.
    #[error("aborted")]
    Aborted,
}

impl EngineError {
    /// Whether this error is the cooperative-cancellation sentinel rather
    /// than a genuine failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, EngineError::Aborted)
    }
}
