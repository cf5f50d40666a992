//! Custom error types and handling
//!
//! Internal errors never cross the pipeline boundary as `Err`: the pipeline
//! and the process supervisor fold them into `Runtime error` results so the
//! caller always receives a structured verdict.

/// Engine-wide error type
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    /// Request shape failed a structural check
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No compiler exists for the requested language tag
    #[error("{0} does not have a compiler yet")]
    UnsupportedLanguage(String),

    /// No linter exists for the requested language tag
    #[error("{0} does not have a linter yet")]
    UnsupportedLintLanguage(String),

    /// A request-provided path was absolute or tried to escape the sandbox
    #[error("Unsafe path in request: {0}")]
    UnsafePath(String),

    /// A stored problem test file exists but could not be parsed
    #[error("Test store error: {0}")]
    TestStore(String),

    /// Filesystem operation failed
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything unexpected from the engine's own machinery
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias using JudgeError
pub type JudgeResult<T> = Result<T, JudgeError>;
