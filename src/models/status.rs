//! Verdict statuses and their wire representation

use serde::{Deserialize, Serialize};

/// Verdict for a single run or an entire submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Ran within limits and the checker accepted the output
    #[serde(rename = "Solved")]
    Ok,
    /// Ran cleanly but the checker rejected the output
    #[serde(rename = "Wrong answer")]
    Wa,
    /// Wall clock exceeded the time limit
    #[serde(rename = "Time limit exceeded")]
    Tle,
    /// Sampled RSS exceeded the limit, or the OS killed the process for memory
    #[serde(rename = "Memory limit exceeded")]
    Mle,
    /// Stdout or stderr exceeded the output limit
    #[serde(rename = "Output limit exceeded")]
    Ole,
    /// Crash, nonzero exit, or an internal failure while running the child
    #[serde(rename = "Runtime error")]
    RuntimeError,
    /// Build step returned nonzero or produced diagnostics
    #[serde(rename = "Compilation error")]
    CompilationError,
    /// Linting step reported errors
    #[serde(rename = "Linting error")]
    LintingError,
    /// Not run because an earlier test already failed
    #[serde(rename = "Skipped")]
    Skipped,
}

impl Status {
    /// Wire string used in JSON payloads and checker protocols
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "Solved",
            Status::Wa => "Wrong answer",
            Status::Tle => "Time limit exceeded",
            Status::Mle => "Memory limit exceeded",
            Status::Ole => "Output limit exceeded",
            Status::RuntimeError => "Runtime error",
            Status::CompilationError => "Compilation error",
            Status::LintingError => "Linting error",
            Status::Skipped => "Skipped",
        }
    }

    /// Parse the wire string back into a status
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "Solved" => Some(Status::Ok),
            "Wrong answer" => Some(Status::Wa),
            "Time limit exceeded" => Some(Status::Tle),
            "Memory limit exceeded" => Some(Status::Mle),
            "Output limit exceeded" => Some(Status::Ole),
            "Runtime error" => Some(Status::RuntimeError),
            "Compilation error" => Some(Status::CompilationError),
            "Linting error" => Some(Status::LintingError),
            "Skipped" => Some(Status::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
