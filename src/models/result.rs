//! Run and submission result records

use serde::{Deserialize, Serialize};

use super::assets::{AssetMap, base64_gzip_map};
use super::request::FileMap;
use super::status::Status;

/// Result of running one program once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub status: Status,
    /// Peak RSS of the process tree, MB
    pub memory: f64,
    /// Wall-clock seconds
    pub time: f64,
    pub return_code: i32,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Captured stdout (possibly truncated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<String>,
    /// Captured stderr (possibly truncated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
    /// Declared target files read back from the sandbox after the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_files: Option<FileMap>,
    /// Declared target assets read back from the sandbox after the run
    #[serde(
        default,
        with = "base64_gzip_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_assets: Option<AssetMap>,
}

impl RunResult {
    /// A bare result with the given status and no measurements
    pub fn with_status(status: Status) -> Self {
        Self {
            status,
            memory: 0.0,
            time: 0.0,
            return_code: 0,
            score: 0.0,
            message: None,
            outputs: None,
            errors: None,
            output_files: None,
            output_assets: None,
        }
    }

    /// Placeholder for tests not run after an earlier failure
    pub fn skipped() -> Self {
        Self::with_status(Status::Skipped)
    }

    /// An engine-side failure, with the diagnostic in `errors`
    pub fn internal_error(message: impl Into<String>) -> Self {
        let mut result = Self::with_status(Status::RuntimeError);
        result.errors = Some(message.into());
        result
    }

    /// Drop every captured output from the result
    pub fn strip_outputs(&mut self) {
        self.outputs = None;
        self.errors = None;
        self.output_files = None;
        self.output_assets = None;
    }
}

/// The pipeline's answer for one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub overall: RunResult,
    pub compile_result: RunResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linting_result: Option<RunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<RunResult>>,
}

impl SubmissionResult {
    /// A result where compilation (or an equivalent early step) decided everything
    pub fn from_compilation(compile_result: RunResult) -> Self {
        Self {
            overall: compile_result.clone(),
            compile_result,
            linting_result: None,
            test_results: None,
        }
    }
}
