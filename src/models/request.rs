//! Submission request records

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::assets::{AssetMap, base64_gzip_map};

/// Map from a sandbox-relative path to textual file content
pub type FileMap = BTreeMap<String, String>;

/// A source tree: file name to content, or directory name to subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeNode {
    File(String),
    Dir(BTreeMap<String, CodeNode>),
}

/// Top level of a submitted source tree
pub type CodeTree = BTreeMap<String, CodeNode>;

/// How actual output is compared against expected output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// Stripped whole-output equality
    #[default]
    Whole,
    /// Token-by-token comparison with float tolerance
    Token,
    /// User-supplied checker program
    Custom,
    /// Accept any run that did not crash
    Ok,
}

/// One test: stdin, expected stdout, and optional files/assets around the run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub target: String,

    /// Textual files materialized in the sandbox before the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_files: Option<FileMap>,
    /// Textual files expected to exist after the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_files: Option<FileMap>,
    /// Binary files materialized in the sandbox before the run
    #[serde(
        default,
        with = "base64_gzip_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_assets: Option<AssetMap>,
    /// Binary files expected to exist after the run
    #[serde(
        default,
        with = "base64_gzip_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_assets: Option<AssetMap>,
}

impl TestCase {
    /// Plain stdin/stdout test with no files attached
    pub fn new(input: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            target: target.into(),
            ..Self::default()
        }
    }
}

/// A contiguous run of tests scored together
///
/// Either every test in the group earns `points_per_test`, or the group as a
/// whole is worth `points` and awards nothing unless every test passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTestGroup")]
pub struct TestGroup {
    pub points: f64,
    pub points_per_test: f64,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTestGroup {
    #[serde(default)]
    points: f64,
    #[serde(default)]
    points_per_test: f64,
    count: usize,
}

impl TestGroup {
    pub fn new(points: f64, points_per_test: f64, count: usize) -> anyhow::Result<Self> {
        if points != 0.0 && points_per_test != 0.0 {
            anyhow::bail!("Both points and points_per_test values are nonzero");
        }
        Ok(Self {
            points,
            points_per_test,
            count,
        })
    }
}

impl TryFrom<RawTestGroup> for TestGroup {
    type Error = String;

    fn try_from(raw: RawTestGroup) -> Result<Self, Self::Error> {
        TestGroup::new(raw.points, raw.points_per_test, raw.count).map_err(|e| e.to_string())
    }
}

/// The input to the grading pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    /// Mapping from filename.extension to content, possibly nested
    pub code: CodeTree,
    pub language: String,

    /// Caller-side correlation id, echoed nowhere but handy in logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// MB
    #[serde(default = "default_memory_limit")]
    pub memory_limit: u64,
    /// seconds
    #[serde(default = "default_time_limit")]
    pub time_limit: f64,
    /// MB
    #[serde(default = "default_output_limit")]
    pub output_limit: f64,

    /// Key into the problem test store; its tests are appended to `test_cases`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_groups: Option<Vec<TestGroup>>,

    #[serde(default)]
    pub return_outputs: bool,
    #[serde(default = "default_true")]
    pub stop_on_first_fail: bool,
    #[serde(default)]
    pub lint: bool,

    #[serde(default)]
    pub comparison_mode: ComparisonMode,
    #[serde(default = "default_float_precision")]
    pub float_precision: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checker_code: Option<CodeTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checker_language: Option<String>,

    /// Consumed by the upstream component that decrypts problem tests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

fn default_memory_limit() -> u64 {
    512
}

fn default_time_limit() -> f64 {
    5.0
}

fn default_output_limit() -> f64 {
    1.0
}

fn default_float_precision() -> f64 {
    1e-5
}

fn default_true() -> bool {
    true
}

impl SubmissionRequest {
    /// Language tag folded to lower case for dispatch
    pub fn language_tag(&self) -> String {
        self.language.to_lowercase()
    }

    /// Checker language tag folded to lower case for dispatch
    pub fn checker_language_tag(&self) -> Option<String> {
        self.checker_language
            .as_ref()
            .map(|language| language.to_lowercase())
    }

    /// Structural checks that do not require touching the filesystem.
    ///
    /// The custom-mode checker invariant is enforced where the checker is
    /// built, not here.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.code.is_empty() {
            anyhow::bail!("Submission contains no code");
        }
        Ok(())
    }
}
