//! Problem test store access
//!
//! Stored problem tests arrive as a plain JSON array of test cases; the
//! upstream sync component owns decryption and decompression, so by the time
//! a file lands here it is ready to parse.

use std::fs;
use std::path::Path;

use crate::error::{JudgeError, JudgeResult};
use crate::models::TestCase;
use crate::utils::fs::resolve_sandbox_path;

/// Load the stored tests for a problem key, or nothing when the file is absent
pub fn load_problem_tests(store_path: &Path, problem: &str) -> JudgeResult<Vec<TestCase>> {
    let path = resolve_sandbox_path(store_path, &format!("{problem}.json"))?;
    if !path.exists() {
        tracing::warn!(
            "No stored tests for problem {problem} at {}",
            path.display()
        );
        return Ok(Vec::new());
    }

    tracing::info!("Loading stored tests from {}", path.display());
    let data = fs::read_to_string(&path)?;
    let tests: Vec<TestCase> = serde_json::from_str(&data)
        .map_err(|e| JudgeError::TestStore(format!("problem {problem}: {e}")))?;
    Ok(tests)
}
