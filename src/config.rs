//! Engine configuration loaded from environment variables

use std::env;
use std::path::PathBuf;

use crate::constants;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Writable directory every submission runs inside; wiped between submissions
    pub sandbox_root: PathBuf,

    /// Directory holding decrypted problem test files (`<problem>.json`)
    pub problem_store_path: PathBuf,

    /// Resource envelopes for the engine's own child processes
    pub limits: LimitsConfig,
}

/// Limits for build, checker, and lint subprocesses
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Build-step wall clock limit, seconds
    pub compile_time_limit_s: f64,

    /// Build-step wall clock limit for dotnet steps, seconds
    pub dotnet_compile_time_limit_s: f64,

    /// Build-step memory limit, MB
    pub compile_memory_limit_mb: u64,

    /// Hard rlimit ceiling for every supervised child, MB
    pub hard_rss_ceiling_mb: u64,

    /// Custom checker wall clock limit, seconds
    pub checker_time_limit_s: f64,

    /// Custom checker memory limit, MB
    pub checker_memory_limit_mb: u64,

    /// Custom checker output limit, MB
    pub checker_output_limit_mb: f64,

    /// Lint-step wall clock limit, seconds
    pub lint_time_limit_s: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            sandbox_root: PathBuf::from(
                env::var("SANDBOX_ROOT").unwrap_or_else(|_| "/tmp".to_string()),
            ),
            problem_store_path: PathBuf::from(
                env::var("PROBLEM_STORE_PATH").unwrap_or_else(|_| "/mnt/efs".to_string()),
            ),
            limits: LimitsConfig::from_env(),
        }
    }

    /// Configuration rooted in a caller-chosen sandbox, defaults elsewhere
    pub fn with_sandbox_root(sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            problem_store_path: PathBuf::from("/mnt/efs"),
            limits: LimitsConfig::default(),
        }
    }
}

impl LimitsConfig {
    fn from_env() -> Self {
        Self {
            compile_time_limit_s: env_or(
                "COMPILE_TIME_LIMIT_S",
                constants::DEFAULT_COMPILE_TIME_LIMIT_S,
            ),
            dotnet_compile_time_limit_s: env_or(
                "DOTNET_COMPILE_TIME_LIMIT_S",
                constants::DEFAULT_DOTNET_COMPILE_TIME_LIMIT_S,
            ),
            compile_memory_limit_mb: env_or(
                "COMPILE_MEMORY_LIMIT_MB",
                constants::DEFAULT_COMPILE_MEMORY_LIMIT_MB,
            ),
            hard_rss_ceiling_mb: env_or(
                "HARD_RSS_CEILING_MB",
                constants::DEFAULT_HARD_RSS_CEILING_MB,
            ),
            checker_time_limit_s: env_or(
                "CHECKER_TIME_LIMIT_S",
                constants::DEFAULT_CHECKER_TIME_LIMIT_S,
            ),
            checker_memory_limit_mb: env_or(
                "CHECKER_MEMORY_LIMIT_MB",
                constants::DEFAULT_CHECKER_MEMORY_LIMIT_MB,
            ),
            checker_output_limit_mb: env_or(
                "CHECKER_OUTPUT_LIMIT_MB",
                constants::DEFAULT_CHECKER_OUTPUT_LIMIT_MB,
            ),
            lint_time_limit_s: env_or("LINT_TIME_LIMIT_S", constants::DEFAULT_LINT_TIME_LIMIT_S),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            compile_time_limit_s: constants::DEFAULT_COMPILE_TIME_LIMIT_S,
            dotnet_compile_time_limit_s: constants::DEFAULT_DOTNET_COMPILE_TIME_LIMIT_S,
            compile_memory_limit_mb: constants::DEFAULT_COMPILE_MEMORY_LIMIT_MB,
            hard_rss_ceiling_mb: constants::DEFAULT_HARD_RSS_CEILING_MB,
            checker_time_limit_s: constants::DEFAULT_CHECKER_TIME_LIMIT_S,
            checker_memory_limit_mb: constants::DEFAULT_CHECKER_MEMORY_LIMIT_MB,
            checker_output_limit_mb: constants::DEFAULT_CHECKER_OUTPUT_LIMIT_MB,
            lint_time_limit_s: constants::DEFAULT_LINT_TIME_LIMIT_S,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
