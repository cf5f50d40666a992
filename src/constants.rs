//! Engine-wide constants
//!
//! Constants are grouped by the component that consumes them.

// =============================================================================
// SANDBOX / PROCESS SUPERVISION
// =============================================================================

/// Hard RSS ceiling applied as the rlimit hard cap, MB.
///
/// The soft rlimit tracks the submission's own memory limit; this ceiling is
/// a platform safety net for runaways that outpace the sampling loop.
pub const DEFAULT_HARD_RSS_CEILING_MB: u64 = 1500;

/// Number of memory samples taken across one timeout window
pub const SAMPLES_PER_TIMEOUT: u32 = 500;

/// Target kernel pipe buffer size for the child's stdout/stderr, bytes
pub const PIPE_BUFFER_BYTES: usize = 1024 * 1024;

/// Read chunk size used by the stream pump threads, bytes
pub const READ_CHUNK_BYTES: usize = 1024 * 1024;

/// Exit codes that indicate the OS reclaimed the process for memory
pub const OOM_EXIT_CODES: [i32; 2] = [libc::ENOMEM, 137];

/// Exit codes mapped to a plain runtime error (SIGSEGV, SIGTERM)
pub const CRASH_EXIT_CODES: [i32; 2] = [139, 143];

// =============================================================================
// COMPILATION
// =============================================================================

/// Build-step wall clock limit, seconds
pub const DEFAULT_COMPILE_TIME_LIMIT_S: f64 = 10.0;

/// Dotnet project scaffolding and builds are slower than everything else
pub const DEFAULT_DOTNET_COMPILE_TIME_LIMIT_S: f64 = 30.0;

/// Build-step memory limit, MB
pub const DEFAULT_COMPILE_MEMORY_LIMIT_MB: u64 = 512;

// =============================================================================
// CHECKING & LINTING
// =============================================================================

/// Custom checker wall clock limit, seconds
pub const DEFAULT_CHECKER_TIME_LIMIT_S: f64 = 5.0;

/// Custom checker memory limit, MB
pub const DEFAULT_CHECKER_MEMORY_LIMIT_MB: u64 = 512;

/// Custom checker output limit, MB
pub const DEFAULT_CHECKER_OUTPUT_LIMIT_MB: f64 = 1.0;

/// Length of the random tag prefixing checker status lines
pub const CHECKER_STATUS_TAG_LEN: usize = 10;

/// Lint-step wall clock limit, seconds
pub const DEFAULT_LINT_TIME_LIMIT_S: f64 = 100.0;

// =============================================================================
// RESULT PAYLOAD BUDGET
// =============================================================================

/// Per-field cap on returned outputs, characters
pub const RETURNED_OUTPUT_MAX_CHARS: usize = 32_000;

/// Cumulative cap on returned outputs across all tests, bytes
pub const RETURNED_PAYLOAD_BUDGET_BYTES: usize = 1024 * 1024;

/// Message attached to results whose outputs were dropped over the budget
pub const OMITTED_OUTPUTS_MESSAGE: &str = "Omitted outputs as the size of results exceeds 1MB";
