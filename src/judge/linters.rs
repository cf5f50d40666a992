//! Optional linting of submissions
//!
//! Only C++ has a linter: clang-tidy with warnings as errors over a curated
//! check list, followed by a clang-format style pass. Any surviving stderr
//! flips the run into a linting error.

use std::path::{Path, PathBuf};

use crate::config::LimitsConfig;
use crate::error::{JudgeError, JudgeResult};
use crate::models::{RunResult, Status};
use crate::sandbox::Supervisor;

/// clang-tidy notice emitted even when no user-visible diagnostics exist
const SYSTEM_HEADERS_NOTICE: &str =
    "Use -system-headers to display errors from system headers as well.\n";

const CLANG_TIDY_CHECKS: &[&str] = &[
    "bugprone-argument-comment",
    "bugprone-assert-side-effect",
    "bugprone-branch-clone",
    "bugprone-copy-constructor-init",
    "bugprone-dangling-handle",
    "bugprone-fold-init-type",
    "bugprone-forwarding-reference-overload",
    "bugprone-inaccurate-erase",
    "bugprone-incorrect-roundings",
    "bugprone-integer-division",
    "bugprone-macro-parentheses",
    "bugprone-macro-repeated-side-effects",
    "bugprone-misplaced-widening-cast",
    "bugprone-move-forwarding-reference",
    "bugprone-multiple-statement-macro",
    "bugprone-not-null-terminated-result",
    "bugprone-parent-virtual-call",
    "bugprone-posix-return",
    "bugprone-sizeof-container",
    "bugprone-sizeof-expression",
    "bugprone-string-constructor",
    "bugprone-string-integer-assignment",
    "bugprone-suspicious-enum-usage",
    "bugprone-suspicious-memset-usage",
    "bugprone-suspicious-missing-comma",
    "bugprone-suspicious-semicolon",
    "bugprone-suspicious-string-compare",
    "bugprone-swapped-arguments",
    "bugprone-terminating-continue",
    "bugprone-throw-keyword-missing",
    "bugprone-too-small-loop-variable",
    "bugprone-undelegated-constructor",
    "bugprone-unhandled-self-assignment",
    "bugprone-unused-raii",
    "bugprone-unused-return-value",
    "bugprone-use-after-move",
    "bugprone-virtual-near-miss",
    "cert-err34-c",
    "cert-flp30-c",
    "cert-msc50-cpp",
    "cppcoreguidelines-interfaces-global-init",
    "cppcoreguidelines-slicing",
    "google-default-arguments",
    "google-explicit-constructor",
    "misc-misplaced-const",
    "misc-new-delete-overloads",
    "misc-non-copyable-objects",
    "misc-throw-by-value-catch-by-reference",
    "misc-unconventional-assign-operator",
    "misc-uniqueptr-reset-release",
    "modernize-deprecated-headers",
    "modernize-make-shared",
    "modernize-make-unique",
    "modernize-redundant-void-arg",
    "modernize-use-bool-literals",
    "modernize-use-emplace",
    "modernize-use-nullptr",
    "modernize-use-override",
    "performance-faster-string-find",
    "performance-for-range-copy",
    "performance-implicit-conversion-in-loop",
    "performance-inefficient-algorithm",
    "performance-inefficient-string-concatenation",
    "performance-inefficient-vector-operation",
    "performance-move-const-arg",
    "performance-no-automatic-move",
    "performance-type-promotion-in-math-fn",
    "performance-unnecessary-copy-initialization",
    "performance-unnecessary-value-param",
    "readability-container-size-empty",
    "readability-delete-null-pointer",
    "readability-misleading-indentation",
    "readability-misplaced-array-index",
    "readability-non-const-parameter",
    "readability-redundant-control-flow",
    "readability-redundant-function-ptr-dereference",
    "readability-redundant-smartptr-get",
    "readability-redundant-string-cstr",
    "readability-redundant-string-init",
    "readability-simplify-subscript-expr",
    "readability-string-compare",
    "readability-uniqueptr-delete-release",
];

/// One linter per supported language family
pub enum Linter {
    Cpp { standard: String },
}

impl Linter {
    pub fn from_language(language: &str) -> JudgeResult<Self> {
        let language = language.to_lowercase();
        match language.as_str() {
            "c++" => Ok(Linter::Cpp {
                standard: "c++20".to_string(),
            }),
            "c++11" | "c++14" | "c++17" | "c++20" | "c++23" => {
                Ok(Linter::Cpp { standard: language })
            }
            _ => Err(JudgeError::UnsupportedLintLanguage(language)),
        }
    }

    pub fn lint(
        &self,
        submission_paths: &[PathBuf],
        sandbox: &Path,
        limits: &LimitsConfig,
    ) -> RunResult {
        let Linter::Cpp { standard } = self;
        let sources = submission_paths
            .iter()
            .map(|path| shell_escape::escape(path.to_string_lossy()).into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!("Linting {} files", submission_paths.len());
        let checks = CLANG_TIDY_CHECKS.join(",");
        let mut tidy = Supervisor::new(
            format!(
                "clang-tidy -warnings-as-errors=* -checks=-*,{checks} {sources} -- -std={standard}"
            ),
            limits.lint_time_limit_s,
            limits.compile_memory_limit_mb,
        )
        .hard_rss_ceiling(limits.hard_rss_ceiling_mb)
        .cwd(sandbox)
        .run(None);

        if let Some(errors) = &tidy.errors {
            if let Some(position) = errors.find(SYSTEM_HEADERS_NOTICE) {
                let trimmed = errors[position + SYSTEM_HEADERS_NOTICE.len()..]
                    .trim()
                    .to_string();
                tidy.errors = Some(trimmed);
            }
        }
        if tidy.errors.as_deref().is_some_and(|errors| !errors.is_empty()) {
            tidy.status = Status::LintingError;
        }
        if tidy.status != Status::Ok {
            return tidy;
        }

        let style = "{BasedOnStyle: llvm, IndentWidth: 4, SortIncludes: false}";
        let mut format = Supervisor::new(
            format!("clang-format --style=\"{style}\" --dry-run --Werror {sources}"),
            limits.lint_time_limit_s,
            limits.compile_memory_limit_mb,
        )
        .hard_rss_ceiling(limits.hard_rss_ceiling_mb)
        .cwd(sandbox)
        .run(None);
        if format
            .errors
            .as_deref()
            .is_some_and(|errors| !errors.is_empty())
        {
            format.status = Status::LintingError;
        }
        format
    }
}
