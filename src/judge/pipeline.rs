//! The grading pipeline
//!
//! One submission in, one structured verdict out: wipe the sandbox, compile,
//! assemble tests, optionally lint, prepare the checker, warm up, run each
//! test through the executor and checker, enforce the returned-payload
//! budget, score, and aggregate.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::constants;
use crate::error::{JudgeError, JudgeResult};
use crate::models::{
    ComparisonMode, RunResult, Status, SubmissionRequest, SubmissionResult, TestCase, assets,
};
use crate::sandbox::Supervisor;
use crate::utils::fs::{save_code, wipe_dir};

use super::checkers::{CheckContext, Checker};
use super::compilers::Compiler;
use super::executors::{Executor, RunLimits};
use super::linters::Linter;
use super::scoring::Scorer;
use super::store;

/// Grades one submission at a time inside the configured sandbox
pub struct JudgePipeline {
    config: Config,
}

enum BuiltChecker {
    Ready(Checker),
    CompilationFailed(RunResult),
}

impl JudgePipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Grade a submission. Never fails: internal errors come back as a
    /// `Runtime error` overall so the caller always gets a structured result.
    pub fn judge(&self, request: &SubmissionRequest) -> SubmissionResult {
        if let Some(id) = &request.id {
            tracing::info!("Judging submission {id}");
        }
        match self.try_judge(request) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Judging failed: {e}");
                SubmissionResult::from_compilation(RunResult::internal_error(e.to_string()))
            }
        }
    }

    fn try_judge(&self, request: &SubmissionRequest) -> JudgeResult<SubmissionResult> {
        request
            .validate()
            .map_err(|e| JudgeError::InvalidRequest(e.to_string()))?;
        let sandbox = self.config.sandbox_root.clone();
        // Prior submissions must not leak files or fill the disk
        wipe_dir(&sandbox)?;

        let language = request.language_tag();
        let submission_paths = save_code(&sandbox, &request.code)?;
        let (executor, compile_result) =
            self.compile_code(&language, &submission_paths, &sandbox)?;
        let Some(mut executor) = executor else {
            return Ok(SubmissionResult::from_compilation(compile_result));
        };

        let (test_cases, comparison_mode) = self.assemble_tests(request, &language)?;
        tracing::info!("There are {} test cases", test_cases.len());

        let mut linting_result = None;
        if request.lint {
            match Linter::from_language(&language) {
                Ok(linter) => {
                    let lint = linter.lint(&submission_paths, &sandbox, &self.config.limits);
                    if lint.status != Status::Ok {
                        return Ok(SubmissionResult {
                            overall: lint.clone(),
                            compile_result,
                            linting_result: Some(lint),
                            test_results: None,
                        });
                    }
                    linting_result = Some(lint);
                }
                Err(e) => tracing::warn!("Linting skipped: {e}"),
            }
        }

        let checker = match self.build_checker(request, comparison_mode, &sandbox)? {
            BuiltChecker::Ready(checker) => checker,
            BuiltChecker::CompilationFailed(result) => {
                return Ok(SubmissionResult::from_compilation(result));
            }
        };

        let run_limits = RunLimits {
            time_limit_s: request.time_limit,
            memory_limit_mb: request.memory_limit,
            output_limit_mb: request.output_limit,
            hard_rss_ceiling_mb: self.config.limits.hard_rss_ceiling_mb,
        };

        // The first run pays interpreter startup, class loading, and similar
        // one-off costs; its measurements are discarded
        if let Executor::Process(process) = &executor {
            tracing::debug!("Running warmup test");
            let first = &test_cases[0];
            let warmup_input = (!first.input.is_empty()).then_some(first.input.as_str());
            Supervisor::new(
                process.command(),
                run_limits.time_limit_s,
                run_limits.memory_limit_mb,
            )
            .output_limit(run_limits.output_limit_mb)
            .hard_rss_ceiling(run_limits.hard_rss_ceiling_mb)
            .cwd(process.root())
            .run(warmup_input);
            executor.cleanup(first);
        }

        let mut test_results: Vec<RunResult> = Vec::with_capacity(test_cases.len());
        let mut payload_bytes = 0usize;
        let mut over_budget = false;
        for (index, test) in test_cases.iter().enumerate() {
            tracing::info!("Running test {index}");
            let mut result = executor.run(test, &run_limits);
            if result.status == Status::Ok {
                let (status, score, message) = checker.check(&CheckContext {
                    inputs: &test.input,
                    output: result.outputs.as_deref().unwrap_or(""),
                    target: &test.target,
                    code: &request.code,
                    input_files: test.input_files.as_ref(),
                    output_files: result.output_files.as_ref(),
                    target_files: test.target_files.as_ref(),
                    input_assets: test.input_assets.as_ref(),
                    output_assets: result.output_assets.as_ref(),
                    target_assets: test.target_assets.as_ref(),
                });
                result.status = status;
                result.score = score;
                result.message = message;
            }
            tracing::info!("Test {index} res: {} => {}", result.status, result.score);
            executor.cleanup(test);
            retain_outputs(
                &mut result,
                request.return_outputs,
                &mut payload_bytes,
                &mut over_budget,
            );

            let failed = result.status != Status::Ok;
            test_results.push(result);
            if failed && request.stop_on_first_fail {
                while test_results.len() < test_cases.len() {
                    test_results.push(RunResult::skipped());
                }
                break;
            }
        }
        debug_assert_eq!(test_results.len(), test_cases.len());

        let scorer = Scorer::from_request(request.test_groups.as_deref());
        let (total, per_test) = scorer.score(&test_results);
        tracing::info!("Total score: {total}");
        for (result, score) in test_results.iter_mut().zip(per_test) {
            result.score = score;
        }

        let first_failed = test_results.iter().find(|r| r.status != Status::Ok);
        let mut overall = RunResult::with_status(
            first_failed.map(|r| r.status).unwrap_or(Status::Ok),
        );
        overall.memory = test_results.iter().map(|r| r.memory).fold(0.0, f64::max);
        overall.time = test_results.iter().map(|r| r.time).fold(0.0, f64::max);
        overall.return_code = first_failed.map(|r| r.return_code).unwrap_or(0);
        overall.score = total;
        overall.message = first_failed.and_then(|r| r.message.clone());

        Ok(SubmissionResult {
            overall,
            compile_result,
            linting_result,
            test_results: Some(test_results),
        })
    }

    /// Request tests plus stored problem tests; an empty set becomes one
    /// synthetic test judged in `ok` mode, and text submissions keep only
    /// their first test since their output cannot depend on the input.
    fn assemble_tests(
        &self,
        request: &SubmissionRequest,
        language: &str,
    ) -> JudgeResult<(Vec<TestCase>, ComparisonMode)> {
        let mut test_cases = request.test_cases.clone();
        if let Some(problem) = &request.problem {
            test_cases.extend(store::load_problem_tests(
                &self.config.problem_store_path,
                problem,
            )?);
        }
        let mut comparison_mode = request.comparison_mode;
        if test_cases.is_empty() {
            test_cases.push(TestCase::new("", ""));
            comparison_mode = ComparisonMode::Ok;
        }
        if matches!(language, "txt" | "text") {
            test_cases.truncate(1);
        }
        Ok((test_cases, comparison_mode))
    }

    /// Compile and wrap the build diagnostic: any nonzero status or stderr
    /// becomes a compilation error, with a dedicated message when the build
    /// itself blew a limit.
    fn compile_code(
        &self,
        language: &str,
        submission_paths: &[PathBuf],
        sandbox: &Path,
    ) -> JudgeResult<(Option<Executor>, RunResult)> {
        let compiler = match Compiler::from_language(language) {
            Ok(compiler) => compiler,
            Err(e) => return Ok((None, compilation_error(e.to_string()))),
        };
        let (executor, mut compilation) =
            match compiler.compile(submission_paths, sandbox, &self.config.limits) {
                Ok(compiled) => compiled,
                Err(e) => return Ok((None, compilation_error(e.to_string()))),
            };

        if compilation.status == Status::Ok
            && compilation.errors.as_deref().unwrap_or("").is_empty()
        {
            return Ok((Some(executor), compilation));
        }

        tracing::info!(status = ?compilation.status, "Compile error");
        if compilation.status == Status::Tle {
            compilation.message = Some("Compilation time limit exceeded".to_string());
        }
        if compilation.status == Status::Mle {
            compilation.message = Some("Compilation memory limit exceeded".to_string());
        }
        compilation.status = Status::CompilationError;
        compilation.score = 0.0;
        Ok((None, compilation))
    }

    fn build_checker(
        &self,
        request: &SubmissionRequest,
        comparison_mode: ComparisonMode,
        sandbox: &Path,
    ) -> JudgeResult<BuiltChecker> {
        match comparison_mode {
            ComparisonMode::Ok => Ok(BuiltChecker::Ready(Checker::Ok)),
            ComparisonMode::Whole => Ok(BuiltChecker::Ready(Checker::Whole)),
            ComparisonMode::Token => Ok(BuiltChecker::Ready(Checker::Token {
                float_precision: request.float_precision,
                delimiter: request.delimiter.clone(),
            })),
            ComparisonMode::Custom => {
                let (Some(code), Some(language)) =
                    (&request.checker_code, request.checker_language_tag())
                else {
                    return Err(JudgeError::InvalidRequest(
                        "Custom comparison mode requires checker code and checker language"
                            .to_string(),
                    ));
                };
                let checker_dir = sandbox.join("checker");
                let checker_paths = save_code(&checker_dir, code)?;
                let (executor, mut compilation) =
                    self.compile_code(&language, &checker_paths, sandbox)?;
                match executor {
                    None => {
                        compilation.message = Some("Checker compilation failed".to_string());
                        Ok(BuiltChecker::CompilationFailed(compilation))
                    }
                    Some(Executor::Process(process)) => Ok(BuiltChecker::Ready(Checker::Custom {
                        executor: process,
                        limits: RunLimits {
                            time_limit_s: self.config.limits.checker_time_limit_s,
                            memory_limit_mb: self.config.limits.checker_memory_limit_mb,
                            output_limit_mb: self.config.limits.checker_output_limit_mb,
                            hard_rss_ceiling_mb: self.config.limits.hard_rss_ceiling_mb,
                        },
                    })),
                    Some(Executor::Sqlite(_)) => Err(JudgeError::InvalidRequest(
                        "SQL cannot be used as a checker language".to_string(),
                    )),
                }
            }
        }
    }
}

fn compilation_error(message: String) -> RunResult {
    let mut result = RunResult::with_status(Status::CompilationError);
    result.message = Some(message);
    result
}

/// Apply the returned-output policy to one result.
///
/// Without `return_outputs` everything is dropped. With it, text fields are
/// clipped per field, and once the cumulative encoded size of everything
/// retained would exceed the payload budget, this and all later results are
/// emptied instead.
fn retain_outputs(
    result: &mut RunResult,
    return_outputs: bool,
    payload_bytes: &mut usize,
    over_budget: &mut bool,
) {
    if !return_outputs {
        result.strip_outputs();
        return;
    }
    if !*over_budget {
        if let Some(outputs) = result.outputs.as_mut() {
            truncate_chars(outputs, constants::RETURNED_OUTPUT_MAX_CHARS);
        }
        if let Some(errors) = result.errors.as_mut() {
            truncate_chars(errors, constants::RETURNED_OUTPUT_MAX_CHARS);
        }
        if let Some(files) = result.output_files.as_mut() {
            for content in files.values_mut() {
                truncate_chars(content, constants::RETURNED_OUTPUT_MAX_CHARS);
            }
        }
        let size = serialized_payload_size(result);
        if *payload_bytes + size <= constants::RETURNED_PAYLOAD_BUDGET_BYTES {
            *payload_bytes += size;
            return;
        }
        *over_budget = true;
    }
    result.strip_outputs();
    result.message = Some(constants::OMITTED_OUTPUTS_MESSAGE.to_string());
}

/// Bytes this result contributes to the response payload, assets counted at
/// their encoded size
fn serialized_payload_size(result: &RunResult) -> usize {
    let mut size = result.outputs.as_deref().map_or(0, str::len)
        + result.errors.as_deref().map_or(0, str::len);
    if let Some(files) = &result.output_files {
        size += files.values().map(String::len).sum::<usize>();
    }
    if let Some(output_assets) = &result.output_assets {
        size += output_assets
            .values()
            .map(|content| assets::encode(content).len())
            .sum::<usize>();
    }
    size
}

fn truncate_chars(text: &mut String, max_chars: usize) {
    if let Some((index, _)) = text.char_indices().nth(max_chars) {
        text.truncate(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileMap;

    fn result_with_output(output: &str) -> RunResult {
        let mut result = RunResult::with_status(Status::Ok);
        result.outputs = Some(output.to_string());
        result.errors = Some(String::new());
        result
    }

    #[test]
    fn test_outputs_dropped_when_not_requested() {
        let mut result = result_with_output("data");
        let (mut bytes, mut over) = (0, false);
        retain_outputs(&mut result, false, &mut bytes, &mut over);
        assert_eq!(result.outputs, None);
        assert_eq!(result.errors, None);
        assert_eq!(result.message, None);
    }

    #[test]
    fn test_text_fields_clipped_per_field() {
        let mut result = result_with_output(&"A".repeat(100_000));
        result.output_files = Some(FileMap::from([(
            "log.txt".to_string(),
            "B".repeat(100_000),
        )]));
        let (mut bytes, mut over) = (0, false);
        retain_outputs(&mut result, true, &mut bytes, &mut over);
        assert_eq!(result.outputs.unwrap().len(), 32_000);
        assert_eq!(result.output_files.unwrap()["log.txt"].len(), 32_000);
        assert!(!over);
    }

    #[test]
    fn test_budget_omission_is_sticky() {
        let (mut bytes, mut over) = (0, false);

        // Three comfortable results pass through
        for _ in 0..3 {
            let mut result = result_with_output(&"A".repeat(10_000));
            retain_outputs(&mut result, true, &mut bytes, &mut over);
            assert!(result.outputs.is_some());
        }

        // A result that blows the cumulative budget is emptied
        let mut big = result_with_output("ok");
        big.output_files = Some(FileMap::from([(
            "blob.txt".to_string(),
            "C".repeat(30_000),
        )]));
        bytes = constants::RETURNED_PAYLOAD_BUDGET_BYTES - 10_000;
        retain_outputs(&mut big, true, &mut bytes, &mut over);
        assert_eq!(big.outputs, None);
        assert_eq!(big.output_files, None);
        assert_eq!(
            big.message.as_deref(),
            Some(constants::OMITTED_OUTPUTS_MESSAGE)
        );
        assert!(over);

        // Everything after stays empty, however small
        let mut small = result_with_output("tiny");
        retain_outputs(&mut small, true, &mut bytes, &mut over);
        assert_eq!(small.outputs, None);
        assert_eq!(
            small.message.as_deref(),
            Some(constants::OMITTED_OUTPUTS_MESSAGE)
        );
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        let mut text = "héllo wörld".repeat(100);
        truncate_chars(&mut text, 5);
        assert_eq!(text, "héllo");
        let mut short = "abc".to_string();
        truncate_chars(&mut short, 5);
        assert_eq!(short, "abc");
    }

    fn judge(request: &SubmissionRequest) -> SubmissionResult {
        let sandbox = tempfile::tempdir().unwrap();
        JudgePipeline::new(Config::with_sandbox_root(sandbox.path())).judge(request)
    }

    /// End-to-end runs for text submissions. Text "programs" are executed
    /// with `cat`, which keeps these free of any language toolchain while
    /// still exercising compilation dispatch, the supervisor, checking,
    /// scoring, and aggregation.
    mod txt_pipeline {
        use std::collections::BTreeMap;

        use super::judge;
        use super::*;
        use crate::models::{CodeNode, TestCase};

        fn txt_request(content: &str, test_cases: Vec<TestCase>) -> SubmissionRequest {
            let json = serde_json::json!({
                "code": {"main.txt": content},
                "language": "txt",
                "testCases": serde_json::to_value(&test_cases).unwrap(),
            });
            serde_json::from_value(json).unwrap()
        }

        #[test]
        fn test_matching_output_is_solved() {
            let request =
                txt_request("expected output\n", vec![TestCase::new("x", "expected output")]);
            let result = judge(&request);

            assert_eq!(result.compile_result.status, Status::Ok);
            assert_eq!(result.overall.status, Status::Ok);
            assert_eq!(result.overall.score, 100.0);
            let tests = result.test_results.unwrap();
            assert_eq!(tests.len(), 1);
            assert_eq!(tests[0].status, Status::Ok);
            assert_eq!(tests[0].score, 100.0);
        }

        #[test]
        fn test_mismatch_is_wrong_answer() {
            let request = txt_request("actual\n", vec![TestCase::new("", "expected")]);
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::Wa);
            assert_eq!(result.overall.score, 0.0);
            assert_eq!(result.test_results.unwrap()[0].status, Status::Wa);
        }

        #[test]
        fn test_text_submissions_keep_only_the_first_test() {
            let request = txt_request(
                "same\n",
                vec![
                    TestCase::new("1", "same"),
                    TestCase::new("2", "same"),
                    TestCase::new("3", "same"),
                ],
            );
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::Ok);
            assert_eq!(result.test_results.unwrap().len(), 1);
        }

        #[test]
        fn test_no_tests_becomes_one_synthetic_pass() {
            let request = txt_request("anything\n", Vec::new());
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::Ok);
            assert_eq!(result.overall.score, 100.0);
            let tests = result.test_results.unwrap();
            assert_eq!(tests.len(), 1);
            assert_eq!(tests[0].status, Status::Ok);
        }

        #[test]
        fn test_multiple_text_files_fail_compilation() {
            let mut request = txt_request("a", vec![TestCase::new("", "a")]);
            request
                .code
                .insert("extra.txt".to_string(), CodeNode::File("b".to_string()));
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::CompilationError);
            assert_eq!(result.compile_result.status, Status::CompilationError);
            assert!(result.test_results.is_none());
        }

        #[test]
        fn test_unknown_language_fails_compilation() {
            let mut request = txt_request("a", vec![TestCase::new("", "a")]);
            request.language = "brainfuck".to_string();
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::CompilationError);
            assert!(
                result
                    .compile_result
                    .message
                    .unwrap()
                    .contains("does not have a compiler")
            );
        }

        #[test]
        fn test_returned_outputs_are_clipped() {
            let long_line = "A".repeat(100_000);
            let mut request = txt_request(&long_line, vec![TestCase::new("", &long_line)]);
            request.return_outputs = true;
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::Ok);
            let tests = result.test_results.unwrap();
            assert_eq!(tests[0].outputs.as_ref().unwrap().len(), 32_000);
        }

        #[test]
        fn test_outputs_absent_by_default() {
            let request = txt_request("data\n", vec![TestCase::new("", "data")]);
            let result = judge(&request);

            let tests = result.test_results.unwrap();
            assert_eq!(tests[0].outputs, None);
            assert_eq!(tests[0].errors, None);
        }

        #[test]
        fn test_problem_store_tests_are_appended() {
            let sandbox = tempfile::tempdir().unwrap();
            let store = tempfile::tempdir().unwrap();
            std::fs::write(
                store.path().join("constant.json"),
                r#"[{"input": "from-store", "target": "fixed"}]"#,
            )
            .unwrap();

            let mut request = txt_request("fixed\n", Vec::new());
            request.problem = Some("constant".to_string());

            let mut config = Config::with_sandbox_root(sandbox.path());
            config.problem_store_path = store.path().to_path_buf();
            let result = JudgePipeline::new(config).judge(&request);

            assert_eq!(result.overall.status, Status::Ok);
            assert_eq!(result.test_results.unwrap().len(), 1);
        }

        #[test]
        fn test_code_tree_with_directories_is_materialized() {
            // A nested directory contributes its files to the saved tree, so
            // a txt submission with one becomes a multi-file submission and
            // is refused
            let json = serde_json::json!({
                "code": {"main.txt": "hello"},
                "language": "text",
                "testCases": [{"input": "", "target": "hello"}],
            });
            let request: SubmissionRequest = serde_json::from_value(json).unwrap();
            let result = judge(&request);
            assert_eq!(result.overall.status, Status::Ok);

            let mut nested = BTreeMap::new();
            nested.insert("notes.txt".to_string(), CodeNode::File("x".to_string()));
            let mut bad = request.clone();
            bad.code.insert("docs".to_string(), CodeNode::Dir(nested));
            let result = judge(&bad);
            // Two files saved -> txt compilation refuses
            assert_eq!(result.overall.status, Status::CompilationError);
        }
    }

    /// End-to-end runs for SQL submissions: the executor swap, multi-test
    /// sequencing, subtask scoring, and the skip-after-failure contract,
    /// all without spawning any processes.
    mod sql_pipeline {
        use super::judge;
        use super::*;
        use crate::models::{TestCase, TestGroup};

        fn sql_request(script: &str, test_cases: Vec<TestCase>) -> SubmissionRequest {
            let json = serde_json::json!({
                "code": {"main.sql": script},
                "language": "SQL",
                "testCases": serde_json::to_value(&test_cases).unwrap(),
            });
            serde_json::from_value(json).unwrap()
        }

        #[test]
        fn test_select_echo() {
            let request = sql_request(
                "SELECT 'hello world' AS greeting",
                vec![TestCase::new(
                    "-- Initialization script goes here",
                    "greeting\nhello world",
                )],
            );
            let result = judge(&request);

            assert_eq!(result.compile_result.status, Status::Ok);
            assert_eq!(result.overall.status, Status::Ok);
            assert_eq!(result.overall.score, 100.0);
            let tests = result.test_results.unwrap();
            assert_eq!(tests.len(), 1);
            assert_eq!(tests[0].status, Status::Ok);
        }

        #[test]
        fn test_initialization_script_feeds_the_query() {
            let request = sql_request(
                "SELECT name FROM users ORDER BY name",
                vec![TestCase::new(
                    "CREATE TABLE users (name TEXT); \
                     INSERT INTO users VALUES ('bob'), ('alice');",
                    "name\nalice\nbob",
                )],
            );
            let result = judge(&request);
            assert_eq!(result.overall.status, Status::Ok);
        }

        #[test]
        fn test_broken_sql_is_runtime_error() {
            let request = sql_request(
                "SELECT * FROM missing_table",
                vec![TestCase::new("", "irrelevant")],
            );
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::RuntimeError);
            let tests = result.test_results.unwrap();
            assert_eq!(tests[0].status, Status::RuntimeError);
        }

        #[test]
        fn test_failure_skips_the_rest() {
            let request = sql_request(
                "SELECT 'fixed' AS answer",
                vec![
                    TestCase::new("", "answer\nfixed"),
                    TestCase::new("", "answer\nsomething else"),
                    TestCase::new("", "answer\nfixed"),
                    TestCase::new("", "answer\nfixed"),
                ],
            );
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::Wa);
            let tests = result.test_results.unwrap();
            assert_eq!(tests.len(), 4);
            assert_eq!(tests[0].status, Status::Ok);
            assert_eq!(tests[1].status, Status::Wa);
            assert_eq!(tests[2].status, Status::Skipped);
            assert_eq!(tests[3].status, Status::Skipped);
        }

        #[test]
        fn test_failure_without_stop_runs_everything() {
            let mut request = sql_request(
                "SELECT 'fixed' AS answer",
                vec![
                    TestCase::new("", "answer\nsomething else"),
                    TestCase::new("", "answer\nfixed"),
                ],
            );
            request.stop_on_first_fail = false;
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::Wa);
            let tests = result.test_results.unwrap();
            assert_eq!(tests[0].status, Status::Wa);
            assert_eq!(tests[1].status, Status::Ok);
            assert_eq!(result.overall.score, 50.0);
        }

        #[test]
        fn test_subtask_scoring_awards_partial_credit() {
            // Groups: all-or-nothing 20 over two tests, all-or-nothing 50
            // over three, then 10 per test over three. Failures at indices
            // 3 and 6.
            let tests: Vec<TestCase> = (0..8)
                .map(|i| {
                    if i == 3 || i == 6 {
                        TestCase::new("", "answer\nwrong")
                    } else {
                        TestCase::new("", "answer\nfixed")
                    }
                })
                .collect();
            let mut request = sql_request("SELECT 'fixed' AS answer", tests);
            request.stop_on_first_fail = false;
            request.test_groups = Some(vec![
                TestGroup::new(20.0, 0.0, 2).unwrap(),
                TestGroup::new(50.0, 0.0, 3).unwrap(),
                TestGroup::new(0.0, 10.0, 3).unwrap(),
            ]);
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::Wa);
            assert_eq!(result.overall.score, 40.0);
            let tests = result.test_results.unwrap();
            assert_eq!(tests.len(), 8);
            assert_eq!(tests[0].score, 10.0);
            assert_eq!(tests[3].score, 0.0);
            assert_eq!(tests[4].score, 0.0);
            assert_eq!(tests[7].score, 10.0);
        }

        #[test]
        fn test_csv_tables_in_and_out() {
            let mut test = TestCase::new("", "");
            test.input_files = Some(
                [(
                    "people".to_string(),
                    "name,age\nalice,30\nbob,15\ncarol,25\n".to_string(),
                )]
                .into(),
            );
            test.target_files =
                Some([("grownups".to_string(), "name\nalice\ncarol\n".to_string())].into());

            let mut request = sql_request(
                "CREATE TABLE grownups AS \
                 SELECT name FROM people WHERE CAST(age AS INTEGER) >= 18 ORDER BY name",
                vec![test],
            );
            request.return_outputs = true;
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::Ok);
            let tests = result.test_results.unwrap();
            assert_eq!(tests[0].status, Status::Ok);
            assert_eq!(
                tests[0].output_files.as_ref().unwrap()["grownups"],
                "name\nalice\ncarol\n"
            );
        }

        #[test]
        fn test_tables_do_not_leak_between_tests() {
            // The first test creates `users`; the second must start from a
            // clean database, so the same SELECT fails there
            let mut request = sql_request(
                "SELECT name FROM users",
                vec![
                    TestCase::new("CREATE TABLE users (name TEXT);", "name"),
                    TestCase::new("", "name"),
                ],
            );
            request.stop_on_first_fail = false;
            let result = judge(&request);

            let tests = result.test_results.unwrap();
            assert_eq!(tests[0].status, Status::Ok);
            assert_eq!(tests[1].status, Status::RuntimeError);
        }
    }

    /// Pipeline behavior around custom checkers: the checker-compilation
    /// and checker-failure paths, end to end. The verdict-protocol parsing
    /// itself is covered by the checker unit tests.
    mod custom_checker {
        use super::judge;
        use super::*;

        #[test]
        fn test_checker_that_cannot_run_fails_the_test_not_the_submission() {
            // A text "checker" runs as `cat <file> <args...>`; the
            // code-directory argument makes cat exit nonzero, so the checker
            // itself fails
            let json = serde_json::json!({
                "code": {"main.txt": "hello"},
                "language": "txt",
                "testCases": [{"input": "", "target": "hello"}],
                "comparisonMode": "custom",
                "checkerLanguage": "txt",
                "checkerCode": {"main.txt": "Solved\n100"},
            });
            let request: SubmissionRequest = serde_json::from_value(json).unwrap();
            let result = judge(&request);

            // The submission compiled and ran; only the test carries the
            // failure
            assert_eq!(result.compile_result.status, Status::Ok);
            assert_eq!(result.overall.status, Status::RuntimeError);
            let tests = result.test_results.unwrap();
            assert_eq!(tests.len(), 1);
            assert_eq!(tests[0].status, Status::RuntimeError);
            assert!(
                tests[0]
                    .message
                    .as_ref()
                    .unwrap()
                    .contains("Checker failed with")
            );
        }

        #[test]
        fn test_checker_compilation_failure_short_circuits() {
            // Two checker files are illegal for txt, so checker compilation
            // fails before any test runs
            let json = serde_json::json!({
                "code": {"main.txt": "hello"},
                "language": "txt",
                "testCases": [{"input": "", "target": "hello"}],
                "comparisonMode": "custom",
                "checkerLanguage": "txt",
                "checkerCode": {"main.txt": "Solved\n100", "extra.txt": "x"},
            });
            let request: SubmissionRequest = serde_json::from_value(json).unwrap();
            let result = judge(&request);

            assert_eq!(result.overall.status, Status::CompilationError);
            assert_eq!(result.compile_result.status, Status::CompilationError);
            assert_eq!(
                result.overall.message.as_deref(),
                Some("Checker compilation failed")
            );
            assert_eq!(
                result.compile_result.message.as_deref(),
                Some("Checker compilation failed")
            );
            assert!(result.test_results.is_none());
        }

        #[test]
        fn test_missing_checker_code_is_rejected() {
            let json = serde_json::json!({
                "code": {"main.txt": "hello"},
                "language": "txt",
                "testCases": [{"input": "", "target": "hello"}],
                "comparisonMode": "custom",
            });
            let request: SubmissionRequest = serde_json::from_value(json).unwrap();
            let result = judge(&request);

            // The malformed request still produces a structured verdict
            assert_eq!(result.overall.status, Status::RuntimeError);
            assert!(result.overall.errors.as_ref().unwrap().contains("checker"));
        }
    }

    /// Wire-format contract: camelCase fields, human-readable statuses, and
    /// gzip+base64 asset payloads surviving a decode/encode round trip
    mod wire_codec {
        use super::*;
        use crate::models::assets;

        const REQUEST_JSON: &str = r#"{
            "code": {"main.cpp": "int main() { return 0; }", "dir": {"helper.cpp": "// helper"}},
            "language": "c++17",
            "memoryLimit": 256,
            "timeLimit": 2.5,
            "outputLimit": 0.5,
            "testCases": [
                {
                    "input": "1 2",
                    "target": "3",
                    "inputFiles": {"data.txt": "contents"},
                    "targetFiles": {"out.txt": "3"}
                }
            ],
            "testGroups": [
                {"points": 40, "pointsPerTest": 0, "count": 1}
            ],
            "comparisonMode": "token",
            "floatPrecision": 0.001,
            "delimiter": ",",
            "returnOutputs": true,
            "stopOnFirstFail": false,
            "lint": true,
            "problem": "sum-two",
            "encryptionKey": "opaque"
        }"#;

        #[test]
        fn test_request_round_trip() {
            let request: SubmissionRequest = serde_json::from_str(REQUEST_JSON).unwrap();
            assert_eq!(request.language, "c++17");
            assert_eq!(request.memory_limit, 256);
            assert_eq!(request.time_limit, 2.5);
            assert_eq!(request.float_precision, 0.001);
            assert_eq!(request.delimiter.as_deref(), Some(","));
            assert!(!request.stop_on_first_fail);
            assert_eq!(request.test_groups.as_ref().unwrap()[0].points, 40.0);

            let encoded = serde_json::to_value(&request).unwrap();
            let decoded: SubmissionRequest = serde_json::from_value(encoded.clone()).unwrap();
            assert_eq!(decoded.test_cases, request.test_cases);
            assert_eq!(decoded.test_groups, request.test_groups);

            // Field names stay camelCase on the wire
            assert!(encoded.get("memoryLimit").is_some());
            assert!(encoded.get("stopOnFirstFail").is_some());
            assert!(encoded.get("floatPrecision").is_some());
        }

        #[test]
        fn test_assets_survive_the_round_trip() {
            let payload: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
            let encoded_asset = assets::encode(&payload);

            let json = serde_json::json!({
                "code": {"main.py": "open('image.png', 'rb')"},
                "language": "python",
                "testCases": [{
                    "input": "",
                    "target": "",
                    "inputAssets": {"image.png": encoded_asset},
                    "targetAssets": {"result.png": assets::encode(b"expected")}
                }]
            });
            let request: SubmissionRequest = serde_json::from_value(json).unwrap();
            let test = &request.test_cases[0];
            assert_eq!(test.input_assets.as_ref().unwrap()["image.png"], payload);
            assert_eq!(
                test.target_assets.as_ref().unwrap()["result.png"],
                b"expected"
            );

            let rewired = serde_json::to_value(&request).unwrap();
            let reparsed: SubmissionRequest = serde_json::from_value(rewired).unwrap();
            assert_eq!(reparsed.test_cases, request.test_cases);
        }

        #[test]
        fn test_result_statuses_serialize_as_wire_strings() {
            let submission = SubmissionResult {
                overall: RunResult::with_status(Status::Mle),
                compile_result: RunResult::with_status(Status::Ok),
                linting_result: None,
                test_results: Some(vec![
                    RunResult::with_status(Status::Mle),
                    RunResult::skipped(),
                ]),
            };

            let encoded = serde_json::to_value(&submission).unwrap();
            assert_eq!(encoded["overall"]["status"], "Memory limit exceeded");
            assert_eq!(encoded["compileResult"]["status"], "Solved");
            assert_eq!(encoded["testResults"][1]["status"], "Skipped");
            // Unused optionals stay off the wire entirely
            assert!(encoded["overall"].get("outputs").is_none());
            assert!(encoded.get("lintingResult").is_none());
        }
    }
}
