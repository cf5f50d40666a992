//! Output checking
//!
//! A checker decides whether one run satisfied its test and may award a
//! partial score. Four modes exist; the custom mode runs a user-compiled
//! checker program inside the same sandbox machinery as the submission.

use std::fs;

use rand::Rng;
use rand::distr::Alphanumeric;
use regex::Regex;

use crate::constants;
use crate::error::JudgeResult;
use crate::models::assets::AssetMap;
use crate::models::{CodeTree, FileMap, Status, TestCase};
use crate::utils::fs::save_code;

use super::executors::{ProcessExecutor, RunLimits};

/// Everything a checker may look at for one test
pub struct CheckContext<'a> {
    pub inputs: &'a str,
    pub output: &'a str,
    pub target: &'a str,
    pub code: &'a CodeTree,
    pub input_files: Option<&'a FileMap>,
    pub output_files: Option<&'a FileMap>,
    pub target_files: Option<&'a FileMap>,
    pub input_assets: Option<&'a AssetMap>,
    pub output_assets: Option<&'a AssetMap>,
    pub target_assets: Option<&'a AssetMap>,
}

/// Verdict, score in [0, 100], and an optional message for the user
pub type CheckOutcome = (Status, f64, Option<String>);

/// Comparison strategies, one per comparison mode
pub enum Checker {
    /// Accept anything that ran cleanly
    Ok,
    /// Stripped whole-output equality
    Whole,
    /// Token-wise comparison with float tolerance
    Token {
        float_precision: f64,
        delimiter: Option<String>,
    },
    /// User-compiled checker program
    Custom {
        executor: ProcessExecutor,
        limits: RunLimits,
    },
}

impl Checker {
    pub fn check(&self, ctx: &CheckContext) -> CheckOutcome {
        match self {
            Checker::Ok => (Status::Ok, 100.0, None),
            Checker::Whole => whole_check(ctx),
            Checker::Token {
                float_precision,
                delimiter,
            } => token_check(ctx, *float_precision, delimiter.as_deref()),
            Checker::Custom { executor, limits } => custom_check(ctx, executor, limits),
        }
    }
}

fn whole_check(ctx: &CheckContext) -> CheckOutcome {
    let files_match = ctx
        .target_files
        .map(|targets| {
            targets.iter().all(|(file, target)| {
                ctx.output_files
                    .and_then(|outputs| outputs.get(file))
                    .is_some_and(|output| output.trim() == target.trim())
            })
        })
        .unwrap_or(true);

    if ctx.output.trim() == ctx.target.trim() && files_match && assets_match(ctx) {
        (Status::Ok, 100.0, None)
    } else {
        (Status::Wa, 0.0, None)
    }
}

fn token_check(ctx: &CheckContext, float_precision: f64, delimiter: Option<&str>) -> CheckOutcome {
    let files_match = ctx
        .target_files
        .map(|targets| {
            targets.iter().all(|(file, target)| {
                ctx.output_files
                    .and_then(|outputs| outputs.get(file))
                    .is_some_and(|output| tokens_equal(output, target, float_precision, delimiter))
            })
        })
        .unwrap_or(true);

    if tokens_equal(ctx.output, ctx.target, float_precision, delimiter)
        && files_match
        && assets_match(ctx)
    {
        (Status::Ok, 100.0, None)
    } else {
        (Status::Wa, 0.0, None)
    }
}

fn assets_match(ctx: &CheckContext) -> bool {
    ctx.target_assets
        .map(|targets| {
            targets.iter().all(|(file, target)| {
                ctx.output_assets.and_then(|outputs| outputs.get(file)) == Some(target)
            })
        })
        .unwrap_or(true)
}

/// Token-wise equality with a three-level comparison per token pair
fn tokens_equal(output: &str, target: &str, float_precision: f64, delimiter: Option<&str>) -> bool {
    let splitter = match delimiter {
        // The delimiter is a regex; a malformed one falls back to its
        // literal spelling
        Some(delimiter) => Regex::new(delimiter).unwrap_or_else(|_| {
            Regex::new(&regex::escape(delimiter)).expect("escaped pattern is valid")
        }),
        None => Regex::new(r"\s+").expect("static pattern is valid"),
    };
    let output_tokens: Vec<&str> = splitter.split(output.trim()).collect();
    let target_tokens: Vec<&str> = splitter.split(target.trim()).collect();
    if output_tokens.len() != target_tokens.len() {
        tracing::debug!(
            "Token counts differ: out({}) target({})",
            output_tokens.len(),
            target_tokens.len()
        );
        return false;
    }

    for (index, (out, tgt)) in output_tokens.iter().zip(&target_tokens).enumerate() {
        let out = out.trim();
        let tgt = tgt.trim();
        let out_folded = out.to_lowercase();
        if out_folded == tgt.to_lowercase() && matches!(out_folded.as_str(), "nan" | "inf") {
            continue;
        }
        if let (Ok(a), Ok(b)) = (out.parse::<f64>(), tgt.parse::<f64>()) {
            let diff = (a - b).abs();
            if diff.is_nan() || diff > float_precision {
                tracing::debug!("#{index} numbers differ: out({out}) target({tgt}) => {diff}");
                return false;
            }
        } else if out != tgt {
            tracing::debug!("#{index} tokens differ: out({out}) target({tgt})");
            return false;
        }
    }
    true
}

fn custom_check(ctx: &CheckContext, executor: &ProcessExecutor, limits: &RunLimits) -> CheckOutcome {
    match try_custom_check(ctx, executor, limits) {
        Ok(outcome) => outcome,
        Err(e) => (
            Status::RuntimeError,
            0.0,
            Some(format!("Checker failed with: {e}")),
        ),
    }
}

fn try_custom_check(
    ctx: &CheckContext,
    executor: &ProcessExecutor,
    limits: &RunLimits,
) -> JudgeResult<CheckOutcome> {
    let scratch = tempfile::Builder::new()
        .prefix("checker-run")
        .tempdir_in(executor.root())?;
    let input_path = scratch.path().join("input.txt");
    let output_path = scratch.path().join("output.txt");
    let target_path = scratch.path().join("target.txt");
    let code_dir = scratch.path().join("code");
    fs::write(&input_path, ctx.inputs)?;
    fs::write(&output_path, ctx.output)?;
    fs::write(&target_path, ctx.target)?;
    save_code(&code_dir, ctx.code)?;

    // The tag lets the checker mix status lines with debug prints; it is
    // handed over on stdin so the checker can echo it back
    let tag: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(constants::CHECKER_STATUS_TAG_LEN)
        .map(char::from)
        .collect();

    let args = [&input_path, &output_path, &target_path, &code_dir]
        .map(|path| shell_escape::escape(path.to_string_lossy()).into_owned())
        .join(" ");
    let run = executor
        .with_args(&args)
        .run(&TestCase::new(tag.clone(), ""), limits);

    if run.status != Status::Ok {
        return Ok((
            run.status,
            0.0,
            Some(format!(
                "Checker failed with: {}, having errors: {}",
                run.message.unwrap_or_default(),
                run.errors.unwrap_or_default()
            )),
        ));
    }

    Ok(parse_checker_output(
        run.outputs.as_deref().unwrap_or(""),
        &tag,
    ))
}

/// Extract `(status, score, message)` from a checker transcript.
///
/// Lines starting with the tag are status lines; checkers that never echo
/// the tag have every line treated as a status line instead. The first two
/// status lines carry the verdict and the score.
fn parse_checker_output(transcript: &str, tag: &str) -> CheckOutcome {
    let (mut status_lines, mut other_lines): (Vec<&str>, Vec<&str>) =
        transcript.split('\n').partition(|line| line.starts_with(tag));
    if status_lines.is_empty() {
        status_lines = std::mem::take(&mut other_lines);
    }

    if status_lines.len() < 2 {
        return (
            Status::RuntimeError,
            0.0,
            Some(
                "Checker failed to produce status and score (each should be on separate lines)"
                    .to_string(),
            ),
        );
    }

    let status_raw = status_lines[0].replace(tag, "").trim().to_string();
    let score_raw = status_lines[1].replace(tag, "").trim().to_string();
    let message = status_lines[2..]
        .iter()
        .copied()
        .chain(other_lines)
        .collect::<Vec<_>>()
        .join("\n")
        .replace(tag, "")
        .trim()
        .to_string();

    let Ok(score) = score_raw.parse::<f64>() else {
        return (
            Status::RuntimeError,
            0.0,
            Some("Checker did not produce a valid score value".to_string()),
        );
    };
    let Some(status) = Status::from_wire(&status_raw) else {
        return (
            Status::RuntimeError,
            0.0,
            Some("Checker did not produce a valid status".to_string()),
        );
    };

    (status, score, (!message.is_empty()).then_some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CodeNode;

    fn context<'a>(output: &'a str, target: &'a str, code: &'a CodeTree) -> CheckContext<'a> {
        CheckContext {
            inputs: "",
            output,
            target,
            code,
            input_files: None,
            output_files: None,
            target_files: None,
            input_assets: None,
            output_assets: None,
            target_assets: None,
        }
    }

    #[test]
    fn test_ok_checker_accepts_everything() {
        let code = CodeTree::new();
        let checker = Checker::Ok;
        let (status, score, message) = checker.check(&context("anything", "else", &code));
        assert_eq!((status, score, message), (Status::Ok, 100.0, None));
    }

    #[test]
    fn test_whole_checker_strips_outer_whitespace() {
        let code = CodeTree::new();
        let checker = Checker::Whole;
        assert_eq!(
            checker.check(&context("  hello \n", "hello", &code)).0,
            Status::Ok
        );
        assert_eq!(
            checker.check(&context("hello there", "hello", &code)).0,
            Status::Wa
        );
    }

    #[test]
    fn test_whole_checker_compares_target_files() {
        let code = CodeTree::new();
        let checker = Checker::Whole;
        let output_files = FileMap::from([("out.txt".to_string(), "5\n".to_string())]);
        let target_files = FileMap::from([("out.txt".to_string(), "5".to_string())]);

        let mut ctx = context("", "", &code);
        ctx.output_files = Some(&output_files);
        ctx.target_files = Some(&target_files);
        assert_eq!(checker.check(&ctx).0, Status::Ok);

        let missing = FileMap::from([("other.txt".to_string(), "5".to_string())]);
        ctx.output_files = Some(&missing);
        assert_eq!(checker.check(&ctx).0, Status::Wa);
    }

    #[test]
    fn test_token_checker_float_tolerance() {
        assert!(tokens_equal("0.30000001 2", "0.3 2", 1e-5, None));
        assert!(!tokens_equal("0.31 2", "0.3 2", 1e-5, None));
        assert!(!tokens_equal("1 2 3", "1 2", 1e-5, None));
        // Shared non-finite spellings compare equal, NaN against a number
        // does not
        assert!(tokens_equal("nan", "NaN", 1e-5, None));
        assert!(tokens_equal("inf", "INF", 1e-5, None));
        assert!(!tokens_equal("nan", "0", 1e-5, None));
        // Plain words fall back to exact comparison
        assert!(tokens_equal("yes  no", "yes no", 1e-5, None));
        assert!(!tokens_equal("yes", "no", 1e-5, None));
    }

    #[test]
    fn test_token_checker_custom_delimiter() {
        assert!(tokens_equal("a,b,c", "a,b,c", 1e-5, Some(",")));
        assert!(!tokens_equal("a,b", "a,b,c", 1e-5, Some(",")));
        // Spaces are plain characters when a delimiter is set
        assert!(!tokens_equal("a b", "a  b", 1e-5, Some(",")));
    }

    #[test]
    fn test_parse_tagged_transcript() {
        let transcript = "debug line\nTAG1234567 Solved\nTAG1234567 90\nTAG1234567 good";
        let (status, score, message) = parse_checker_output(transcript, "TAG1234567");
        assert_eq!(status, Status::Ok);
        assert_eq!(score, 90.0);
        assert!(message.unwrap().contains("good"));
    }

    #[test]
    fn test_parse_untagged_transcript() {
        let (status, score, message) =
            parse_checker_output("Wrong answer\n0\nTry again...", "TAG1234567");
        assert_eq!(status, Status::Wa);
        assert_eq!(score, 0.0);
        assert_eq!(message.as_deref(), Some("Try again..."));
    }

    #[test]
    fn test_parse_failures() {
        let (status, _, message) = parse_checker_output("", "TAG");
        assert_eq!(status, Status::RuntimeError);
        assert!(
            message
                .unwrap()
                .contains("Checker failed to produce status and score")
        );

        let (status, _, message) = parse_checker_output("line1\nline2\nline3\nline4\nline5", "TAG");
        assert_eq!(status, Status::RuntimeError);
        assert_eq!(
            message.as_deref(),
            Some("Checker did not produce a valid score value")
        );

        let (status, _, message) =
            parse_checker_output("Weird status\n100\nSome message here", "TAG");
        assert_eq!(status, Status::RuntimeError);
        assert_eq!(
            message.as_deref(),
            Some("Checker did not produce a valid status")
        );
    }

    #[test]
    fn test_custom_checker_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        // A shell "checker" that accepts iff output.txt equals target.txt,
        // echoing the tag it was handed on stdin
        let script = dir.path().join("checker.sh");
        fs::write(
            &script,
            "read tag\nif [ \"$(cat \"$2\")\" = \"$(cat \"$3\")\" ]; then\n\
             echo \"$tag Solved\"\necho \"$tag 90\"\necho 'Good job!'\n\
             else\necho \"$tag Wrong answer\"\necho \"$tag 0\"\nfi\n",
        )
        .unwrap();

        let mut code = CodeTree::new();
        code.insert("main.sh".to_string(), CodeNode::File("echo hi".to_string()));
        let limits = RunLimits {
            time_limit_s: 5.0,
            memory_limit_mb: 512,
            output_limit_mb: 1.0,
            hard_rss_ceiling_mb: 1500,
        };
        let executor = ProcessExecutor::new(format!("sh {}", script.display()), dir.path());
        let checker = Checker::Custom { executor, limits };

        let (status, score, message) = checker.check(&context("hello", "hello", &code));
        assert_eq!(status, Status::Ok);
        assert_eq!(score, 90.0);
        assert!(message.unwrap().contains("Good job!"));

        let (status, score, _) = checker.check(&context("hello", "world", &code));
        assert_eq!(status, Status::Wa);
        assert_eq!(score, 0.0);
    }
}
