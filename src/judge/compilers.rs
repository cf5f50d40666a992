//! Language-specific compilation
//!
//! A compiler maps a saved source tree to an executor plus the build-step
//! diagnostic. Dispatch is a closed table over case-folded language tags;
//! interpreted languages get a syntax check as their "build".

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::LimitsConfig;
use crate::error::{JudgeError, JudgeResult};
use crate::models::{RunResult, Status};
use crate::sandbox::Supervisor;

use super::executors::{Executor, ProcessExecutor, SqliteExecutor};

/// One compiler per supported language family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compiler {
    Txt,
    C { standard: String },
    Cpp { standard: String },
    Python { interpreter: String },
    PythonMl,
    CSharp,
    Js,
    Java,
    Sql,
}

impl Compiler {
    /// Select the compiler for a case-folded language tag
    pub fn from_language(language: &str) -> JudgeResult<Self> {
        let language = language.to_lowercase();
        match language.as_str() {
            "txt" | "text" => Ok(Compiler::Txt),
            // c2x is the spelling every toolchain in the fleet accepts
            "c" | "c23" | "c2x" => Ok(Compiler::C {
                standard: "c2x".to_string(),
            }),
            "c11" | "c17" => Ok(Compiler::C { standard: language }),
            "c++" => Ok(Compiler::Cpp {
                standard: "c++20".to_string(),
            }),
            "c++11" | "c++14" | "c++17" | "c++20" => Ok(Compiler::Cpp { standard: language }),
            "c++23" => Ok(Compiler::Cpp {
                standard: "c++2b".to_string(),
            }),
            "python" | "python3" => Ok(Compiler::Python {
                interpreter: language,
            }),
            "pythonml" => Ok(Compiler::PythonMl),
            "c#" => Ok(Compiler::CSharp),
            "js" => Ok(Compiler::Js),
            "java" => Ok(Compiler::Java),
            "sql" | "sqlite" => Ok(Compiler::Sql),
            _ => Err(JudgeError::UnsupportedLanguage(language)),
        }
    }

    /// Build the submission and return the executor that will run tests.
    ///
    /// The returned `RunResult` is the build-step diagnostic; callers decide
    /// whether nonzero status or stderr makes it a compilation error.
    pub fn compile(
        &self,
        submission_paths: &[PathBuf],
        sandbox: &Path,
        limits: &LimitsConfig,
    ) -> JudgeResult<(Executor, RunResult)> {
        if submission_paths.is_empty() {
            return Err(JudgeError::InvalidRequest(
                "Submission contains no files".to_string(),
            ));
        }
        match self {
            Compiler::Txt => self.compile_txt(submission_paths, sandbox),
            Compiler::C { standard } => {
                self.compile_gcc("gcc", standard, "-O3", submission_paths, sandbox, limits)
            }
            Compiler::Cpp { standard } => self.compile_gcc(
                "g++",
                standard,
                "-O3 -Wno-write-strings -fsanitize=address",
                submission_paths,
                sandbox,
                limits,
            ),
            Compiler::Python { interpreter } => {
                self.compile_python(interpreter, None, submission_paths, sandbox, limits)
            }
            Compiler::PythonMl => {
                let matplotlib_dir = escape_path(&sandbox.join("matplotlib"));
                let env_prefix = format!("MPLCONFIGDIR={matplotlib_dir}");
                self.compile_python("python", Some(env_prefix), submission_paths, sandbox, limits)
            }
            Compiler::CSharp => self.compile_csharp(submission_paths, sandbox, limits),
            Compiler::Js => self.compile_js(submission_paths, sandbox, limits),
            Compiler::Java => self.compile_java(submission_paths, sandbox, limits),
            Compiler::Sql => self.compile_sql(submission_paths, sandbox),
        }
    }

    fn compile_txt(
        &self,
        submission_paths: &[PathBuf],
        sandbox: &Path,
    ) -> JudgeResult<(Executor, RunResult)> {
        if submission_paths.len() != 1 {
            return Err(JudgeError::InvalidRequest(
                "Only one file is allowed for txt submissions".to_string(),
            ));
        }
        let command = format!("cat {}", escape_path(&submission_paths[0]));
        let executor = Executor::Process(ProcessExecutor::new(command, sandbox));
        Ok((executor, RunResult::with_status(Status::Ok)))
    }

    fn compile_gcc(
        &self,
        driver: &str,
        standard: &str,
        flags: &str,
        submission_paths: &[PathBuf],
        sandbox: &Path,
        limits: &LimitsConfig,
    ) -> JudgeResult<(Executor, RunResult)> {
        let main_file_name = if driver == "gcc" { "main.c" } else { "main.cpp" };
        let main_path = find_main_file(submission_paths, main_file_name);
        let executable_path = main_path.with_extension("o");
        let sources = join_paths(submission_paths);

        tracing::debug!("Creating executable at: {}", executable_path.display());
        let compilation = build_supervisor(
            format!(
                "{driver} {flags} -std={standard} {sources} -o {}",
                escape_path(&executable_path)
            ),
            sandbox,
            limits,
            false,
        )
        .run(None);

        let command = if driver == "g++" {
            // Leak checking is disabled; contestant programs rarely free
            format!(
                "ASAN_OPTIONS=detect_leaks=1 LSAN_OPTIONS=detect_leaks=0 {}",
                escape_path(&executable_path)
            )
        } else {
            escape_path(&executable_path)
        };
        let executor = Executor::Process(ProcessExecutor::new(command, sandbox));
        Ok((executor, compilation))
    }

    fn compile_python(
        &self,
        interpreter: &str,
        env_prefix: Option<String>,
        submission_paths: &[PathBuf],
        sandbox: &Path,
        limits: &LimitsConfig,
    ) -> JudgeResult<(Executor, RunResult)> {
        let main_path = find_main_file(submission_paths, "main.py");
        let sources = join_paths(submission_paths);

        let compilation = build_supervisor(
            format!("{interpreter} -m py_compile {sources}"),
            sandbox,
            limits,
            false,
        )
        .run(None);

        // The syntax check is all we wanted; drop the bytecode byproducts
        for path in submission_paths {
            let _ = fs::remove_file(path.with_extension("pyc"));
            if let Some(parent) = path.parent() {
                let _ = fs::remove_dir_all(parent.join("__pycache__"));
            }
        }

        let command = match env_prefix {
            Some(prefix) => format!("{prefix} {interpreter} {}", escape_path(&main_path)),
            None => format!("{interpreter} {}", escape_path(&main_path)),
        };
        let executor = Executor::Process(ProcessExecutor::new(command, sandbox));
        Ok((executor, compilation))
    }

    fn compile_csharp(
        &self,
        submission_paths: &[PathBuf],
        sandbox: &Path,
        limits: &LimitsConfig,
    ) -> JudgeResult<(Executor, RunResult)> {
        let project_dir = sandbox.join("program");
        let output_dir = sandbox.join("out");

        let create = build_supervisor(
            format!("dotnet new console -o {}", escape_path(&project_dir)),
            sandbox,
            limits,
            true,
        )
        .run(None);
        tracing::debug!(status = ?create.status, "dotnet project scaffolding finished");
        // Remove the template entrypoint so the submission's takes its place
        let _ = fs::remove_file(project_dir.join("Program.cs"));

        let common_root = common_parent(submission_paths);
        for path in submission_paths {
            let relative = match path.strip_prefix(&common_root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => PathBuf::from(path.file_name().unwrap_or(path.as_os_str())),
            };
            let destination = project_dir.join(relative);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(path, &destination)
                .with_context(|| format!("failed to copy {}", path.display()))?;
        }

        let compilation = build_supervisor(
            format!(
                "dotnet build {} -c Release -o {}",
                escape_path(&project_dir.join("program.csproj")),
                escape_path(&output_dir)
            ),
            sandbox,
            limits,
            true,
        )
        .run(None);

        let command = format!("dotnet run --project {}", escape_path(&project_dir));
        let executor = Executor::Process(ProcessExecutor::new(command, sandbox));
        Ok((executor, compilation))
    }

    fn compile_js(
        &self,
        submission_paths: &[PathBuf],
        sandbox: &Path,
        limits: &LimitsConfig,
    ) -> JudgeResult<(Executor, RunResult)> {
        let main_path = find_main_file(submission_paths, "index.js");
        let project = if submission_paths.len() == 1 {
            main_path.clone()
        } else {
            main_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or(main_path)
        };

        let compilation = build_supervisor(
            format!("node --check {}", escape_path(&project)),
            sandbox,
            limits,
            false,
        )
        .run(None);

        let command = format!("node {}", escape_path(&project));
        let executor = Executor::Process(ProcessExecutor::new(command, sandbox));
        Ok((executor, compilation))
    }

    fn compile_java(
        &self,
        submission_paths: &[PathBuf],
        sandbox: &Path,
        limits: &LimitsConfig,
    ) -> JudgeResult<(Executor, RunResult)> {
        let build_dir = sandbox.join("build");
        fs::create_dir_all(&build_dir)?;
        let sources = submission_paths
            .iter()
            .filter(|path| path.extension().is_some_and(|ext| ext == "java"))
            .map(|path| escape_path(path))
            .collect::<Vec<_>>()
            .join(" ");

        let command = format!(
            "java -cp {} Main",
            escape_path(&build_dir.join("Main.jar"))
        );
        let build = build_supervisor(
            format!("javac -d {} {sources}", escape_path(&build_dir)),
            sandbox,
            limits,
            false,
        )
        .run(None);
        if build.status != Status::Ok {
            let executor = Executor::Process(ProcessExecutor::new(command, sandbox));
            return Ok((executor, build));
        }

        let compilation = build_supervisor(
            format!("cd {} && jar cvf Main.jar *", escape_path(&build_dir)),
            sandbox,
            limits,
            false,
        )
        .run(None);
        let executor = Executor::Process(ProcessExecutor::new(command, sandbox));
        Ok((executor, compilation))
    }

    fn compile_sql(
        &self,
        submission_paths: &[PathBuf],
        sandbox: &Path,
    ) -> JudgeResult<(Executor, RunResult)> {
        let main_path = find_main_file(submission_paths, "main.sql");
        let script = fs::read_to_string(&main_path)
            .with_context(|| format!("failed to read {}", main_path.display()))?;
        let executor = Executor::Sqlite(SqliteExecutor::new(script, sandbox)?);
        Ok((executor, RunResult::with_status(Status::Ok)))
    }
}

/// Supervisor for one build step, with the longer dotnet window when asked
fn build_supervisor(
    command: String,
    sandbox: &Path,
    limits: &LimitsConfig,
    dotnet: bool,
) -> Supervisor {
    let timeout = if dotnet {
        limits.dotnet_compile_time_limit_s
    } else {
        limits.compile_time_limit_s
    };
    Supervisor::new(command, timeout, limits.compile_memory_limit_mb)
        .hard_rss_ceiling(limits.hard_rss_ceiling_mb)
        .cwd(sandbox)
}

/// The conventionally named main file, or the first file as a fallback
fn find_main_file(submission_paths: &[PathBuf], main_file_name: &str) -> PathBuf {
    submission_paths
        .iter()
        .find(|path| path.file_name().is_some_and(|name| name == main_file_name))
        .unwrap_or(&submission_paths[0])
        .clone()
}

fn escape_path(path: &Path) -> String {
    shell_escape::escape(path.to_string_lossy()).into_owned()
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| escape_path(path))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deepest directory containing every given path
fn common_parent(paths: &[PathBuf]) -> PathBuf {
    let mut common = paths[0]
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    for path in paths {
        while !path.starts_with(&common) {
            if !common.pop() {
                return PathBuf::new();
            }
        }
    }
    common
}
