//! Supervised execution of one child command
//!
//! The child runs as the leader of a fresh process group with an RSS rlimit
//! applied between fork and exec. Three helper threads pump stdin/stdout/
//! stderr so the child can never deadlock on a full pipe while the main
//! thread samples the memory of the whole descendant tree and enforces the
//! wall-clock timeout.

use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use nix::sys::resource::{Resource, setrlimit};
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;

use super::memory;
use crate::constants;
use crate::models::{RunResult, Status};

/// Runs one shell command under wall-clock, memory, and output caps.
///
/// `run` never returns an error and never leaks the child: internal failures
/// come back as a `Runtime error` result with the diagnostic in `errors`.
#[derive(Debug, Clone)]
pub struct Supervisor {
    command: String,
    timeout_s: f64,
    memory_limit_mb: u64,
    output_limit_mb: f64,
    hard_rss_ceiling_mb: u64,
    cwd: Option<PathBuf>,
}

impl Supervisor {
    pub fn new(command: impl Into<String>, timeout_s: f64, memory_limit_mb: u64) -> Self {
        Self {
            command: command.into(),
            timeout_s,
            memory_limit_mb,
            output_limit_mb: 1.0,
            hard_rss_ceiling_mb: constants::DEFAULT_HARD_RSS_CEILING_MB,
            cwd: None,
        }
    }

    /// Cap on each of stdout/stderr, MB
    pub fn output_limit(mut self, output_limit_mb: f64) -> Self {
        self.output_limit_mb = output_limit_mb;
        self
    }

    /// Working directory for the child (defaults to the parent's)
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Hard rlimit ceiling, MB
    pub fn hard_rss_ceiling(mut self, ceiling_mb: u64) -> Self {
        self.hard_rss_ceiling_mb = ceiling_mb;
        self
    }

    /// Execute the command, feeding `program_input` to stdin when present.
    pub fn run(&self, program_input: Option<&str>) -> RunResult {
        match self.try_run(program_input) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(command = %self.command, "Supervised run failed: {e:#}");
                RunResult::internal_error(format!("{e:#}"))
            }
        }
    }

    fn try_run(&self, program_input: Option<&str>) -> anyhow::Result<RunResult> {
        let memory_limit_bytes = self.memory_limit_mb * 1024 * 1024;
        let hard_ceiling_bytes = self.hard_rss_ceiling_mb * 1024 * 1024;
        let soft_limit_bytes = memory_limit_bytes.min(hard_ceiling_bytes);
        let output_limit_bytes = (self.output_limit_mb * 1024.0 * 1024.0) as usize;

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        // Applied in the child between fork and exec
        unsafe {
            command.pre_exec(move || {
                setrlimit(Resource::RLIMIT_RSS, soft_limit_bytes, hard_ceiling_bytes)
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            });
        }

        let start = Instant::now();
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn: {}", self.command))?;
        let pid = child.id() as i32;

        let stdin_pump = match (child.stdin.take(), program_input) {
            (Some(mut stdin), Some(input)) => {
                let data = format!("{input}\n").into_bytes();
                Some(thread::spawn(move || {
                    // A child that never reads stdin breaks the pipe once killed
                    let _ = stdin.write_all(&data);
                }))
            }
            // Dropping the handle closes stdin right away
            _ => None,
        };

        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;
        enlarge_pipe(stdout.as_raw_fd());
        enlarge_pipe(stderr.as_raw_fd());
        let stdout_pump = thread::spawn(move || pump_stream(stdout, output_limit_bytes));
        let stderr_pump = thread::spawn(move || pump_stream(stderr, output_limit_bytes));

        // Sample as often as is reasonable; otherwise the child might sneak in
        // extra memory usage between polls
        let interval = Duration::from_secs_f64(
            (self.timeout_s / f64::from(constants::SAMPLES_PER_TIMEOUT)).max(0.001),
        );
        let mut status = Status::Ok;
        let mut max_rss_bytes: u64 = 0;
        let mut max_vms_bytes: u64 = 0;
        let mut tracked_pids: Vec<i32> = Vec::new();
        let mut exit_status = None;
        loop {
            if let Some(observed) = child.try_wait().context("failed to poll child")? {
                exit_status = Some(observed);
                break;
            }
            if start.elapsed().as_secs_f64() >= self.timeout_s {
                break;
            }
            let sample = memory::sample_tree(pid);
            max_rss_bytes = max_rss_bytes.max(sample.rss_bytes);
            max_vms_bytes = max_vms_bytes.max(sample.vms_bytes);
            if !sample.pids.is_empty() {
                tracked_pids = sample.pids;
            }
            if max_rss_bytes > memory_limit_bytes {
                status = Status::Mle;
                break;
            }
            thread::sleep(interval);
        }
        let elapsed = start.elapsed().as_secs_f64();

        // Kill the whole group plus any sampled stragglers that escaped it,
        // then reap. Signals to already-gone processes are ignored.
        let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        for stray in &tracked_pids {
            if *stray != pid {
                let _ = kill(Pid::from_raw(*stray), Signal::SIGKILL);
            }
        }
        let exit_status = match exit_status {
            Some(observed) => observed,
            None => child.wait().context("failed to reap child")?,
        };

        let mut outputs = stdout_pump.join().unwrap_or_default();
        let mut errors = stderr_pump.join().unwrap_or_default();
        if let Some(pump) = stdin_pump {
            let _ = pump.join();
        }

        let return_code = exit_status
            .code()
            .unwrap_or_else(|| 128 + exit_status.signal().unwrap_or(0));
        if elapsed >= self.timeout_s {
            status = Status::Tle;
        } else if constants::OOM_EXIT_CODES.contains(&return_code) {
            status = Status::Mle;
        } else if constants::CRASH_EXIT_CODES.contains(&return_code) {
            status = Status::RuntimeError;
        } else if return_code != 0 && status == Status::Ok {
            status = Status::RuntimeError;
        }

        if outputs.len() > output_limit_bytes {
            status = Status::Ole;
            outputs.truncate(output_limit_bytes / 2);
        }
        if errors.len() > output_limit_bytes {
            status = Status::Ole;
            errors.truncate(output_limit_bytes / 2);
        }

        tracing::debug!(
            command = %self.command,
            ?status,
            return_code,
            time_s = elapsed,
            memory_mb = max_rss_bytes as f64 / 1024.0 / 1024.0,
            vms_mb = max_vms_bytes as f64 / 1024.0 / 1024.0,
            "Supervised run finished"
        );

        Ok(RunResult {
            status,
            memory: max_rss_bytes as f64 / 1024.0 / 1024.0,
            time: elapsed,
            return_code,
            score: 0.0,
            message: None,
            outputs: Some(String::from_utf8_lossy(&outputs).into_owned()),
            errors: Some(String::from_utf8_lossy(&errors).into_owned()),
            output_files: None,
            output_assets: None,
        })
    }
}

/// Drain a stream into a buffer capped at `limit + 1` bytes.
///
/// Past the cap the stream keeps being drained but bytes are discarded, so
/// the child never blocks writing to a full pipe. One extra byte is kept so
/// the caller can tell "exactly at the limit" from "over it".
fn pump_stream(mut stream: impl Read, limit_bytes: usize) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; constants::READ_CHUNK_BYTES];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if buffer.len() <= limit_bytes {
                    let room = limit_bytes + 1 - buffer.len();
                    buffer.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    buffer
}

/// Ask the kernel for a bigger pipe buffer; best effort.
fn enlarge_pipe(fd: RawFd) {
    unsafe {
        libc::fcntl(
            fd,
            libc::F_SETPIPE_SZ,
            constants::PIPE_BUFFER_BYTES as libc::c_int,
        );
    }
}
