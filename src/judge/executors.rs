//! Executors bind a compiled submission to a per-test I/O environment
//!
//! A process executor stages the test's files in the sandbox, runs the
//! compiled command under the supervisor, and reads declared target files
//! back. A SQLite executor runs the submission script against an in-process
//! database instead of spawning anything.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rusqlite::Connection;
use rusqlite::types::Value;

use crate::error::JudgeResult;
use crate::models::assets::AssetMap;
use crate::models::{FileMap, RunResult, Status, TestCase};
use crate::sandbox::Supervisor;
use crate::utils::fs::resolve_sandbox_path;

/// Resource envelope for one supervised test run
#[derive(Debug, Clone)]
pub struct RunLimits {
    pub time_limit_s: f64,
    pub memory_limit_mb: u64,
    pub output_limit_mb: f64,
    pub hard_rss_ceiling_mb: u64,
}

/// The only thing that actually runs a test
pub enum Executor {
    Process(ProcessExecutor),
    Sqlite(SqliteExecutor),
}

impl Executor {
    /// Run one test and return its result; never fails across the boundary.
    pub fn run(&mut self, test: &TestCase, limits: &RunLimits) -> RunResult {
        match self {
            Executor::Process(executor) => executor.run(test, limits),
            Executor::Sqlite(executor) => executor.run(test),
        }
    }

    /// Remove every file or table the test introduced or produced.
    pub fn cleanup(&mut self, test: &TestCase) {
        match self {
            Executor::Process(executor) => executor.cleanup(test),
            Executor::Sqlite(executor) => executor.cleanup(),
        }
    }
}

/// Runs a shell command produced by a compiler, rooted in the sandbox
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    command: String,
    root: PathBuf,
}

impl ProcessExecutor {
    pub fn new(command: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            root: root.into(),
        }
    }

    /// The command this executor was built around
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Sandbox directory the command runs in
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A copy of this executor with extra command-line arguments appended
    pub fn with_args(&self, args: &str) -> Self {
        Self {
            command: format!("{} {}", self.command, args),
            root: self.root.clone(),
        }
    }

    pub fn run(&self, test: &TestCase, limits: &RunLimits) -> RunResult {
        if let Err(e) = self.stage_inputs(test) {
            tracing::error!("Failed to stage test inputs: {e}");
            return RunResult::internal_error(e.to_string());
        }

        let input = (!test.input.is_empty()).then_some(test.input.as_str());
        let mut result = Supervisor::new(&self.command, limits.time_limit_s, limits.memory_limit_mb)
            .output_limit(limits.output_limit_mb)
            .hard_rss_ceiling(limits.hard_rss_ceiling_mb)
            .cwd(&self.root)
            .run(input);

        // Read back exactly the files the test declared; absent ones come
        // back empty rather than failing the run
        result.output_files = test.target_files.as_ref().map(|targets| {
            targets
                .keys()
                .map(|filename| (filename.clone(), self.read_text_or_empty(filename)))
                .collect::<FileMap>()
        });
        result.output_assets = test.target_assets.as_ref().map(|targets| {
            targets
                .keys()
                .map(|filename| (filename.clone(), self.read_bytes_or_empty(filename)))
                .collect::<AssetMap>()
        });
        result
    }

    pub fn cleanup(&self, test: &TestCase) {
        let names = [
            &test.input_files,
            &test.target_files,
        ]
        .into_iter()
        .flatten()
        .flat_map(|map| map.keys())
        .chain(
            [&test.input_assets, &test.target_assets]
                .into_iter()
                .flatten()
                .flat_map(|map| map.keys()),
        );
        for filename in names {
            if let Ok(path) = resolve_sandbox_path(&self.root, filename) {
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove {}: {e}", path.display());
                    }
                }
            }
        }
    }

    fn stage_inputs(&self, test: &TestCase) -> JudgeResult<()> {
        for (filename, content) in test.input_files.iter().flatten() {
            let path = resolve_sandbox_path(&self.root, filename)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
        }
        for (filename, content) in test.input_assets.iter().flatten() {
            let path = resolve_sandbox_path(&self.root, filename)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
        }
        Ok(())
    }

    fn read_text_or_empty(&self, filename: &str) -> String {
        resolve_sandbox_path(&self.root, filename)
            .ok()
            .and_then(|path| fs::read_to_string(path).ok())
            .unwrap_or_default()
    }

    fn read_bytes_or_empty(&self, filename: &str) -> Vec<u8> {
        resolve_sandbox_path(&self.root, filename)
            .ok()
            .and_then(|path| fs::read(path).ok())
            .unwrap_or_default()
    }
}

/// Runs a SQL script against an in-process database
///
/// `test.input` is the initialization script, `input_files` are CSV tables
/// to load, and `target_files` name the tables read back after the run.
pub struct SqliteExecutor {
    script: String,
    connection: Connection,
}

impl SqliteExecutor {
    pub fn new(script: impl Into<String>, root: &Path) -> JudgeResult<Self> {
        let connection = Connection::open(root.join("main.db"))
            .context("failed to open the submission database")?;
        Ok(Self {
            script: script.into(),
            connection,
        })
    }

    pub fn run(&mut self, test: &TestCase) -> RunResult {
        match self.try_run(test) {
            Ok(result) => result,
            Err(e) => {
                let mut result = RunResult::with_status(Status::RuntimeError);
                result.errors = Some(e.to_string());
                result
            }
        }
    }

    fn try_run(&mut self, test: &TestCase) -> anyhow::Result<RunResult> {
        self.connection.execute_batch(&test.input)?;

        for (table, content) in test.input_files.iter().flatten() {
            tracing::debug!("Loading table {table} from CSV");
            load_csv_table(&self.connection, table, content)?;
        }

        let script = self.script.trim();
        let outputs = if script.to_uppercase().starts_with("SELECT") {
            query_to_csv(&self.connection, script)?
        } else {
            self.connection.execute_batch(script)?;
            String::new()
        };

        let output_files = match &test.target_files {
            Some(targets) => {
                let mut files = FileMap::new();
                for table in targets.keys() {
                    let sql = format!("SELECT * FROM {}", quote_identifier(table));
                    files.insert(table.clone(), query_to_csv(&self.connection, &sql)?);
                }
                Some(files)
            }
            None => None,
        };

        let mut result = RunResult::with_status(Status::Ok);
        result.outputs = Some(outputs);
        result.output_files = output_files;
        Ok(result)
    }

    /// Drops every user table so the next test starts from a clean database
    pub fn cleanup(&mut self) {
        let tables: Vec<String> = {
            let Ok(mut statement) = self.connection.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            ) else {
                return;
            };
            statement
                .query_map([], |row| row.get(0))
                .map(|rows| rows.filter_map(Result::ok).collect())
                .unwrap_or_default()
        };

        tracing::debug!("Dropping {} tables", tables.len());
        for table in tables {
            let sql = format!("DROP TABLE {}", quote_identifier(&table));
            if let Err(e) = self.connection.execute_batch(&sql) {
                tracing::warn!("Failed to drop table {table}: {e}");
            }
        }
    }
}

/// Create table `name` from CSV content, columns taken from the header row
fn load_csv_table(connection: &Connection, name: &str, content: &str) -> anyhow::Result<()> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        anyhow::bail!("table {name} has no header row");
    }

    let columns = headers
        .iter()
        .map(|header| format!("{} TEXT", quote_identifier(header)))
        .collect::<Vec<_>>()
        .join(", ");
    connection.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});",
        table = quote_identifier(name),
    ))?;

    let placeholders = vec!["?"; headers.len()].join(", ");
    let mut insert = connection.prepare(&format!(
        "INSERT INTO {} VALUES ({placeholders})",
        quote_identifier(name),
    ))?;
    for record in reader.records() {
        let record = record?;
        if record.len() != headers.len() {
            anyhow::bail!(
                "table {name}: row has {} values, expected {}",
                record.len(),
                headers.len()
            );
        }
        insert.execute(rusqlite::params_from_iter(record.iter()))?;
    }
    Ok(())
}

/// Render a query's result set as CSV with a header row
fn query_to_csv(connection: &Connection, sql: &str) -> anyhow::Result<String> {
    let mut statement = connection.prepare(sql)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            let value: Value = row.get(index)?;
            record.push(render_value(value));
        }
        writer.write_record(&record)?;
    }
    drop(rows);

    Ok(String::from_utf8(writer.into_inner()?)?)
}

fn render_value(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(n) => n.to_string(),
        Value::Real(x) => x.to_string(),
        Value::Text(text) => text,
        Value::Blob(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
