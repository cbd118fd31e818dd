//! Process-backed analysis engine
//!
//! Runs `<interpreter> <script> <command> <args...>` as a child process.
//! Session, telemetry and schedule fetches can take minutes on a cold
//! download cache, so they are driven in streamed mode with stderr progress
//! surfaced in the logs; the analyses run in blocking mode.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use f1dash_common::config::EngineConfig;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{parse_output, AnalysisEngine, EngineCommand, EngineError, InvocationMode};

/// Captured result of one finished child process
struct ProcessOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Analysis engine that shells out to the analysis script
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    interpreter: String,
    script: PathBuf,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ProcessEngine {
    /// Create an engine without a deadline
    pub fn new(interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Create an engine from bootstrap configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        Self {
            interpreter: config.interpreter.clone(),
            script: config.script.clone(),
            working_dir: config.working_dir.clone(),
            timeout,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill the child and fail with `Timeout` once `timeout` elapses
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, command: EngineCommand, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.script)
            .arg(command.as_str())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the run future (deadline hit, client gone) kills the child
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }

    async fn run(&self, command: EngineCommand, args: &[String]) -> Result<ProcessOutput, EngineError> {
        let cmd = self.command(command, args);

        let run = async {
            match command.mode() {
                InvocationMode::Streamed => self.run_streamed(cmd, command).await,
                InvocationMode::Blocking => self.run_blocking(cmd).await,
            }
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                let limit_ms = limit.as_millis() as u64;
                warn!(command = %command, limit_ms, "Analysis process timed out, killing");
                EngineError::Timeout { limit_ms }
            })?,
            None => run.await,
        }
    }

    async fn run_streamed(&self, mut cmd: Command, command: EngineCommand) -> Result<ProcessOutput, EngineError> {
        let mut child = cmd.spawn().map_err(|e| self.spawn_failure(e))?;

        let mut stdout = child.stdout.take().ok_or_else(|| EngineError::Io {
            reason: "stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| EngineError::Io {
            reason: "stderr was not captured".to_string(),
        })?;

        let read_stdout = async {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        let read_stderr = async {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line).await? == 0 {
                    break;
                }
                debug!(
                    command = %command,
                    line = %String::from_utf8_lossy(&line).trim_end(),
                    "analysis stderr"
                );
                buf.extend_from_slice(&line);
            }
            Ok::<_, std::io::Error>(buf)
        };

        let (stdout, stderr, status) =
            tokio::try_join!(read_stdout, read_stderr, child.wait()).map_err(collect_failure)?;

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        })
    }

    async fn run_blocking(&self, mut cmd: Command) -> Result<ProcessOutput, EngineError> {
        let child = cmd.spawn().map_err(|e| self.spawn_failure(e))?;
        let output = child.wait_with_output().await.map_err(collect_failure)?;
        Ok(ProcessOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn spawn_failure(&self, error: std::io::Error) -> EngineError {
        EngineError::SpawnFailure {
            program: self.interpreter.clone(),
            reason: error.to_string(),
        }
    }
}

/// Pipe read or wait failure on a child that did start
fn collect_failure(error: std::io::Error) -> EngineError {
    EngineError::Io {
        reason: error.to_string(),
    }
}

#[async_trait::async_trait]
impl AnalysisEngine for ProcessEngine {
    async fn invoke(&self, command: EngineCommand, args: &[String]) -> Result<Value, EngineError> {
        let started = Instant::now();
        info!(command = %command, args = ?args, "Running analysis process");

        let result = self.run(command, args).await.and_then(|output| {
            if !output.status.success() {
                return Err(EngineError::NonZeroExit {
                    code: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }
            parse_output(&output.stdout)
        });

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(command = %command, elapsed_ms, "Analysis process completed"),
            Err(e) => warn!(command = %command, elapsed_ms, kind = e.kind(), error = %e, "Analysis process failed"),
        }

        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    /// Write a shell script standing in for the analysis script
    fn script(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", body).unwrap();
        file
    }

    #[tokio::test]
    async fn test_streamed_success_receives_positional_args() {
        let file = script(r#"printf '{"cmd":"%s","year":"%s","gp":"%s","session":"%s"}' "$1" "$2" "$3" "$4""#);
        let engine = ProcessEngine::new("sh", file.path());

        let args = vec!["2023".to_string(), "Monza".to_string(), "R".to_string()];
        let value = engine.invoke(EngineCommand::Session, &args).await.unwrap();

        assert_eq!(
            value,
            json!({ "cmd": "session", "year": "2023", "gp": "Monza", "session": "R" })
        );
    }

    #[tokio::test]
    async fn test_blocking_success() {
        let file = script(r#"echo '{"insights": ["ok"]}'"#);
        let engine = ProcessEngine::new("sh", file.path());

        let value = engine.invoke(EngineCommand::RaceInsights, &[]).await.unwrap();
        assert_eq!(value, json!({ "insights": ["ok"] }));
    }

    #[tokio::test]
    async fn test_non_zero_exit_captures_stderr() {
        let file = script("echo 'Error: driver not found' >&2\nexit 1");
        let engine = ProcessEngine::new("sh", file.path());

        for command in [EngineCommand::Telemetry, EngineCommand::BrakeAnalysis] {
            let err = engine.invoke(command, &[]).await.unwrap_err();
            assert_eq!(
                err,
                EngineError::NonZeroExit {
                    code: Some(1),
                    stderr: "Error: driver not found\n".to_string(),
                }
            );
        }
    }

    #[tokio::test]
    async fn test_empty_stdout_is_empty_output() {
        let file = script("echo 'progress only' >&2\nexit 0");
        let engine = ProcessEngine::new("sh", file.path());

        let err = engine.invoke(EngineCommand::Session, &[]).await.unwrap_err();
        assert_eq!(err, EngineError::EmptyOutput);
    }

    #[tokio::test]
    async fn test_log_line_on_stdout_is_malformed() {
        let file = script("echo 'core INFO Loading data'\necho '{}'");
        let engine = ProcessEngine::new("sh", file.path());

        let err = engine.invoke(EngineCommand::WeatherAnalysis, &[]).await.unwrap_err();
        match err {
            EngineError::MalformedOutput { excerpt, .. } => {
                assert!(excerpt.contains("core INFO Loading data"))
            }
            other => panic!("expected MalformedOutput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_failure() {
        let engine = ProcessEngine::new("/nonexistent/python-f1dash", "script.py");

        for command in [EngineCommand::Session, EngineCommand::TireAnalysis] {
            let err = engine.invoke(command, &[]).await.unwrap_err();
            assert_eq!(err.kind(), "SpawnFailure", "{:?}", err);
        }
    }

    #[test]
    fn test_collect_failure_is_io_not_spawn() {
        let err = collect_failure(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe closed",
        ));
        assert_eq!(
            err,
            EngineError::Io {
                reason: "pipe closed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_blocking_mode_collects_stderr_and_stdout() {
        let file = script("echo 'fastf1 progress' >&2\necho '{\"stops\": 2}'");
        let engine = ProcessEngine::new("sh", file.path());

        let value = engine.invoke(EngineCommand::PitStopAnalysis, &[]).await.unwrap();
        assert_eq!(value, json!({ "stops": 2 }));
    }

    #[tokio::test]
    async fn test_blocking_deadline_kills_hung_process() {
        let file = script("sleep 30\necho '{}'");
        let engine =
            ProcessEngine::new("sh", file.path()).with_timeout(Some(Duration::from_millis(200)));

        let err = engine.invoke(EngineCommand::DrsAnalysis, &[]).await.unwrap_err();
        assert_eq!(err, EngineError::Timeout { limit_ms: 200 });
    }

    #[tokio::test]
    async fn test_deadline_kills_hung_process() {
        let file = script("sleep 30\necho '{}'");
        let engine =
            ProcessEngine::new("sh", file.path()).with_timeout(Some(Duration::from_millis(200)));

        let started = Instant::now();
        let err = engine.invoke(EngineCommand::Session, &[]).await.unwrap_err();

        assert_eq!(err, EngineError::Timeout { limit_ms: 200 });
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let file = script(r#"printf '{"cwd":"%s"}' "$(pwd)""#);
        let engine = ProcessEngine::new("sh", file.path()).with_working_dir(dir.path());

        let value = engine.invoke(EngineCommand::GrandPrixList, &[]).await.unwrap();
        let cwd = value["cwd"].as_str().unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(std::path::Path::new(cwd).canonicalize().unwrap(), expected);
    }
}
