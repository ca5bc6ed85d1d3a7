//! External agent CLI invocation.
//!
//! The agent binary is executed argv-style, never through a shell. The
//! prompt is piped over stdin in batch mode; interactive mode hands the
//! terminal to the agent and only captures stdout. Output is captured into
//! capped buffers so a runaway agent cannot exhaust memory.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::stage::{GenerationRequest, StageExecutor};

/// Default caps for captured output.
pub const STDOUT_CAP_BYTES: usize = 2 * 1024 * 1024;
pub const STDERR_CAP_BYTES: usize = 256 * 1024;

/// How much of the stderr tail is surfaced in error messages.
const STDERR_REPORT_BYTES: usize = 2048;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent binary '{binary}' not found on PATH")]
    MissingBinary { binary: String },

    #[error("failed to spawn agent process '{binary}': {reason}")]
    SpawnFailed { binary: String, reason: String },

    #[error("failed to write prompt to agent stdin: {reason}")]
    StdinWrite { reason: String },

    #[error("agent timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("agent exited with code {code}: {stderr_tail}")]
    ExitedNonZero { code: i32, stderr_tail: String },

    #[error("agent was terminated by a signal")]
    Killed,

    #[error("agent produced non-UTF-8 output")]
    InvalidUtf8,
}

/// Argv-style command description. Arguments are passed straight through to
/// the OS, so agent flags and file paths need no quoting.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn arg_slice(&self) -> &[String] {
        &self.args
    }

    fn to_tokio_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Fixed-capacity capture buffer that keeps the tail of the stream once the
/// cap is reached; the newest output is the diagnostic that matters.
#[derive(Debug)]
pub struct CappedBuffer {
    data: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl CappedBuffer {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            data: Vec::new(),
            cap,
            truncated: false,
        }
    }

    pub fn write(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
        if self.data.len() > self.cap {
            let excess = self.data.len() - self.cap;
            self.data.drain(..excess);
            self.truncated = true;
        }
    }

    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    #[must_use]
    pub fn into_string(self) -> Result<String, AgentError> {
        String::from_utf8(self.data).map_err(|_| AgentError::InvalidUtf8)
    }

    #[must_use]
    pub fn tail_lossy(&self, bytes: usize) -> String {
        let start = self.data.len().saturating_sub(bytes);
        String::from_utf8_lossy(&self.data[start..]).into_owned()
    }
}

/// Raw captured output of one agent invocation.
#[derive(Debug)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr_tail: String,
}

/// Run a command in batch mode: prompt over stdin, stdout/stderr captured
/// with caps, optional timeout with process kill.
pub async fn run_batch(
    spec: &CommandSpec,
    stdin_content: &str,
    limit: Option<Duration>,
) -> Result<CapturedOutput, AgentError> {
    let mut cmd = spec.to_tokio_command();
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the child on timeout must take the process with it.
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| AgentError::SpawnFailed {
        binary: spec.program().to_string(),
        reason: e.to_string(),
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(stdin_content.as_bytes())
            .await
            .map_err(|e| AgentError::StdinWrite {
                reason: e.to_string(),
            })?;
        drop(stdin);
    }

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| AgentError::SpawnFailed {
        binary: spec.program().to_string(),
        reason: "failed to capture stdout".to_string(),
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| AgentError::SpawnFailed {
        binary: spec.program().to_string(),
        reason: "failed to capture stderr".to_string(),
    })?;

    let mut stdout_buffer = CappedBuffer::new(STDOUT_CAP_BYTES);
    let mut stderr_buffer = CappedBuffer::new(STDERR_CAP_BYTES);

    let wait_future = async {
        let mut stdout_chunk = vec![0u8; 8192];
        let mut stderr_chunk = vec![0u8; 8192];
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                read = stdout_pipe.read(&mut stdout_chunk), if !stdout_done => {
                    match read {
                        Ok(0) => stdout_done = true,
                        Ok(n) => stdout_buffer.write(&stdout_chunk[..n]),
                        Err(e) => {
                            return Err(AgentError::SpawnFailed {
                                binary: String::new(),
                                reason: format!("failed to read stdout: {e}"),
                            });
                        }
                    }
                }
                read = stderr_pipe.read(&mut stderr_chunk), if !stderr_done => {
                    match read {
                        Ok(0) => stderr_done = true,
                        Ok(n) => stderr_buffer.write(&stderr_chunk[..n]),
                        Err(e) => {
                            return Err(AgentError::SpawnFailed {
                                binary: String::new(),
                                reason: format!("failed to read stderr: {e}"),
                            });
                        }
                    }
                }
            }
        }

        child.wait().await.map_err(|e| AgentError::SpawnFailed {
            binary: String::new(),
            reason: format!("failed to wait for agent: {e}"),
        })
    };

    let status = match limit {
        Some(duration) => match timeout(duration, wait_future).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AgentError::Timeout {
                    timeout_secs: duration.as_secs(),
                });
            }
        },
        None => wait_future.await?,
    };

    if stdout_buffer.truncated() {
        warn!("agent stdout exceeded {STDOUT_CAP_BYTES} bytes; head truncated");
    }

    let stderr_tail = stderr_buffer.tail_lossy(STDERR_REPORT_BYTES);
    if !status.success() {
        return match status.code() {
            Some(code) => Err(AgentError::ExitedNonZero { code, stderr_tail }),
            None => Err(AgentError::Killed),
        };
    }

    Ok(CapturedOutput {
        stdout: stdout_buffer.into_string()?,
        stderr_tail,
    })
}

/// Run a command interactively: stdin and stderr inherited so a human can
/// drive the session, stdout still captured for the artifact. No timeout.
pub async fn run_interactive(spec: &CommandSpec) -> Result<CapturedOutput, AgentError> {
    let mut cmd = spec.to_tokio_command();
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|e| AgentError::SpawnFailed {
        binary: spec.program().to_string(),
        reason: e.to_string(),
    })?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| AgentError::SpawnFailed {
        binary: spec.program().to_string(),
        reason: "failed to capture stdout".to_string(),
    })?;

    let mut stdout_buffer = CappedBuffer::new(STDOUT_CAP_BYTES);
    let mut chunk = vec![0u8; 8192];
    loop {
        match stdout_pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => stdout_buffer.write(&chunk[..n]),
            Err(e) => {
                return Err(AgentError::SpawnFailed {
                    binary: spec.program().to_string(),
                    reason: format!("failed to read stdout: {e}"),
                });
            }
        }
    }

    let status = child.wait().await.map_err(|e| AgentError::SpawnFailed {
        binary: spec.program().to_string(),
        reason: format!("failed to wait for agent: {e}"),
    })?;

    if !status.success() {
        return match status.code() {
            Some(code) => Err(AgentError::ExitedNonZero {
                code,
                stderr_tail: String::new(),
            }),
            None => Err(AgentError::Killed),
        };
    }

    Ok(CapturedOutput {
        stdout: stdout_buffer.into_string()?,
        stderr_tail: String::new(),
    })
}

/// Production [`StageExecutor`] backed by the configured agent CLI.
pub struct AgentInvoker {
    config: AgentConfig,
    stage_timeout: Option<Duration>,
}

impl AgentInvoker {
    #[must_use]
    pub fn new(config: AgentConfig, stage_timeout: Option<Duration>) -> Self {
        Self {
            config,
            stage_timeout,
        }
    }

    /// Verify the agent binary is reachable before any stage runs.
    pub fn preflight(&self) -> Result<Utf8PathBuf, AgentError> {
        let resolved =
            which::which(&self.config.binary).map_err(|_| AgentError::MissingBinary {
                binary: self.config.binary.clone(),
            })?;
        Utf8PathBuf::from_path_buf(resolved).map_err(|p| AgentError::SpawnFailed {
            binary: self.config.binary.clone(),
            reason: format!("agent path is not valid UTF-8: {}", p.display()),
        })
    }

    /// Common flags for either mode. The settings and MCP config files are
    /// forwarded verbatim.
    fn base_spec(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.config.binary);
        if let Some(model) = &self.config.model {
            spec = spec.args(["--model", model.as_str()]);
        }
        if let Some(settings) = &self.config.settings_file {
            spec = spec.args(["--settings", settings.as_str()]);
        }
        if let Some(mcp) = &self.config.mcp_config {
            spec = spec.args(["--mcp-config", mcp.as_str()]);
        }
        spec.args(self.config.extra_args.iter().cloned())
    }

    fn batch_spec(&self) -> CommandSpec {
        self.base_spec().args(["--print", "--output-format", "text"])
    }

    fn interactive_spec(&self, prompt: &str) -> CommandSpec {
        self.base_spec().arg(prompt)
    }
}

#[async_trait]
impl StageExecutor for AgentInvoker {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        let output = if request.interactive {
            let spec = self.interactive_spec(&request.prompt);
            debug!(stage = %request.stage, program = spec.program(), "starting interactive agent session");
            run_interactive(&spec).await?
        } else {
            let spec = self.batch_spec();
            debug!(
                stage = %request.stage,
                program = spec.program(),
                prompt_bytes = request.prompt.len(),
                "invoking agent"
            );
            run_batch(&spec, &request.prompt, self.stage_timeout).await?
        };

        if !output.stderr_tail.trim().is_empty() {
            debug!(stage = %request.stage, stderr = %output.stderr_tail, "agent stderr");
        }
        Ok(output.stdout)
    }
}
