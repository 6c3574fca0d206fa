//! Subprocess-based transport implementation
//!
//! This module provides [`SubprocessCLITransport`], which spawns the `claude` CLI
//! for a single prompt and turns its stdout into a stream of [`Message`]s.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::discovery::CliDiscovery;
use super::lines::{BoundedLineReader, LineRead};
use super::stderr::{self, StderrBuffer};
use super::{StreamLimits, Transport};
use crate::error::{ClawError, ParseErrorKind};
use crate::messages::Message;
use crate::options::QueryOptions;
use crate::parser;

/// Value of `CLAUDE_CODE_ENTRYPOINT` identifying this SDK to the CLI
pub const ENTRYPOINT: &str = "sdk-rust";

/// Environment applied after the caller's overrides
const ENV_OVERRIDES: [(&str, &str); 3] = [
    ("CLAUDE_CODE_ENTRYPOINT", ENTRYPOINT),
    ("FORCE_COLOR", "0"),
    ("NODE_ENV", "production"),
];

/// The running child and any pipes not yet handed to the reader
struct ProcessHandle {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

/// State shared between the transport and its producer task
#[derive(Default)]
struct Shared {
    /// `take()` on this slot is what makes teardown run exactly once
    process: Mutex<Option<ProcessHandle>>,
    connected: AtomicBool,
}

/// How the stdout loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Eof,
    ReadFailed,
    Cancelled,
    ConsumerGone,
}

/// Transport implementation that spawns Claude CLI as a subprocess
///
/// # Process Lifecycle
///
/// 1. **Connection** - Spawn the CLI with piped stdio; stdin is closed at once
/// 2. **Streaming** - A producer task reads stdout line by line while a nested
///    task drains stderr into a bounded buffer
/// 3. **Completion** - After stdout EOF the producer collects stderr, reaps the
///    process and reports a non-zero exit as a final diagnostic message
/// 4. **Shutdown** - SIGINT, then SIGKILL after [`StreamLimits::shutdown_grace`]
///
/// # Example
///
/// ```no_run
/// use claw_stream::options::QueryOptions;
/// use claw_stream::transport::{SubprocessCLITransport, Transport};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), claw_stream::error::ClawError> {
/// let options = QueryOptions::builder().max_turns(1).build();
/// let mut transport = SubprocessCLITransport::new();
/// transport.connect(&options, "Say hi").await?;
/// assert!(transport.is_ready());
///
/// let mut rx = transport.receive_messages(CancellationToken::new()).await?;
/// while let Some(message) = rx.recv().await {
///     println!("{}", message.message_type());
/// }
/// transport.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct SubprocessCLITransport {
    shared: Arc<Shared>,
    limits: StreamLimits,
    pid: Option<u32>,
    /// Cancels the producer; a child of the caller's token
    stop: Option<CancellationToken>,
    producer: Option<JoinHandle<Result<(), ClawError>>>,
}

impl Default for SubprocessCLITransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SubprocessCLITransport {
    /// Create a disconnected transport with default [`StreamLimits`]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            limits: StreamLimits::default(),
            pid: None,
            stop: None,
            producer: None,
        }
    }

    /// Replace the resource bounds used for the next session
    pub fn with_limits(mut self, limits: StreamLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Process ID of the spawned CLI, once connected
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Build the command for `cli_path`, without spawning it
    fn build_command(
        cli_path: &Path,
        options: &QueryOptions,
        prompt: &str,
    ) -> Result<Command, ClawError> {
        let mut cmd = Command::new(cli_path);
        cmd.args(options.to_cli_args(prompt))
            .envs(&options.env)
            .envs(ENV_OVERRIDES)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &options.cwd {
            if !cwd.is_dir() {
                return Err(ClawError::connection(
                    format!("Working directory does not exist: {}", cwd.display()),
                    None,
                ));
            }
            cmd.current_dir(cwd);
        }

        Ok(cmd)
    }

    /// Map a spawn failure to the error the caller can act on
    fn spawn_error(cli_path: &Path, err: std::io::Error) -> ClawError {
        if cli_path.file_name().is_some_and(|name| name == "claude") {
            ClawError::CliNotFound {
                path: cli_path.to_path_buf(),
                source: Some(err),
            }
        } else {
            ClawError::process("Failed to start Claude CLI process", 0, "", Some(err))
        }
    }
}

#[async_trait]
impl Transport for SubprocessCLITransport {
    async fn connect(&mut self, options: &QueryOptions, prompt: &str) -> Result<(), ClawError> {
        // Checked before locking: the producer holds the slot while reaping.
        if self.producer.is_some() {
            return Err(ClawError::connection("already connected", None));
        }
        let mut slot = self.shared.process.lock().await;
        if slot.is_some() {
            return Err(ClawError::connection("already connected", None));
        }

        let cli_path: PathBuf = match &options.cli_path {
            Some(path) => path.clone(),
            None => CliDiscovery::find()?,
        };
        let mut cmd = Self::build_command(&cli_path, options, prompt)?;

        debug!("Spawning CLI: {}", cli_path.display());
        let mut child = cmd
            .spawn()
            .map_err(|e| Self::spawn_error(&cli_path, e))?;
        debug!("Process spawned with pid: {:?}", child.id());

        // One-shot prompt: nothing is ever written to stdin
        drop(child.stdin.take());

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.start_kill();
            return Err(ClawError::connection("failed to capture stdout/stderr", None));
        };

        self.pid = child.id();
        *slot = Some(ProcessHandle {
            child,
            stdout: Some(stdout),
            stderr: Some(stderr),
        });
        self.shared.connected.store(true, Ordering::SeqCst);
        debug!("Connection established");

        Ok(())
    }

    async fn receive_messages(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Message>, ClawError> {
        let (stdout, stderr) = {
            let mut slot = self.shared.process.lock().await;
            let handle = slot
                .as_mut()
                .ok_or_else(|| ClawError::connection("not connected", None))?;
            let stdout = handle
                .stdout
                .take()
                .ok_or_else(|| ClawError::connection("already receiving messages", None))?;
            (stdout, handle.stderr.take())
        };

        let stop = cancel.child_token();
        let (tx, rx) = mpsc::channel(self.limits.channel_capacity.max(1));

        let producer = Producer {
            shared: self.shared.clone(),
            limits: self.limits,
            tx,
            cancel: stop.clone(),
        };
        self.stop = Some(stop);
        self.producer = Some(tokio::spawn(producer.run(stdout, stderr)));

        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<(), ClawError> {
        let mut first_err: Option<ClawError> = None;

        if let Some(stop) = &self.stop {
            stop.cancel();
        }

        if let Some(producer) = self.producer.take() {
            match producer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => first_err = Some(e),
                Err(e) => error!("Producer task failed: {}", e),
            }
        }

        if let Err(e) = terminate(&self.shared, self.limits.shutdown_grace).await {
            first_err.get_or_insert(e);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn is_ready(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SubprocessCLITransport {
    fn drop(&mut self) {
        // The producer tears the process down once cancelled; a process that was
        // never streamed is reaped by `kill_on_drop` when the slot is dropped.
        if let Some(stop) = &self.stop {
            stop.cancel();
        }
        debug!("SubprocessCLITransport dropped");
    }
}

/// Background task reading stdout into the message channel
struct Producer {
    shared: Arc<Shared>,
    limits: StreamLimits,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl Producer {
    async fn run(self, stdout: ChildStdout, stderr: Option<ChildStderr>) -> Result<(), ClawError> {
        let stderr_buffer = Arc::new(Mutex::new(StderrBuffer::default()));
        let stderr_task = stderr.map(|pipe| {
            stderr::spawn_collector(pipe, stderr_buffer.clone(), self.limits.max_stderr_bytes)
        });

        let end = self.stream_stdout(stdout).await;
        debug!("Stdout reader finished: {:?}", end);

        if end == StreamEnd::Eof {
            self.report_exit(stderr_task, &stderr_buffer).await;
        } else if let Some(task) = stderr_task {
            task.abort();
        }

        let result = terminate(&self.shared, self.limits.shutdown_grace).await;
        if let Err(e) = &result {
            error!("Cleanup after stream failed: {}", e);
        }

        // `self.tx` drops here, so the channel closes only after cleanup.
        result
    }

    async fn stream_stdout(&self, stdout: ChildStdout) -> StreamEnd {
        let mut reader = BoundedLineReader::new(BufReader::new(stdout), self.limits.max_line_bytes);
        let mut skipped = 0usize;

        let end = loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => break StreamEnd::Cancelled,
                _ = self.tx.closed() => break StreamEnd::ConsumerGone,
                line = reader.next_line() => line,
            };

            let message = match line {
                Ok(None) => break StreamEnd::Eof,
                Err(e) => {
                    warn!("Stdout read failed: {}", e);
                    let diagnostic = Message::user(format!("Stdout read error: {e}"));
                    // The loop ends either way; delivery is best effort.
                    let _ = self.deliver(diagnostic).await;
                    break StreamEnd::ReadFailed;
                }
                Ok(Some(LineRead::TooLong { observed_bytes, max_line_bytes })) => {
                    warn!(
                        "Dropping stdout line of {} bytes (limit {})",
                        observed_bytes, max_line_bytes
                    );
                    Message::user(format!(
                        "JSON message exceeded maximum buffer size of {max_line_bytes} bytes"
                    ))
                }
                Ok(Some(LineRead::Line(bytes))) => match decode_line(&bytes) {
                    LineOutcome::Blank => continue,
                    LineOutcome::Skipped(err) => {
                        skipped += 1;
                        debug!("Skipping stdout line: {}", err);
                        continue;
                    }
                    LineOutcome::Control => {
                        trace!("Discarding control_response");
                        continue;
                    }
                    LineOutcome::Message(message) => message,
                },
            };

            if let Err(end) = self.deliver(message).await {
                break end;
            }
        };

        if skipped > 0 {
            warn!("Skipped {} stdout lines that were not JSON objects", skipped);
        }
        end
    }

    /// Send with backpressure, giving up on cancellation or a dropped receiver
    async fn deliver(&self, message: Message) -> Result<(), StreamEnd> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamEnd::Cancelled),
            sent = self.tx.send(message) => sent.map_err(|_| StreamEnd::ConsumerGone),
        }
    }

    /// Collect stderr, reap the process and surface a non-zero exit
    async fn report_exit(&self, stderr_task: Option<JoinHandle<()>>, buffer: &Mutex<StderrBuffer>) {
        let stderr_text = match stderr_task {
            Some(task) => {
                let collector = task.abort_handle();
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        collector.abort();
                        return;
                    }
                    text = stderr::finish(task, buffer, self.limits.stderr_timeout) => text,
                }
            }
            None => String::new(),
        };

        let status = {
            let mut slot = self.shared.process.lock().await;
            let Some(handle) = slot.as_mut() else {
                return;
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                status = handle.child.wait() => status,
            }
        };

        let code = match status {
            Ok(status) => exit_code(status),
            Err(e) => {
                error!("Failed to wait for CLI process: {}", e);
                return;
            }
        };
        debug!("Process exited with code {}", code);

        if code != 0 {
            let diagnostic =
                Message::user(format!("Process failed with exit code {code}: {stderr_text}"));
            let _ = self.deliver(diagnostic).await;
        }
    }
}

enum LineOutcome {
    Blank,
    Skipped(ClawError),
    Control,
    Message(Message),
}

/// Classify one stdout line
fn decode_line(bytes: &[u8]) -> LineOutcome {
    let trimmed = bytes.trim_ascii();
    if trimmed.is_empty() {
        return LineOutcome::Blank;
    }

    trace!("Received line: {}", String::from_utf8_lossy(trimmed));

    let value: Value = match serde_json::from_slice(trimmed) {
        Ok(value) => value,
        Err(source) => {
            return LineOutcome::Skipped(ClawError::JsonDecode {
                raw: String::from_utf8_lossy(trimmed).into_owned(),
                source,
            });
        }
    };

    // Scalars and arrays are stray output, not protocol messages. `null` goes
    // on to the parser and surfaces as a diagnostic.
    if !value.is_object() && !value.is_null() {
        return LineOutcome::Skipped(ClawError::parse(
            ParseErrorKind::MissingField,
            "stdout line is not a JSON object",
            &value,
        ));
    }

    if parser::is_control_response(&value) {
        return LineOutcome::Control;
    }

    match parser::parse_message(&value) {
        Ok(message) => LineOutcome::Message(message),
        Err(e) => LineOutcome::Message(Message::user(format!("Parse error: {e}"))),
    }
}

/// Exit code, or -1 when the process was killed by a signal
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Tear the process down once: SIGINT, wait, then SIGKILL
async fn terminate(shared: &Shared, grace: Duration) -> Result<(), ClawError> {
    let taken = shared.process.lock().await.take();
    let Some(handle) = taken else {
        return Ok(());
    };
    shared.connected.store(false, Ordering::SeqCst);

    let ProcessHandle { mut child, stdout, stderr } = handle;
    drop(stdout);
    drop(stderr);

    if let Ok(Some(status)) = child.try_wait() {
        debug!("Process already exited: {:?}", status);
        return Ok(());
    }

    if !interrupt(&child) {
        debug!("Interrupt unavailable, killing process");
        return child.kill().await.map_err(ClawError::Io);
    }

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!("Process exited after SIGINT: {:?}", status);
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Error waiting for process after SIGINT: {}", e);
            let _ = child.start_kill();
            Err(ClawError::Io(e))
        }
        Err(_) => {
            warn!("Process did not exit within {:?}, sending SIGKILL", grace);
            child.kill().await.map_err(ClawError::Io)
        }
    }
}

/// Send SIGINT; `false` when the signal could not be delivered
#[cfg(unix)]
fn interrupt(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    debug!("Sending SIGINT to pid {}", pid);
    match kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send SIGINT to pid {}: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) -> bool {
    false
}
