//! Spawns and streams output from the external `sqlmap`/`xsstrike`-style
//! tools, racing stdout/stderr line reads against a deadline and a
//! cancellation token.
//!
//! Grounded in the teacher's `orchestrator/runner.rs::ClaudeRunner::run_iteration`
//! spawn/stream loop, generalized from a single fixed subprocess invocation
//! to an arbitrary external tool invocation, and with cancellation threaded
//! through via `tokio_util::sync::CancellationToken` (grounded in
//! `other_examples/4e7c7b84_NikkeTryHard-claude-supervisor__src-supervisor-runner.rs.rs`).

use crate::errors::ScanError;
use crate::process::registry::{graceful_signal as send_graceful_signal, ActiveProcessRegistry, ProcessHandle};
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How the external tool should be invoked, resolved ahead of spawn.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// If set, a line matching this pattern on stdout gets an automatic
    /// newline written to stdin (used for version probes that prompt
    /// "press enter to continue").
    pub auto_respond_pattern: Option<Regex>,
    /// Whether a non-zero exit should be retried once, re-invoked as a
    /// shell command (`sh -c "..."` / `cmd /C "..."`). Restricted to
    /// version probes: real scans must fail loudly, not silently retry
    /// under a different invocation shape.
    pub shell_fallback: bool,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            auto_respond_pattern: None,
            shell_fallback: false,
        }
    }
}

/// A line of output captured during `spawn`, tagged by stream.
#[derive(Debug, Clone)]
pub enum ToolOutputLine {
    Stdout(String),
    Stderr(String),
}

/// How a supervised process run ended.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub stopped_by_deadline: bool,
    pub stopped_by_cancel: bool,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        !self.stopped_by_deadline && !self.stopped_by_cancel && self.code == Some(0)
    }
}

/// Spawns tool processes and streams their output, registering each with an
/// `ActiveProcessRegistry` so `Orchestrator::stop()` can terminate every
/// in-flight tool invocation in one call.
pub struct ProcessSupervisor {
    registry: Arc<ActiveProcessRegistry>,
    force_grace_period: Duration,
}

/// Maps a script file extension to the interpreter that should run it,
/// for tools distributed as a raw script rather than a binary on PATH.
fn interpreter_for_extension(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?;
    match ext {
        "py" => Some("python3"),
        "rb" => Some("ruby"),
        "pl" => Some("perl"),
        "sh" => Some("sh"),
        _ => None,
    }
}

/// A bare command name (no path separators) is resolved through the shell
/// on Windows so things like `.cmd`/`.bat` shims and PATHEXT resolution
/// behave the way a user's terminal would; on unix, `Command` already
/// searches PATH correctly for bare names.
fn needs_shell_resolution(program: &str) -> bool {
    cfg!(windows) && !program.contains('/') && !program.contains('\\')
}

/// Resolve a configured tool path into the concrete program/args to spawn,
/// prepending an interpreter for recognized script extensions.
pub fn resolve_invocation(tool_path: &str, rest_args: Vec<String>) -> ToolInvocation {
    if let Some(interpreter) = interpreter_for_extension(tool_path) {
        let mut args = vec![tool_path.to_string()];
        args.extend(rest_args);
        return ToolInvocation::new(interpreter, args);
    }
    ToolInvocation::new(tool_path, rest_args)
}

fn build_command(invocation: &ToolInvocation, as_shell: bool) -> Command {
    if as_shell {
        let joined = std::iter::once(invocation.program.clone())
            .chain(invocation.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C");
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c");
            c
        };
        cmd.arg(joined);
        cmd
    } else if needs_shell_resolution(&invocation.program) {
        build_command(invocation, true)
    } else {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd
    }
}

impl ProcessSupervisor {
    pub fn new(registry: Arc<ActiveProcessRegistry>) -> Self {
        Self {
            registry,
            force_grace_period: Duration::from_secs(3),
        }
    }

    pub fn with_force_grace_period(
        registry: Arc<ActiveProcessRegistry>,
        force_grace_period: Duration,
    ) -> Self {
        Self {
            registry,
            force_grace_period,
        }
    }

    pub fn registry(&self) -> &Arc<ActiveProcessRegistry> {
        &self.registry
    }

    /// Spawn `invocation` under `registry_key`, streaming every stdout/stderr
    /// line to `on_line` until the process exits, `deadline` elapses, or
    /// `cancel` fires. On non-zero exit, if `invocation.shell_fallback` is
    /// set, retries once with the same args run through a shell.
    /// Default grace period between a graceful and a forceful termination
    /// signal, per spec.md §4.1 (300ms; the crawl invocation in
    /// `phase::discovery` overrides this to 5000ms).
    pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(300);

    pub async fn spawn(
        &self,
        registry_key: &str,
        invocation: &ToolInvocation,
        deadline: Duration,
        cancel: &CancellationToken,
        on_line: mpsc::UnboundedSender<ToolOutputLine>,
    ) -> Result<ExitReport, ScanError> {
        self.spawn_with_grace(
            registry_key,
            invocation,
            deadline,
            Self::DEFAULT_GRACE_PERIOD,
            cancel,
            on_line,
        )
        .await
    }

    /// As `spawn`, but with an explicit grace period between the graceful
    /// and forceful termination signals sent on deadline/cancel.
    pub async fn spawn_with_grace(
        &self,
        registry_key: &str,
        invocation: &ToolInvocation,
        deadline: Duration,
        grace_period: Duration,
        cancel: &CancellationToken,
        on_line: mpsc::UnboundedSender<ToolOutputLine>,
    ) -> Result<ExitReport, ScanError> {
        let report = self
            .spawn_once(registry_key, invocation, deadline, grace_period, cancel, &on_line, false)
            .await?;

        if !report.success() && invocation.shell_fallback && report.code.is_some() {
            tracing::warn!(
                tool = %invocation.program,
                "tool exited non-zero; retrying once as a shell command"
            );
            return self
                .spawn_once(registry_key, invocation, deadline, grace_period, cancel, &on_line, true)
                .await;
        }

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn spawn_once(
        &self,
        registry_key: &str,
        invocation: &ToolInvocation,
        deadline: Duration,
        grace_period: Duration,
        cancel: &CancellationToken,
        on_line: &mpsc::UnboundedSender<ToolOutputLine>,
        as_shell: bool,
    ) -> Result<ExitReport, ScanError> {
        let mut command = build_command(invocation, as_shell);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|err| ScanError::ToolInvocationFailed {
            tool: invocation.program.clone(),
            detail: err.to_string(),
        })?;

        let pid = child.id();
        let mut stdin = child.stdin.take();
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let child = Arc::new(tokio::sync::Mutex::new(child));
        self.registry
            .register(registry_key, ProcessHandle::new(child.clone(), pid))
            .await;

        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut report = ExitReport::default();
        let sleep = tokio::time::sleep(deadline);
        tokio::pin!(sleep);

        let exit_code = loop {
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => {
                            if let Some(pattern) = &invocation.auto_respond_pattern {
                                if pattern.is_match(&line) {
                                    if let Some(mut child_stdin) = stdin.take() {
                                        let _ = child_stdin.write_all(b"\n").await;
                                        let _ = child_stdin.shutdown().await;
                                    }
                                }
                            }
                            let _ = on_line.send(ToolOutputLine::Stdout(line));
                        }
                        Ok(None) => stdout_done = true,
                        Err(err) => {
                            tracing::warn!(error = %err, "error reading tool stdout");
                            stdout_done = true;
                        }
                    }
                }
                line = stderr_lines.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => {
                            let _ = on_line.send(ToolOutputLine::Stderr(line));
                        }
                        Ok(None) => stderr_done = true,
                        Err(err) => {
                            tracing::warn!(error = %err, "error reading tool stderr");
                            stderr_done = true;
                        }
                    }
                }
                status = async { child.lock().await.wait().await } => {
                    break status.map(|s| s.code()).unwrap_or(None);
                }
                _ = &mut sleep => {
                    report.stopped_by_deadline = true;
                    break None;
                }
                _ = cancel.cancelled() => {
                    report.stopped_by_cancel = true;
                    break None;
                }
            }
        };

        if report.stopped_by_deadline || report.stopped_by_cancel {
            send_graceful_signal(pid);
            let mut guard = child.lock().await;
            if tokio::time::timeout(grace_period, guard.wait()).await.is_err() {
                let _ = guard.start_kill();
                let _ = tokio::time::timeout(self.force_grace_period, guard.wait()).await;
            }
        }

        self.registry.deregister(registry_key).await;
        report.code = exit_code;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_extension_maps_to_interpreter() {
        assert_eq!(interpreter_for_extension("tools/run.py"), Some("python3"));
        assert_eq!(interpreter_for_extension("tools/run.rb"), Some("ruby"));
        assert_eq!(interpreter_for_extension("sqlmap"), None);
    }

    #[test]
    fn resolve_invocation_prepends_interpreter_for_scripts() {
        let invocation = resolve_invocation("tools/scan.py", vec!["--batch".into()]);
        assert_eq!(invocation.program, "python3");
        assert_eq!(invocation.args, vec!["tools/scan.py", "--batch"]);
    }

    #[test]
    fn resolve_invocation_leaves_plain_binaries_alone() {
        let invocation = resolve_invocation("sqlmap", vec!["-u".into(), "http://t".into()]);
        assert_eq!(invocation.program, "sqlmap");
        assert_eq!(invocation.args, vec!["-u", "http://t"]);
    }

    #[tokio::test]
    async fn spawn_streams_stdout_lines_and_reports_exit_code() {
        let registry = Arc::new(ActiveProcessRegistry::new());
        let supervisor = ProcessSupervisor::new(registry);
        let invocation = ToolInvocation::new("printf", vec!["line-one\nline-two\n".into()]);
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = supervisor
            .spawn("test-key", &invocation, Duration::from_secs(5), &cancel, tx)
            .await
            .unwrap();

        assert_eq!(report.code, Some(0));
        assert!(!report.stopped_by_deadline);
        assert!(!report.stopped_by_cancel);

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            if let ToolOutputLine::Stdout(s) = line {
                lines.push(s);
            }
        }
        assert_eq!(lines, vec!["line-one", "line-two"]);
    }

    #[tokio::test]
    async fn auto_respond_writes_newline_and_closes_stdin() {
        let registry = Arc::new(ActiveProcessRegistry::new());
        let supervisor = ProcessSupervisor::new(registry);
        let script = "printf 'press enter to continue\\n'; IFS= read -r line; \
                      if read -r extra; then echo \"more:$extra\"; else echo stdin-closed; fi";
        let mut invocation = ToolInvocation::new("sh", vec!["-c".to_string(), script.to_string()]);
        invocation.auto_respond_pattern = Some(Regex::new(r"press .* to continue").unwrap());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        supervisor
            .spawn("test-key-auto-respond", &invocation, Duration::from_secs(5), &cancel, tx)
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            if let ToolOutputLine::Stdout(s) = line {
                lines.push(s);
            }
        }
        assert!(lines.contains(&"stdin-closed".to_string()), "lines: {lines:?}");
    }

    #[tokio::test]
    async fn spawn_honors_cancellation() {
        let registry = Arc::new(ActiveProcessRegistry::new());
        let supervisor = ProcessSupervisor::new(registry);
        let invocation = ToolInvocation::new("sleep", vec!["10".into()]);
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let report = supervisor
            .spawn(
                "test-key-cancel",
                &invocation,
                Duration::from_secs(30),
                &cancel,
                tx,
            )
            .await
            .unwrap();

        assert!(report.stopped_by_cancel);
    }
}
