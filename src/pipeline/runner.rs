//! Process runner: start an external tool, feed it, bound it, classify it.
//!
//! Every subprocess the pipeline starts goes through [`ProcessRunner::run`]:
//!
//! * stderr is always captured; stdout is captured or redirected to a file
//! * the exit code is checked against an explicit allow-list
//! * a timeout kills the child (`kill_on_drop`) instead of orphaning it
//! * failures become [`PipelineError::ProcessFailure`] carrying the command
//!   line and up to [`crate::error::STDERR_LIMIT`] bytes of stderr
//!
//! There is no retry here. Whether a failed page or document is worth running
//! again is the caller's call.
//!
//! Tool availability is resolved once, up front, by [`ToolSet::resolve`] so a
//! missing `tesseract` is reported by name before any PDF is touched.

use crate::config::OcrConfig;
use crate::error::{truncate_stderr, FailureReason, PipelineError};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// An external executable whose location has been confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    name: String,
    path: PathBuf,
}

impl Tool {
    /// Locate `name` on `search_path` (a `PATH`-style list). Names containing
    /// a directory component are checked as given.
    pub fn resolve(name: &str, search_path: Option<&OsStr>) -> Result<Self, PipelineError> {
        match find_executable(name, search_path) {
            Some(path) => {
                debug!("Resolved tool {} → {}", name, path.display());
                Ok(Self {
                    name: name.to_string(),
                    path,
                })
            }
            None => Err(missing_binary(name)),
        }
    }

    /// Name as configured (e.g. `"pdftoppm"`), used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The two tools the OCR engine drives.
#[derive(Debug, Clone)]
pub struct ToolSet {
    pub raster: Tool,
    pub recognition: Tool,
}

impl ToolSet {
    /// Resolve both tools named in `config`, failing on the first missing one.
    pub fn resolve(config: &OcrConfig, search_path: Option<&OsStr>) -> Result<Self, PipelineError> {
        Ok(Self {
            raster: Tool::resolve(&config.raster_tool, search_path)?,
            recognition: Tool::resolve(&config.recognition_tool, search_path)?,
        })
    }
}

/// Search `search_path` for an executable file called `name`.
pub fn find_executable(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let dirs = search_path?;
    std::env::split_paths(dirs).find_map(|dir| {
        let full = dir.join(name);
        if is_executable(&full) {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{name}.exe"));
            if is_executable(&exe) {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn missing_binary(name: &str) -> PipelineError {
    let tool = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let hint = match tool.as_str() {
        "pdftoppm" => "Install poppler (Debian/Ubuntu: apt install poppler-utils, macOS: brew install poppler).",
        "tesseract" => "Install tesseract (Debian/Ubuntu: apt install tesseract-ocr, macOS: brew install tesseract).",
        _ => "Install it or point the configuration at its full path.",
    };
    PipelineError::MissingBinary {
        tool,
        hint: hint.to_string(),
    }
}

/// Where a child's standard output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget {
    /// Collect into [`ProcessOutput::stdout`].
    Capture,
    /// Redirect into a file created (or truncated) before spawning.
    File(PathBuf),
}

/// One command to run. Built with chained setters, consumed by [`ProcessRunner::run`].
#[derive(Debug)]
pub struct Invocation<'a> {
    tool: &'a Tool,
    args: Vec<OsString>,
    stdin: Option<&'a [u8]>,
    stdout: StdoutTarget,
    current_dir: Option<&'a Path>,
    allowed_exit_codes: &'a [i32],
}

impl<'a> Invocation<'a> {
    pub fn new(tool: &'a Tool) -> Self {
        Self {
            tool,
            args: Vec::new(),
            stdin: None,
            stdout: StdoutTarget::Capture,
            current_dir: None,
            allowed_exit_codes: &[0],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Bytes written to the child's stdin, which is then closed.
    pub fn stdin(mut self, bytes: &'a [u8]) -> Self {
        self.stdin = Some(bytes);
        self
    }

    pub fn stdout_to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = StdoutTarget::File(path.into());
        self
    }

    pub fn current_dir(mut self, dir: &'a Path) -> Self {
        self.current_dir = Some(dir);
        self
    }

    /// Exit codes treated as success. Default: `[0]`.
    pub fn allow_exit_codes(mut self, codes: &'a [i32]) -> Self {
        self.allowed_exit_codes = codes;
        self
    }

    /// Shell-like rendering used in logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.tool.name().to_string())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Captured stdout; empty when stdout went to a file.
    pub stdout: Vec<u8>,
    /// Decoded (lossy) and truncated stderr.
    pub stderr: String,
    pub exit_code: i32,
}

/// Runs [`Invocation`]s with a fixed timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the invocation to completion.
    ///
    /// # Errors
    /// - [`PipelineError::MissingBinary`] if the executable vanished since it
    ///   was resolved
    /// - [`PipelineError::ProcessFailure`] for spawn errors, disallowed exit
    ///   codes, signals and timeouts
    pub async fn run(&self, invocation: Invocation<'_>) -> Result<ProcessOutput, PipelineError> {
        let command_line = invocation.command_line();
        debug!("Executing command: {}", command_line);

        let mut cmd = Command::new(invocation.tool.path());
        cmd.args(&invocation.args)
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if invocation.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        match invocation.stdout {
            StdoutTarget::Capture => {
                cmd.stdout(Stdio::piped());
            }
            StdoutTarget::File(ref path) => {
                let file = std::fs::File::create(path).map_err(|e| PipelineError::ProcessFailure {
                    command: command_line.clone(),
                    reason: FailureReason::Spawn(format!(
                        "cannot create output file {}: {e}",
                        path.display()
                    )),
                    stderr: String::new(),
                })?;
                cmd.stdout(Stdio::from(file));
            }
        }

        if let Some(dir) = invocation.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => missing_binary(invocation.tool.name()),
            _ => PipelineError::ProcessFailure {
                command: command_line.clone(),
                reason: FailureReason::Spawn(e.to_string()),
                stderr: String::new(),
            },
        })?;

        let stdin_pipe = child.stdin.take();
        let input = invocation.stdin;
        let feed = async move {
            if let (Some(mut pipe), Some(bytes)) = (stdin_pipe, input) {
                // A tool may exit before reading all input; its exit status
                // decides success, not the broken pipe.
                if let Err(e) = pipe.write_all(bytes).await {
                    debug!("stdin write ended early: {}", e);
                }
            }
        };

        let waited = tokio::time::timeout(self.timeout, async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        })
        .await;

        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(PipelineError::ProcessFailure {
                    command: command_line,
                    reason: FailureReason::Spawn(format!("wait failed: {e}")),
                    stderr: String::new(),
                })
            }
            Err(_) => {
                debug!("Command {} timed out after {:?}", command_line, self.timeout);
                return Err(PipelineError::ProcessFailure {
                    command: command_line,
                    reason: FailureReason::TimedOut {
                        secs: self.timeout.as_secs().max(1),
                    },
                    stderr: String::new(),
                });
            }
        };

        let stderr = truncate_stderr(&output.stderr);
        match output.status.code() {
            Some(code) if invocation.allowed_exit_codes.contains(&code) => Ok(ProcessOutput {
                stdout: output.stdout,
                stderr,
                exit_code: code,
            }),
            Some(code) => {
                debug!(
                    "Command {} returned {} (stderr: {})",
                    command_line,
                    code,
                    if stderr.is_empty() { "<empty>" } else { stderr.trim() }
                );
                Err(PipelineError::ProcessFailure {
                    command: command_line,
                    reason: FailureReason::ExitCode(code),
                    stderr,
                })
            }
            None => Err(PipelineError::ProcessFailure {
                command: command_line,
                reason: FailureReason::Terminated,
                stderr,
            }),
        }
    }
}
