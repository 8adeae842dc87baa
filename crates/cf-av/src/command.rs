//! Running ffmpeg-family binaries as child processes.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Lines of stderr kept in a failure message.
const STDERR_TAIL: usize = 5;

/// A single invocation of an external binary.
///
/// Arguments are kept as `OsString` so staging paths are passed through
/// untouched.
///
/// ```no_run
/// use cf_av::ToolCommand;
///
/// # async fn example() -> cf_core::Result<()> {
/// ToolCommand::new("ffmpeg")
///     .args(["-y", "-i", "/tmp/in.webm", "-c", "copy", "/tmp/out.webm"])
///     .run()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
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

    /// Kill the child if it has not exited after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Short name used in logs and errors.
    fn label(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Spawn the process and wait for it. Stdout is discarded.
    ///
    /// A non-zero exit becomes [`cf_core::Error::Tool`] carrying the last
    /// lines of stderr. Exceeding the timeout becomes
    /// [`cf_core::Error::Timeout`] and the child is killed on drop.
    pub async fn run(self) -> cf_core::Result<()> {
        let label = self.label();
        tracing::debug!(tool = %label, args = ?self.args, "spawning");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| cf_core::Error::tool(&label, format!("failed to spawn: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| cf_core::Error::timeout(&label, self.timeout))?
            .map_err(|e| cf_core::Error::tool(&label, format!("wait failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(cf_core::Error::tool(
                label,
                format!("{}: {}", output.status, tail(&stderr, STDERR_TAIL)),
            ));
        }
        Ok(())
    }
}

/// The last `n` non-empty lines of `text`; ffmpeg's banner comes first.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
