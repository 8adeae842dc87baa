//! Locating the ffmpeg binaries the compile pipeline shells out to.
//!
//! Discovery happens once at startup. Append-mode uploads never touch
//! ffmpeg, so a registry with nothing in it is still a working registry;
//! only the actions that need a binary fail with [`cf_core::Error::Tool`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cf_core::config::ToolsConfig;
use serde::Serialize;

use crate::command::ToolCommand;

/// External binaries clipforge knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::Ffmpeg, Tool::Ffprobe];

    pub fn binary(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }

    fn override_path(self, config: &ToolsConfig) -> Option<&Path> {
        match self {
            Tool::Ffmpeg => config.ffmpeg_path.as_deref(),
            Tool::Ffprobe => config.ffprobe_path.as_deref(),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Availability report for one tool, as shown by `check-tools` and
/// `GET /api/admin/tools`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output.
    pub version: Option<String>,
    #[schema(value_type = Option<String>)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ToolRegistry {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            ffmpeg: None,
            ffprobe: None,
            timeout: Duration::from_secs(ToolsConfig::default().timeout_secs),
        }
    }
}

impl ToolRegistry {
    /// Resolve every [`Tool`], preferring a configured path that exists and
    /// falling back to a `PATH` lookup.
    pub fn discover(config: &ToolsConfig) -> Self {
        let resolve = |tool: Tool| match tool.override_path(config) {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => {
                tracing::warn!(
                    tool = %tool,
                    "configured path {} does not exist, searching PATH",
                    path.display()
                );
                which::which(tool.binary()).ok()
            }
            None => which::which(tool.binary()).ok(),
        };

        Self {
            ffmpeg: resolve(Tool::Ffmpeg),
            ffprobe: resolve(Tool::Ffprobe),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    /// A registry where every tool is missing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn path(&self, tool: Tool) -> Option<&Path> {
        match tool {
            Tool::Ffmpeg => self.ffmpeg.as_deref(),
            Tool::Ffprobe => self.ffprobe.as_deref(),
        }
    }

    /// A command for `tool` with the configured timeout applied.
    pub fn command(&self, tool: Tool) -> cf_core::Result<ToolCommand> {
        let path = self.path(tool).ok_or_else(|| {
            cf_core::Error::tool(
                tool.binary(),
                format!("{tool} not found; install it or set tools.{tool}_path"),
            )
        })?;
        Ok(ToolCommand::new(path).timeout(self.timeout))
    }

    /// Shorthand for `command(Tool::Ffmpeg)` with the flags every action uses.
    pub fn ffmpeg(&self) -> cf_core::Result<ToolCommand> {
        Ok(self.command(Tool::Ffmpeg)?.args(["-y", "-hide_banner"]))
    }

    /// Ask each tool for its version. Blocking; callers on the runtime
    /// should go through `spawn_blocking`.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        Tool::ALL
            .iter()
            .map(|&tool| {
                let path = self.path(tool).map(Path::to_path_buf);
                ToolInfo {
                    name: tool.binary().to_string(),
                    available: path.is_some(),
                    version: path.as_deref().and_then(version_line),
                    path,
                }
            })
            .collect()
    }
}

fn version_line(binary: &Path) -> Option<String> {
    let output = std::process::Command::new(binary)
        .arg("-version")
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_owned)
}
