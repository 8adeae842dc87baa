//! Staging workspace for compile operations.
//!
//! A [`Workspace`] provides a temporary directory for intermediate files,
//! created next to the final destination so finalization is a same-filesystem
//! rename. Dropping an unfinalized workspace removes everything it staged.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Prefix of staging directories; never a valid video file name.
const STAGING_PREFIX: &str = ".staging-";

/// Workspace for producing one output file.
///
/// # Example
///
/// ```no_run
/// use cf_av::Workspace;
///
/// let workspace = Workspace::new(std::path::Path::new("/srv/uploads/abc.webm")).unwrap();
/// // ... write the compiled file to workspace.output() ...
/// workspace.finalize().unwrap();
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
    dest_path: PathBuf,
}

impl Workspace {
    /// Create a workspace whose output will land at `dest`.
    ///
    /// The staging directory is created inside `dest`'s parent directory,
    /// which must already exist.
    pub fn new(dest: &Path) -> cf_core::Result<Self> {
        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let temp_dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| {
                cf_core::Error::tool("workspace", format!("failed to create temp dir: {e}"))
            })?;

        Ok(Self {
            temp_dir,
            dest_path: dest.to_path_buf(),
        })
    }

    /// The final destination path.
    pub fn dest(&self) -> &Path {
        &self.dest_path
    }

    /// The output file path (same filename as the destination, inside the
    /// temp dir).
    pub fn output(&self) -> PathBuf {
        let file_name = self
            .dest_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("output"));
        self.temp_dir.path().join(file_name)
    }

    /// Path to the temporary directory.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a path for a named temporary file inside the workspace.
    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Move the output file to the destination and return the final path.
    ///
    /// An existing destination is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the output file does not exist, the destination
    /// is already taken, or the move fails.
    pub fn finalize(self) -> cf_core::Result<PathBuf> {
        let output = self.output();
        let dest = &self.dest_path;

        if !output.exists() {
            return Err(cf_core::Error::tool(
                "workspace",
                format!("output file does not exist: {}", output.display()),
            ));
        }

        if dest.exists() {
            return Err(cf_core::Error::tool(
                "workspace",
                format!("destination already exists: {}", dest.display()),
            ));
        }

        // Try rename first (same filesystem), fall back to copy+remove.
        if let Err(_rename_err) = std::fs::rename(&output, dest) {
            std::fs::copy(&output, dest).map_err(|e| {
                cf_core::Error::tool(
                    "workspace",
                    format!("failed to copy output to destination: {e}"),
                )
            })?;
            let _ = std::fs::remove_file(&output);
        }

        Ok(dest.clone())
    }
}

/// Whether a directory entry name belongs to a staging workspace.
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}
