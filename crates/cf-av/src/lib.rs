//! # cf-av
//!
//! Video compilation and external tool management for the clipforge
//! ingestion pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- child processes bounded by a
//!   timeout.
//! - **Workspace management** ([`Workspace`]) -- staging directory next to
//!   the destination with safe finalization.
//! - **Action functions** ([`actions`]) -- chunk concatenation, remuxing and
//!   transcoding to the stored container.

pub mod actions;
pub mod command;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::ToolCommand;
pub use tools::{Tool, ToolInfo, ToolRegistry};
pub use workspace::{is_staging_name, Workspace};

pub use actions::{append_chunks, concat_with_ffmpeg, remux, transcode_to_webm};
