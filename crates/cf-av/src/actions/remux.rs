//! Container remuxing using ffmpeg.

use std::path::Path;

use crate::tools::ToolRegistry;

/// Rewrite `input` into `output` with `ffmpeg -c copy`.
///
/// Used after byte-level concatenation: MediaRecorder output carries no
/// duration or cues, and a copy pass through the muxer rebuilds them so
/// players can seek.
pub async fn remux(tools: &ToolRegistry, input: &Path, output: &Path) -> cf_core::Result<()> {
    let ffmpeg = tools.ffmpeg()?;

    tracing::info!("remux {:?} -> {:?}", input, output);

    ffmpeg
        .arg("-i")
        .arg(input)
        .args(["-c", "copy"])
        .arg(output)
        .run()
        .await?;

    Ok(())
}
