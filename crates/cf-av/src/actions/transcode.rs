//! Transcoding uploads into the stored WebM container.

use std::path::Path;

use crate::tools::ToolRegistry;

/// Re-encode `input` as VP9/Opus WebM at `output`.
pub async fn transcode_to_webm(
    tools: &ToolRegistry,
    input: &Path,
    output: &Path,
) -> cf_core::Result<()> {
    let ffmpeg = tools.ffmpeg()?;

    tracing::info!("transcode {:?} -> webm", input);

    ffmpeg
        .arg("-i")
        .arg(input)
        .args([
            "-c:v",
            "libvpx-vp9",
            "-crf",
            "32",
            "-b:v",
            "0",
            "-deadline",
            "realtime",
            "-c:a",
            "libopus",
            "-f",
            "webm",
        ])
        .arg(output)
        .run()
        .await?;

    Ok(())
}
