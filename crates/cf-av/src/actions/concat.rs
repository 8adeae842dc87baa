//! Joining staged upload chunks into a single file.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::tools::ToolRegistry;
use crate::workspace::Workspace;

/// Concatenate `chunks` byte-for-byte, in order, into `output`.
///
/// Returns the number of bytes written.
pub async fn append_chunks(chunks: &[PathBuf], output: &Path) -> cf_core::Result<u64> {
    if chunks.is_empty() {
        return Err(cf_core::Error::Validation("no chunks to compile".into()));
    }

    let mut writer = BufWriter::new(File::create(output).await?);
    let mut total = 0u64;

    for chunk in chunks {
        let mut reader = File::open(chunk).await?;
        total += tokio::io::copy(&mut reader, &mut writer).await?;
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;

    tracing::debug!(chunks = chunks.len(), bytes = total, "Appended chunks to {:?}", output);
    Ok(total)
}

/// Join self-contained media files with the ffmpeg concat demuxer.
///
/// Streams are copied, not re-encoded, so every input must share codecs. The
/// result is written to the workspace output path.
pub async fn concat_with_ffmpeg(
    workspace: &Workspace,
    tools: &ToolRegistry,
    chunks: &[PathBuf],
) -> cf_core::Result<()> {
    if chunks.is_empty() {
        return Err(cf_core::Error::Validation("no chunks to compile".into()));
    }

    let ffmpeg = tools.ffmpeg()?;

    let list_path = workspace.temp_file("concat.txt");
    tokio::fs::write(&list_path, concat_list(chunks)).await?;

    let output = workspace.output();
    tracing::info!("ffmpeg concat of {} chunks -> {:?}", chunks.len(), output);

    ffmpeg
        .args(["-f", "concat", "-safe", "0", "-i"])
        .arg(&list_path)
        .args(["-c", "copy"])
        .arg(output)
        .run()
        .await?;

    Ok(())
}

/// Render a concat demuxer list. Single quotes in paths are escaped the way
/// the demuxer expects (`'\''`).
fn concat_list(chunks: &[PathBuf]) -> String {
    chunks
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', r"'\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}
