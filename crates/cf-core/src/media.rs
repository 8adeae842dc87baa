use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Container formats accepted on upload.
///
/// Stored videos are always [`STORED_CONTAINER`]; other containers are only
/// seen as upload input and get transcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Webm,
    Mp4,
    Mkv,
    Mov,
}

/// The container every stored video is written in.
pub const STORED_CONTAINER: Container = Container::Webm;

impl Container {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Mov => "mov",
        }
    }

    /// MIME type sent as `Content-Type`.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Webm => "video/webm",
            Self::Mp4 => "video/mp4",
            Self::Mkv => "video/x-matroska",
            Self::Mov => "video/quicktime",
        }
    }

    /// Resolve a container from a file name's extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        ext.parse().ok()
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Container {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webm" => Ok(Self::Webm),
            "mp4" | "m4v" => Ok(Self::Mp4),
            "mkv" => Ok(Self::Mkv),
            "mov" => Ok(Self::Mov),
            other => Err(Error::Validation(format!("unsupported container: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// CompileMode
// ---------------------------------------------------------------------------

/// How staged upload chunks are joined into one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileMode {
    /// Byte-for-byte concatenation. Correct for MediaRecorder-style chunks
    /// where only the first chunk carries the container header.
    #[default]
    Append,
    /// ffmpeg concat demuxer; each chunk must be a self-contained file.
    Ffmpeg,
}

impl fmt::Display for CompileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Ffmpeg => write!(f, "ffmpeg"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_container_is_webm() {
        assert_eq!(STORED_CONTAINER.extension(), "webm");
        assert_eq!(STORED_CONTAINER.mime_type(), "video/webm");
    }

    #[test]
    fn container_from_file_name() {
        assert_eq!(Container::from_file_name("clip.webm"), Some(Container::Webm));
        assert_eq!(Container::from_file_name("CLIP.MP4"), Some(Container::Mp4));
        assert_eq!(Container::from_file_name("a.b.mkv"), Some(Container::Mkv));
        assert_eq!(Container::from_file_name("movie.mov"), Some(Container::Mov));
        assert_eq!(Container::from_file_name("notes.txt"), None);
        assert_eq!(Container::from_file_name("noext"), None);
    }

    #[test]
    fn container_serde() {
        let json = serde_json::to_string(&Container::Webm).unwrap();
        assert_eq!(json, r#""webm""#);
        let back: Container = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Container::Webm);
    }

    #[test]
    fn compile_mode_default_and_serde() {
        assert_eq!(CompileMode::default(), CompileMode::Append);
        let mode: CompileMode = serde_json::from_str(r#""ffmpeg""#).unwrap();
        assert_eq!(mode, CompileMode::Ffmpeg);
        assert_eq!(mode.to_string(), "ffmpeg");
    }
}
