//! Identifiers for upload sessions and stored videos.
//!
//! [`UploadId`] wraps a `Uuid`. [`VideoId`] is an opaque string:
//! uploads mint UUIDs, but stored files may carry any name that is safe to
//! use as a single path component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Identifier of a chunked upload session.
///
/// Always a v4 UUID; clients echo it back in the path of every chunk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UploadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Maximum accepted length of a [`VideoId`].
const MAX_VIDEO_ID_LEN: usize = 128;

/// Identifier of a stored video.
///
/// Restricted to ASCII alphanumerics, `-` and `_` so it always maps to a
/// single file name inside the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Mint a fresh identifier for a newly ingested video.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VideoId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() || s.len() > MAX_VIDEO_ID_LEN {
            return Err(Error::Validation(format!(
                "video id must be 1..={MAX_VIDEO_ID_LEN} characters"
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(Error::Validation(format!("invalid video id: {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for VideoId {
    type Error = Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

impl From<UploadId> for VideoId {
    fn from(id: UploadId) -> Self {
        Self(id.to_string())
    }
}
