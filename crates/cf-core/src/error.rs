//! The error type shared by every clipforge crate.
//!
//! Handlers turn an [`Error`] into a response with [`Error::http_status`] and
//! its `Display` text, so messages here are written for API clients.

use std::fmt;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `id` is kept for logs only; the message is sent to clients as is.
    #[error("{entity} not found")]
    NotFound {
        /// "Video" or "Upload".
        entity: String,
        id: String,
    },

    /// A byte range falls outside the resource or is malformed.
    #[error("Range not satisfiable: {range} (resource is {size} bytes)")]
    InvalidRange {
        range: String,
        size: u64,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    /// A request body or upload exceeded a configured limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// ffmpeg could not be run or exited non-zero.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        tool: String,
        message: String,
    },

    /// An external HTTP service (transcription provider, queue) failed.
    #[error("Upstream error [{service}]: {message}")]
    Upstream {
        service: String,
        message: String,
    },

    /// A bounded operation did not finish in time.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status code a handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::InvalidRange { .. } => 416,
            Error::Validation(_) => 400,
            Error::PayloadTooLarge(_) => 413,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Upstream { .. } => 502,
            Error::Timeout { .. } => 504,
            Error::Internal(_) => 500,
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn invalid_range(range: impl Into<String>, size: u64) -> Self {
        Error::InvalidRange {
            range: range.into(),
            size,
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
