//! # Error Types
//!
//! Central error type for the pvrio library. Everything that can fail across
//! the recording pipeline (muxer back-ends, filename generation, charset
//! conversion, persisted-record decoding) funnels into [`PvrError`].
//!
//! Streaming-level conditions (no access, tuning failed, ...) are *not*
//! errors in this sense; they travel as [`crate::streaming::StreamingCode`]
//! values inside streaming messages and subscriber state.

use thiserror::Error;

/// Primary error type for the pvrio library
#[derive(Error, Debug)]
pub enum PvrError {
    /// I/O errors from file or socket operations
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors raised by a muxer back-end
    #[error("muxer error: {0}")]
    Muxer(String),

    /// Unsupported or failed character-set conversion
    #[error("charset error: {0}")]
    Charset(String),

    /// Invalid or malformed input data
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Configuration problems (missing profile, bad storage root, ...)
    #[error("config error: {0}")]
    Config(String),
}

/// A specialized Result type for pvrio operations.
pub type Result<T> = std::result::Result<T, PvrError>;
