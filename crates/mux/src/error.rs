//! Muxer error types.

use thiserror::Error;

/// Errors that can occur while writing the MP4 container.
#[derive(Error, Debug)]
pub enum MuxError {
    /// I/O error during file write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation was issued outside the add-track → start → write →
    /// stop lifecycle.
    #[error("invalid muxer state: {0}")]
    InvalidState(String),

    /// Invalid muxer configuration.
    #[error("invalid muxer config: {0}")]
    InvalidConfig(String),

    /// Unknown or missing track.
    #[error("track error: {0}")]
    Track(String),

    /// A box grew past what its size field can represent.
    #[error("box size {0} exceeds 32-bit limit")]
    Oversize(u64),
}

/// Convenience Result type for mux operations.
pub type MuxResult<T> = Result<T, MuxError>;
