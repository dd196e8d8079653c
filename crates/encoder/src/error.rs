//! Pipeline-level error types.
//!
//! These sit above the device-level errors in `vireo-common`: they name
//! the contract violations of the drain state machine and the session
//! lifecycle, which is what callers actually match on.

use thiserror::Error;

use vireo_common::types::Resolution;
use vireo_common::EncodeError;
use vireo_mux::MuxError;

/// Errors from the encoding pipeline.
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("invalid encoder config: {0}")]
    InvalidConfig(String),

    /// The encoder reported a second output-format change. The muxer can
    /// only be initialized once; a second change means the device and
    /// pipeline have desynchronized.
    #[error("encoder output format changed twice")]
    FormatChangedTwice,

    /// The device invalidated its output-buffer set. The pipeline
    /// assumes one static set obtained at start.
    #[error("encoder output buffers changed")]
    OutputBuffersChanged,

    /// A payload-bearing buffer arrived before the format-change event
    /// assigned a muxer track.
    #[error("muxer hasn't started")]
    MuxerNotStarted,

    /// A dequeued buffer's [offset, offset+size) range does not fit its
    /// backing buffer.
    #[error("output buffer range {offset}+{size} exceeds buffer of {len} bytes")]
    BufferRange {
        offset: usize,
        size: usize,
        len: usize,
    },

    #[error("frame is {got}, session expects {expected}")]
    FrameSize {
        expected: Resolution,
        got: Resolution,
    },

    /// Use after `close()`.
    #[error("encoder session already released")]
    Released,

    #[error("codec error: {0}")]
    Codec(#[from] EncodeError),

    #[error("mux error: {0}")]
    Mux(#[from] MuxError),
}
