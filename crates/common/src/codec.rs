//! Hardware codec abstraction traits.
//!
//! These traits define the seam between the recording pipeline and the
//! hardware video encoder. The pipeline programs against [`HwEncoder`] and
//! [`FrameSink`], never against a concrete device, so platform bindings
//! (V4L2 M2M, NVENC, MediaCodec) plug in without touching the drain logic
//! and tests can script the device exactly.
//!
//! The model is an asynchronous device with an internal output queue: the
//! caller submits frames through the device's input surface and pulls
//! compressed access units out with a bounded-wait dequeue. The device
//! signals its negotiated output format exactly once, before any payload,
//! and that event is what unlocks container writing.
//!
//! Neither trait is `Send`: the pipeline is single-threaded by contract
//! and the GL-backed sink is thread-affine.

use std::time::Duration;

use crate::error::EncodeError;
use crate::frame::FrameBuffer;
use crate::types::Resolution;

/// Input-side configuration handed to the device before `start`.
#[derive(Clone, Debug)]
pub struct CodecFormat {
    /// Output video dimensions.
    pub resolution: Resolution,
    /// Frames per second.
    pub frame_rate: u32,
    /// Target bitrate in bits per second.
    pub bit_rate: u32,
    /// Seconds between forced key frames.
    pub i_frame_interval_secs: u32,
}

/// The format negotiated by the device, reported through the one-time
/// format-change event. Carries everything the muxer needs to open a
/// track.
#[derive(Clone, Debug)]
pub struct OutputFormat {
    pub resolution: Resolution,
    pub frame_rate: u32,
    /// H.264 sequence parameter set, without start-code prefix.
    pub sps: Vec<u8>,
    /// H.264 picture parameter set, without start-code prefix.
    pub pps: Vec<u8>,
}

/// Flags attached to a dequeued output buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// The buffer contains a sync point (IDR frame).
    pub key_frame: bool,
    /// The buffer carries codec-specific data (SPS/PPS), not a frame.
    pub codec_config: bool,
    /// The last buffer of the stream.
    pub end_of_stream: bool,
}

/// Metadata for one dequeued output buffer.
#[derive(Clone, Debug)]
pub struct BufferInfo {
    /// Start of the payload within the output buffer.
    pub offset: usize,
    /// Payload length in bytes.
    pub size: usize,
    /// Presentation timestamp in nanoseconds.
    pub presentation_time_nanos: i64,
    pub flags: BufferFlags,
}

/// One result of a bounded-wait dequeue from the device's output queue.
#[derive(Clone, Debug)]
pub enum DequeueEvent {
    /// The wait timed out with nothing available.
    TryAgainLater,
    /// The negotiated output format is now known. Guaranteed by the
    /// device contract to precede any payload-bearing buffer, and to
    /// occur at most once.
    OutputFormatChanged,
    /// Legacy buffer-array invalidation. The pipeline assumes a single
    /// static output-buffer set and treats this as fatal.
    OutputBuffersChanged,
    /// A real output buffer, addressed by index until released.
    Buffer { index: usize, info: BufferInfo },
    /// A status code outside the known set. Survivable; logged.
    Unexpected(i32),
}

/// A hardware video encoder with an asynchronous output queue.
///
/// Lifecycle: `configure` → `create_input_surface` → `start` →
/// (`dequeue_output` / `release_output_buffer`)* → `signal_end_of_input`
/// → drain to end-of-stream → `stop` → `release`. The device is never
/// restarted.
pub trait HwEncoder {
    /// Configure the device for encoding. Must precede `start`.
    fn configure(&mut self, format: &CodecFormat) -> Result<(), EncodeError>;

    /// Create the input surface frames are rendered into. The device owns
    /// its native consumer surface; the returned sink binds it to the GPU.
    /// `source` is the dimensions of the raw frames the caller will supply.
    fn create_input_surface(&mut self, source: Resolution)
        -> Result<Box<dyn FrameSink>, EncodeError>;

    fn start(&mut self) -> Result<(), EncodeError>;

    /// Signal that no further input frames will arrive. The device will
    /// eventually emit a buffer flagged end-of-stream.
    fn signal_end_of_input(&mut self) -> Result<(), EncodeError>;

    /// Pull the next event off the output queue, waiting up to `timeout`.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<DequeueEvent, EncodeError>;

    /// Borrow the contents of a dequeued output buffer. Valid until the
    /// buffer is released.
    fn output_buffer(&self, index: usize) -> Result<&[u8], EncodeError>;

    /// Return an output buffer to the device. Must be called for every
    /// dequeued buffer, whether or not its payload was consumed.
    fn release_output_buffer(&mut self, index: usize) -> Result<(), EncodeError>;

    /// The negotiated output format. Only meaningful after the
    /// format-change event has been observed.
    fn output_format(&self) -> Result<OutputFormat, EncodeError>;

    fn stop(&mut self) -> Result<(), EncodeError>;

    /// Free the device. Infallible; called last during teardown.
    fn release(&mut self);
}

/// The rendering side of an encoder's input surface.
///
/// `draw` is not reentrant and must be called strictly sequentially by
/// one logical thread of control. Publishing the frame to the consumer
/// may block until the encoder has accepted the previous one — that
/// blocking is the pipeline's backpressure and must not be bypassed.
pub trait FrameSink {
    /// Upload the frame, rasterize it to the consumer surface, stamp the
    /// presentation time, and (if publishing is enabled) hand it to the
    /// encoder.
    fn draw(&mut self, frame: &FrameBuffer, presentation_time_nanos: i64)
        -> Result<(), EncodeError>;

    /// Tear down in reverse creation order. Using the sink afterwards is
    /// a fatal error.
    fn close(&mut self) -> Result<(), EncodeError>;
}
