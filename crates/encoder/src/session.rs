//! The encoding session: drives frames through the hardware encoder and
//! into the MP4 muxer.
//!
//! # Pipeline
//!
//! ```text
//! caller fills FrameBuffer
//!   --> EncoderSession::draw()
//!     --> drain encoder output (non-blocking)
//!       --> on the one-time format change: add muxer track, start muxer
//!       --> write each compressed access unit to the muxer
//!     --> presentation time = frame_index * 1e9 / fps
//!     --> FrameSink::draw (upload, rasterize, stamp, publish)
//! EncoderSession::close()
//!   --> drain to end-of-stream (blocking), stop encoder, stop muxer,
//!       close surface, release encoder
//! ```
//!
//! The session is single-threaded and synchronous: `draw` blocks in at
//! most two places, the surface publish (backpressure from a full
//! encoder input queue) and the bounded dequeue wait.
//!
//! Timestamps are derived purely from the frame counter and configured
//! frame rate — never from wall-clock time — so output timing is
//! deterministic and jitter-free regardless of real draw latency.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use vireo_common::codec::{CodecFormat, DequeueEvent, FrameSink, HwEncoder};
use vireo_common::config::{bit_rate, Location, Motion, Orientation};
use vireo_common::frame::FrameBuffer;
use vireo_common::types::Resolution;
use vireo_mux::Mp4Muxer;

use crate::error::EncoderError;

/// Bounded wait for one dequeue from the encoder's output queue.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Statistics from an encoding session, returned by
/// [`EncoderSession::close`].
#[derive(Copy, Clone, Debug, Default)]
pub struct EncoderStats {
    /// Frames submitted through the input surface.
    pub frames_drawn: u64,
    /// Compressed samples written to the muxer.
    pub samples_written: u64,
    /// Compressed payload bytes written to the muxer.
    pub bytes_written: u64,
}

/// A running frame-to-MP4 encoding session.
///
/// Created with [`EncoderSession::from`]; the encoder device is
/// configured and started during construction and never restarted.
/// Call [`draw`](Self::draw) once per frame, then
/// [`close`](Self::close) exactly once to flush and finalize the file.
/// Debug builds assert if a session is dropped without `close`.
pub struct EncoderSession {
    encoder: Box<dyn HwEncoder>,
    sink: Box<dyn FrameSink>,
    muxer: Mp4Muxer,
    input_resolution: Resolution,
    frame_rate: u32,
    frame_index: i64,
    /// Muxer track, assigned exactly once by the format-change event.
    track: Option<u32>,
    samples_written: u64,
    bytes_written: u64,
    released: bool,
}

impl std::fmt::Debug for EncoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderSession")
            .field("input_resolution", &self.input_resolution)
            .field("frame_rate", &self.frame_rate)
            .field("frame_index", &self.frame_index)
            .field("track", &self.track)
            .field("samples_written", &self.samples_written)
            .field("bytes_written", &self.bytes_written)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

/// Configures and builds an [`EncoderSession`].
///
/// Defaults: 15 fps, 1-second key-frame interval, low motion, no
/// orientation hint, no location.
pub struct Builder {
    input: Resolution,
    fps: u32,
    i_frame_interval_secs: u32,
    motion: Motion,
    orientation: Orientation,
    location: Option<(f32, f32)>,
    encoder: Option<Box<dyn HwEncoder>>,
}

impl EncoderSession {
    /// Start building a session for raw input frames of the given size.
    pub fn from(width: u32, height: u32) -> Builder {
        Builder {
            input: Resolution::new(width, height),
            fps: 15,
            i_frame_interval_secs: 1,
            motion: Motion::Low,
            orientation: Orientation::Deg0,
            location: None,
            encoder: None,
        }
    }

    /// Encode the current contents of `frame` as the next video frame.
    ///
    /// Drains any pending encoder output first, then renders the frame
    /// with a presentation time of `frame_index * 1e9 / fps` nanoseconds.
    /// Blocks in the publish step while the encoder's input queue is
    /// full.
    pub fn draw(&mut self, frame: &FrameBuffer) -> Result<(), EncoderError> {
        self.check_state()?;

        if frame.resolution() != self.input_resolution {
            return Err(EncoderError::FrameSize {
                expected: self.input_resolution,
                got: frame.resolution(),
            });
        }

        self.drain_encoder(false)?;

        let presentation_time = self.frame_index * NANOS_PER_SECOND / self.frame_rate as i64;
        self.frame_index += 1;
        self.sink.draw(frame, presentation_time)?;

        Ok(())
    }

    /// Flush the encoder, stop the muxer, and release every resource in
    /// order: end-of-stream drain, encoder stop, muxer stop, input
    /// surface close, encoder release.
    ///
    /// All teardown steps are fatal on error and none are retried.
    pub fn close(mut self) -> Result<EncoderStats, EncoderError> {
        self.check_state()?;

        // Nothing was ever negotiated if no track exists; a blocking
        // drain would spin on a device that never produces end-of-stream.
        if self.track.is_some() {
            self.drain_encoder(true)?;
        }
        self.encoder.stop()?;

        if self.track.take().is_some() {
            self.muxer.stop()?;
        }

        self.sink.close()?;
        self.encoder.release();
        self.released = true;

        let stats = self.stats();
        info!(
            frames = stats.frames_drawn,
            samples = stats.samples_written,
            bytes = stats.bytes_written,
            "encoder session closed"
        );
        Ok(stats)
    }

    /// Current session counters.
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_drawn: self.frame_index as u64,
            samples_written: self.samples_written,
            bytes_written: self.bytes_written,
        }
    }

    /// Extract all pending data from the encoder.
    ///
    /// With `end_of_stream` unset, returns as soon as the device has
    /// nothing more to give. With it set, signals end-of-input first and
    /// then spins — treating an empty queue as "not yet" — until a
    /// dequeued buffer carries the end-of-stream flag.
    fn drain_encoder(&mut self, end_of_stream: bool) -> Result<(), EncoderError> {
        if end_of_stream {
            debug!("signalling end of input");
            self.encoder.signal_end_of_input()?;
        }

        loop {
            match self.encoder.dequeue_output(DEQUEUE_TIMEOUT)? {
                DequeueEvent::TryAgainLater => {
                    if end_of_stream {
                        // Await the end-of-stream buffer.
                        continue;
                    }
                    break;
                }
                DequeueEvent::OutputFormatChanged => {
                    if self.track.is_some() {
                        return Err(EncoderError::FormatChangedTwice);
                    }
                    // The format carries the codec-specific data the
                    // muxer needs; this is the single synchronization
                    // point that unlocks all subsequent writes.
                    let format = self.encoder.output_format()?;
                    let track = self.muxer.add_video_track(&format)?;
                    self.muxer.start()?;
                    self.track = Some(track);
                    debug!(track, "encoder output format received, muxer started");
                }
                DequeueEvent::OutputBuffersChanged => {
                    return Err(EncoderError::OutputBuffersChanged);
                }
                DequeueEvent::Unexpected(status) => {
                    warn!(status, "unexpected encoder status");
                }
                DequeueEvent::Buffer { index, mut info } => {
                    if info.flags.codec_config {
                        // Already consumed through the format-change
                        // event; never forwarded to the muxer.
                        debug!("ignoring codec-config buffer");
                        info.size = 0;
                    }

                    if info.size != 0 {
                        let track = self.track.ok_or(EncoderError::MuxerNotStarted)?;
                        let data = self.encoder.output_buffer(index)?;
                        let end = info
                            .offset
                            .checked_add(info.size)
                            .filter(|&end| end <= data.len())
                            .ok_or(EncoderError::BufferRange {
                                offset: info.offset,
                                size: info.size,
                                len: data.len(),
                            })?;
                        let payload = &data[info.offset..end];
                        self.muxer.write_sample(track, payload, &info)?;
                        self.samples_written += 1;
                        self.bytes_written += info.size as u64;
                    }

                    self.encoder.release_output_buffer(index)?;

                    if info.flags.end_of_stream {
                        if !end_of_stream {
                            warn!("reached end of stream unexpectedly");
                        }
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_state(&self) -> Result<(), EncoderError> {
        if self.released {
            Err(EncoderError::Released)
        } else {
            Ok(())
        }
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        if !self.released && !std::thread::panicking() {
            tracing::error!(
                "EncoderSession dropped without close(); encoder and muxer leaked"
            );
            debug_assert!(false, "EncoderSession dropped without close()");
        }
    }
}

impl Builder {
    /// Frame rate of the output video.
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Key-frame interval in seconds.
    pub fn i_frame_interval(mut self, secs: u32) -> Self {
        self.i_frame_interval_secs = secs;
        self
    }

    /// Expected scene motion; scales the target bitrate.
    pub fn motion(mut self, motion: Motion) -> Self {
        self.motion = motion;
        self
    }

    /// Playback orientation hint written into the container.
    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Geodata written into the container (ISO-6709). Latitude must be
    /// in [-90, 90], longitude in [-180, 180]; validated at build.
    pub fn location(mut self, latitude: f32, longitude: f32) -> Self {
        self.location = Some((latitude, longitude));
        self
    }

    /// The hardware encoder device to drive.
    pub fn codec(mut self, encoder: Box<dyn HwEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Acquire every resource and start the session: configure and start
    /// the encoder, obtain its input surface, create the output file.
    ///
    /// `width`/`height` are the output video dimensions; the input
    /// frames given to [`EncoderSession::from`] are scaled to fit by the
    /// rasterization step.
    pub fn to(
        self,
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
    ) -> Result<EncoderSession, EncoderError> {
        let output = Resolution::new(width, height);
        if self.input.pixel_count() == 0 {
            return Err(EncoderError::InvalidConfig(
                "input dimensions must be > 0".into(),
            ));
        }
        if output.pixel_count() == 0 {
            return Err(EncoderError::InvalidConfig(
                "output dimensions must be > 0".into(),
            ));
        }
        if !output.is_even() {
            return Err(EncoderError::InvalidConfig(
                "output dimensions must be even".into(),
            ));
        }
        if self.fps == 0 {
            return Err(EncoderError::InvalidConfig("fps must be > 0".into()));
        }
        let location = match self.location {
            None => None,
            Some((latitude, longitude)) => {
                Some(Location::new(latitude, longitude).ok_or_else(|| {
                    EncoderError::InvalidConfig(format!(
                        "location out of range: ({latitude}, {longitude})"
                    ))
                })?)
            }
        };
        let mut encoder = self.encoder.ok_or_else(|| {
            EncoderError::InvalidConfig("no codec backend provided".into())
        })?;

        let format = CodecFormat {
            resolution: output,
            frame_rate: self.fps,
            bit_rate: bit_rate(output, self.fps, self.motion),
            i_frame_interval_secs: self.i_frame_interval_secs,
        };

        encoder.configure(&format)?;
        let sink = encoder.create_input_surface(self.input)?;
        let mut muxer = Mp4Muxer::new(path)?;
        if let Some(location) = location {
            muxer.set_location(location)?;
        }
        if self.orientation != Orientation::Deg0 {
            muxer.set_orientation_hint(self.orientation)?;
        }
        encoder.start()?;

        info!(
            input = %self.input,
            output = %output,
            fps = self.fps,
            bit_rate = format.bit_rate,
            motion = ?self.motion,
            "encoder session started"
        );

        Ok(EncoderSession {
            encoder,
            sink,
            muxer,
            input_resolution: self.input,
            frame_rate: self.fps,
            frame_index: 0,
            track: None,
            samples_written: 0,
            bytes_written: 0,
            released: false,
        })
    }
}
