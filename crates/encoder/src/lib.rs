//! `vireo-encoder` — the frame-to-MP4 encoding pipeline.
//!
//! Coordinates the three resources that turn raw pixel buffers into a
//! playable file: the GPU input surface (`vireo-gl`), a hardware H.264
//! encoder (any [`vireo_common::HwEncoder`] implementation), and the MP4
//! muxer (`vireo-mux`).
//!
//! # Usage
//!
//! ```ignore
//! use vireo_common::{FrameBuffer, Motion, Resolution};
//! use vireo_encoder::EncoderSession;
//!
//! let mut frame = FrameBuffer::new(Resolution::CIF);
//! let mut session = EncoderSession::from(352, 288)
//!     .fps(8)
//!     .motion(Motion::Low)
//!     .codec(platform_encoder())
//!     .to("out.mp4", 352, 288)?;
//!
//! for image in images {
//!     fill_rgb565(frame.as_bytes_mut(), &image);
//!     session.draw(&frame)?;
//! }
//! let stats = session.close()?;
//! ```
//!
//! # Modules
//!
//! - [`session`] — [`EncoderSession`]: builder configuration, the
//!   drain state machine feeding the muxer, counter-derived timestamps,
//!   ordered teardown
//! - [`surface`] — [`InputSurface`]: the EGL-backed
//!   [`vireo_common::FrameSink`] a hardware device binds to its native
//!   consumer surface
//! - [`error`] — [`EncoderError`], the pipeline's fatal conditions

pub mod error;
pub mod session;
pub mod surface;

pub use error::EncoderError;
pub use session::{EncoderSession, EncoderStats};
pub use surface::InputSurface;
