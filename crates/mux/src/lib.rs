//! `vireo-mux` — MP4 container muxer for the Vireo recording engine.
//!
//! Writes a single H.264 video track into an ISO Base Media file
//! (ISO 14496-12) with no external muxing dependency.
//!
//! # Architecture
//!
//! - **Progressive write** — sample payloads stream into the mdat box as
//!   they arrive from the encoder
//! - **Moov-at-stop** — all track metadata (sample tables, decoder config)
//!   is written as one moov box when the muxer is stopped
//! - **MediaMuxer-shaped lifecycle** — `new` → hints → `add_video_track`
//!   → `start` (exactly once) → `write_sample`* → `stop`; calls outside
//!   that order are state errors, never silently accepted
//! - **Playback hints** — an orientation composition matrix (0/90/180/270)
//!   in the track header and an ISO-6709 geolocation string in udta
//!
//! # Usage
//!
//! ```ignore
//! use vireo_mux::Mp4Muxer;
//!
//! let mut muxer = Mp4Muxer::new("output.mp4")?;
//! let track = muxer.add_video_track(&output_format)?;
//! muxer.start()?;
//! muxer.write_sample(track, &payload, &buffer_info)?;
//! muxer.stop()?;
//! ```

pub mod atoms;
pub mod error;
pub mod mp4;
pub mod muxer;

pub use error::{MuxError, MuxResult};
pub use muxer::Mp4Muxer;
