//! `vireo-common` — Shared types, traits, and errors for the Vireo recording engine.
//!
//! This crate is the foundation that the other engine crates depend on.
//! It defines the core abstractions:
//!
//! - **Types**: [`Resolution`] (newtypes for safety)
//! - **Frame buffer**: [`FrameBuffer`], the caller-owned RGB565 pixel buffer
//! - **Codec seam**: [`HwEncoder`], [`FrameSink`], [`DequeueEvent`],
//!   [`BufferInfo`] — the asynchronous hardware-encoder queue model
//! - **Config**: [`Motion`], [`Orientation`], [`Location`], bitrate derivation
//! - **Errors**: [`GlError`], [`EncodeError`] (thiserror-based)

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod types;

// Re-export commonly used items at crate root
pub use codec::{
    BufferFlags, BufferInfo, CodecFormat, DequeueEvent, FrameSink, HwEncoder, OutputFormat,
};
pub use config::{bit_rate, Location, Motion, Orientation};
pub use error::{EncodeError, GlError};
pub use frame::FrameBuffer;
pub use types::Resolution;
