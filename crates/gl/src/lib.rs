//! `vireo-gl` — EGL context management and GLES2 frame-upload resources.
//!
//! This crate owns the GPU side of the recording pipeline:
//!
//! - [`EglContext`] — display connection, config, rendering context, and a
//!   pbuffer or consumer-backed surface; publish (swap) and
//!   presentation-time stamping; strict reverse-order teardown.
//! - [`QuadShader`] — the fixed vertex/fragment program that rasterizes an
//!   uploaded frame as a full-screen quad.
//! - [`FrameTexture`] — the single 2D texture a raw RGB565 frame is
//!   re-uploaded into every draw.
//!
//! EGL entry points are loaded dynamically at runtime (`khronos-egl` with
//! the `dynamic` feature), so the crate builds and links on systems
//! without a GL stack; loading only happens when a context is created.
//!
//! Every driver error is fatal. A broken GPU context cannot recover
//! mid-stream, so nothing here retries: creation failures, swap failures,
//! and stray `glGetError` codes all abort the pipeline.

pub mod egl;
pub mod shader;
pub mod texture;

pub use egl::{config_attributes, EglContext, NativeWindow};
pub use shader::QuadShader;
pub use texture::{FrameTexture, TEXTURE_UNIT_0};

use vireo_common::GlError;

/// Check the GL error flag after a call group; any code is fatal.
pub(crate) fn check_gl_error(call: &'static str) -> Result<(), GlError> {
    // SAFETY: glGetError has no preconditions once symbols are loaded.
    let code = unsafe { gl::GetError() };
    if code == gl::NO_ERROR {
        Ok(())
    } else {
        Err(GlError::Gl { call, code })
    }
}
