//! The single frame texture raw pixels are uploaded into.

use std::ffi::c_void;

use gl::types::{GLenum, GLint, GLsizei, GLuint};
use tracing::debug;

use vireo_common::GlError;

use crate::check_gl_error;

/// The texture unit the pipeline renders from.
pub const TEXTURE_UNIT_0: GLenum = gl::TEXTURE0;

/// One 2D texture on a fixed unit, re-uploaded in full every frame.
///
/// The source has no mip chain, so minification is nearest-neighbor and
/// both axes clamp to edge; magnification is linear.
pub struct FrameTexture {
    id: GLuint,
    unit: GLenum,
    released: bool,
}

impl FrameTexture {
    pub fn new(unit: GLenum) -> Result<Self, GlError> {
        let mut id: GLuint = 0;
        // SAFETY for all GL calls below: symbols are loaded and a context
        // is current; id is the texture GL just generated.
        unsafe { gl::GenTextures(1, &mut id) };
        check_gl_error("glGenTextures")?;

        unsafe { gl::ActiveTexture(unit) };
        check_gl_error("glActiveTexture")?;

        unsafe { gl::BindTexture(gl::TEXTURE_2D, id) };
        check_gl_error("glBindTexture")?;

        unsafe {
            gl::TexParameterf(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::NEAREST as f32);
        }
        check_gl_error("glTexParameterf(MIN_FILTER)")?;

        unsafe {
            gl::TexParameterf(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as f32);
        }
        check_gl_error("glTexParameterf(MAG_FILTER)")?;

        unsafe {
            gl::TexParameteri(
                gl::TEXTURE_2D,
                gl::TEXTURE_WRAP_S,
                gl::CLAMP_TO_EDGE as GLint,
            );
        }
        check_gl_error("glTexParameteri(WRAP_S)")?;

        unsafe {
            gl::TexParameteri(
                gl::TEXTURE_2D,
                gl::TEXTURE_WRAP_T,
                gl::CLAMP_TO_EDGE as GLint,
            );
        }
        check_gl_error("glTexParameteri(WRAP_T)")?;

        debug!(texture = id, "frame texture created");
        Ok(Self {
            id,
            unit,
            released: false,
        })
    }

    /// Upload the whole image as packed RGB565 and draw the quad.
    ///
    /// No partial updates: every frame replaces the full texture image.
    pub fn upload_and_draw(&self, pixels: &[u8], width: u32, height: u32) -> Result<(), GlError> {
        if self.released {
            return Err(GlError::Released);
        }
        let expected = width as usize * height as usize * 2;
        if pixels.len() != expected {
            return Err(GlError::BufferSize {
                got: pixels.len(),
                expected,
                width,
                height,
            });
        }

        // SAFETY: the pixel slice holds width*height*2 bytes (checked
        // above), exactly what GL reads for RGB/UNSIGNED_SHORT_5_6_5.
        unsafe {
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGB as GLint,
                width as GLsizei,
                height as GLsizei,
                0,
                gl::RGB,
                gl::UNSIGNED_SHORT_5_6_5,
                pixels.as_ptr() as *const c_void,
            );
        }
        check_gl_error("glTexImage2D")?;

        unsafe { gl::DrawArrays(gl::TRIANGLE_STRIP, 0, 4) };
        check_gl_error("glDrawArrays")
    }

    pub fn release(&mut self) -> Result<(), GlError> {
        if self.released {
            return Err(GlError::Released);
        }

        // SAFETY: context is current; id was generated by new().
        unsafe { gl::ActiveTexture(self.unit) };
        check_gl_error("glActiveTexture")?;

        unsafe { gl::BindTexture(gl::TEXTURE_2D, 0) };
        check_gl_error("glBindTexture(0)")?;

        unsafe { gl::DeleteTextures(1, &self.id) };
        check_gl_error("glDeleteTextures")?;

        self.released = true;
        debug!(texture = self.id, "frame texture released");
        Ok(())
    }

    pub fn id(&self) -> GLuint {
        self.id
    }
}
