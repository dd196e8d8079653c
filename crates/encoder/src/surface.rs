//! The encoder-facing input surface.
//!
//! Binds a GPU context to the encoder's native consumer surface. Each
//! draw uploads the caller's frame buffer to the texture, rasterizes it
//! to the surface, stamps the presentation time, and — in auto-publish
//! mode — hands the frame to the consumer. The publish step is the
//! pipeline's backpressure: it blocks until the encoder has accepted the
//! previous frame.
//!
//! Not reentrant. One logical thread of control drives the surface.

use tracing::{info, trace};

use vireo_common::codec::FrameSink;
use vireo_common::frame::FrameBuffer;
use vireo_common::types::Resolution;
use vireo_common::{EncodeError, GlError};
use vireo_gl::{EglContext, FrameTexture, NativeWindow, QuadShader, TEXTURE_UNIT_0};

/// An EGL-backed rendering surface feeding a frame consumer.
///
/// Built with [`InputSurface::create`]. Must be torn down with
/// [`close`](Self::close); debug builds assert on drop-without-close.
pub struct InputSurface {
    context: EglContext,
    shader: QuadShader,
    texture: FrameTexture,
    resolution: Resolution,
    auto_publish: bool,
    released: bool,
}

/// Configures and builds an [`InputSurface`].
pub struct Builder {
    window: NativeWindow,
    resolution: Resolution,
    auto_publish: bool,
}

impl InputSurface {
    /// Start building a surface over the consumer's native window.
    /// `width`/`height` are the dimensions of the raw frames the caller
    /// will draw.
    pub fn create(window: NativeWindow, width: u32, height: u32) -> Builder {
        Builder {
            window,
            resolution: Resolution::new(width, height),
            auto_publish: false,
        }
    }

    /// Upload the frame, rasterize, stamp the presentation time, and
    /// publish when auto-publish is on.
    ///
    /// The publish (buffer swap) blocks if the consumer's input queue is
    /// full. That is deliberate: so long as the caller fully drains the
    /// encoder before supplying more input, the device guarantees the
    /// next frame can be accepted without deadlock.
    pub fn draw(&mut self, frame: &FrameBuffer, presentation_time_nanos: i64)
        -> Result<(), GlError>
    {
        self.check_state()?;

        self.texture.upload_and_draw(
            frame.as_bytes(),
            self.resolution.width,
            self.resolution.height,
        )?;
        self.context
            .set_presentation_time(presentation_time_nanos)?;

        if self.auto_publish {
            self.context.publish()?;
        }

        trace!(pts = presentation_time_nanos, "frame drawn");
        Ok(())
    }

    /// Tear down in reverse creation order: texture, shader, then the
    /// EGL objects.
    pub fn close(&mut self) -> Result<(), GlError> {
        self.check_state()?;

        self.texture.release()?;
        self.shader.release()?;
        self.context.close()?;

        self.released = true;
        info!("input surface destroyed");
        Ok(())
    }

    fn check_state(&self) -> Result<(), GlError> {
        if self.released {
            Err(GlError::Released)
        } else {
            Ok(())
        }
    }
}

impl Builder {
    /// Publish automatically at the end of every draw. Without this the
    /// caller owns both context currency and the publish call.
    pub fn auto_publish(mut self) -> Self {
        self.auto_publish = true;
        self
    }

    pub fn build(self) -> Result<InputSurface, GlError> {
        let context = EglContext::for_window(self.window)?;
        if self.auto_publish {
            context.make_current()?;
        }

        let shader = QuadShader::compile()?;
        let texture = FrameTexture::new(TEXTURE_UNIT_0)?;

        info!(
            resolution = %self.resolution,
            auto_publish = self.auto_publish,
            "input surface created"
        );

        Ok(InputSurface {
            context,
            shader,
            texture,
            resolution: self.resolution,
            auto_publish: self.auto_publish,
            released: false,
        })
    }
}

impl FrameSink for InputSurface {
    fn draw(
        &mut self,
        frame: &FrameBuffer,
        presentation_time_nanos: i64,
    ) -> Result<(), EncodeError> {
        InputSurface::draw(self, frame, presentation_time_nanos)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        InputSurface::close(self)?;
        Ok(())
    }
}

impl Drop for InputSurface {
    fn drop(&mut self) {
        if !self.released && !std::thread::panicking() {
            tracing::error!("InputSurface dropped without close(); GPU objects leaked");
            debug_assert!(false, "InputSurface dropped without close()");
        }
    }
}
