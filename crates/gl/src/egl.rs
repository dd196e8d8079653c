//! EGL context — display, config, context, and surface management.
//!
//! This module owns the connection to the GPU driver and handles the
//! strict ordering rules around it: objects are created display → config
//! → context → surface and destroyed in exact reverse order. Every
//! creation or teardown failure is fatal; there is no retry, because a
//! broken EGL state cannot recover mid-stream.
//!
//! The surface comes in two flavors: an offscreen pbuffer of fixed
//! dimensions, or a window surface over a native consumer handle (the
//! hardware encoder's input). The consumer-backed path is where
//! backpressure lives: [`EglContext::publish`] may block until the
//! consumer has accepted the previous frame.

use std::ffi::c_void;
use std::sync::Once;

use khronos_egl as egl;
use tracing::{debug, warn};

use vireo_common::GlError;

/// Android-specific config attribute marking surfaces that can feed a
/// hardware video encoder consumer.
const EGL_RECORDABLE_ANDROID: egl::Int = 0x3142;

/// The EGL instance type used throughout: runtime-loaded, EGL 1.4 API.
type EglInstance = egl::DynamicInstance<egl::EGL1_4>;

/// `eglPresentationTimeANDROID(display, surface, nanoseconds)`.
type PresentationTimeFn =
    unsafe extern "system" fn(*mut c_void, *mut c_void, i64) -> u32;

/// A native window handle owned by the frame consumer (the encoder).
pub struct NativeWindow(pub *mut c_void);

/// Attribute list for config selection: 16-bit 5-6-5 color, GLES2
/// renderable, and a surface capability matching the target — pbuffer
/// for offscreen rendering, the recordable flag for a consumer-backed
/// window surface.
pub fn config_attributes(offscreen: bool) -> [egl::Int; 11] {
    let (surface_key, surface_value) = if offscreen {
        (egl::SURFACE_TYPE, egl::PBUFFER_BIT)
    } else {
        (EGL_RECORDABLE_ANDROID, 1)
    };
    [
        egl::RED_SIZE,
        5,
        egl::GREEN_SIZE,
        6,
        egl::BLUE_SIZE,
        5,
        egl::RENDERABLE_TYPE,
        egl::OPENGL_ES2_BIT,
        surface_key,
        surface_value,
        egl::NONE,
    ]
}

/// A live connection to the GPU driver: display, config, rendering
/// context, and one surface.
///
/// Must be torn down with [`close`](Self::close); in debug builds,
/// dropping an open context trips an assertion (a discarded context
/// leaks driver handles that no GC will ever reclaim).
pub struct EglContext {
    egl: EglInstance,
    display: egl::Display,
    config: egl::Config,
    context: egl::Context,
    surface: egl::Surface,
    present_time: Option<PresentationTimeFn>,
    warned_no_present_time: bool,
    released: bool,
}

impl EglContext {
    /// Create a context rendering into a consumer-backed window surface.
    pub fn for_window(window: NativeWindow) -> Result<Self, GlError> {
        Self::new(SurfaceTarget::Window(window))
    }

    /// Create a context rendering into an offscreen pbuffer.
    pub fn offscreen(width: u32, height: u32) -> Result<Self, GlError> {
        Self::new(SurfaceTarget::Pbuffer { width, height })
    }

    fn new(target: SurfaceTarget) -> Result<Self, GlError> {
        // SAFETY: loading libEGL executes its initializers; there is no
        // weaker way to bring up a dynamically-selected GL stack.
        let egl = unsafe { EglInstance::load_required() }
            .map_err(|e| GlError::LoaderUnavailable(format!("{e:?}")))?;

        let display = Self::open_display(&egl)?;

        let offscreen = matches!(target, SurfaceTarget::Pbuffer { .. });
        let config = match Self::choose_config(&egl, display, offscreen) {
            Ok(config) => config,
            Err(e) => {
                Self::terminate_display(&egl, display);
                return Err(e);
            }
        };

        let context = match Self::create_context(&egl, display, config) {
            Ok(context) => context,
            Err(e) => {
                Self::terminate_display(&egl, display);
                return Err(e);
            }
        };

        let surface = match Self::create_surface(&egl, display, config, target) {
            Ok(surface) => surface,
            Err(e) => {
                if egl.destroy_context(display, context).is_err() {
                    warn!("failed to destroy EGL context during error cleanup");
                }
                Self::terminate_display(&egl, display);
                return Err(e);
            }
        };

        let present_time = Self::lookup_presentation_time(&egl);

        load_gl_symbols(&egl);

        Ok(Self {
            egl,
            display,
            config,
            context,
            surface,
            present_time,
            warned_no_present_time: false,
            released: false,
        })
    }

    /// Connect to and initialize the default display.
    fn open_display(egl: &EglInstance) -> Result<egl::Display, GlError> {
        // SAFETY: DEFAULT_DISPLAY is the sentinel the driver accepts for
        // the platform default; no live pointer is dereferenced.
        let display = unsafe { egl.get_display(egl::DEFAULT_DISPLAY) }
            .ok_or(GlError::NoDisplay)?;

        let (major, minor) = egl.initialize(display).map_err(|e| GlError::Egl {
            call: "eglInitialize",
            reason: e.to_string(),
        })?;
        debug!(major, minor, "EGL display initialized");
        Ok(display)
    }

    /// Choose a frame buffer configuration per [`config_attributes`].
    fn choose_config(
        egl: &EglInstance,
        display: egl::Display,
        offscreen: bool,
    ) -> Result<egl::Config, GlError> {
        let attributes = config_attributes(offscreen);
        let surface = if offscreen { "pbuffer" } else { "window" };
        match egl.choose_first_config(display, &attributes) {
            Ok(Some(config)) => {
                debug!(surface, "EGL config chosen");
                Ok(config)
            }
            Ok(None) => Err(GlError::NoConfig { surface }),
            Err(e) => Err(GlError::Egl {
                call: "eglChooseConfig",
                reason: e.to_string(),
            }),
        }
    }

    /// Create a GLES2 rendering context.
    fn create_context(
        egl: &EglInstance,
        display: egl::Display,
        config: egl::Config,
    ) -> Result<egl::Context, GlError> {
        let attributes = [egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE];
        let context = egl
            .create_context(display, config, None, &attributes)
            .map_err(|e| GlError::Egl {
                call: "eglCreateContext",
                reason: e.to_string(),
            })?;
        debug!("EGL context created");
        Ok(context)
    }

    fn create_surface(
        egl: &EglInstance,
        display: egl::Display,
        config: egl::Config,
        target: SurfaceTarget,
    ) -> Result<egl::Surface, GlError> {
        let surface = match target {
            SurfaceTarget::Pbuffer { width, height } => {
                let attributes = [
                    egl::WIDTH,
                    width as egl::Int,
                    egl::HEIGHT,
                    height as egl::Int,
                    egl::NONE,
                ];
                egl.create_pbuffer_surface(display, config, &attributes)
                    .map_err(|e| GlError::Egl {
                        call: "eglCreatePbufferSurface",
                        reason: e.to_string(),
                    })?
            }
            SurfaceTarget::Window(window) => {
                // SAFETY: the caller guarantees the native window handle
                // stays valid for the lifetime of this context; it is
                // owned by the encoder, which outlives its input surface.
                unsafe { egl.create_window_surface(display, config, window.0, None) }.map_err(
                    |e| GlError::Egl {
                        call: "eglCreateWindowSurface",
                        reason: e.to_string(),
                    },
                )?
            }
        };
        debug!("EGL surface created");
        Ok(surface)
    }

    /// Resolve `eglPresentationTimeANDROID` if the driver exposes it.
    fn lookup_presentation_time(egl: &EglInstance) -> Option<PresentationTimeFn> {
        egl.get_proc_address("eglPresentationTimeANDROID").map(|f| {
            // SAFETY: the symbol, when present, has exactly this
            // signature per EGL_ANDROID_presentation_time.
            unsafe { std::mem::transmute::<extern "system" fn(), PresentationTimeFn>(f) }
        })
    }

    /// Bind this context and surface to the calling thread.
    pub fn make_current(&self) -> Result<(), GlError> {
        self.check_state()?;
        self.egl
            .make_current(
                self.display,
                Some(self.surface),
                Some(self.surface),
                Some(self.context),
            )
            .map_err(|e| GlError::Egl {
                call: "eglMakeCurrent",
                reason: e.to_string(),
            })?;
        debug!("EGL context made current");
        Ok(())
    }

    /// Publish the rendered frame to the consumer (swap buffers).
    ///
    /// May block until the consumer has room. This is the pipeline's only
    /// built-in backpressure point and must not be bypassed: removing it
    /// risks unbounded queue growth in the encoder.
    pub fn publish(&self) -> Result<(), GlError> {
        self.check_state()?;
        self.egl
            .swap_buffers(self.display, self.surface)
            .map_err(|e| GlError::Egl {
                call: "eglSwapBuffers",
                reason: e.to_string(),
            })
    }

    /// Stamp the surface with a presentation time in nanoseconds.
    ///
    /// Drivers that do not expose the presentation-time extension (most
    /// desktop EGL stacks) get a one-time debug note and the stamp is
    /// skipped; a driver that exposes it and then fails the call is a
    /// fatal desynchronization.
    pub fn set_presentation_time(&mut self, nanos: i64) -> Result<(), GlError> {
        self.check_state()?;
        match self.present_time {
            Some(f) => {
                // SAFETY: display and surface are live handles owned by
                // self; the extension fn was resolved from this instance.
                let ok = unsafe { f(self.display.as_ptr(), self.surface.as_ptr(), nanos) };
                if ok == 0 {
                    return Err(GlError::Egl {
                        call: "eglPresentationTimeANDROID",
                        reason: format!("failed to set presentation time ({nanos}ns)"),
                    });
                }
                Ok(())
            }
            None => {
                if !self.warned_no_present_time {
                    debug!("presentation-time extension unavailable, timestamps not stamped");
                    self.warned_no_present_time = true;
                }
                Ok(())
            }
        }
    }

    /// Tear down surface → context → display, in that order.
    pub fn close(&mut self) -> Result<(), GlError> {
        self.check_state()?;

        self.egl
            .destroy_surface(self.display, self.surface)
            .map_err(|e| GlError::Egl {
                call: "eglDestroySurface",
                reason: e.to_string(),
            })?;
        debug!("EGL surface destroyed");

        self.egl
            .destroy_context(self.display, self.context)
            .map_err(|e| GlError::Egl {
                call: "eglDestroyContext",
                reason: e.to_string(),
            })?;
        if self.egl.release_thread().is_err() {
            warn!("eglReleaseThread failed");
        }
        debug!("EGL context destroyed");

        self.egl.terminate(self.display).map_err(|e| GlError::Egl {
            call: "eglTerminate",
            reason: e.to_string(),
        })?;
        debug!("EGL display terminated");

        self.released = true;
        Ok(())
    }

    fn check_state(&self) -> Result<(), GlError> {
        if self.released {
            Err(GlError::Released)
        } else {
            Ok(())
        }
    }

    fn terminate_display(egl: &EglInstance, display: egl::Display) {
        if egl.terminate(display).is_err() {
            warn!("failed to terminate EGL display during error cleanup");
        }
    }

    /// The chosen frame buffer configuration.
    pub fn config(&self) -> egl::Config {
        self.config
    }
}

impl Drop for EglContext {
    fn drop(&mut self) {
        if !self.released && !std::thread::panicking() {
            tracing::error!("EglContext dropped without close(); driver handles leaked");
            debug_assert!(false, "EglContext dropped without close()");
        }
    }
}

enum SurfaceTarget {
    Pbuffer { width: u32, height: u32 },
    Window(NativeWindow),
}

/// Resolve GL entry points through EGL, once per process.
fn load_gl_symbols(egl: &EglInstance) {
    static LOAD: Once = Once::new();
    LOAD.call_once(|| {
        gl::load_with(|name| match egl.get_proc_address(name) {
            Some(f) => f as *const c_void,
            None => std::ptr::null(),
        });
        debug!("GL symbols loaded");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_config_requests_recordable_565() {
        let attrs = config_attributes(false);
        assert_eq!(attrs[0], egl::RED_SIZE);
        assert_eq!(attrs[1], 5);
        assert_eq!(attrs[2], egl::GREEN_SIZE);
        assert_eq!(attrs[3], 6);
        assert_eq!(attrs[4], egl::BLUE_SIZE);
        assert_eq!(attrs[5], 5);
        assert_eq!(attrs[6], egl::RENDERABLE_TYPE);
        assert_eq!(attrs[7], egl::OPENGL_ES2_BIT);
        assert_eq!(attrs[8], EGL_RECORDABLE_ANDROID);
        assert_eq!(attrs[9], 1);
        assert_eq!(attrs[10], egl::NONE);
    }

    #[test]
    fn offscreen_config_requests_pbuffer() {
        let attrs = config_attributes(true);
        assert_eq!(attrs[8], egl::SURFACE_TYPE);
        assert_eq!(attrs[9], egl::PBUFFER_BIT);
        // Color depth request is identical in both modes
        assert_eq!(&attrs[..8], &config_attributes(false)[..8]);
    }
}
