//! Central error types for the GPU and codec layers (thiserror-based).
//!
//! The design is fail-fast: driver and device errors abort the pipeline
//! immediately, because GPU/codec state corruption cannot be safely
//! repaired mid-session. None of these variants are retried.

use thiserror::Error;

/// EGL/GLES driver errors.
#[derive(Error, Debug)]
pub enum GlError {
    #[error("EGL loader unavailable: {0}")]
    LoaderUnavailable(String),

    #[error("unable to get EGL display")]
    NoDisplay,

    #[error("no matching EGL config (RGB565, {surface})")]
    NoConfig {
        /// "pbuffer" or "window", whichever was requested.
        surface: &'static str,
    },

    #[error("EGL call failed: {call}: {reason}")]
    Egl {
        call: &'static str,
        reason: String,
    },

    #[error("GL error 0x{code:04x} after {call}")]
    Gl { call: &'static str, code: u32 },

    #[error("shader compile failed: {0}")]
    ShaderCompile(String),

    #[error("program link failed: {0}")]
    ProgramLink(String),

    #[error("attribute {0:?} not found in shader program")]
    MissingAttribute(&'static str),

    #[error("pixel buffer is {got} bytes, expected {expected} ({width}x{height} RGB565)")]
    BufferSize {
        got: usize,
        expected: usize,
        width: u32,
        height: u32,
    },

    #[error("GL object already released")]
    Released,
}

/// Hardware encoder device errors.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("encoder init failed: {0}")]
    Init(String),

    #[error("encode failed: {0}")]
    Failed(String),

    #[error("GL error: {0}")]
    Gl(#[from] GlError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gl_error_display() {
        let err = GlError::Gl {
            call: "glTexImage2D",
            code: 0x0505,
        };
        assert_eq!(err.to_string(), "GL error 0x0505 after glTexImage2D");
    }

    #[test]
    fn encode_error_from_gl() {
        let err = EncodeError::from(GlError::Released);
        assert!(err.to_string().contains("released"));
    }

    #[test]
    fn buffer_size_display() {
        let err = GlError::BufferSize {
            got: 10,
            expected: 202_752,
            width: 352,
            height: 288,
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("352x288"));
    }
}
