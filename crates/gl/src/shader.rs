//! The fixed full-screen-quad shader program.
//!
//! One program serves the whole pipeline: the vertex stage applies a
//! model-view-projection matrix and a texture-coordinate matrix (both
//! identity — the hooks exist so a consumer transform could be slotted in
//! without touching geometry), and the fragment stage samples the frame
//! texture with the V coordinate flipped, because the source buffer is
//! top-down while GL texture space is bottom-up.

use std::ffi::c_void;

use gl::types::{GLchar, GLenum, GLint, GLuint};
use tracing::debug;

use vireo_common::GlError;

use crate::check_gl_error;

const VERTEX_SHADER: &str = "\
uniform mat4 uMvpMatrix;
uniform mat4 uTexMatrix;
attribute vec4 aPosition;
attribute vec4 aTexCoord;
varying vec2 vTexCoord;
void main() {
  gl_Position = uMvpMatrix * aPosition;
  vTexCoord = (uTexMatrix * aTexCoord).xy;
}
";

const FRAGMENT_SHADER: &str = "\
precision mediump float;
varying vec2 vTexCoord;
uniform sampler2D sTexture;
void main() {
  vec2 flipped = vec2(vTexCoord.x, 1.0 - vTexCoord.y);
  gl_FragColor = texture2D(sTexture, flipped);
}
";

/// Interleaved X, Y, Z, U, V per vertex; two triangles as a strip.
const QUAD_VERTICES: [f32; 20] = [
    -1.0, -1.0, 0.0, 0.0, 0.0, //
    1.0, -1.0, 0.0, 1.0, 0.0, //
    -1.0, 1.0, 0.0, 0.0, 1.0, //
    1.0, 1.0, 0.0, 1.0, 1.0, //
];

const VERTEX_STRIDE_BYTES: GLint = 5 * std::mem::size_of::<f32>() as GLint;
/// UV starts after the three position floats.
const VERTEX_UV_OFFSET: usize = 3;

#[rustfmt::skip]
const IDENTITY_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// The compiled quad program with its attribute bindings.
///
/// Requires a current GL context for every method, including
/// [`release`](Self::release).
pub struct QuadShader {
    program: GLuint,
    vertex_shader: GLuint,
    fragment_shader: GLuint,
    position_attrib: GLuint,
    texcoord_attrib: GLuint,
    /// The client-side attribute arrays point into this allocation; it
    /// must stay alive and pinned for the program's lifetime.
    _vertices: Box<[f32; 20]>,
    released: bool,
}

impl QuadShader {
    /// Compile, link, and fully wire the program: attribute pointers into
    /// the quad, both attributes enabled, both matrices set to identity.
    pub fn compile() -> Result<Self, GlError> {
        // SAFETY for all GL calls below: symbols are loaded and a context
        // is current (guaranteed by the caller); ids passed back in are
        // the ones GL just handed out.
        let program = unsafe { gl::CreateProgram() };
        check_gl_error("glCreateProgram")?;

        let vertex_shader = compile_stage(gl::VERTEX_SHADER, VERTEX_SHADER)?;
        let fragment_shader = compile_stage(gl::FRAGMENT_SHADER, FRAGMENT_SHADER)?;

        unsafe {
            gl::AttachShader(program, vertex_shader);
            gl::AttachShader(program, fragment_shader);
            gl::LinkProgram(program);
        }

        let mut status: GLint = 0;
        unsafe { gl::GetProgramiv(program, gl::LINK_STATUS, &mut status) };
        if status == 0 {
            let log = program_info_log(program);
            unsafe {
                gl::DeleteShader(vertex_shader);
                gl::DeleteShader(fragment_shader);
                gl::DeleteProgram(program);
            }
            return Err(GlError::ProgramLink(log));
        }

        unsafe { gl::UseProgram(program) };
        check_gl_error("glUseProgram")?;

        let position_attrib = attrib_location(program, c"aPosition".as_ptr(), "aPosition")?;
        let texcoord_attrib = attrib_location(program, c"aTexCoord".as_ptr(), "aTexCoord")?;
        let mvp_uniform = unsafe { gl::GetUniformLocation(program, c"uMvpMatrix".as_ptr()) };
        let tex_uniform = unsafe { gl::GetUniformLocation(program, c"uTexMatrix".as_ptr()) };
        check_gl_error("glGetUniformLocation")?;

        let vertices = Box::new(QUAD_VERTICES);
        unsafe {
            gl::VertexAttribPointer(
                position_attrib,
                3,
                gl::FLOAT,
                gl::FALSE,
                VERTEX_STRIDE_BYTES,
                vertices.as_ptr() as *const c_void,
            );
            gl::VertexAttribPointer(
                texcoord_attrib,
                2,
                gl::FLOAT,
                gl::FALSE,
                VERTEX_STRIDE_BYTES,
                vertices.as_ptr().add(VERTEX_UV_OFFSET) as *const c_void,
            );
        }
        check_gl_error("glVertexAttribPointer")?;

        unsafe {
            gl::EnableVertexAttribArray(position_attrib);
            gl::EnableVertexAttribArray(texcoord_attrib);
        }
        check_gl_error("glEnableVertexAttribArray")?;

        unsafe {
            gl::UniformMatrix4fv(mvp_uniform, 1, gl::FALSE, IDENTITY_MATRIX.as_ptr());
            gl::UniformMatrix4fv(tex_uniform, 1, gl::FALSE, IDENTITY_MATRIX.as_ptr());
        }
        check_gl_error("glUniformMatrix4fv")?;

        debug!(program, "quad shader compiled");

        Ok(Self {
            program,
            vertex_shader,
            fragment_shader,
            position_attrib,
            texcoord_attrib,
            _vertices: vertices,
            released: false,
        })
    }

    /// Release in the one order that is defined behavior: disable
    /// attributes, unbind the program, detach and delete each stage, then
    /// delete the program. Deleting the program before detaching its
    /// shaders is undefined.
    pub fn release(&mut self) -> Result<(), GlError> {
        if self.released {
            return Err(GlError::Released);
        }

        // SAFETY: context is current; all ids were created by compile().
        unsafe {
            gl::DisableVertexAttribArray(self.position_attrib);
            gl::DisableVertexAttribArray(self.texcoord_attrib);
        }
        check_gl_error("glDisableVertexAttribArray")?;

        unsafe { gl::UseProgram(0) };
        check_gl_error("glUseProgram(0)")?;

        unsafe {
            gl::DetachShader(self.program, self.vertex_shader);
            gl::DeleteShader(self.vertex_shader);
        }
        check_gl_error("glDeleteShader(vertex)")?;

        unsafe {
            gl::DetachShader(self.program, self.fragment_shader);
            gl::DeleteShader(self.fragment_shader);
            gl::DeleteProgram(self.program);
        }
        check_gl_error("glDeleteProgram")?;

        self.released = true;
        debug!("quad shader released");
        Ok(())
    }
}

fn compile_stage(kind: GLenum, source: &str) -> Result<GLuint, GlError> {
    // SAFETY: source pointer and length describe a live &str for the
    // duration of the call; GL copies the source.
    let shader = unsafe { gl::CreateShader(kind) };
    let ptr = source.as_ptr() as *const GLchar;
    let len = source.len() as GLint;
    unsafe {
        gl::ShaderSource(shader, 1, &ptr, &len);
        gl::CompileShader(shader);
    }

    let mut status: GLint = 0;
    unsafe { gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status) };
    if status == 0 {
        let log = shader_info_log(shader);
        unsafe { gl::DeleteShader(shader) };
        return Err(GlError::ShaderCompile(log));
    }
    check_gl_error("glCompileShader")?;
    Ok(shader)
}

fn attrib_location(
    program: GLuint,
    name_ptr: *const GLchar,
    name: &'static str,
) -> Result<GLuint, GlError> {
    // SAFETY: name_ptr is a null-terminated literal.
    let location = unsafe { gl::GetAttribLocation(program, name_ptr) };
    if location < 0 {
        return Err(GlError::MissingAttribute(name));
    }
    Ok(location as GLuint)
}

fn shader_info_log(shader: GLuint) -> String {
    let mut len: GLint = 0;
    // SAFETY: buffer capacity is exactly what GL reported; GL writes at
    // most that many bytes.
    unsafe { gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len) };
    let mut buf = vec![0u8; len.max(1) as usize];
    let mut written: GLint = 0;
    unsafe {
        gl::GetShaderInfoLog(shader, len, &mut written, buf.as_mut_ptr() as *mut GLchar);
    }
    buf.truncate(written.max(0) as usize);
    String::from_utf8_lossy(&buf).into_owned()
}

fn program_info_log(program: GLuint) -> String {
    let mut len: GLint = 0;
    // SAFETY: same contract as shader_info_log.
    unsafe { gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len) };
    let mut buf = vec![0u8; len.max(1) as usize];
    let mut written: GLint = 0;
    unsafe {
        gl::GetProgramInfoLog(program, len, &mut written, buf.as_mut_ptr() as *mut GLchar);
    }
    buf.truncate(written.max(0) as usize);
    String::from_utf8_lossy(&buf).into_owned()
}
