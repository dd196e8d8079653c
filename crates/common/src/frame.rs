//! The caller-owned raw frame buffer.

use crate::types::Resolution;

/// Bytes per pixel for packed RGB565.
pub const BYTES_PER_PIXEL: usize = 2;

/// A fixed-capacity raw pixel buffer in packed 16-bit RGB565 row-major
/// order, top-down.
///
/// The buffer is owned by the caller for the whole session. Between draw
/// calls the caller fills it via [`as_bytes_mut`](Self::as_bytes_mut); the
/// pipeline reads it in full during a draw and never retains a reference
/// past the call. Passing it by `&FrameBuffer` into `draw` is what makes
/// the single-writer/single-reader hand-off a compile-time property: the
/// caller cannot mutate the buffer while a draw borrows it.
///
/// The pipeline never resizes the buffer; its capacity is fixed at
/// `width * height * 2` bytes on construction.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    data: Vec<u8>,
    resolution: Resolution,
}

impl FrameBuffer {
    /// Allocate a zero-filled buffer for the given frame size.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            data: vec![0; resolution.rgb565_byte_size()],
            resolution,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Total capacity in bytes (`width * height * 2`).
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// The full frame contents, always read from the start.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access for the producer. The caller must not call this
    /// while a draw call is in progress; the borrow checker enforces it.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_matches_resolution() {
        let buf = FrameBuffer::new(Resolution::CIF);
        assert_eq!(buf.byte_len(), 352 * 288 * BYTES_PER_PIXEL);
        assert_eq!(buf.resolution(), Resolution::CIF);
    }

    #[test]
    fn starts_zeroed() {
        let buf = FrameBuffer::new(Resolution::new(4, 2));
        assert!(buf.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn mutation_is_visible() {
        let mut buf = FrameBuffer::new(Resolution::new(2, 2));
        buf.as_bytes_mut()[0] = 0xAB;
        assert_eq!(buf.as_bytes()[0], 0xAB);
    }
}
