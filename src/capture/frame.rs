//! Captured video frame.

/// Bytes per pixel of the packed RGB8 layout.
pub const RGB_CHANNELS: usize = 3;

/// A single RGB8 frame from the camera at its native size.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB8 pixel data, row-major.
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// Monotonic sequence number within one camera session.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame with the given parameters.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            sequence,
        }
    }

    /// Packed RGB8 pixel data, row-major.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Position of the frame within its camera stream, starting at 1.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Expected buffer length for the frame's dimensions.
    #[inline]
    pub fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * RGB_CHANNELS
    }

    /// Checks that the pixel buffer matches the dimensions and is non-empty.
    pub fn is_valid(&self) -> bool {
        !self.pixels.is_empty() && self.pixels.len() == self.expected_len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}
