use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Interleaved 8-bit RGB pixel buffer, row-major, `width * height * 3` bytes.
///
/// This is the layout the inference engine expects for image input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Bitmap {
    /// Convert a decoded image, discarding alpha.
    ///
    /// Channels are widened to 16 bits and truncated back to the high byte,
    /// so 8-bit sources pass through unchanged and deeper sources are
    /// downsampled consistently.
    pub fn from_image(img: &DynamicImage) -> Self {
        let wide = img.to_rgba16();
        let (width, height) = wide.dimensions();
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for px in wide.pixels() {
            let [r, g, b, _a] = px.0;
            data.extend_from_slice(&[(r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8]);
        }
        Self {
            width,
            height,
            data,
        }
    }
}

/// Holds the most recently uploaded camera frame.
///
/// Uploads replace the frame wholesale; there is no queue, so a frame that
/// arrives while a caption is being generated is only seen by the next cycle.
#[derive(Debug, Default)]
pub struct FrameStore {
    frame: Mutex<Option<DynamicImage>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, img: DynamicImage) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(img);
    }

    /// Decode an encoded image (JPEG, PNG, ...) and make it the current frame.
    /// The stored frame is untouched when decoding fails.
    pub fn decode_and_set(&self, bytes: &[u8]) -> Result<(), FrameError> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)?
            .decode()?;
        debug!(width = img.width(), height = img.height(), bytes = bytes.len(), "frame decoded");
        self.set(img);
        Ok(())
    }

    pub fn has_frame(&self) -> bool {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Convert the current frame to a [`Bitmap`]. The lock is held for the
    /// whole scan so an upload can't swap the frame out from under it.
    pub fn to_bitmap(&self) -> Result<Bitmap, NoFrame> {
        let guard = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        let img = guard.as_ref().ok_or(NoFrame)?;
        Ok(Bitmap::from_image(img))
    }
}

/// Nothing has been uploaded yet. Expected at startup, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no frame received yet")]
pub struct NoFrame;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}
