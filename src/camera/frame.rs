use anyhow::{anyhow, Result};
use image::RgbImage;

/// One captured RGB24 frame.
///
/// A frame is owned by the pipeline iteration that captured it and is
/// consumed by annotation; it is never shared across iterations.
#[derive(Debug)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    /// Wrap tightly packed RGB24 pixels, validating the buffer length.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Hand the pixels over to the drawing layer.
    pub fn into_image(self) -> RgbImage {
        // Length was validated at construction.
        RgbImage::from_raw(self.width, self.height, self.pixels)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}
