use crate::foundation::error::{ReelError, ReelResult};

/// One captured raster frame.
///
/// Pixels are row-major RGBA8 with **straight** (non-premultiplied) alpha. A frame is
/// immutable once built; ownership moves forward through the export pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameRGBA {
    /// Wrap `data` as a `width x height` frame.
    ///
    /// Zero-area frames are representable (they fail later, at PNG encoding); a buffer whose
    /// length is not `width * height * 4` is rejected here.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> ReelResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(ReelError::validation(format!(
                "frame data length {} does not match {width}x{height}x4 = {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with a single color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major straight-alpha RGBA8 bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the frame has zero area.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGBA of the pixel at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let off = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(off..off + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/frame.rs"]
mod tests;
