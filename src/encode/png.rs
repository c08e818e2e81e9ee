use std::io::Cursor;

use crate::{
    foundation::core::FrameIndex,
    foundation::error::{ReelError, ReelResult},
    render::frame::FrameRGBA,
};

/// Extension of the staged still images.
pub const FRAME_IMAGE_EXT: &str = "png";

/// Canonical staging name for a frame: `frame_` + index zero-padded to at least three digits.
///
/// Indices past 999 widen rather than truncate, so `frame_%03d` input globbing keeps temporal
/// order for any sequence length.
pub fn frame_file_name(idx: FrameIndex) -> String {
    format!("frame_{:03}.{FRAME_IMAGE_EXT}", idx.0)
}

/// Losslessly encode a straight-alpha RGBA8 frame as PNG.
pub fn encode_png(frame: &FrameRGBA) -> ReelResult<Vec<u8>> {
    if frame.is_empty() {
        return Err(ReelError::codec(format!(
            "cannot encode zero-area frame ({}x{})",
            frame.width(),
            frame.height()
        )));
    }

    let img = image::RgbaImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| ReelError::codec("frame buffer does not match its dimensions"))?;

    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ReelError::codec(format!("png encode failed: {e}")))?;
    Ok(buf)
}

/// Decode PNG bytes back into a straight-alpha RGBA8 frame.
pub fn decode_png(bytes: &[u8]) -> ReelResult<FrameRGBA> {
    let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .map_err(|e| ReelError::codec(format!("png decode failed: {e}")))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    FrameRGBA::new(width, height, rgba.into_raw())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/png.rs"]
mod tests;
