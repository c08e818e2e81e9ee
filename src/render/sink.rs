use crate::{foundation::core::Rgba8, foundation::error::ReelResult, render::frame::FrameRGBA};

/// A 2D raster surface the frame generator draws into.
///
/// Coordinates are in surface pixels with the origin at the top-left corner. Implementations
/// decide anti-aliasing; callers may rely on determinism only within one implementation.
pub trait RasterSink {
    /// Replace the pixels in the given rectangle with `color`.
    fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgba8)
    -> ReelResult<()>;

    /// Fill a full circle (0..2π sweep) of `radius` centred at `(cx, cy)`.
    fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgba8) -> ReelResult<()>;

    /// Read back the current contents of the given region as a new frame.
    fn capture(&mut self, x: u32, y: u32, width: u32, height: u32) -> ReelResult<FrameRGBA>;
}
