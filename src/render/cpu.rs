use vello_cpu::kurbo::Shape as _;

use crate::{
    foundation::core::{Canvas, Rgba8},
    foundation::error::{ReelError, ReelResult},
    render::{frame::FrameRGBA, sink::RasterSink},
};

const CIRCLE_TOLERANCE: f64 = 0.1;

/// CPU raster sink backed by `vello_cpu`.
///
/// Draw calls are recorded and replayed into a fresh pixmap on every [`capture`]; this keeps the
/// canvas free of long-lived render state and makes captures deterministic.
///
/// [`capture`]: RasterSink::capture
pub struct CpuCanvas {
    width: u16,
    height: u16,
    ops: Vec<CanvasOp>,
}

#[derive(Clone, Copy, Debug)]
enum CanvasOp {
    Rect {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        color: Rgba8,
    },
    Circle {
        cx: f64,
        cy: f64,
        radius: f64,
        color: Rgba8,
    },
}

impl CpuCanvas {
    /// Create an empty canvas. Both dimensions must be non-zero and fit in `u16`.
    pub fn new(width: u32, height: u32) -> ReelResult<Self> {
        Self::with_canvas(Canvas::new(width, height)?)
    }

    /// Create an empty canvas covering `canvas`.
    pub fn with_canvas(canvas: Canvas) -> ReelResult<Self> {
        let width: u16 = canvas
            .width
            .try_into()
            .map_err(|_| ReelError::validation("canvas width exceeds u16"))?;
        let height: u16 = canvas
            .height
            .try_into()
            .map_err(|_| ReelError::validation("canvas height exceeds u16"))?;
        Ok(Self {
            width,
            height,
            ops: Vec::new(),
        })
    }

    /// Extent of this canvas.
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Canvas width in pixels.
    pub fn width(&self) -> u32 {
        u32::from(self.width)
    }

    /// Canvas height in pixels.
    pub fn height(&self) -> u32 {
        u32::from(self.height)
    }

    fn covers_canvas(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> bool {
        x0 <= 0.0 && y0 <= 0.0 && x1 >= f64::from(self.width) && y1 >= f64::from(self.height)
    }

    fn render_premul(&self) -> vello_cpu::Pixmap {
        let mut ctx = vello_cpu::RenderContext::new(self.width, self.height);
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        for op in &self.ops {
            match *op {
                CanvasOp::Rect {
                    x0,
                    y0,
                    x1,
                    y1,
                    color,
                } => {
                    ctx.set_paint(to_cpu_color(color));
                    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(x0, y0, x1, y1));
                }
                CanvasOp::Circle {
                    cx,
                    cy,
                    radius,
                    color,
                } => {
                    ctx.set_paint(to_cpu_color(color));
                    let path = vello_cpu::kurbo::Circle::new((cx, cy), radius)
                        .to_path(CIRCLE_TOLERANCE);
                    ctx.fill_path(&path);
                }
            }
        }
        ctx.flush();

        let mut pixmap = vello_cpu::Pixmap::new(self.width, self.height);
        ctx.render_to_pixmap(&mut pixmap);
        pixmap
    }
}

impl RasterSink for CpuCanvas {
    fn clear_rect(
        &mut self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Rgba8,
    ) -> ReelResult<()> {
        if ![x, y, width, height].iter().all(|v| v.is_finite()) {
            return Err(ReelError::validation("clear_rect coordinates must be finite"));
        }
        let (x0, x1) = (x.min(x + width), x.max(x + width));
        let (y0, y1) = (y.min(y + height), y.max(y + height));

        // A full-extent clear hides everything recorded so far.
        if self.covers_canvas(x0, y0, x1, y1) {
            self.ops.clear();
        }
        self.ops.push(CanvasOp::Rect {
            x0,
            y0,
            x1,
            y1,
            color,
        });
        Ok(())
    }

    fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgba8) -> ReelResult<()> {
        if !cx.is_finite() || !cy.is_finite() || !radius.is_finite() {
            return Err(ReelError::validation("fill_circle parameters must be finite"));
        }
        if radius < 0.0 {
            return Err(ReelError::validation("fill_circle radius must be >= 0"));
        }
        if radius > 0.0 {
            self.ops.push(CanvasOp::Circle {
                cx,
                cy,
                radius,
                color,
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn capture(&mut self, x: u32, y: u32, width: u32, height: u32) -> ReelResult<FrameRGBA> {
        let (cw, ch) = (self.width(), self.height());
        if x.checked_add(width).is_none_or(|r| r > cw) || y.checked_add(height).is_none_or(|b| b > ch)
        {
            return Err(ReelError::validation(format!(
                "capture region {width}x{height}+{x}+{y} exceeds canvas {cw}x{ch}"
            )));
        }

        let pixmap = self.render_premul();
        let src = pixmap.data_as_u8_slice();
        let row_bytes = cw as usize * 4;

        let mut out = Vec::with_capacity(width as usize * height as usize * 4);
        for row in y..y + height {
            let start = row as usize * row_bytes + x as usize * 4;
            let end = start + width as usize * 4;
            out.extend_from_slice(&src[start..end]);
        }
        unpremultiply_rgba8_in_place(&mut out);
        FrameRGBA::new(width, height, out)
    }
}

fn to_cpu_color(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        match a {
            0 => {
                px[0] = 0;
                px[1] = 0;
                px[2] = 0;
            }
            255 => {}
            _ => {
                for c in &mut px[..3] {
                    *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
