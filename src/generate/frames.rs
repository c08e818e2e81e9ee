use std::path::Path;

use anyhow::Context as _;

use crate::{
    foundation::core::{FrameIndex, Rgba8},
    foundation::error::{ReelError, ReelResult},
    render::{cpu::CpuCanvas, frame::FrameRGBA, sink::RasterSink},
};

/// Parameters of the moving-circle animation.
///
/// Frame `i` draws one circle centred at `(start_x + i * step_x, y)` over a full-canvas
/// background fill.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameGenConfig {
    /// Number of frames to generate; 0 yields an empty sequence.
    #[serde(alias = "frameCount")]
    pub frame_count: u32,
    /// Full-canvas fill drawn first on every frame.
    #[serde(alias = "backgroundColor")]
    pub background: Rgba8,
    /// Fill color of the moving circle.
    #[serde(alias = "circleColor")]
    pub circle: Rgba8,
    /// Circle radius in pixels; must be finite and >= 0.
    #[serde(alias = "circleRadius")]
    pub circle_radius: f64,
    /// Circle centre x on frame 0.
    #[serde(alias = "startX")]
    pub start_x: f64,
    /// Horizontal displacement per frame.
    #[serde(alias = "stepX")]
    pub step_x: f64,
    /// Circle centre y, constant across frames.
    pub y: f64,
}

impl Default for FrameGenConfig {
    fn default() -> Self {
        Self {
            frame_count: 10,
            background: Rgba8::WHITE,
            circle: Rgba8::BLACK,
            circle_radius: 20.0,
            start_x: 20.0,
            step_x: 15.0,
            y: 50.0,
        }
    }
}

impl FrameGenConfig {
    /// Load a config from a JSON file. Missing fields take their default values.
    pub fn from_path(path: impl AsRef<Path>) -> ReelResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read frame config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parse frame config '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject a negative or non-finite radius and non-finite coordinates.
    pub fn validate(&self) -> ReelResult<()> {
        if !self.circle_radius.is_finite() || self.circle_radius < 0.0 {
            return Err(ReelError::validation(
                "circle_radius must be finite and >= 0",
            ));
        }
        if ![self.start_x, self.step_x, self.y]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ReelError::validation(
                "start_x/step_x/y must be finite numbers",
            ));
        }
        Ok(())
    }

    /// Horizontal circle centre for `frame`.
    pub fn frame_center_x(&self, frame: FrameIndex) -> f64 {
        self.start_x + frame.0 as f64 * self.step_x
    }
}

/// Draw and capture `cfg.frame_count` frames, in order, through `sink`.
///
/// Each frame clears the full `width x height` extent to `cfg.background`, fills the circle and
/// captures the full extent exactly once.
#[tracing::instrument(skip(sink, cfg), fields(frames = cfg.frame_count))]
pub fn generate_frames(
    sink: &mut dyn RasterSink,
    width: u32,
    height: u32,
    cfg: &FrameGenConfig,
) -> ReelResult<Vec<FrameRGBA>> {
    cfg.validate()?;

    let mut frames = Vec::with_capacity(cfg.frame_count as usize);
    for i in 0..u64::from(cfg.frame_count) {
        frames.push(draw_frame(sink, width, height, cfg, FrameIndex(i))?);
    }

    tracing::debug!(count = frames.len(), "generated frames");
    Ok(frames)
}

/// Draw and capture the single frame `idx`, which need not be below `cfg.frame_count`.
pub fn render_frame(
    sink: &mut dyn RasterSink,
    width: u32,
    height: u32,
    cfg: &FrameGenConfig,
    idx: FrameIndex,
) -> ReelResult<FrameRGBA> {
    cfg.validate()?;
    draw_frame(sink, width, height, cfg, idx)
}

fn draw_frame(
    sink: &mut dyn RasterSink,
    width: u32,
    height: u32,
    cfg: &FrameGenConfig,
    idx: FrameIndex,
) -> ReelResult<FrameRGBA> {
    sink.clear_rect(0.0, 0.0, f64::from(width), f64::from(height), cfg.background)?;
    sink.fill_circle(cfg.frame_center_x(idx), cfg.y, cfg.circle_radius, cfg.circle)?;
    sink.capture(0, 0, width, height)
}

/// Generate the default animation on a fresh [`CpuCanvas`].
pub fn generate_default_frames(width: u32, height: u32) -> ReelResult<Vec<FrameRGBA>> {
    let mut canvas = CpuCanvas::new(width, height)?;
    generate_frames(&mut canvas, width, height, &FrameGenConfig::default())
}

#[cfg(test)]
#[path = "../../tests/unit/generate/frames.rs"]
mod tests;
