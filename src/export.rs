//! Export orchestration and delivery of the finished video.

/// Delivery sinks for finished videos.
pub(crate) mod delivery;
/// Single-flight frame-to-video exporter.
pub(crate) mod exporter;
