//! reelkit turns a short generated animation into an MP4.
//!
//! The pipeline is leaf-first:
//!
//! - [`generate_frames`] draws each frame into a [`RasterSink`] (the crate ships [`CpuCanvas`])
//! - [`encode_png`] turns every [`FrameRGBA`] into a lossless PNG
//! - an [`EncoderSession`] stages the PNGs into an [`EncoderBackend`] and runs one fixed encode
//! - [`VideoExporter`] drives the whole thing, hands the result to a [`DeliverySink`] and cleans up
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod encode;
mod export;
mod foundation;
mod generate;
mod render;

pub use crate::foundation::cancel::CancelToken;
pub use crate::foundation::core::{Canvas, FrameIndex, Rgba8};
pub use crate::foundation::error::{ReelError, ReelResult};

pub use crate::render::cpu::CpuCanvas;
pub use crate::render::frame::FrameRGBA;
pub use crate::render::sink::RasterSink;

pub use crate::generate::frames::{
    FrameGenConfig, generate_default_frames, generate_frames, render_frame,
};

pub use crate::encode::command::{EncodeCommand, OUTPUT_FILE_NAME};
pub use crate::encode::ffmpeg::{FFMPEG_ENV, FfmpegBackend, FfmpegOpts, is_ffmpeg_on_path};
pub use crate::encode::memory::{
    BackendCall, CallJournal, FailPoint, MEMORY_VIDEO_MAGIC, MemoryBackend,
};
pub use crate::encode::png::{FRAME_IMAGE_EXT, decode_png, encode_png, frame_file_name};
pub use crate::encode::session::{EncoderBackend, EncoderSession, SessionState};

pub use crate::export::delivery::{
    DeliverySink, DirectoryDelivery, MemoryDelivery, VIDEO_CONTENT_TYPE, VideoAsset,
    export_file_name,
};
pub use crate::export::exporter::{
    EXPORT_FAILED_MESSAGE, ExportOpts, ExportOutcome, ExportStage, ExportState, FailureNotifier,
    LogNotifier, VideoExporter,
};
