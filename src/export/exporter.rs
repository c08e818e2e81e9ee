use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use rayon::prelude::*;

use crate::{
    encode::{
        command::{EncodeCommand, OUTPUT_FILE_NAME},
        png::{encode_png, frame_file_name},
        session::{EncoderBackend, EncoderSession},
    },
    export::delivery::{DeliverySink, VideoAsset, export_file_name},
    foundation::cancel::CancelToken,
    foundation::core::FrameIndex,
    foundation::error::{ReelError, ReelResult},
    render::frame::FrameRGBA,
};

/// The single user-facing message reported for any failed export.
pub const EXPORT_FAILED_MESSAGE: &str = "video export failed";

/// Busy state of one [`VideoExporter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportState {
    /// No export in flight.
    Idle,
    /// An export is running; the caller should keep its trigger disabled.
    Exporting,
}

/// Pipeline step an export failed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportStage {
    /// [`ExportOpts`] were rejected before any backend work started.
    Configure,
    /// Building or loading the encoder backend.
    Load,
    /// Converting frame `i` to PNG.
    EncodeFrame(FrameIndex),
    /// Writing frame `i` into the backend namespace.
    StageFrame(FrameIndex),
    /// Running the encode command.
    Invoke,
    /// Reading the encoded video back.
    ReadOutput,
    /// Handing the video to the [`DeliverySink`].
    Deliver,
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configure => f.write_str("configure"),
            Self::Load => f.write_str("load"),
            Self::EncodeFrame(i) => write!(f, "encode frame {}", i.0),
            Self::StageFrame(i) => write!(f, "stage frame {}", i.0),
            Self::Invoke => f.write_str("invoke"),
            Self::ReadOutput => f.write_str("read output"),
            Self::Deliver => f.write_str("deliver"),
        }
    }
}

/// Terminal result of [`VideoExporter::export_video`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// No frames were given; nothing ran.
    Skipped,
    /// The video reached the delivery sink.
    Delivered {
        /// Name the asset was delivered under (`frames_{n}_export.mp4`).
        file_name: String,
        /// Size of the encoded video.
        byte_len: usize,
        /// Number of frames exported.
        frames: usize,
    },
    /// A pipeline step failed; nothing was delivered.
    Failed {
        /// Step that failed.
        stage: ExportStage,
        /// Diagnostic detail (the user-facing notification is always [`EXPORT_FAILED_MESSAGE`]).
        message: String,
    },
}

impl ExportOutcome {
    /// Whether the export reached the delivery sink.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Whether the export failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Options for [`VideoExporter`].
#[derive(Clone, Debug, Default)]
pub struct ExportOpts {
    /// Encode frames to PNG on a rayon pool. Staging stays sequential and in frame order.
    pub parallel: bool,
    /// Override rayon worker threads (parallel mode only).
    pub threads: Option<usize>,
}

/// Receives the user-visible notification of a failed export.
pub trait FailureNotifier: Send + Sync {
    /// Called exactly once per failed export with [`EXPORT_FAILED_MESSAGE`].
    fn export_failed(&self, message: &str);
}

/// Default notifier: reports through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl FailureNotifier for LogNotifier {
    fn export_failed(&self, message: &str) {
        tracing::error!("{message}");
    }
}

type BackendFactory = Box<dyn Fn() -> Box<dyn EncoderBackend> + Send + Sync>;
type StateListener = Box<dyn Fn(ExportState) + Send + Sync>;

/// Single-flight frame-to-video exporter.
///
/// Each call to [`export_video`](Self::export_video) builds a fresh encoder backend from the
/// factory, stages every frame as PNG, runs the fixed encode command, delivers the result and
/// cleans up. The [`ExportState`] flag is advisory: overlapping calls are not rejected, so the
/// caller must keep its trigger disabled while [`is_exporting`](Self::is_exporting) is true.
pub struct VideoExporter {
    factory: BackendFactory,
    opts: ExportOpts,
    notifier: Box<dyn FailureNotifier>,
    state: Mutex<ExportState>,
    listeners: Mutex<Vec<StateListener>>,
}

impl VideoExporter {
    /// Create an idle exporter that builds one backend per export from `factory`.
    pub fn new<F, B>(factory: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: EncoderBackend + 'static,
    {
        Self {
            factory: Box::new(move || Box::new(factory()) as Box<dyn EncoderBackend>),
            opts: ExportOpts::default(),
            notifier: Box::new(LogNotifier),
            state: Mutex::new(ExportState::Idle),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Replace the export options.
    pub fn with_opts(mut self, opts: ExportOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Replace the default [`LogNotifier`].
    pub fn with_notifier(mut self, notifier: impl FailureNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Current busy state; safe to call from another thread during an export.
    pub fn state(&self) -> ExportState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shorthand for `state() == ExportState::Exporting`.
    pub fn is_exporting(&self) -> bool {
        self.state() == ExportState::Exporting
    }

    /// Register a callback invoked on every state transition.
    ///
    /// Callbacks run on the exporting thread and must not call `subscribe` themselves.
    pub fn subscribe(&self, listener: impl Fn(ExportState) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Export `frames` (each `width x height`) as one MP4 and hand it to `delivery`.
    ///
    /// Never returns an error: failures are logged with their stage, reported once through the
    /// [`FailureNotifier`] and returned as [`ExportOutcome::Failed`]. The state is back to
    /// [`ExportState::Idle`] whenever this returns.
    #[tracing::instrument(skip_all, fields(frames = frames.len(), width = width, height = height))]
    pub fn export_video(
        &self,
        frames: Vec<FrameRGBA>,
        width: u32,
        height: u32,
        delivery: &mut dyn DeliverySink,
        cancel: &CancelToken,
    ) -> ExportOutcome {
        if frames.is_empty() {
            tracing::debug!("no frames; export skipped");
            return ExportOutcome::Skipped;
        }

        let _busy = BusyGuard::enter(self);
        let frame_count = frames.len();

        let mut session = EncoderSession::new((self.factory)());
        let result = self.run(&mut session, frames, width, height, delivery, cancel);

        let deleted = session.cleanup();
        tracing::debug!(deleted, leftover = session.staged().len(), "cleanup finished");

        match result {
            Ok((file_name, byte_len)) => ExportOutcome::Delivered {
                file_name,
                byte_len,
                frames: frame_count,
            },
            Err((stage, err)) => {
                tracing::error!(stage = %stage, error = %err, "export failed");
                self.notifier.export_failed(EXPORT_FAILED_MESSAGE);
                ExportOutcome::Failed {
                    stage,
                    message: err.to_string(),
                }
            }
        }
    }

    fn run(
        &self,
        session: &mut EncoderSession<Box<dyn EncoderBackend>>,
        frames: Vec<FrameRGBA>,
        width: u32,
        height: u32,
        delivery: &mut dyn DeliverySink,
        cancel: &CancelToken,
    ) -> Result<(String, usize), (ExportStage, ReelError)> {
        let frame_count = frames.len();
        let pool = if self.opts.parallel {
            Some(build_thread_pool(self.opts.threads).map_err(|e| (ExportStage::Configure, e))?)
        } else {
            None
        };

        session
            .ensure_loaded(cancel)
            .map_err(|e| (ExportStage::Load, e))?;

        if let Some(pool) = pool {
            let encoded: Vec<ReelResult<Vec<u8>>> = pool.install(|| {
                frames
                    .par_iter()
                    .map(|f| encode_frame(f, width, height))
                    .collect()
            });
            drop(frames);
            for (i, png) in encoded.into_iter().enumerate() {
                let idx = FrameIndex(i as u64);
                let png = png.map_err(|e| (ExportStage::EncodeFrame(idx), e))?;
                stage_frame(session, idx, &png, cancel)?;
            }
        } else {
            for (i, frame) in frames.into_iter().enumerate() {
                let idx = FrameIndex(i as u64);
                let png = encode_frame(&frame, width, height)
                    .map_err(|e| (ExportStage::EncodeFrame(idx), e))?;
                stage_frame(session, idx, &png, cancel)?;
            }
        }

        let cmd = EncodeCommand::default();
        session
            .invoke(&cmd, cancel)
            .map_err(|e| (ExportStage::Invoke, e))?;

        let bytes = cancel
            .check()
            .and_then(|()| session.read_output(OUTPUT_FILE_NAME))
            .map_err(|e| (ExportStage::ReadOutput, e))?;
        let asset = VideoAsset::mp4(export_file_name(frame_count), bytes);
        let (file_name, byte_len) = (asset.file_name.clone(), asset.bytes.len());

        delivery
            .deliver(asset)
            .map_err(|e| (ExportStage::Deliver, e))?;
        tracing::info!(file_name = %file_name, byte_len, "export delivered");
        Ok((file_name, byte_len))
    }

    fn set_state(&self, next: ExportState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(next);
        }
    }
}

/// Holds the exporter in [`ExportState::Exporting`]; dropping it returns to `Idle`, including
/// during unwinding.
struct BusyGuard<'a> {
    exporter: &'a VideoExporter,
}

impl<'a> BusyGuard<'a> {
    fn enter(exporter: &'a VideoExporter) -> Self {
        // Bind first: a listener panicking on `Exporting` must still see the reset.
        let guard = Self { exporter };
        exporter.set_state(ExportState::Exporting);
        guard
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.exporter.set_state(ExportState::Idle);
    }
}

fn encode_frame(frame: &FrameRGBA, width: u32, height: u32) -> ReelResult<Vec<u8>> {
    if frame.width() != width || frame.height() != height {
        return Err(ReelError::codec(format!(
            "frame size mismatch: got {}x{}, expected {width}x{height}",
            frame.width(),
            frame.height()
        )));
    }
    encode_png(frame)
}

fn stage_frame(
    session: &mut EncoderSession<Box<dyn EncoderBackend>>,
    idx: FrameIndex,
    png: &[u8],
    cancel: &CancelToken,
) -> Result<(), (ExportStage, ReelError)> {
    cancel
        .check()
        .and_then(|()| session.stage_input(&frame_file_name(idx), png))
        .map_err(|e| (ExportStage::StageFrame(idx), e))
}

fn build_thread_pool(threads: Option<usize>) -> ReelResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ReelError::validation(
            "export threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ReelError::validation(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/export/exporter.rs"]
mod tests;
