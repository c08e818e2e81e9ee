use std::sync::{Arc, Mutex};

use super::*;
use crate::{
    encode::memory::{BackendCall, CallJournal, FailPoint, MemoryBackend},
    export::delivery::MemoryDelivery,
    generate::frames::generate_default_frames,
};

#[derive(Clone, Default)]
struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    fn push(&self, e: impl Into<String>) {
        self.0.lock().unwrap().push(e.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

#[derive(Clone, Default)]
struct CountingNotifier(Arc<Mutex<Vec<String>>>);

impl FailureNotifier for CountingNotifier {
    fn export_failed(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_owned());
    }
}

/// Forwards to a [`MemoryBackend`] and logs `load` into a shared event list.
struct ObservingBackend {
    inner: MemoryBackend,
    events: Events,
}

impl EncoderBackend for ObservingBackend {
    fn name(&self) -> &str {
        "observing"
    }

    fn load(&mut self, cancel: &CancelToken) -> ReelResult<()> {
        self.events.push("load");
        self.inner.load(cancel)
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> ReelResult<()> {
        self.inner.write_file(name, bytes)
    }

    fn exec(&mut self, cmd: &EncodeCommand, cancel: &CancelToken) -> ReelResult<()> {
        self.events.push("exec");
        self.inner.exec(cmd, cancel)
    }

    fn read_file(&mut self, name: &str) -> ReelResult<Vec<u8>> {
        self.inner.read_file(name)
    }

    fn delete_file(&mut self, name: &str) -> ReelResult<()> {
        self.inner.delete_file(name)
    }
}

/// Cancels `token` once `after` files have been written.
struct CancellingBackend {
    inner: MemoryBackend,
    token: CancelToken,
    after: usize,
    writes: usize,
}

impl EncoderBackend for CancellingBackend {
    fn name(&self) -> &str {
        "cancelling"
    }

    fn load(&mut self, cancel: &CancelToken) -> ReelResult<()> {
        self.inner.load(cancel)
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> ReelResult<()> {
        self.inner.write_file(name, bytes)?;
        self.writes += 1;
        if self.writes == self.after {
            self.token.cancel();
        }
        Ok(())
    }

    fn exec(&mut self, cmd: &EncodeCommand, cancel: &CancelToken) -> ReelResult<()> {
        self.inner.exec(cmd, cancel)
    }

    fn read_file(&mut self, name: &str) -> ReelResult<Vec<u8>> {
        self.inner.read_file(name)
    }

    fn delete_file(&mut self, name: &str) -> ReelResult<()> {
        self.inner.delete_file(name)
    }
}

struct PanickingDelivery;

impl DeliverySink for PanickingDelivery {
    fn deliver(&mut self, _asset: VideoAsset) -> ReelResult<()> {
        panic!("delivery exploded");
    }
}

struct FailingDelivery;

impl DeliverySink for FailingDelivery {
    fn deliver(&mut self, _asset: VideoAsset) -> ReelResult<()> {
        Err(ReelError::io("disk full"))
    }
}

fn journaled_exporter(journal: &CallJournal) -> VideoExporter {
    let journal = journal.clone();
    VideoExporter::new(move || MemoryBackend::new().with_journal(journal.clone()))
}

fn failing_exporter(
    journal: &CallJournal,
    at: FailPoint,
    notifier: &CountingNotifier,
) -> VideoExporter {
    let journal = journal.clone();
    VideoExporter::new(move || {
        MemoryBackend::new()
            .with_journal(journal.clone())
            .failing(at.clone())
    })
    .with_notifier(notifier.clone())
}

fn small_frames(n: usize) -> Vec<FrameRGBA> {
    (0..n)
        .map(|i| FrameRGBA::solid(4, 4, [i as u8, 0, 0, 255]))
        .collect()
}

fn written_names(journal: &CallJournal) -> Vec<String> {
    journal
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::Write { name, .. } => Some(name),
            _ => None,
        })
        .collect()
}

fn deleted_names(journal: &CallJournal) -> Vec<String> {
    journal
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::Delete { name } => Some(name),
            _ => None,
        })
        .collect()
}

#[test]
fn empty_input_is_skipped_without_touching_the_backend() {
    let built = Arc::new(Mutex::new(0usize));
    let counter = built.clone();
    let exporter = VideoExporter::new(move || {
        *counter.lock().unwrap() += 1;
        MemoryBackend::new()
    });
    let events = Events::default();
    let sink_events = events.clone();
    exporter.subscribe(move |s| sink_events.push(format!("{s:?}")));

    let mut delivery = MemoryDelivery::new();
    let outcome = exporter.export_video(Vec::new(), 200, 200, &mut delivery, &CancelToken::new());

    assert_eq!(outcome, ExportOutcome::Skipped);
    assert_eq!(*built.lock().unwrap(), 0);
    assert!(events.take().is_empty());
    assert_eq!(exporter.state(), ExportState::Idle);
    assert!(delivery.assets().is_empty());
}

#[test]
fn state_is_exporting_before_load_and_idle_after_success() {
    let events = Events::default();
    let backend_events = events.clone();
    let exporter = VideoExporter::new(move || ObservingBackend {
        inner: MemoryBackend::new(),
        events: backend_events.clone(),
    });
    let listener_events = events.clone();
    exporter.subscribe(move |s| listener_events.push(format!("{s:?}")));

    let mut delivery = MemoryDelivery::new();
    let outcome = exporter.export_video(small_frames(2), 4, 4, &mut delivery, &CancelToken::new());

    assert!(outcome.is_delivered());
    assert_eq!(events.take(), ["Exporting", "load", "exec", "Idle"]);
    assert!(!exporter.is_exporting());
}

#[test]
fn state_returns_to_idle_after_failure() {
    let events = Events::default();
    let backend_events = events.clone();
    let exporter = VideoExporter::new(move || ObservingBackend {
        inner: MemoryBackend::new().failing(FailPoint::Exec),
        events: backend_events.clone(),
    })
    .with_notifier(CountingNotifier::default());
    let listener_events = events.clone();
    exporter.subscribe(move |s| listener_events.push(format!("{s:?}")));

    let mut delivery = MemoryDelivery::new();
    let outcome = exporter.export_video(small_frames(1), 4, 4, &mut delivery, &CancelToken::new());

    assert!(outcome.is_failed());
    assert_eq!(events.take(), ["Exporting", "load", "exec", "Idle"]);
    assert_eq!(exporter.state(), ExportState::Idle);
}

#[test]
fn single_frame_export_uses_each_operation_once() {
    let journal = CallJournal::new();
    let exporter = journaled_exporter(&journal);
    let mut delivery = MemoryDelivery::new();

    let outcome = exporter.export_video(small_frames(1), 4, 4, &mut delivery, &CancelToken::new());

    match &outcome {
        ExportOutcome::Delivered {
            file_name, frames, ..
        } => {
            assert_eq!(file_name, "frames_1_export.mp4");
            assert_eq!(*frames, 1);
        }
        other => panic!("expected delivery, got {other:?}"),
    }
    assert_eq!(journal.count(|c| matches!(c, BackendCall::Load)), 1);
    assert_eq!(written_names(&journal), ["frame_000.png"]);
    assert_eq!(journal.count(|c| matches!(c, BackendCall::Exec { .. })), 1);
    assert_eq!(
        journal.count(|c| matches!(c, BackendCall::Read { name } if name == "output.mp4")),
        1
    );
    assert_eq!(deleted_names(&journal), ["frame_000.png", "output.mp4"]);
}

#[test]
fn default_ten_frame_export_delivers_named_mp4() {
    let journal = CallJournal::new();
    let exporter = journaled_exporter(&journal);
    let mut delivery = MemoryDelivery::new();
    let frames = generate_default_frames(200, 200).unwrap();

    let outcome = exporter.export_video(frames, 200, 200, &mut delivery, &CancelToken::new());
    assert!(outcome.is_delivered());

    let expected: Vec<String> = (0..10).map(|i| format!("frame_{i:03}.png")).collect();
    assert_eq!(written_names(&journal), expected);

    let exec_args = journal
        .calls()
        .into_iter()
        .find_map(|c| match c {
            BackendCall::Exec { args } => Some(args),
            _ => None,
        })
        .unwrap();
    assert_eq!(exec_args, EncodeCommand::default().to_args());

    let [asset] = delivery.assets() else {
        panic!("expected exactly one asset");
    };
    assert_eq!(asset.file_name, "frames_10_export.mp4");
    assert_eq!(asset.content_type, "video/mp4");
    assert!(asset.bytes.starts_with(crate::encode::memory::MEMORY_VIDEO_MAGIC));
    assert_eq!(&asset.bytes[8..12], &10u32.to_le_bytes());

    let mut deleted = deleted_names(&journal);
    deleted.sort();
    let mut all = expected;
    all.push("output.mp4".to_owned());
    all.sort();
    assert_eq!(deleted, all);
}

#[test]
fn load_failure_notifies_once_and_skips_cleanup() {
    let journal = CallJournal::new();
    let notifier = CountingNotifier::default();
    let exporter = failing_exporter(&journal, FailPoint::Load, &notifier);
    let mut delivery = MemoryDelivery::new();

    let outcome = exporter.export_video(small_frames(3), 4, 4, &mut delivery, &CancelToken::new());

    assert!(matches!(
        outcome,
        ExportOutcome::Failed {
            stage: ExportStage::Load,
            ..
        }
    ));
    assert_eq!(*notifier.0.lock().unwrap(), ["video export failed"]);
    assert_eq!(journal.calls(), [BackendCall::Load]);
    assert!(delivery.assets().is_empty());
}

#[test]
fn staging_failure_cleans_up_earlier_frames() {
    let journal = CallJournal::new();
    let notifier = CountingNotifier::default();
    let exporter = failing_exporter(
        &journal,
        FailPoint::Write("frame_002.png".to_owned()),
        &notifier,
    );
    let mut delivery = MemoryDelivery::new();

    let outcome = exporter.export_video(small_frames(5), 4, 4, &mut delivery, &CancelToken::new());

    assert!(matches!(
        outcome,
        ExportOutcome::Failed {
            stage: ExportStage::StageFrame(FrameIndex(2)),
            ..
        }
    ));
    assert_eq!(notifier.0.lock().unwrap().len(), 1);
    assert_eq!(journal.count(|c| matches!(c, BackendCall::Exec { .. })), 0);
    assert_eq!(deleted_names(&journal), ["frame_000.png", "frame_001.png"]);
    assert!(delivery.assets().is_empty());
}

#[test]
fn exec_failure_reports_stderr_and_cleans_up_frames() {
    let journal = CallJournal::new();
    let notifier = CountingNotifier::default();
    let exporter = failing_exporter(&journal, FailPoint::Exec, &notifier);
    let mut delivery = MemoryDelivery::new();

    let outcome = exporter.export_video(small_frames(2), 4, 4, &mut delivery, &CancelToken::new());

    match outcome {
        ExportOutcome::Failed { stage, message } => {
            assert_eq!(stage, ExportStage::Invoke);
            assert!(message.contains("Conversion failed!"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(notifier.0.lock().unwrap().len(), 1);
    assert_eq!(deleted_names(&journal), ["frame_000.png", "frame_001.png"]);
}

#[test]
fn read_failure_still_removes_the_output() {
    let journal = CallJournal::new();
    let notifier = CountingNotifier::default();
    let exporter = failing_exporter(&journal, FailPoint::Read, &notifier);
    let mut delivery = MemoryDelivery::new();

    let outcome = exporter.export_video(small_frames(1), 4, 4, &mut delivery, &CancelToken::new());

    assert!(matches!(
        outcome,
        ExportOutcome::Failed {
            stage: ExportStage::ReadOutput,
            ..
        }
    ));
    assert_eq!(deleted_names(&journal), ["frame_000.png", "output.mp4"]);
    assert!(delivery.assets().is_empty());
}

#[test]
fn delivery_failure_is_reported_as_deliver_stage() {
    let journal = CallJournal::new();
    let notifier = CountingNotifier::default();
    let exporter = journaled_exporter(&journal).with_notifier(notifier.clone());

    let outcome = exporter.export_video(
        small_frames(1),
        4,
        4,
        &mut FailingDelivery,
        &CancelToken::new(),
    );

    assert!(matches!(
        outcome,
        ExportOutcome::Failed {
            stage: ExportStage::Deliver,
            ..
        }
    ));
    assert_eq!(notifier.0.lock().unwrap().len(), 1);
    assert_eq!(deleted_names(&journal), ["frame_000.png", "output.mp4"]);
}

#[test]
fn cleanup_failure_does_not_fail_a_delivered_export() {
    let journal = CallJournal::new();
    let notifier = CountingNotifier::default();
    let exporter = failing_exporter(
        &journal,
        FailPoint::Delete("frame_000.png".to_owned()),
        &notifier,
    );
    let mut delivery = MemoryDelivery::new();

    let outcome = exporter.export_video(small_frames(2), 4, 4, &mut delivery, &CancelToken::new());

    assert!(outcome.is_delivered());
    assert!(notifier.0.lock().unwrap().is_empty());
    assert_eq!(
        deleted_names(&journal),
        ["frame_000.png", "frame_001.png", "output.mp4"]
    );
}

#[test]
fn mismatched_frame_size_fails_encoding() {
    let journal = CallJournal::new();
    let notifier = CountingNotifier::default();
    let exporter = journaled_exporter(&journal).with_notifier(notifier.clone());
    let frames = vec![
        FrameRGBA::solid(4, 4, [0, 0, 0, 255]),
        FrameRGBA::solid(5, 4, [0, 0, 0, 255]),
    ];

    let mut delivery = MemoryDelivery::new();
    let outcome = exporter.export_video(frames, 4, 4, &mut delivery, &CancelToken::new());

    match outcome {
        ExportOutcome::Failed { stage, message } => {
            assert_eq!(stage, ExportStage::EncodeFrame(FrameIndex(1)));
            assert!(message.contains("frame size mismatch"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(deleted_names(&journal), ["frame_000.png"]);
}

#[test]
fn cancellation_stops_staging_and_cleans_up() {
    let journal = CallJournal::new();
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let backend_journal = journal.clone();
    let exporter = VideoExporter::new(move || CancellingBackend {
        inner: MemoryBackend::new().with_journal(backend_journal.clone()),
        token: token.clone(),
        after: 2,
        writes: 0,
    })
    .with_notifier(CountingNotifier::default());

    let mut delivery = MemoryDelivery::new();
    let outcome = exporter.export_video(small_frames(5), 4, 4, &mut delivery, &cancel);

    match outcome {
        ExportOutcome::Failed { stage, message } => {
            assert_eq!(stage, ExportStage::StageFrame(FrameIndex(2)));
            assert_eq!(message, ReelError::Cancelled.to_string());
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(written_names(&journal).len(), 2);
    assert_eq!(deleted_names(&journal), ["frame_000.png", "frame_001.png"]);
}

#[test]
fn parallel_encoding_matches_sequential() {
    let frames = generate_default_frames(64, 64).unwrap();

    let mut sequential = MemoryDelivery::new();
    let outcome = VideoExporter::new(MemoryBackend::new).export_video(
        frames.clone(),
        64,
        64,
        &mut sequential,
        &CancelToken::new(),
    );
    assert!(outcome.is_delivered());

    let journal = CallJournal::new();
    let mut parallel = MemoryDelivery::new();
    let outcome = journaled_exporter(&journal)
        .with_opts(ExportOpts {
            parallel: true,
            threads: Some(3),
        })
        .export_video(frames, 64, 64, &mut parallel, &CancelToken::new());
    assert!(outcome.is_delivered());

    assert_eq!(sequential.assets(), parallel.assets());
    let expected: Vec<String> = (0..10).map(|i| format!("frame_{i:03}.png")).collect();
    assert_eq!(written_names(&journal), expected);
}

#[test]
fn zero_threads_is_rejected_before_loading() {
    let journal = CallJournal::new();
    let exporter = journaled_exporter(&journal)
        .with_opts(ExportOpts {
            parallel: true,
            threads: Some(0),
        })
        .with_notifier(CountingNotifier::default());
    let mut delivery = MemoryDelivery::new();
    let outcome = exporter.export_video(small_frames(1), 4, 4, &mut delivery, &CancelToken::new());
    assert!(matches!(
        outcome,
        ExportOutcome::Failed {
            stage: ExportStage::Configure,
            ..
        }
    ));
    assert!(journal.calls().is_empty());
}

#[test]
fn panicking_delivery_still_resets_state() {
    let exporter = VideoExporter::new(MemoryBackend::new);
    let events = Events::default();
    let listener_events = events.clone();
    exporter.subscribe(move |s| listener_events.push(format!("{s:?}")));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        exporter.export_video(
            small_frames(1),
            4,
            4,
            &mut PanickingDelivery,
            &CancelToken::new(),
        )
    }));

    assert!(result.is_err());
    assert_eq!(exporter.state(), ExportState::Idle);
    assert_eq!(events.take(), ["Exporting", "Idle"]);
}

#[test]
fn panicking_subscriber_still_resets_state() {
    let exporter = VideoExporter::new(MemoryBackend::new);
    exporter.subscribe(|s| {
        if s == ExportState::Exporting {
            panic!("listener exploded");
        }
    });

    let mut delivery = MemoryDelivery::new();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        exporter.export_video(small_frames(1), 4, 4, &mut delivery, &CancelToken::new())
    }));

    assert!(result.is_err());
    assert_eq!(exporter.state(), ExportState::Idle);
    assert!(delivery.assets().is_empty());
}

#[test]
fn stage_labels_are_readable() {
    assert_eq!(ExportStage::Configure.to_string(), "configure");
    assert_eq!(ExportStage::Load.to_string(), "load");
    assert_eq!(
        ExportStage::StageFrame(FrameIndex(7)).to_string(),
        "stage frame 7"
    );
    assert_eq!(ExportStage::ReadOutput.to_string(), "read output");
}
