//! Frame staging and the external encoder session.

/// Fixed `ffmpeg` command template.
pub(crate) mod command;
/// System `ffmpeg` backend.
pub(crate) mod ffmpeg;
/// In-process backend for tests and dry runs.
pub(crate) mod memory;
/// PNG frame codec and staging file names.
pub(crate) mod png;
/// Backend trait and session state machine.
pub(crate) mod session;
