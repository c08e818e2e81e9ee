use std::{
    io::Read as _,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    time::{Duration, Instant},
};

use crate::{
    encode::{command::EncodeCommand, session::EncoderBackend},
    foundation::cancel::CancelToken,
    foundation::error::{ReelError, ReelResult},
};

/// Environment variable overriding the `ffmpeg` binary used by [`FfmpegOpts::default`].
pub const FFMPEG_ENV: &str = "REELKIT_FFMPEG";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Options for [`FfmpegBackend`].
#[derive(Clone, Debug)]
pub struct FfmpegOpts {
    /// Program to run; a bare name is resolved on `PATH`.
    pub binary: PathBuf,
    /// Upper bound for the load-time version check and for each encode. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Value passed to `-loglevel`.
    pub loglevel: String,
    /// Directory under which the staging directory is created (system temp dir if `None`).
    pub staging_parent: Option<PathBuf>,
}

impl Default for FfmpegOpts {
    fn default() -> Self {
        let binary = std::env::var_os(FFMPEG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));
        Self {
            binary,
            timeout: None,
            loglevel: "error".to_owned(),
            staging_parent: None,
        }
    }
}

/// Whether the default `ffmpeg` binary can be executed.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new(FfmpegOpts::default().binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Encoder backend that runs the system `ffmpeg` over a private staging directory.
///
/// The staging directory is created on `load`. `delete_file` removes single entries; dropping the
/// backend removes the directory together with anything still staged in it.
pub struct FfmpegBackend {
    opts: FfmpegOpts,
    dir: Option<tempfile::TempDir>,
}

impl FfmpegBackend {
    /// An unloaded backend; nothing is spawned until `load`.
    pub fn new(opts: FfmpegOpts) -> Self {
        Self { opts, dir: None }
    }

    /// Staging directory, once loaded.
    pub fn staging_dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }

    fn staged_path(&self, name: &str) -> ReelResult<PathBuf> {
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| ReelError::state("ffmpeg backend is not loaded"))?;
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\'])
        {
            return Err(ReelError::validation(format!(
                "invalid staged file name '{name}'"
            )));
        }
        Ok(dir.path().join(name))
    }
}

impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    #[tracing::instrument(skip(self, cancel), fields(binary = %self.opts.binary.display()))]
    fn load(&mut self, cancel: &CancelToken) -> ReelResult<()> {
        if self.dir.is_some() {
            return Ok(());
        }

        let mut version = Command::new(&self.opts.binary);
        version
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let child = version.spawn().map_err(|e| {
            ReelError::load(format!(
                "failed to spawn '{}' (is ffmpeg installed and on PATH?): {e}",
                self.opts.binary.display()
            ))
        })?;
        let (status, stderr) = wait_child(child, cancel, self.opts.timeout).map_err(|e| match e {
            ReelError::Cancelled => e,
            other => ReelError::load(format!("ffmpeg version check failed: {other}")),
        })?;
        if !status.success() {
            return Err(ReelError::load(format!(
                "ffmpeg version check exited with status {status}: {}",
                stderr.trim()
            )));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("reelkit-");
        let dir = match &self.opts.staging_parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| ReelError::load(format!("failed to create staging directory: {e}")))?;

        tracing::debug!(dir = %dir.path().display(), "ffmpeg staging directory ready");
        self.dir = Some(dir);
        Ok(())
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> ReelResult<()> {
        let path = self.staged_path(name)?;
        std::fs::write(&path, bytes)
            .map_err(|e| ReelError::io(format!("failed to write '{}': {e}", path.display())))
    }

    #[tracing::instrument(skip(self, cmd, cancel))]
    fn exec(&mut self, cmd: &EncodeCommand, cancel: &CancelToken) -> ReelResult<()> {
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| ReelError::state("ffmpeg backend is not loaded"))?;

        let mut command = Command::new(&self.opts.binary);
        command
            .current_dir(dir.path())
            .args(["-hide_banner", "-loglevel", &self.opts.loglevel])
            .args(cmd.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        tracing::debug!(args = ?cmd.to_args(), "running ffmpeg");

        let child = command.spawn().map_err(|e| {
            ReelError::encode(
                format!(
                    "failed to spawn '{}': {e}",
                    self.opts.binary.display()
                ),
                "",
            )
        })?;
        let (status, stderr) = wait_child(child, cancel, self.opts.timeout)?;
        if !status.success() {
            return Err(ReelError::encode(
                format!("ffmpeg exited with status {status}"),
                stderr,
            ));
        }
        Ok(())
    }

    fn read_file(&mut self, name: &str) -> ReelResult<Vec<u8>> {
        let path = self.staged_path(name)?;
        std::fs::read(&path)
            .map_err(|e| ReelError::io(format!("failed to read '{}': {e}", path.display())))
    }

    fn delete_file(&mut self, name: &str) -> ReelResult<()> {
        let path = self.staged_path(name)?;
        std::fs::remove_file(&path)
            .map_err(|e| ReelError::io(format!("failed to delete '{}': {e}", path.display())))
    }
}

/// Wait for `child`, killing it on cancellation or when `timeout` elapses.
///
/// Returns the exit status and the captured stderr.
fn wait_child(
    mut child: Child,
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> ReelResult<(ExitStatus, String)> {
    let stderr_drain = child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).map(|_| buf)
        })
    });

    let deadline = timeout.map(|t| Instant::now() + t);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                return Err(ReelError::encode(
                    format!("failed to wait for ffmpeg: {e}"),
                    "",
                ));
            }
        }

        if cancel.is_cancelled() {
            kill_and_reap(&mut child);
            return Err(ReelError::Cancelled);
        }
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            kill_and_reap(&mut child);
            return Err(ReelError::encode(
                format!(
                    "ffmpeg timed out after {:.1}s",
                    timeout.unwrap_or_default().as_secs_f64()
                ),
                "",
            ));
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stderr = match stderr_drain {
        Some(handle) => handle
            .join()
            .map_err(|_| ReelError::encode("ffmpeg stderr drain thread panicked", ""))?
            .map_err(|e| ReelError::encode(format!("ffmpeg stderr read failed: {e}"), ""))?,
        None => Vec::new(),
    };
    Ok((status, String::from_utf8_lossy(&stderr).into_owned()))
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
