use crate::{
    encode::command::EncodeCommand,
    foundation::cancel::CancelToken,
    foundation::error::{ReelError, ReelResult},
};

/// Capability interface of an external encoding engine with a private file namespace.
///
/// Implementations are driven through an [`EncoderSession`], which enforces load-before-use and
/// tracks what was staged. Backends never garbage-collect staged files on their own.
pub trait EncoderBackend: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Initialize the engine. May be slow (process spawn, download, disk).
    fn load(&mut self, cancel: &CancelToken) -> ReelResult<()>;

    /// Write `bytes` under `name`, replacing any previous content.
    fn write_file(&mut self, name: &str, bytes: &[u8]) -> ReelResult<()>;

    /// Run one encode over the namespace.
    fn exec(&mut self, cmd: &EncodeCommand, cancel: &CancelToken) -> ReelResult<()>;

    /// Read the full contents stored under `name`.
    fn read_file(&mut self, name: &str) -> ReelResult<Vec<u8>>;

    /// Remove `name`; deleting a missing file is an error.
    fn delete_file(&mut self, name: &str) -> ReelResult<()>;
}

impl<B: EncoderBackend + ?Sized> EncoderBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn load(&mut self, cancel: &CancelToken) -> ReelResult<()> {
        (**self).load(cancel)
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> ReelResult<()> {
        (**self).write_file(name, bytes)
    }

    fn exec(&mut self, cmd: &EncodeCommand, cancel: &CancelToken) -> ReelResult<()> {
        (**self).exec(cmd, cancel)
    }

    fn read_file(&mut self, name: &str) -> ReelResult<Vec<u8>> {
        (**self).read_file(name)
    }

    fn delete_file(&mut self, name: &str) -> ReelResult<()> {
        (**self).delete_file(name)
    }
}

/// Lifecycle of an [`EncoderSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Not loaded yet, or the last load failed.
    Unloaded,
    /// `load` is in progress.
    Loading,
    /// Ready for staging and invocation.
    Loaded,
}

/// One encoder instance plus the ledger of assets it holds.
pub struct EncoderSession<B: EncoderBackend> {
    backend: B,
    state: SessionState,
    staged: Vec<String>,
}

impl<B: EncoderBackend> EncoderSession<B> {
    /// Wrap an unloaded backend with an empty ledger.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: SessionState::Unloaded,
            staged: Vec::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Names currently staged or produced in the backend namespace, in creation order.
    pub fn staged(&self) -> &[String] {
        &self.staged
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Unwrap the backend without cleaning up.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Load the backend unless it is already loaded.
    ///
    /// A failed load leaves the session `Unloaded`; errors surface as [`ReelError::Load`]
    /// (or [`ReelError::Cancelled`]).
    #[tracing::instrument(skip(self, cancel), fields(backend = self.backend.name()))]
    pub fn ensure_loaded(&mut self, cancel: &CancelToken) -> ReelResult<()> {
        if self.state == SessionState::Loaded {
            return Ok(());
        }
        cancel.check()?;

        self.state = SessionState::Loading;
        match self.backend.load(cancel) {
            Ok(()) => {
                self.state = SessionState::Loaded;
                tracing::debug!("encoder loaded");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Unloaded;
                Err(match e {
                    ReelError::Load(_) | ReelError::Cancelled => e,
                    other => ReelError::load(other.to_string()),
                })
            }
        }
    }

    /// Write `bytes` under `name` and record it for cleanup. Requires a loaded session.
    pub fn stage_input(&mut self, name: &str, bytes: &[u8]) -> ReelResult<()> {
        self.require_loaded("stage_input")?;
        self.backend.write_file(name, bytes)?;
        self.record(name);
        tracing::trace!(name, len = bytes.len(), "staged input");
        Ok(())
    }

    /// Run `cmd`; on success its output is recorded for cleanup.
    #[tracing::instrument(skip(self, cmd, cancel), fields(output = %cmd.output))]
    pub fn invoke(&mut self, cmd: &EncodeCommand, cancel: &CancelToken) -> ReelResult<()> {
        self.require_loaded("invoke")?;
        cancel.check()?;
        self.backend.exec(cmd, cancel)?;
        self.record(&cmd.output);
        Ok(())
    }

    /// Read an asset back. Requires a loaded session.
    pub fn read_output(&mut self, name: &str) -> ReelResult<Vec<u8>> {
        self.require_loaded("read_output")?;
        self.backend.read_file(name)
    }

    /// Delete one asset now and drop it from the ledger.
    pub fn delete_asset(&mut self, name: &str) -> ReelResult<()> {
        self.require_loaded("delete_asset")?;
        self.backend.delete_file(name)?;
        self.staged.retain(|n| n != name);
        Ok(())
    }

    /// Best-effort removal of every recorded asset.
    ///
    /// Failures are logged and skipped; assets that could not be deleted stay in
    /// [`staged`](Self::staged). Returns the number of assets actually deleted. Does nothing
    /// unless the session is loaded.
    pub fn cleanup(&mut self) -> usize {
        if self.state != SessionState::Loaded {
            return 0;
        }

        let mut deleted = 0;
        let mut leftover = Vec::new();
        for name in std::mem::take(&mut self.staged) {
            match self.backend.delete_file(&name) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(asset = %name, error = %e, "cleanup: failed to delete asset");
                    leftover.push(name);
                }
            }
        }
        self.staged = leftover;
        deleted
    }

    fn require_loaded(&self, op: &str) -> ReelResult<()> {
        if self.state != SessionState::Loaded {
            return Err(ReelError::state(format!(
                "{op} requires a loaded encoder session (state: {:?})",
                self.state
            )));
        }
        Ok(())
    }

    fn record(&mut self, name: &str) {
        if !self.staged.iter().any(|n| n == name) {
            self.staged.push(name.to_owned());
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/session.rs"]
mod tests;
