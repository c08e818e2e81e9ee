use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    encode::{command::EncodeCommand, session::EncoderBackend},
    foundation::cancel::CancelToken,
    foundation::error::{ReelError, ReelResult},
};

/// Magic prefix of the container produced by [`MemoryBackend`].
pub const MEMORY_VIDEO_MAGIC: &[u8; 8] = b"RKMEMMP4";

/// One observed backend operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    /// `load` was called.
    Load,
    /// `write_file` was called.
    Write {
        /// Target name.
        name: String,
        /// Byte count written.
        len: usize,
    },
    /// `exec` was called.
    Exec {
        /// Rendered argument list.
        args: Vec<String>,
    },
    /// `read_file` was called.
    Read {
        /// Requested name.
        name: String,
    },
    /// `delete_file` was called.
    Delete {
        /// Requested name.
        name: String,
    },
}

/// Backend operation that a [`MemoryBackend`] can be told to fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailPoint {
    /// Fail every `load`.
    Load,
    /// Fail writing the named file.
    Write(String),
    /// Fail every `exec`.
    Exec,
    /// Fail every `read_file`.
    Read,
    /// Fail deleting the named file.
    Delete(String),
}

/// Shared, cloneable log of backend calls.
///
/// Survives the backend itself, so callers can inspect what an export did after the session has
/// been dropped.
#[derive(Clone, Debug, Default)]
pub struct CallJournal(Arc<Mutex<Vec<BackendCall>>>);

impl CallJournal {
    /// An empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the calls so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    fn push(&self, call: BackendCall) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

/// In-process encoder backend for tests, dry runs and debugging.
///
/// Files live in a map. `exec` resolves the command's `%0Nd` input pattern from index 0 upwards
/// and writes a small deterministic container (magic, frame count, concatenated inputs) to the
/// command's output name. No real video is produced.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: BTreeMap<String, Vec<u8>>,
    journal: CallJournal,
    fail: Option<FailPoint>,
}

impl MemoryBackend {
    /// An empty namespace with its own journal and no injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every call into `journal`.
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Make one operation fail every time it is attempted.
    pub fn failing(mut self, at: FailPoint) -> Self {
        self.fail = Some(at);
        self
    }

    /// The journal this backend records into.
    pub fn journal(&self) -> &CallJournal {
        &self.journal
    }

    /// Names currently stored, sorted.
    pub fn file_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Whether `name` is currently stored.
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

impl EncoderBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&mut self, cancel: &CancelToken) -> ReelResult<()> {
        self.journal.push(BackendCall::Load);
        cancel.check()?;
        if self.fail == Some(FailPoint::Load) {
            return Err(ReelError::load("memory backend: injected load failure"));
        }
        Ok(())
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> ReelResult<()> {
        self.journal.push(BackendCall::Write {
            name: name.to_owned(),
            len: bytes.len(),
        });
        if matches!(&self.fail, Some(FailPoint::Write(n)) if n == name) {
            return Err(ReelError::io(format!(
                "memory backend: injected write failure for '{name}'"
            )));
        }
        self.files.insert(name.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn exec(&mut self, cmd: &EncodeCommand, cancel: &CancelToken) -> ReelResult<()> {
        self.journal.push(BackendCall::Exec {
            args: cmd.to_args(),
        });
        cancel.check()?;
        if self.fail == Some(FailPoint::Exec) {
            return Err(ReelError::encode(
                "memory backend: injected exec failure",
                "Conversion failed!",
            ));
        }
        if cmd.framerate == 0 {
            return Err(ReelError::encode("framerate must be non-zero", ""));
        }
        if !cmd.overwrite && self.files.contains_key(&cmd.output) {
            return Err(ReelError::encode(
                format!("output '{}' already exists", cmd.output),
                "",
            ));
        }

        let mut inputs = Vec::new();
        for i in 0u64.. {
            let name = expand_sequence_pattern(&cmd.input_pattern, i)?;
            match self.files.get(&name) {
                Some(bytes) => inputs.push(bytes),
                None => break,
            }
        }
        if inputs.is_empty() {
            return Err(ReelError::encode(
                format!("no input files match '{}'", cmd.input_pattern),
                "",
            ));
        }

        let count = u32::try_from(inputs.len())
            .map_err(|_| ReelError::encode("too many input frames", ""))?;
        let mut out = Vec::with_capacity(12 + inputs.iter().map(|b| b.len()).sum::<usize>());
        out.extend_from_slice(MEMORY_VIDEO_MAGIC);
        out.extend_from_slice(&count.to_le_bytes());
        for bytes in inputs {
            out.extend_from_slice(bytes);
        }
        self.files.insert(cmd.output.clone(), out);
        Ok(())
    }

    fn read_file(&mut self, name: &str) -> ReelResult<Vec<u8>> {
        self.journal.push(BackendCall::Read {
            name: name.to_owned(),
        });
        if self.fail == Some(FailPoint::Read) {
            return Err(ReelError::io(format!(
                "memory backend: injected read failure for '{name}'"
            )));
        }
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| ReelError::io(format!("memory backend: no such file '{name}'")))
    }

    fn delete_file(&mut self, name: &str) -> ReelResult<()> {
        self.journal.push(BackendCall::Delete {
            name: name.to_owned(),
        });
        if matches!(&self.fail, Some(FailPoint::Delete(n)) if n == name) {
            return Err(ReelError::io(format!(
                "memory backend: injected delete failure for '{name}'"
            )));
        }
        self.files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ReelError::io(format!("memory backend: no such file '{name}'")))
    }
}

/// Expand a single printf-style `%d` / `%0Nd` placeholder with `index`.
pub(crate) fn expand_sequence_pattern(pattern: &str, index: u64) -> ReelResult<String> {
    let bad = || ReelError::validation(format!("unsupported input pattern '{pattern}'"));

    let start = pattern.find('%').ok_or_else(bad)?;
    let rest = &pattern[start + 1..];
    let d_pos = rest.find('d').ok_or_else(bad)?;
    let spec = &rest[..d_pos];

    let width = if spec.is_empty() {
        0
    } else {
        let digits = spec.strip_prefix('0').ok_or_else(bad)?;
        digits.parse::<usize>().map_err(|_| bad())?
    };

    Ok(format!(
        "{}{:0width$}{}",
        &pattern[..start],
        index,
        &rest[d_pos + 1..],
        width = width
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/encode/memory.rs"]
mod tests;
