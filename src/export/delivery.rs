use std::path::{Path, PathBuf};

use crate::foundation::error::{ReelError, ReelResult};

/// Content type of every delivered video.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Suggested file name for an export of `frame_count` frames.
pub fn export_file_name(frame_count: usize) -> String {
    format!("frames_{frame_count}_export.mp4")
}

/// The finished video handed to a [`DeliverySink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoAsset {
    /// Suggested file name, without directories.
    pub file_name: String,
    /// MIME type of `bytes`.
    pub content_type: String,
    /// Encoded video.
    pub bytes: Vec<u8>,
}

impl VideoAsset {
    /// An asset with content type [`VIDEO_CONTENT_TYPE`].
    pub fn mp4(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: VIDEO_CONTENT_TYPE.to_owned(),
            bytes,
        }
    }
}

/// Where finished videos go (download, save dialog, object store...).
pub trait DeliverySink {
    /// Persist `asset`. An error fails the export at its delivery stage.
    fn deliver(&mut self, asset: VideoAsset) -> ReelResult<()>;
}

/// Writes delivered videos into a directory under their suggested file name.
#[derive(Clone, Debug)]
pub struct DirectoryDelivery {
    dir: PathBuf,
    overwrite: bool,
    delivered: Vec<PathBuf>,
}

impl DirectoryDelivery {
    /// Deliver into `dir`, created on first delivery. Existing files are overwritten.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overwrite: true,
            delivered: Vec::new(),
        }
    }

    /// With `false`, delivering onto an existing file is a validation error.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths written so far, in delivery order.
    pub fn delivered(&self) -> &[PathBuf] {
        &self.delivered
    }
}

impl DeliverySink for DirectoryDelivery {
    fn deliver(&mut self, asset: VideoAsset) -> ReelResult<()> {
        use anyhow::Context as _;

        if asset.file_name.is_empty() || asset.file_name.contains(['/', '\\']) {
            return Err(ReelError::validation(format!(
                "invalid delivery file name '{}'",
                asset.file_name
            )));
        }

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create output directory '{}'", self.dir.display()))?;

        let path = self.dir.join(&asset.file_name);
        if !self.overwrite && path.exists() {
            return Err(ReelError::validation(format!(
                "output file '{}' already exists",
                path.display()
            )));
        }
        std::fs::write(&path, &asset.bytes)
            .with_context(|| format!("failed to write '{}'", path.display()))?;

        tracing::info!(path = %path.display(), bytes = asset.bytes.len(), "delivered video");
        self.delivered.push(path);
        Ok(())
    }
}

/// Keeps delivered assets in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryDelivery {
    assets: Vec<VideoAsset>,
}

impl MemoryDelivery {
    /// An empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assets delivered so far, in order.
    pub fn assets(&self) -> &[VideoAsset] {
        &self.assets
    }
}

impl DeliverySink for MemoryDelivery {
    fn deliver(&mut self, asset: VideoAsset) -> ReelResult<()> {
        self.assets.push(asset);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/delivery.rs"]
mod tests;
