use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const LABEL_EXTENSION: &str = "pdf.gz";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("label payload is not valid base64: {0}")]
    Decode(String),
    #[error("failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// Archive key of one stored label. Reconciled labels carry the prior
/// shipment id so several prior shipments of one line do not collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelKey {
    pub line: u64,
    pub shipment: Option<String>,
    pub stamp: String,
}

impl LabelKey {
    pub fn purchased(line: u64, stamp: &str) -> Self {
        Self {
            line,
            shipment: None,
            stamp: stamp.to_string(),
        }
    }

    pub fn reconciled(line: u64, shipment_id: &str, stamp: &str) -> Self {
        Self {
            line,
            shipment: Some(file_safe(shipment_id)),
            stamp: stamp.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{self}.{LABEL_EXTENSION}")
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shipment {
            Some(shipment) => write!(f, "{}__{}__{}", self.line, shipment, self.stamp),
            None => write!(f, "{}__{}", self.line, self.stamp),
        }
    }
}

// Shipment ids come from the service; keep them to one path component.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// Label file contents arrive base64-encoded; the decoded bytes are still gzip.
pub fn decode_label(contents: &str) -> Result<Vec<u8>, ArchiveError> {
    STANDARD
        .decode(contents.trim())
        .map_err(|err| ArchiveError::Decode(err.to_string()))
}

#[async_trait]
pub trait LabelSink: Send + Sync {
    async fn store(&self, key: &LabelKey, bytes: Vec<u8>) -> Result<(), ArchiveError>;
}

/// Writes each label as `<dir>/<key>.pdf.gz`, creating `dir` on first use.
#[derive(Debug, Clone)]
pub struct DirectoryLabelSink {
    dir: PathBuf,
}

impl DirectoryLabelSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl LabelSink for DirectoryLabelSink {
    async fn store(&self, key: &LabelKey, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        let path = self.dir.join(key.file_name());
        let write_err = |err: std::io::Error| ArchiveError::Write {
            path: path.clone(),
            message: err.to_string(),
        };
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(write_err)?;
        tokio::fs::write(&path, &bytes).await.map_err(write_err)?;
        debug!(target = "mfn.archive", path = %path.display(), bytes = bytes.len(), "label_stored");
        Ok(())
    }
}
