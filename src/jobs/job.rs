//! Job identity, status and snapshots

use crate::{
    error::Result,
    services::OutputFormatHandler,
    types::PixelBuffer,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Process-unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed never change again
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image handed to the job manager
#[derive(Debug, Clone)]
pub struct Submission {
    pub bytes: Arc<[u8]>,
    /// Declared MIME type, checked against the submission limits
    pub mime_type: String,
    /// Original file name, used to name the output
    pub file_name: Option<String>,
}

impl Submission {
    #[must_use]
    pub fn new<B: Into<Arc<[u8]>>, M: Into<String>>(bytes: B, mime_type: M) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    #[must_use]
    pub fn with_file_name<S: Into<String>>(mut self, file_name: S) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Read a file, deriving the MIME type from its extension
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            crate::error::BgRemovalError::file_io_error("read input image", path, &e)
        })?;
        let mut submission = Self::new(bytes, OutputFormatHandler::mime_from_path(path));
        submission.file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(ToString::to_string);
        Ok(submission)
    }

    /// Byte length as seen by the size limit
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Point-in-time copy of a job
///
/// Byte payloads are shared, not copied, so snapshots are cheap to take.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub file_name: Option<String>,
    pub mime_type: String,
    pub status: JobStatus,
    /// 0-100; synthetic while processing
    pub progress: f32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Original upload, kept so a failed job can be resubmitted
    #[serde(skip)]
    pub source: Arc<[u8]>,
    /// Encoded PNG, present once completed
    #[serde(skip)]
    pub result: Option<Arc<[u8]>>,
}

impl JobSnapshot {
    /// `<stem>_no_bg.png` for this job's upload
    #[must_use]
    pub fn output_file_name(&self) -> String {
        OutputFormatHandler::output_file_name(self.file_name.as_deref())
    }

    /// Progress rounded for display
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        self.progress.round().clamp(0.0, 100.0) as u8
    }
}

/// Mutable job state owned by the manager
pub(crate) struct JobRecord {
    pub(crate) id: JobId,
    /// Creation order, for newest-first listing
    pub(crate) seq: u64,
    pub(crate) file_name: Option<String>,
    pub(crate) mime_type: String,
    pub(crate) status: JobStatus,
    pub(crate) progress: f32,
    pub(crate) error: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) source: Arc<[u8]>,
    pub(crate) result: Option<Arc<[u8]>>,
    /// Mask output kept for re-rendering against other backgrounds
    pub(crate) masked: Option<Arc<PixelBuffer>>,
    /// Stops this job's progress ticker
    pub(crate) cancel: CancellationToken,
}

impl JobRecord {
    pub(crate) fn new(seq: u64, submission: Submission) -> Self {
        Self {
            id: JobId::new(),
            seq,
            file_name: submission.file_name,
            mime_type: submission.mime_type,
            status: JobStatus::Queued,
            progress: 0.0,
            error: None,
            created_at: Utc::now(),
            source: submission.bytes,
            result: None,
            masked: None,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            status: self.status,
            progress: self.progress,
            error: self.error.clone(),
            created_at: self.created_at,
            source: Arc::clone(&self.source),
            result: self.result.clone(),
        }
    }
}
