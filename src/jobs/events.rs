//! Job notifications pushed to subscribers

use super::job::JobId;
use crate::types::ProcessingTimings;
use serde::Serialize;

/// State change broadcast by the job manager
///
/// Delivery is best effort: a subscriber that falls behind the channel
/// capacity skips events, so consumers should re-read the job on `Lagged`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// Job accepted and processing started
    Submitted {
        id: JobId,
        file_name: Option<String>,
    },
    /// Synthetic progress advanced
    Progress { id: JobId, progress: f32 },
    Completed {
        id: JobId,
        output_bytes: usize,
        timings: ProcessingTimings,
    },
    Failed { id: JobId, error: String },
    Removed { id: JobId },
}

impl JobEvent {
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Submitted { id, .. }
            | Self::Progress { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Removed { id } => *id,
        }
    }

    /// Completed, Failed or Removed
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Removed { .. }
        )
    }
}
