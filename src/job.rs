//! Analysis Job State
//!
//! ```text
//! Pending -> Running -> Succeeded
//!    |          |
//!    +----------+----> Failed   (validation, alignment, internal, cancelled)
//! ```
//!
//! Each job lives in a [`JobSlot`]. The slot publishes complete
//! [`JobStatus`] snapshots: a writer builds the next status and swaps the
//! `Arc`, a reader clones the current `Arc`, so a reader never sees a
//! half-written status. Once a terminal state is published the slot ignores
//! further updates.
//!
//! Progress never decreases and reaches 100 only together with `Succeeded`.

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine::AnalysisResult;
use crate::error::{AnalysisError, ErrorKind};

/// Highest progress a job can report before it succeeds.
const MAX_RUNNING_PROGRESS: u8 = 99;

// ============================================================================
// Identifiers and States
// ============================================================================

/// Opaque job identifier, rendered as `job-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("job-")
            .and_then(|n| n.parse().ok())
            .map(JobId)
            .ok_or_else(|| format!("invalid job id '{}'", s))
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "Pending",
            JobState::Running => "Running",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Error attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AnalysisError> for JobFailure {
    fn from(err: &AnalysisError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Status Snapshot
// ============================================================================

/// Complete, immutable view of one job at one moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    #[serde(rename = "status")]
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Unix time in milliseconds.
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
}

impl JobStatus {
    fn pending(job_id: JobId) -> Self {
        Self {
            job_id,
            state: JobState::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: unix_millis(),
            started_at: None,
            finished_at: None,
        }
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// Job Slot
// ============================================================================

/// Owner of one job's mutable state.
pub(crate) struct JobSlot {
    status: RwLock<Arc<JobStatus>>,
    cancel_requested: AtomicBool,
}

impl JobSlot {
    pub fn new(job_id: JobId) -> Self {
        Self {
            status: RwLock::new(Arc::new(JobStatus::pending(job_id))),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Arc<JobStatus> {
        self.status.read().clone()
    }

    /// Publishes the status produced by `change`, unless the job is already
    /// terminal. Returns whether anything was published.
    fn publish<F: FnOnce(&mut JobStatus)>(&self, change: F) -> bool {
        let mut current = self.status.write();
        if current.state.is_terminal() {
            return false;
        }
        let previous_progress = current.progress;
        let mut next = JobStatus::clone(&current);
        change(&mut next);
        next.progress = next.progress.max(previous_progress);
        *current = Arc::new(next);
        true
    }

    /// Pending -> Running. False if the job was cancelled before it started.
    pub fn start(&self) -> bool {
        if self.is_cancel_requested() {
            self.fail(&AnalysisError::Cancelled);
            return false;
        }
        self.publish(|s| {
            s.state = JobState::Running;
            s.started_at = Some(unix_millis());
        })
    }

    pub fn advance(&self, progress: u8) {
        self.publish(|s| s.progress = progress.min(MAX_RUNNING_PROGRESS));
    }

    /// Publishes the result, or `Cancelled` if a cancel request was
    /// accepted before the job became terminal.
    pub fn succeed(&self, result: AnalysisResult) -> bool {
        self.publish(|s| {
            s.finished_at = Some(unix_millis());
            if self.is_cancel_requested() {
                s.state = JobState::Failed;
                s.error = Some(JobFailure::from(&AnalysisError::Cancelled));
            } else {
                s.state = JobState::Succeeded;
                s.progress = 100;
                s.result = Some(result);
            }
        })
    }

    pub fn fail(&self, err: &AnalysisError) -> bool {
        self.publish(|s| {
            s.state = JobState::Failed;
            s.error = Some(JobFailure::from(err));
            s.finished_at = Some(unix_millis());
        })
    }

    /// Flags the job for cancellation. A pending job fails immediately; a
    /// running job fails at its next stage boundary. Returns false if the
    /// job had already finished.
    ///
    /// The flag is set under the status write lock, so a job cannot become
    /// terminal between the check and the store.
    pub fn request_cancel(&self) -> bool {
        let pending = {
            let current = self.status.write();
            if current.state.is_terminal() {
                return false;
            }
            self.cancel_requested.store(true, Ordering::SeqCst);
            current.state == JobState::Pending
        };
        if pending {
            self.fail(&AnalysisError::Cancelled);
        }
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }
}
