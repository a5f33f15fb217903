//! Batch results and the final write report.

use crate::classify::ErrorClass;
use crate::model::Snapshot;
use crate::store::StoreError;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Terminal outcome of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Committed.
    Success,
    /// Attempted and not committed.
    Failed,
    /// Never attempted: the deadline passed first or the root failed.
    Aborted,
}

/// Result of one batch's attempt sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    /// Batch index in the plan.
    pub index: usize,
    /// Terminal outcome.
    pub outcome: BatchOutcome,
    /// Commit attempts made, 0 for aborted batches.
    pub attempts: u32,
    /// Time from first attempt start to termination.
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    /// Last error, for failed batches.
    pub error: Option<StoreError>,
    /// Classification of the last error.
    pub error_class: Option<ErrorClass>,
}

impl BatchResult {
    /// A committed batch.
    pub fn success(index: usize, attempts: u32, duration: Duration) -> Self {
        Self {
            index,
            outcome: BatchOutcome::Success,
            attempts,
            duration,
            error: None,
            error_class: None,
        }
    }

    /// A batch that ran out of attempts or hit a fatal error.
    pub fn failed(
        index: usize,
        attempts: u32,
        duration: Duration,
        error: StoreError,
        class: ErrorClass,
    ) -> Self {
        Self {
            index,
            outcome: BatchOutcome::Failed,
            attempts,
            duration,
            error: Some(error),
            error_class: Some(class),
        }
    }

    /// A batch that was never started.
    pub fn aborted(index: usize) -> Self {
        Self {
            index,
            outcome: BatchOutcome::Aborted,
            attempts: 0,
            duration: Duration::ZERO,
            error: None,
            error_class: None,
        }
    }

    /// Returns true if the batch committed.
    pub fn is_success(&self) -> bool {
        self.outcome == BatchOutcome::Success
    }
}

/// Overall status of a snapshot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    /// Every batch committed.
    Complete,
    /// The root committed, at least one child batch did not.
    Partial,
    /// The root batch did not commit.
    Failed,
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteStatus::Complete => "complete",
            WriteStatus::Partial => "partial",
            WriteStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Wall-clock time spent per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PhaseTimings {
    /// Root batch commit, retries included.
    #[serde(rename = "root_ms", serialize_with = "as_millis")]
    pub root: Duration,
    /// Child batch dispatch until the last result arrived.
    #[serde(rename = "children_ms", serialize_with = "as_millis")]
    pub children: Duration,
    /// Whole write, planning to finalization.
    #[serde(rename = "total_ms", serialize_with = "as_millis")]
    pub total: Duration,
}

/// Final outcome of one snapshot write.
///
/// Child identifiers land in exactly one of `succeeded`, `failed` or
/// `aborted`, according to the outcome of the batch that carried them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteReport {
    write_id: Uuid,
    snapshot_id: String,
    status: WriteStatus,
    succeeded: BTreeSet<String>,
    failed: BTreeSet<String>,
    aborted: BTreeSet<String>,
    timings: PhaseTimings,
    batches: Vec<BatchResult>,
}

impl WriteReport {
    pub(crate) fn new(
        snapshot_id: String,
        status: WriteStatus,
        succeeded: BTreeSet<String>,
        failed: BTreeSet<String>,
        aborted: BTreeSet<String>,
        timings: PhaseTimings,
        batches: Vec<BatchResult>,
    ) -> Self {
        Self {
            write_id: Uuid::new_v4(),
            snapshot_id,
            status,
            succeeded,
            failed,
            aborted,
            timings,
            batches,
        }
    }

    /// Unique identifier of this write invocation.
    pub fn write_id(&self) -> Uuid {
        self.write_id
    }

    /// Identifier of the written snapshot.
    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    /// Overall status.
    pub fn status(&self) -> WriteStatus {
        self.status
    }

    /// Children whose batch committed.
    pub fn succeeded(&self) -> &BTreeSet<String> {
        &self.succeeded
    }

    /// Children whose batch was attempted and failed.
    pub fn failed(&self) -> &BTreeSet<String> {
        &self.failed
    }

    /// Children whose batch was never attempted.
    pub fn aborted(&self) -> &BTreeSet<String> {
        &self.aborted
    }

    /// Per-phase durations.
    pub fn timings(&self) -> PhaseTimings {
        self.timings
    }

    /// Per-batch results ordered by batch index.
    pub fn batches(&self) -> &[BatchResult] {
        &self.batches
    }

    /// Result of the root batch.
    pub fn root_result(&self) -> Option<&BatchResult> {
        self.batches.first()
    }

    /// Attempts beyond the first, summed over all batches.
    pub fn total_retries(&self) -> u32 {
        self.batches
            .iter()
            .map(|b| b.attempts.saturating_sub(1))
            .sum()
    }

    /// Returns true if some children still need writing.
    pub fn needs_repair(&self) -> bool {
        !self.failed.is_empty() || !self.aborted.is_empty()
    }

    /// Builds a follow-up snapshot holding the root and every child that was
    /// not written.
    ///
    /// Returns `None` when the write completed or `snapshot` is not the one
    /// this report describes. For a failed write the whole snapshot is
    /// returned, since the root itself must be rewritten.
    pub fn repair_snapshot(&self, snapshot: &Snapshot) -> Option<Snapshot> {
        if snapshot.id != self.snapshot_id {
            return None;
        }
        match self.status {
            WriteStatus::Complete => None,
            WriteStatus::Failed => Some(snapshot.clone()),
            WriteStatus::Partial => {
                let children = snapshot
                    .children
                    .iter()
                    .filter(|c| self.failed.contains(&c.id) || self.aborted.contains(&c.id))
                    .cloned()
                    .collect();
                Some(Snapshot {
                    id: snapshot.id.clone(),
                    root: snapshot.root.clone(),
                    children,
                })
            }
        }
    }
}

impl fmt::Display for WriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "snapshot {} {}: {} succeeded, {} failed, {} aborted across {} batches in {:?}",
            self.snapshot_id,
            self.status,
            self.succeeded.len(),
            self.failed.len(),
            self.aborted.len(),
            self.batches.len(),
            self.timings.total
        )
    }
}
