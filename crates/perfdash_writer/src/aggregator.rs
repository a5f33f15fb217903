//! Folding batch results into a write report.

use crate::planner::BatchPlan;
use crate::report::{BatchOutcome, BatchResult, PhaseTimings, WriteReport, WriteStatus};
use crate::store::{StoreError, StoreErrorCode};
use crate::classify::ErrorClass;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Collects one result per planned batch.
///
/// The aggregator has a single owner. Concurrent workers never touch it
/// directly; they send results over a channel drained by
/// [`collect`](Self::collect).
#[derive(Debug)]
pub struct ResultAggregator {
    snapshot_id: String,
    membership: Vec<Vec<String>>,
    results: Vec<Option<BatchResult>>,
}

impl ResultAggregator {
    /// Creates an aggregator expecting one result per batch of `plan`.
    pub fn new(plan: &BatchPlan) -> Self {
        let membership = plan.child_ids_by_batch();
        let results = vec![None; membership.len()];
        Self {
            snapshot_id: plan.snapshot_id().to_string(),
            membership,
            results,
        }
    }

    /// Records a result. A second result for the same batch is ignored.
    pub fn record(&mut self, result: BatchResult) {
        let index = result.index;
        match self.results.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(result),
            Some(_) => warn!(batch = index, "duplicate batch result ignored"),
            None => warn!(batch = index, "result for unknown batch ignored"),
        }
    }

    /// Receives results until every sender is dropped.
    pub async fn collect(&mut self, mut results: mpsc::Receiver<BatchResult>) {
        while let Some(result) = results.recv().await {
            self.record(result);
        }
    }

    /// Records every batch without a result as aborted.
    pub fn abort_pending(&mut self) {
        for (index, slot) in self.results.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(BatchResult::aborted(index));
            }
        }
    }

    /// Builds the report.
    ///
    /// A batch that never reported (its worker died) counts as failed.
    pub fn finalize(self, timings: PhaseTimings) -> WriteReport {
        let mut succeeded = BTreeSet::new();
        let mut failed = BTreeSet::new();
        let mut aborted = BTreeSet::new();
        let mut batches = Vec::with_capacity(self.results.len());

        for (index, (slot, members)) in self.results.into_iter().zip(self.membership).enumerate() {
            let result = slot.unwrap_or_else(|| {
                warn!(batch = index, "batch never reported a result");
                BatchResult::failed(
                    index,
                    0,
                    Duration::ZERO,
                    StoreError::new(StoreErrorCode::Unknown, "batch worker ended without a result"),
                    ErrorClass::Fatal,
                )
            });

            let bucket = match result.outcome {
                BatchOutcome::Success => &mut succeeded,
                BatchOutcome::Failed => &mut failed,
                BatchOutcome::Aborted => &mut aborted,
            };
            bucket.extend(members);
            batches.push(result);
        }

        let status = derive_status(&batches);
        WriteReport::new(
            self.snapshot_id,
            status,
            succeeded,
            failed,
            aborted,
            timings,
            batches,
        )
    }
}

/// Complete iff every batch succeeded; Failed iff the root did not.
fn derive_status(batches: &[BatchResult]) -> WriteStatus {
    match batches.first() {
        Some(root) if root.is_success() => {
            if batches.iter().all(BatchResult::is_success) {
                WriteStatus::Complete
            } else {
                WriteStatus::Partial
            }
        }
        _ => WriteStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChildRecord, Snapshot};
    use crate::planner::BatchPlanner;
    use serde_json::json;

    fn plan() -> BatchPlan {
        // batches: [root, c0, c1], [c2, c3, c4], [c5]
        let snapshot = Snapshot::new("s", json!({})).with_children(
            (0..6)
                .map(|i| ChildRecord::new(format!("c{i}"), json!(i)))
                .collect(),
        );
        BatchPlanner::new(3).unwrap().plan(&snapshot).unwrap()
    }

    fn failure(index: usize) -> BatchResult {
        BatchResult::failed(
            index,
            4,
            Duration::ZERO,
            StoreError::unavailable("down"),
            ErrorClass::Retryable,
        )
    }

    #[test]
    fn all_success_is_complete() {
        let mut agg = ResultAggregator::new(&plan());
        for i in [2, 0, 1] {
            agg.record(BatchResult::success(i, 1, Duration::ZERO));
        }

        let report = agg.finalize(PhaseTimings::default());
        assert_eq!(report.status(), WriteStatus::Complete);
        assert_eq!(report.succeeded().len(), 6);
        assert!(report.failed().is_empty());
        assert_eq!(
            report.batches().iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn child_failure_is_partial() {
        let mut agg = ResultAggregator::new(&plan());
        agg.record(BatchResult::success(0, 1, Duration::ZERO));
        agg.record(failure(1));
        agg.record(BatchResult::aborted(2));

        let report = agg.finalize(PhaseTimings::default());
        assert_eq!(report.status(), WriteStatus::Partial);
        assert_eq!(report.succeeded().iter().collect::<Vec<_>>(), vec!["c0", "c1"]);
        assert_eq!(report.failed().iter().collect::<Vec<_>>(), vec!["c2", "c3", "c4"]);
        assert_eq!(report.aborted().iter().collect::<Vec<_>>(), vec!["c5"]);
    }

    #[test]
    fn root_failure_is_failed() {
        let mut agg = ResultAggregator::new(&plan());
        agg.record(failure(0));
        agg.abort_pending();

        let report = agg.finalize(PhaseTimings::default());
        assert_eq!(report.status(), WriteStatus::Failed);
        assert_eq!(report.failed().len(), 2);
        assert_eq!(report.aborted().len(), 4);
        assert!(report.succeeded().is_empty());
    }

    #[test]
    fn duplicate_and_unknown_results_are_ignored() {
        let mut agg = ResultAggregator::new(&plan());
        agg.record(BatchResult::success(1, 1, Duration::ZERO));
        agg.record(failure(1));
        agg.record(BatchResult::success(9, 1, Duration::ZERO));

        let report = agg.finalize(PhaseTimings::default());
        assert_eq!(report.batches().len(), 3);
        assert_eq!(report.batches()[1].outcome, BatchOutcome::Success);
        assert_eq!(report.batches()[1].attempts, 1);
        assert_eq!(report.status(), WriteStatus::Failed);
        assert_eq!(report.succeeded().iter().collect::<Vec<_>>(), vec!["c2", "c3", "c4"]);
        assert_eq!(report.failed().iter().collect::<Vec<_>>(), vec!["c0", "c1", "c5"]);
    }

    #[test]
    fn missing_results_count_as_failed() {
        let mut agg = ResultAggregator::new(&plan());
        agg.record(BatchResult::success(0, 1, Duration::ZERO));
        agg.record(BatchResult::success(2, 1, Duration::ZERO));

        let report = agg.finalize(PhaseTimings::default());
        assert_eq!(report.status(), WriteStatus::Partial);
        assert_eq!(report.failed().len(), 3);
        assert_eq!(report.batches()[1].outcome, BatchOutcome::Failed);
    }

    #[tokio::test]
    async fn collects_from_channel() {
        let mut agg = ResultAggregator::new(&plan());
        let (tx, rx) = mpsc::channel(4);
        for i in 0..3 {
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(BatchResult::success(i, 1, Duration::ZERO)).await;
            });
        }
        drop(tx);

        agg.collect(rx).await;
        let report = agg.finalize(PhaseTimings::default());
        assert_eq!(report.status(), WriteStatus::Complete);
        assert_eq!(report.succeeded().len(), 6);
    }
}
