//! Property tests over planning and report accounting.

use perfdash_testkit::prelude::*;
use perfdash_writer::{BatchOutcome, BatchPlanner, StoreError, WriteError, WriteStatus};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn plan_covers_every_child_once_in_order(
        snapshot in snapshot_strategy(120),
        max in batch_size_strategy(),
    ) {
        let plan = BatchPlanner::new(max).unwrap().plan(&snapshot).unwrap();

        prop_assert_eq!(plan.operation_count(), snapshot.operation_count());
        prop_assert!(plan.batches().iter().all(|b| b.size() >= 1 && b.size() <= max));
        prop_assert!(plan.batches()[0].is_root_batch);
        prop_assert!(plan.batches()[0].ops[0].is_root());
        prop_assert_eq!(plan.batches().iter().filter(|b| b.is_root_batch).count(), 1);

        let planned: Vec<String> = plan.child_ids_by_batch().into_iter().flatten().collect();
        let input: Vec<String> = snapshot.child_ids().map(str::to_string).collect();
        prop_assert_eq!(planned, input);

        for (i, batch) in plan.batches().iter().enumerate() {
            prop_assert_eq!(batch.index, i);
        }
    }

    #[test]
    fn report_partitions_children_by_batch_outcome(
        snapshot in snapshot_strategy(40),
        max in 1usize..=8,
        failing in prop::collection::vec(any::<bool>(), 41),
    ) {
        let store = Arc::new(ScriptedStore::new());
        let writer = writer_for(&store, fast_config().with_max_batch_size(max));
        let plan = writer.plan(&snapshot).unwrap();

        let mut failing_batches = BTreeSet::new();
        for (batch, fails) in plan.batches().iter().zip(&failing) {
            if *fails {
                store.always_fail(batch.ops[0].key(), StoreError::permission_denied("denied"));
                failing_batches.insert(batch.index);
            }
        }

        let report = match runtime().block_on(writer.write(&snapshot)) {
            Ok(report) => report,
            Err(WriteError::RootFailed { report, .. }) => *report,
            Err(other) => return Err(TestCaseError::fail(other.to_string())),
        };

        let all: BTreeSet<String> = snapshot.child_ids().map(str::to_string).collect();
        let succeeded = report.succeeded();
        let failed = report.failed();
        let aborted = report.aborted();
        prop_assert!(succeeded.is_disjoint(failed));
        prop_assert!(succeeded.is_disjoint(aborted));
        prop_assert!(failed.is_disjoint(aborted));
        let union: BTreeSet<String> = succeeded.iter().chain(failed).chain(aborted).cloned().collect();
        prop_assert_eq!(union, all);

        let root_failed = failing_batches.contains(&0);
        let expected = if root_failed {
            WriteStatus::Failed
        } else if failing_batches.is_empty() {
            WriteStatus::Complete
        } else {
            WriteStatus::Partial
        };
        prop_assert_eq!(report.status(), expected);

        for result in report.batches() {
            let outcome = if root_failed && result.index > 0 {
                BatchOutcome::Aborted
            } else if failing_batches.contains(&result.index) {
                BatchOutcome::Failed
            } else {
                BatchOutcome::Success
            };
            prop_assert_eq!(result.outcome, outcome);
        }

        if root_failed {
            prop_assert_eq!(store.call_count(), 1);
        }
    }
}
