//! Plan command implementation.

use super::{load_snapshot, CliError, Format};
use perfdash_writer::{BatchPlan, BatchPlanner, Snapshot};
use serde::Serialize;
use std::path::Path;

/// Batch plan summary.
#[derive(Debug, Serialize)]
pub struct PlanSummary {
    /// Snapshot identifier.
    pub snapshot_id: String,
    /// Maximum operations per batch.
    pub max_batch_size: usize,
    /// Total operations, root included.
    pub operation_count: usize,
    /// One entry per batch.
    pub batches: Vec<BatchSummary>,
}

/// Summary of one planned batch.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    /// Batch index.
    pub index: usize,
    /// Whether the batch carries the root write.
    pub root: bool,
    /// Number of operations.
    pub size: usize,
    /// First child in the batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_child: Option<String>,
    /// Last child in the batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_child: Option<String>,
}

/// Runs the plan command.
pub fn run(path: &Path, batch_size: usize, format: &str) -> Result<(), CliError> {
    let format = Format::parse(format)?;
    let snapshot = load_snapshot(path)?;
    let summary = summarize(&snapshot, batch_size)?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Format::Text => print_text_output(&summary),
    }

    Ok(())
}

/// Plans `snapshot` and summarizes the result.
pub fn summarize(snapshot: &Snapshot, batch_size: usize) -> Result<PlanSummary, CliError> {
    let plan = BatchPlanner::new(batch_size)
        .map_err(perfdash_writer::WriteError::from)?
        .plan(snapshot)?;
    Ok(summary_of(&plan, batch_size))
}

fn summary_of(plan: &BatchPlan, max_batch_size: usize) -> PlanSummary {
    let batches = plan
        .batches()
        .iter()
        .map(|batch| {
            let mut children = batch.child_ids();
            let first_child = children.next().map(str::to_string);
            let last_child = children.last().map(str::to_string).or_else(|| first_child.clone());
            BatchSummary {
                index: batch.index,
                root: batch.is_root_batch,
                size: batch.size(),
                first_child,
                last_child,
            }
        })
        .collect();

    PlanSummary {
        snapshot_id: plan.snapshot_id().to_string(),
        max_batch_size,
        operation_count: plan.operation_count(),
        batches,
    }
}

fn print_text_output(summary: &PlanSummary) {
    println!("Snapshot: {}", summary.snapshot_id);
    println!(
        "Operations: {} in {} batches (max {} per batch)",
        summary.operation_count,
        summary.batches.len(),
        summary.max_batch_size
    );
    println!();
    for batch in &summary.batches {
        let label = if batch.root { " (root)" } else { "" };
        match (&batch.first_child, &batch.last_child) {
            (Some(first), Some(last)) => println!(
                "  batch {}{}: {} ops, children {}..{}",
                batch.index, label, batch.size, first, last
            ),
            _ => println!("  batch {}{}: {} ops", batch.index, label, batch.size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfdash_testkit::{child_id, snapshot_with_children};

    #[test]
    fn summarizes_documented_split() {
        let summary = summarize(&snapshot_with_children(132), 50).unwrap();

        let sizes: Vec<_> = summary.batches.iter().map(|b| b.size).collect();
        assert_eq!(sizes, vec![50, 50, 33]);
        assert_eq!(summary.operation_count, 133);
        assert!(summary.batches[0].root);
        assert_eq!(summary.batches[1].first_child.as_deref(), Some(child_id(49).as_str()));
        assert_eq!(summary.batches[2].last_child.as_deref(), Some(child_id(131).as_str()));
    }

    #[test]
    fn root_only_batch_has_no_children() {
        let summary = summarize(&snapshot_with_children(0), 50).unwrap();
        assert_eq!(summary.batches.len(), 1);
        assert!(summary.batches[0].first_child.is_none());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(
            summarize(&snapshot_with_children(3), 0),
            Err(CliError::Write(_))
        ));
    }
}
