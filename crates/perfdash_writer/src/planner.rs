//! Batch planning.
//!
//! Splits a snapshot into store-sized batches. Batch 0 carries the root
//! write followed by as many leading children as fit; the remaining children
//! fill batches of `max_batch_size` in input order.

use crate::error::{ConfigError, WriteError, WriteResult};
use crate::model::{Snapshot, WriteBatch, WriteOp};
use std::collections::HashSet;

/// Deterministic partitioner for snapshot writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlanner {
    max_batch_size: usize,
}

impl BatchPlanner {
    /// Creates a planner.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroBatchSize`] if `max_batch_size` is zero.
    pub fn new(max_batch_size: usize) -> Result<Self, ConfigError> {
        if max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(Self { max_batch_size })
    }

    /// Maximum operations per batch.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Plans the batches for `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::InvalidSnapshot`] if the snapshot id is empty or
    /// two children share an identifier.
    pub fn plan(&self, snapshot: &Snapshot) -> WriteResult<BatchPlan> {
        validate_snapshot(snapshot)?;

        let capacity = self.max_batch_size;
        let lead = snapshot.children.len().min(capacity - 1);
        let (leading, rest) = snapshot.children.split_at(lead);

        let mut root_ops = Vec::with_capacity(lead + 1);
        root_ops.push(WriteOp::PutRoot {
            snapshot_id: snapshot.id.clone(),
            document: snapshot.root.clone(),
        });
        root_ops.extend(leading.iter().map(|c| child_op(&snapshot.id, c)));

        let mut batches = Vec::with_capacity(1 + rest.len().div_ceil(capacity));
        batches.push(WriteBatch {
            index: 0,
            is_root_batch: true,
            ops: root_ops,
        });

        for chunk in rest.chunks(capacity) {
            batches.push(WriteBatch {
                index: batches.len(),
                is_root_batch: false,
                ops: chunk.iter().map(|c| child_op(&snapshot.id, c)).collect(),
            });
        }

        Ok(BatchPlan {
            snapshot_id: snapshot.id.clone(),
            batches,
        })
    }
}

fn child_op(snapshot_id: &str, child: &crate::model::ChildRecord) -> WriteOp {
    WriteOp::PutChild {
        snapshot_id: snapshot_id.to_string(),
        child_id: child.id.clone(),
        document: child.payload.clone(),
    }
}

fn validate_snapshot(snapshot: &Snapshot) -> WriteResult<()> {
    if snapshot.id.is_empty() {
        return Err(WriteError::InvalidSnapshot("snapshot id is empty".into()));
    }

    let mut seen = HashSet::with_capacity(snapshot.children.len());
    for child in &snapshot.children {
        if !seen.insert(child.id.as_str()) {
            return Err(WriteError::InvalidSnapshot(format!(
                "duplicate child id {:?}",
                child.id
            )));
        }
    }
    Ok(())
}

/// The ordered batches of one snapshot write.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    snapshot_id: String,
    batches: Vec<WriteBatch>,
}

impl BatchPlan {
    /// Identifier of the planned snapshot.
    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    /// All batches, root first.
    pub fn batches(&self) -> &[WriteBatch] {
        &self.batches
    }

    /// Number of batches, root included.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Always false: a plan holds at least the root batch.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Total operations across all batches.
    pub fn operation_count(&self) -> usize {
        self.batches.iter().map(WriteBatch::size).sum()
    }

    /// Child identifiers grouped by batch index.
    pub fn child_ids_by_batch(&self) -> Vec<Vec<String>> {
        self.batches
            .iter()
            .map(|b| b.child_ids().map(str::to_string).collect())
            .collect()
    }

    /// Splits the plan into the root batch and the child batches.
    pub fn into_parts(self) -> (WriteBatch, Vec<WriteBatch>) {
        let mut batches = self.batches.into_iter();
        // The planner always emits batch 0.
        let root = batches.next().unwrap_or(WriteBatch {
            index: 0,
            is_root_batch: true,
            ops: Vec::new(),
        });
        (root, batches.collect())
    }
}
