//! Snapshot data model and write operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A child record of a snapshot.
///
/// The payload is opaque to the writer; it is handed to the store as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRecord {
    /// Identifier, unique within its snapshot.
    pub id: String,
    /// Document body.
    pub payload: Value,
}

impl ChildRecord {
    /// Creates a new child record.
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// One logical snapshot: a root manifest plus ordered child records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot identifier, used as the root document key.
    pub id: String,
    /// Root metadata / manifest document.
    pub root: Value,
    /// Child records in input order.
    #[serde(default)]
    pub children: Vec<ChildRecord>,
}

impl Snapshot {
    /// Creates a snapshot with no children.
    pub fn new(id: impl Into<String>, root: Value) -> Self {
        Self {
            id: id.into(),
            root,
            children: Vec::new(),
        }
    }

    /// Appends a child record.
    #[must_use]
    pub fn with_child(mut self, child: ChildRecord) -> Self {
        self.children.push(child);
        self
    }

    /// Replaces the child records.
    #[must_use]
    pub fn with_children(mut self, children: Vec<ChildRecord>) -> Self {
        self.children = children;
        self
    }

    /// Number of write operations needed: the root plus every child.
    pub fn operation_count(&self) -> usize {
        self.children.len() + 1
    }

    /// Iterates over child identifiers in input order.
    pub fn child_ids(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|c| c.id.as_str())
    }
}

/// A single document write within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteOp {
    /// Overwrites the root manifest document.
    PutRoot {
        /// Snapshot identifier.
        snapshot_id: String,
        /// Root document body.
        document: Value,
    },
    /// Overwrites one child document under the snapshot.
    PutChild {
        /// Snapshot identifier.
        snapshot_id: String,
        /// Child identifier.
        child_id: String,
        /// Child document body.
        document: Value,
    },
}

impl WriteOp {
    /// Returns the document key this operation targets.
    ///
    /// Root documents live at `<snapshot>`, children at `<snapshot>/<child>`.
    pub fn key(&self) -> String {
        match self {
            WriteOp::PutRoot { snapshot_id, .. } => snapshot_id.clone(),
            WriteOp::PutChild {
                snapshot_id,
                child_id,
                ..
            } => format!("{snapshot_id}/{child_id}"),
        }
    }

    /// Returns the child identifier, or `None` for the root write.
    pub fn child_id(&self) -> Option<&str> {
        match self {
            WriteOp::PutRoot { .. } => None,
            WriteOp::PutChild { child_id, .. } => Some(child_id),
        }
    }

    /// Returns true if this is the root write.
    pub fn is_root(&self) -> bool {
        matches!(self, WriteOp::PutRoot { .. })
    }

    /// Returns the document body.
    pub fn document(&self) -> &Value {
        match self {
            WriteOp::PutRoot { document, .. } | WriteOp::PutChild { document, .. } => document,
        }
    }
}

/// An ordered group of operations committed in one store call.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    /// 0-based position in the plan.
    pub index: usize,
    /// True only for batch 0, which carries the root write.
    pub is_root_batch: bool,
    /// Operations in commit order.
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Number of operations in the batch.
    pub fn size(&self) -> usize {
        self.ops.len()
    }

    /// Child identifiers carried by this batch, in order.
    pub fn child_ids(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(WriteOp::child_id)
    }
}
