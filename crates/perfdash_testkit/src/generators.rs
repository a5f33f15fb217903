//! Property-based test generators using proptest.
//!
//! Child identifiers are derived from their position so generated snapshots
//! always satisfy the uniqueness requirement.

use perfdash_writer::{ChildRecord, Snapshot};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for small JSON payloads.
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!({ "value": n })),
        "[a-z]{0,12}".prop_map(|s| json!({ "label": s })),
        (any::<u32>(), any::<bool>()).prop_map(|(n, flag)| json!({ "rank": n, "active": flag })),
    ]
}

/// Strategy for valid snapshots with up to `max_children` children.
pub fn snapshot_strategy(max_children: usize) -> impl Strategy<Value = Snapshot> {
    (
        "[a-z][a-z0-9-]{0,15}",
        payload_strategy(),
        prop::collection::vec(payload_strategy(), 0..=max_children),
    )
        .prop_map(|(id, root, payloads)| {
            let children = payloads
                .into_iter()
                .enumerate()
                .map(|(i, payload)| ChildRecord::new(format!("child-{i}"), payload))
                .collect();
            Snapshot::new(id, root).with_children(children)
        })
}

/// Strategy for batch size limits, biased towards small values.
pub fn batch_size_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![
        3 => 1usize..=5,
        2 => 6usize..=60,
        1 => Just(500usize),
    ]
}
