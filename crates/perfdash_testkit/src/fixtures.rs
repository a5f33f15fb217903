//! Snapshot fixtures and writer helpers.

use perfdash_writer::{
    ChildRecord, DocumentStore, RetryConfig, Snapshot, SnapshotWriter, WriterConfig,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Identifier used by every fixture snapshot.
pub const FIXTURE_SNAPSHOT_ID: &str = "perf-2024-w07";

/// Child identifier at position `i` in a fixture snapshot.
pub fn child_id(i: usize) -> String {
    format!("team-{i:03}")
}

/// Document key of the child at position `i` in a fixture snapshot.
pub fn child_key(i: usize) -> String {
    format!("{FIXTURE_SNAPSHOT_ID}/{}", child_id(i))
}

/// Creates a snapshot with `count` children resembling weekly team stats.
pub fn snapshot_with_children(count: usize) -> Snapshot {
    let children = (0..count)
        .map(|i| {
            ChildRecord::new(
                child_id(i),
                json!({
                    "team": child_id(i),
                    "throughput": 100 + i,
                    "p95_ms": 20 + (i % 7),
                    "rank": i + 1,
                }),
            )
        })
        .collect();

    Snapshot::new(
        FIXTURE_SNAPSHOT_ID,
        json!({
            "week": "2024-W07",
            "source": "fixtures",
            "child_count": count,
        }),
    )
    .with_children(children)
}

/// Default config with zero jitter, for exact timing assertions.
pub fn exact_config() -> WriterConfig {
    WriterConfig::default().with_retry(RetryConfig::new(3).with_jitter_factor(0.0))
}

/// Config with millisecond backoff, for tests that run on real time.
pub fn fast_config() -> WriterConfig {
    WriterConfig::default()
        .with_per_batch_timeout(Duration::from_secs(5))
        .with_total_timeout(Duration::from_secs(30))
        .with_retry(
            RetryConfig::new(3)
                .with_base_backoff(Duration::from_millis(1))
                .with_max_backoff(Duration::from_millis(10)),
        )
}

/// Builds a writer over a shared store.
pub fn writer_for<S: DocumentStore + 'static>(store: &Arc<S>, config: WriterConfig) -> SnapshotWriter {
    let store: Arc<dyn DocumentStore> = Arc::clone(store) as Arc<dyn DocumentStore>;
    SnapshotWriter::new(config, store)
}

/// A snapshot serialized to a JSON file in a temporary directory.
pub struct SnapshotFile {
    /// Path of the JSON file.
    pub path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl SnapshotFile {
    /// Writes `snapshot` to `snapshot.json` in a fresh temporary directory.
    pub fn new(snapshot: &Snapshot) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("snapshot.json");
        let body = serde_json::to_vec_pretty(snapshot).expect("Failed to encode snapshot");
        std::fs::write(&path, body).expect("Failed to write snapshot file");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_snapshot_shape() {
        let snapshot = snapshot_with_children(12);
        assert_eq!(snapshot.id, FIXTURE_SNAPSHOT_ID);
        assert_eq!(snapshot.children.len(), 12);
        assert_eq!(snapshot.children[3].id, "team-003");
        assert_eq!(child_key(3), "perf-2024-w07/team-003");
    }

    #[test]
    fn snapshot_file_round_trips() {
        let snapshot = snapshot_with_children(2);
        let file = SnapshotFile::new(&snapshot);
        let loaded: Snapshot =
            serde_json::from_slice(&std::fs::read(&file.path).unwrap()).unwrap();
        assert_eq!(loaded, snapshot);
    }
}
