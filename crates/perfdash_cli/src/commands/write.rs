//! Write command implementation.
//!
//! Writes go to an in-memory store so pipeline settings can be tried out
//! against injected latency and failures without a real backend.

use super::{load_snapshot, CliError, Format};
use clap::Args;
use perfdash_writer::{
    MemoryStore, RetryConfig, Snapshot, SnapshotWriter, StoreErrorCode, WriteError, WriteReport,
    WriterConfig, DEFAULT_MEMORY_COMMIT_LIMIT,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Pipeline and store settings for `perfdash write`.
#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    /// Maximum operations per batch
    #[arg(short, long, default_value = "50")]
    pub batch_size: usize,

    /// Maximum child batches in flight
    #[arg(short, long, default_value = "3")]
    pub concurrency: usize,

    /// Per-commit timeout in seconds
    #[arg(long, default_value = "30")]
    pub batch_timeout_secs: u64,

    /// Whole-write timeout in seconds
    #[arg(long, default_value = "300")]
    pub total_timeout_secs: u64,

    /// Retries after the first attempt
    #[arg(long, default_value = "3")]
    pub max_retries: u32,

    /// Backoff before the first retry, in milliseconds
    #[arg(long, default_value = "1000")]
    pub base_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[arg(long, default_value = "30000")]
    pub max_backoff_ms: u64,

    /// Probability that a commit fails with `unavailable`
    #[arg(long, default_value = "0.0")]
    pub fail_rate: f64,

    /// Simulated latency per commit in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,

    /// Maximum operations the store accepts per commit
    #[arg(long, default_value_t = DEFAULT_MEMORY_COMMIT_LIMIT)]
    pub commit_limit: usize,
}

impl WriteArgs {
    /// Builds the writer configuration.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig::default()
            .with_max_batch_size(self.batch_size)
            .with_max_concurrency(self.concurrency)
            .with_per_batch_timeout(Duration::from_secs(self.batch_timeout_secs))
            .with_total_timeout(Duration::from_secs(self.total_timeout_secs))
            .with_retry(
                RetryConfig::new(self.max_retries)
                    .with_base_backoff(Duration::from_millis(self.base_backoff_ms))
                    .with_max_backoff(Duration::from_millis(self.max_backoff_ms)),
            )
    }

    /// Builds the in-memory store.
    pub fn store(&self) -> MemoryStore {
        let mut store = MemoryStore::new().with_commit_limit(self.commit_limit);
        if self.latency_ms > 0 {
            store = store.with_latency(Duration::from_millis(self.latency_ms));
        }
        if self.fail_rate > 0.0 {
            store = store.with_failure_rate(self.fail_rate, StoreErrorCode::Unavailable);
        }
        store
    }
}

/// Runs the write command.
///
/// A root failure prints the report and then returns the error.
pub async fn run(path: &Path, args: &WriteArgs, format: &str) -> Result<(), CliError> {
    let format = Format::parse(format)?;
    let snapshot = load_snapshot(path)?;
    let store = Arc::new(args.store());

    let outcome = execute(&snapshot, args, Arc::clone(&store)).await;
    info!(documents = store.len(), commits = store.commit_count(), "store state after write");

    match outcome {
        Ok(report) => print_report(&report, format),
        Err(WriteError::RootFailed {
            attempts,
            reason,
            report,
        }) => {
            print_report(&report, format)?;
            Err(WriteError::RootFailed {
                attempts,
                reason,
                report,
            }
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Writes `snapshot` to `store` with the configured pipeline.
pub async fn execute(
    snapshot: &Snapshot,
    args: &WriteArgs,
    store: Arc<MemoryStore>,
) -> Result<WriteReport, WriteError> {
    let writer = SnapshotWriter::new(args.writer_config(), store);
    writer.write(snapshot).await
}

fn print_report(report: &WriteReport, format: Format) -> Result<(), CliError> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
        Format::Text => {
            println!("{report}");
            println!("Write id: {}", report.write_id());
            println!("Retries: {}", report.total_retries());
            let timings = report.timings();
            println!(
                "Phases: root {:?}, children {:?}, total {:?}",
                timings.root, timings.children, timings.total
            );
            for batch in report.batches() {
                match &batch.error {
                    Some(error) => println!(
                        "  batch {}: {:?} after {} attempts ({})",
                        batch.index, batch.outcome, batch.attempts, error
                    ),
                    None => println!(
                        "  batch {}: {:?} after {} attempts",
                        batch.index, batch.outcome, batch.attempts
                    ),
                }
            }
            if report.needs_repair() {
                println!(
                    "Children to rewrite: {}",
                    report.failed().len() + report.aborted().len()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use perfdash_testkit::snapshot_with_children;
    use perfdash_writer::WriteStatus;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: WriteArgs,
    }

    fn args(extra: &[&str]) -> WriteArgs {
        let argv = std::iter::once("perfdash").chain(extra.iter().copied());
        Harness::parse_from(argv).args
    }

    #[test]
    fn defaults_match_writer_defaults() {
        assert_eq!(args(&[]).writer_config(), WriterConfig::default());
    }

    #[test]
    fn flags_reach_the_config() {
        let config = args(&["--batch-size", "10", "--concurrency", "5", "--max-retries", "1"])
            .writer_config();
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.retry.max_retries, 1);
    }

    #[tokio::test]
    async fn writes_into_memory_store() {
        let args = args(&["--batch-size", "20"]);
        let store = Arc::new(args.store());

        let report = execute(&snapshot_with_children(45), &args, Arc::clone(&store))
            .await
            .unwrap();

        assert_eq!(report.status(), WriteStatus::Complete);
        assert_eq!(report.batches().len(), 3);
        assert_eq!(store.len(), 46);
    }

    #[tokio::test]
    async fn commit_limit_below_batch_size_fails_root() {
        let args = args(&["--batch-size", "20", "--commit-limit", "10"]);
        let store = Arc::new(args.store());

        let err = execute(&snapshot_with_children(45), &args, Arc::clone(&store))
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::RootFailed { attempts: 1, .. }));
        assert!(store.is_empty());
    }
}
