//! CLI command implementations.

pub mod plan;
pub mod write;

use perfdash_writer::{Snapshot, WriteError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// The snapshot file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The snapshot file is not a valid snapshot document.
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Command output could not be encoded.
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    /// The write pipeline rejected or failed the snapshot.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// An unsupported output format was requested.
    #[error("unknown output format '{0}' (expected text or json)")]
    Format(String),
}

/// Loads a snapshot from a JSON file.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, CliError> {
    let body = std::fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Output formats understood by every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    /// Parses a `--format` value.
    pub fn parse(value: &str) -> Result<Self, CliError> {
        match value {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(CliError::Format(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfdash_testkit::{snapshot_with_children, SnapshotFile};

    #[test]
    fn loads_snapshot_file() {
        let snapshot = snapshot_with_children(4);
        let file = SnapshotFile::new(&snapshot);

        assert_eq!(load_snapshot(&file.path).unwrap(), snapshot);
    }

    #[test]
    fn reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_snapshot(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, CliError::Read { .. }));
    }

    #[test]
    fn reports_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, br#"{"id": 7}"#).unwrap();

        let err = load_snapshot(&path).unwrap_err();
        assert!(matches!(err, CliError::Parse { .. }));
    }

    #[test]
    fn parses_formats() {
        assert_eq!(Format::parse("json").unwrap(), Format::Json);
        assert_eq!(Format::parse("text").unwrap(), Format::Text);
        assert!(Format::parse("yaml").is_err());
    }
}
