//! # PerfDash Testkit
//!
//! Test utilities for the PerfDash snapshot writer.
//!
//! This crate provides:
//! - Snapshot fixtures and writer helpers
//! - Property-based test generators using proptest
//! - A scripted document store that injects per-batch failures and latency
//!   and records every commit call
//!
//! ## Usage
//!
//! ```rust,ignore
//! use perfdash_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn writes_snapshot() {
//!     let store = Arc::new(ScriptedStore::new());
//!     let report = writer_for(&store, fast_config()).write(&snapshot_with_children(10)).await;
//!     // ... assertions
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scripted::*;
}

pub use fixtures::*;
pub use generators::*;
pub use scripted::*;
