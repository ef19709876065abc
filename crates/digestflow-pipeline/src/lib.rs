//! Cancellable walk, digest and fan-in pipeline for digestflow.
//!
//! # Overview
//!
//! `digestflow-pipeline` computes a content digest for every regular file
//! in a tree:
//!
//! - **Tree walker** enumerates the tree with jwalk and spawns one digest
//!   worker per file (optionally capped by a worker pool)
//! - **Digest workers** stream each file through the digester on tokio's
//!   blocking pool and publish a result
//! - **Aggregator** drains the results into a table, stopping at the first
//!   failure and cancelling everything still in flight
//! - **Merge** combines any number of streams into one, usable on its own
//!
//! Every stage observes a shared [`CancelSignal`]. Cancellation is
//! cooperative: a stage notices it at its next checkpoint, never in the
//! middle of a single read.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), digestflow_core::DigestError> {
//! use digestflow_pipeline::{DigestConfig, TreeDigester};
//!
//! let digester = TreeDigester::new(DigestConfig::new("/path/to/tree"));
//! let table = digester.digest_all().await?;
//!
//! for (path, hash) in table.iter() {
//!     println!("{hash}  {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Merging streams
//!
//! ```rust,no_run
//! # async fn run() {
//! use digestflow_pipeline::{CancelSignal, generate, merge};
//!
//! let cancel = CancelSignal::new();
//! let mut merged = merge(&cancel, [generate(&cancel, 0..3), generate(&cancel, 10..13)]);
//! while let Some(n) = merged.recv().await {
//!     println!("{n}");
//! }
//! # }
//! ```

mod aggregate;
mod cancel;
mod progress;
mod stream;
mod walker;
mod worker;

pub use aggregate::{DigestRun, TreeDigester, digest_all};
pub use cancel::{CancelGuard, CancelSignal};
pub use progress::{DigestProgress, PROGRESS_INTERVAL};
pub use stream::{
    Cancelled, generate, generate_with_capacity, merge, merge_with_capacity, recv_or_cancel,
    send_or_cancel,
};
pub use walker::{ErrorSlot, TreeWalker, WalkHandle, walk};
pub use worker::DigestWorker;

// Re-export core types for convenience
pub use digestflow_core::{
    AbortCause, Blake3Digester, ContentHash, DigestConfig, DigestError, DigestReport, DigestSink,
    DigestTable, Digester, DuplicateGroup, ErrorPolicy, FileFailure, FileResult,
};
