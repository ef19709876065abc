//! Digest progress reporting.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Results between two progress snapshots.
pub const PROGRESS_INTERVAL: u64 = 100;

/// Progress information during a digest run.
#[derive(Debug, Clone, Default)]
pub struct DigestProgress {
    /// Files digested successfully so far.
    pub files_digested: u64,
    /// Files whose read failed so far.
    pub files_failed: u64,
    /// Total bytes hashed so far.
    pub bytes_digested: u64,
    /// Path of the most recent result.
    pub current_path: PathBuf,
    /// Time elapsed since the run started.
    pub elapsed: Duration,
    /// Set on the final snapshot of a run.
    pub finished: bool,
}

impl DigestProgress {
    /// Calculate throughput in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_digested as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Calculate throughput in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.bytes_digested as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Files seen so far, successful or not.
    pub fn total_files(&self) -> u64 {
        self.files_digested + self.files_failed
    }
}

/// Running counters owned by the aggregator.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    files_digested: u64,
    files_failed: u64,
    bytes_digested: u64,
    current_path: PathBuf,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            files_digested: 0,
            files_failed: 0,
            bytes_digested: 0,
            current_path: PathBuf::new(),
        }
    }

    pub fn record_file(&mut self, path: &std::path::Path, bytes: u64) {
        self.files_digested += 1;
        self.bytes_digested += bytes;
        self.current_path = path.to_path_buf();
    }

    pub fn record_failure(&mut self, path: &std::path::Path) {
        self.files_failed += 1;
        self.current_path = path.to_path_buf();
    }

    pub fn bytes_digested(&self) -> u64 {
        self.bytes_digested
    }

    /// Whether the latest result lands on a snapshot boundary.
    pub fn is_due(&self) -> bool {
        let total = self.files_digested + self.files_failed;
        total > 0 && total % PROGRESS_INTERVAL == 0
    }

    pub fn snapshot(&self, finished: bool) -> DigestProgress {
        DigestProgress {
            files_digested: self.files_digested,
            files_failed: self.files_failed,
            bytes_digested: self.bytes_digested,
            current_path: self.current_path.clone(),
            elapsed: self.start_time.elapsed(),
            finished,
        }
    }
}
