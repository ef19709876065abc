//! Top-level orchestration: walk, drain, decide.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::task::{AbortOnDropHandle, TaskTracker};

use digestflow_core::{
    Blake3Digester, DigestConfig, DigestError, DigestReport, DigestTable, Digester, ErrorPolicy,
    FileFailure, FileResult,
};

use crate::cancel::{CancelGuard, CancelSignal};
use crate::progress::{DigestProgress, ProgressTracker};
use crate::stream::merge_with_capacity;
use crate::walker::{ErrorSlot, TreeWalker};
use crate::worker::DigestWorker;

/// Digests whole trees, merging per-file results into a [`DigestTable`].
pub struct TreeDigester {
    config: DigestConfig,
    digester: Arc<dyn Digester>,
    progress_tx: broadcast::Sender<DigestProgress>,
}

impl TreeDigester {
    /// Create a digester using BLAKE3.
    pub fn new(config: DigestConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config,
            digester: Arc::new(Blake3Digester),
            progress_tx,
        }
    }

    /// Swap in another digest algorithm.
    pub fn with_digester(mut self, digester: Arc<dyn Digester>) -> Self {
        self.digester = digester;
        self
    }

    /// Configuration used for every run.
    pub fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<DigestProgress> {
        self.progress_tx.subscribe()
    }

    /// Start digesting `config.root`.
    pub fn start(&self) -> Result<DigestRun, DigestError> {
        self.start_roots(std::slice::from_ref(&self.config.root), None)
    }

    /// Start digesting several roots at once.
    ///
    /// Each root gets its own walk; the result streams are merged into one.
    /// When `external` is given the run is scoped under it: firing it
    /// cancels the run, but the run's own cleanup never fires `external`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_roots(
        &self,
        roots: &[PathBuf],
        external: Option<&CancelSignal>,
    ) -> Result<DigestRun, DigestError> {
        if roots.is_empty() {
            return Err(DigestError::InvalidConfig {
                message: "at least one root is required".to_string(),
            });
        }

        let worker = DigestWorker::new(Arc::clone(&self.digester), self.config.read_buffer_size);
        let walker = TreeWalker::new(self.config.clone(), worker)?;

        let cancel = external.map(CancelSignal::child).unwrap_or_default();
        let guard = cancel.guard();
        let deadline = self
            .config
            .timeout
            .map(|after| AbortOnDropHandle::new(cancel.fire_after(after)));

        let mut streams = Vec::with_capacity(roots.len());
        let mut slots = Vec::with_capacity(roots.len());
        let mut workers = Vec::with_capacity(roots.len());

        for root in roots {
            let handle = walker.with_root(root).walk(&cancel);
            streams.push(handle.results);
            slots.push(handle.errors);
            workers.push(handle.workers);
        }

        let results = if streams.len() == 1 {
            streams.remove(0)
        } else {
            merge_with_capacity(&cancel, streams, self.config.channel_capacity)
        };

        tracing::debug!(
            roots = roots.len(),
            digester = self.digester.name(),
            "digest run started"
        );

        Ok(DigestRun {
            root: roots[0].clone(),
            results,
            slots,
            workers,
            cancel,
            guard: Some(guard),
            _deadline: deadline,
            policy: self.config.error_policy,
            progress_tx: self.progress_tx.clone(),
        })
    }

    /// Digest `config.root`, honoring the configured error policy.
    ///
    /// Returns the complete table or exactly one error; never a partial
    /// table.
    pub async fn digest_all(&self) -> Result<DigestTable, DigestError> {
        self.start()?.collect().await
    }

    /// [`digest_all`](Self::digest_all) scoped under an external signal.
    ///
    /// Firing `cancel` makes the call fail with a cancelled traversal error.
    pub async fn digest_all_with_cancel(
        &self,
        cancel: &CancelSignal,
    ) -> Result<DigestTable, DigestError> {
        self.start_roots(std::slice::from_ref(&self.config.root), Some(cancel))?
            .collect()
            .await
    }

    /// Digest several roots into one table.
    pub async fn digest_roots(&self, roots: &[PathBuf]) -> Result<DigestTable, DigestError> {
        self.start_roots(roots, None)?.collect().await
    }

    /// Digest `config.root` and report every per-file failure.
    ///
    /// Under [`ErrorPolicy::FailFast`] this behaves like
    /// [`digest_all`](Self::digest_all) and stops at the first failure.
    pub async fn digest_report(&self) -> Result<DigestReport, DigestError> {
        self.start()?.collect_report().await
    }
}

impl std::fmt::Debug for TreeDigester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeDigester")
            .field("config", &self.config)
            .field("digester", &self.digester.name())
            .finish()
    }
}

/// Digest `root` with default settings.
///
/// Must be called from within a tokio runtime.
pub async fn digest_all(root: impl Into<PathBuf>) -> Result<DigestTable, DigestError> {
    TreeDigester::new(DigestConfig::new(root))
        .digest_all()
        .await
}

/// One in-flight digest operation.
///
/// Dropping a run without collecting it cancels all of its work.
pub struct DigestRun {
    root: PathBuf,
    results: mpsc::Receiver<FileResult>,
    slots: Vec<ErrorSlot>,
    workers: Vec<TaskTracker>,
    cancel: CancelSignal,
    guard: Option<CancelGuard>,
    _deadline: Option<AbortOnDropHandle<()>>,
    policy: ErrorPolicy,
    progress_tx: broadcast::Sender<DigestProgress>,
}

impl DigestRun {
    /// Signal scoped to this run.
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Completion counters of the workers spawned by each walk.
    pub fn workers(&self) -> &[TaskTracker] {
        &self.workers
    }

    /// First root of this run.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drain the run into a table.
    ///
    /// Fails on the first per-file error under [`ErrorPolicy::FailFast`];
    /// under [`ErrorPolicy::CollectAll`] drains everything first and then
    /// fails with the first recorded error, if any.
    pub async fn collect(self) -> Result<DigestTable, DigestError> {
        let (report, first_failure) = self.drain().await?;
        match first_failure {
            Some(err) => Err(err),
            None => Ok(report.table),
        }
    }

    /// Drain the run into a report holding the table and every failure.
    pub async fn collect_report(self) -> Result<DigestReport, DigestError> {
        let (report, _) = self.drain().await?;
        Ok(report)
    }

    async fn drain(mut self) -> Result<(DigestReport, Option<DigestError>), DigestError> {
        // Any early return drops the guard, which fires the run signal
        let guard = self.guard.take();
        let mut tracker = ProgressTracker::new();
        let mut report = DigestReport::default();
        let mut first_failure = None;

        while let Some(result) = self.results.recv().await {
            if let Some(source) = result.error {
                tracker.record_failure(&result.path);
                match self.policy {
                    ErrorPolicy::FailFast => {
                        self.cancel.fire();
                        let _ = self.progress_tx.send(tracker.snapshot(true));
                        return Err(DigestError::file_read(result.path, source));
                    }
                    ErrorPolicy::CollectAll => {
                        report
                            .failures
                            .push(FileFailure::new(&result.path, source.to_string()));
                        if first_failure.is_none() {
                            first_failure = Some(DigestError::file_read(result.path, source));
                        }
                    }
                }
            } else {
                tracker.record_file(&result.path, result.bytes);
                report.table.insert(result.path, result.digest);
            }

            if tracker.is_due() {
                let _ = self.progress_tx.send(tracker.snapshot(false));
            }
        }

        for slot in std::mem::take(&mut self.slots) {
            if let Err(err) = slot.take().await {
                self.cancel.fire();
                let _ = self.progress_tx.send(tracker.snapshot(true));
                return Err(err);
            }
        }

        // Workers abandoned by a late cancellation leave holes in the table
        if self.cancel.is_fired() {
            let _ = self.progress_tx.send(tracker.snapshot(true));
            return Err(DigestError::cancelled(&self.root));
        }

        if let Some(guard) = guard {
            guard.disarm();
        }

        report.bytes_hashed = tracker.bytes_digested();
        let snapshot = tracker.snapshot(true);
        tracing::info!(
            root = %self.root.display(),
            files = snapshot.files_digested,
            failed = snapshot.files_failed,
            bytes = snapshot.bytes_digested,
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            "digest run finished"
        );
        let _ = self.progress_tx.send(snapshot);

        Ok((report, first_failure))
    }
}

impl std::fmt::Debug for DigestRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestRun")
            .field("root", &self.root)
            .field("policy", &self.policy)
            .field("cancelled", &self.cancel.is_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_roots_rejected() {
        let digester = TreeDigester::new(DigestConfig::default());
        let err = digester.start_roots(&[], None).unwrap_err();
        assert!(matches!(err, DigestError::InvalidConfig { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_completed_run_leaves_external_signal() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();

        let external = CancelSignal::new();
        let digester = TreeDigester::new(DigestConfig::new(temp.path()));
        let table = digester.digest_all_with_cancel(&external).await.unwrap();

        assert_eq!(table.len(), 1);
        assert!(!external.is_fired());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_run_does_not_fire_external_signal() {
        let temp = TempDir::new().unwrap();
        let external = CancelSignal::new();
        let digester = TreeDigester::new(DigestConfig::new(temp.path().join("missing")));

        let err = digester
            .digest_all_with_cancel(&external)
            .await
            .unwrap_err();
        assert!(err.is_traversal());
        assert!(!external.is_fired());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_run_cancels_its_signal() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();

        let digester = TreeDigester::new(DigestConfig::new(temp.path()));
        let run = digester.start().unwrap();
        assert_eq!(run.root(), temp.path());
        let signal = run.cancel_signal().clone();
        drop(run);

        assert!(signal.is_fired());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_final_progress_published() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();
        fs::write(temp.path().join("b.txt"), "world!").unwrap();

        let digester = TreeDigester::new(DigestConfig::new(temp.path()));
        let mut progress_rx = digester.subscribe();
        digester.digest_all().await.unwrap();

        let last = progress_rx.recv().await.unwrap();
        assert!(last.finished);
        assert_eq!(last.files_digested, 2);
        assert_eq!(last.bytes_digested, 11);
    }
}
