//! JWalk-based tree walker that fans out one digest worker per file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use jwalk::WalkDir;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio_util::task::TaskTracker;

use digestflow_core::{DigestConfig, DigestError, FileResult};

use crate::cancel::CancelSignal;
use crate::worker::DigestWorker;

/// One-shot slot holding the walk's own outcome.
///
/// Written once by the walker and read once by the consumer, after the
/// result stream has closed.
#[derive(Debug)]
pub struct ErrorSlot {
    rx: oneshot::Receiver<Result<(), DigestError>>,
}

impl ErrorSlot {
    /// Wait for the walk outcome.
    pub async fn take(self) -> Result<(), DigestError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(DigestError::Other {
                message: "walker exited without reporting".to_string(),
            }),
        }
    }
}

/// A running walk.
#[derive(Debug)]
pub struct WalkHandle {
    /// One result per regular file. Closes after every worker has published
    /// or abandoned its result.
    pub results: mpsc::Receiver<FileResult>,
    /// The walk's own error, if any.
    pub errors: ErrorSlot,
    /// Completion counter of the spawned workers.
    pub workers: TaskTracker,
}

/// Walks a tree and digests every regular file in it.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    config: DigestConfig,
    worker: DigestWorker,
    ignore: Arc<GlobSet>,
}

impl TreeWalker {
    /// Create a walker, compiling the configured ignore patterns.
    pub fn new(config: DigestConfig, worker: DigestWorker) -> Result<Self, DigestError> {
        let ignore = build_ignore_set(&config.ignore_patterns)?;
        Ok(Self {
            config,
            worker,
            ignore: Arc::new(ignore),
        })
    }

    /// Same walker pointed at another root.
    pub fn with_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            config: self.config.with_root(root),
            worker: self.worker.clone(),
            ignore: Arc::clone(&self.ignore),
        }
    }

    /// Start walking `config.root`.
    ///
    /// Directory visits check `cancel`; once it fires no new workers are
    /// spawned and the error slot reports a cancelled walk. Workers already
    /// running finish or abandon their result on their own.
    ///
    /// Must be called from within a tokio runtime.
    pub fn walk(&self, cancel: &CancelSignal) -> WalkHandle {
        let (tx, results) = mpsc::channel(self.config.channel_capacity.max(1));
        let (slot_tx, slot_rx) = oneshot::channel();
        let workers = TaskTracker::new();

        let limiter = self
            .config
            .is_bounded()
            .then(|| Arc::new(Semaphore::new(self.config.max_workers)));

        let ctx = WalkContext {
            config: self.config.clone(),
            ignore: Arc::clone(&self.ignore),
            worker: self.worker.clone(),
            cancel: cancel.clone(),
            tx: tx.clone(),
            workers: workers.clone(),
            limiter,
            runtime: Handle::current(),
        };

        let tracker = workers.clone();
        tokio::spawn(async move {
            let root = ctx.config.root.clone();
            let outcome = match tokio::task::spawn_blocking(move || ctx.enumerate()).await {
                Ok(outcome) => outcome,
                Err(err) => Err(DigestError::Other {
                    message: format!("walk task failed: {err}"),
                }),
            };
            tracker.close();

            match &outcome {
                Ok(spawned) => {
                    tracing::debug!(root = %root.display(), spawned, "walk complete");
                }
                Err(err) => {
                    tracing::warn!(root = %root.display(), error = %err, "walk aborted");
                }
            }
            let _ = slot_tx.send(outcome.map(|_| ()));

            tracker.wait().await;
            drop(tx);
            tracing::debug!(root = %root.display(), "result stream closed");
        });

        WalkHandle {
            results,
            errors: ErrorSlot { rx: slot_rx },
            workers,
        }
    }
}

/// Walk `root` with default settings and BLAKE3.
///
/// Must be called from within a tokio runtime.
pub fn walk(root: impl Into<PathBuf>, cancel: &CancelSignal) -> WalkHandle {
    TreeWalker {
        config: DigestConfig::new(root),
        worker: DigestWorker::default(),
        ignore: Arc::new(GlobSet::empty()),
    }
    .walk(cancel)
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet, DigestError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| DigestError::InvalidConfig {
            message: format!("bad ignore pattern {pattern:?}: {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| DigestError::InvalidConfig {
        message: e.to_string(),
    })
}

/// State moved onto the blocking pool for one walk.
struct WalkContext {
    config: DigestConfig,
    ignore: Arc<GlobSet>,
    worker: DigestWorker,
    cancel: CancelSignal,
    tx: mpsc::Sender<FileResult>,
    workers: TaskTracker,
    limiter: Option<Arc<Semaphore>>,
    runtime: Handle,
}

impl WalkContext {
    /// Enumerate the tree, spawning a worker per regular file.
    ///
    /// Returns the number of workers spawned.
    fn enumerate(self) -> Result<u64, DigestError> {
        let root = self.config.root.clone();
        let metadata = std::fs::metadata(&root).map_err(|e| DigestError::traversal_io(&root, e))?;

        if metadata.is_file() {
            self.dispatch(root)?;
            return Ok(1);
        }
        if !metadata.is_dir() {
            return Ok(0);
        }

        let ignore = Arc::clone(&self.ignore);
        let cancel = self.cancel.clone();
        let filter_config = self.config.clone();
        let max_depth = self
            .config
            .max_depth
            .map(|d| d as usize)
            .unwrap_or(usize::MAX);

        let walker = WalkDir::new(&root)
            // Hidden names are filtered per child below so the root itself is never skipped
            .skip_hidden(false)
            .follow_links(self.config.follow_symlinks)
            .sort(true)
            .min_depth(0)
            .max_depth(max_depth)
            .process_read_dir(move |_depth, _path, _state, children| {
                // Stop descending once cancelled
                if cancel.is_fired() {
                    children.clear();
                    return;
                }
                children.retain(|child| match child {
                    Ok(entry) => {
                        let name = entry.file_name();
                        !filter_config.should_skip_hidden(&name.to_string_lossy())
                            && !ignore.is_match(name)
                    }
                    Err(_) => true,
                });
            });

        let mut spawned = 0u64;
        let mut dirs = 0u64;

        for entry_result in walker {
            if self.cancel.is_fired() {
                return Err(DigestError::cancelled(&root));
            }

            let mut entry = entry_result.map_err(|err| walk_error(&root, err))?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                // jwalk reports an unreadable directory on the entry itself
                if let Some(err) = entry.read_children_error.take() {
                    return Err(walk_error(&root, err));
                }
                dirs += 1;
                tracing::trace!(path = %entry.path().display(), "visiting directory");
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            self.dispatch(entry.path())?;
            spawned += 1;
        }

        // Cancellation may have pruned the walk without surfacing above
        if self.cancel.is_fired() {
            return Err(DigestError::cancelled(&root));
        }

        tracing::debug!(root = %root.display(), dirs, files = spawned, "enumeration finished");
        Ok(spawned)
    }

    /// Spawn one worker for `path`, waiting for a pool slot when bounded.
    fn dispatch(&self, path: PathBuf) -> Result<(), DigestError> {
        let permit = match &self.limiter {
            Some(limiter) => match self.acquire(limiter) {
                Some(permit) => Some(permit),
                None => return Err(DigestError::cancelled(&path)),
            },
            None => None,
        };

        let worker = self.worker.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        self.workers.spawn_on(
            async move {
                worker.run(path, tx, cancel).await;
                drop(permit);
            },
            &self.runtime,
        );
        Ok(())
    }

    /// Block this walker thread until a worker slot frees up or the run is
    /// cancelled.
    fn acquire(&self, limiter: &Arc<Semaphore>) -> Option<OwnedSemaphorePermit> {
        let limiter = Arc::clone(limiter);
        self.runtime.block_on(async {
            tokio::select! {
                biased;
                _ = self.cancel.fired() => None,
                permit = limiter.acquire_owned() => permit.ok(),
            }
        })
    }
}

fn walk_error(root: &Path, err: jwalk::Error) -> DigestError {
    let path = err
        .path()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| root.to_path_buf());
    let kind = err
        .io_error()
        .map(|e| e.kind())
        .unwrap_or(std::io::ErrorKind::Other);
    DigestError::traversal_io(path, std::io::Error::new(kind, err.to_string()))
}
