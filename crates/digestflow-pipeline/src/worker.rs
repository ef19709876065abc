//! Per-file digest worker.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use digestflow_core::{Blake3Digester, DEFAULT_READ_BUFFER_SIZE, Digester, FileResult};

use crate::cancel::CancelSignal;
use crate::stream::{Cancelled, send_or_cancel};

/// Reads one file and hashes it, checking cancellation between chunks.
#[derive(Clone)]
pub struct DigestWorker {
    digester: Arc<dyn Digester>,
    read_buffer_size: usize,
}

impl DigestWorker {
    /// Create a worker around a digest algorithm.
    pub fn new(digester: Arc<dyn Digester>, read_buffer_size: usize) -> Self {
        Self {
            digester,
            read_buffer_size: read_buffer_size.max(1),
        }
    }

    /// Algorithm used by this worker.
    pub fn digester(&self) -> &dyn Digester {
        self.digester.as_ref()
    }

    /// Hash `path` on the current thread.
    ///
    /// Read failures come back as a failed [`FileResult`], never as a panic
    /// or an `Err`. `Err(Cancelled)` means the signal fired before or
    /// between reads and the partial result was dropped.
    pub fn digest_blocking(
        &self,
        path: &Path,
        cancel: &CancelSignal,
    ) -> Result<FileResult, Cancelled> {
        if cancel.is_fired() {
            return Err(Cancelled);
        }

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) => return Ok(FileResult::failed(path.to_path_buf(), err)),
        };

        let mut sink = self.digester.begin();
        let mut buffer = vec![0u8; self.read_buffer_size];
        let mut bytes = 0u64;

        loop {
            if cancel.is_fired() {
                return Err(Cancelled);
            }
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Ok(FileResult::failed(path.to_path_buf(), err)),
            };
            sink.update(&buffer[..read]);
            bytes += read as u64;
        }

        Ok(FileResult::ok(path.to_path_buf(), sink.finish(), bytes))
    }

    /// Hash `path` on tokio's blocking pool.
    ///
    /// A read already in progress is not interrupted; the worker notices a
    /// fired signal when that read returns.
    pub async fn digest(
        &self,
        path: PathBuf,
        cancel: &CancelSignal,
    ) -> Result<FileResult, Cancelled> {
        let worker = self.clone();
        let task_cancel = cancel.clone();
        let task_path = path.clone();

        match tokio::task::spawn_blocking(move || worker.digest_blocking(&task_path, &task_cancel))
            .await
        {
            Ok(result) => result,
            Err(err) => Ok(FileResult::failed(
                path,
                std::io::Error::other(format!("digest task failed: {err}")),
            )),
        }
    }

    /// Digest `path` and publish the result onto `out`.
    ///
    /// The publish races `cancel`, so the worker never blocks on a consumer
    /// that has stopped draining.
    pub async fn run(self, path: PathBuf, out: mpsc::Sender<FileResult>, cancel: CancelSignal) {
        let result = match self.digest(path, &cancel).await {
            Ok(result) => result,
            Err(Cancelled) => return,
        };

        if let Some(err) = &result.error {
            tracing::warn!(path = %result.path.display(), error = %err, "read failed");
        }

        let path = result.path.clone();
        if send_or_cancel(&out, result, &cancel).await.is_err() {
            tracing::trace!(path = %path.display(), "result abandoned");
        }
    }
}

impl Default for DigestWorker {
    fn default() -> Self {
        Self::new(Arc::new(Blake3Digester), DEFAULT_READ_BUFFER_SIZE)
    }
}

impl fmt::Debug for DigestWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestWorker")
            .field("digester", &self.digester().name())
            .field("read_buffer_size", &self.read_buffer_size)
            .finish()
    }
}
