//! Cancellable stream combinators over bounded tokio channels.
//!
//! A stream is an `mpsc::Receiver<T>`. Every producer here races each
//! publish against a [`CancelSignal`], so a consumer that stops draining
//! never leaves a producer blocked once the signal has fired.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use digestflow_core::DEFAULT_CHANNEL_CAPACITY;

use crate::cancel::CancelSignal;

/// A send or receive gave up because the run was cancelled or the other
/// side went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Publish `item`, or give up if `cancel` fires first.
///
/// A dropped receiver counts as cancellation: nobody is listening any more.
pub async fn send_or_cancel<T>(
    tx: &mpsc::Sender<T>,
    item: T,
    cancel: &CancelSignal,
) -> Result<(), Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.fired() => Err(Cancelled),
        sent = tx.send(item) => sent.map_err(|_| Cancelled),
    }
}

/// Receive the next item, or `Err(Cancelled)` if `cancel` fires first.
///
/// `Ok(None)` means the stream is exhausted.
pub async fn recv_or_cancel<T>(
    rx: &mut mpsc::Receiver<T>,
    cancel: &CancelSignal,
) -> Result<Option<T>, Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.fired() => Err(Cancelled),
        item = rx.recv() => Ok(item),
    }
}

/// Merge any number of streams into one.
///
/// See [`merge_with_capacity`].
pub fn merge<T, I>(cancel: &CancelSignal, inputs: I) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = mpsc::Receiver<T>>,
{
    merge_with_capacity(cancel, inputs, DEFAULT_CHANNEL_CAPACITY)
}

/// Merge any number of streams into one output of the given buffer size.
///
/// One relay task per input forwards elements in arrival order. Order is
/// kept within an input; across inputs it is whatever the scheduler does.
/// The output closes once every input is drained, or once `cancel` fires
/// and the relays have stopped, whichever comes first. Closing always
/// happens after the last relay exits.
///
/// Must be called from within a tokio runtime.
pub fn merge_with_capacity<T, I>(
    cancel: &CancelSignal,
    inputs: I,
    capacity: usize,
) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = mpsc::Receiver<T>>,
{
    let (tx, out) = mpsc::channel(capacity.max(1));
    let relays = TaskTracker::new();

    for (index, input) in inputs.into_iter().enumerate() {
        relays.spawn(relay(index, input, tx.clone(), cancel.clone()));
    }
    relays.close();

    tracing::debug!(inputs = relays.len(), "merge started");

    tokio::spawn(async move {
        relays.wait().await;
        drop(tx);
        tracing::debug!("merge output closed");
    });

    out
}

async fn relay<T>(
    index: usize,
    mut input: mpsc::Receiver<T>,
    out: mpsc::Sender<T>,
    cancel: CancelSignal,
) {
    let mut forwarded = 0usize;
    while let Ok(Some(item)) = recv_or_cancel(&mut input, &cancel).await {
        if send_or_cancel(&out, item, &cancel).await.is_err() {
            break;
        }
        forwarded += 1;
    }
    tracing::trace!(index, forwarded, "relay finished");
}

/// Turn an iterator into a stream produced by a background task.
///
/// The producer stops once `cancel` fires or the receiver is dropped.
/// Must be called from within a tokio runtime.
pub fn generate<I>(cancel: &CancelSignal, items: I) -> mpsc::Receiver<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    generate_with_capacity(cancel, items, DEFAULT_CHANNEL_CAPACITY)
}

/// [`generate`] with an explicit buffer size.
pub fn generate_with_capacity<I>(
    cancel: &CancelSignal,
    items: I,
    capacity: usize,
) -> mpsc::Receiver<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = cancel.clone();

    tokio::spawn(async move {
        for item in items {
            if send_or_cancel(&tx, item, &cancel).await.is_err() {
                break;
            }
        }
    });

    rx
}
