//! Channel-backed stream returned by both engines.

use std::pin::Pin;
use std::task::{Context, Poll};

use bsm_core::{AcquireError, AcquireResult};
use futures_core::Stream;
use tokio::sync::mpsc;

/// Items per stream buffered before the producing task waits.
pub(crate) const STREAM_BUFFER: usize = 64;

/// How a drained stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The download completed.
    Succeeded,
    /// The stream yielded an `Err` as its last item.
    Failed,
    /// The download was stopped; no success and no error.
    Cancelled,
}

pub(crate) enum StreamItem<T> {
    Item(T),
    Failed(AcquireError),
    Succeeded,
}

/// Progress stream of one download.
///
/// Yields `Ok` items until the download ends. A failure is yielded once as
/// `Err` and ends the stream. Success and cancellation both end the stream
/// silently; [`DownloadStream::end`] tells them apart.
pub struct DownloadStream<T> {
    rx: mpsc::Receiver<StreamItem<T>>,
    end: Option<StreamEnd>,
}

impl<T> DownloadStream<T> {
    pub(crate) fn channel() -> (StreamSink<T>, Self) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        (StreamSink { tx }, Self { rx, end: None })
    }

    /// Next item, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<AcquireResult<T>> {
        if self.end.is_some() {
            return None;
        }
        let item = self.rx.recv().await;
        self.settle(item)
    }

    /// How the stream ended; `None` while it is still open.
    pub const fn end(&self) -> Option<StreamEnd> {
        self.end
    }

    fn settle(&mut self, item: Option<StreamItem<T>>) -> Option<AcquireResult<T>> {
        match item {
            Some(StreamItem::Item(value)) => Some(Ok(value)),
            Some(StreamItem::Failed(err)) => {
                self.end = Some(StreamEnd::Failed);
                Some(Err(err))
            }
            Some(StreamItem::Succeeded) => {
                self.end = Some(StreamEnd::Succeeded);
                None
            }
            None => {
                self.end = Some(StreamEnd::Cancelled);
                None
            }
        }
    }
}

impl<T> Stream for DownloadStream<T> {
    type Item = AcquireResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.end.is_some() {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(item) => Poll::Ready(this.settle(item)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Producer half held by the engine task.
pub(crate) struct StreamSink<T> {
    tx: mpsc::Sender<StreamItem<T>>,
}

impl<T> StreamSink<T> {
    /// Emit an item. Returns `false` once the consumer has gone away.
    pub(crate) async fn emit(&self, value: T) -> bool {
        self.tx.send(StreamItem::Item(value)).await.is_ok()
    }

    /// End the stream with an error.
    pub(crate) async fn fail(self, err: AcquireError) {
        let _ = self.tx.send(StreamItem::Failed(err)).await;
    }

    /// End the stream successfully.
    pub(crate) async fn succeed(self) {
        let _ = self.tx.send(StreamItem::Succeeded).await;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
