//! Bounded hand-off queues with an explicit closing contract.
//!
//! A queue has any number of sender handles and one receiver. Closing is an
//! explicit act of the producer: [`QueueSender::close`] ends the stream for
//! the receiver, a second close fails with [`QueueError::AlreadyClosed`], and
//! sends after close fail with [`QueueError::Closed`]. Dropping every sender
//! handle also ends the stream.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::QueueError;

/// Default queue capacity. One slot is the closest bounded equivalent of an
/// unbuffered hand-off.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

/// Creates a bounded queue. A capacity of zero is raised to one.
#[must_use]
pub fn queue<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = QueueSender {
        inner: Arc::new(SenderInner {
            tx: Mutex::new(Some(tx)),
        }),
    };
    (sender, QueueReceiver { rx })
}

/// Sends every item into the queue, then closes it.
///
/// Returns the number of items sent.
pub async fn seed<T, I>(sender: QueueSender<T>, items: I) -> Result<usize, QueueError>
where
    I: IntoIterator<Item = T>,
{
    let mut sent = 0;
    for item in items {
        sender.send(item).await?;
        sent += 1;
    }
    sender.close()?;
    debug!(sent, "seeded queue and closed it");
    Ok(sent)
}

struct SenderInner<T> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
}

/// The producing side of a queue. Cloning shares the same close state.
pub struct QueueSender<T> {
    inner: Arc<SenderInner<T>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> QueueSender<T> {
    /// Sends an item, suspending while the queue is full.
    pub async fn send(&self, item: T) -> Result<(), QueueError> {
        let tx = self.inner.tx.lock().clone().ok_or(QueueError::Closed)?;
        tx.send(item).await.map_err(|_| QueueError::Disconnected)
    }

    /// Closes the queue. The receiver observes the end of the stream once
    /// buffered items and in-progress sends are consumed.
    pub fn close(&self) -> Result<(), QueueError> {
        self.close_deferred().map(drop)
    }

    /// Closes the queue for senders immediately, but holds back the end of
    /// the stream from the receiver until the returned guard is dropped.
    pub(crate) fn close_deferred(&self) -> Result<CloseGuard<T>, QueueError> {
        self.inner
            .tx
            .lock()
            .take()
            .map(|tx| CloseGuard { _tx: tx })
            .ok_or(QueueError::AlreadyClosed)
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.tx.lock().is_none()
    }

    /// Returns true if both handles refer to the same queue.
    #[must_use]
    pub fn same_queue(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> fmt::Debug for QueueSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Keeps a closed queue's stream open until dropped.
pub(crate) struct CloseGuard<T> {
    _tx: mpsc::Sender<T>,
}

/// The consuming side of a queue.
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Receives the next item. Returns `None` once the queue is closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Number of items currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if no items are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> fmt::Debug for QueueReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueReceiver")
            .field("buffered", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_send_and_receive() {
        let (tx, mut rx) = queue(4);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_closed_empty_queue_yields_none() {
        let (tx, mut rx) = queue::<u32>(1);
        tx.close().unwrap();
        assert_eq!(rx.recv().await, None);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_buffered_items_survive_close() {
        let (tx, mut rx) = queue(2);
        tx.send("a").await.unwrap();
        tx.close().unwrap();
        assert_eq!(rx.recv().await, Some("a"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_double_close_fails_fast() {
        let (tx, _rx) = queue::<u32>(1);
        let clone = tx.clone();
        assert!(tx.close().is_ok());
        assert_eq!(clone.close(), Err(QueueError::AlreadyClosed));
        assert!(clone.is_closed());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (tx, _rx) = queue(1);
        tx.close().unwrap();
        assert_eq!(tx.send(7).await, Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver() {
        let (tx, rx) = queue(1);
        drop(rx);
        assert_eq!(tx.send(7).await, Err(QueueError::Disconnected));
    }

    #[tokio::test]
    async fn test_dropping_all_senders_ends_stream() {
        let (tx, mut rx) = queue::<u32>(1);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (tx, mut rx) = queue(1);
        tx.send(1).await.unwrap();

        let mut blocked = tokio_test::task::spawn(tx.send(2));
        assert_pending!(blocked.poll());

        assert_eq!(rx.recv().await, Some(1));
        assert!(blocked.is_woken());
        assert_ready!(blocked.poll()).unwrap();
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_seed_sends_then_closes() {
        let (tx, mut rx) = queue(1);
        let producer = tokio::spawn(seed(tx.clone(), vec![1, 2, 3]));

        let mut received = Vec::new();
        while let Some(item) = rx.recv().await {
            received.push(item);
        }

        assert_eq!(producer.await.unwrap(), Ok(3));
        assert_eq!(received, vec![1, 2, 3]);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_deferred_close() {
        let (tx, mut rx) = queue::<u32>(1);
        let guard = tx.close_deferred().unwrap();
        assert!(tx.is_closed());
        assert_eq!(tx.send(1).await, Err(QueueError::Closed));

        let mut next = tokio_test::task::spawn(rx.recv());
        assert_pending!(next.poll());
        drop(guard);
        assert_eq!(assert_ready!(next.poll()), None);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let (tx, _rx) = queue::<u8>(0);
        assert!(!tx.is_closed());
        assert!(tx.same_queue(&tx.clone()));
    }
}
