//! Zero-capacity hand-off channels.
//!
//! `send` completes only after a receiver has taken the value, so a fast
//! producer stalls behind a slow consumer instead of buffering.
//!
//! Closing is tied to ownership: the [`Sender`] is the one handle allowed to
//! close, it is not `Clone`, and [`Sender::close`] consumes it. Extra
//! producers get a [`Producer`], which can send but never close.
//!
//! When the last [`Receiver`] goes away the channel closes and anything in
//! transit is discarded, so blocked senders fail instead of waiting forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::oneshot;

use crate::error::{Error, Result};

type Envelope<T> = (T, oneshot::Sender<()>);

/// Create a hand-off channel.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    // One slot for the envelope in transit; the ack makes it a rendezvous.
    let (tx, rx) = async_channel::bounded(1);
    (
        Sender {
            inner: Producer { tx },
        },
        Receiver {
            rx,
            live: Arc::new(AtomicUsize::new(1)),
        },
    )
}

/// The owning end of a channel. Exactly one exists per channel.
#[derive(Debug)]
pub struct Sender<T> {
    inner: Producer<T>,
}

impl<T> Sender<T> {
    /// Hand a value to a receiver, waiting until one has taken it.
    pub async fn send(&self, value: T) -> Result<()> {
        self.inner.send(value).await
    }

    /// A send-only handle for additional producers.
    pub fn producer(&self) -> Producer<T> {
        self.inner.clone()
    }

    /// Close the channel. Receivers drain whatever is in transit, then see
    /// the end of the stream.
    pub fn close(self) -> Result<()> {
        if self.inner.tx.close() {
            Ok(())
        } else {
            Err(Error::Protocol("channel was already closed".to_string()))
        }
    }
}

/// Send-only handle. Cannot close the channel.
#[derive(Debug)]
pub struct Producer<T> {
    tx: async_channel::Sender<Envelope<T>>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Producer<T> {
    /// Hand a value to a receiver, waiting until one has taken it.
    pub async fn send(&self, value: T) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((value, ack_tx))
            .await
            .map_err(|_| Error::Protocol("send on closed channel".to_string()))?;
        ack_rx
            .await
            .map_err(|_| Error::Protocol("hand-off abandoned by every receiver".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end. Clone it to share one channel between several consumers;
/// each value goes to exactly one of them.
#[derive(Debug)]
pub struct Receiver<T> {
    rx: async_channel::Receiver<Envelope<T>>,
    /// Receivers still alive on this channel.
    live: Arc<AtomicUsize>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.live.fetch_add(1, Ordering::AcqRel);
        Self {
            rx: self.rx.clone(),
            live: Arc::clone(&self.live),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        if self.live.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        // Last receiver: refuse new sends, then drop queued envelopes so
        // their acks fail and waiting senders return an error.
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl<T> Receiver<T> {
    /// Take the next value. `None` once the channel is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        let (value, ack) = self.rx.recv().await.ok()?;
        // The sender may have stopped waiting; the value is ours either way.
        let _ = ack.send(());
        Some(value)
    }
}
