//! Notification publishing/subscription abstraction (mechanics only).
//!
//! The ledger publishes one envelope per committed operation. Delivery is
//! best-effort: a failed publish is logged by the publisher and never undoes the
//! operation that produced it.
//!
//! - **Transport-agnostic**: in-memory channels, a broker, a webhook relay...
//! - **No persistence**: the bus distributes, it does not store.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

/// A subscription to a notification stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics).
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_secs(1)) {
///         Ok(envelope) => handle(envelope),
///         Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
///         Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
///     }
/// }
/// ```
///
/// Subscriptions are meant for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Notification sink (pub/sub abstraction).
///
/// `publish()` may fail (bus full, broker down). Callers treat that as a
/// delivery problem, not a ledger problem.
///
/// Implementations must be `Send + Sync`: the ledger publishes from whichever
/// thread committed the operation.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
