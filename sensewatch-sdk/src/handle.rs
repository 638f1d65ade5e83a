//! Channel-backed delivery targets.

use std::sync::Arc;

use sensewatch_types::{Delivery, EventNotice};
use tokio::sync::mpsc;

use crate::channel::{Callback, ChannelClosed, Notifier, NotifyHandle, PushChannel};

/// A push channel that forwards deliveries into a tokio channel.
///
/// Dropping the receiver makes every later `send` fail with
/// [`ChannelClosed`], which the middleware treats as the client going away.
///
/// # Example
///
/// ```rust
/// use sensewatch_sdk::ChannelCallback;
///
/// let (callback, rx) = ChannelCallback::pair();
/// drop(rx); // the client disconnects
/// ```
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelCallback {
    pub fn new(tx: mpsc::UnboundedSender<Delivery>) -> Self {
        Self { tx }
    }

    /// Create a callback and the receiver it feeds.
    pub fn pair() -> (Callback, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(tx)), rx)
    }
}

impl PushChannel for ChannelCallback {
    fn send(&self, delivery: &Delivery) -> Result<(), ChannelClosed> {
        self.tx.send(*delivery).map_err(|_| ChannelClosed)
    }
}

/// A notifier that forwards event notices into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<EventNotice>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<EventNotice>) -> Self {
        Self { tx }
    }

    /// Create a notifier and the receiver it feeds.
    pub fn pair() -> (NotifyHandle, mpsc::UnboundedReceiver<EventNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(tx)), rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: &EventNotice) -> Result<(), ChannelClosed> {
        self.tx.send(*notice).map_err(|_| ChannelClosed)
    }
}
