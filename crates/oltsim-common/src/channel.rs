//! Bounded inbound queue of a simulated device.
//!
//! A [`DeviceChannel`] owns both ends of a bounded `tokio::sync::mpsc`
//! channel. Producers call [`DeviceChannel::send`]; the device's dispatch
//! task takes the receiving end with [`DeviceChannel::take_receiver`] and
//! hands it back with [`DeviceChannel::restore_receiver`] when its session is
//! cancelled, so a reconnecting session resumes on the same queue.
//!
//! Closing is separate from cancellation. [`DeviceChannel::close`] drops the
//! sending end: the dispatch task drains what is buffered and then observes
//! the end of the stream. [`DeviceChannel::reopen`] installs a fresh pair.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// What a producer does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Wait until the dispatch task makes room.
    #[default]
    Block,
    /// Fail immediately with [`ChannelError::Full`].
    Reject,
}

impl fmt::Display for Backpressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backpressure::Block => write!(f, "block"),
            Backpressure::Reject => write!(f, "reject"),
        }
    }
}

/// Configuration for a device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Maximum number of queued messages.
    pub queue_depth: usize,
    pub backpressure: Backpressure,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            queue_depth: 1024,
            backpressure: Backpressure::Block,
        }
    }
}

impl ChannelConfig {
    /// Sets the queue depth. A depth of zero is raised to one.
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth.max(1);
        self
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }
}

/// Error type for channel operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel {0} is closed")]
    Closed(String),

    #[error("channel {name} is full ({depth} messages queued)")]
    Full { name: String, depth: usize },
}

/// Receiving end of a [`DeviceChannel`], tagged with the generation it
/// belongs to.
#[derive(Debug)]
pub struct ChannelReceiver<T> {
    inner: mpsc::Receiver<T>,
    generation: u64,
}

impl<T> ChannelReceiver<T> {
    /// Receives the next message. Returns `None` once the channel is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.inner.recv().await
    }
}

/// A queue slot held by a producer, see [`DeviceChannel::reserve`].
pub struct SendPermit<T>(mpsc::OwnedPermit<T>);

impl<T> SendPermit<T> {
    /// Enqueues `msg` in the reserved slot. Cannot fail.
    pub fn send(self, msg: T) {
        self.0.send(msg);
    }
}

impl<T> fmt::Debug for SendPermit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendPermit").finish_non_exhaustive()
    }
}

struct Ends<T> {
    sender: Option<mpsc::Sender<T>>,
    receiver: Option<mpsc::Receiver<T>>,
    generation: u64,
}

/// Bounded, re-openable inbound queue of a device.
pub struct DeviceChannel<T> {
    name: String,
    config: ChannelConfig,
    ends: Mutex<Ends<T>>,
}

impl<T: Send> DeviceChannel<T> {
    /// Creates an open channel.
    pub fn new(name: impl Into<String>, config: ChannelConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        Self {
            name: name.into(),
            config,
            ends: Mutex::new(Ends {
                sender: Some(tx),
                receiver: Some(rx),
                generation: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn sender(&self) -> Result<mpsc::Sender<T>, ChannelError> {
        self.ends
            .lock()
            .sender
            .clone()
            .ok_or_else(|| ChannelError::Closed(self.name.clone()))
    }

    fn full(&self) -> ChannelError {
        ChannelError::Full {
            name: self.name.clone(),
            depth: self.config.queue_depth,
        }
    }

    /// Enqueues a message according to the configured back-pressure policy.
    pub async fn send(&self, msg: T) -> Result<(), ChannelError> {
        let tx = self.sender()?;

        match self.config.backpressure {
            Backpressure::Block => tx
                .send(msg)
                .await
                .map_err(|_| ChannelError::Closed(self.name.clone())),
            Backpressure::Reject => tx.try_send(msg).map_err(|e| match e {
                TrySendError::Full(_) => self.full(),
                TrySendError::Closed(_) => ChannelError::Closed(self.name.clone()),
            }),
        }
    }

    /// Reserves a queue slot under the configured back-pressure policy.
    ///
    /// The slot is released if the permit is dropped unused.
    pub async fn reserve(&self) -> Result<SendPermit<T>, ChannelError> {
        let tx = self.sender()?;

        let permit = match self.config.backpressure {
            Backpressure::Block => tx
                .reserve_owned()
                .await
                .map_err(|_| ChannelError::Closed(self.name.clone()))?,
            Backpressure::Reject => tx.try_reserve_owned().map_err(|e| match e {
                TrySendError::Full(_) => self.full(),
                TrySendError::Closed(_) => ChannelError::Closed(self.name.clone()),
            })?,
        };
        Ok(SendPermit(permit))
    }

    /// Takes the receiving end. Returns `None` if a dispatch task already
    /// holds it or the channel is closed.
    pub fn take_receiver(&self) -> Option<ChannelReceiver<T>> {
        let mut ends = self.ends.lock();
        let generation = ends.generation;
        ends.receiver.take().map(|inner| ChannelReceiver { inner, generation })
    }

    /// Hands a receiving end back.
    ///
    /// Receivers of an older generation (the channel was closed or reopened
    /// in the meantime) are dropped.
    pub fn restore_receiver(&self, receiver: ChannelReceiver<T>) {
        let mut ends = self.ends.lock();
        if receiver.generation == ends.generation && ends.sender.is_some() {
            ends.receiver = Some(receiver.inner);
        } else {
            debug!(channel = %self.name, "dropping stale receiver");
        }
    }

    /// Closes the channel. Returns false if it was already closed.
    ///
    /// A receiver held by a dispatch task still yields the buffered
    /// messages before reporting the end of the stream. A parked receiver
    /// is dropped together with its buffered messages.
    pub fn close(&self) -> bool {
        let mut ends = self.ends.lock();
        ends.receiver = None;
        let was_open = ends.sender.take().is_some();
        if was_open {
            ends.generation += 1;
        }
        was_open
    }

    /// Installs a fresh sender/receiver pair if the channel is closed.
    pub fn reopen(&self) {
        let mut ends = self.ends.lock();
        if ends.sender.is_none() {
            let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
            ends.sender = Some(tx);
            ends.receiver = Some(rx);
            ends.generation += 1;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ends.lock().sender.is_none()
    }
}

impl<T> fmt::Debug for DeviceChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceChannel")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
