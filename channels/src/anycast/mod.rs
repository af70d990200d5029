// src/anycast/mod.rs

//! A bounded, lock-based Anycast channel: every message goes to exactly one receiver.
//!
//! Senders and receivers are created from the channel and can be added at any
//! time. Messages are buffered up to the channel's capacity; once the buffer is
//! full, `send().await` parks until a receiver frees a slot. Parked senders and
//! parked receivers are both served oldest-first.
//!
//! ### When to use Anycast
//!
//! - Distributing jobs to a pool of workers, where each job must be handled once.
//! - Any producer/consumer pipeline that needs backpressure on the producer side.
//!
//! ```
//! use switchboard::{Anycast, ReceiverExt};
//!
//! # async fn run() {
//! let jobs = Anycast::<u32>::new("jobs", 16);
//! let sender = jobs.new_sender();
//! let mut worker = jobs.new_receiver();
//!
//! sender.send(7).await.unwrap();
//! assert_eq!(worker.receive().await.unwrap(), 7);
//! # }
//! ```

pub use async_impl::SendFuture;

mod async_impl;
mod core;

use self::core::{AnycastShared, Take};
use crate::error::{ChannelClosed, ReceiverError, ReceiverStoppedError, SenderError};
use crate::internal::WaiterKey;

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A bounded channel delivering each message to exactly one receiver.
///
/// The channel value is the owner used to create endpoints and to close the
/// channel. Endpoints share the channel state, so the owner can be dropped
/// while senders and receivers keep working.
pub struct Anycast<T> {
  shared: Arc<AnycastShared<T>>,
}

impl<T> Anycast<T> {
  /// Creates a new channel buffering at most `capacity` messages.
  ///
  /// # Panics
  ///
  /// Panics if `capacity` is zero.
  pub fn new(name: impl Into<String>, capacity: usize) -> Self {
    assert!(capacity > 0, "Anycast channel capacity must be at least 1");
    let shared = AnycastShared::new(name.into(), capacity);
    tracing::debug!(channel = %shared, capacity, "created Anycast channel");
    Anycast {
      shared: Arc::new(shared),
    }
  }

  /// The diagnostic name of the channel.
  pub fn name(&self) -> &str {
    &self.shared.name
  }

  /// Maximum number of messages the channel buffers.
  pub fn capacity(&self) -> usize {
    self.shared.capacity
  }

  /// Number of messages accepted by the channel and not yet picked up by a receiver.
  pub fn len(&self) -> usize {
    self.shared.len()
  }

  /// Returns `true` if no message is waiting for a receiver.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns `true` once [`close`](Anycast::close) was called.
  pub fn is_closed(&self) -> bool {
    self.shared.is_closed()
  }

  /// Closes the channel.
  ///
  /// Later sends fail, and so do sends currently parked on a full buffer: each
  /// gets its message back inside the [`SenderError`]. Messages already in the
  /// buffer are still delivered; receivers report that they are stopped once it
  /// is drained. Closing an already closed channel does nothing.
  pub fn close(&self) {
    if self.shared.close() {
      tracing::debug!(channel = %self.shared, "closed Anycast channel");
    }
  }

  /// Creates a new sender for this channel.
  pub fn new_sender(&self) -> Sender<T> {
    Sender {
      shared: Arc::clone(&self.shared),
    }
  }

  /// Creates a new receiver for this channel.
  ///
  /// Receivers compete for messages; each message goes to only one of them.
  pub fn new_receiver(&self) -> Receiver<T> {
    Receiver {
      id: self.shared.next_receiver_id(),
      key: WaiterKey::next(),
      shared: Arc::clone(&self.shared),
      next: None,
      closed: false,
    }
  }
}

impl<T> fmt::Display for Anycast<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.shared, f)
  }
}

impl<T> fmt::Debug for Anycast<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Anycast").field("shared", &self.shared).finish()
  }
}

// --- Sender ---

/// A sending handle for an Anycast channel.
///
/// Senders can be cloned freely. Dropping every sender does not close the
/// channel; only [`Anycast::close`] does.
pub struct Sender<T> {
  shared: Arc<AnycastShared<T>>,
}

impl<T> Sender<T> {
  /// Sends a message, waiting for buffer space if the channel is full.
  ///
  /// Resolves once the message is in the channel, not once it is consumed.
  ///
  /// # Errors
  ///
  /// Resolves to a [`SenderError`] carrying the message if the channel is
  /// closed, or closes while this send is waiting.
  pub fn send(&self, message: T) -> SendFuture<'_, T> {
    SendFuture::new(self, message)
  }

  /// Returns `true` if the channel was closed and sends will fail.
  pub fn is_closed(&self) -> bool {
    self.shared.is_closed()
  }

  fn closed_error(&self, message: T) -> SenderError<T> {
    SenderError::closed(self, message, ChannelClosed::new(&*self.shared))
  }
}

impl<T> crate::Sender<T> for Sender<T> {
  type Send<'a>
    = SendFuture<'a, T>
  where
    T: 'a;

  fn send(&self, message: T) -> Self::Send<'_> {
    Sender::send(self, message)
  }
}

impl<T> Clone for Sender<T> {
  fn clone(&self) -> Self {
    Sender {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T> fmt::Display for Sender<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:Sender", self.shared)
  }
}

impl<T> fmt::Debug for Sender<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Sender")
      .field("channel", &self.shared.name)
      .finish()
  }
}

// --- Receiver ---

/// A receiving handle for an Anycast channel.
///
/// Implements [`crate::Receiver`]; use [`ReceiverExt`](crate::ReceiverExt) for
/// `receive().await`, or turn it into a `Stream` with `into_stream()`.
pub struct Receiver<T> {
  shared: Arc<AnycastShared<T>>,
  key: WaiterKey,
  id: usize,
  next: Option<T>,
  closed: bool,
}

impl<T> Receiver<T> {
  /// Returns `true` if this receiver was closed or its channel is closed.
  pub fn is_closed(&self) -> bool {
    self.closed || self.shared.is_closed()
  }
}

impl<T> crate::Receiver for Receiver<T> {
  type Item = T;

  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
    if self.next.is_some() {
      return Poll::Ready(true);
    }
    if self.closed {
      return Poll::Ready(false);
    }
    match self.shared.poll_take(self.key, cx.waker()) {
      Take::Message(message) => {
        self.next = Some(message);
        Poll::Ready(true)
      }
      Take::Closed => Poll::Ready(false),
      Take::Pending => Poll::Pending,
    }
  }

  fn consume(&mut self) -> Result<T, ReceiverError> {
    if let Some(message) = self.next.take() {
      return Ok(message);
    }
    if self.closed {
      return Err(ReceiverStoppedError::new(&*self).into());
    }
    if self.shared.is_exhausted_for(self.key) {
      let source = ChannelClosed::new(&*self.shared);
      return Err(ReceiverStoppedError::channel_closed(&*self, source).into());
    }
    Err(ReceiverError::not_ready(&*self))
  }

  fn close(&mut self) {
    if self.closed {
      return;
    }
    self.closed = true;
    self.shared.cancel_receive(self.key);
    tracing::debug!(receiver = %self, "closed Anycast receiver");
  }

  fn cancel_ready(&mut self) {
    self.shared.cancel_receive(self.key);
  }
}

impl<T> Drop for Receiver<T> {
  fn drop(&mut self) {
    self.shared.cancel_receive(self.key);
    if self.next.is_some() {
      tracing::debug!(receiver = %self, "dropping receiver with a pending message");
    }
  }
}

impl<T> fmt::Display for Receiver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:Receiver-{}", self.shared, self.id)
  }
}

impl<T> fmt::Debug for Receiver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Receiver")
      .field("channel", &self.shared.name)
      .field("id", &self.id)
      .field("pending", &self.next.is_some())
      .field("closed", &self.closed)
      .finish()
  }
}
