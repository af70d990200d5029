// src/event.rs

//! A receiver that is made ready directly rather than by a channel.
//!
//! An [`Event`] is typically added to a [`Selector`](crate::Selector) next to
//! data receivers, so another task can interrupt the loop:
//!
//! ```
//! use switchboard::{Event, ReceiverExt};
//!
//! # async fn run() {
//! let mut stop = Event::new("stop");
//! let handle = stop.handle();
//!
//! tokio::spawn(async move { handle.set() });
//! assert!(stop.ready().await);
//! # }
//! ```

use crate::async_util::AtomicWaker;
use crate::error::{ReceiverError, ReceiverStoppedError};
use crate::receiver::Receiver;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

#[derive(Debug, Default)]
struct EventState {
  is_set: AtomicBool,
  is_stopped: AtomicBool,
  waker: AtomicWaker,
}

impl EventState {
  fn check(&self) -> Option<bool> {
    if self.is_set.load(Ordering::Acquire) {
      Some(true)
    } else if self.is_stopped.load(Ordering::Acquire) {
      Some(false)
    } else {
      None
    }
  }
}

/// A receiver of `()` that becomes ready when set and stops when stopped.
///
/// After a set is consumed the event blocks again until the next `set()`.
/// Several `set()` calls before a `consume()` count as one.
pub struct Event {
  name: String,
  state: Arc<EventState>,
}

/// A cloneable handle for setting or stopping an [`Event`] from other tasks.
#[derive(Clone)]
pub struct EventHandle {
  state: Arc<EventState>,
}

impl Event {
  pub fn new(name: impl Into<String>) -> Self {
    Event {
      name: name.into(),
      state: Arc::new(EventState::default()),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn handle(&self) -> EventHandle {
    EventHandle {
      state: Arc::clone(&self.state),
    }
  }

  pub fn is_set(&self) -> bool {
    self.state.is_set.load(Ordering::Acquire)
  }

  pub fn is_stopped(&self) -> bool {
    self.state.is_stopped.load(Ordering::Acquire)
  }

  /// Makes the event ready.
  pub fn set(&self) {
    self.handle().set()
  }

  /// Stops the event. A pending set is still delivered first.
  pub fn stop(&self) {
    self.handle().stop()
  }
}

impl EventHandle {
  /// Makes the event ready.
  pub fn set(&self) {
    self.state.is_set.store(true, Ordering::Release);
    self.state.waker.wake();
  }

  /// Stops the event. A pending set is still delivered first.
  pub fn stop(&self) {
    self.state.is_stopped.store(true, Ordering::Release);
    self.state.waker.wake();
  }

  pub fn is_stopped(&self) -> bool {
    self.state.is_stopped.load(Ordering::Acquire)
  }
}

impl Receiver for Event {
  type Item = ();

  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
    if let Some(active) = self.state.check() {
      return Poll::Ready(active);
    }
    self.state.waker.register(cx.waker());
    // Re-check after registering to avoid missing a set() racing with us.
    match self.state.check() {
      Some(active) => Poll::Ready(active),
      None => Poll::Pending,
    }
  }

  fn consume(&mut self) -> Result<(), ReceiverError> {
    if self.state.is_set.swap(false, Ordering::AcqRel) {
      return Ok(());
    }
    if self.is_stopped() {
      return Err(ReceiverStoppedError::new(&*self).into());
    }
    Err(ReceiverError::not_ready(&*self))
  }

  fn close(&mut self) {
    self.stop();
  }
}

impl fmt::Display for Event {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Event:{}", self.name)
  }
}

impl fmt::Debug for Event {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Event")
      .field("name", &self.name)
      .field("is_set", &self.is_set())
      .field("is_stopped", &self.is_stopped())
      .finish()
  }
}

impl fmt::Debug for EventHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventHandle")
      .field("is_stopped", &self.is_stopped())
      .finish()
  }
}
