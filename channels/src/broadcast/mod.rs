// src/broadcast/mod.rs

//! A fan-out Broadcast channel: every message goes to every receiver.
//!
//! Each receiver owns an unbounded mailbox. `send()` places a clone of the
//! message in every registered mailbox while holding the channel lock, so all
//! receivers observe the same total order. Sending never waits.
//!
//! Receivers only see messages sent after they were created. Closing a
//! receiver detaches its mailbox and discards its backlog without affecting the
//! channel or the other receivers.
//!
//! ```
//! use switchboard::{Broadcast, ReceiverExt};
//!
//! # async fn run() {
//! let updates = Broadcast::<u32>::new("updates");
//! let sender = updates.new_sender();
//! let mut a = updates.new_receiver();
//! let mut b = updates.new_receiver();
//!
//! sender.send(5).await.unwrap();
//! assert_eq!(a.receive().await.unwrap(), 5);
//! assert_eq!(b.receive().await.unwrap(), 5);
//! # }
//! ```

mod mailbox;

use self::mailbox::{Mailbox, MailboxPoll};
use crate::async_util::WakeList;
use crate::error::{ChannelClosed, ReceiverError, ReceiverStoppedError, SenderError};

use parking_lot::Mutex;
use std::fmt;
use std::future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

/// The channel-wide state, protected by a single `Mutex`.
struct BroadcastInternal<T> {
  closed: bool,
  mailboxes: Vec<Weak<Mailbox<T>>>,
}

struct BroadcastShared<T> {
  name: String,
  internal: Mutex<BroadcastInternal<T>>,
  receiver_seq: AtomicUsize,
}

impl<T> fmt::Display for BroadcastShared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Broadcast:{}", self.name)
  }
}

impl<T> BroadcastShared<T> {
  fn detach(&self, mailbox: &Arc<Mailbox<T>>) {
    let target = Arc::downgrade(mailbox);
    self
      .internal
      .lock()
      .mailboxes
      .retain(|weak| !weak.ptr_eq(&target));
  }
}

/// A channel delivering every message to every receiver.
pub struct Broadcast<T> {
  shared: Arc<BroadcastShared<T>>,
}

impl<T> Broadcast<T> {
  /// Creates a new open channel with no receivers.
  pub fn new(name: impl Into<String>) -> Self {
    let shared = BroadcastShared {
      name: name.into(),
      internal: Mutex::new(BroadcastInternal {
        closed: false,
        mailboxes: Vec::new(),
      }),
      receiver_seq: AtomicUsize::new(0),
    };
    tracing::debug!(channel = %shared, "created Broadcast channel");
    Broadcast {
      shared: Arc::new(shared),
    }
  }

  /// The diagnostic name of the channel.
  pub fn name(&self) -> &str {
    &self.shared.name
  }

  /// Returns `true` once [`close`](Broadcast::close) was called.
  pub fn is_closed(&self) -> bool {
    self.shared.internal.lock().closed
  }

  /// Number of receivers that will get the next message.
  pub fn receiver_count(&self) -> usize {
    self
      .shared
      .internal
      .lock()
      .mailboxes
      .iter()
      .filter(|weak| weak.strong_count() > 0)
      .count()
  }

  /// Closes the channel.
  ///
  /// Later sends fail. Every receiver still drains the messages already in its
  /// mailbox before reporting that it is stopped.
  pub fn close(&self) {
    let mut wake = WakeList::new();
    {
      let mut guard = self.shared.internal.lock();
      if guard.closed {
        return;
      }
      guard.closed = true;
      for weak in guard.mailboxes.drain(..) {
        if let Some(mailbox) = weak.upgrade() {
          wake.extend(mailbox.disconnect());
        }
      }
    }
    tracing::debug!(channel = %self.shared, woken = wake.len(), "closed Broadcast channel");
    wake.wake_all();
  }

  /// Creates a new sender for this channel.
  pub fn new_sender(&self) -> Sender<T> {
    Sender {
      shared: Arc::clone(&self.shared),
    }
  }

  /// Creates a receiver labelled `Receiver-<n>`.
  pub fn new_receiver(&self) -> Receiver<T> {
    let id = self.shared.receiver_seq.fetch_add(1, Ordering::Relaxed) + 1;
    self.new_named_receiver(format!("Receiver-{id}"))
  }

  /// Creates a receiver with a custom label, used in logs and errors.
  ///
  /// A receiver created on a closed channel is stopped from the start.
  pub fn new_named_receiver(&self, name: impl Into<String>) -> Receiver<T> {
    let mailbox = Arc::new(Mailbox::new());
    {
      let mut guard = self.shared.internal.lock();
      if guard.closed {
        mailbox.disconnect();
      } else {
        guard.mailboxes.push(Arc::downgrade(&mailbox));
      }
    }
    Receiver {
      shared: Arc::clone(&self.shared),
      mailbox,
      name: name.into(),
      next: None,
      closed: false,
    }
  }
}

impl<T> fmt::Display for Broadcast<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.shared, f)
  }
}

impl<T> fmt::Debug for Broadcast<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Broadcast")
      .field("name", &self.shared.name)
      .field("receivers", &self.receiver_count())
      .field("closed", &self.is_closed())
      .finish()
  }
}

// --- Sender ---

/// A sending handle for a Broadcast channel.
pub struct Sender<T> {
  shared: Arc<BroadcastShared<T>>,
}

impl<T: Clone> Sender<T> {
  /// Delivers a clone of `message` to every receiver registered right now.
  ///
  /// The returned future is already complete: Broadcast sends never wait.
  ///
  /// # Errors
  ///
  /// Resolves to a [`SenderError`] carrying the message if the channel is closed.
  pub fn send(&self, message: T) -> future::Ready<Result<(), SenderError<T>>> {
    future::ready(self.deliver(message))
  }

  fn deliver(&self, message: T) -> Result<(), SenderError<T>> {
    let mut wake = WakeList::new();
    {
      let mut guard = self.shared.internal.lock();
      if guard.closed {
        drop(guard);
        let source = ChannelClosed::new(&*self.shared);
        return Err(SenderError::closed(self, message, source));
      }
      let live: Vec<Arc<Mailbox<T>>> = guard.mailboxes.iter().filter_map(Weak::upgrade).collect();
      if live.len() != guard.mailboxes.len() {
        guard.mailboxes.retain(|weak| weak.strong_count() > 0);
      }
      if let Some((last, rest)) = live.split_last() {
        for mailbox in rest {
          wake.extend(mailbox.deliver(message.clone()));
        }
        wake.extend(last.deliver(message));
      }
    }
    wake.wake_all();
    Ok(())
  }
}

impl<T> Sender<T> {
  /// Returns `true` if the channel was closed and sends will fail.
  pub fn is_closed(&self) -> bool {
    self.shared.internal.lock().closed
  }
}

impl<T: Clone> crate::Sender<T> for Sender<T> {
  type Send<'a>
    = future::Ready<Result<(), SenderError<T>>>
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

/// A receiving handle for a Broadcast channel, backed by its own mailbox.
pub struct Receiver<T> {
  shared: Arc<BroadcastShared<T>>,
  mailbox: Arc<Mailbox<T>>,
  name: String,
  next: Option<T>,
  closed: bool,
}

impl<T> Receiver<T> {
  /// Number of messages waiting in this receiver's mailbox.
  pub fn len(&self) -> usize {
    self.mailbox.len() + usize::from(self.next.is_some())
  }

  /// Returns `true` if no message is waiting for this receiver.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The label of this receiver.
  pub fn name(&self) -> &str {
    &self.name
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
    match self.mailbox.poll_take(cx.waker()) {
      MailboxPoll::Message(message) => {
        self.next = Some(message);
        Poll::Ready(true)
      }
      MailboxPoll::Disconnected => Poll::Ready(false),
      MailboxPoll::Pending => Poll::Pending,
    }
  }

  fn consume(&mut self) -> Result<T, ReceiverError> {
    if let Some(message) = self.next.take() {
      return Ok(message);
    }
    if self.closed {
      return Err(ReceiverStoppedError::new(&*self).into());
    }
    if self.mailbox.is_exhausted() {
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
    self.shared.detach(&self.mailbox);
    let discarded = self.mailbox.detach();
    tracing::debug!(receiver = %self, discarded, "detached Broadcast receiver");
  }

  fn cancel_ready(&mut self) {
    self.mailbox.cancel();
  }
}

impl<T> Drop for Receiver<T> {
  fn drop(&mut self) {
    if self.next.is_some() {
      tracing::debug!(receiver = %self, "dropping receiver with a pending message");
    }
  }
}

impl<T> fmt::Display for Receiver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.shared, self.name)
  }
}

impl<T> fmt::Debug for Receiver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Receiver")
      .field("channel", &self.shared.name)
      .field("name", &self.name)
      .field("backlog", &self.mailbox.len())
      .field("closed", &self.closed)
      .finish()
  }
}
