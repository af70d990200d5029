// src/broadcast/mailbox.rs

//! The per-receiver queue of a Broadcast channel.
//!
//! The channel holds mailboxes weakly and delivers into them while holding its
//! own lock; the receiver owns its mailbox and is the only consumer. Lock order
//! is always channel first, then mailbox.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::task::Waker;

/// Result of a consumer's poll.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MailboxPoll<T> {
  Message(T),
  Disconnected,
  Pending,
}

/// The internal state of a single mailbox, protected by a Mutex.
#[derive(Debug)]
struct MailboxInternal<T> {
  buffer: VecDeque<T>,
  /// The single consumer waiting for a message.
  consumer_waker: Option<Waker>,
  /// Set once no further message will be delivered.
  is_disconnected: bool,
}

#[derive(Debug)]
pub(crate) struct Mailbox<T> {
  internal: Mutex<MailboxInternal<T>>,
}

impl<T> Mailbox<T> {
  pub(crate) fn new() -> Self {
    Mailbox {
      internal: Mutex::new(MailboxInternal {
        buffer: VecDeque::new(),
        consumer_waker: None,
        is_disconnected: false,
      }),
    }
  }

  // --- Producer side ---

  /// Appends a message. Returns the consumer's waker, to be woken once the
  /// caller has released the channel lock. Messages for a disconnected mailbox
  /// are dropped.
  pub(crate) fn deliver(&self, value: T) -> Option<Waker> {
    let mut guard = self.internal.lock();
    if guard.is_disconnected {
      return None;
    }
    guard.buffer.push_back(value);
    guard.consumer_waker.take()
  }

  /// Marks the mailbox as receiving nothing more. The backlog is kept for draining.
  pub(crate) fn disconnect(&self) -> Option<Waker> {
    let mut guard = self.internal.lock();
    if guard.is_disconnected {
      return None;
    }
    guard.is_disconnected = true;
    guard.consumer_waker.take()
  }

  // --- Consumer side ---

  pub(crate) fn poll_take(&self, waker: &Waker) -> MailboxPoll<T> {
    let mut guard = self.internal.lock();
    if let Some(value) = guard.buffer.pop_front() {
      guard.consumer_waker = None;
      return MailboxPoll::Message(value);
    }
    if guard.is_disconnected {
      return MailboxPoll::Disconnected;
    }
    match &guard.consumer_waker {
      Some(existing) if existing.will_wake(waker) => {}
      _ => guard.consumer_waker = Some(waker.clone()),
    }
    MailboxPoll::Pending
  }

  /// Forgets the registered waker of an abandoned wait.
  pub(crate) fn cancel(&self) {
    self.internal.lock().consumer_waker = None;
  }

  /// Disconnects the mailbox and discards its backlog. Returns how many
  /// messages were discarded.
  pub(crate) fn detach(&self) -> usize {
    let mut guard = self.internal.lock();
    guard.is_disconnected = true;
    guard.consumer_waker = None;
    let discarded = guard.buffer.len();
    guard.buffer.clear();
    discarded
  }

  /// Returns `true` once the mailbox is disconnected and drained.
  pub(crate) fn is_exhausted(&self) -> bool {
    let guard = self.internal.lock();
    guard.is_disconnected && guard.buffer.is_empty()
  }

  pub(crate) fn len(&self) -> usize {
    self.internal.lock().buffer.len()
  }
}
