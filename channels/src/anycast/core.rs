// src/anycast/core.rs

//! The shared state and transition logic of the Anycast channel.
//!
//! ### Design Principles:
//!
//! 1.  **Central Mutex**: A `parking_lot::Mutex` guards the buffer and both waiter
//!     queues as one unit, so occupancy and wake order are decided atomically.
//! 2.  **Direct Hand-off**: When a message arrives while receivers are parked, it
//!     is moved out of the buffer into a slot reserved for the longest-waiting
//!     receiver. Only that receiver can pick it up, so a receiver that was not
//!     waiting cannot barge ahead. Handed-off messages still count against the
//!     capacity until they are picked up.
//! 3.  **Parked Senders Own Their Message**: A sender that finds the buffer full
//!     leaves its message in its waiter record. As space frees up, the channel
//!     admits parked messages into the buffer in FIFO order and reports the
//!     outcome back to the sender.
//! 4.  **Wake Outside the Lock**: transitions collect wakers while locked and
//!     wake them after the guard is released.

use crate::async_util::WakeList;
use crate::internal::{WaiterKey, WaiterQueue};

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Poll, Waker};

/// What happened to a parked sender's message.
enum SendOutcome<T> {
  Sent,
  Rejected(T),
}

/// Result of a send attempt that may park.
pub(crate) enum StartSend<T> {
  Sent,
  Parked,
  Closed(T),
}

/// Result of a receiver's readiness poll.
pub(crate) enum Take<T> {
  Message(T),
  Closed,
  Pending,
}

/// The core state of the Anycast channel, protected by a single `Mutex`.
struct AnycastInternal<T> {
  /// Accepted messages not yet assigned to a receiver.
  buffer: VecDeque<T>,
  /// Messages assigned to a specific parked receiver.
  handoff: HashMap<WaiterKey, T>,
  /// Parked senders, each holding the message it is trying to send.
  waiting_senders: WaiterQueue<T>,
  /// Parked receivers.
  waiting_receivers: WaiterQueue<()>,
  /// Outcomes for senders that were unparked but have not been polled yet.
  send_outcomes: HashMap<WaiterKey, SendOutcome<T>>,
  closed: bool,
}

impl<T> AnycastInternal<T> {
  fn occupancy(&self) -> usize {
    self.buffer.len() + self.handoff.len()
  }

  /// Assigns buffered messages to parked receivers, oldest waiter first.
  fn dispatch(&mut self, wake: &mut WakeList) {
    while !self.buffer.is_empty() {
      let Some(waiter) = self.waiting_receivers.pop_front() else {
        break;
      };
      if let Some(message) = self.buffer.pop_front() {
        self.handoff.insert(waiter.key, message);
      }
      wake.push(waiter.waker);
    }
  }

  /// Moves parked senders' messages into freed capacity, oldest sender first.
  fn admit_senders(&mut self, capacity: usize, wake: &mut WakeList) {
    while self.occupancy() < capacity {
      let Some(waiter) = self.waiting_senders.pop_front() else {
        break;
      };
      self.buffer.push_back(waiter.data);
      self.send_outcomes.insert(waiter.key, SendOutcome::Sent);
      wake.push(waiter.waker);
    }
    self.dispatch(wake);
  }
}

/// The shared owner of the channel's state, designed to be wrapped in an `Arc`.
pub(crate) struct AnycastShared<T> {
  pub(crate) name: String,
  pub(crate) capacity: usize,
  internal: Mutex<AnycastInternal<T>>,
  receiver_seq: AtomicUsize,
}

impl<T> fmt::Debug for AnycastShared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let guard = self.internal.lock();
    f.debug_struct("AnycastShared")
      .field("name", &self.name)
      .field("capacity", &self.capacity)
      .field("buffered", &guard.buffer.len())
      .field("handed_off", &guard.handoff.len())
      .field("waiting_senders", &guard.waiting_senders.len())
      .field("waiting_receivers", &guard.waiting_receivers.len())
      .field("closed", &guard.closed)
      .finish()
  }
}

impl<T> fmt::Display for AnycastShared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Anycast:{}", self.name)
  }
}

impl<T> AnycastShared<T> {
  pub(crate) fn new(name: String, capacity: usize) -> Self {
    AnycastShared {
      name,
      capacity,
      internal: Mutex::new(AnycastInternal {
        buffer: VecDeque::with_capacity(capacity),
        handoff: HashMap::new(),
        waiting_senders: WaiterQueue::new(),
        waiting_receivers: WaiterQueue::new(),
        send_outcomes: HashMap::new(),
        closed: false,
      }),
      receiver_seq: AtomicUsize::new(0),
    }
  }

  pub(crate) fn next_receiver_id(&self) -> usize {
    self.receiver_seq.fetch_add(1, Ordering::Relaxed) + 1
  }

  /// Number of accepted messages not yet picked up by a receiver.
  pub(crate) fn len(&self) -> usize {
    self.internal.lock().occupancy()
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.internal.lock().closed
  }

  /// Accepts `item` if there is room and no earlier sender is parked;
  /// otherwise parks it under `key`.
  pub(crate) fn start_send(&self, key: WaiterKey, waker: &Waker, item: T) -> StartSend<T> {
    let mut wake = WakeList::new();
    let outcome = {
      let mut guard = self.internal.lock();
      if guard.closed {
        StartSend::Closed(item)
      } else if guard.waiting_senders.is_empty() && guard.occupancy() < self.capacity {
        guard.buffer.push_back(item);
        guard.dispatch(&mut wake);
        StartSend::Sent
      } else {
        guard.waiting_senders.push_back(key, waker, item);
        StartSend::Parked
      }
    };
    wake.wake_all();
    outcome
  }

  /// Checks on a parked send. `Err` returns the message of a send failed by `close()`.
  pub(crate) fn poll_parked_send(&self, key: WaiterKey, waker: &Waker) -> Poll<Result<(), T>> {
    let mut guard = self.internal.lock();
    match guard.send_outcomes.remove(&key) {
      Some(SendOutcome::Sent) => Poll::Ready(Ok(())),
      Some(SendOutcome::Rejected(item)) => Poll::Ready(Err(item)),
      None => {
        let still_parked = guard.waiting_senders.refresh(key, waker);
        debug_assert!(still_parked, "parked sender lost its waiter record");
        Poll::Pending
      }
    }
  }

  /// Withdraws a parked send. Its message, if still parked, is dropped.
  pub(crate) fn cancel_send(&self, key: WaiterKey) {
    let mut guard = self.internal.lock();
    guard.waiting_senders.remove(key);
    guard.send_outcomes.remove(&key);
  }

  /// Readiness poll for the receiver identified by `key`.
  pub(crate) fn poll_take(&self, key: WaiterKey, waker: &Waker) -> Take<T> {
    let mut wake = WakeList::new();
    let take = {
      let mut guard = self.internal.lock();
      if let Some(message) = guard.handoff.remove(&key) {
        guard.admit_senders(self.capacity, &mut wake);
        Take::Message(message)
      } else if guard.waiting_receivers.refresh(key, waker) {
        Take::Pending
      } else if let Some(message) = guard.buffer.pop_front() {
        guard.admit_senders(self.capacity, &mut wake);
        Take::Message(message)
      } else if guard.closed {
        Take::Closed
      } else {
        guard.waiting_receivers.push_back(key, waker, ());
        Take::Pending
      }
    };
    wake.wake_all();
    take
  }

  /// Withdraws a parked receiver. A message already handed to it goes back to
  /// the front of the buffer and on to the next waiter.
  pub(crate) fn cancel_receive(&self, key: WaiterKey) {
    let mut wake = WakeList::new();
    {
      let mut guard = self.internal.lock();
      guard.waiting_receivers.remove(key);
      if let Some(message) = guard.handoff.remove(&key) {
        guard.buffer.push_front(message);
        guard.dispatch(&mut wake);
      }
    }
    wake.wake_all();
  }

  /// Returns `true` once nothing is left for the receiver `key` and the channel is closed.
  pub(crate) fn is_exhausted_for(&self, key: WaiterKey) -> bool {
    let guard = self.internal.lock();
    guard.closed && guard.buffer.is_empty() && !guard.handoff.contains_key(&key)
  }

  /// Marks the channel closed, failing parked senders and waking parked receivers.
  ///
  /// Returns `false` if the channel was already closed.
  pub(crate) fn close(&self) -> bool {
    let mut wake = WakeList::new();
    {
      let mut guard = self.internal.lock();
      if guard.closed {
        return false;
      }
      guard.closed = true;
      let internal = &mut *guard;
      for waiter in internal.waiting_senders.drain() {
        internal
          .send_outcomes
          .insert(waiter.key, SendOutcome::Rejected(waiter.data));
        wake.push(waiter.waker);
      }
      wake.extend(internal.waiting_receivers.drain().map(|w| w.waker));
    }
    wake.wake_all();
    true
  }
}
