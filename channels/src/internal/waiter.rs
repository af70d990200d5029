use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::Waker;

static NEXT_WAITER_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of a parked task inside a channel's waiter queue.
///
/// Receivers allocate one key for their whole lifetime; send futures allocate
/// one when they first park.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WaiterKey(u64);

impl WaiterKey {
  pub(crate) fn next() -> Self {
    WaiterKey(NEXT_WAITER_KEY.fetch_add(1, Ordering::Relaxed))
  }
}

/// A parked task: its waker plus whatever it left with the channel
/// (a sender's message, for example).
pub(crate) struct Waiter<D> {
  pub(crate) key: WaiterKey,
  pub(crate) waker: Waker,
  pub(crate) data: D,
}

impl<D> fmt::Debug for Waiter<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Waiter").field("key", &self.key).finish()
  }
}

/// FIFO of parked tasks. Earliest-parked is woken first.
///
/// The queue does no synchronization of its own; it lives inside the channel's
/// mutex together with the buffer it guards. Entries are keyed so a cancelled
/// future can withdraw its record and never receive a phantom wake-up.
pub(crate) struct WaiterQueue<D = ()> {
  entries: VecDeque<Waiter<D>>,
}

impl<D> fmt::Debug for WaiterQueue<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WaiterQueue")
      .field("len", &self.entries.len())
      .finish()
  }
}

impl<D> Default for WaiterQueue<D> {
  fn default() -> Self {
    Self::new()
  }
}

impl<D> WaiterQueue<D> {
  pub(crate) fn new() -> Self {
    Self {
      entries: VecDeque::new(),
    }
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.len()
  }

  pub(crate) fn contains(&self, key: WaiterKey) -> bool {
    self.entries.iter().any(|w| w.key == key)
  }

  /// Parks a task at the back of the queue.
  pub(crate) fn push_back(&mut self, key: WaiterKey, waker: &Waker, data: D) {
    debug_assert!(
      !self.contains(key),
      "attempted to park a waiter that is already queued"
    );
    self.entries.push_back(Waiter {
      key,
      waker: waker.clone(),
      data,
    });
  }

  /// Refreshes the waker of an already parked task without moving it.
  ///
  /// Returns `false` if the key is not queued.
  pub(crate) fn refresh(&mut self, key: WaiterKey, waker: &Waker) -> bool {
    match self.entries.iter_mut().find(|w| w.key == key) {
      Some(waiter) => {
        if !waiter.waker.will_wake(waker) {
          waiter.waker = waker.clone();
        }
        true
      }
      None => false,
    }
  }

  pub(crate) fn pop_front(&mut self) -> Option<Waiter<D>> {
    self.entries.pop_front()
  }

  /// Withdraws a specific waiter. Removing an absent key is a no-op.
  pub(crate) fn remove(&mut self, key: WaiterKey) -> Option<Waiter<D>> {
    let pos = self.entries.iter().position(|w| w.key == key)?;
    self.entries.remove(pos)
  }

  /// Empties the queue, oldest first.
  pub(crate) fn drain(&mut self) -> impl Iterator<Item = Waiter<D>> + '_ {
    self.entries.drain(..)
  }
}
