//! Utilities for asynchronous operations and wakers.

use std::task::Waker;

// Re-export AtomicWaker from futures-util for internal crate use.
pub(crate) use futures_util::task::AtomicWaker;

/// Wakers collected while a channel lock is held.
///
/// Nothing is woken until [`WakeList::wake_all`] runs, which callers do after
/// releasing the guard so a woken task never contends on the lock it was
/// parked behind.
#[derive(Debug, Default)]
pub(crate) struct WakeList(Vec<Waker>);

impl WakeList {
  pub(crate) fn new() -> Self {
    WakeList(Vec::new())
  }

  pub(crate) fn push(&mut self, waker: Waker) {
    self.0.push(waker);
  }

  pub(crate) fn len(&self) -> usize {
    self.0.len()
  }

  pub(crate) fn wake_all(self) {
    for waker in self.0 {
      waker.wake();
    }
  }
}

impl Extend<Waker> for WakeList {
  fn extend<I: IntoIterator<Item = Waker>>(&mut self, iter: I) {
    self.0.extend(iter);
  }
}
