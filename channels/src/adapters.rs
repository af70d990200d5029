// src/adapters.rs

//! Receiver decorators created by [`ReceiverExt::map`](crate::ReceiverExt::map)
//! and [`ReceiverExt::filter`](crate::ReceiverExt::filter).

use crate::error::{ReceiverError, ReceiverStoppedError};
use crate::receiver::Receiver;

use std::fmt;
use std::task::{Context, Poll};

/// Messages a [`Filter`] may discard in one poll before yielding to the executor.
const FILTER_DISCARD_BUDGET: usize = 32;

// --- Map ---

/// A receiver that applies a function to every message of another receiver.
pub struct Map<R, F> {
  inner: R,
  f: F,
}

impl<R, F> Map<R, F> {
  pub(crate) fn new(inner: R, f: F) -> Self {
    Map { inner, f }
  }

  /// Returns the wrapped receiver.
  pub fn into_inner(self) -> R {
    self.inner
  }
}

impl<R, F, U> Receiver for Map<R, F>
where
  R: Receiver,
  F: FnMut(R::Item) -> U,
{
  type Item = U;

  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
    self.inner.poll_ready(cx)
  }

  fn consume(&mut self) -> Result<U, ReceiverError> {
    self.inner.consume().map(&mut self.f)
  }

  fn close(&mut self) {
    self.inner.close()
  }

  fn cancel_ready(&mut self) {
    self.inner.cancel_ready()
  }
}

impl<R: fmt::Display, F> fmt::Display for Map<R, F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Map:{}", self.inner)
  }
}

impl<R: fmt::Debug, F> fmt::Debug for Map<R, F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Map").field("inner", &self.inner).finish()
  }
}

// --- Filter ---

/// A receiver that drops the messages of another receiver failing a predicate.
///
/// Discarding happens while waiting for readiness, so a `Filter` only reports
/// ready once it holds a message that passed.
pub struct Filter<R: Receiver, P> {
  inner: R,
  predicate: P,
  next: Option<Result<R::Item, ReceiverError>>,
  stopped: bool,
}

impl<R: Receiver, P> Filter<R, P> {
  pub(crate) fn new(inner: R, predicate: P) -> Self {
    Filter {
      inner,
      predicate,
      next: None,
      stopped: false,
    }
  }
}

impl<R, P> Receiver for Filter<R, P>
where
  R: Receiver,
  P: FnMut(&R::Item) -> bool,
{
  type Item = R::Item;

  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
    if self.next.is_some() {
      return Poll::Ready(true);
    }
    if self.stopped {
      return Poll::Ready(false);
    }
    for _ in 0..FILTER_DISCARD_BUDGET {
      match self.inner.poll_ready(cx) {
        Poll::Pending => return Poll::Pending,
        Poll::Ready(false) => {
          self.stopped = true;
          return Poll::Ready(false);
        }
        Poll::Ready(true) => match self.inner.consume() {
          Ok(message) if (self.predicate)(&message) => {
            self.next = Some(Ok(message));
            return Poll::Ready(true);
          }
          Ok(_) => {}
          Err(ReceiverError::Stopped(_)) => {
            self.stopped = true;
            return Poll::Ready(false);
          }
          Err(err) => {
            self.next = Some(Err(err));
            return Poll::Ready(true);
          }
        },
      }
    }
    // Out of budget with messages still flowing: let other tasks run.
    cx.waker().wake_by_ref();
    Poll::Pending
  }

  fn consume(&mut self) -> Result<R::Item, ReceiverError> {
    match self.next.take() {
      Some(result) => result,
      None if self.stopped => Err(ReceiverStoppedError::new(&*self).into()),
      None => Err(ReceiverError::not_ready(&*self)),
    }
  }

  fn close(&mut self) {
    self.inner.close()
  }

  fn cancel_ready(&mut self) {
    self.inner.cancel_ready()
  }
}

impl<R: Receiver, P> fmt::Display for Filter<R, P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Filter:{}", self.inner)
  }
}

impl<R: Receiver + fmt::Debug, P> fmt::Debug for Filter<R, P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Filter")
      .field("inner", &self.inner)
      .field("holding", &self.next.is_some())
      .field("stopped", &self.stopped)
      .finish()
  }
}
