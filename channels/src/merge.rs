// src/merge.rs

//! Merging several receivers of one message type into a single receiver.

use crate::error::{MergeError, ReceiverError, ReceiverStoppedError};
use crate::receiver::Receiver;

use std::collections::VecDeque;
use std::fmt;
use std::task::{Context, Poll};

/// Merges `receivers` into one receiver yielding messages from all of them.
///
/// Messages from a single source keep their relative order. When several
/// sources are ready at once, each contributes one message per readiness scan,
/// in the order the sources were passed, so a busy source cannot starve the
/// others. The merger stops once every source has stopped.
///
/// ```
/// use switchboard::{merge, Anycast, ReceiverExt};
///
/// # async fn run() {
/// let a = Anycast::<u32>::new("a", 4);
/// let b = Anycast::<u32>::new("b", 4);
/// let mut merged = merge([a.new_receiver(), b.new_receiver()]).unwrap();
///
/// b.new_sender().send(2).await.unwrap();
/// assert_eq!(merged.receive().await.unwrap(), 2);
/// # }
/// ```
///
/// # Errors
///
/// Returns [`MergeError::NoReceivers`] if `receivers` is empty.
pub fn merge<R, I>(receivers: I) -> Result<Merger<R>, MergeError>
where
  R: Receiver,
  I: IntoIterator<Item = R>,
{
  let sources: Vec<Source<R>> = receivers
    .into_iter()
    .map(|receiver| Source {
      receiver,
      parked: false,
      done: false,
    })
    .collect();
  if sources.is_empty() {
    return Err(MergeError::NoReceivers);
  }
  Ok(Merger {
    results: VecDeque::with_capacity(sources.len()),
    sources,
  })
}

struct Source<R> {
  receiver: R,
  /// A readiness wait is registered with the source.
  parked: bool,
  done: bool,
}

/// The receiver returned by [`merge()`].
pub struct Merger<R: Receiver> {
  sources: Vec<Source<R>>,
  results: VecDeque<Result<R::Item, ReceiverError>>,
}

impl<R: Receiver> Merger<R> {
  /// Number of sources that have not stopped yet.
  pub fn active_sources(&self) -> usize {
    self.sources.iter().filter(|s| !s.done).count()
  }

  fn all_done(&self) -> bool {
    self.sources.iter().all(|s| s.done)
  }

  fn release(&mut self) {
    for source in self.sources.iter_mut().filter(|s| s.parked) {
      source.parked = false;
      source.receiver.cancel_ready();
    }
  }
}

impl<R: Receiver> Receiver for Merger<R> {
  type Item = R::Item;

  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
    if !self.results.is_empty() {
      return Poll::Ready(true);
    }
    for source in self.sources.iter_mut().filter(|s| !s.done) {
      match source.receiver.poll_ready(cx) {
        Poll::Pending => source.parked = true,
        Poll::Ready(false) => {
          source.parked = false;
          source.done = true;
        }
        Poll::Ready(true) => {
          source.parked = false;
          match source.receiver.consume() {
            Err(ReceiverError::Stopped(_)) => source.done = true,
            result => self.results.push_back(result),
          }
        }
      }
    }
    if !self.results.is_empty() {
      Poll::Ready(true)
    } else if self.all_done() {
      Poll::Ready(false)
    } else {
      Poll::Pending
    }
  }

  fn consume(&mut self) -> Result<R::Item, ReceiverError> {
    match self.results.pop_front() {
      Some(result) => result,
      None if self.all_done() => Err(ReceiverStoppedError::new(&*self).into()),
      None => Err(ReceiverError::not_ready(&*self)),
    }
  }

  fn close(&mut self) {
    self.release();
    for source in &mut self.sources {
      source.receiver.close();
    }
  }

  fn cancel_ready(&mut self) {
    self.release();
  }
}

impl<R: Receiver> Drop for Merger<R> {
  fn drop(&mut self) {
    self.release();
  }
}

impl<R: Receiver> fmt::Display for Merger<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("merge:")?;
    for (i, source) in self.sources.iter().take(3).enumerate() {
      if i > 0 {
        f.write_str(",")?;
      }
      write!(f, "{}", source.receiver)?;
    }
    if self.sources.len() > 3 {
      f.write_str(",…")?;
    }
    Ok(())
  }
}

impl<R: Receiver> fmt::Debug for Merger<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Merger")
      .field("sources", &self.sources.len())
      .field("active", &self.active_sources())
      .field("buffered", &self.results.len())
      .finish()
  }
}
