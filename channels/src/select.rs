// src/select.rs

//! Waiting on several receivers of different message types at once.
//!
//! A [`Selector`] is a `Stream` of [`Selected`] tokens. Each token stands for
//! one receiver that became ready, with its message (or its error) already
//! consumed into the token. The token is matched back to its source with the
//! typed [`SourceId`] handle returned by [`Selector::add`]:
//!
//! ```
//! use futures_util::StreamExt;
//! use switchboard::{Anycast, Broadcast, Selector};
//!
//! # async fn run() {
//! let numbers = Anycast::<u32>::new("numbers", 8);
//! let words = Broadcast::<String>::new("words");
//!
//! let mut selector = Selector::new();
//! let number_id = selector.add(numbers.new_receiver());
//! let word_id = selector.add(words.new_receiver());
//!
//! numbers.new_sender().send(1).await.unwrap();
//! numbers.close();
//! words.close();
//!
//! while let Some(selected) = selector.next().await {
//!   let mut selected = selected.unwrap();
//!   if let Some(number) = selected.take(&number_id) {
//!     match number {
//!       Ok(n) => println!("number {n}"),
//!       Err(err) => println!("numbers stopped: {err}"),
//!     }
//!   } else if let Some(word) = selected.take(&word_id) {
//!     println!("word {word:?}");
//!   }
//! }
//! # }
//! ```
//!
//! Only the yielded token's message is consumed. Other sources that were
//! found ready keep their message until their own turn, so dropping the
//! selector early leaves it in the receiver.
//!
//! Every token must be handled with a matching `take`. A token that was
//! dropped unhandled is reported as [`SelectError::UnhandledSelected`] on the
//! next iteration, since its message is lost.

use crate::error::{ReceiverError, SelectError};
use crate::receiver::Receiver;

use futures_core::Stream;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

static NEXT_SELECTOR_ID: AtomicU64 = AtomicU64::new(1);

type AnyMessage = Box<dyn Any + Send>;

/// Object-safe view of a receiver whose messages are boxed as `Any`.
trait ErasedReceiver: fmt::Display {
  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool>;
  fn consume_any(&mut self) -> Result<AnyMessage, ReceiverError>;
  fn cancel_ready(&mut self);
}

impl<R> ErasedReceiver for R
where
  R: Receiver,
  R::Item: Send + 'static,
{
  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
    Receiver::poll_ready(self, cx)
  }

  fn consume_any(&mut self) -> Result<AnyMessage, ReceiverError> {
    self.consume().map(|message| Box::new(message) as AnyMessage)
  }

  fn cancel_ready(&mut self) {
    Receiver::cancel_ready(self)
  }
}

struct SelectSource<'a> {
  receiver: Box<dyn ErasedReceiver + Send + 'a>,
  parked: bool,
  retired: bool,
}

/// The previously yielded token, kept to check that it was handled.
struct Previous {
  index: usize,
  receiver: String,
  handled: Arc<AtomicBool>,
}

/// Typed handle identifying a receiver added to a [`Selector`].
pub struct SourceId<T> {
  selector: u64,
  index: usize,
  _item: PhantomData<fn() -> T>,
}

impl<T> SourceId<T> {
  /// Position of the source in the order it was added.
  pub fn index(&self) -> usize {
    self.index
  }
}

impl<T> Clone for SourceId<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for SourceId<T> {}

impl<T> fmt::Debug for SourceId<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SourceId")
      .field("selector", &self.selector)
      .field("index", &self.index)
      .finish()
  }
}

/// One ready receiver, yielded by a [`Selector`].
#[must_use = "a Selected token must be handled with take(), or its message is lost"]
pub struct Selected {
  selector: u64,
  index: usize,
  receiver: String,
  value: Option<Result<AnyMessage, ReceiverError>>,
  handled: Arc<AtomicBool>,
}

impl Selected {
  /// Takes the message if this token came from the source identified by `id`.
  ///
  /// Returns `None` for any other source, and for the matching source once the
  /// value has already been taken. A matching call marks the token as handled;
  /// the source's errors, including its final
  /// [`ReceiverStoppedError`](crate::error::ReceiverStoppedError), are returned
  /// as `Some(Err(_))`.
  pub fn take<T: 'static>(&mut self, id: &SourceId<T>) -> Option<Result<T, ReceiverError>> {
    if !self.is_from(id) {
      return None;
    }
    self.handled.store(true, Ordering::Release);
    let value = self.value.take()?;
    Some(value.and_then(|message| match message.downcast::<T>() {
      Ok(message) => Ok(*message),
      Err(_) => Err(ReceiverError::other(
        &self.receiver,
        "message type does not match the source handle",
      )),
    }))
  }

  /// Returns `true` if this token came from the source identified by `id`.
  pub fn is_from<T>(&self, id: &SourceId<T>) -> bool {
    id.selector == self.selector && id.index == self.index
  }

  /// Position of the ready source in the order it was added.
  pub fn index(&self) -> usize {
    self.index
  }

  /// The description of the ready receiver.
  pub fn receiver(&self) -> &str {
    &self.receiver
  }

  /// Returns `true` if the source reported that it stopped.
  pub fn was_stopped(&self) -> bool {
    matches!(&self.value, Some(Err(err)) if err.is_stopped())
  }
}

impl fmt::Debug for Selected {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Selected")
      .field("index", &self.index)
      .field("receiver", &self.receiver)
      .field("taken", &self.value.is_none())
      .finish()
  }
}

/// Multiplexes receivers of different message types.
///
/// Sources that become ready in the same scan are yielded in the order they
/// were added, one token per iteration, before the sources are polled again.
/// A source that stops is yielded once more with its stopped error and then
/// retired; the stream ends when every source is retired.
pub struct Selector<'a> {
  id: u64,
  sources: Vec<SelectSource<'a>>,
  ready: VecDeque<usize>,
  previous: Option<Previous>,
  reported_empty: bool,
}

impl Default for Selector<'_> {
  fn default() -> Self {
    Self::new()
  }
}

impl<'a> Selector<'a> {
  pub fn new() -> Self {
    Selector {
      id: NEXT_SELECTOR_ID.fetch_add(1, Ordering::Relaxed),
      sources: Vec::new(),
      ready: VecDeque::new(),
      previous: None,
      reported_empty: false,
    }
  }

  /// Adds a receiver and returns the handle to recognise its tokens with.
  pub fn add<R>(&mut self, receiver: R) -> SourceId<R::Item>
  where
    R: Receiver + Send + 'a,
    R::Item: Send + 'static,
  {
    let index = self.sources.len();
    self.sources.push(SelectSource {
      receiver: Box::new(receiver),
      parked: false,
      retired: false,
    });
    SourceId {
      selector: self.id,
      index,
      _item: PhantomData,
    }
  }

  /// Number of sources that have not been retired.
  pub fn active_sources(&self) -> usize {
    self.sources.iter().filter(|s| !s.retired).count()
  }

  /// Polls every live source and queues the indices of those that are ready.
  ///
  /// Nothing is consumed here: a ready source keeps its message in its own
  /// pending cell until its token is yielded.
  fn scan(&mut self, cx: &mut Context<'_>) {
    for (index, source) in self.sources.iter_mut().enumerate() {
      if source.retired {
        continue;
      }
      if source.receiver.poll_ready(cx).is_pending() {
        source.parked = true;
        continue;
      }
      source.parked = false;
      self.ready.push_back(index);
    }
  }

  /// Consumes the message of a source found ready by the last scan.
  fn select(&mut self, index: usize) -> Selected {
    let source = &mut self.sources[index];
    // An inactive source still goes through consume_any() to produce the
    // stopped error naming it.
    let value = source.receiver.consume_any();
    if matches!(&value, Err(err) if err.is_stopped()) {
      source.retired = true;
    }
    Selected {
      selector: self.id,
      index,
      receiver: source.receiver.to_string(),
      value: Some(value),
      handled: Arc::new(AtomicBool::new(false)),
    }
  }

  fn release(&mut self) {
    for source in self.sources.iter_mut().filter(|s| s.parked) {
      source.parked = false;
      source.receiver.cancel_ready();
    }
  }
}

impl Stream for Selector<'_> {
  type Item = Result<Selected, SelectError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();

    if let Some(previous) = this.previous.take() {
      if !previous.handled.load(Ordering::Acquire) {
        tracing::warn!(
          receiver = %previous.receiver,
          index = previous.index,
          "selected receiver was not handled"
        );
        return Poll::Ready(Some(Err(SelectError::UnhandledSelected {
          index: previous.index,
          receiver: previous.receiver,
        })));
      }
    }

    if this.sources.is_empty() {
      if this.reported_empty {
        return Poll::Ready(None);
      }
      this.reported_empty = true;
      return Poll::Ready(Some(Err(SelectError::NoReceivers)));
    }

    if this.ready.is_empty() {
      this.scan(cx);
    }

    match this.ready.pop_front() {
      Some(index) => {
        let selected = this.select(index);
        this.previous = Some(Previous {
          index: selected.index,
          receiver: selected.receiver.clone(),
          handled: Arc::clone(&selected.handled),
        });
        Poll::Ready(Some(Ok(selected)))
      }
      None if this.sources.iter().all(|s| s.retired) => Poll::Ready(None),
      None => Poll::Pending,
    }
  }
}

impl Drop for Selector<'_> {
  fn drop(&mut self) {
    self.release();
  }
}

impl fmt::Debug for Selector<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Selector")
      .field("id", &self.id)
      .field("sources", &self.sources.len())
      .field("active", &self.active_sources())
      .field("queued", &self.ready.len())
      .finish()
  }
}
