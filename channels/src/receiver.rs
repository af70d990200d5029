// src/receiver.rs

//! The receiving side of the endpoint contract.
//!
//! Every receiver in this crate (channel receivers, [`Map`], [`Filter`],
//! [`Merger`](crate::merge::Merger), [`Event`](crate::event::Event)) follows the
//! same two-phase protocol:
//!
//! 1. **`ready()`** waits until the receiver either holds a message or is
//!    permanently exhausted, and reports which with a `bool`. It never fails and
//!    it can be called repeatedly: once a message is held it returns immediately.
//! 2. **`consume()`** hands out the held message. It must follow a successful
//!    `ready()`; all failures (including "stopped") are reported here.
//!
//! The split lets a multiplexer wait on many receivers without committing to
//! any one of them before it knows which is ready.
//!
//! At the lowest level readiness is [`Receiver::poll_ready`]. A receiver that
//! returns `Poll::Pending` keeps a registered waiter with its channel until it
//! is woken, becomes ready, or [`Receiver::cancel_ready`] withdraws the
//! registration. The [`Ready`] and [`Receive`] futures withdraw it automatically
//! when dropped mid-wait, so racing `receive()` against a timeout is safe.

use crate::adapters::{Filter, Map};
use crate::error::ReceiverError;

use futures_core::{FusedStream, Stream};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A receiving endpoint.
///
/// The `Display` representation identifies the receiver in logs and in the
/// errors it produces.
pub trait Receiver: fmt::Display {
  /// The type of message produced.
  type Item;

  /// Polls until a message is held or the receiver is exhausted.
  ///
  /// Resolves to `true` when a message is ready to be consumed and `false`
  /// once no message will ever be produced again. Polling again after a `true`
  /// without consuming resolves to `true` immediately.
  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool>;

  /// Takes the message made available by the last successful `poll_ready`.
  ///
  /// # Errors
  ///
  /// - [`ReceiverError::Stopped`] once the receiver is exhausted.
  /// - [`ReceiverError::NotReady`] if no message is being held.
  fn consume(&mut self) -> Result<Self::Item, ReceiverError>;

  /// Closes this receiver. Messages not yet made ready are no longer delivered
  /// to it; other receivers of the same channel are unaffected.
  ///
  /// A message that was already made ready is kept: the next `poll_ready`
  /// still resolves to `true` and `consume` returns it. Only after that does
  /// the receiver report that it is stopped.
  fn close(&mut self);

  /// Withdraws the waiter registered by a `poll_ready` that returned `Pending`.
  ///
  /// Called when a wait is abandoned. Receivers without channel-side
  /// registrations can rely on the default no-op.
  fn cancel_ready(&mut self) {}
}

impl<R: Receiver + ?Sized> Receiver for &mut R {
  type Item = R::Item;

  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
    (**self).poll_ready(cx)
  }

  fn consume(&mut self) -> Result<Self::Item, ReceiverError> {
    (**self).consume()
  }

  fn close(&mut self) {
    (**self).close()
  }

  fn cancel_ready(&mut self) {
    (**self).cancel_ready()
  }
}

impl<R: Receiver + ?Sized> Receiver for Box<R> {
  type Item = R::Item;

  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
    (**self).poll_ready(cx)
  }

  fn consume(&mut self) -> Result<Self::Item, ReceiverError> {
    (**self).consume()
  }

  fn close(&mut self) {
    (**self).close()
  }

  fn cancel_ready(&mut self) {
    (**self).cancel_ready()
  }
}

/// A type-erased receiver, handy for merging receivers of different kinds.
pub type BoxReceiver<'a, T> = Box<dyn Receiver<Item = T> + Send + 'a>;

/// Convenience methods available on every [`Receiver`].
pub trait ReceiverExt: Receiver {
  /// Waits until the receiver holds a message or is exhausted.
  fn ready(&mut self) -> Ready<'_, Self> {
    Ready::new(self)
  }

  /// Waits for and consumes the next message.
  ///
  /// Resolves to [`ReceiverError::Stopped`] once the receiver is exhausted.
  fn receive(&mut self) -> Receive<'_, Self> {
    Receive::new(self)
  }

  /// Returns a receiver yielding `f(message)` for every message of `self`.
  fn map<U, F>(self, f: F) -> Map<Self, F>
  where
    Self: Sized,
    F: FnMut(Self::Item) -> U,
  {
    Map::new(self, f)
  }

  /// Returns a receiver yielding only the messages for which `predicate` holds.
  fn filter<P>(self, predicate: P) -> Filter<Self, P>
  where
    Self: Sized,
    P: FnMut(&Self::Item) -> bool,
  {
    Filter::new(self, predicate)
  }

  /// Boxes the receiver, erasing its concrete type.
  fn boxed<'a>(self) -> BoxReceiver<'a, Self::Item>
  where
    Self: Sized + Send + 'a,
  {
    Box::new(self)
  }

  /// Turns the receiver into an async iterator.
  ///
  /// The stream ends cleanly when the receiver stops; any other receiver
  /// error is yielded as an `Err` item.
  fn into_stream(self) -> ReceiverStream<Self>
  where
    Self: Sized,
  {
    ReceiverStream::new(self)
  }
}

impl<R: Receiver + ?Sized> ReceiverExt for R {}

/// Future returned by [`ReceiverExt::ready`].
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct Ready<'a, R: Receiver + ?Sized> {
  receiver: &'a mut R,
  parked: bool,
}

impl<'a, R: Receiver + ?Sized> Ready<'a, R> {
  fn new(receiver: &'a mut R) -> Self {
    Self {
      receiver,
      parked: false,
    }
  }
}

impl<R: Receiver + ?Sized> Future for Ready<'_, R> {
  type Output = bool;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    match this.receiver.poll_ready(cx) {
      Poll::Ready(active) => {
        this.parked = false;
        Poll::Ready(active)
      }
      Poll::Pending => {
        this.parked = true;
        Poll::Pending
      }
    }
  }
}

impl<R: Receiver + ?Sized> Drop for Ready<'_, R> {
  fn drop(&mut self) {
    if self.parked {
      self.receiver.cancel_ready();
    }
  }
}

/// Future returned by [`ReceiverExt::receive`].
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct Receive<'a, R: Receiver + ?Sized> {
  ready: Ready<'a, R>,
}

impl<'a, R: Receiver + ?Sized> Receive<'a, R> {
  fn new(receiver: &'a mut R) -> Self {
    Self {
      ready: Ready::new(receiver),
    }
  }
}

impl<R: Receiver + ?Sized> Future for Receive<'_, R> {
  type Output = Result<R::Item, ReceiverError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    // An inactive receiver still goes through consume(): that is where the
    // stopped error naming the receiver is produced.
    std::task::ready!(Pin::new(&mut this.ready).poll(cx));
    Poll::Ready(this.ready.receiver.consume())
  }
}

/// Async iteration over a receiver, see [`ReceiverExt::into_stream`].
#[must_use = "streams do nothing unless polled"]
#[derive(Debug)]
pub struct ReceiverStream<R: Receiver> {
  receiver: R,
  parked: bool,
  done: bool,
}

impl<R: Receiver> ReceiverStream<R> {
  fn new(receiver: R) -> Self {
    Self {
      receiver,
      parked: false,
      done: false,
    }
  }

  fn release(&mut self) {
    if self.parked {
      self.parked = false;
      self.receiver.cancel_ready();
    }
  }
}

impl<R: Receiver + Unpin> Stream for ReceiverStream<R> {
  type Item = Result<R::Item, ReceiverError>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if this.done {
      return Poll::Ready(None);
    }
    match this.receiver.poll_ready(cx) {
      Poll::Pending => {
        this.parked = true;
        Poll::Pending
      }
      Poll::Ready(_) => {
        this.parked = false;
        match this.receiver.consume() {
          Ok(message) => Poll::Ready(Some(Ok(message))),
          Err(ReceiverError::Stopped(_)) => {
            this.done = true;
            Poll::Ready(None)
          }
          Err(err) => Poll::Ready(Some(Err(err))),
        }
      }
    }
  }
}

impl<R: Receiver + Unpin> FusedStream for ReceiverStream<R> {
  fn is_terminated(&self) -> bool {
    self.done
  }
}

impl<R: Receiver> Drop for ReceiverStream<R> {
  fn drop(&mut self) {
    self.release();
  }
}
