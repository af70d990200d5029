// src/anycast/async_impl.rs

//! The Future-based send path of the Anycast channel.

use super::core::StartSend;
use super::Sender;
use crate::error::SenderError;
use crate::internal::WaiterKey;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

// --- SendFuture ---

/// A future that completes once a message has been accepted by an Anycast channel.
///
/// If the buffer is full the future parks, holding the message, until a
/// receiver frees a slot. Dropping a parked future withdraws the message.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct SendFuture<'a, T> {
  sender: &'a Sender<T>,
  // Taken on the first poll; afterwards the message lives in the waiter record.
  item: Option<T>,
  key: Option<WaiterKey>,
}

impl<T> fmt::Debug for SendFuture<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SendFuture")
      .field("sender", &format_args!("{}", self.sender))
      .field("parked", &self.key.is_some())
      .finish()
  }
}

// No field is structurally pinned.
impl<T> Unpin for SendFuture<'_, T> {}

impl<'a, T> SendFuture<'a, T> {
  pub(super) fn new(sender: &'a Sender<T>, item: T) -> Self {
    Self {
      sender,
      item: Some(item),
      key: None,
    }
  }
}

impl<T> Future for SendFuture<'_, T> {
  type Output = Result<(), SenderError<T>>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    let shared = &this.sender.shared;

    if let Some(key) = this.key {
      return match shared.poll_parked_send(key, cx.waker()) {
        Poll::Pending => Poll::Pending,
        Poll::Ready(Ok(())) => {
          this.key = None;
          tracing::info!(
            channel = %shared,
            "Anycast channel has space again, resuming the blocked sender"
          );
          Poll::Ready(Ok(()))
        }
        Poll::Ready(Err(item)) => {
          this.key = None;
          Poll::Ready(Err(this.sender.closed_error(item)))
        }
      };
    }

    // Polled again after completion.
    let Some(item) = this.item.take() else {
      return Poll::Ready(Ok(()));
    };

    let key = WaiterKey::next();
    match shared.start_send(key, cx.waker(), item) {
      StartSend::Sent => Poll::Ready(Ok(())),
      StartSend::Closed(item) => Poll::Ready(Err(this.sender.closed_error(item))),
      StartSend::Parked => {
        tracing::warn!(
          channel = %shared,
          capacity = shared.capacity,
          "Anycast channel is full, blocking sender until a receiver consumes a message"
        );
        this.key = Some(key);
        Poll::Pending
      }
    }
  }
}

impl<T> Drop for SendFuture<'_, T> {
  fn drop(&mut self) {
    if let Some(key) = self.key.take() {
      self.sender.shared.cancel_send(key);
    }
  }
}
