// src/sender.rs

//! The sending side of the endpoint contract.

use crate::error::SenderError;
use std::future::Future;

/// A sending endpoint.
///
/// Senders are cheap handles; cloning one yields another sender for the same
/// channel. A send completes once the message has been accepted by the channel,
/// not once it has been consumed.
pub trait Sender<T> {
  /// The future returned by [`Sender::send`].
  type Send<'a>: Future<Output = Result<(), SenderError<T>>> + 'a
  where
    Self: 'a,
    T: 'a;

  /// Sends a message.
  ///
  /// # Errors
  ///
  /// Resolves to a [`SenderError`] carrying the unsent message if the channel
  /// is (or becomes, while this send is parked) closed.
  fn send(&self, message: T) -> Self::Send<'_>;
}
