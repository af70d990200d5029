// src/error.rs

//! Error types shared by every channel kind and combinator.
//!
//! Receivers never fail while waiting: `ready()` only reports whether the
//! receiver is still active. Failures are materialized when the value is
//! consumed, which lets a multiplexer probe many receivers without an error
//! on one of them interrupting the scan.

use core::fmt;
use thiserror::Error;

/// An operation was attempted on a channel that has been closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("channel {channel} is closed")]
pub struct ChannelClosed {
  channel: String,
}

impl ChannelClosed {
  pub(crate) fn new(channel: impl fmt::Display) -> Self {
    Self {
      channel: channel.to_string(),
    }
  }

  /// The description of the closed channel, e.g. `Anycast:jobs`.
  pub fn channel(&self) -> &str {
    &self.channel
  }
}

/// Error returned by `send` when the message could not be delivered.
///
/// The unsent message is handed back and can be recovered with
/// [`SenderError::into_inner`].
#[derive(Clone, PartialEq, Eq)]
pub struct SenderError<T> {
  sender: String,
  message: T,
  source: ChannelClosed,
}

impl<T> SenderError<T> {
  pub(crate) fn closed(sender: impl fmt::Display, message: T, source: ChannelClosed) -> Self {
    Self {
      sender: sender.to_string(),
      message,
      source,
    }
  }

  /// The description of the sender that failed.
  pub fn sender(&self) -> &str {
    &self.sender
  }

  /// The closed-channel condition that caused the failure.
  pub fn channel_closed(&self) -> &ChannelClosed {
    &self.source
  }

  /// Consumes the error, returning the message that was not sent.
  #[inline]
  pub fn into_inner(self) -> T {
    self.message
  }
}

impl<T> fmt::Debug for SenderError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SenderError")
      .field("sender", &self.sender)
      .field("source", &self.source)
      .finish_non_exhaustive()
  }
}

impl<T> fmt::Display for SenderError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "sender {} failed: the channel was closed", self.sender)
  }
}

impl<T> std::error::Error for SenderError<T> {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.source)
  }
}

/// A receiver is permanently exhausted.
///
/// This is terminal: every later `consume()`/`receive()` on the same receiver
/// fails the same way. When the receiver stopped because its channel was closed
/// and drained, the [`ChannelClosed`] condition is available as the error source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("receiver {receiver} was stopped")]
pub struct ReceiverStoppedError {
  receiver: String,
  #[source]
  source: Option<ChannelClosed>,
}

impl ReceiverStoppedError {
  pub(crate) fn new(receiver: impl fmt::Display) -> Self {
    Self {
      receiver: receiver.to_string(),
      source: None,
    }
  }

  pub(crate) fn channel_closed(receiver: impl fmt::Display, source: ChannelClosed) -> Self {
    Self {
      receiver: receiver.to_string(),
      source: Some(source),
    }
  }

  /// The description of the receiver that stopped.
  pub fn receiver(&self) -> &str {
    &self.receiver
  }
}

/// Errors surfaced by `consume()` and `receive()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiverError {
  /// The receiver is exhausted. Async iteration turns this into end-of-stream.
  #[error(transparent)]
  Stopped(#[from] ReceiverStoppedError),
  /// `consume()` was called without a preceding successful `ready()`.
  #[error("consume() on receiver {receiver} must be preceded by a successful ready()")]
  NotReady { receiver: String },
  /// Any other receiver-side failure, for receivers implemented outside this crate.
  #[error("receiver {receiver} failed: {message}")]
  Other { receiver: String, message: String },
}

impl ReceiverError {
  pub(crate) fn not_ready(receiver: impl fmt::Display) -> Self {
    ReceiverError::NotReady {
      receiver: receiver.to_string(),
    }
  }

  /// Builds a non-terminal error for a custom receiver implementation.
  pub fn other(receiver: impl fmt::Display, message: impl Into<String>) -> Self {
    ReceiverError::Other {
      receiver: receiver.to_string(),
      message: message.into(),
    }
  }

  /// Returns `true` if this is the terminal [`ReceiverStoppedError`].
  #[inline]
  pub fn is_stopped(&self) -> bool {
    matches!(self, ReceiverError::Stopped(_))
  }

  /// The description of the receiver this error originated in.
  pub fn receiver(&self) -> &str {
    match self {
      ReceiverError::Stopped(err) => err.receiver(),
      ReceiverError::NotReady { receiver } | ReceiverError::Other { receiver, .. } => receiver,
    }
  }
}

/// Error returned by [`merge`](crate::merge()).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MergeError {
  /// `merge` needs at least one receiver.
  #[error("at least one receiver must be provided to merge")]
  NoReceivers,
}

/// Errors yielded while iterating a [`Selector`](crate::select::Selector).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
  /// The selector was polled without any receivers added.
  #[error("at least one receiver must be added to the selector")]
  NoReceivers,
  /// The previous [`Selected`](crate::select::Selected) token was never matched
  /// against its source, so its message was dropped.
  #[error("selected receiver {receiver} (source #{index}) was not handled")]
  UnhandledSelected { index: usize, receiver: String },
}
