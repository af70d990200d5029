//! Typed in-process channels with composable receivers.
//!
//! Switchboard provides two channel kinds and a set of receiver combinators,
//! all speaking the same two-phase receiver protocol (`ready()` then
//! `consume()`, see [`receiver`]):
//!
//! - [`Anycast`]: a bounded queue where each message goes to exactly one
//!   receiver. Senders wait when the buffer is full.
//! - [`Broadcast`]: every message goes to every receiver, each through its own
//!   unbounded mailbox.
//! - [`ReceiverExt::map`] and [`ReceiverExt::filter`] derive receivers.
//! - [`merge()`] combines receivers of one message type into one receiver.
//! - [`Selector`] waits on receivers of different message types at once.
//! - [`Event`] is a receiver that is made ready directly, e.g. as a stop signal.
//! - [`Timer`] ticks at a fixed interval (the default `timer` feature).
//!
//! The channels and combinators are executor-agnostic: they only rely on
//! `Waker`s. Timers need a tokio runtime with the time driver enabled.

pub mod error;
pub mod receiver;
pub mod sender;

// Channel type modules
pub mod anycast;
pub mod broadcast;

// Receiver combinators
pub mod adapters;
pub mod event;
pub mod merge;
pub mod select;
pub mod timer;

// Internal utilities - not part of public API but exposed for crate use
mod async_util;
mod internal;

pub use anycast::Anycast;
pub use broadcast::Broadcast;
pub use error::{
  ChannelClosed, MergeError, ReceiverError, ReceiverStoppedError, SelectError, SenderError,
};
pub use event::{Event, EventHandle};
pub use merge::{merge, Merger};
pub use receiver::{BoxReceiver, Receiver, ReceiverExt};
pub use select::{Selected, Selector, SourceId};
pub use sender::Sender;
#[cfg(feature = "timer")]
pub use timer::{MissedTickPolicy, Timer, TimerHandle};
