// src/timer.rs

#![cfg(feature = "timer")]

//! A receiver that ticks at a fixed interval, driven by tokio's clock.
//!
//! Each tick yields the timer's *drift*: how late the tick was delivered
//! compared to when it was scheduled. A timer whose task is busy will miss
//! ticks; what happens then is decided by its [`MissedTickPolicy`].
//!
//! ```
//! use std::time::Duration;
//! use switchboard::timer::{MissedTickPolicy, Timer};
//! use switchboard::{Anycast, Selector};
//! use futures_util::StreamExt;
//!
//! # async fn run() {
//! let data = Anycast::<u32>::new("data", 8);
//! let timeout = Timer::new(
//!   Duration::from_secs(1),
//!   MissedTickPolicy::SkipMissedAndDrift { delay_tolerance: Duration::ZERO },
//! );
//! let timeout_handle = timeout.handle();
//!
//! let mut selector = Selector::new();
//! let data_id = selector.add(data.new_receiver());
//! let timeout_id = selector.add(timeout);
//!
//! while let Some(selected) = selector.next().await {
//!   let mut selected = selected.unwrap();
//!   if let Some(message) = selected.take(&data_id) {
//!     println!("data {:?}", message);
//!     timeout_handle.reset();
//!   } else if let Some(drift) = selected.take(&timeout_id) {
//!     println!("no data for a second (drift {:?}), giving up", drift);
//!     break;
//!   }
//! }
//! # }
//! ```
//!
//! Timers must be polled inside a tokio runtime with the time driver enabled.

use crate::async_util::AtomicWaker;
use crate::error::{ReceiverError, ReceiverStoppedError};
use crate::receiver::Receiver;

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};

/// What a [`Timer`] does when it was delivered late and missed ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissedTickPolicy {
  /// Deliver every missed tick, in a burst, until the timer has caught up.
  ///
  /// Ticks stay aligned to the start time; drift is never accumulated.
  TriggerAllMissed,
  /// Deliver one late tick, skip the other missed ones, and schedule the next
  /// tick on the next multiple of the interval since the start time.
  SkipMissedAndResync,
  /// Behave as if the timer was reset on every tick delivered more than
  /// `delay_tolerance` late, so the next tick is one interval after it.
  ///
  /// Delays up to the tolerance keep the original alignment.
  SkipMissedAndDrift { delay_tolerance: Duration },
}

impl MissedTickPolicy {
  /// Computes when the tick after the one scheduled for `scheduled` and
  /// delivered at `now` should trigger.
  pub fn next_tick_time(&self, interval: Duration, scheduled: Instant, now: Instant) -> Instant {
    let drift = now.saturating_duration_since(scheduled);
    match *self {
      MissedTickPolicy::TriggerAllMissed => scheduled + interval,
      MissedTickPolicy::SkipMissedAndResync => now + (interval - modulo(drift, interval)),
      MissedTickPolicy::SkipMissedAndDrift { delay_tolerance } => {
        if drift > delay_tolerance {
          now + interval
        } else {
          scheduled + interval
        }
      }
    }
  }
}

fn modulo(value: Duration, divisor: Duration) -> Duration {
  let rem = value.as_nanos() % divisor.as_nanos();
  Duration::from_nanos(u64::try_from(rem).unwrap_or(u64::MAX))
}

#[derive(Debug)]
struct TimerState {
  interval: Duration,
  policy: MissedTickPolicy,
  /// `None` until the timer is started for the first time.
  next_tick: Option<Instant>,
  stopped: bool,
  /// Drift of a tick that was made ready but not consumed yet.
  drift: Option<Duration>,
}

impl TimerState {
  fn restart(&mut self, now: Instant, start_delay: Duration) -> Instant {
    let next_tick = now + start_delay + self.interval;
    self.next_tick = Some(next_tick);
    self.stopped = false;
    self.drift = None;
    next_tick
  }
}

#[derive(Debug)]
struct TimerShared {
  state: Mutex<TimerState>,
  waker: AtomicWaker,
}

impl TimerShared {
  fn reset(&self, interval: Option<Duration>, start_delay: Duration) {
    {
      let mut state = self.state.lock();
      if let Some(interval) = interval {
        state.interval = interval;
      }
      state.restart(Instant::now(), start_delay);
    }
    self.waker.wake();
  }

  fn stop(&self) {
    {
      let mut state = self.state.lock();
      state.stopped = true;
      state.next_tick = Some(Instant::now());
    }
    self.waker.wake();
  }

  fn is_running(&self) -> bool {
    !self.state.lock().stopped
  }
}

/// A [`Receiver`] of tick drifts, triggering every `interval`.
///
/// A timer stopped with [`stop()`](Timer::stop) or `close()` reports that it
/// is stopped until it is [reset](Timer::reset). A tick that was already made
/// ready is still delivered after a stop, but a reset discards it.
pub struct Timer {
  shared: Arc<TimerShared>,
  sleep: Option<Pin<Box<Sleep>>>,
}

/// A cloneable handle for resetting or stopping a [`Timer`] from elsewhere,
/// e.g. while the timer is owned by a [`Selector`](crate::Selector).
#[derive(Clone)]
pub struct TimerHandle {
  shared: Arc<TimerShared>,
}

impl Timer {
  /// Creates a timer that starts now; the first tick is due after `interval`.
  ///
  /// # Panics
  ///
  /// Panics if `interval` is zero.
  pub fn new(interval: Duration, policy: MissedTickPolicy) -> Self {
    Self::with_start_delay(interval, policy, Duration::ZERO)
  }

  /// Creates a timer whose first tick is due after `start_delay + interval`.
  ///
  /// # Panics
  ///
  /// Panics if `interval` is zero.
  pub fn with_start_delay(interval: Duration, policy: MissedTickPolicy, start_delay: Duration) -> Self {
    let timer = Self::unstarted(interval, policy);
    timer.shared.state.lock().restart(Instant::now(), start_delay);
    timer
  }

  /// Creates a timer that starts when it is first waited on or reset.
  ///
  /// # Panics
  ///
  /// Panics if `interval` is zero.
  pub fn unstarted(interval: Duration, policy: MissedTickPolicy) -> Self {
    assert!(!interval.is_zero(), "Timer interval must be positive");
    let state = TimerState {
      interval,
      policy,
      next_tick: None,
      stopped: true,
      drift: None,
    };
    Timer {
      shared: Arc::new(TimerShared {
        state: Mutex::new(state),
        waker: AtomicWaker::new(),
      }),
      sleep: None,
    }
  }

  pub fn handle(&self) -> TimerHandle {
    TimerHandle {
      shared: Arc::clone(&self.shared),
    }
  }

  pub fn interval(&self) -> Duration {
    self.shared.state.lock().interval
  }

  pub fn missed_tick_policy(&self) -> MissedTickPolicy {
    self.shared.state.lock().policy
  }

  /// Returns `true` if the timer was started and not stopped since.
  pub fn is_running(&self) -> bool {
    self.shared.is_running()
  }

  /// Restarts the timer from now, starting it if it was stopped or never started.
  pub fn reset(&self) {
    self.shared.reset(None, Duration::ZERO);
  }

  /// Restarts the timer so its next tick is due after `start_delay + interval`.
  pub fn reset_after(&self, start_delay: Duration) {
    self.shared.reset(None, start_delay);
  }

  /// Restarts the timer from now with a new interval.
  ///
  /// # Panics
  ///
  /// Panics if `interval` is zero.
  pub fn reset_interval(&self, interval: Duration) {
    assert!(!interval.is_zero(), "Timer interval must be positive");
    self.shared.reset(Some(interval), Duration::ZERO);
  }

  /// Stops the timer until the next reset.
  pub fn stop(&self) {
    self.shared.stop();
  }
}

impl TimerHandle {
  /// See [`Timer::reset`].
  pub fn reset(&self) {
    self.shared.reset(None, Duration::ZERO);
  }

  /// See [`Timer::reset_after`].
  pub fn reset_after(&self, start_delay: Duration) {
    self.shared.reset(None, start_delay);
  }

  /// See [`Timer::reset_interval`].
  ///
  /// # Panics
  ///
  /// Panics if `interval` is zero.
  pub fn reset_interval(&self, interval: Duration) {
    assert!(!interval.is_zero(), "Timer interval must be positive");
    self.shared.reset(Some(interval), Duration::ZERO);
  }

  /// See [`Timer::stop`].
  pub fn stop(&self) {
    self.shared.stop();
  }

  pub fn is_running(&self) -> bool {
    self.shared.is_running()
  }
}

impl Receiver for Timer {
  type Item = Duration;

  fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
    // Registered first, so a reset or stop racing with this poll wakes us.
    self.shared.waker.register(cx.waker());
    loop {
      let deadline = {
        let mut state = self.shared.state.lock();
        if state.drift.is_some() {
          return Poll::Ready(true);
        }
        let now = Instant::now();
        let next_tick = state.next_tick;
        let scheduled = match next_tick {
          Some(_) if state.stopped => return Poll::Ready(false),
          Some(next_tick) => next_tick,
          None => state.restart(now, Duration::ZERO),
        };
        if scheduled <= now {
          state.drift = Some(now - scheduled);
          state.next_tick = Some(state.policy.next_tick_time(state.interval, scheduled, now));
          return Poll::Ready(true);
        }
        scheduled
      };

      let sleep = self
        .sleep
        .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
      if sleep.deadline() != deadline {
        sleep.as_mut().reset(deadline);
      }
      ready!(sleep.as_mut().poll(cx));
    }
  }

  fn consume(&mut self) -> Result<Duration, ReceiverError> {
    let stopped = {
      let mut state = self.shared.state.lock();
      if let Some(drift) = state.drift.take() {
        return Ok(drift);
      }
      state.stopped
    };
    if stopped {
      return Err(ReceiverStoppedError::new(&*self).into());
    }
    Err(ReceiverError::not_ready(&*self))
  }

  fn close(&mut self) {
    self.shared.stop();
    tracing::debug!(timer = %self, "closed Timer");
  }

  fn cancel_ready(&mut self) {
    self.sleep = None;
  }
}

impl fmt::Display for Timer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Timer:{:?}", self.interval())
  }
}

impl fmt::Debug for Timer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.shared.state.lock();
    f.debug_struct("Timer")
      .field("interval", &state.interval)
      .field("policy", &state.policy)
      .field("running", &!state.stopped)
      .finish()
  }
}

impl fmt::Debug for TimerHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TimerHandle")
      .field("running", &self.shared.is_running())
      .finish()
  }
}
