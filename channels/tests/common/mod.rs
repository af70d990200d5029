#![allow(dead_code)]

use std::time::Duration;

use switchboard::{Receiver, ReceiverError, ReceiverExt};

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(100);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(3);
pub const STRESS_TIMEOUT: Duration = Duration::from_secs(15);
pub const ITEMS_LOW: usize = 50;
pub const ITEMS_MEDIUM: usize = 200;
pub const ITEMS_HIGH: usize = 1000;

/// Receives with a `LONG_TIMEOUT` guard, failing the test if nothing arrives.
pub async fn recv<R: Receiver>(receiver: &mut R) -> Result<R::Item, ReceiverError> {
  tokio::time::timeout(LONG_TIMEOUT, receiver.receive())
    .await
    .expect("receive timed out")
}

/// Asserts that `receive()` stays pending for `SHORT_TIMEOUT`.
pub async fn assert_nothing_received<R: Receiver>(receiver: &mut R) {
  let outcome = tokio::time::timeout(SHORT_TIMEOUT, receiver.receive()).await;
  assert!(outcome.is_err(), "receiver {} unexpectedly produced a result", receiver);
}
