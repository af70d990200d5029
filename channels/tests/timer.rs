#![cfg(feature = "timer")]

mod common;
use common::*;

use futures_util::StreamExt;
use std::time::Duration;
use switchboard::{Anycast, MissedTickPolicy, Receiver, ReceiverExt, Selector, Timer};
use tokio::time::{sleep, Instant};

const INTERVAL: Duration = Duration::from_secs(1);

fn ms(millis: u64) -> Duration {
  Duration::from_millis(millis)
}

/// Receives one tick and checks the drift and the time it was delivered at.
async fn expect_tick(timer: &mut Timer, start: Instant, at: Duration, drift: Duration) {
  let got = timer.receive().await.unwrap();
  assert_eq!(start.elapsed(), at, "tick delivered at the wrong time");
  assert_eq!(got, drift, "tick delivered with the wrong drift");
}

#[tokio::test(start_paused = true)]
async fn timer_trigger_all_missed_bursts_to_catch_up() {
  let start = Instant::now();
  let mut timer = Timer::new(INTERVAL, MissedTickPolicy::TriggerAllMissed);

  expect_tick(&mut timer, start, ms(1_000), ms(0)).await;

  sleep(ms(1_100)).await;
  expect_tick(&mut timer, start, ms(2_100), ms(100)).await;
  expect_tick(&mut timer, start, ms(3_000), ms(0)).await;

  sleep(ms(2_000)).await;
  expect_tick(&mut timer, start, ms(5_000), ms(1_000)).await;
  expect_tick(&mut timer, start, ms(5_000), ms(0)).await;

  sleep(ms(5_100)).await;
  for missed in (0..5).rev() {
    expect_tick(&mut timer, start, ms(10_100), ms(missed * 1_000 + 100)).await;
  }
  expect_tick(&mut timer, start, ms(11_000), ms(0)).await;
}

#[tokio::test(start_paused = true)]
async fn timer_skip_missed_and_resync_stays_aligned() {
  let start = Instant::now();
  let mut timer = Timer::new(INTERVAL, MissedTickPolicy::SkipMissedAndResync);

  expect_tick(&mut timer, start, ms(1_000), ms(0)).await;

  sleep(ms(1_100)).await;
  expect_tick(&mut timer, start, ms(2_100), ms(100)).await;
  expect_tick(&mut timer, start, ms(3_000), ms(0)).await;

  sleep(ms(2_000)).await;
  expect_tick(&mut timer, start, ms(5_000), ms(1_000)).await;
  expect_tick(&mut timer, start, ms(6_000), ms(0)).await;

  sleep(ms(5_800)).await;
  expect_tick(&mut timer, start, ms(11_800), ms(4_800)).await;
  expect_tick(&mut timer, start, ms(12_000), ms(0)).await;
  expect_tick(&mut timer, start, ms(13_000), ms(0)).await;
}

#[tokio::test(start_paused = true)]
async fn timer_skip_missed_and_drift_shifts_after_tolerance() {
  let start = Instant::now();
  let policy = MissedTickPolicy::SkipMissedAndDrift {
    delay_tolerance: ms(100),
  };
  let mut timer = Timer::new(INTERVAL, policy);

  expect_tick(&mut timer, start, ms(1_000), ms(0)).await;

  // Late by exactly the tolerance: no drift.
  sleep(ms(1_100)).await;
  expect_tick(&mut timer, start, ms(2_100), ms(100)).await;
  expect_tick(&mut timer, start, ms(3_000), ms(0)).await;

  // Late by more than the tolerance: the schedule shifts.
  sleep(ms(1_200)).await;
  expect_tick(&mut timer, start, ms(4_200), ms(200)).await;
  expect_tick(&mut timer, start, ms(5_200), ms(0)).await;

  sleep(ms(2_000)).await;
  expect_tick(&mut timer, start, ms(7_200), ms(1_000)).await;
  expect_tick(&mut timer, start, ms(8_200), ms(0)).await;

  sleep(ms(5_101)).await;
  expect_tick(&mut timer, start, ms(13_301), ms(4_101)).await;
  expect_tick(&mut timer, start, ms(14_301), ms(0)).await;
}

#[tokio::test(start_paused = true)]
async fn timer_reset_with_new_interval() {
  let start = Instant::now();
  let mut timer = Timer::new(INTERVAL, MissedTickPolicy::TriggerAllMissed);

  expect_tick(&mut timer, start, ms(1_000), ms(0)).await;
  timer.reset_interval(ms(2_000));
  assert_eq!(timer.interval(), ms(2_000));
  expect_tick(&mut timer, start, ms(3_000), ms(0)).await;
  expect_tick(&mut timer, start, ms(5_000), ms(0)).await;
}

#[tokio::test(start_paused = true)]
async fn timer_reset_interrupts_a_waiting_receive() {
  let mut slow = Timer::new(ms(5_000), MissedTickPolicy::TriggerAllMissed);
  let mut fast = Timer::new(ms(1_000), MissedTickPolicy::TriggerAllMissed);
  let mut late = Timer::new(ms(4_000), MissedTickPolicy::TriggerAllMissed);
  let slow_handle = slow.handle();
  let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();

  let tx = order_tx.clone();
  let resetter = tokio::spawn(async move {
    fast.receive().await.unwrap();
    tx.send("fast").unwrap();
    slow_handle.reset_interval(ms(1_000));
    fast.stop();
  });
  let tx = order_tx.clone();
  let slow_task = tokio::spawn(async move {
    slow.receive().await.unwrap();
    tx.send("slow").unwrap();
  });
  let late_task = tokio::spawn(async move {
    late.receive().await.unwrap();
    order_tx.send("late").unwrap();
  });

  resetter.await.unwrap();
  slow_task.await.unwrap();
  late_task.await.unwrap();

  let mut order = Vec::new();
  while let Ok(name) = order_rx.try_recv() {
    order.push(name);
  }
  assert_eq!(order, vec!["fast", "slow", "late"]);
}

#[tokio::test(start_paused = true)]
async fn timer_close_stops_until_reset() {
  let start = Instant::now();
  let mut timer = Timer::new(INTERVAL, MissedTickPolicy::TriggerAllMissed);

  timer.close();
  assert!(!timer.is_running());
  assert!(!timer.ready().await);
  let err = timer.receive().await.unwrap_err();
  assert!(err.is_stopped());
  assert_eq!(err.receiver(), "Timer:1s");

  sleep(ms(500)).await;
  timer.reset();
  expect_tick(&mut timer, start, ms(1_500), ms(0)).await;
}

#[tokio::test(start_paused = true)]
async fn timer_stop_still_delivers_a_ready_tick() {
  let mut timer = Timer::new(INTERVAL, MissedTickPolicy::TriggerAllMissed);
  assert!(timer.ready().await);
  timer.stop();
  assert_eq!(timer.consume().unwrap(), ms(0));
  assert!(timer.consume().unwrap_err().is_stopped());
}

#[tokio::test(start_paused = true)]
async fn timer_unstarted_starts_on_first_wait() {
  let mut timer = Timer::unstarted(INTERVAL, MissedTickPolicy::TriggerAllMissed);
  assert!(!timer.is_running());
  sleep(ms(5_000)).await;

  let start = Instant::now();
  expect_tick(&mut timer, start, ms(1_000), ms(0)).await;
  assert!(timer.is_running());
}

#[tokio::test(start_paused = true)]
async fn timer_start_delay_postpones_first_tick() {
  let start = Instant::now();
  let mut timer = Timer::with_start_delay(INTERVAL, MissedTickPolicy::TriggerAllMissed, ms(2_000));
  expect_tick(&mut timer, start, ms(3_000), ms(0)).await;
  expect_tick(&mut timer, start, ms(4_000), ms(0)).await;
}

#[tokio::test(start_paused = true)]
async fn timer_consume_without_ready_is_not_ready() {
  let mut timer = Timer::new(INTERVAL, MissedTickPolicy::TriggerAllMissed);
  let err = timer.consume().unwrap_err();
  assert!(!err.is_stopped());
  assert_nothing_received(&mut timer).await;
}

#[tokio::test(start_paused = true)]
async fn timer_as_select_timeout_is_reset_by_data() {
  let start = Instant::now();
  let data = Anycast::<u32>::new("data", 4);
  let sender = data.new_sender();
  let timeout = Timer::new(
    INTERVAL,
    MissedTickPolicy::SkipMissedAndDrift {
      delay_tolerance: Duration::ZERO,
    },
  );
  let timeout_handle = timeout.handle();

  tokio::spawn(async move {
    for i in 0..3 {
      sleep(ms(500)).await;
      sender.send(i).await.unwrap();
    }
  });

  let mut selector = Selector::new();
  let data_id = selector.add(data.new_receiver());
  let timeout_id = selector.add(timeout);

  let mut received = Vec::new();
  let drift = loop {
    let mut selected = tokio::time::timeout(STRESS_TIMEOUT, selector.next())
      .await
      .expect("selector stalled")
      .unwrap()
      .unwrap();
    if let Some(message) = selected.take(&data_id) {
      received.push(message.unwrap());
      timeout_handle.reset();
    } else if let Some(drift) = selected.take(&timeout_id) {
      break drift.unwrap();
    }
  };

  assert_eq!(received, vec![0, 1, 2]);
  assert_eq!(drift, ms(0));
  assert_eq!(start.elapsed(), ms(2_500));
}
