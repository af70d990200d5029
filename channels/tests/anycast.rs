mod common;
use common::*;

use futures_util::task::noop_waker;
use futures_util::{FutureExt, StreamExt};
use std::collections::HashSet;
use std::error::Error as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use switchboard::{Anycast, Receiver, ReceiverError, ReceiverExt};

#[tokio::test]
async fn anycast_smoke() {
  let channel = Anycast::new("smoke", 4);
  let sender = channel.new_sender();
  let mut receiver = channel.new_receiver();
  assert_eq!(channel.capacity(), 4);
  assert!(channel.is_empty());
  assert!(!channel.is_closed());

  sender.send("hello").await.unwrap();
  assert_eq!(channel.len(), 1);
  assert!(!channel.is_empty());
  assert_eq!(recv(&mut receiver).await.unwrap(), "hello");
  assert!(channel.is_empty());
}

#[tokio::test]
async fn anycast_send_after_draining_full_buffer_succeeds_immediately() {
  let channel = Anycast::new("full", 10);
  let sender = channel.new_sender();
  let mut receiver = channel.new_receiver();

  for i in 0..10 {
    sender.send(i).await.unwrap();
  }
  let blocked = tokio::time::timeout(SHORT_TIMEOUT, sender.send(100)).await;
  assert!(blocked.is_err(), "send on a full channel should block");

  for i in 0..10 {
    assert_eq!(recv(&mut receiver).await.unwrap(), i);
  }
  assert!(matches!(sender.send(100).now_or_never(), Some(Ok(()))));
  assert_eq!(recv(&mut receiver).await.unwrap(), 100);
}

#[tokio::test]
async fn anycast_full_buffer_blocks_then_resumes_in_order() {
  let channel = Anycast::new("full-resume", 10);
  let sender = channel.new_sender();
  let mut receiver = channel.new_receiver();

  for i in 0..10 {
    sender.send(i).await.unwrap();
  }
  assert_eq!(channel.len(), 10);

  // The 11th send cannot complete while the buffer is full.
  let blocked = tokio::time::timeout(SHORT_TIMEOUT, sender.send(100)).await;
  assert!(blocked.is_err(), "send on a full channel should block");
  assert_eq!(channel.len(), 10, "a cancelled send must not leave its message behind");

  let late_sender = sender.clone();
  let handle = tokio::spawn(async move { late_sender.send(100).await });

  for i in 0..10 {
    assert_eq!(recv(&mut receiver).await.unwrap(), i);
  }
  assert_eq!(recv(&mut receiver).await.unwrap(), 100);
  handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn anycast_receive_waits_for_sender() {
  let channel = Anycast::new("wait", 2);
  let sender = channel.new_sender();
  let mut receiver = channel.new_receiver();

  let handle = tokio::spawn(async move {
    tokio::time::sleep(SHORT_TIMEOUT).await;
    sender.send(5u8).await.unwrap();
  });
  assert_eq!(recv(&mut receiver).await.unwrap(), 5);
  handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn anycast_each_message_delivered_exactly_once() {
  let channel = Anycast::<usize>::new("conservation", 8);
  let num_senders = 4;
  let num_receivers = 3;
  let per_sender = ITEMS_MEDIUM;
  let total = num_senders * per_sender;

  let mut receivers = Vec::new();
  for _ in 0..num_receivers {
    let mut receiver = channel.new_receiver();
    receivers.push(tokio::spawn(async move {
      let mut seen = Vec::new();
      while let Ok(message) = receiver.receive().await {
        seen.push(message);
      }
      seen
    }));
  }

  let mut senders = Vec::new();
  for s in 0..num_senders {
    let sender = channel.new_sender();
    senders.push(tokio::spawn(async move {
      for i in 0..per_sender {
        sender.send(s * per_sender + i).await.unwrap();
      }
    }));
  }

  tokio::time::timeout(STRESS_TIMEOUT, async {
    for handle in senders {
      handle.await.unwrap();
    }
  })
  .await
  .expect("senders stalled");
  channel.close();

  let mut all = Vec::new();
  for handle in receivers {
    let seen = tokio::time::timeout(STRESS_TIMEOUT, handle)
      .await
      .expect("receivers stalled")
      .unwrap();
    all.extend(seen);
  }
  assert_eq!(all.len(), total);
  let unique: HashSet<usize> = all.into_iter().collect();
  assert_eq!(unique.len(), total);
}

#[tokio::test]
async fn anycast_single_sender_order_is_preserved_per_receiver() {
  let channel = Anycast::new("order", 3);
  let sender = channel.new_sender();
  let mut receiver = channel.new_receiver();

  let handle = tokio::spawn(async move {
    for i in 0..ITEMS_LOW {
      sender.send(i).await.unwrap();
    }
  });
  for i in 0..ITEMS_LOW {
    assert_eq!(recv(&mut receiver).await.unwrap(), i);
  }
  handle.await.unwrap();
}

#[tokio::test]
async fn anycast_close_drains_buffer_then_stops() {
  let channel = Anycast::new("drain", 4);
  let sender = channel.new_sender();
  let mut receiver = channel.new_receiver();

  sender.send(1).await.unwrap();
  sender.send(2).await.unwrap();
  channel.close();
  assert!(channel.is_closed());
  assert!(sender.is_closed());

  let err = sender.send(3).await.unwrap_err();
  assert_eq!(err.sender(), "Anycast:drain:Sender");
  assert_eq!(err.channel_closed().channel(), "Anycast:drain");
  assert_eq!(err.into_inner(), 3);

  assert_eq!(recv(&mut receiver).await.unwrap(), 1);
  assert_eq!(recv(&mut receiver).await.unwrap(), 2);

  let err = recv(&mut receiver).await.unwrap_err();
  assert!(err.is_stopped());
  assert_eq!(err.receiver(), receiver.to_string());
  match &err {
    ReceiverError::Stopped(stopped) => {
      let source = stopped.source().expect("stopped by a closed channel");
      assert_eq!(source.to_string(), "channel Anycast:drain is closed");
    }
    other => panic!("unexpected error {other:?}"),
  }

  // Stopped is terminal.
  assert!(!receiver.ready().await);
  assert!(recv(&mut receiver).await.unwrap_err().is_stopped());
}

#[tokio::test]
async fn anycast_close_fails_parked_senders_with_their_message() {
  let channel = Anycast::new("parked", 1);
  let sender = channel.new_sender();
  sender.send("kept").await.unwrap();

  let parked_sender = sender.clone();
  let handle = tokio::spawn(async move { parked_sender.send("returned").await });
  tokio::time::sleep(SHORT_TIMEOUT).await;
  assert!(!handle.is_finished());

  channel.close();
  let err = tokio::time::timeout(LONG_TIMEOUT, handle)
    .await
    .expect("parked sender was not woken by close")
    .unwrap()
    .unwrap_err();
  assert_eq!(err.into_inner(), "returned");

  let mut receiver = channel.new_receiver();
  assert_eq!(recv(&mut receiver).await.unwrap(), "kept");
  assert!(recv(&mut receiver).await.unwrap_err().is_stopped());
}

#[tokio::test]
async fn anycast_close_wakes_parked_receivers() {
  let channel = Anycast::<u32>::new("wake-on-close", 2);
  let mut handles = Vec::new();
  for _ in 0..3 {
    let mut receiver = channel.new_receiver();
    handles.push(tokio::spawn(async move { receiver.ready().await }));
  }
  tokio::time::sleep(SHORT_TIMEOUT).await;
  channel.close();
  for handle in handles {
    let active = tokio::time::timeout(LONG_TIMEOUT, handle).await.unwrap().unwrap();
    assert!(!active);
  }
}

#[test]
fn anycast_parked_receivers_are_served_oldest_first() {
  let channel = Anycast::new("fifo-receivers", 4);
  let sender = channel.new_sender();
  let waker = noop_waker();
  let mut cx = Context::from_waker(&waker);

  let mut first = channel.new_receiver();
  let mut second = channel.new_receiver();
  let mut third = channel.new_receiver();
  assert_eq!(first.poll_ready(&mut cx), Poll::Pending);
  assert_eq!(second.poll_ready(&mut cx), Poll::Pending);
  assert_eq!(third.poll_ready(&mut cx), Poll::Pending);

  for i in 1..=3 {
    sender.send(i).now_or_never().unwrap().unwrap();
  }

  // A receiver that was not waiting does not get ahead of the waiting ones.
  let mut latecomer = channel.new_receiver();
  assert_eq!(latecomer.poll_ready(&mut cx), Poll::Pending);

  assert_eq!(third.poll_ready(&mut cx), Poll::Ready(true));
  assert_eq!(third.consume().unwrap(), 3);
  assert_eq!(first.poll_ready(&mut cx), Poll::Ready(true));
  assert_eq!(first.consume().unwrap(), 1);
  assert_eq!(second.poll_ready(&mut cx), Poll::Ready(true));
  assert_eq!(second.consume().unwrap(), 2);
}

#[test]
fn anycast_parked_senders_are_admitted_oldest_first() {
  let channel = Anycast::new("fifo-senders", 1);
  let sender = channel.new_sender();
  let waker = noop_waker();
  let mut cx = Context::from_waker(&waker);

  sender.send(0).now_or_never().unwrap().unwrap();
  let mut first = sender.send(1);
  let mut second = sender.send(2);
  assert!(first.poll_unpin(&mut cx).is_pending());
  assert!(second.poll_unpin(&mut cx).is_pending());

  // A new send must queue behind the parked ones even once space frees up.
  let mut receiver = channel.new_receiver();
  assert_eq!(receiver.receive().now_or_never().unwrap().unwrap(), 0);
  assert!(sender.send(3).now_or_never().is_none());

  assert!(matches!(first.poll_unpin(&mut cx), Poll::Ready(Ok(()))));
  assert!(second.poll_unpin(&mut cx).is_pending());
  assert_eq!(receiver.receive().now_or_never().unwrap().unwrap(), 1);
  assert!(matches!(second.poll_unpin(&mut cx), Poll::Ready(Ok(()))));
  assert_eq!(receiver.receive().now_or_never().unwrap().unwrap(), 2);
}

#[tokio::test]
async fn anycast_cancelled_receive_leaves_no_reservation() {
  let channel = Anycast::new("cancel-receive", 2);
  let sender = channel.new_sender();
  let mut impatient = channel.new_receiver();
  let mut patient = channel.new_receiver();

  assert_nothing_received(&mut impatient).await;
  sender.send(7).await.unwrap();
  assert_eq!(recv(&mut patient).await.unwrap(), 7);
}

#[test]
fn anycast_cancelled_receive_returns_handed_off_message() {
  let channel = Anycast::new("cancel-handoff", 2);
  let sender = channel.new_sender();
  let waker = noop_waker();
  let mut cx = Context::from_waker(&waker);

  let mut first = channel.new_receiver();
  let mut second = channel.new_receiver();
  assert_eq!(first.poll_ready(&mut cx), Poll::Pending);
  assert_eq!(second.poll_ready(&mut cx), Poll::Pending);

  sender.send(1).now_or_never().unwrap().unwrap();
  // The message is reserved for `first`; withdrawing passes it on to `second`.
  first.cancel_ready();
  assert_eq!(second.poll_ready(&mut cx), Poll::Ready(true));
  assert_eq!(second.consume().unwrap(), 1);
  assert_eq!(channel.len(), 0);
}

#[tokio::test]
async fn anycast_cancelled_send_withdraws_message() {
  let channel = Anycast::new("cancel-send", 1);
  let sender = channel.new_sender();
  let mut receiver = channel.new_receiver();

  sender.send(1).await.unwrap();
  assert!(tokio::time::timeout(SHORT_TIMEOUT, sender.send(2)).await.is_err());

  assert_eq!(recv(&mut receiver).await.unwrap(), 1);
  assert_nothing_received(&mut receiver).await;
  assert!(channel.is_empty());
}

#[test]
fn anycast_consume_without_ready_is_a_usage_error() {
  let channel = Anycast::<u8>::new("usage", 1);
  let mut receiver = channel.new_receiver();
  let err = receiver.consume().unwrap_err();
  assert!(matches!(err, ReceiverError::NotReady { .. }));
  assert!(!err.is_stopped());
}

#[tokio::test]
async fn anycast_closing_one_receiver_leaves_others_working() {
  let channel = Anycast::new("close-receiver", 4);
  let sender = channel.new_sender();
  let mut closed = channel.new_receiver();
  let mut open = channel.new_receiver();

  closed.close();
  assert!(closed.is_closed());
  assert!(!channel.is_closed());
  assert!(!closed.ready().await);
  let err = closed.consume().unwrap_err();
  assert!(err.is_stopped());
  assert_eq!(err.receiver(), closed.to_string());

  sender.send(9).await.unwrap();
  assert_eq!(recv(&mut open).await.unwrap(), 9);
}

#[tokio::test]
async fn anycast_stream_ends_when_channel_drains() {
  let channel = Anycast::new("stream", 8);
  let sender = channel.new_sender();
  let receiver = channel.new_receiver();
  for i in 0..5 {
    sender.send(i).await.unwrap();
  }
  channel.close();

  let collected: Vec<u32> = receiver
    .into_stream()
    .map(|message| message.unwrap())
    .collect()
    .await;
  assert_eq!(collected, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn anycast_endpoints_outlive_channel_owner() {
  let channel = Anycast::new("owner", 2);
  let sender = channel.new_sender();
  let mut receiver = channel.new_receiver();
  drop(channel);

  sender.send(1).await.unwrap();
  assert_eq!(recv(&mut receiver).await.unwrap(), 1);
}

#[tokio::test]
async fn anycast_dropped_messages_are_released() {
  let drop_count = Arc::new(AtomicUsize::new(0));
  struct DropCounter(Arc<AtomicUsize>);
  impl Drop for DropCounter {
    fn drop(&mut self) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  let channel = Anycast::new("drops", 4);
  let sender = channel.new_sender();
  let mut receiver = channel.new_receiver();
  sender.send(DropCounter(drop_count.clone())).await.unwrap();
  sender.send(DropCounter(drop_count.clone())).await.unwrap();
  assert!(receiver.ready().await);

  drop(receiver);
  drop(sender);
  drop(channel);
  assert_eq!(drop_count.load(Ordering::SeqCst), 2);
}

#[test]
fn anycast_display_names() {
  let channel = Anycast::<u8>::new("jobs", 1);
  assert_eq!(channel.to_string(), "Anycast:jobs");
  assert_eq!(channel.name(), "jobs");
  assert_eq!(channel.capacity(), 1);
  assert_eq!(channel.new_sender().to_string(), "Anycast:jobs:Sender");
  assert_eq!(channel.new_receiver().to_string(), "Anycast:jobs:Receiver-1");
  assert_eq!(channel.new_receiver().to_string(), "Anycast:jobs:Receiver-2");
}

#[test]
#[should_panic(expected = "capacity must be at least 1")]
fn anycast_zero_capacity_panics() {
  let _ = Anycast::<u8>::new("zero", 0);
}
