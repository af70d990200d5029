// examples/workers.rs
use futures_util::StreamExt;
use std::time::Duration;
use switchboard::{merge, Anycast, Broadcast, Event, ReceiverExt, Selector};

#[tokio::main]
async fn main() {
  println!("--- Anycast: job queue shared by three workers ---");
  {
    let jobs = Anycast::<u32>::new("jobs", 4);
    let mut workers = Vec::new();
    for id in 0..3 {
      let mut receiver = jobs.new_receiver();
      workers.push(tokio::spawn(async move {
        let mut handled = 0;
        while let Ok(job) = receiver.receive().await {
          println!("[worker {}] job {}", id, job);
          handled += 1;
        }
        handled
      }));
    }

    let sender = jobs.new_sender();
    for job in 0..12 {
      // Waits whenever all four buffer slots are taken.
      sender.send(job).await.unwrap();
    }
    jobs.close();

    let mut total = 0;
    for worker in workers {
      total += worker.await.unwrap();
    }
    println!("all {} jobs handled", total);
  }

  println!("\n--- Broadcast + merge: two feeds, one reader ---");
  {
    let temperatures = Broadcast::<f32>::new("temperature");
    let pressures = Broadcast::<f32>::new("pressure");
    let readings = merge([
      temperatures.new_receiver().map(|t| format!("temperature {t:.1}")).boxed(),
      pressures.new_receiver().map(|p| format!("pressure {p:.0}")).boxed(),
    ])
    .unwrap();

    temperatures.new_sender().send(21.5).await.unwrap();
    pressures.new_sender().send(1013.0).await.unwrap();
    temperatures.new_sender().send(22.0).await.unwrap();
    temperatures.close();
    pressures.close();

    let mut stream = readings.into_stream();
    while let Some(reading) = stream.next().await {
      println!("{}", reading.unwrap());
    }
  }

  println!("\n--- Selector: data until a stop event ---");
  {
    let ticks = Anycast::<u64>::new("ticks", 8);
    let stop = Event::new("stop");
    let stop_handle = stop.handle();

    let sender = ticks.new_sender();
    tokio::spawn(async move {
      for tick in 0.. {
        if sender.send(tick).await.is_err() {
          break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
    });
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(55)).await;
      stop_handle.set();
    });

    let mut selector = Selector::new();
    let tick_id = selector.add(ticks.new_receiver());
    let stop_id = selector.add(stop);

    while let Some(selected) = selector.next().await {
      let mut selected = selected.unwrap();
      if let Some(tick) = selected.take(&tick_id) {
        println!("tick {}", tick.unwrap());
      } else if selected.take(&stop_id).is_some() {
        println!("stop requested");
        ticks.close();
        break;
      }
    }
  }
}
