//! Event plumbing for the live renderer.
//!
//! Two lightweight tasks per channel translate queue reads into events and
//! synthesize a close event when a queue ends; a dedicated thread feeds
//! terminal input into the same bus. Nothing here touches view state.

use ratatui::crossterm::event::{self as ct, KeyEvent, KeyEventKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use sweep_core::ChannelSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Output,
    Errors,
}

#[derive(Debug)]
pub enum Event {
    /// A chunk arrived on repo `index`'s output queue (possibly empty:
    /// the worker's start signal).
    Output { index: usize, chunk: Vec<u8> },
    /// An error arrived on repo `index`'s error queue.
    Error { index: usize, message: String },
    /// A queue was observed closed; the second one completes the repo.
    Closed { index: usize, queue: Queue },
    Key(KeyEvent),
    Resize,
}

/// Spawn the per-channel drainer tasks. Each takes its receiver out of the
/// sink; a sink whose queues were already taken just reports both closed.
pub fn spawn_drainers(channels: &mut [ChannelSink], tx: &UnboundedSender<Event>) {
    for (index, sink) in channels.iter_mut().enumerate() {
        let (out, err) = sink.take_queues();

        match out {
            Some(mut rx) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    while let Some(chunk) = rx.recv().await {
                        if tx.send(Event::Output { index, chunk }).is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Event::Closed {
                        index,
                        queue: Queue::Output,
                    });
                });
            }
            None => {
                let _ = tx.send(Event::Closed {
                    index,
                    queue: Queue::Output,
                });
            }
        }

        match err {
            Some(mut rx) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    while let Some(error) = rx.recv().await {
                        let message = format!("{error:#}");
                        if tx.send(Event::Error { index, message }).is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Event::Closed {
                        index,
                        queue: Queue::Errors,
                    });
                });
            }
            None => {
                let _ = tx.send(Event::Closed {
                    index,
                    queue: Queue::Errors,
                });
            }
        }
    }
}

/// Read terminal input on a plain thread, forwarding key presses and
/// resizes. The thread exits when told to stop or when the bus is gone.
pub fn spawn_input_thread(tx: UnboundedSender<Event>) -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    std::thread::spawn(move || {
        while !flag.load(Ordering::Relaxed) {
            if !ct::poll(Duration::from_millis(100)).unwrap_or(false) {
                continue;
            }
            match ct::read() {
                Ok(ct::Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if tx.send(Event::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(ct::Event::Resize(_, _)) => {
                    if tx.send(Event::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
    stop
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_core::{CancellationToken, Channel};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn drainers_translate_queues_into_events() {
        let (chan, sink) = Channel::new("r1", 8, None, CancellationToken::new());
        let mut sinks = vec![sink];
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_drainers(&mut sinks, &tx);

        chan.write(b"data").await;
        chan.write_error(anyhow::anyhow!("boom")).await;
        chan.close();

        let mut got_output = false;
        let mut got_error = false;
        let mut closes = 0;
        while closes < 2 {
            match rx.recv().await.unwrap() {
                Event::Output { index: 0, chunk } => {
                    assert_eq!(chunk, b"data");
                    got_output = true;
                }
                Event::Error { index: 0, message } => {
                    assert_eq!(message, "boom");
                    got_error = true;
                }
                Event::Closed { index: 0, .. } => closes += 1,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(got_output && got_error);
    }

    #[tokio::test]
    async fn taken_sink_reports_immediate_close() {
        let (chan, mut sink) = Channel::new("r1", 8, None, CancellationToken::new());
        let _ = sink.take_queues();
        chan.close();

        let mut sinks = vec![sink];
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_drainers(&mut sinks, &tx);

        let mut closes = 0;
        for _ in 0..2 {
            if let Event::Closed { index: 0, .. } = rx.recv().await.unwrap() {
                closes += 1;
            }
        }
        assert_eq!(closes, 2);
    }
}
