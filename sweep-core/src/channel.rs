//! Per-repository output channel.
//!
//! Each repo in a run gets one [`Channel`] (written by its worker and the
//! worker's subprocesses) paired with one [`ChannelSink`] (read by exactly
//! one render handler). The output queue is bounded, so a lagging handler
//! backpressures the subprocess; the channel also owns the repo's
//! concurrency slot, released when the channel closes.

use anyhow::{bail, Context, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

const ERROR_QUEUE_CAPACITY: usize = 4;

/// Worker-side half: byte writer, error writer, slot ownership.
pub struct Channel {
    name: String,
    out_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    err_tx: Mutex<Option<mpsc::Sender<anyhow::Error>>>,
    semaphore: Option<Arc<Semaphore>>,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
    cancel: CancellationToken,
}

/// Render-side half: the receiving ends of both queues.
pub struct ChannelSink {
    name: String,
    out: Option<mpsc::Receiver<Vec<u8>>>,
    err: Option<mpsc::Receiver<anyhow::Error>>,
}

impl Channel {
    /// Create a channel pair. `buffer` bounds the output queue; pass no
    /// semaphore to make `start` a no-op (useful in tests).
    pub fn new(
        name: &str,
        buffer: usize,
        semaphore: Option<Arc<Semaphore>>,
        cancel: CancellationToken,
    ) -> (Channel, ChannelSink) {
        let (out_tx, out_rx) = mpsc::channel(buffer.max(1));
        let (err_tx, err_rx) = mpsc::channel(ERROR_QUEUE_CAPACITY);
        let channel = Channel {
            name: name.to_string(),
            out_tx: Mutex::new(Some(out_tx)),
            err_tx: Mutex::new(Some(err_tx)),
            semaphore,
            permit: Mutex::new(None),
            cancel,
        };
        let sink = ChannelSink {
            name: name.to_string(),
            out: Some(out_rx),
            err: Some(err_rx),
        };
        (channel, sink)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire `weight` (at least 1) from the shared semaphore, honoring
    /// cancellation. Without a semaphore this returns immediately.
    pub async fn start(&self, weight: u32) -> Result<()> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(());
        };
        let weight = weight.max(1);
        if self.cancel.is_cancelled() {
            bail!("cancelled before acquiring a slot");
        }
        let permit = tokio::select! {
            _ = self.cancel.cancelled() => bail!("cancelled before acquiring a slot"),
            acquired = semaphore.clone().acquire_many_owned(weight) => {
                acquired.context("concurrency limiter closed")?
            }
        };
        *self.permit.lock().unwrap() = Some(permit);
        Ok(())
    }

    /// Enqueue a copy of `p`; the caller may reuse its buffer immediately.
    /// Blocks while the output queue is full. A zero-byte write is a no-op.
    pub async fn write(&self, p: &[u8]) -> usize {
        if p.is_empty() {
            return 0;
        }
        if let Some(tx) = self.out_sender() {
            let _ = tx.send(p.to_vec()).await;
        }
        p.len()
    }

    /// Enqueue a string with a trailing newline. Empty string is a no-op.
    pub async fn write_line(&self, s: &str) {
        if s.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(b'\n');
        if let Some(tx) = self.out_sender() {
            let _ = tx.send(bytes).await;
        }
    }

    pub async fn write_error(&self, err: anyhow::Error) {
        let tx = self.err_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(err).await;
        }
    }

    /// Enqueue an empty chunk so the render side can flip the repo from
    /// waiting to active before any real output arrives. Distinct from
    /// `write`, which treats empty input as a no-op.
    pub(crate) async fn signal_start(&self) {
        if let Some(tx) = self.out_sender() {
            let _ = tx.send(Vec::new()).await;
        }
    }

    /// Close both queues and release any held slot. A channel that never
    /// acquired a slot closes cleanly without touching the semaphore.
    pub fn close(&self) {
        self.out_tx.lock().unwrap().take();
        self.err_tx.lock().unwrap().take();
        self.permit.lock().unwrap().take();
    }

    fn out_sender(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.out_tx.lock().unwrap().clone()
    }
}

impl ChannelSink {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next output chunk, or `None` once the queue is drained and closed.
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        match &mut self.out {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Next error, or `None` once the queue is drained and closed.
    pub async fn next_error(&mut self) -> Option<anyhow::Error> {
        match &mut self.err {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Move the raw receivers out, for consumers that drain the two queues
    /// from separate tasks. Returns `None` halves if already taken.
    pub fn take_queues(
        &mut self,
    ) -> (
        Option<mpsc::Receiver<Vec<u8>>>,
        Option<mpsc::Receiver<anyhow::Error>>,
    ) {
        (self.out.take(), self.err.take())
    }
}
