use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::AnnotatedFramePair;

/// Bounded hand-off depth between the frame-processing context and the
/// display consumer. Deep enough to ride out a transient render stall,
/// small enough to bound memory.
pub const RELAY_CAPACITY: usize = 21;

/// Producer half of the frame relay. `push` applies backpressure: it blocks
/// the processing thread while the queue is full, so call it from a plain
/// thread or `spawn_blocking`, never from an async task.
pub struct RelaySender {
    tx: mpsc::Sender<AnnotatedFramePair>,
}

/// Consumer half. `pop` never blocks; transient emptiness is normal.
pub struct RelayReceiver {
    rx: mpsc::Receiver<AnnotatedFramePair>,
}

pub fn frame_relay() -> (RelaySender, RelayReceiver) {
    let (tx, rx) = mpsc::channel(RELAY_CAPACITY);
    (RelaySender { tx }, RelayReceiver { rx })
}

impl RelaySender {
    /// Blocks while the relay already holds `RELAY_CAPACITY` frames.
    /// Fails only when the consumer has gone away entirely.
    pub fn push(&self, frame: AnnotatedFramePair) -> anyhow::Result<()> {
        self.tx
            .blocking_send(frame)
            .map_err(|_| anyhow::anyhow!("frame relay consumer disconnected"))
    }
}

impl RelayReceiver {
    /// Oldest queued frame, or `None` if the relay is currently empty.
    pub fn pop(&mut self) -> Option<AnnotatedFramePair> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
