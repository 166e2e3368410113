//! Per-sender debounce buffer for inbound messages.
//!
//! Webhook deliveries for one sender can arrive in rapid, unordered
//! bursts from concurrent requests. Each `append` pushes the fragment
//! into the sender's entry and restarts that sender's quiet-period
//! timer; only a timer that is still the latest one for its sender
//! consumes the entry and emits a [`Turn`] with the fragments
//! concatenated in arrival order. The pending timer doubles as the
//! entry's time to live — once a turn fires, the sender's state is gone
//! and the next message starts a fresh turn.
//!
//! The whole read-append-reschedule step happens under one lock, so two
//! near-simultaneous deliveries can never overwrite each other's
//! fragment.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default quiet period before a sender's buffered messages fire.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(120);

/// One coalesced conversational turn, ready for the answer pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub sender: String,
    pub text: String,
}

struct PendingTurn {
    fragments: Vec<String>,
    /// Ticket of the newest scheduled fire; older fires are stale.
    epoch: u64,
}

/// Keyed debounce arena. Cloning shares the underlying state.
#[derive(Clone)]
pub struct TurnBuffer {
    window: Duration,
    epochs: Arc<AtomicU64>,
    pending: Arc<Mutex<HashMap<String, PendingTurn>>>,
    fired: flume::Sender<Turn>,
}

impl TurnBuffer {
    /// Creates the buffer and the channel on which coalesced turns
    /// arrive once a sender has been quiet for `window`.
    pub fn new(window: Duration) -> (Self, flume::Receiver<Turn>) {
        let (fired, receiver) = flume::unbounded();
        (
            Self {
                window,
                epochs: Arc::new(AtomicU64::new(0)),
                pending: Arc::new(Mutex::new(HashMap::new())),
                fired,
            },
            receiver,
        )
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of senders currently holding buffered fragments.
    pub fn pending_senders(&self) -> usize {
        self.pending.lock().len()
    }

    /// Buffers a fragment and (re)schedules the sender's fire.
    pub fn append(&self, sender: &str, text: &str) {
        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut pending = self.pending.lock();
            let entry = pending.entry(sender.to_string()).or_insert_with(|| PendingTurn {
                fragments: Vec::new(),
                epoch,
            });
            entry.fragments.push(text.to_string());
            entry.epoch = epoch;
        }

        let buffer = self.clone();
        let sender = sender.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(buffer.window).await;
            buffer.fire_if_current(&sender, epoch);
        });
    }

    fn fire_if_current(&self, sender: &str, epoch: u64) {
        let fragments = {
            let mut pending = self.pending.lock();
            match pending.get(sender) {
                Some(entry) if entry.epoch == epoch => {
                    pending.remove(sender).map(|entry| entry.fragments)
                }
                // A newer append superseded this fire, or the entry
                // was already consumed.
                _ => None,
            }
        };
        let Some(fragments) = fragments else {
            return;
        };

        let fragment_count = fragments.len();
        let turn = Turn {
            sender: sender.to_string(),
            text: fragments.concat(),
        };
        tracing::debug!(sender = %turn.sender, fragments = fragment_count, "turn fired");
        if self.fired.send(turn).is_err() {
            tracing::warn!(sender, "turn receiver dropped, discarding coalesced turn");
        }
    }
}
