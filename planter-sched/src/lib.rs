use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};

/// Identifies one scheduled firing. A ticket whose generation no longer
/// matches the pending timer for its key is stale and must be ignored.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimerTicket<K> {
    pub key: K,
    pub generation: u64,
}

struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// One-shot timers keyed by `K`, owned by a single reactor.
///
/// A timer delivers its event into the owner's channel; the owner then calls
/// [`TimerSet::fire`] to claim it. Scheduling a key again replaces (and
/// aborts) the previous timer. Dropping the set aborts everything pending.
pub struct TimerSet<K: Eq + Hash + Clone> {
    timers: HashMap<K, PendingTimer>,
    next_generation: u64,
}

impl<K: Eq + Hash + Clone> Default for TimerSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> TimerSet<K> {
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn schedule<T, F>(
        &mut self,
        key: K,
        delay: Duration,
        tx: mpsc::Sender<T>,
        event: F,
    ) -> TimerTicket<K>
    where
        T: Send + 'static,
        F: FnOnce(TimerTicket<K>) -> T,
    {
        self.cancel(&key);
        self.next_generation += 1;
        let ticket = TimerTicket {
            key: key.clone(),
            generation: self.next_generation,
        };
        let msg = event(ticket.clone());
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the owner shut down; nothing to deliver to.
            let _ = tx.send(msg).await;
        });
        self.timers.insert(
            key,
            PendingTimer {
                generation: ticket.generation,
                handle,
            },
        );
        ticket
    }

    /// Claim a delivered ticket. Returns false for stale or cancelled tickets.
    pub fn fire(&mut self, ticket: &TimerTicket<K>) -> bool {
        match self.timers.get(&ticket.key) {
            Some(p) if p.generation == ticket.generation => {
                self.timers.remove(&ticket.key);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        match self.timers.remove(key) {
            Some(p) => {
                p.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, p) in self.timers.drain() {
            p.handle.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.timers.contains_key(key)
    }
}

impl<K: Eq + Hash + Clone> Drop for TimerSet<K> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
