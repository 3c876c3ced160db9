use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// How long a remembered position stays valid after its last write.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Time-bounded memory of the last index a client held in a sub-queue, used
/// to restore position after a disconnection-triggered removal. Entries
/// expire lazily on lookup, so no eviction task is needed. This is an
/// ordering hint only; membership is never derived from it.
#[derive(Debug)]
pub struct RememberedPositions {
    entries: HashMap<Uuid, (usize, Instant)>,
    ttl: Duration,
}

impl RememberedPositions {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Record the client's index. Overwriting restarts the expiry window.
    pub fn remember(&mut self, client: Uuid, index: usize, now: Instant) {
        self.entries.insert(client, (index, now));
    }

    /// Last known index for the client, dropping the entry if it expired.
    pub fn recall(&mut self, client: Uuid, now: Instant) -> Option<usize> {
        match self.entries.get(&client) {
            Some((index, written)) if now.duration_since(*written) < self.ttl => Some(*index),
            Some(_) => {
                self.entries.remove(&client);
                None
            }
            None => None,
        }
    }
}

impl Default for RememberedPositions {
    fn default() -> Self {
        Self::new()
    }
}
