pub mod remembered;
pub mod selector;
pub mod sub_queue;

pub use remembered::RememberedPositions;
pub use selector::WrrSelector;
pub use sub_queue::SubQueue;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ClientRegistry;
use crate::collab::{Messenger, MoveOutcome, Transport};
use crate::config::QueueSettings;
use crate::error::EnqueueError;
use crate::messages;
use crate::tier::{self, PriorityTier, Weighted};

/// A dispatch attempt handed off to the transport. The core polls `rx` and
/// routes the outcome back through [`DispatchQueue::finish_dispatch`], so
/// the continuation runs inside the single-threaded mutation domain.
#[derive(Debug)]
pub struct InFlightMove {
    pub client: Uuid,
    /// Index of the sub-queue the entry was popped from, for the undo path.
    pub sub_queue: usize,
    pub rx: oneshot::Receiver<MoveOutcome>,
}

/// What a dispatch tick did.
#[derive(Debug)]
pub enum TickResult {
    /// Preconditions not met; nothing happened.
    Idle,
    /// The very first eligible tick was absorbed; the caller should schedule
    /// a delayed retry.
    FirstCycleDeferred,
    /// An entry was popped but discarded without an attempt (client gone, or
    /// already at the destination).
    Discarded,
    /// A move attempt is in flight.
    Attempted(InFlightMove),
}

/// The admission queue for one destination: tiered sub-queues, the weighted
/// round-robin selector that picks the serving tier, and the remembered
/// positions that protect clients across reconnects. Lives for the process
/// lifetime; sub-queues are created once and only mutated.
pub struct DispatchQueue {
    destination: String,
    display_name: String,
    /// Descending by weight; the last (lowest-weight) one is the fallback.
    sub_queues: Vec<SubQueue>,
    selector: WrrSelector,
    remembered: RememberedPositions,
    last_dispatch: Option<Instant>,
    max_capacity: u32,
    first_cycle: bool,
    settings: QueueSettings,
    transport: Arc<dyn Transport>,
    messenger: Arc<dyn Messenger>,
}

impl DispatchQueue {
    pub fn new(
        destination: impl Into<String>,
        tiers: &[PriorityTier],
        settings: QueueSettings,
        transport: Arc<dyn Transport>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let mut tiers: Vec<PriorityTier> = if tiers.is_empty() {
            vec![PriorityTier::none()]
        } else {
            tiers.to_vec()
        };
        tiers.sort_by(tier::descending);

        let sub_queues: Vec<SubQueue> = tiers
            .iter()
            .map(|t| SubQueue::new(t.name(), t.weight()))
            .collect();
        let selector = WrrSelector::new(sub_queues.iter().map(|q| q.weight()).collect());

        let destination = destination.into();
        let display_name = display_name(&destination);
        Self {
            destination,
            display_name,
            sub_queues,
            selector,
            remembered: RememberedPositions::new(),
            last_dispatch: None,
            max_capacity: 0,
            first_cycle: true,
            settings,
            transport,
            messenger,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    pub fn sub_queues(&self) -> &[SubQueue] {
        &self.sub_queues
    }

    pub fn contains(&self, client: Uuid) -> bool {
        self.sub_queues.iter().any(|sq| sq.contains(client))
    }

    /// The client's index within its sub-queue, if queued here.
    pub fn position_of(&self, client: Uuid) -> Option<usize> {
        self.sub_queues.iter().find_map(|sq| sq.position_of(client))
    }

    pub fn total_waiting(&self) -> usize {
        self.sub_queues.iter().map(SubQueue::len).sum()
    }

    pub fn has_waiting(&self) -> bool {
        self.sub_queues.iter().any(|sq| !sq.is_empty())
    }

    /// First tier (in descending-weight order) whose weight the client's
    /// priority weight meets, else the fallback tier.
    fn sub_queue_for(&self, weight: i32) -> usize {
        self.sub_queues
            .iter()
            .position(|sq| weight >= sq.weight())
            .unwrap_or(self.sub_queues.len() - 1)
    }

    /// Splice a client into its tier. The caller (the core) has already
    /// resolved the client's priority and handled duplicate/cross-queue
    /// membership; a duplicate here means that bookkeeping was violated.
    pub fn enqueue(
        &mut self,
        client: Uuid,
        registry: &mut ClientRegistry,
        now: Instant,
    ) -> Result<usize, EnqueueError> {
        if self.contains(client) {
            return Err(EnqueueError::AlreadyQueued {
                client,
                destination: self.destination.clone(),
            });
        }

        let weight = registry.get(client).map_or(0, |c| c.priority_weight());
        let sq_index = self.sub_queue_for(weight);
        let index = self.insertion_index(client, weight, sq_index, registry, now);

        let sq = &mut self.sub_queues[sq_index];
        if index >= sq.len() {
            sq.push(client);
        } else {
            sq.insert(index, client);
        }
        if let Some(record) = registry.get_mut(client) {
            record.set_queue(Some(self.destination.clone()));
        }

        let size = self.sub_queues[sq_index].len();
        let text = messages::render(&self.settings.queue_message, &self.display_name, size, index + 1);
        self.messenger.send(client, &text);
        debug!(
            client = %client,
            destination = %self.destination,
            tier = self.sub_queues[sq_index].name(),
            position = index + 1,
            "client enqueued"
        );
        Ok(index)
    }

    /// Where a joining client lands in its sub-queue: remembered history for
    /// unprivileged clients, `min(remembered, priority_index)` otherwise:
    /// history may pull a client forward but never lets it jump past
    /// higher-priority occupants.
    fn insertion_index(
        &mut self,
        client: Uuid,
        weight: i32,
        sq_index: usize,
        registry: &ClientRegistry,
        now: Instant,
    ) -> usize {
        let len = self.sub_queues[sq_index].len();
        if len == 0 {
            return 0;
        }

        let remembered = self
            .remembered
            .recall(client, now)
            .map_or(len, |index| index.min(len));
        if weight == 0 {
            return remembered;
        }

        // One past the last occupant with weight >= the joining client's:
        // equal-weight newcomers land at the back of their weight band.
        let mut slot = 0;
        for (i, occupant) in self.sub_queues[sq_index].iter().enumerate() {
            let occupant_weight = registry.get(occupant).map_or(0, |c| c.priority_weight());
            if weight <= occupant_weight {
                slot = i + 1;
            }
        }
        let priority_index = slot.min(len);

        remembered.min(priority_index)
    }

    /// Record the client's position for later restoration, clear its
    /// membership, and defensively drop it from every sub-queue. Safe and
    /// idempotent when the client is not queued at all.
    pub fn remove(&mut self, client: Uuid, registry: &mut ClientRegistry, now: Instant) {
        let position = self.position_of(client).unwrap_or_else(|| {
            let weight = registry.get(client).map_or(0, |c| c.priority_weight());
            self.sub_queues[self.sub_queue_for(weight)].len()
        });
        self.remembered.remember(client, position, now);

        if let Some(record) = registry.get_mut(client) {
            // Only clear membership that points at this queue; a record mid
            // cross-queue move keeps its other membership intact.
            if record.queued_in() == Some(self.destination.as_str()) {
                record.set_queue(None);
            }
        }
        for sq in &mut self.sub_queues {
            sq.remove(client);
        }
        debug!(client = %client, destination = %self.destination, position, "client removed from queue");
    }

    /// The sub-queue the selector would serve next, without advancing it.
    fn peek_serving(&self) -> Option<usize> {
        let sub_queues = &self.sub_queues;
        self.selector.peek(|i| !sub_queues[i].is_empty())
    }

    /// All dispatch preconditions: the update interval has elapsed, the
    /// destination has room, someone is waiting, and the selector's dry run
    /// finds a non-empty tier to serve.
    pub fn can_dispatch(&self, now: Instant) -> bool {
        let interval_ok = self
            .last_dispatch
            .is_none_or(|at| now.duration_since(at) >= self.settings.update_interval);
        interval_ok
            && (self.transport.current_occupancy(&self.destination) as u32) < self.max_capacity
            && self.has_waiting()
            && self.peek_serving().is_some()
    }

    /// Pop the next entry and start moving it to the destination.
    pub fn dispatch_tick(&mut self, registry: &mut ClientRegistry, now: Instant) -> TickResult {
        if !self.can_dispatch(now) {
            return TickResult::Idle;
        }

        if self.first_cycle {
            // Absorb startup jitter: skip the very first eligible tick so the
            // destination's live occupancy settles before anyone is sent.
            self.first_cycle = false;
            return TickResult::FirstCycleDeferred;
        }

        let sub_queues = &self.sub_queues;
        let Some(sq_index) = self.selector.next(|i| !sub_queues[i].is_empty()) else {
            return TickResult::Idle;
        };
        let client = self.sub_queues[sq_index].remove_at(0);
        if let Some(record) = registry.get_mut(client) {
            record.set_queue(None);
        }
        self.remembered.remember(client, 0, now);

        if !self.transport.is_connected(client) {
            debug!(client = %client, "popped client is no longer connected, discarding");
            return TickResult::Discarded;
        }
        if self
            .transport
            .current_server(client)
            .is_some_and(|server| server.eq_ignore_ascii_case(&self.destination))
        {
            debug!(client = %client, destination = %self.destination, "client is already at the destination, discarding");
            return TickResult::Discarded;
        }

        self.messenger
            .send(client, &messages::sending_to(&self.display_name));
        let rx = self.transport.attempt_move(client, &self.destination);
        self.last_dispatch = Some(now);
        info!(
            client = %client,
            destination = %self.destination,
            tier = self.sub_queues[sq_index].name(),
            "dispatching client"
        );
        TickResult::Attempted(InFlightMove {
            client,
            sub_queue: sq_index,
            rx,
        })
    }

    /// Handle the observed outcome of a move attempt. On failure the entry
    /// goes back to the head of the sub-queue it was popped from, unless the
    /// client disconnected or re-queued while the attempt was in flight.
    pub fn finish_dispatch(
        &mut self,
        client: Uuid,
        sq_index: usize,
        outcome: MoveOutcome,
        registry: &mut ClientRegistry,
        now: Instant,
    ) {
        match outcome {
            MoveOutcome::Success => {
                info!(client = %client, destination = %self.destination, "client moved to destination");
                self.messenger
                    .send(client, &messages::sent_to(&self.display_name));
                self.broadcast_positions(sq_index, now);
            }
            MoveOutcome::Rejected(reason) | MoveOutcome::Error(reason) => {
                warn!(client = %client, destination = %self.destination, %reason, "dispatch failed");
                self.messenger
                    .send(client, &messages::unable_to_connect(&self.display_name));
                self.messenger
                    .send(client, &messages::failure_reason(&reason));

                let Some(record) = registry.get_mut(client) else {
                    debug!(client = %client, "failed dispatch for a departed client, dropping");
                    return;
                };
                if record.queued_in().is_some() || self.contains(client) {
                    debug!(client = %client, "client re-queued during the attempt, skipping undo");
                    return;
                }
                self.messenger.send(client, messages::REQUEUING);
                record.set_queue(Some(self.destination.clone()));
                self.sub_queues[sq_index].insert(0, client);
            }
        }
    }

    /// Broadcast updated positions to every remaining occupant of a tier,
    /// re-capturing each one into the remembered cache. Throttled by the
    /// per-tier cooldown.
    fn broadcast_positions(&mut self, sq_index: usize, now: Instant) {
        let sq = &mut self.sub_queues[sq_index];
        if sq
            .last_broadcast()
            .is_some_and(|at| now.duration_since(at) < self.settings.broadcast_interval)
        {
            return;
        }
        sq.set_last_broadcast(now);

        let size = sq.len();
        let occupants: Vec<Uuid> = sq.iter().collect();
        for (index, occupant) in occupants.into_iter().enumerate() {
            self.remembered.remember(occupant, index, now);
            let text = messages::render(
                &self.settings.position_message,
                &self.display_name,
                size,
                index + 1,
            );
            self.messenger.send(occupant, &text);
        }
    }

    /// Kick off a best-effort capacity probe. The core polls the receiver
    /// and feeds a successful answer back through [`Self::apply_capacity`];
    /// a failed probe keeps the stale value.
    pub fn refresh_capacity(&self) -> oneshot::Receiver<Option<u32>> {
        self.transport.query_capacity(&self.destination)
    }

    pub fn apply_capacity(&mut self, max: u32) {
        if max != self.max_capacity {
            debug!(destination = %self.destination, from = self.max_capacity, to = max, "destination capacity updated");
        }
        self.max_capacity = max;
    }

    #[cfg(test)]
    pub(crate) fn remembered_index(&mut self, client: Uuid, now: Instant) -> Option<usize> {
        self.remembered.recall(client, now)
    }
}

/// Destination name with its first letter upper-cased, as shown to clients.
fn display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
