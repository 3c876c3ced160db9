use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ClientRegistry;
use crate::collab::{Messenger, MoveOutcome, PriorityResolver, TimerService, Transport};
use crate::config::GatehouseConfig;
use crate::engine::command::Command;
use crate::engine::stats::{QueueStats, TierStats};
use crate::messages;
use crate::queue::{DispatchQueue, InFlightMove, TickResult};
use crate::tier::{PriorityTier, Weighted};

/// A move attempt whose outcome has not been observed yet.
struct PendingMove {
    queue: usize,
    mv: InFlightMove,
}

/// A capacity probe whose answer has not arrived yet.
struct PendingProbe {
    queue: usize,
    rx: tokio::sync::oneshot::Receiver<Option<u32>>,
}

/// Single-threaded core. Owns every piece of mutable queue state and
/// processes commands from event hooks and timers sequentially; async
/// collaborator completions are polled here too, so their continuations
/// never touch shared state from another thread.
pub(crate) struct Core {
    registry: ClientRegistry,
    queues: Vec<DispatchQueue>,
    /// Configured tiers, descending by weight.
    tiers: Vec<PriorityTier>,
    entry_server: String,
    resolver: Arc<dyn PriorityResolver>,
    messenger: Arc<dyn Messenger>,
    timer: Arc<dyn TimerService>,
    inbound: Receiver<Command>,
    /// Handle for timer callbacks the core schedules for itself.
    self_tx: Sender<Command>,
    update_interval: Duration,
    idle_timeout: Duration,
    in_flight: Vec<PendingMove>,
    probes: Vec<PendingProbe>,
    running: bool,
}

#[allow(clippy::too_many_arguments)]
impl Core {
    pub(crate) fn new(
        config: &GatehouseConfig,
        tiers: Vec<PriorityTier>,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn PriorityResolver>,
        messenger: Arc<dyn Messenger>,
        timer: Arc<dyn TimerService>,
        inbound: Receiver<Command>,
        self_tx: Sender<Command>,
    ) -> Self {
        let queues = vec![DispatchQueue::new(
            config.destination.clone(),
            &tiers,
            config.queue_settings(),
            transport,
            messenger.clone(),
        )];
        Self {
            registry: ClientRegistry::new(),
            queues,
            tiers,
            entry_server: config.entry_server.clone(),
            resolver,
            messenger,
            timer,
            inbound,
            self_tx,
            update_interval: Duration::from_secs(config.intervals.update_secs),
            idle_timeout: Duration::from_millis(config.engine.idle_timeout_ms),
            in_flight: Vec::new(),
            probes: Vec::new(),
            running: true,
        }
    }

    /// Run the event loop. Blocks the current thread until a `Shutdown`
    /// command arrives or the inbound channel disconnects.
    pub(crate) fn run(&mut self) {
        info!("gatehouse core started");

        while self.running {
            // Phase 1: drain all buffered commands
            let mut drained = 0;
            while let Ok(cmd) = self.inbound.try_recv() {
                self.handle_command(cmd);
                drained += 1;
                if !self.running {
                    break;
                }
            }

            // Phase 2: observe async completions on this thread
            self.poll_completions();

            if !self.running {
                break;
            }

            // Phase 3: park until the next command or poll window
            if drained == 0 {
                match self.inbound.recv_timeout(self.idle_timeout) {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        info!("command channel disconnected, shutting down");
                        self.running = false;
                    }
                }
            }
        }

        info!("gatehouse core stopped");
    }

    pub(crate) fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::ServerConnected { uuid, name, server } => {
                debug!(client = %uuid, %server, "server connected event");
                self.handle_server_connected(uuid, &name, &server);
            }
            Command::ClientDisconnected { uuid } => {
                debug!(client = %uuid, "client disconnected event");
                self.handle_disconnected(uuid);
            }
            Command::RecalculatePriority { uuid } => {
                let resolver = Arc::clone(&self.resolver);
                if let Some(record) = self.registry.get_mut(uuid) {
                    record.recalculate_priority(resolver.as_ref(), &self.tiers);
                    debug!(client = %uuid, weight = record.priority_weight(), "priority recalculated");
                }
            }
            Command::DispatchTick => self.handle_dispatch_tick(),
            Command::RefreshCapacity => {
                for queue in 0..self.queues.len() {
                    let rx = self.queues[queue].refresh_capacity();
                    self.probes.push(PendingProbe { queue, rx });
                }
            }
            Command::Position { uuid, reply } => {
                let position = self
                    .registry
                    .get(uuid)
                    .and_then(|c| c.queued_in())
                    .and_then(|destination| self.queue_index(destination))
                    .and_then(|index| self.queues[index].position_of(uuid));
                let _ = reply.send(position);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown => {
                info!("shutdown command received");
                self.running = false;
            }
        }
    }

    fn handle_server_connected(&mut self, uuid: Uuid, name: &str, server: &str) {
        self.registry.register(uuid, name);
        let now = Instant::now();

        // Arrived at the destination it was queued for: the wait is over.
        let queued_for = self
            .registry
            .get(uuid)
            .and_then(|c| c.queued_in())
            .map(str::to_string);
        if let Some(destination) = queued_for {
            if destination.eq_ignore_ascii_case(server) {
                if let Some(index) = self.queue_index(&destination) {
                    self.queues[index].remove(uuid, &mut self.registry, now);
                }
            }
        }

        // Landed on the guarded entry point: line up for the destination.
        if server.eq_ignore_ascii_case(&self.entry_server) {
            self.handle_enqueue(uuid, now);
        }
    }

    fn handle_enqueue(&mut self, uuid: Uuid, now: Instant) {
        let target = 0; // single guarded destination
        let Some(current) = self.registry.get(uuid).map(|c| c.queued_in().map(str::to_string))
        else {
            return;
        };

        if let Some(current) = current {
            if current.eq_ignore_ascii_case(self.queues[target].destination()) {
                debug!(client = %uuid, destination = %current, "duplicate enqueue ignored");
                self.messenger.send(uuid, messages::ALREADY_QUEUED);
                return;
            }
            // Queued somewhere else: announce, remove, then re-queue here
            match self.queue_index(&current) {
                Some(other) => {
                    self.messenger.send(
                        uuid,
                        &messages::removed_from(self.queues[other].display_name()),
                    );
                    self.queues[other].remove(uuid, &mut self.registry, now);
                }
                None => {
                    warn!(client = %uuid, queue = %current, "membership points at an unknown queue, clearing");
                    if let Some(record) = self.registry.get_mut(uuid) {
                        record.set_queue(None);
                    }
                }
            }
        }

        // Resolve (and cache) the priority before placement
        let resolver = Arc::clone(&self.resolver);
        if let Some(record) = self.registry.get_mut(uuid) {
            record.priority(resolver.as_ref(), &self.tiers);
        }

        if let Err(e) = self.queues[target].enqueue(uuid, &mut self.registry, now) {
            warn!(client = %uuid, error = %e, "enqueue aborted");
        }
    }

    fn handle_disconnected(&mut self, uuid: Uuid) {
        let now = Instant::now();
        let queued_for = self
            .registry
            .get(uuid)
            .and_then(|c| c.queued_in())
            .map(str::to_string);
        if let Some(destination) = queued_for {
            if let Some(index) = self.queue_index(&destination) {
                self.queues[index].remove(uuid, &mut self.registry, now);
            }
        }
        self.registry.remove(uuid);
    }

    fn handle_dispatch_tick(&mut self) {
        let now = Instant::now();
        for queue in 0..self.queues.len() {
            match self.queues[queue].dispatch_tick(&mut self.registry, now) {
                TickResult::Idle | TickResult::Discarded => {}
                TickResult::FirstCycleDeferred => {
                    // Let occupancy settle, then try again without waiting
                    // for the next periodic tick.
                    let tx = self.self_tx.clone();
                    self.timer.schedule_once(
                        self.update_interval,
                        Box::new(move || {
                            let _ = tx.try_send(Command::DispatchTick);
                        }),
                    );
                }
                TickResult::Attempted(mv) => self.in_flight.push(PendingMove { queue, mv }),
            }
        }
    }

    /// Observe any finished move attempts and capacity probes. Runs on the
    /// core thread, so finish handlers mutate queue state race-free.
    fn poll_completions(&mut self) {
        let now = Instant::now();

        let mut i = 0;
        while i < self.in_flight.len() {
            let outcome = match self.in_flight[i].mv.rx.try_recv() {
                Err(TryRecvError::Empty) => {
                    i += 1;
                    continue;
                }
                Ok(outcome) => outcome,
                // The transport dropped its side: count it as an error so
                // the undo path still runs.
                Err(TryRecvError::Closed) => {
                    MoveOutcome::Error("connection attempt was abandoned".to_string())
                }
            };
            let pending = self.in_flight.swap_remove(i);
            self.queues[pending.queue].finish_dispatch(
                pending.mv.client,
                pending.mv.sub_queue,
                outcome,
                &mut self.registry,
                now,
            );
        }

        let mut i = 0;
        while i < self.probes.len() {
            let answer = match self.probes[i].rx.try_recv() {
                Err(TryRecvError::Empty) => {
                    i += 1;
                    continue;
                }
                Ok(answer) => answer,
                Err(TryRecvError::Closed) => None,
            };
            let probe = self.probes.swap_remove(i);
            match answer {
                Some(max) => self.queues[probe.queue].apply_capacity(max),
                None => {
                    debug!(
                        destination = %self.queues[probe.queue].destination(),
                        "capacity probe failed, keeping stale value"
                    );
                }
            }
        }
    }

    fn queue_index(&self, destination: &str) -> Option<usize> {
        self.queues
            .iter()
            .position(|q| q.destination().eq_ignore_ascii_case(destination))
    }

    fn stats(&self) -> Vec<QueueStats> {
        self.queues
            .iter()
            .map(|q| QueueStats {
                destination: q.destination().to_string(),
                max_capacity: q.max_capacity(),
                waiting: q.total_waiting(),
                tiers: q
                    .sub_queues()
                    .iter()
                    .map(|sq| TierStats {
                        name: sq.name().to_string(),
                        weight: sq.weight(),
                        waiting: sq.len(),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Add a second destination queue (cross-queue move tests).
    #[cfg(test)]
    pub(crate) fn push_queue(&mut self, queue: DispatchQueue) {
        self.queues.push(queue);
    }

    /// Drain buffered commands and observe completions, without parking.
    #[cfg(test)]
    pub(crate) fn drain(&mut self) {
        while let Ok(cmd) = self.inbound.try_recv() {
            self.handle_command(cmd);
        }
        self.poll_completions();
    }
}
