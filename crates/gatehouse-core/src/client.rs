use std::collections::HashMap;

use uuid::Uuid;

use crate::collab::PriorityResolver;
use crate::tier::{PriorityTier, Weighted};

/// A client's priority, resolved lazily on first use and renewed only by an
/// explicit recalculation, never behind a getter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorityState {
    Unresolved,
    Resolved(PriorityTier),
}

/// A client known to the queue system: stable identity, display name, cached
/// priority, and the destination of the dispatch queue it currently waits
/// in (`None` when not queued anywhere).
#[derive(Debug, Clone)]
pub struct WaitingClient {
    uuid: Uuid,
    name: String,
    priority: PriorityState,
    queue: Option<String>,
}

impl WaitingClient {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            priority: PriorityState::Unresolved,
            queue: None,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destination of the queue this client waits in, if any.
    pub fn queued_in(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    pub fn set_queue(&mut self, destination: Option<String>) {
        self.queue = destination;
    }

    /// The client's priority tier, resolving and caching it on first use.
    /// Tiers must be sorted descending by weight; the first one whose
    /// permission the client holds wins, falling back to the zero-weight
    /// "none" tier.
    pub fn priority(
        &mut self,
        resolver: &dyn PriorityResolver,
        tiers: &[PriorityTier],
    ) -> PriorityTier {
        if let PriorityState::Resolved(tier) = &self.priority {
            return tier.clone();
        }
        let tier = lookup(self.uuid, resolver, tiers);
        self.priority = PriorityState::Resolved(tier.clone());
        tier
    }

    /// Weight of the cached priority; 0 while unresolved.
    pub fn priority_weight(&self) -> i32 {
        match &self.priority {
            PriorityState::Resolved(tier) => tier.weight(),
            PriorityState::Unresolved => 0,
        }
    }

    /// Pin the cached priority directly, bypassing the resolver.
    #[cfg(test)]
    pub(crate) fn resolve_to(&mut self, tier: PriorityTier) {
        self.priority = PriorityState::Resolved(tier);
    }

    /// Re-run the permission lookup, but only if a priority was already
    /// resolved; an unresolved client stays unresolved.
    pub fn recalculate_priority(
        &mut self,
        resolver: &dyn PriorityResolver,
        tiers: &[PriorityTier],
    ) {
        if matches!(self.priority, PriorityState::Resolved(_)) {
            self.priority = PriorityState::Resolved(lookup(self.uuid, resolver, tiers));
        }
    }
}

fn lookup(uuid: Uuid, resolver: &dyn PriorityResolver, tiers: &[PriorityTier]) -> PriorityTier {
    tiers
        .iter()
        .find(|tier| resolver.has_tier(uuid, &tier.permission()))
        .cloned()
        .unwrap_or_else(PriorityTier::none)
}

/// Uuid-keyed registry of every client the system currently knows about.
/// Records are created on first sight and dropped on disconnect; remembered
/// queue positions outlive them.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<Uuid, WaitingClient>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the record for a client. An existing record keeps its
    /// cached priority and queue membership.
    pub fn register(&mut self, uuid: Uuid, name: &str) -> &mut WaitingClient {
        self.clients
            .entry(uuid)
            .or_insert_with(|| WaitingClient::new(uuid, name))
    }

    pub fn get(&self, uuid: Uuid) -> Option<&WaitingClient> {
        self.clients.get(&uuid)
    }

    pub fn get_mut(&mut self, uuid: Uuid) -> Option<&mut WaitingClient> {
        self.clients.get_mut(&uuid)
    }

    pub fn remove(&mut self, uuid: Uuid) -> Option<WaitingClient> {
        self.clients.remove(&uuid)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
