//! Collaborator boundaries. The core owns no network, permission, message
//! delivery, or clock machinery; it talks to these traits and nothing else.

use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

/// Result of an attempted move to a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Success,
    /// The destination answered and refused the connection.
    Rejected(String),
    /// The attempt errored before the destination could answer.
    Error(String),
}

/// Connection backend to destinations. Async operations hand back a oneshot
/// receiver; the core polls it from its own thread, so the continuation
/// always re-enters the single-threaded mutation domain. A dropped sender
/// counts as an observed error, so a completion is never lost.
pub trait Transport: Send + Sync {
    fn attempt_move(&self, client: Uuid, destination: &str) -> oneshot::Receiver<MoveOutcome>;

    fn current_occupancy(&self, destination: &str) -> usize;

    /// Best-effort capacity probe. Resolves to `None` when the destination
    /// could not be reached.
    fn query_capacity(&self, destination: &str) -> oneshot::Receiver<Option<u32>>;

    fn is_connected(&self, client: Uuid) -> bool;

    fn current_server(&self, client: Uuid) -> Option<String>;
}

/// Permission lookup used to derive a client's priority tier. Queried once
/// per configured tier, in descending-weight order.
pub trait PriorityResolver: Send + Sync {
    fn has_tier(&self, client: Uuid, permission: &str) -> bool;
}

/// Delivers client-facing text. Delivery failures stay on the collaborator's
/// side and are never surfaced to the core.
pub trait Messenger: Send + Sync {
    fn send(&self, client: Uuid, text: &str);
}

/// External timer. The core never runs its own clock-driven loop; it asks
/// this service for one-shot and repeating callbacks instead.
pub trait TimerService: Send + Sync {
    fn schedule_once(&self, delay: Duration, task: Box<dyn FnOnce() + Send>);

    /// Runs `task` every `interval` until it returns `false`.
    fn schedule_repeating(&self, interval: Duration, task: Box<dyn Fn() -> bool + Send>);
}
