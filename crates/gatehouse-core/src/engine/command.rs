use uuid::Uuid;

use crate::engine::stats::QueueStats;

/// Commands sent from event hooks and timers to the single-threaded core.
///
/// Queries carry a `tokio::sync::oneshot::Sender` for the reply;
/// everything else is fire-and-forget.
pub enum Command {
    /// A client finished connecting to a server. Registers the client,
    /// ends its wait when the server is the destination it was queued for,
    /// and lines it up when the server is the guarded entry point.
    ServerConnected {
        uuid: Uuid,
        name: String,
        server: String,
    },
    /// The client left entirely: remove it from its queue and drop its
    /// record. Remembered positions survive, so a quick reconnect keeps
    /// its place.
    ClientDisconnected { uuid: Uuid },
    /// Re-run the permission lookup for a client whose grants changed.
    RecalculatePriority { uuid: Uuid },
    /// Periodic dispatch tick from the timer service.
    DispatchTick,
    /// Periodic capacity probe of the destinations.
    RefreshCapacity,
    /// The client's current index within its sub-queue, if queued.
    Position {
        uuid: Uuid,
        reply: tokio::sync::oneshot::Sender<Option<usize>>,
    },
    Stats {
        reply: tokio::sync::oneshot::Sender<Vec<QueueStats>>,
    },
    Shutdown,
}
