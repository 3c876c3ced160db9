pub mod client;
pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod queue;
pub mod telemetry;
pub mod tier;
pub mod timer;


pub use client::{ClientRegistry, PriorityState, WaitingClient};
pub use collab::{Messenger, MoveOutcome, PriorityResolver, TimerService, Transport};
pub use config::{GatehouseConfig, QueueSettings};
pub use engine::{Command, Engine, QueueStats, TierStats};
pub use error::{ConfigError, EngineError, EnqueueError};
pub use queue::{DispatchQueue, InFlightMove, RememberedPositions, SubQueue, TickResult, WrrSelector};
pub use tier::{PriorityTier, Weighted};
pub use timer::ThreadTimer;
