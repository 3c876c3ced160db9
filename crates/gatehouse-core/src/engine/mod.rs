mod command;
mod core;
mod stats;

pub use command::Command;
pub use stats::{QueueStats, TierStats};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError};
use tracing::info;

use crate::collab::{Messenger, PriorityResolver, TimerService, Transport};
use crate::config::GatehouseConfig;
use crate::error::EngineError;

use self::core::Core;

/// The engine front-end: owns the core thread and the inbound command
/// channel. Event hooks and timers send commands through [`Engine::send`];
/// the single-threaded core processes them sequentially.
pub struct Engine {
    tx: Sender<Command>,
    core_thread: Option<thread::JoinHandle<()>>,
}

impl Engine {
    /// Spawn the core on a dedicated OS thread and register the periodic
    /// dispatch and capacity-refresh ticks with the timer service.
    pub fn new(
        config: GatehouseConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn PriorityResolver>,
        messenger: Arc<dyn Messenger>,
        timer: Arc<dyn TimerService>,
    ) -> Result<Self, EngineError> {
        let tiers = config
            .tiers()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        let (tx, rx) = crossbeam_channel::bounded(config.engine.command_channel_capacity);
        let dispatch_interval = Duration::from_millis(config.intervals.dispatch_tick_ms);
        let refresh_interval = Duration::from_secs(config.intervals.capacity_refresh_secs);

        let self_tx = tx.clone();
        let core_timer = Arc::clone(&timer);
        let handle = thread::Builder::new()
            .name("gatehouse-core".to_string())
            .spawn(move || {
                let mut core = Core::new(
                    &config, tiers, transport, resolver, messenger, core_timer, rx, self_tx,
                );
                core.run();
            })
            .map_err(|e| EngineError::CoreSpawn(e.to_string()))?;

        register_tick(timer.as_ref(), dispatch_interval, tx.clone(), || {
            Command::DispatchTick
        });
        register_tick(timer.as_ref(), refresh_interval, tx.clone(), || {
            Command::RefreshCapacity
        });
        // Prime the capacity before the first dispatch window closes
        let _ = tx.try_send(Command::RefreshCapacity);

        info!("engine started");
        Ok(Self {
            tx,
            core_thread: Some(handle),
        })
    }

    /// Send a command to the core. Returns an error if the channel is full
    /// or disconnected.
    pub fn send(&self, command: Command) -> Result<(), EngineError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => EngineError::ChannelFull,
            TrySendError::Disconnected(_) => EngineError::ChannelDisconnected,
        })
    }

    /// Graceful shutdown: tell the core to stop and wait for its thread.
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        info!("initiating engine shutdown");

        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.core_thread.take() {
            handle.join().map_err(|_| EngineError::CorePanicked)?;
        }

        info!("engine shutdown complete");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // If shutdown wasn't called explicitly, stop the core here
        if self.core_thread.is_some() {
            let _ = self.tx.send(Command::Shutdown);
            if let Some(handle) = self.core_thread.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Forward a periodic timer tick into the command channel. A full channel
/// drops the tick (the next one covers for it); the task only stops once
/// the channel is disconnected.
fn register_tick(
    timer: &dyn TimerService,
    interval: Duration,
    tx: Sender<Command>,
    make: impl Fn() -> Command + Send + 'static,
) {
    timer.schedule_repeating(
        interval,
        Box::new(move || !matches!(tx.try_send(make()), Err(TrySendError::Disconnected(_)))),
    );
}
