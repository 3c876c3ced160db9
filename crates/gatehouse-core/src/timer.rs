use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::collab::TimerService;

/// Thread-backed [`TimerService`]: every scheduled task gets its own sleeper
/// thread. That is plenty for the handful of periodic ticks the engine
/// registers; hosts with a real scheduler can supply their own
/// implementation instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTimer;

fn spawn_sleeper(f: impl FnOnce() + Send + 'static) {
    if let Err(e) = thread::Builder::new()
        .name("gatehouse-timer".to_string())
        .spawn(f)
    {
        warn!(error = %e, "failed to spawn timer thread");
    }
}

impl TimerService for ThreadTimer {
    fn schedule_once(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) {
        spawn_sleeper(move || {
            thread::sleep(delay);
            task();
        });
    }

    fn schedule_repeating(&self, interval: Duration, task: Box<dyn Fn() -> bool + Send>) {
        spawn_sleeper(move || loop {
            thread::sleep(interval);
            if !task() {
                break;
            }
        });
    }
}
