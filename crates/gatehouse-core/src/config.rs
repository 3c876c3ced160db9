use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::tier::{self, PriorityTier};

/// Top-level configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatehouseConfig {
    /// Server whose arrivals are funneled into the queue.
    pub entry_server: String,
    /// Destination the queue admits clients into.
    pub destination: String,
    pub intervals: Intervals,
    pub messages: MessageTemplates,
    /// Tier table: weight (as a TOML key) to tier name.
    pub priorities: HashMap<String, String>,
    pub engine: EngineConfig,
}

/// Timing knobs, all driven by the external timer service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Intervals {
    /// Minimum seconds between dispatch attempts.
    pub update_secs: u64,
    /// Cooldown seconds between position broadcasts per tier.
    pub message_secs: u64,
    /// Seconds between capacity probes of the destination.
    pub capacity_refresh_secs: u64,
    /// Milliseconds between dispatch tick invocations.
    pub dispatch_tick_ms: u64,
}

/// Templated client-facing messages. Placeholders: `%queue%`, `%size%`,
/// `%position%`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub queue_message: String,
    pub position_message: String,
}

/// Engine channel and loop tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub command_channel_capacity: usize,
    /// How long the core parks between polls of in-flight completions.
    pub idle_timeout_ms: u64,
}

/// The subset of configuration a single dispatch queue needs.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub update_interval: Duration,
    pub broadcast_interval: Duration,
    pub queue_message: String,
    pub position_message: String,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            update_secs: 1,
            message_secs: 5,
            capacity_refresh_secs: 10,
            dispatch_tick_ms: 100,
        }
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            queue_message: "You have joined the queue for %queue%! You are position %position% of %size%.".to_string(),
            position_message: "You are position %position% in the queue for %queue%.".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_channel_capacity: 1024,
            idle_timeout_ms: 25,
        }
    }
}

impl GatehouseConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Parse the priority table into tiers, sorted descending by weight.
    /// Equal weights are ordered by name so the result is deterministic
    /// regardless of map iteration order.
    pub fn tiers(&self) -> Result<Vec<PriorityTier>, ConfigError> {
        let mut tiers = Vec::with_capacity(self.priorities.len());
        for (weight, name) in &self.priorities {
            let weight: i32 = weight
                .parse()
                .map_err(|_| ConfigError::InvalidTierWeight(weight.clone()))?;
            tiers.push(PriorityTier::new(name.clone(), weight));
        }
        tiers.sort_by(|a, b| tier::descending(a, b).then_with(|| a.name().cmp(b.name())));
        Ok(tiers)
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            update_interval: Duration::from_secs(self.intervals.update_secs),
            broadcast_interval: Duration::from_secs(self.intervals.message_secs),
            queue_message: self.messages.queue_message.clone(),
            position_message: self.messages.position_message.clone(),
        }
    }
}
