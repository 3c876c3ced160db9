use uuid::Uuid;

/// Errors surfaced by enqueue. Everything here is recoverable: the client is
/// notified and the queue is left unchanged.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("client {client} is already queued for {destination}")]
    AlreadyQueued { client: Uuid, destination: String },
}

/// Errors from the engine front-end (channel and thread lifecycle).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("command channel is full")]
    ChannelFull,

    #[error("command channel is disconnected")]
    ChannelDisconnected,

    #[error("failed to spawn core thread: {0}")]
    CoreSpawn(String),

    #[error("core thread panicked")]
    CorePanicked,
}

/// Errors while loading or interpreting configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("tier weight `{0}` is not an integer")]
    InvalidTierWeight(String),
}
