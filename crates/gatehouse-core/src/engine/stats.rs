/// Occupancy snapshot for one tier of a queue.
#[derive(Debug, Clone)]
pub struct TierStats {
    pub name: String,
    pub weight: i32,
    pub waiting: usize,
}

/// Aggregate snapshot for one destination queue.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub destination: String,
    pub max_capacity: u32,
    pub waiting: usize,
    pub tiers: Vec<TierStats>,
}
