//! Client-facing message text. Templated messages come from configuration
//! and recognize `%queue%`, `%size%` and `%position%`; the fixed dispatch
//! messages live here.

pub const ALREADY_QUEUED: &str = "You are already queued for this server.";
pub const REQUEUING: &str = "Attempting to re-queue you...";

/// Render a configured template. `position` is 1-based.
pub fn render(template: &str, queue: &str, size: usize, position: usize) -> String {
    template
        .replace("%queue%", queue)
        .replace("%size%", &size.to_string())
        .replace("%position%", &position.to_string())
}

pub fn removed_from(queue: &str) -> String {
    format!("You have been removed from the queue for {queue}.")
}

pub fn sending_to(queue: &str) -> String {
    format!("You are being sent to {queue}...")
}

pub fn sent_to(queue: &str) -> String {
    format!("You have been sent to {queue}.")
}

pub fn unable_to_connect(queue: &str) -> String {
    format!("Unable to connect you to {queue}.")
}

pub fn failure_reason(reason: &str) -> String {
    format!("Reason: {reason}")
}
