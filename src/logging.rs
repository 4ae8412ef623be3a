//! Logging setup for host applications.
//!
//! The library only emits `tracing` events. Applications without their own
//! subscriber can install the default formatter here.

use tracing::Level;

/// Install the default `fmt` subscriber at INFO.
///
/// Returns `false` if a global subscriber is already set.
pub fn init() -> bool {
    init_with_level(Level::INFO)
}

/// Install the default `fmt` subscriber with the given maximum level.
pub fn init_with_level(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}
