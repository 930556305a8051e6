/// Sync service configuration.
///
/// Operational parameters for the sync loop: tick interval and how far ahead
/// of the processed layer one run may go.
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interval between sync ticks (in milliseconds).
pub const SYNC_INTERVAL_MS: u64 = 1_000;

/// Maximum layers processed in one sync run.
/// Bounds the work of a single run when far behind the network.
pub const SYNC_WINDOW: u32 = 100;

/// Buffered layer notifications per subscriber.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_ms: u64,
    pub sync_window: u32,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: SYNC_INTERVAL_MS,
            sync_window: SYNC_WINDOW,
        }
    }
}
