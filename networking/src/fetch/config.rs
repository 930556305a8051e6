use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout for a single round-trip to one peer.
pub const REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Overall deadline for fetching one hash across all candidate peers.
pub const FETCH_DEADLINE_MS: u64 = 30_000;

/// Maximum round-trips in flight across all peers.
pub const MAX_INFLIGHT: usize = 64;

/// Maximum round-trips in flight to a single peer.
pub const MAX_INFLIGHT_PER_PEER: usize = 8;

/// Hashes of one batch fetched concurrently.
pub const BATCH_CONCURRENCY: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub request_timeout_ms: u64,
    pub deadline_ms: u64,
    pub max_inflight: usize,
    pub max_inflight_per_peer: usize,
    pub batch_concurrency: usize,
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            deadline_ms: FETCH_DEADLINE_MS,
            max_inflight: MAX_INFLIGHT,
            max_inflight_per_peer: MAX_INFLIGHT_PER_PEER,
            batch_concurrency: BATCH_CONCURRENCY,
        }
    }
}
