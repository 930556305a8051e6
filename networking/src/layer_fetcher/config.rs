use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Peers asked for a layer manifest or epoch ATX set.
pub const MANIFEST_PEERS: usize = 5;

/// Timeout for one manifest or ATX set request.
pub const MANIFEST_TIMEOUT_MS: u64 = 5_000;

/// Fraction of responding peers that must agree on an epoch ATX set.
pub const ATX_QUORUM: f64 = 0.67;

/// Extra ATX set rounds when quorum is not reached.
pub const ATX_MAX_RETRIES: u32 = 3;

pub const ATX_BACKOFF_INITIAL_MS: u64 = 500;
pub const ATX_BACKOFF_MAX_MS: u64 = 8_000;

/// Extra attempts for artifacts missing or rejected within one layer fetch.
pub const RETRY_BUDGET: u32 = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerFetchConfig {
    pub manifest_peers: usize,
    pub manifest_timeout_ms: u64,
    pub atx_quorum: f64,
    pub atx_max_retries: u32,
    pub atx_backoff_initial_ms: u64,
    pub atx_backoff_max_ms: u64,
    pub retry_budget: u32,
}

impl LayerFetchConfig {
    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }

    /// Delay before ATX set retry `attempt` (zero-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(
            self.atx_backoff_initial_ms
                .saturating_mul(factor)
                .min(self.atx_backoff_max_ms),
        )
    }
}

impl Default for LayerFetchConfig {
    fn default() -> Self {
        Self {
            manifest_peers: MANIFEST_PEERS,
            manifest_timeout_ms: MANIFEST_TIMEOUT_MS,
            atx_quorum: ATX_QUORUM,
            atx_max_retries: ATX_MAX_RETRIES,
            atx_backoff_initial_ms: ATX_BACKOFF_INITIAL_MS,
            atx_backoff_max_ms: ATX_BACKOFF_MAX_MS,
            retry_budget: RETRY_BUDGET,
        }
    }
}
