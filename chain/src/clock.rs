use containers::LayerId;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::ChainConfig;

/// Source of the current layer.
pub trait LayerTimer: Send + Sync {
    fn current_layer(&self) -> LayerId;
}

/// Wall-clock layer timer derived from genesis time and layer duration.
#[derive(Clone, Debug)]
pub struct LayerClock {
    genesis: SystemTime,
    layer_duration: Duration,
}

impl LayerClock {
    pub fn new(genesis: SystemTime, layer_duration: Duration) -> Self {
        assert!(!layer_duration.is_zero(), "layer duration must be positive");
        Self {
            genesis,
            layer_duration,
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self::new(
            UNIX_EPOCH + Duration::from_secs(config.genesis_time),
            Duration::from_millis(config.layer_duration_ms),
        )
    }

    pub fn layer_at(&self, time: SystemTime) -> LayerId {
        match time.duration_since(self.genesis) {
            Ok(elapsed) => {
                let layer = elapsed.as_millis() / self.layer_duration.as_millis();
                LayerId(layer.min(u32::MAX as u128) as u32)
            }
            // Before genesis
            Err(_) => LayerId::GENESIS,
        }
    }

    pub fn layer_start(&self, layer: LayerId) -> SystemTime {
        self.genesis + self.layer_duration * layer.0
    }
}

impl LayerTimer for LayerClock {
    fn current_layer(&self) -> LayerId {
        self.layer_at(SystemTime::now())
    }
}

/// Layer timer advanced explicitly, for tools and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    layer: AtomicU32,
}

impl ManualClock {
    pub fn new(layer: LayerId) -> Self {
        Self {
            layer: AtomicU32::new(layer.0),
        }
    }

    pub fn set(&self, layer: LayerId) {
        self.layer.store(layer.0, Ordering::Release);
    }

    pub fn advance(&self) -> LayerId {
        LayerId(self.layer.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

impl LayerTimer for ManualClock {
    fn current_layer(&self) -> LayerId {
        LayerId(self.layer.load(Ordering::Acquire))
    }
}
