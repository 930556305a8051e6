use containers::{EpochId, LayerId};
use serde::{Deserialize, Serialize};

pub const LAYERS_PER_EPOCH: u32 = 4032;
pub const LAYER_DURATION_MS: u64 = 300_000;
pub const DEVNET_LAYERS_PER_EPOCH: u32 = 10;
pub const DEVNET_LAYER_DURATION_MS: u64 = 5_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub layers_per_epoch: u32,
    pub layer_duration_ms: u64,
    /// Unix time (seconds) of layer zero.
    pub genesis_time: u64,
}

impl ChainConfig {
    pub fn epoch_of(&self, layer: LayerId) -> EpochId {
        layer.epoch(self.layers_per_epoch)
    }

    /// Last layer that is treated as already processed at genesis.
    ///
    /// The first two epochs carry no fetchable data; sync starts right after.
    pub fn effective_genesis(&self) -> LayerId {
        LayerId(self.layers_per_epoch * 2 - 1)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            layers_per_epoch: LAYERS_PER_EPOCH,
            layer_duration_ms: LAYER_DURATION_MS,
            genesis_time: 0,
        }
    }
}

pub const DEVNET_CONFIG: ChainConfig = ChainConfig {
    layers_per_epoch: DEVNET_LAYERS_PER_EPOCH,
    layer_duration_ms: DEVNET_LAYER_DURATION_MS,
    genesis_time: 0,
};
