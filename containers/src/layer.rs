use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal of a layer, the ledger's primary time unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u32);

/// Ordinal of an epoch, a fixed-size run of consecutive layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochId(pub u32);

impl LayerId {
    pub const GENESIS: LayerId = LayerId(0);

    /// Epoch this layer belongs to.
    ///
    /// # Panics
    ///
    /// Panics if `layers_per_epoch` is zero.
    pub fn epoch(self, layers_per_epoch: u32) -> EpochId {
        assert!(layers_per_epoch > 0, "layers per epoch must be positive");
        EpochId(self.0 / layers_per_epoch)
    }

    pub fn next(self) -> LayerId {
        LayerId(self.0.saturating_add(1))
    }

    /// Inclusive iterator over `self..=end`.
    pub fn range_to(self, end: LayerId) -> impl Iterator<Item = LayerId> {
        (self.0..=end.0).map(LayerId)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
