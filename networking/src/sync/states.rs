/// Sync service state machine.
use containers::LayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Not synced: no peers to sync from, or sync not yet started.
    ///
    /// Initial mode. The node leaves it on the first tick that finds peers.
    #[default]
    NotSynced,

    /// Syncing: fetching historic layers to catch up with the network.
    ///
    /// Layers between the processed layer and the target are fetched one at
    /// a time and handed to the mesh in order.
    Syncing,

    /// Synced: caught up with the latest layer seen on gossip.
    ///
    /// New layers arrive through gossip. The node falls back to `Syncing` as
    /// soon as gossip reports a layer beyond the processed one.
    Synced,
}

impl SyncMode {
    /// Check if a transition to the target mode is valid.
    pub fn can_transition_to(&self, target: SyncMode) -> bool {
        match self {
            SyncMode::NotSynced => matches!(target, SyncMode::Syncing),
            SyncMode::Syncing => matches!(target, SyncMode::Synced | SyncMode::NotSynced),
            SyncMode::Synced => matches!(target, SyncMode::Syncing | SyncMode::NotSynced),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::NotSynced => "not_synced",
            SyncMode::Syncing => "syncing",
            SyncMode::Synced => "synced",
        }
    }

    /// Numeric value exported through the sync mode gauge.
    pub fn as_gauge(&self) -> i64 {
        match self {
            SyncMode::NotSynced => 0,
            SyncMode::Syncing => 1,
            SyncMode::Synced => 2,
        }
    }
}

/// Read-only snapshot of the sync service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncState {
    pub processed_layer: LayerId,
    pub latest_layer_seen_on_gossip: LayerId,
    pub mode: SyncMode,
}

impl SyncState {
    /// Layers between the processed layer and the latest gossip layer.
    pub fn lag(&self) -> u32 {
        self.latest_layer_seen_on_gossip
            .0
            .saturating_sub(self.processed_layer.0)
    }
}
