/// Sync service for the layer synchronization engine.
///
/// Keeps the local node's processed layer caught up with the network:
///
/// - **Tick loop**: periodically computes a target layer from gossip and the
///   layer clock and fetches every layer up to it
/// - **Strict ordering**: layers are fetched and handed to the mesh one at a
///   time; layer `L + 1` is never processed before layer `L`
/// - **Force sync**: an on-demand run that coalesces with a running tick
/// - **Notifications**: per-layer completion events for relay logic
///
/// ## State Machine
///
/// - **NotSynced**: no peers, waiting to start
/// - **Syncing**: fetching layers to catch up
/// - **Synced**: processed layer has reached the latest gossip layer
pub mod config;
pub mod service;
pub mod states;

pub use config::*;
pub use service::{SyncService, SyncStats};
pub use states::{SyncMode, SyncState};

#[cfg(test)]
mod tests;
