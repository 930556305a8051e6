/// Layer-level fetching on top of the content fetcher.
///
/// - **Data Locator**: asks peers which artifacts make up a layer and which
///   ATXs belong to an epoch, merging their claims
/// - **Layer Fetch Logic**: drives one layer from manifest to a validated,
///   stored set of artifacts ready for the mesh
///
/// ## Layer State Machine
///
/// - **Pending**: not started
/// - **FetchingManifest**: collecting manifest claims from peers
/// - **FetchingArtifacts**: fetching the epoch ATX set, then missing artifacts
/// - **Validating**: running per-kind validators and storing accepted artifacts
/// - **Complete** / **Failed**: terminal for one attempt
pub mod config;
pub mod locator;
pub mod logic;
pub mod states;

pub use config::LayerFetchConfig;
pub use locator::{DataLocator, LocatedManifest};
pub use logic::LayerFetcher;
pub use states::LayerFetchState;

#[cfg(test)]
mod tests;
