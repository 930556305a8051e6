
use std::sync::Arc;

use chain::ChainConfig;
use containers::{Artifact, ArtifactKind, EpochAtxSet, EpochId, LayerId, LayerManifest};
use metrics::Metrics;

use crate::fetch::{FetchConfig, Fetcher};
use crate::layer_fetcher::{LayerFetchConfig, LayerFetcher};
use crate::mesh::{ArtifactStores, Validators};
use crate::transport::MemoryTransport;

const CHAIN: ChainConfig = ChainConfig {
    layers_per_epoch: 4,
    layer_duration_ms: 1_000,
    genesis_time: 0,
};

fn artifact(kind: ArtifactKind, tag: &str) -> Artifact {
    Artifact::new(kind, format!("{kind}:{tag}").into_bytes())
}

/// Blocks for a layer and the manifest listing them.
fn layer_blocks(layer: LayerId, count: usize) -> (LayerManifest, Vec<Artifact>) {
    let blocks: Vec<Artifact> = (0..count)
        .map(|i| artifact(ArtifactKind::Block, &format!("{layer}-{i}")))
        .collect();
    let manifest = LayerManifest::empty(layer).with(ArtifactKind::Block, blocks.iter().map(|b| b.hash));
    (manifest, blocks)
}

fn epoch_atxs(epoch: EpochId, count: usize) -> (EpochAtxSet, Vec<Artifact>) {
    let atxs: Vec<Artifact> = (0..count)
        .map(|i| artifact(ArtifactKind::Atx, &format!("{epoch}-{i}")))
        .collect();
    (EpochAtxSet::new(epoch, atxs.iter().map(|a| a.hash)), atxs)
}

fn fetch_config() -> FetchConfig {
    FetchConfig {
        request_timeout_ms: 100,
        deadline_ms: 1_000,
        ..FetchConfig::default()
    }
}

fn layer_fetch_config() -> LayerFetchConfig {
    LayerFetchConfig {
        manifest_timeout_ms: 100,
        atx_max_retries: 2,
        atx_backoff_initial_ms: 10,
        atx_backoff_max_ms: 40,
        ..LayerFetchConfig::default()
    }
}

fn layer_fetcher(
    transport: &Arc<MemoryTransport>,
    validators: Validators,
) -> LayerFetcher<MemoryTransport> {
    let metrics = Arc::new(Metrics::new());
    let fetcher = Fetcher::new(fetch_config(), Arc::clone(transport), Arc::clone(&metrics));

    LayerFetcher::new(
        layer_fetch_config(),
        CHAIN,
        fetcher,
        ArtifactStores::in_memory(),
        validators,
        metrics,
    )
}
