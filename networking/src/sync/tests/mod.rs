
use std::ops::RangeInclusive;
use std::sync::Arc;

use chain::{ChainConfig, ManualClock};
use containers::{Artifact, ArtifactKind, EpochAtxSet, LayerId, LayerManifest};
use metrics::Metrics;

use crate::fetch::{FetchConfig, Fetcher};
use crate::layer_fetcher::{LayerFetchConfig, LayerFetcher};
use crate::mesh::{ArtifactStores, MemoryMesh, Validators};
use crate::sync::{SyncConfig, SyncService};
use crate::transport::{MemoryPeer, MemoryTransport};

const CHAIN: ChainConfig = ChainConfig {
    layers_per_epoch: 4,
    layer_duration_ms: 1_000,
    genesis_time: 0,
};

/// Peer serving every layer in `layers` with two blocks each, plus one ATX
/// per epoch touched.
fn serving_peer(layers: RangeInclusive<u32>) -> MemoryPeer {
    let mut peer = MemoryPeer::new();
    let mut epochs = Vec::new();

    for layer in layers.map(LayerId) {
        let blocks: Vec<Artifact> = (0..2)
            .map(|i| Artifact::new(ArtifactKind::Block, format!("block {layer} {i}").into_bytes()))
            .collect();
        let manifest = LayerManifest::empty(layer).with(ArtifactKind::Block, blocks.iter().map(|b| b.hash));
        peer = peer.with_layer(manifest, &blocks);

        let epoch = CHAIN.epoch_of(layer);
        if !epochs.contains(&epoch) {
            epochs.push(epoch);
            let atx = Artifact::new(ArtifactKind::Atx, format!("atx {epoch}").into_bytes());
            peer.add_artifact(&atx);
            peer = peer.with_epoch_atxs(EpochAtxSet::new(epoch, [atx.hash]));
        }
    }
    peer
}

struct Harness {
    transport: Arc<MemoryTransport>,
    mesh: Arc<MemoryMesh>,
    clock: Arc<ManualClock>,
    service: SyncService<MemoryTransport, MemoryMesh>,
}

fn harness(transport: MemoryTransport, processed: LayerId, config: SyncConfig) -> Harness {
    let transport = Arc::new(transport);
    let mesh = Arc::new(MemoryMesh::new(processed));
    let clock = Arc::new(ManualClock::new(LayerId(1_000)));
    let metrics = Arc::new(Metrics::new());

    let fetcher = Fetcher::new(
        FetchConfig {
            request_timeout_ms: 100,
            deadline_ms: 1_000,
            ..FetchConfig::default()
        },
        Arc::clone(&transport),
        Arc::clone(&metrics),
    );
    let layer_fetcher = LayerFetcher::new(
        LayerFetchConfig {
            manifest_timeout_ms: 100,
            atx_backoff_initial_ms: 10,
            atx_backoff_max_ms: 40,
            ..LayerFetchConfig::default()
        },
        CHAIN,
        fetcher,
        ArtifactStores::in_memory(),
        Validators::accept_all(),
        Arc::clone(&metrics),
    );
    let service = SyncService::new(
        config,
        CHAIN,
        clock.clone(),
        layer_fetcher,
        Arc::clone(&mesh),
        metrics,
    );

    Harness {
        transport,
        mesh,
        clock,
        service,
    }
}
