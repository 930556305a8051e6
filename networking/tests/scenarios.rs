use std::sync::Arc;
use std::time::Duration;

use chain::{ChainConfig, ManualClock};
use containers::{Artifact, ArtifactHash, ArtifactKind, EpochAtxSet, EpochId, LayerId, LayerManifest};
use futures::future::join_all;
use metrics::Metrics;
use networking::error::FetchError;
use networking::fetch::{FetchConfig, Fetcher};
use networking::layer_fetcher::{LayerFetchConfig, LayerFetchState, LayerFetcher};
use networking::mesh::{ArtifactStores, MemoryMesh, Mesh, Validators};
use networking::req_resp::SyncRequest;
use networking::sync::{SyncConfig, SyncMode, SyncService};
use networking::transport::{MemoryPeer, MemoryTransport};
use pretty_assertions::assert_eq;

const CHAIN: ChainConfig = ChainConfig {
    layers_per_epoch: 4,
    layer_duration_ms: 1_000,
    genesis_time: 0,
};

/// Synthetic content of one layer.
struct LayerData {
    manifest: LayerManifest,
    artifacts: Vec<Artifact>,
}

fn layer_data(layer: LayerId, blocks: usize) -> LayerData {
    let mut artifacts: Vec<Artifact> = (0..blocks)
        .map(|i| Artifact::new(ArtifactKind::Block, format!("block {layer}/{i}").into_bytes()))
        .collect();
    artifacts.push(Artifact::new(
        ArtifactKind::Ballot,
        format!("ballot {layer}").into_bytes(),
    ));

    let mut manifest = LayerManifest::empty(layer);
    for artifact in &artifacts {
        manifest.insert(artifact.kind, artifact.hash);
    }
    LayerData { manifest, artifacts }
}

fn atx(epoch: EpochId, n: usize) -> Artifact {
    Artifact::new(ArtifactKind::Atx, format!("atx {epoch}/{n}").into_bytes())
}

/// Peer holding the given layers and a full one-ATX set for each of their epochs.
fn peer_with(layers: &[LayerData]) -> MemoryPeer {
    let mut peer = MemoryPeer::new();
    for data in layers {
        peer = peer.with_layer(data.manifest.clone(), &data.artifacts);
        let epoch = CHAIN.epoch_of(data.manifest.layer);
        let atx = atx(epoch, 0);
        peer.add_artifact(&atx);
        peer = peer.with_epoch_atxs(EpochAtxSet::new(epoch, [atx.hash]));
    }
    peer
}

struct Node {
    transport: Arc<MemoryTransport>,
    mesh: Arc<MemoryMesh>,
    service: SyncService<MemoryTransport, MemoryMesh>,
}

fn node(transport: MemoryTransport, processed: LayerId) -> Node {
    let transport = Arc::new(transport);
    let mesh = Arc::new(MemoryMesh::new(processed));
    let metrics = Arc::new(Metrics::new());
    let fetch_config = FetchConfig {
        request_timeout_ms: 200,
        deadline_ms: 2_000,
        ..FetchConfig::default()
    };
    let layer_config = LayerFetchConfig {
        manifest_timeout_ms: 200,
        atx_backoff_initial_ms: 50,
        atx_backoff_max_ms: 200,
        ..LayerFetchConfig::default()
    };

    let fetcher = Fetcher::new(fetch_config, Arc::clone(&transport), Arc::clone(&metrics));
    let layer_fetcher = LayerFetcher::new(
        layer_config,
        CHAIN,
        fetcher,
        ArtifactStores::in_memory(),
        Validators::accept_all(),
        Arc::clone(&metrics),
    );
    let service = SyncService::new(
        SyncConfig::default(),
        CHAIN,
        Arc::new(ManualClock::new(LayerId(10_000))),
        layer_fetcher,
        Arc::clone(&mesh),
        metrics,
    );

    Node {
        transport,
        mesh,
        service,
    }
}

fn count_requests(transport: &MemoryTransport, matches: impl Fn(&SyncRequest) -> bool) -> usize {
    transport
        .requests()
        .iter()
        .filter(|(_, request)| matches(request))
        .count()
}

/// A stalled peer costs one request timeout, after which the next peer serves.
#[tokio::test(start_paused = true)]
async fn scenario_a_timeout_then_next_peer() {
    let data = layer_data(LayerId(8), 3);
    let stalled_block = data.artifacts[0].hash;

    let transport = MemoryTransport::new();
    let slow = transport.add_peer(peer_with(&[layer_data(LayerId(8), 3)]).stall(stalled_block));
    let good = transport.add_peer(peer_with(&[data]));
    let Node {
        transport,
        mesh,
        service,
    } = node(transport, LayerId(7));
    service.on_gossip_layer(LayerId(8));

    service.force_sync().await.unwrap();

    assert_eq!(service.processed_layer(), LayerId(8));
    assert_eq!(mesh.get_layer(LayerId(8)).map(|layer| layer.len()), Some(4));
    let block_requests: Vec<_> = transport
        .requests()
        .into_iter()
        .filter(|(_, request)| matches!(request, SyncRequest::Artifact { hash, .. } if *hash == stalled_block))
        .map(|(peer, _)| peer)
        .collect();
    assert_eq!(block_requests, vec![slow, good]);
    assert!(!service.layer_fetcher().fetcher().is_excluded(&slow));
}

/// An empty layer completes without content or ATX fetches.
#[tokio::test(start_paused = true)]
async fn scenario_b_empty_layer() {
    let layer = LayerId(8);
    let transport = MemoryTransport::new();
    transport.add_peer(MemoryPeer::new().with_layer(LayerManifest::empty(layer), &[]));
    let Node {
        transport,
        mesh,
        service,
    } = node(transport, LayerId(7));
    let mut events = service.subscribe();
    service.on_gossip_layer(layer);

    service.force_sync().await.unwrap();

    assert_eq!(service.processed_layer(), layer);
    assert_eq!(mesh.get_layer(layer).map(|layer| layer.is_empty()), Some(true));
    assert_eq!(service.layer_fetcher().layer_state(layer), LayerFetchState::Complete);
    assert_eq!(count_requests(&transport, |r| matches!(r, SyncRequest::Artifact { .. })), 0);
    assert_eq!(count_requests(&transport, |r| matches!(r, SyncRequest::EpochAtxs(_))), 0);
    assert_eq!(
        events.recv().await.unwrap(),
        networking::types::LayerEvent::Complete { layer, artifacts: 0 }
    );
}

/// Diverging ATX claims are merged into one union, fetched once for the epoch.
#[tokio::test(start_paused = true)]
async fn scenario_c_epoch_atx_union_fetched_once() {
    let epoch = EpochId(2);
    let atxs: Vec<Artifact> = (0..3).map(|n| atx(epoch, n)).collect();
    let layers: Vec<LayerData> = (8..=11).map(|l| layer_data(LayerId(l), 2)).collect();

    let transport = MemoryTransport::new();
    for claimed in [&atxs[..2], &atxs[1..]] {
        let mut peer = MemoryPeer::new();
        for data in &layers {
            peer = peer.with_layer(data.manifest.clone(), &data.artifacts);
        }
        for atx in &atxs {
            peer.add_artifact(atx);
        }
        peer = peer.with_epoch_atxs(EpochAtxSet::new(epoch, claimed.iter().map(|a| a.hash)));
        transport.add_peer(peer);
    }
    let Node {
        transport, service, ..
    } = node(transport, LayerId(7));
    service.on_gossip_layer(LayerId(11));

    service.force_sync().await.unwrap();

    assert_eq!(service.processed_layer(), LayerId(11));
    let expected = EpochAtxSet::new(epoch, atxs.iter().map(|a| a.hash));
    assert_eq!(service.layer_fetcher().epoch_atx_set(epoch), Some(expected));

    // No peer ever matches the union: one round plus three retries, two peers each.
    let rounds = 1 + LayerFetchConfig::default().atx_max_retries as usize;
    assert_eq!(
        count_requests(&transport, |r| matches!(r, SyncRequest::EpochAtxs(_))),
        2 * rounds
    );
    let atx_store = service.layer_fetcher().stores().store(ArtifactKind::Atx);
    for atx in &atxs {
        assert!(atx_store.contains(&atx.hash).unwrap());
        assert_eq!(transport.artifact_requests(&atx.hash), 1);
    }
}

/// A peer serving bytes that do not match the hash is excluded for the session.
#[tokio::test(start_paused = true)]
async fn scenario_d_corrupt_peer_excluded() {
    let first = layer_data(LayerId(8), 2);
    let second = layer_data(LayerId(9), 2);
    let corrupted = first.artifacts[1].hash;

    let transport = MemoryTransport::new();
    let liar = transport.add_peer(peer_with(&[layer_data(LayerId(8), 2), layer_data(LayerId(9), 2)]).corrupt(corrupted));
    let honest = transport.add_peer(peer_with(&[first, second]));
    let Node {
        transport,
        mesh,
        service,
    } = node(transport, LayerId(7));
    service.on_gossip_layer(LayerId(8));

    service.force_sync().await.unwrap();

    let fetcher = service.layer_fetcher().fetcher();
    assert!(fetcher.is_excluded(&liar));
    assert!(!fetcher.is_excluded(&honest));
    let stored = mesh.get_layer(LayerId(8)).unwrap();
    assert!(stored.artifacts.iter().all(Artifact::is_intact));
    assert!(stored.contains(&corrupted));

    let before = transport.requests_to(&liar);
    service.on_gossip_layer(LayerId(9));
    service.force_sync().await.unwrap();

    assert_eq!(service.processed_layer(), LayerId(9));
    assert_eq!(transport.requests_to(&liar), before);
    assert_eq!(service.stats().excluded_peers, 1);
}

/// A hash only an over-reporting peer lists, and that peer will not serve,
/// does not block the layer.
#[tokio::test(start_paused = true)]
async fn unserved_claim_does_not_block_progress() {
    let data = layer_data(LayerId(8), 1);
    let ghost = Artifact::new(ArtifactKind::Block, b"ghost block".to_vec());
    let inflated = LayerData {
        manifest: data.manifest.clone().with(ArtifactKind::Block, [ghost.hash]),
        artifacts: data.artifacts.clone(),
    };

    let transport = MemoryTransport::new();
    transport.add_peer(peer_with(&[layer_data(LayerId(8), 1)]));
    transport.add_peer(peer_with(&[layer_data(LayerId(8), 1)]));
    let boaster = transport.add_peer(peer_with(&[inflated]));
    let Node { mesh, service, .. } = node(transport, LayerId(7));
    service.on_gossip_layer(LayerId(8));

    service.force_sync().await.unwrap();

    assert_eq!(service.processed_layer(), LayerId(8));
    let stored = mesh.get_layer(LayerId(8)).unwrap();
    assert_eq!(stored.len(), data.artifacts.len());
    assert!(!stored.contains(&ghost.hash));
    assert!(service.layer_fetcher().fetcher().is_excluded(&boaster));
}

/// Three peers agree on five ATXs, a fourth knows only three of them: quorum
/// holds in the first round and each ATX is fetched once for the epoch.
#[tokio::test(start_paused = true)]
async fn scenario_c_epoch_atx_quorum_with_lagging_peer() {
    let epoch = EpochId(2);
    let atxs: Vec<Artifact> = (0..5).map(|n| atx(epoch, n)).collect();
    let layers: Vec<LayerData> = (8..=11).map(|l| layer_data(LayerId(l), 2)).collect();

    let transport = MemoryTransport::new();
    for claimed in [&atxs[..], &atxs[..], &atxs[..], &atxs[..3]] {
        let mut peer = MemoryPeer::new();
        for data in &layers {
            peer = peer.with_layer(data.manifest.clone(), &data.artifacts);
        }
        for atx in &atxs {
            peer.add_artifact(atx);
        }
        peer = peer.with_epoch_atxs(EpochAtxSet::new(epoch, claimed.iter().map(|a| a.hash)));
        transport.add_peer(peer);
    }
    let Node {
        transport, service, ..
    } = node(transport, LayerId(7));
    service.on_gossip_layer(LayerId(11));

    service.force_sync().await.unwrap();

    assert_eq!(service.processed_layer(), LayerId(11));
    let expected = EpochAtxSet::new(epoch, atxs.iter().map(|a| a.hash));
    assert_eq!(service.layer_fetcher().epoch_atx_set(epoch), Some(expected));
    // One round, asked of all four peers, no backoff.
    assert_eq!(count_requests(&transport, |r| matches!(r, SyncRequest::EpochAtxs(_))), 4);
    for atx in &atxs {
        assert_eq!(transport.artifact_requests(&atx.hash), 1);
    }
}

/// Caught up for a full tick: Synced; a newer gossip layer: back to Syncing.
#[tokio::test(start_paused = true)]
async fn scenario_e_synced_and_back() {
    let transport = MemoryTransport::new();
    transport.add_peer(MemoryPeer::new());
    let Node { service, .. } = node(transport, LayerId(100));
    service.on_gossip_layer(LayerId(100));

    service.start();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(service.mode(), SyncMode::Synced);
    assert_eq!(service.processed_layer(), LayerId(100));

    service.on_gossip_layer(LayerId(101));
    assert_eq!(service.mode(), SyncMode::Syncing);
    assert_eq!(service.sync_state().lag(), 1);

    service.close().await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_round_trip() {
    let artifact = Artifact::new(ArtifactKind::Transaction, b"shared".to_vec());
    let transport = MemoryTransport::with_latency(Duration::from_millis(30));
    for _ in 0..3 {
        transport.add_peer(MemoryPeer::new().with_artifact(&artifact));
    }
    let transport = Arc::new(transport);
    let fetcher = Fetcher::new(FetchConfig::default(), Arc::clone(&transport), Arc::new(Metrics::new()));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    let results = join_all((0..32).map(|_| fetcher.fetch(artifact.hash, ArtifactKind::Transaction, deadline))).await;

    assert_eq!(transport.artifact_requests(&artifact.hash), 1);
    let peers: Vec<_> = results.into_iter().map(|result| result.unwrap().peer).collect();
    assert!(peers.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(start_paused = true)]
async fn fetched_bytes_always_match_their_hash() {
    let artifacts: Vec<Artifact> = (0..8u8)
        .map(|n| Artifact::new(ArtifactKind::Block, vec![n; 64]))
        .collect();
    let hashes: Vec<ArtifactHash> = artifacts.iter().map(|a| a.hash).collect();

    let transport = MemoryTransport::new();
    let mut liar = MemoryPeer::new();
    let mut honest = MemoryPeer::new();
    for artifact in &artifacts {
        liar = liar.with_artifact(artifact).corrupt(artifact.hash);
        honest = honest.with_artifact(artifact);
    }
    transport.add_peer(liar);
    transport.add_peer(honest);
    let fetcher = Fetcher::new(FetchConfig::default(), Arc::new(transport), Arc::new(Metrics::new()));

    let results = fetcher.fetch_batch(hashes.clone(), ArtifactKind::Block).await;

    assert_eq!(results.len(), hashes.len());
    for (hash, result) in results {
        let fetched = result.unwrap();
        assert_eq!(ArtifactHash::of(&fetched.data), hash);
    }
    assert_eq!(fetcher.excluded_peers(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_artifacts_are_reported_not_dropped() {
    let missing = Artifact::new(ArtifactKind::PoetProof, b"nobody has this".to_vec());
    let transport = MemoryTransport::new();
    transport.add_peer(MemoryPeer::new());
    let fetcher = Fetcher::new(FetchConfig::default(), Arc::new(transport), Arc::new(Metrics::new()));

    let results = fetcher.fetch_batch([missing.hash], ArtifactKind::PoetProof).await;

    assert!(matches!(
        results.get(&missing.hash),
        Some(Err(FetchError::NotAvailable { attempts: 1, .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn processed_layer_never_decreases_and_mesh_order_is_strict() {
    let layers: Vec<LayerData> = (8..=30).map(|l| layer_data(LayerId(l), 2)).collect();
    let transport = MemoryTransport::with_latency(Duration::from_millis(5));
    transport.add_peer(peer_with(&layers));
    transport.add_peer(peer_with(&layers));
    let Node { mesh, service, .. } = node(transport, LayerId(7));
    service.on_gossip_layer(LayerId(30));

    let observer = {
        let service = service.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while service.processed_layer() < LayerId(30) {
                seen.push(service.processed_layer());
                tokio::time::sleep(Duration::from_millis(3)).await;
            }
            seen
        })
    };

    service.force_sync().await.unwrap();
    let seen = observer.await.unwrap();

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    let applied = mesh.applied();
    assert_eq!(applied, (8..=30).map(LayerId).collect::<Vec<_>>());
    assert_eq!(mesh.processed_layer(), LayerId(30));
}

#[tokio::test(start_paused = true)]
async fn force_sync_is_idempotent_with_running_sync() {
    let layers: Vec<LayerData> = (8..=12).map(|l| layer_data(LayerId(l), 2)).collect();
    let transport = MemoryTransport::with_latency(Duration::from_millis(10));
    transport.add_peer(peer_with(&layers));
    let Node {
        transport,
        mesh,
        service,
    } = node(transport, LayerId(7));
    service.on_gossip_layer(LayerId(12));

    let results = join_all((0..4).map(|_| service.force_sync())).await;
    assert!(results.iter().all(Result::is_ok));
    service.force_sync().await.unwrap();

    assert_eq!(mesh.applied(), (8..=12).map(LayerId).collect::<Vec<_>>());
    for layer in 8..=12 {
        assert_eq!(
            count_requests(&transport, |r| *r == SyncRequest::LayerManifest(LayerId(layer))),
            1
        );
    }
}
