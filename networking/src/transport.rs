/// Loopback transport serving artifacts from in-process peers.
///
/// Each peer holds its own view of the network data and can be told to stall
/// (never answer) or corrupt (answer with the wrong bytes) for specific hashes,
/// or to go offline entirely. Used by the sync tool and by tests.
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use containers::{Artifact, ArtifactHash, ArtifactKind, Bytes, EpochAtxSet, EpochId, LayerId, LayerManifest};
use libp2p_identity::PeerId;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::req_resp::{SyncRequest, SyncResponse};
use crate::types::PeerTransport;

#[derive(Debug, Clone, Default)]
pub struct MemoryPeer {
    artifacts: HashMap<ArtifactHash, Bytes>,
    manifests: HashMap<LayerId, LayerManifest>,
    epoch_atxs: HashMap<EpochId, EpochAtxSet>,
    stalled: HashSet<ArtifactHash>,
    corrupted: HashSet<ArtifactHash>,
    offline: bool,
}

impl MemoryPeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, artifact: &Artifact) -> Self {
        self.add_artifact(artifact);
        self
    }

    /// Serve a layer: its manifest and every listed artifact.
    pub fn with_layer(mut self, manifest: LayerManifest, artifacts: &[Artifact]) -> Self {
        for artifact in artifacts {
            self.add_artifact(artifact);
        }
        self.manifests.insert(manifest.layer, manifest);
        self
    }

    /// Serve an epoch's ATX set (hashes only, add payloads separately).
    pub fn with_epoch_atxs(mut self, set: EpochAtxSet) -> Self {
        self.epoch_atxs.insert(set.epoch, set);
        self
    }

    /// Never answer requests for this hash.
    pub fn stall(mut self, hash: ArtifactHash) -> Self {
        self.stalled.insert(hash);
        self
    }

    /// Answer requests for this hash with bytes that hash to something else.
    pub fn corrupt(mut self, hash: ArtifactHash) -> Self {
        self.corrupted.insert(hash);
        self
    }

    pub fn add_artifact(&mut self, artifact: &Artifact) {
        self.artifacts.insert(artifact.hash, artifact.data.clone());
    }

    fn respond(&self, request: &SyncRequest) -> Reply {
        match request {
            SyncRequest::Artifact { hash, .. } => {
                if self.stalled.contains(hash) {
                    return Reply::Stall;
                }
                match self.artifacts.get(hash) {
                    Some(data) if self.corrupted.contains(hash) => {
                        let mut tampered = data.to_vec();
                        tampered.push(0xff);
                        Reply::Now(SyncResponse::Artifact(Bytes::from(tampered)))
                    }
                    Some(data) => Reply::Now(SyncResponse::Artifact(data.clone())),
                    None => Reply::Now(SyncResponse::NotFound),
                }
            }
            SyncRequest::LayerManifest(layer) => Reply::Now(
                self.manifests
                    .get(layer)
                    .cloned()
                    .map_or(SyncResponse::NotFound, SyncResponse::LayerManifest),
            ),
            SyncRequest::EpochAtxs(epoch) => Reply::Now(
                self.epoch_atxs
                    .get(epoch)
                    .cloned()
                    .map_or(SyncResponse::NotFound, SyncResponse::EpochAtxs),
            ),
        }
    }
}

enum Reply {
    Now(SyncResponse),
    Stall,
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    peers: RwLock<Vec<(PeerId, MemoryPeer)>>,
    latency: Duration,
    log: Mutex<Vec<(PeerId, SyncRequest)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every answer by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Add a peer; peers are offered in insertion order.
    pub fn add_peer(&self, peer: MemoryPeer) -> PeerId {
        let peer_id = PeerId::random();
        self.peers.write().push((peer_id, peer));
        peer_id
    }

    pub fn update_peer(&self, peer_id: &PeerId, update: impl FnOnce(&mut MemoryPeer)) {
        if let Some((_, peer)) = self.peers.write().iter_mut().find(|(id, _)| id == peer_id) {
            update(peer);
        }
    }

    pub fn set_offline(&self, peer_id: &PeerId, offline: bool) {
        self.update_peer(peer_id, |peer| peer.offline = offline);
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<(PeerId, SyncRequest)> {
        self.log.lock().clone()
    }

    pub fn artifact_requests(&self, hash: &ArtifactHash) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(_, request)| matches!(request, SyncRequest::Artifact { hash: h, .. } if *h == *hash))
            .count()
    }

    pub fn requests_to(&self, peer_id: &PeerId) -> usize {
        self.log.lock().iter().filter(|(peer, _)| peer == peer_id).count()
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    fn peers(&self, _kind: ArtifactKind) -> Vec<PeerId> {
        self.peers
            .read()
            .iter()
            .filter(|(_, peer)| !peer.offline)
            .map(|(peer_id, _)| *peer_id)
            .collect()
    }

    async fn send_request(&self, peer_id: PeerId, request: SyncRequest) -> Result<SyncResponse> {
        trace!(peer = %peer_id, protocol = request.protocol(), "Loopback request");
        self.log.lock().push((peer_id, request.clone()));

        let reply = {
            let peers = self.peers.read();
            let (_, peer) = peers
                .iter()
                .find(|(id, _)| *id == peer_id)
                .ok_or_else(|| anyhow!("unknown peer {peer_id}"))?;
            if peer.offline {
                return Err(anyhow!("peer {peer_id} unreachable"));
            }
            peer.respond(&request)
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            Reply::Now(response) => Ok(response),
            Reply::Stall => std::future::pending().await,
        }
    }
}
