use std::collections::HashMap;

use containers::{ArtifactHash, ArtifactKind, EpochAtxSet, EpochId, LayerId, LayerManifest};
use futures::future::join_all;
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::LayerFetchConfig;
use crate::error::LayerError;
use crate::fetch::Fetcher;
use crate::req_resp::{SyncRequest, SyncResponse};
use crate::types::PeerTransport;

/// Merged manifest claims for one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedManifest {
    pub manifest: LayerManifest,
    /// Peers that listed each hash, in the order they answered.
    pub sources: HashMap<ArtifactHash, Vec<PeerId>>,
    pub responders: usize,
}

/// Finds out what a layer or epoch contains by asking several peers.
///
/// Claims are merged optimistically: a hash listed by any responding peer
/// becomes part of the result.
pub struct DataLocator<T> {
    config: LayerFetchConfig,
    fetcher: Fetcher<T>,
    metrics: SharedMetrics,
}

impl<T: PeerTransport> DataLocator<T> {
    pub fn new(config: LayerFetchConfig, fetcher: Fetcher<T>, metrics: SharedMetrics) -> Self {
        Self {
            config,
            fetcher,
            metrics,
        }
    }

    pub async fn layer_manifest_for(&self, layer: LayerId) -> Result<LocatedManifest, LayerError> {
        let peers = self.pick_peers(ArtifactKind::Block);
        let responses = self.query(&peers, SyncRequest::LayerManifest(layer)).await;

        let mut manifest = LayerManifest::empty(layer);
        let mut sources: HashMap<ArtifactHash, Vec<PeerId>> = HashMap::new();
        let mut responders = 0;

        for (peer, response) in responses {
            match response {
                SyncResponse::LayerManifest(claim) if claim.layer == layer => {
                    responders += 1;
                    for (_, hash) in claim.iter() {
                        sources.entry(hash).or_default().push(peer);
                    }
                    manifest.merge(&claim);
                }
                SyncResponse::LayerManifest(claim) => {
                    warn!(%layer, claimed = %claim.layer, %peer, "Peer answered with another layer's manifest");
                }
                SyncResponse::NotFound => {
                    debug!(%layer, %peer, "Peer has no manifest for layer");
                }
                other => {
                    debug!(%layer, %peer, response = ?other, "Unexpected manifest response");
                }
            }
        }

        if responders == 0 {
            return Err(LayerError::ManifestUnavailable(layer));
        }

        debug!(
            %layer,
            asked = peers.len(),
            responders,
            artifacts = manifest.len(),
            "Located layer manifest"
        );

        Ok(LocatedManifest {
            manifest,
            sources,
            responders,
        })
    }

    /// Collect the ATX set of `epoch`, retrying until enough peers agree.
    ///
    /// Agreement means a peer's set equals the union accumulated so far.
    /// After the last retry the union is returned even without quorum.
    pub async fn epoch_atx_set_for(
        &self,
        epoch: EpochId,
        cancel: &CancellationToken,
    ) -> Result<EpochAtxSet, LayerError> {
        let mut union = EpochAtxSet::new(epoch, []);
        let mut responded = false;
        let mut retry = 0;

        loop {
            let peers = self.pick_peers(ArtifactKind::Atx);
            let claims: Vec<EpochAtxSet> = self
                .query(&peers, SyncRequest::EpochAtxs(epoch))
                .await
                .into_iter()
                .filter_map(|(peer, response)| match response {
                    SyncResponse::EpochAtxs(claim) if claim.epoch == epoch => Some(claim),
                    SyncResponse::EpochAtxs(claim) => {
                        warn!(%epoch, claimed = %claim.epoch, %peer, "Peer answered with another epoch's atxs");
                        None
                    }
                    _ => None,
                })
                .collect();

            if !claims.is_empty() {
                responded = true;
                for claim in &claims {
                    union.merge(claim);
                }

                let agreeing = claims.iter().filter(|claim| claim.atxs == union.atxs).count();
                let agreement = agreeing as f64 / claims.len() as f64;
                if agreement >= self.config.atx_quorum {
                    debug!(%epoch, atxs = union.len(), responders = claims.len(), "Located epoch atx set");
                    return Ok(union);
                }

                debug!(
                    %epoch,
                    agreeing,
                    responders = claims.len(),
                    quorum = self.config.atx_quorum,
                    "Epoch atx set below quorum"
                );
            }

            if retry >= self.config.atx_max_retries {
                break;
            }

            let delay = self.config.backoff(retry);
            retry += 1;
            self.metrics.inc_atx_set_retries();

            tokio::select! {
                _ = cancel.cancelled() => return Err(LayerError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if !responded {
            return Err(LayerError::AtxSetUnavailable(epoch));
        }

        warn!(%epoch, atxs = union.len(), retries = retry, "Using epoch atx set without quorum");
        Ok(union)
    }

    fn pick_peers(&self, kind: ArtifactKind) -> Vec<PeerId> {
        let mut peers = self.fetcher.candidates(kind);
        peers.truncate(self.config.manifest_peers.max(1));
        peers
    }

    async fn query(&self, peers: &[PeerId], request: SyncRequest) -> Vec<(PeerId, SyncResponse)> {
        let transport = self.fetcher.transport();
        let timeout = self.config.manifest_timeout();

        let responses = join_all(peers.iter().map(|&peer| {
            let request = request.clone();
            async move {
                match tokio::time::timeout(timeout, transport.send_request(peer, request)).await {
                    Ok(Ok(response)) => Some((peer, response)),
                    Ok(Err(err)) => {
                        debug!(%peer, error = %err, "Locator request failed");
                        None
                    }
                    Err(_) => {
                        debug!(%peer, "Locator request timed out");
                        None
                    }
                }
            }
        }))
        .await;

        responses.into_iter().flatten().collect()
    }
}
