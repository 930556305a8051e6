/// In-process network of loopback peers serving synthetic layers.
use std::sync::Arc;

use chain::ChainConfig;
use containers::{Artifact, ArtifactKind, EpochAtxSet, EpochId, LayerId, LayerManifest};
use networking::transport::{MemoryPeer, MemoryTransport};
use tracing::debug;

/// Shape of the generated chain.
#[derive(Clone, Debug)]
pub struct SyntheticChain {
    pub chain: ChainConfig,
    pub last_layer: LayerId,
    pub blocks_per_layer: usize,
    pub atxs_per_epoch: usize,
}

impl SyntheticChain {
    /// Build a transport with `peers` peers that all hold the full chain.
    pub fn build(&self, peers: usize) -> Arc<MemoryTransport> {
        let mut template = MemoryPeer::new();
        let mut epochs = Vec::new();

        let first = self.chain.effective_genesis().next();
        for layer in first.range_to(self.last_layer) {
            let (manifest, artifacts) = self.layer(layer);
            template = template.with_layer(manifest, &artifacts);

            let epoch = self.chain.epoch_of(layer);
            if !epochs.contains(&epoch) {
                epochs.push(epoch);
                let atxs = self.epoch_atxs(epoch);
                for atx in &atxs {
                    template.add_artifact(atx);
                }
                template = template.with_epoch_atxs(EpochAtxSet::new(epoch, atxs.iter().map(|atx| atx.hash)));
            }
        }

        let transport = MemoryTransport::new();
        for _ in 0..peers {
            let peer_id = transport.add_peer(template.clone());
            debug!(peer = %peer_id, "Synthetic peer added");
        }
        Arc::new(transport)
    }

    /// Blocks, one ballot and one transaction per block.
    fn layer(&self, layer: LayerId) -> (LayerManifest, Vec<Artifact>) {
        let mut artifacts = vec![Artifact::new(ArtifactKind::Ballot, format!("ballot {layer}").into_bytes())];
        for i in 0..self.blocks_per_layer {
            artifacts.push(Artifact::new(ArtifactKind::Block, format!("block {layer}/{i}").into_bytes()));
            artifacts.push(Artifact::new(ArtifactKind::Transaction, format!("tx {layer}/{i}").into_bytes()));
        }

        let mut manifest = LayerManifest::empty(layer);
        for artifact in &artifacts {
            manifest.insert(artifact.kind, artifact.hash);
        }
        (manifest, artifacts)
    }

    fn epoch_atxs(&self, epoch: EpochId) -> Vec<Artifact> {
        (0..self.atxs_per_epoch)
            .map(|i| Artifact::new(ArtifactKind::Atx, format!("atx {epoch}/{i}").into_bytes()))
            .collect()
    }
}
