use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use containers::{ArtifactKind, LayerId};
use libp2p_identity::PeerId;

use crate::error::LayerError;
use crate::req_resp::{SyncRequest, SyncResponse};

/// Request/response access to remote peers.
///
/// Dialing, multiplexing and peer scoring live behind this trait. The sync
/// engine only picks peers from the offered list and applies its own
/// timeouts on top of `send_request`.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Candidate peers for the given artifact kind, most preferred first.
    fn peers(&self, kind: ArtifactKind) -> Vec<PeerId>;

    async fn send_request(&self, peer: PeerId, request: SyncRequest) -> Result<SyncResponse>;
}

#[async_trait]
impl<T: PeerTransport + ?Sized> PeerTransport for Arc<T> {
    fn peers(&self, kind: ArtifactKind) -> Vec<PeerId> {
        (**self).peers(kind)
    }

    async fn send_request(&self, peer: PeerId, request: SyncRequest) -> Result<SyncResponse> {
        (**self).send_request(peer, request).await
    }
}

/// Per-layer notifications published by the sync service.
///
/// Relay logic subscribes to these to decide when a layer can be re-broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerEvent {
    Complete { layer: LayerId, artifacts: usize },
    Failed { layer: LayerId, error: LayerError },
}

impl LayerEvent {
    pub fn layer(&self) -> LayerId {
        match self {
            LayerEvent::Complete { layer, .. } | LayerEvent::Failed { layer, .. } => *layer,
        }
    }
}
