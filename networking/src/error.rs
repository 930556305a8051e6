use containers::{ArtifactHash, ArtifactKind, EpochId, LayerId};
use libp2p_identity::PeerId;
use thiserror::Error;

/// Outcome of a failed content fetch.
///
/// Shared by every caller waiting on the same hash, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{kind} {hash} not available from any of {attempts} peers")]
    NotAvailable {
        hash: ArtifactHash,
        kind: ArtifactKind,
        attempts: usize,
        /// Peers that answered they do not hold the artifact.
        denied_by: Vec<PeerId>,
    },
    #[error("peer {peer} returned data not matching {hash}")]
    CorruptData { hash: ArtifactHash, peer: PeerId },
    #[error("{hash} from peer {peer} failed validation")]
    ValidationFailed { hash: ArtifactHash, peer: PeerId },
    #[error("deadline exceeded fetching {hash}")]
    DeadlineExceeded { hash: ArtifactHash },
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::NotAvailable { .. } => "not_available",
            FetchError::CorruptData { .. } => "corrupt_data",
            FetchError::ValidationFailed { .. } => "validation_failed",
            FetchError::DeadlineExceeded { .. } => "deadline_exceeded",
            FetchError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    #[error("no peer served a manifest for layer {0}")]
    ManifestUnavailable(LayerId),
    #[error("no peer served the atx set for epoch {0}")]
    AtxSetUnavailable(EpochId),
    #[error("layer {layer}: {missing} artifacts missing after {attempts} attempts, last error: {last}")]
    Incomplete {
        layer: LayerId,
        missing: usize,
        attempts: u32,
        last: FetchError,
    },
    #[error("epoch {epoch}: {missing} atxs missing after {attempts} attempts, last error: {last}")]
    AtxSetIncomplete {
        epoch: EpochId,
        missing: usize,
        attempts: u32,
        last: FetchError,
    },
    #[error("store error: {0}")]
    Store(String),
    #[error("mesh rejected layer {layer}: {reason}")]
    Mesh { layer: LayerId, reason: String },
    #[error("layer fetch cancelled")]
    Cancelled,
}

impl LayerError {
    pub fn label(&self) -> &'static str {
        match self {
            LayerError::ManifestUnavailable(_) => "manifest_unavailable",
            LayerError::AtxSetUnavailable(_) => "atx_set_unavailable",
            LayerError::Incomplete { .. } => "incomplete",
            LayerError::AtxSetIncomplete { .. } => "atx_set_incomplete",
            LayerError::Store(_) => "store",
            LayerError::Mesh { .. } => "mesh",
            LayerError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("sync service closed")]
    Closed,
    #[error(transparent)]
    Layer(#[from] LayerError),
}
