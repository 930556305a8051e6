use containers::{ArtifactHash, ArtifactKind, Bytes, EpochAtxSet, EpochId, LayerId, LayerManifest};

pub const ARTIFACT_PROTOCOL_V1: &str = "/layersync/req/artifact/1";
pub const LAYER_MANIFEST_PROTOCOL_V1: &str = "/layersync/req/layer_manifest/1";
pub const EPOCH_ATXS_PROTOCOL_V1: &str = "/layersync/req/epoch_atxs/1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    Artifact { hash: ArtifactHash, kind: ArtifactKind },
    LayerManifest(LayerId),
    EpochAtxs(EpochId),
}

impl SyncRequest {
    pub fn protocol(&self) -> &'static str {
        match self {
            SyncRequest::Artifact { .. } => ARTIFACT_PROTOCOL_V1,
            SyncRequest::LayerManifest(_) => LAYER_MANIFEST_PROTOCOL_V1,
            SyncRequest::EpochAtxs(_) => EPOCH_ATXS_PROTOCOL_V1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResponse {
    Artifact(Bytes),
    LayerManifest(LayerManifest),
    EpochAtxs(EpochAtxSet),
    NotFound,
    Error(String),
}
