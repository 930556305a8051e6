use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ArtifactHash, ArtifactKind, LayerId};

/// A hash-addressed artifact together with its payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub hash: ArtifactHash,
    pub kind: ArtifactKind,
    pub data: Bytes,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            hash: ArtifactHash::of(&data),
            kind,
            data,
        }
    }

    /// Check that the payload still hashes to the advertised hash.
    pub fn is_intact(&self) -> bool {
        ArtifactHash::of(&self.data) == self.hash
    }
}

/// A fully fetched layer, ready to be applied by the mesh.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub artifacts: Vec<Artifact>,
}

impl Layer {
    pub fn empty(id: LayerId) -> Self {
        Self {
            id,
            artifacts: Vec::new(),
        }
    }

    pub fn contains(&self, hash: &ArtifactHash) -> bool {
        self.artifacts.iter().any(|artifact| artifact.hash == *hash)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
