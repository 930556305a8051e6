use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{ArtifactHash, ArtifactKind, EpochId, LayerId};

/// Artifact hashes a peer claims belong to a layer.
///
/// Holds the blocks and ballots published in the layer together with the
/// transactions, ATXs and PoET proofs they reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerManifest {
    pub layer: LayerId,
    pub entries: BTreeMap<ArtifactKind, BTreeSet<ArtifactHash>>,
}

impl LayerManifest {
    pub fn empty(layer: LayerId) -> Self {
        Self {
            layer,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, kind: ArtifactKind, hash: ArtifactHash) -> bool {
        self.entries.entry(kind).or_default().insert(hash)
    }

    pub fn remove(&mut self, kind: ArtifactKind, hash: &ArtifactHash) -> bool {
        let Some(hashes) = self.entries.get_mut(&kind) else {
            return false;
        };
        let removed = hashes.remove(hash);
        if hashes.is_empty() {
            self.entries.remove(&kind);
        }
        removed
    }

    pub fn with(mut self, kind: ArtifactKind, hashes: impl IntoIterator<Item = ArtifactHash>) -> Self {
        for hash in hashes {
            self.insert(kind, hash);
        }
        self
    }

    pub fn hashes(&self, kind: ArtifactKind) -> impl Iterator<Item = &ArtifactHash> {
        self.entries.get(&kind).into_iter().flatten()
    }

    pub fn contains(&self, kind: ArtifactKind, hash: &ArtifactHash) -> bool {
        self.entries.get(&kind).is_some_and(|set| set.contains(hash))
    }

    /// All `(kind, hash)` pairs in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, ArtifactHash)> + '_ {
        self.entries
            .iter()
            .flat_map(|(kind, hashes)| hashes.iter().map(move |hash| (*kind, *hash)))
    }

    /// Union another peer's claims into this manifest.
    pub fn merge(&mut self, other: &LayerManifest) {
        for (kind, hash) in other.iter() {
            self.insert(kind, hash);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ATX hashes claimed to be published in an epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochAtxSet {
    pub epoch: EpochId,
    pub atxs: BTreeSet<ArtifactHash>,
}

impl EpochAtxSet {
    pub fn new(epoch: EpochId, atxs: impl IntoIterator<Item = ArtifactHash>) -> Self {
        Self {
            epoch,
            atxs: atxs.into_iter().collect(),
        }
    }

    pub fn merge(&mut self, other: &EpochAtxSet) {
        self.atxs.extend(other.atxs.iter().copied());
    }

    pub fn contains(&self, hash: &ArtifactHash) -> bool {
        self.atxs.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.atxs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atxs.is_empty()
    }
}
