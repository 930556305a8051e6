pub mod artifact;
pub mod layer;
pub mod manifest;
pub mod types;

pub use artifact::{Artifact, Layer};
pub use layer::{EpochId, LayerId};
pub use manifest::{EpochAtxSet, LayerManifest};
pub use types::{ArtifactHash, ArtifactKind};
pub use alloy_primitives::Bytes;
