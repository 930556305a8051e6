use alloy_primitives::B256;
use hex::FromHex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Content address of an immutable artifact.
///
/// The hash is the SHA-256 digest of the artifact bytes. It is the only key
/// used for deduplication and lookups, so equality is byte-exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHash(pub B256);

impl ArtifactHash {
    /// Hash raw artifact bytes.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        ArtifactHash(B256::from_slice(&digest))
    }

    /// Abbreviated hex form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_slice()[..5])
    }
}

impl From<[u8; 32]> for ArtifactHash {
    fn from(bytes: [u8; 32]) -> Self {
        ArtifactHash(B256::from(bytes))
    }
}

impl FromStr for ArtifactHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes: [u8; 32] = <[u8; 32]>::from_hex(s)?;
        Ok(ArtifactHash::from(bytes))
    }
}

impl fmt::Display for ArtifactHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.as_slice()))
    }
}

/// Kinds of hash-addressed artifacts exchanged during sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Block,
    Ballot,
    Atx,
    Transaction,
    PoetProof,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Block,
        ArtifactKind::Ballot,
        ArtifactKind::Atx,
        ArtifactKind::Transaction,
        ArtifactKind::PoetProof,
    ];

    /// Stable label, used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Block => "block",
            ArtifactKind::Ballot => "ballot",
            ArtifactKind::Atx => "atx",
            ArtifactKind::Transaction => "transaction",
            ArtifactKind::PoetProof => "poet_proof",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
