/// Contracts of the collaborators the sync engine hands data to, with
/// in-memory implementations.
///
/// - **Mesh**: applies fully fetched layers and owns them afterwards
/// - **ArtifactStore**: hash-addressed persistence, one store per artifact kind
/// - **ArtifactValidator**: per-kind structural/signature checks owned by consensus
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use containers::{ArtifactHash, ArtifactKind, Bytes, Layer, LayerId};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

#[async_trait]
pub trait Mesh: Send + Sync + 'static {
    /// Apply an assembled layer. Either the whole layer is applied or none of it.
    async fn validate_layer(&self, layer: Layer) -> Result<()>;

    fn get_layer(&self, id: LayerId) -> Option<Layer>;

    /// Read-only mirror of the processed layer for external callers.
    fn processed_layer(&self) -> LayerId;
}

pub trait ArtifactStore: Send + Sync {
    fn put(&self, hash: ArtifactHash, data: Bytes) -> Result<()>;

    fn get(&self, hash: &ArtifactHash) -> Result<Option<Bytes>>;

    fn contains(&self, hash: &ArtifactHash) -> Result<bool> {
        Ok(self.get(hash)?.is_some())
    }
}

pub trait ArtifactValidator: Send + Sync {
    fn validate(&self, hash: &ArtifactHash, data: &[u8]) -> bool;
}

impl<F> ArtifactValidator for F
where
    F: Fn(&ArtifactHash, &[u8]) -> bool + Send + Sync,
{
    fn validate(&self, hash: &ArtifactHash, data: &[u8]) -> bool {
        self(hash, data)
    }
}

/// Validator that accepts every well-formed artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ArtifactValidator for AcceptAll {
    fn validate(&self, _hash: &ArtifactHash, _data: &[u8]) -> bool {
        true
    }
}

/// One store per artifact kind.
#[derive(Clone)]
pub struct ArtifactStores {
    stores: HashMap<ArtifactKind, Arc<dyn ArtifactStore>>,
}

impl ArtifactStores {
    pub fn in_memory() -> Self {
        let stores = ArtifactKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(MemoryStore::new()) as Arc<dyn ArtifactStore>))
            .collect();
        Self { stores }
    }

    pub fn with_store(mut self, kind: ArtifactKind, store: Arc<dyn ArtifactStore>) -> Self {
        self.stores.insert(kind, store);
        self
    }

    pub fn store(&self, kind: ArtifactKind) -> &Arc<dyn ArtifactStore> {
        &self.stores[&kind]
    }
}

impl Default for ArtifactStores {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// One validator per artifact kind.
#[derive(Clone)]
pub struct Validators {
    validators: HashMap<ArtifactKind, Arc<dyn ArtifactValidator>>,
}

impl Validators {
    pub fn accept_all() -> Self {
        let validators = ArtifactKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(AcceptAll) as Arc<dyn ArtifactValidator>))
            .collect();
        Self { validators }
    }

    pub fn with_validator(mut self, kind: ArtifactKind, validator: Arc<dyn ArtifactValidator>) -> Self {
        self.validators.insert(kind, validator);
        self
    }

    pub fn validator(&self, kind: ArtifactKind) -> &Arc<dyn ArtifactValidator> {
        &self.validators[&kind]
    }
}

impl Default for Validators {
    fn default() -> Self {
        Self::accept_all()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: RwLock<HashMap<ArtifactHash, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&self, hash: ArtifactHash, data: Bytes) -> Result<()> {
        self.artifacts.write().insert(hash, data);
        Ok(())
    }

    fn get(&self, hash: &ArtifactHash) -> Result<Option<Bytes>> {
        Ok(self.artifacts.read().get(hash).cloned())
    }
}

/// Mesh that keeps applied layers in memory.
///
/// Layers must be applied in order: a layer beyond `processed + 1` is
/// rejected, re-applying an older layer replaces it.
#[derive(Debug, Default)]
pub struct MemoryMesh {
    layers: RwLock<BTreeMap<LayerId, Layer>>,
    applied: Mutex<Vec<LayerId>>,
    processed: AtomicU32,
}

impl MemoryMesh {
    pub fn new(processed: LayerId) -> Self {
        Self {
            processed: AtomicU32::new(processed.0),
            ..Self::default()
        }
    }

    /// Layers in the order they were applied.
    pub fn applied(&self) -> Vec<LayerId> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl Mesh for MemoryMesh {
    async fn validate_layer(&self, layer: Layer) -> Result<()> {
        let processed = self.processed_layer();
        if layer.id > processed.next() {
            bail!("layer {} applied before layer {}", layer.id, processed.next());
        }

        debug!(layer = %layer.id, artifacts = layer.len(), "Applying layer");
        let id = layer.id;
        self.layers.write().insert(id, layer);
        self.applied.lock().push(id);
        self.processed.fetch_max(id.0, Ordering::AcqRel);
        Ok(())
    }

    fn get_layer(&self, id: LayerId) -> Option<Layer> {
        self.layers.read().get(&id).cloned()
    }

    fn processed_layer(&self) -> LayerId {
        LayerId(self.processed.load(Ordering::Acquire))
    }
}
