use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chain::ChainConfig;
use containers::{Artifact, ArtifactHash, ArtifactKind, EpochAtxSet, EpochId, Layer, LayerId, LayerManifest};
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::LayerFetchConfig;
use super::locator::{DataLocator, LocatedManifest};
use super::states::LayerFetchState;
use crate::error::{FetchError, LayerError};
use crate::fetch::{ExclusionReason, Fetched, Fetcher};
use crate::mesh::{ArtifactStores, Validators};
use crate::types::PeerTransport;

type Wanted = Vec<(ArtifactKind, ArtifactHash)>;
type Failures = Vec<(ArtifactKind, ArtifactHash, FetchError)>;

/// What a round of artifact fetches is for; only used to report errors.
#[derive(Debug, Clone, Copy)]
enum FetchTarget {
    Layer(LayerId),
    Epoch(EpochId),
}

impl FetchTarget {
    fn incomplete(self, missing: usize, attempts: u32, last: FetchError) -> LayerError {
        match self {
            FetchTarget::Layer(layer) => LayerError::Incomplete {
                layer,
                missing,
                attempts,
                last,
            },
            FetchTarget::Epoch(epoch) => LayerError::AtxSetIncomplete {
                epoch,
                missing,
                attempts,
                last,
            },
        }
    }

    fn layer(self) -> Option<LayerId> {
        match self {
            FetchTarget::Layer(layer) => Some(layer),
            FetchTarget::Epoch(_) => None,
        }
    }
}

/// Drives a single layer from manifest to validated, stored artifacts.
///
/// Epoch ATX sets are memoized: the first caller for an epoch fetches the
/// set and its ATXs, concurrent callers wait for that fetch, and later
/// callers reuse the result. A failed epoch fetch is not memoized.
pub struct LayerFetcher<T> {
    config: LayerFetchConfig,
    chain: ChainConfig,
    fetcher: Fetcher<T>,
    locator: DataLocator<T>,
    stores: ArtifactStores,
    validators: Validators,
    epochs: Mutex<HashMap<EpochId, Arc<OnceCell<EpochAtxSet>>>>,
    states: Mutex<BTreeMap<LayerId, LayerFetchState>>,
    metrics: SharedMetrics,
}

impl<T: PeerTransport> LayerFetcher<T> {
    pub fn new(
        config: LayerFetchConfig,
        chain: ChainConfig,
        fetcher: Fetcher<T>,
        stores: ArtifactStores,
        validators: Validators,
        metrics: SharedMetrics,
    ) -> Self {
        let locator = DataLocator::new(config.clone(), fetcher.clone(), Arc::clone(&metrics));

        Self {
            config,
            chain,
            fetcher,
            locator,
            stores,
            validators,
            epochs: Mutex::new(HashMap::new()),
            states: Mutex::new(BTreeMap::new()),
            metrics,
        }
    }

    pub fn fetcher(&self) -> &Fetcher<T> {
        &self.fetcher
    }

    pub fn locator(&self) -> &DataLocator<T> {
        &self.locator
    }

    pub fn stores(&self) -> &ArtifactStores {
        &self.stores
    }

    /// Fetch, validate and store everything `layer` references.
    ///
    /// `cancel` is checked between batches; a batch that has started runs to
    /// completion before the fetch returns [`LayerError::Cancelled`].
    pub async fn fetch_layer(&self, layer: LayerId, cancel: &CancellationToken) -> Result<Layer, LayerError> {
        self.states.lock().insert(layer, LayerFetchState::Pending);
        let started = Instant::now();

        let result = self.try_fetch_layer(layer, cancel).await;
        self.metrics.observe_layer_fetch_time(started.elapsed().as_secs_f64());

        match &result {
            Ok(fetched) => {
                self.transition(layer, LayerFetchState::Complete);
                debug!(%layer, artifacts = fetched.len(), "Layer fetched");
            }
            Err(error) => {
                self.transition(layer, LayerFetchState::Failed);
                warn!(%layer, %error, "Layer fetch failed");
            }
        }
        result
    }

    async fn try_fetch_layer(&self, layer: LayerId, cancel: &CancellationToken) -> Result<Layer, LayerError> {
        if cancel.is_cancelled() {
            return Err(LayerError::Cancelled);
        }

        self.transition(layer, LayerFetchState::FetchingManifest);
        let located = self.locator.layer_manifest_for(layer).await?;
        if located.manifest.is_empty() {
            debug!(%layer, responders = located.responders, "Layer is empty");
            return Ok(Layer::empty(layer));
        }

        self.transition(layer, LayerFetchState::FetchingArtifacts);
        self.ensure_epoch_atxs(self.chain.epoch_of(layer), cancel).await?;

        let LocatedManifest {
            mut manifest, sources, ..
        } = located;
        let wanted = manifest.iter().collect();
        let unserved = self
            .fetch_artifacts(FetchTarget::Layer(layer), wanted, &sources, cancel)
            .await?;
        for (kind, hash) in &unserved {
            manifest.remove(*kind, hash);
        }

        self.assemble(layer, &manifest)
    }

    /// The ATX set of `epoch` with every listed ATX stored locally.
    async fn ensure_epoch_atxs(&self, epoch: EpochId, cancel: &CancellationToken) -> Result<EpochAtxSet, LayerError> {
        let cell = Arc::clone(self.epochs.lock().entry(epoch).or_default());

        let set = cell
            .get_or_try_init(|| async {
                let set = self.locator.epoch_atx_set_for(epoch, cancel).await?;
                let wanted = set.atxs.iter().map(|hash| (ArtifactKind::Atx, *hash)).collect();
                self.fetch_artifacts(FetchTarget::Epoch(epoch), wanted, &HashMap::new(), cancel)
                    .await?;

                info!(%epoch, atxs = set.len(), "Epoch atx set complete");
                Ok::<_, LayerError>(set)
            })
            .await?;

        Ok(set.clone())
    }

    /// Fetch, validate and store every wanted artifact not stored yet.
    ///
    /// Returns the claimed hashes that turned out to be unserved claims; they
    /// are not part of the target.
    async fn fetch_artifacts(
        &self,
        target: FetchTarget,
        wanted: Wanted,
        sources: &HashMap<ArtifactHash, Vec<PeerId>>,
        cancel: &CancellationToken,
    ) -> Result<Wanted, LayerError> {
        let mut missing = self.missing_locally(wanted)?;
        let mut unserved = Wanted::new();
        let mut attempt = 0;

        while !missing.is_empty() {
            attempt += 1;
            if let Some(layer) = target.layer() {
                self.transition(layer, LayerFetchState::FetchingArtifacts);
            }

            let mut by_kind: BTreeMap<ArtifactKind, Vec<ArtifactHash>> = BTreeMap::new();
            for (kind, hash) in missing {
                by_kind.entry(kind).or_default().push(hash);
            }

            let mut outcomes = Vec::new();
            for (kind, hashes) in by_kind {
                if cancel.is_cancelled() {
                    return Err(LayerError::Cancelled);
                }
                let results = self.fetcher.fetch_batch_from(hashes, kind, sources).await;
                outcomes.extend(results.into_iter().map(|(hash, result)| (kind, hash, result)));
            }

            if let Some(layer) = target.layer() {
                self.transition(layer, LayerFetchState::Validating);
            }

            let mut failures: Failures = Vec::new();
            for (kind, hash, result) in outcomes {
                match result {
                    Ok(fetched) => {
                        if let Some(error) = self.accept(kind, fetched)? {
                            failures.push((kind, hash, error));
                        }
                    }
                    Err(FetchError::Cancelled) => return Err(LayerError::Cancelled),
                    Err(error) => failures.push((kind, hash, error)),
                }
            }

            let (unclaimed, failures): (Failures, Failures) = failures
                .into_iter()
                .partition(|(_, hash, error)| self.is_unserved_claim(hash, error, sources));
            for (kind, hash, _) in unclaimed {
                self.discredit_claim(target, kind, hash, sources);
                unserved.push((kind, hash));
            }

            let Some((_, _, last)) = failures.last() else {
                break;
            };
            if attempt > self.config.retry_budget {
                return Err(target.incomplete(failures.len(), attempt, last.clone()));
            }

            debug!(
                ?target,
                attempt,
                missing = failures.len(),
                last = %last,
                "Retrying missing artifacts"
            );
            missing = failures.into_iter().map(|(kind, hash, _)| (kind, hash)).collect();
        }

        Ok(unserved)
    }

    /// Nobody served `hash` and every peer that listed it either denied
    /// holding it or is excluded.
    fn is_unserved_claim(
        &self,
        hash: &ArtifactHash,
        error: &FetchError,
        sources: &HashMap<ArtifactHash, Vec<PeerId>>,
    ) -> bool {
        let FetchError::NotAvailable { denied_by, .. } = error else {
            return false;
        };
        sources.get(hash).is_some_and(|claimants| {
            !claimants.is_empty()
                && claimants
                    .iter()
                    .all(|peer| denied_by.contains(peer) || self.fetcher.is_excluded(peer))
        })
    }

    fn discredit_claim(
        &self,
        target: FetchTarget,
        kind: ArtifactKind,
        hash: ArtifactHash,
        sources: &HashMap<ArtifactHash, Vec<PeerId>>,
    ) {
        let claimants = sources.get(&hash).map(Vec::as_slice).unwrap_or_default();
        warn!(
            ?target,
            %kind,
            hash = %hash.short(),
            claimants = claimants.len(),
            "Dropping artifact none of its claimants would serve"
        );
        for peer in claimants {
            self.fetcher.exclude_peer(peer, ExclusionReason::UnservedClaim);
        }
    }

    /// Validate a fetched artifact and store it.
    ///
    /// Returns the rejection if the validator refused it; the supplying peer
    /// is excluded.
    fn accept(&self, kind: ArtifactKind, fetched: Fetched) -> Result<Option<FetchError>, LayerError> {
        let Fetched { hash, data, peer, .. } = fetched;

        if !self.validators.validator(kind).validate(&hash, &data) {
            let error = FetchError::ValidationFailed { hash, peer };
            warn!(%kind, %error, "Excluding peer");
            self.fetcher.exclude_peer(&peer, ExclusionReason::ValidationFailed);
            return Ok(Some(error));
        }

        self.stores
            .store(kind)
            .put(hash, data)
            .map_err(|err| LayerError::Store(err.to_string()))?;
        Ok(None)
    }

    fn missing_locally(&self, wanted: Wanted) -> Result<Wanted, LayerError> {
        let mut missing = Vec::with_capacity(wanted.len());
        for (kind, hash) in wanted {
            let present = self
                .stores
                .store(kind)
                .contains(&hash)
                .map_err(|err| LayerError::Store(err.to_string()))?;
            if !present {
                missing.push((kind, hash));
            }
        }
        Ok(missing)
    }

    fn assemble(&self, layer: LayerId, manifest: &LayerManifest) -> Result<Layer, LayerError> {
        let mut artifacts = Vec::with_capacity(manifest.len());
        for (kind, hash) in manifest.iter() {
            let data = self
                .stores
                .store(kind)
                .get(&hash)
                .map_err(|err| LayerError::Store(err.to_string()))?
                .ok_or_else(|| LayerError::Store(format!("{kind} {hash} missing from store")))?;
            artifacts.push(Artifact { hash, kind, data });
        }

        Ok(Layer { id: layer, artifacts })
    }

    fn transition(&self, layer: LayerId, next: LayerFetchState) {
        let mut states = self.states.lock();
        let current = states.entry(layer).or_default();
        if *current != next && !current.can_transition_to(next) {
            debug!(%layer, from = ?current, to = ?next, "Unexpected layer state transition");
        }
        *current = next;
    }

    pub fn layer_state(&self, layer: LayerId) -> LayerFetchState {
        self.states.lock().get(&layer).copied().unwrap_or_default()
    }

    /// The memoized ATX set of `epoch`, if it has been fetched.
    pub fn epoch_atx_set(&self, epoch: EpochId) -> Option<EpochAtxSet> {
        self.epochs.lock().get(&epoch).and_then(|cell| cell.get().cloned())
    }

    /// Drop book-keeping for layers below `layer` and epochs before its epoch.
    pub fn forget_below(&self, layer: LayerId) {
        self.states.lock().retain(|id, _| *id >= layer);

        let epoch = self.chain.epoch_of(layer);
        self.epochs.lock().retain(|id, _| *id >= epoch);
    }
}
