use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chain::{ChainConfig, LayerTimer};
use containers::{ArtifactKind, LayerId};
use metrics::SharedMetrics;
use parking_lot::Mutex;
/// Sync service coordinating layer synchronization.
///
/// The SyncService is the main entry point for synchronization. It coordinates:
/// - LayerFetcher: fetching and validating one layer at a time
/// - Mesh: receiving validated layers in order
/// - State machine: managing NOT_SYNCED -> SYNCING -> SYNCED transitions
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::config::{EVENT_CHANNEL_CAPACITY, SyncConfig};
use super::states::{SyncMode, SyncState};
use crate::error::{LayerError, SyncError};
use crate::layer_fetcher::LayerFetcher;
use crate::mesh::Mesh;
use crate::types::{LayerEvent, PeerTransport};

/// Sync statistics for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub state: SyncState,
    pub peers: usize,
    pub excluded_peers: usize,
    pub fetches_in_flight: usize,
}

pub(super) struct Inner<T, M> {
    config: SyncConfig,
    clock: Arc<dyn LayerTimer>,
    layer_fetcher: LayerFetcher<T>,
    mesh: Arc<M>,
    // Written only while `run_lock` is held.
    processed: AtomicU32,
    pub(super) gossip: AtomicU32,
    mode: Mutex<SyncMode>,
    // Gossip layer at which the previous run ended caught up.
    caught_up_at: Mutex<Option<LayerId>>,
    run_lock: AsyncMutex<()>,
    started: AtomicBool,
    events: broadcast::Sender<LayerEvent>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    metrics: SharedMetrics,
}

/// Sync service coordinating all sync operations.
///
/// This is the main sync coordinator that:
/// 1. Tracks the latest layer seen on gossip and the processed layer
/// 2. Fetches missing layers in order on every tick or forced run
/// 3. Hands each complete layer to the mesh before marking it processed
/// 4. Manages sync mode (NOT_SYNCED -> SYNCING -> SYNCED)
pub struct SyncService<T, M> {
    pub(super) inner: Arc<Inner<T, M>>,
}

impl<T, M> Clone for SyncService<T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: PeerTransport, M: Mesh> SyncService<T, M> {
    /// Create a service resuming from the mesh's processed layer.
    ///
    /// Layers up to the chain's effective genesis are never fetched.
    pub fn new(
        config: SyncConfig,
        chain: ChainConfig,
        clock: Arc<dyn LayerTimer>,
        layer_fetcher: LayerFetcher<T>,
        mesh: Arc<M>,
        metrics: SharedMetrics,
    ) -> Self {
        let processed = mesh.processed_layer().max(chain.effective_genesis());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        metrics.set_processed_layer(i64::from(processed.0));
        metrics.set_sync_mode(SyncMode::default().as_gauge());
        info!(processed_layer = %processed, "Sync service created");

        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                layer_fetcher,
                mesh,
                processed: AtomicU32::new(processed.0),
                gossip: AtomicU32::new(0),
                mode: Mutex::new(SyncMode::default()),
                caught_up_at: Mutex::new(None),
                run_lock: AsyncMutex::new(()),
                started: AtomicBool::new(false),
                events,
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
                metrics,
            }),
        }
    }

    /// Start the periodic sync loop. Later calls have no effect.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(async move {
            let mut interval = tokio::time::interval(inner.config.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(interval_ms = inner.config.interval_ms, "Sync loop started");
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = interval.tick() => inner.tick().await,
                }
            }
            info!("Sync loop stopped");
        });
    }

    /// Run one sync pass now.
    ///
    /// Enters `Syncing` regardless of the current mode. If a pass is already
    /// running, waits for it to finish instead of starting another one.
    pub async fn force_sync(&self) -> Result<(), SyncError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SyncError::Closed);
        }

        *self.inner.caught_up_at.lock() = None;
        self.inner.set_mode(SyncMode::Syncing);

        match self.inner.run_lock.try_lock() {
            Ok(_guard) => self.inner.run().await.map_err(SyncError::from),
            Err(_) => {
                debug!("Sync already running, waiting for it");
                let _guard = self.inner.run_lock.lock().await;
                Ok(())
            }
        }
    }

    /// Record a layer announced on gossip.
    pub fn on_gossip_layer(&self, layer: LayerId) {
        self.inner.on_gossip_layer(layer);
    }

    pub fn sync_state(&self) -> SyncState {
        SyncState {
            processed_layer: self.processed_layer(),
            latest_layer_seen_on_gossip: self.inner.gossip_layer(),
            mode: self.mode(),
        }
    }

    pub fn processed_layer(&self) -> LayerId {
        self.inner.processed_layer()
    }

    pub fn mode(&self) -> SyncMode {
        *self.inner.mode.lock()
    }

    /// Subscribe to per-layer completion and failure notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LayerEvent> {
        self.inner.events.subscribe()
    }

    pub fn layer_fetcher(&self) -> &LayerFetcher<T> {
        &self.inner.layer_fetcher
    }

    /// Get sync statistics.
    pub fn stats(&self) -> SyncStats {
        let fetcher = self.inner.layer_fetcher.fetcher();
        SyncStats {
            state: self.sync_state(),
            peers: fetcher.transport().peers(ArtifactKind::Block).len(),
            excluded_peers: fetcher.excluded_peers(),
            fetches_in_flight: fetcher.in_flight(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop the sync loop and wait for in-flight work to wind down.
    ///
    /// A layer whose fetch is interrupted is never handed to the mesh.
    pub async fn close(&self) {
        info!("Closing sync service");
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        // Wait out a forced run executing on a caller's task.
        drop(self.inner.run_lock.lock().await);
        self.inner.layer_fetcher.fetcher().close().await;
        info!(processed_layer = %self.processed_layer(), "Sync service closed");
    }
}

impl<T: PeerTransport, M: Mesh> Inner<T, M> {
    fn processed_layer(&self) -> LayerId {
        LayerId(self.processed.load(Ordering::Acquire))
    }

    fn gossip_layer(&self) -> LayerId {
        LayerId(self.gossip.load(Ordering::Acquire))
    }

    async fn tick(&self) {
        let Ok(_guard) = self.run_lock.try_lock() else {
            debug!("Sync run in progress, skipping tick");
            return;
        };

        if let Err(error) = self.run().await {
            debug!(%error, "Sync run ended early");
        }
    }

    /// One pass: fetch layers up to the target, then re-evaluate the mode.
    ///
    /// Must be called with `run_lock` held.
    async fn run(&self) -> Result<(), LayerError> {
        let peers = self.layer_fetcher.fetcher().candidates(ArtifactKind::Block);
        self.metrics.set_peers(peers.len() as i64);
        if peers.is_empty() {
            warn!("No peers to sync from");
            *self.caught_up_at.lock() = None;
            self.set_mode(SyncMode::NotSynced);
            return Ok(());
        }
        if *self.mode.lock() == SyncMode::NotSynced {
            self.set_mode(SyncMode::Syncing);
        }

        let processed = self.processed_layer();
        let window_end = LayerId(processed.0.saturating_add(self.config.sync_window));
        let target = self
            .gossip_layer()
            .min(self.clock.current_layer())
            .min(window_end);

        if processed < target {
            debug!(processed_layer = %processed, target_layer = %target, "Syncing layers");
        }

        for layer in processed.next().range_to(target) {
            if let Err(error) = self.sync_layer(layer).await {
                *self.caught_up_at.lock() = None;
                return Err(error);
            }
        }

        self.evaluate_mode();
        Ok(())
    }

    async fn sync_layer(&self, layer: LayerId) -> Result<(), LayerError> {
        let result = self.fetch_and_apply(layer).await;

        match &result {
            Ok(artifacts) => {
                self.metrics.inc_layers_fetched("ok");
                info!(%layer, artifacts, "Layer synced");
                let _ = self.events.send(LayerEvent::Complete {
                    layer,
                    artifacts: *artifacts,
                });
            }
            Err(LayerError::Cancelled) => {
                self.metrics.inc_layers_fetched(LayerError::Cancelled.label());
                debug!(%layer, "Layer sync cancelled");
            }
            Err(error) => {
                self.metrics.inc_layers_fetched(error.label());
                warn!(%layer, %error, "Layer sync failed, retrying next tick");
                let _ = self.events.send(LayerEvent::Failed {
                    layer,
                    error: error.clone(),
                });
            }
        }

        result.map(|_| ())
    }

    async fn fetch_and_apply(&self, layer: LayerId) -> Result<usize, LayerError> {
        let fetched = self.layer_fetcher.fetch_layer(layer, &self.shutdown).await?;
        if self.shutdown.is_cancelled() {
            return Err(LayerError::Cancelled);
        }

        let artifacts = fetched.len();
        self.mesh
            .validate_layer(fetched)
            .await
            .map_err(|err| LayerError::Mesh {
                layer,
                reason: err.to_string(),
            })?;

        self.processed.fetch_max(layer.0, Ordering::AcqRel);
        self.metrics.set_processed_layer(i64::from(layer.0));
        self.layer_fetcher.forget_below(layer);

        Ok(artifacts)
    }

    fn on_gossip_layer(&self, layer: LayerId) {
        let previous = self.gossip.fetch_max(layer.0, Ordering::AcqRel);
        if layer.0 > previous {
            self.metrics.set_gossip_layer(i64::from(layer.0));
            debug!(%layer, "New layer seen on gossip");
        }

        if layer > self.processed_layer() {
            let mut caught_up_at = self.caught_up_at.lock();
            *caught_up_at = None;
            if *self.mode.lock() == SyncMode::Synced {
                self.set_mode(SyncMode::Syncing);
            }
        }
    }

    /// `Synced` requires two consecutive caught-up runs at the same gossip layer.
    ///
    /// Gossip is read and the mode decided under the `caught_up_at` lock, which
    /// `on_gossip_layer` also takes before demoting, so a layer announced during
    /// evaluation is never lost.
    pub(super) fn evaluate_mode(&self) {
        let mut caught_up_at = self.caught_up_at.lock();
        let processed = self.processed_layer();
        let gossip = self.gossip_layer();

        if processed < gossip {
            *caught_up_at = None;
            if *self.mode.lock() == SyncMode::Synced {
                self.set_mode(SyncMode::Syncing);
            }
        } else if *caught_up_at == Some(gossip) {
            self.set_mode(SyncMode::Synced);
        } else {
            *caught_up_at = Some(gossip);
        }
    }

    fn set_mode(&self, next: SyncMode) {
        let previous = {
            let mut mode = self.mode.lock();
            let previous = *mode;
            *mode = next;
            previous
        };
        if previous == next {
            return;
        }

        if !previous.can_transition_to(next) {
            debug!(from = previous.as_str(), to = next.as_str(), "Unexpected sync mode transition");
        }
        info!(
            from = previous.as_str(),
            to = next.as_str(),
            processed_layer = %self.processed_layer(),
            gossip_layer = %self.gossip_layer(),
            "Sync mode changed"
        );
        self.metrics.set_sync_mode(next.as_gauge());
    }
}
