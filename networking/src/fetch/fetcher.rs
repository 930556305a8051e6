use std::collections::HashMap;
use std::sync::Arc;

use containers::{ArtifactHash, ArtifactKind, Bytes};
use futures::stream::{self, StreamExt};
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::config::FetchConfig;
use super::peer_manager::{ExclusionReason, FetchPeer, PeerManager};
use super::pending::{Promise, Waiter};
use crate::error::FetchError;
use crate::req_resp::{SyncRequest, SyncResponse};
use crate::types::PeerTransport;

/// Verified artifact bytes and the peer that served them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub hash: ArtifactHash,
    pub kind: ArtifactKind,
    pub data: Bytes,
    pub peer: PeerId,
}

pub type FetchResult = Result<Fetched, FetchError>;

/// Why a single round-trip to one peer did not produce the artifact.
#[derive(Debug)]
enum Attempt {
    NotFound,
    Timeout,
    Corrupt,
    Transport(String),
    Remote(String),
    Unexpected,
    Shutdown,
}

impl Attempt {
    fn label(&self) -> &'static str {
        match self {
            Attempt::NotFound => "not_found",
            Attempt::Timeout => "timeout",
            Attempt::Corrupt => "corrupt",
            Attempt::Transport(_) => "transport_error",
            Attempt::Remote(_) => "remote_error",
            Attempt::Unexpected => "unexpected_response",
            Attempt::Shutdown => "shutdown",
        }
    }
}

struct Inner<T> {
    config: FetchConfig,
    transport: Arc<T>,
    pending: Mutex<HashMap<ArtifactHash, Arc<Promise<FetchResult>>>>,
    peers: Mutex<PeerManager>,
    peer_limits: Mutex<HashMap<PeerId, Arc<Semaphore>>>,
    global_limit: Semaphore,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    metrics: SharedMetrics,
}

/// Hash-addressed artifact fetcher shared by all sync components.
///
/// Cloning is cheap; clones share the in-flight table, peer book-keeping
/// and fan-out limits.
pub struct Fetcher<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Fetcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: PeerTransport> Fetcher<T> {
    pub fn new(config: FetchConfig, transport: Arc<T>, metrics: SharedMetrics) -> Self {
        let global_limit = Semaphore::new(config.max_inflight.max(1));

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                pending: Mutex::new(HashMap::new()),
                peers: Mutex::new(PeerManager::new()),
                peer_limits: Mutex::new(HashMap::new()),
                global_limit,
                tasks: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                metrics,
            }),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    /// Fetch one artifact by hash.
    ///
    /// Concurrent calls for the same hash share one round-trip sequence and
    /// receive the same result. Dropping the returned future abandons only
    /// this caller's wait; the fetch keeps running for other waiters.
    pub async fn fetch(&self, hash: ArtifactHash, kind: ArtifactKind, deadline: Instant) -> FetchResult {
        settle(self.request(hash, kind, deadline, Vec::new())).await
    }

    /// Fetch many artifacts of one kind, bounded by `batch_concurrency`.
    ///
    /// Every requested hash has an entry in the returned map.
    pub async fn fetch_batch(
        &self,
        hashes: impl IntoIterator<Item = ArtifactHash>,
        kind: ArtifactKind,
    ) -> HashMap<ArtifactHash, FetchResult> {
        self.fetch_batch_from(hashes, kind, &HashMap::new()).await
    }

    /// Like [`Fetcher::fetch_batch`], trying the peers listed in `sources`
    /// for a hash before the remaining candidates.
    pub async fn fetch_batch_from(
        &self,
        hashes: impl IntoIterator<Item = ArtifactHash>,
        kind: ArtifactKind,
        sources: &HashMap<ArtifactHash, Vec<PeerId>>,
    ) -> HashMap<ArtifactHash, FetchResult> {
        let deadline = Instant::now() + self.inner.config.deadline();

        stream::iter(hashes)
            .map(|hash| {
                let preferred = sources.get(&hash).cloned().unwrap_or_default();
                let waiter = self.request(hash, kind, deadline, preferred);
                async move { (hash, settle(waiter).await) }
            })
            .buffer_unordered(self.inner.config.batch_concurrency.max(1))
            .collect()
            .await
    }

    /// Join the in-flight fetch for `hash` or start a new one.
    fn request(
        &self,
        hash: ArtifactHash,
        kind: ArtifactKind,
        deadline: Instant,
        preferred: Vec<PeerId>,
    ) -> Waiter<FetchResult> {
        let promise = Arc::new(Promise::new());
        let waiter = promise.waiter();

        if self.inner.shutdown.is_cancelled() {
            promise.resolve(Err(FetchError::Cancelled));
            return waiter;
        }

        let in_flight = {
            let mut pending = self.inner.pending.lock();
            if let Some(existing) = pending.get(&hash) {
                debug!(hash = %hash.short(), %kind, "Joining in-flight fetch");
                return existing.waiter();
            }
            pending.insert(hash, Arc::clone(&promise));
            pending.len()
        };
        self.inner.metrics.set_fetches_in_flight(in_flight as i64);

        let guard = PendingGuard {
            inner: Arc::clone(&self.inner),
            hash,
            promise,
        };

        self.inner.tasks.spawn(async move {
            let inner = Arc::clone(&guard.inner);
            let result = tokio::select! {
                _ = inner.shutdown.cancelled() => Err(FetchError::Cancelled),
                result = inner.round_trips(hash, kind, deadline, &preferred) => result,
            };

            if let Err(error) = &result {
                debug!(hash = %hash.short(), %kind, %error, "Fetch failed");
            }
            guard.complete(result);
        });

        waiter
    }

    /// Non-excluded candidate peers for `kind`, in preference order.
    pub fn candidates(&self, kind: ArtifactKind) -> Vec<PeerId> {
        let offered = self.inner.transport.peers(kind);
        self.inner.peers.lock().candidates(&offered)
    }

    /// Exclude a peer for the rest of the session.
    ///
    /// Returns `true` if the peer was not excluded before.
    pub fn exclude_peer(&self, peer_id: &PeerId, reason: ExclusionReason) -> bool {
        self.inner.exclude(peer_id, reason)
    }

    pub fn is_excluded(&self, peer_id: &PeerId) -> bool {
        self.inner.peers.lock().is_excluded(peer_id)
    }

    pub fn excluded_peers(&self) -> usize {
        self.inner.peers.lock().excluded_count()
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<FetchPeer> {
        self.inner.peers.lock().get_peer(peer_id).cloned()
    }

    /// Hashes with a round-trip sequence currently in progress.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_in_flight(&self, hash: &ArtifactHash) -> bool {
        self.inner.pending.lock().contains_key(hash)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Cancel all in-flight fetches and wait for their tasks to finish.
    ///
    /// Waiters of cancelled fetches receive [`FetchError::Cancelled`].
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        self.inner.global_limit.close();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }
}

impl<T: PeerTransport> Inner<T> {
    async fn round_trips(
        &self,
        hash: ArtifactHash,
        kind: ArtifactKind,
        deadline: Instant,
        preferred: &[PeerId],
    ) -> FetchResult {
        let offered = self.transport.peers(kind);
        let mut candidates = self.peers.lock().candidates(&offered);
        candidates.sort_by_key(|peer| !preferred.contains(peer));

        let mut attempts = 0;
        let mut denied_by = Vec::new();
        for peer in candidates {
            if Instant::now() >= deadline {
                return Err(FetchError::DeadlineExceeded { hash });
            }
            // Another fetch may have excluded this peer since the list was built.
            if self.peers.lock().is_excluded(&peer) {
                continue;
            }

            attempts += 1;
            match self.request_from(peer, hash, kind, deadline).await {
                Ok(data) => {
                    debug!(hash = %hash.short(), %kind, %peer, "Fetched artifact");
                    return Ok(Fetched { hash, kind, data, peer });
                }
                Err(Attempt::Corrupt) => {
                    let error = FetchError::CorruptData { hash, peer };
                    warn!(%error, "Excluding peer");
                    self.exclude(&peer, ExclusionReason::CorruptData);
                }
                Err(Attempt::Shutdown) => return Err(FetchError::Cancelled),
                Err(Attempt::NotFound) => {
                    debug!(hash = %hash.short(), %kind, %peer, "Peer does not hold artifact, trying next");
                    denied_by.push(peer);
                }
                Err(attempt) => {
                    debug!(
                        hash = %hash.short(),
                        %kind,
                        %peer,
                        reason = attempt.label(),
                        detail = ?attempt,
                        "Peer did not serve artifact, trying next"
                    );
                }
            }
        }

        if Instant::now() >= deadline {
            Err(FetchError::DeadlineExceeded { hash })
        } else {
            Err(FetchError::NotAvailable {
                hash,
                kind,
                attempts,
                denied_by,
            })
        }
    }

    async fn request_from(
        &self,
        peer: PeerId,
        hash: ArtifactHash,
        kind: ArtifactKind,
        deadline: Instant,
    ) -> Result<Bytes, Attempt> {
        let peer_limit = self.peer_limit(&peer);
        let permits = timeout_at(deadline, async {
            let global = self.global_limit.acquire().await?;
            let local = peer_limit.acquire().await?;
            Ok::<_, tokio::sync::AcquireError>((global, local))
        })
        .await;
        let _permits = match permits {
            Ok(Ok(permits)) => permits,
            Ok(Err(_)) => return Err(Attempt::Shutdown),
            Err(_) => return Err(Attempt::Timeout),
        };

        self.peers.lock().on_request_start(&peer);
        let request_deadline = deadline.min(Instant::now() + self.config.request_timeout());
        let outcome = match timeout_at(request_deadline, self.exchange(peer, hash, kind)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Attempt::Timeout),
        };

        {
            let mut peers = self.peers.lock();
            match outcome {
                Ok(_) => peers.on_request_complete(&peer),
                Err(_) => peers.on_request_failure(&peer),
            }
        }
        let label = match &outcome {
            Ok(_) => "ok",
            Err(attempt) => attempt.label(),
        };
        self.metrics.inc_fetch_requests(kind.as_str(), label);

        outcome
    }

    async fn exchange(&self, peer: PeerId, hash: ArtifactHash, kind: ArtifactKind) -> Result<Bytes, Attempt> {
        let response = self
            .transport
            .send_request(peer, SyncRequest::Artifact { hash, kind })
            .await
            .map_err(|err| Attempt::Transport(err.to_string()))?;

        match response {
            SyncResponse::Artifact(data) if ArtifactHash::of(&data) == hash => Ok(data),
            SyncResponse::Artifact(_) => Err(Attempt::Corrupt),
            SyncResponse::NotFound => Err(Attempt::NotFound),
            SyncResponse::Error(message) => Err(Attempt::Remote(message)),
            _ => Err(Attempt::Unexpected),
        }
    }

    fn peer_limit(&self, peer: &PeerId) -> Arc<Semaphore> {
        let per_peer = self.config.max_inflight_per_peer.max(1);
        Arc::clone(
            self.peer_limits
                .lock()
                .entry(*peer)
                .or_insert_with(|| Arc::new(Semaphore::new(per_peer))),
        )
    }

    fn exclude(&self, peer_id: &PeerId, reason: ExclusionReason) -> bool {
        let (newly, excluded) = {
            let mut peers = self.peers.lock();
            let newly = peers.exclude(peer_id, reason);
            (newly, peers.excluded_count())
        };

        if newly {
            self.metrics.inc_peer_exclusions(reason.as_str());
            self.metrics.set_excluded_peers(excluded as i64);
        }
        newly
    }
}

/// Owns one in-flight table entry.
///
/// Dropping the guard without completing it (task aborted) still releases
/// the entry and wakes waiters with `Cancelled`.
struct PendingGuard<T> {
    inner: Arc<Inner<T>>,
    hash: ArtifactHash,
    promise: Arc<Promise<FetchResult>>,
}

impl<T> PendingGuard<T> {
    fn complete(self, result: FetchResult) {
        self.release();
        if !self.promise.resolve(result) {
            debug!(hash = %self.hash.short(), "Discarding late fetch result");
        }
    }

    fn release(&self) {
        let in_flight = {
            let mut pending = self.inner.pending.lock();
            if pending
                .get(&self.hash)
                .is_some_and(|current| Arc::ptr_eq(current, &self.promise))
            {
                pending.remove(&self.hash);
            }
            pending.len()
        };
        self.inner.metrics.set_fetches_in_flight(in_flight as i64);
    }
}

impl<T> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        if !self.promise.is_resolved() {
            self.release();
            self.promise.resolve(Err(FetchError::Cancelled));
        }
    }
}

async fn settle(waiter: Waiter<FetchResult>) -> FetchResult {
    waiter.wait().await.unwrap_or(Err(FetchError::Cancelled))
}
