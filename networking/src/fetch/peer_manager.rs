//! Peer bookkeeping for content fetching.
//!
//! Tracks request counts per peer and the peers excluded for this session.
use libp2p_identity::PeerId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Peer sent bytes that do not hash to the requested hash.
    CorruptData,
    /// Peer sent an artifact the validator rejected.
    ValidationFailed,
    /// Peer listed an artifact in a manifest and then denied holding it.
    UnservedClaim,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::CorruptData => "corrupt_data",
            ExclusionReason::ValidationFailed => "validation_failed",
            ExclusionReason::UnservedClaim => "unserved_claim",
        }
    }
}

/// Fetch-specific peer state.
#[derive(Debug, Clone)]
pub struct FetchPeer {
    pub peer_id: PeerId,
    pub requests_in_flight: usize,
    pub successes: u64,
    pub failures: u64,
    pub excluded: Option<ExclusionReason>,
}

impl FetchPeer {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            requests_in_flight: 0,
            successes: 0,
            failures: 0,
            excluded: None,
        }
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded.is_some()
    }

    pub fn on_request_start(&mut self) {
        self.requests_in_flight += 1;
    }

    pub fn on_request_complete(&mut self) {
        self.requests_in_flight = self.requests_in_flight.saturating_sub(1);
        self.successes += 1;
    }

    pub fn on_request_failure(&mut self) {
        self.requests_in_flight = self.requests_in_flight.saturating_sub(1);
        self.failures += 1;
    }
}

/// Peer manager for fetch operations.
///
/// Filters the transport's candidate list down to peers that are still
/// trusted and records per-peer request outcomes.
#[derive(Debug, Default, Clone)]
pub struct PeerManager {
    peers: HashMap<PeerId, FetchPeer>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&mut self, peer_id: PeerId) -> &mut FetchPeer {
        self.peers
            .entry(peer_id)
            .or_insert_with(|| FetchPeer::new(peer_id))
    }

    pub fn get_peer(&self, peer_id: &PeerId) -> Option<&FetchPeer> {
        self.peers.get(peer_id)
    }

    /// Keep the offered peers that are not excluded, preserving their order.
    ///
    /// Peers seen for the first time are registered.
    pub fn candidates(&mut self, offered: &[PeerId]) -> Vec<PeerId> {
        offered
            .iter()
            .filter(|peer_id| !self.add_peer(**peer_id).is_excluded())
            .copied()
            .collect()
    }

    /// Exclude a peer for the rest of the session.
    ///
    /// Returns `true` if the peer was not excluded before.
    pub fn exclude(&mut self, peer_id: &PeerId, reason: ExclusionReason) -> bool {
        let peer = self.add_peer(*peer_id);
        if peer.is_excluded() {
            return false;
        }
        peer.excluded = Some(reason);
        true
    }

    pub fn is_excluded(&self, peer_id: &PeerId) -> bool {
        self.peers.get(peer_id).is_some_and(FetchPeer::is_excluded)
    }

    pub fn on_request_start(&mut self, peer_id: &PeerId) {
        self.add_peer(*peer_id).on_request_start();
    }

    pub fn on_request_complete(&mut self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.on_request_complete();
        }
    }

    pub fn on_request_failure(&mut self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.on_request_failure();
        }
    }

    pub fn excluded_count(&self) -> usize {
        self.peers.values().filter(|peer| peer.is_excluded()).count()
    }
}
