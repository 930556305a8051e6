/// Hash-addressed content fetching.
///
/// Every artifact is requested by its content hash. The fetcher:
///
/// - **Deduplicates**: concurrent requests for one hash share a single
///   round-trip sequence and all observe the same outcome
/// - **Retries across peers**: candidates are tried one at a time in the
///   transport's preference order until one returns matching bytes
/// - **Verifies content**: payloads are re-hashed; a mismatch excludes the
///   peer for the rest of the session
/// - **Bounds fan-out**: global and per-peer limits on concurrent round-trips
///
/// Payloads are not cached. Callers persist what they accept.
pub mod config;
pub mod fetcher;
pub mod peer_manager;
pub mod pending;

pub use config::FetchConfig;
pub use fetcher::{FetchResult, Fetched, Fetcher};
pub use peer_manager::{ExclusionReason, FetchPeer, PeerManager};
pub use pending::{Promise, Waiter};
