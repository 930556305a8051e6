pub mod server;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    peers: IntGauge,
    excluded_peers: IntGauge,
    // Sync
    processed_layer: IntGauge,
    gossip_layer: IntGauge,
    sync_mode: IntGauge,
    layers_fetched: IntCounterVec,
    layer_fetch_time: HistogramVec,
    // Fetch
    fetch_requests: IntCounterVec,
    fetches_in_flight: IntGauge,
    peer_exclusions: IntCounterVec,
    atx_set_retries: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let peers = IntGauge::with_opts(Opts::new("sync_peers_known", "Number of peers offered by the transport")).unwrap();
        registry.register(Box::new(peers.clone())).unwrap();

        let excluded_peers = IntGauge::with_opts(Opts::new("sync_peers_excluded", "Number of peers excluded for this session")).unwrap();
        registry.register(Box::new(excluded_peers.clone())).unwrap();

        // Sync
        let processed_layer = IntGauge::with_opts(Opts::new("sync_processed_layer", "Highest layer handed to the mesh")).unwrap();
        registry.register(Box::new(processed_layer.clone())).unwrap();

        let gossip_layer = IntGauge::with_opts(Opts::new("sync_gossip_layer", "Highest layer seen on gossip")).unwrap();
        registry.register(Box::new(gossip_layer.clone())).unwrap();

        let sync_mode = IntGauge::with_opts(Opts::new("sync_mode", "Sync mode (0 not synced, 1 syncing, 2 synced)")).unwrap();
        registry.register(Box::new(sync_mode.clone())).unwrap();

        let layers_fetched = IntCounterVec::new(
            Opts::new("sync_layers_fetched_total", "Total number of layer fetch attempts by outcome"),
            &["result"],
        ).unwrap();
        registry.register(Box::new(layers_fetched.clone())).unwrap();

        let layer_fetch_time = HistogramVec::new(
            HistogramOpts::new("sync_layer_fetch_time_seconds", "Time taken to fetch and validate one layer")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &[],
        ).unwrap();
        registry.register(Box::new(layer_fetch_time.clone())).unwrap();

        // Fetch
        let fetch_requests = IntCounterVec::new(
            Opts::new("fetch_requests_total", "Total number of peer round-trips by artifact kind and result"),
            &["kind", "result"],
        ).unwrap();
        registry.register(Box::new(fetch_requests.clone())).unwrap();

        let fetches_in_flight = IntGauge::with_opts(Opts::new("fetch_in_flight", "Distinct hashes currently being fetched")).unwrap();
        registry.register(Box::new(fetches_in_flight.clone())).unwrap();

        let peer_exclusions = IntCounterVec::new(
            Opts::new("fetch_peer_exclusions_total", "Total number of peers excluded by reason"),
            &["reason"],
        ).unwrap();
        registry.register(Box::new(peer_exclusions.clone())).unwrap();

        let atx_set_retries = IntCounterVec::new(
            Opts::new("fetch_atx_set_retries_total", "Total number of epoch ATX set queries retried below quorum"),
            &[],
        ).unwrap();
        registry.register(Box::new(atx_set_retries.clone())).unwrap();

        Self {
            registry,
            peers,
            excluded_peers,
            processed_layer,
            gossip_layer,
            sync_mode,
            layers_fetched,
            layer_fetch_time,
            fetch_requests,
            fetches_in_flight,
            peer_exclusions,
            atx_set_retries,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).expect("failed to encode metrics");
        String::from_utf8(buffer).expect("metrics not utf8")
    }

    pub fn set_peers(&self, v: i64) {
        self.peers.set(v);
    }

    pub fn set_excluded_peers(&self, v: i64) {
        self.excluded_peers.set(v);
    }

    // Sync
    pub fn set_processed_layer(&self, v: i64) {
        self.processed_layer.set(v);
    }

    pub fn set_gossip_layer(&self, v: i64) {
        self.gossip_layer.set(v);
    }

    pub fn set_sync_mode(&self, v: i64) {
        self.sync_mode.set(v);
    }

    pub fn inc_layers_fetched(&self, result: &str) {
        self.layers_fetched.with_label_values(&[result]).inc();
    }

    pub fn observe_layer_fetch_time(&self, duration: f64) {
        self.layer_fetch_time.with_label_values::<&str>(&[]).observe(duration);
    }

    // Fetch
    pub fn inc_fetch_requests(&self, kind: &str, result: &str) {
        self.fetch_requests.with_label_values(&[kind, result]).inc();
    }

    pub fn set_fetches_in_flight(&self, v: i64) {
        self.fetches_in_flight.set(v);
    }

    pub fn inc_peer_exclusions(&self, reason: &str) {
        self.peer_exclusions.with_label_values(&[reason]).inc();
    }

    pub fn inc_atx_set_retries(&self) {
        self.atx_set_retries.with_label_values::<&str>(&[]).inc();
    }

    pub fn fetch_requests(&self, kind: &str, result: &str) -> u64 {
        self.fetch_requests.with_label_values(&[kind, result]).get()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<Metrics>;
