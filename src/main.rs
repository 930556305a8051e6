mod config;
mod network;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use chain::{LayerClock, LayerTimer, ManualClock};
use clap::Parser;
use containers::LayerId;
use metrics::Metrics;
use metrics::server::{MetricsServerConfig, run_metrics_server};
use networking::fetch::Fetcher;
use networking::layer_fetcher::LayerFetcher;
use networking::mesh::{ArtifactStores, MemoryMesh, Validators};
use networking::sync::SyncService;
use networking::types::LayerEvent;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::NodeConfig;
use crate::network::SyntheticChain;

/// Sync a synthetic chain from in-process peers and report progress.
#[derive(Parser, Debug)]
struct Args {
    /// Layer the node must process before exiting.
    #[arg(long, default_value_t = 101)]
    expected_layers: u32,

    #[arg(long, default_value_t = 4)]
    peers: usize,

    #[arg(long, default_value_t = 3)]
    blocks_per_layer: usize,

    #[arg(long, default_value_t = 8)]
    atxs_per_epoch: usize,

    /// YAML node config; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    layers_per_epoch: Option<u32>,

    #[arg(long)]
    request_timeout_ms: Option<u64>,

    #[arg(long)]
    sync_interval_ms: Option<u64>,

    /// Serve Prometheus metrics while syncing.
    #[arg(long)]
    metrics: bool,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    #[arg(long, default_value_t = 5054)]
    metrics_port: u16,
}

impl Args {
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load_from_file(path)?,
            None => NodeConfig::default(),
        };

        if let Some(layers_per_epoch) = self.layers_per_epoch {
            config.chain.layers_per_epoch = layers_per_epoch;
        }
        if let Some(timeout) = self.request_timeout_ms {
            config.fetch.request_timeout_ms = timeout;
        }
        if let Some(interval) = self.sync_interval_ms {
            config.sync.interval_ms = interval;
        }

        config.validate()?;
        if self.peers == 0 {
            bail!("at least one peer is required");
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.node_config()?;
    let target = LayerId(args.expected_layers);

    let metrics = Arc::new(Metrics::new());
    if args.metrics {
        let server_config = MetricsServerConfig {
            metrics_address: args.metrics_address,
            metrics_port: args.metrics_port,
        };
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(err) = run_metrics_server(server_config, metrics).await {
                warn!(%err, "Metrics server stopped");
            }
        });
    }

    let synthetic = SyntheticChain {
        chain: config.chain.clone(),
        last_layer: target,
        blocks_per_layer: args.blocks_per_layer,
        atxs_per_epoch: args.atxs_per_epoch,
    };
    let transport = synthetic.build(args.peers);
    info!(
        peers = args.peers,
        expected_layers = %target,
        effective_genesis = %config.chain.effective_genesis(),
        "Synthetic network ready"
    );

    let fetcher = Fetcher::new(config.fetch.clone(), transport, Arc::clone(&metrics));
    let layer_fetcher = LayerFetcher::new(
        config.layer_fetch.clone(),
        config.chain.clone(),
        fetcher,
        ArtifactStores::in_memory(),
        Validators::accept_all(),
        Arc::clone(&metrics),
    );
    // Without a configured genesis time the synthetic chain is fully elapsed.
    let clock: Arc<dyn LayerTimer> = if config.chain.genesis_time > 0 {
        Arc::new(LayerClock::from_config(&config.chain))
    } else {
        Arc::new(ManualClock::new(target))
    };
    let mesh = Arc::new(MemoryMesh::new(LayerId::GENESIS));
    let service = SyncService::new(
        config.sync.clone(),
        config.chain.clone(),
        clock,
        layer_fetcher,
        mesh,
        Arc::clone(&metrics),
    );

    let mut events = service.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                LayerEvent::Complete { layer, artifacts } => info!(%layer, artifacts, "Layer synced"),
                LayerEvent::Failed { layer, error } => warn!(%layer, %error, "Layer failed"),
            }
        }
    });

    service.on_gossip_layer(target);
    service.start();

    let started = Instant::now();
    let mut interval = tokio::time::interval(config.sync.interval());
    while service.processed_layer() < target {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                break;
            }
            _ = interval.tick() => {
                if let Err(error) = service.force_sync().await {
                    warn!(%error, "Forced sync failed");
                }
                let stats = service.stats();
                info!(
                    processed_layer = %stats.state.processed_layer,
                    target = %target,
                    mode = stats.state.mode.as_str(),
                    excluded_peers = stats.excluded_peers,
                    "Sync progress"
                );
            }
        }
    }

    let processed = service.processed_layer();
    service.close().await;

    if processed < target {
        bail!("stopped at layer {processed} before reaching {target}");
    }
    info!(
        processed_layer = %processed,
        elapsed_ms = duration_ms(started.elapsed()),
        "Sync finished"
    );
    Ok(())
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
