use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chain::{ChainConfig, DEVNET_CONFIG};
use networking::fetch::FetchConfig;
use networking::layer_fetcher::LayerFetchConfig;
use networking::sync::SyncConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Settings of every sync component, loadable from YAML.
///
/// Missing sections and fields fall back to their defaults; the chain
/// section defaults to the devnet parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub chain: ChainConfig,
    pub fetch: FetchConfig,
    pub layer_fetch: LayerFetchConfig,
    pub sync: SyncConfig,
}

impl NodeConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let config: NodeConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing config {}", path.display()))?;

        info!(path = %path.display(), "Node config loaded");
        Ok(config)
    }

    /// Reject values the layer math and timers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chain.layers_per_epoch == 0 {
            bail!("layers per epoch must be positive");
        }
        if self.chain.layer_duration_ms == 0 {
            bail!("layer duration must be positive");
        }
        if self.sync.interval_ms == 0 {
            bail!("sync interval must be positive");
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain: DEVNET_CONFIG,
            fetch: FetchConfig::default(),
            layer_fetch: LayerFetchConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}
