pub mod clock;
pub mod config;

pub use clock::{LayerClock, LayerTimer, ManualClock};
pub use config::{ChainConfig, DEVNET_CONFIG};
