// Core modules
pub mod core;
pub mod config;

// Node access and day scanning
pub mod ingest;

// Histogram cleaning, stencil matching and price resolution
pub mod algo;

pub mod util;

// Re-export commonly used types for convenience
pub use self::core::*;
pub use config::{Calibration, Config};
pub use algo::{ChainStatus, PriceEstimate, PriceOracle};
pub use ingest::{InMemoryChain, NodeDataSource, RpcNodeClient};
