pub mod source;
pub mod memory;
pub mod rpc_client;
pub mod scanner;

pub use source::{NodeDataSource, FULL_TX_VERBOSITY};
pub use memory::InMemoryChain;
pub use rpc_client::{RpcCredentials, RpcNodeClient};
pub use scanner::{BlockProgress, OutputHistogramBuilder, ScanStats, SkipCounts};
