//! Abstract access to a node's chain data

use async_trait::async_trait;

use crate::core::{Block, BlockHeader, NodeError};

/// `getblock` verbosity that includes fully decoded transactions
pub const FULL_TX_VERBOSITY: u8 = 2;

/// The chain queries the estimator needs.
///
/// Implementations own their session (connection, credentials) and are passed
/// explicitly to every component that fetches data.
#[async_trait]
pub trait NodeDataSource: Send + Sync {
    async fn get_chain_height(&self) -> Result<u64, NodeError>;

    async fn get_block_hash(&self, height: u64) -> Result<String, NodeError>;

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, NodeError>;

    async fn get_block(&self, hash: &str, verbosity: u8) -> Result<Block, NodeError>;

    async fn header_at(&self, height: u64) -> Result<BlockHeader, NodeError> {
        let hash = self.get_block_hash(height).await?;
        self.get_block_header(&hash).await
    }

    async fn block_at(&self, height: u64) -> Result<Block, NodeError> {
        let hash = self.get_block_hash(height).await?;
        self.get_block(&hash, FULL_TX_VERBOSITY).await
    }
}
