//! In-memory chain for replays and tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::source::NodeDataSource;
use crate::core::{Block, BlockHeader, NodeError, Transaction};

#[derive(Debug, Default)]
pub struct InMemoryChain {
    blocks: Vec<Block>,
    by_hash: HashMap<String, usize>,
    fetches: AtomicU64,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain of empty blocks with the given timestamps, heights from 0
    pub fn from_timestamps(timestamps: &[i64]) -> Self {
        let mut chain = Self::new();
        for &timestamp in timestamps {
            chain.push_block(timestamp, Vec::new());
        }
        chain
    }

    /// Appends a block at the next height and returns that height
    pub fn push_block(&mut self, timestamp: i64, transactions: Vec<Transaction>) -> u64 {
        let height = self.blocks.len() as u64;
        let hash = format!("{:064x}", height);
        self.by_hash.insert(hash.clone(), self.blocks.len());
        self.blocks.push(Block {
            hash,
            height,
            timestamp,
            transactions,
        });
        height
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Header and block fetches served so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    fn lookup(&self, hash: &str) -> Result<&Block, NodeError> {
        self.by_hash
            .get(hash)
            .and_then(|&i| self.blocks.get(i))
            .ok_or_else(|| NodeError::UnknownHash(hash.to_string()))
    }
}

#[async_trait]
impl NodeDataSource for InMemoryChain {
    async fn get_chain_height(&self) -> Result<u64, NodeError> {
        match self.blocks.len() {
            0 => Err(NodeError::UnknownHeight(0)),
            n => Ok(n as u64 - 1),
        }
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, NodeError> {
        usize::try_from(height)
            .ok()
            .and_then(|h| self.blocks.get(h))
            .map(|block| block.hash.clone())
            .ok_or(NodeError::UnknownHeight(height))
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, NodeError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.lookup(hash).map(Block::header)
    }

    async fn get_block(&self, hash: &str, _verbosity: u8) -> Result<Block, NodeError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.lookup(hash).cloned()
    }
}
