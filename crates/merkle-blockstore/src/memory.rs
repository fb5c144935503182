//! In-memory block store

use crate::{Block, BlockStore, BlockStoreError, Result};
use async_trait::async_trait;
use cid::Cid;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::instrument;

/// An in-memory, append-only-within-a-session block store.
///
/// Backed by a `DashMap` so reads never block writers of unrelated keys,
/// matching the concurrency model in §5: writes are serialised by the
/// caller (the CRDT engine), reads are always concurrent-safe.
#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    blocks: Arc<DashMap<Cid, bytes::Bytes>>,
}

impl MemoryBlockStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self {
            blocks: Arc::new(DashMap::new()),
        }
    }

    /// Number of blocks currently stored
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the store holds no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    #[instrument(skip(self, block), fields(cid = %block.cid, size = block.data.len()))]
    async fn put(&self, block: Block) -> Result<()> {
        self.blocks.entry(block.cid).or_insert(block.data);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, cid: &Cid) -> Result<Block> {
        self.blocks
            .get(cid)
            .map(|entry| Block::new(*cid, entry.value().clone()))
            .ok_or(BlockStoreError::NotFound(*cid))
    }

    #[instrument(skip(self))]
    async fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.blocks.contains_key(cid))
    }

    #[instrument(skip(self))]
    async fn entries(&self) -> Result<Vec<Block>> {
        Ok(self
            .blocks
            .iter()
            .map(|e| Block::new(*e.key(), e.value().clone()))
            .collect())
    }
}
