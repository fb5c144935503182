//! # merkle-blockstore
//!
//! Content-addressed byte block store keyed by CID.
//!
//! This crate provides:
//! - **Blocks**: immutable `(cid, bytes)` pairs, `cid = hash(bytes, codec)`
//! - **CID utilities**: SHA-256 multihash construction under raw / DAG-CBOR codecs
//! - **`BlockStore`**: the trait the causal log and prolly tree are built on
//! - **`MemoryBlockStore`**: an in-memory, concurrent-safe-for-reads implementation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Clock / Prolly Tree / Index        │
//! ├─────────────────────────────────────────┤
//! │            BlockStore trait              │
//! ├─────────────────────────────────────────┤
//! │             MemoryBlockStore             │
//! └─────────────────────────────────────────┘
//! ```

pub mod block;
pub mod cid_utils;
pub mod error;
pub mod memory;

pub use block::{Block, BlockRef};
pub use cid_utils::{create_cid, verify_cid, CidCodec};
pub use error::{BlockStoreError, Result};
pub use memory::MemoryBlockStore;

use async_trait::async_trait;
use cid::Cid;

/// Trait for content-addressed block storage backends.
///
/// Writes are idempotent: `put`ting the same `(cid, bytes)` pair twice is a
/// no-op the second time. Reads are safe to call concurrently with other
/// reads and with puts of unrelated CIDs.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block under its CID. Idempotent.
    async fn put(&self, block: Block) -> Result<()>;

    /// Retrieve a block by CID, or `NotFound` if absent.
    async fn get(&self, cid: &Cid) -> Result<Block>;

    /// Check whether a CID is present without fetching its bytes.
    async fn has(&self, cid: &Cid) -> Result<bool>;

    /// Iterate all blocks currently held (for testing and replica sync).
    async fn entries(&self) -> Result<Vec<Block>>;

    /// Encode a value as canonical DAG-CBOR, store it, and return its CID.
    async fn put_ipld<T: serde::Serialize + Send + Sync>(&self, value: &T) -> Result<Cid> {
        let bytes = serde_ipld_dagcbor::to_vec(value)
            .map_err(|e| BlockStoreError::Serialization(e.to_string()))?;
        let cid = create_cid(&bytes, CidCodec::DagCbor);
        self.put(Block::new(cid, bytes.into())).await?;
        Ok(cid)
    }

    /// Fetch a block and decode it as DAG-CBOR.
    async fn get_ipld<T: serde::de::DeserializeOwned>(&self, cid: &Cid) -> Result<T> {
        let block = self.get(cid).await?;
        serde_ipld_dagcbor::from_slice(&block.data)
            .map_err(|e| BlockStoreError::Deserialization(e.to_string()))
    }
}
