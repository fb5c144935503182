//! Event blocks: the atomic records that make up the clock's causal DAG

use cid::Cid;
use merkle_blockstore::{Block, BlockStore, CidCodec, Result as StoreResult};
use serde::{Deserialize, Serialize};

/// The payload carried by an event: either a write or a tombstone
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventData {
    /// `key` now maps to `value`
    Put { key: String, value: Vec<u8> },
    /// `key` has been removed
    Del { key: String },
}

impl EventData {
    /// The key this event touches
    pub fn key(&self) -> &str {
        match self {
            EventData::Put { key, .. } => key,
            EventData::Del { key } => key,
        }
    }
}

/// A node of the Merkle clock's causal DAG.
///
/// `parents` are the head CIDs this event was appended on top of; the
/// clock DAG is the transitive closure of `parents`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub parents: Vec<Cid>,
    pub data: EventData,
}

impl Event {
    /// Build an event referencing the given parents. Does not persist it.
    pub fn new(parents: Vec<Cid>, data: EventData) -> Self {
        Self { parents, data }
    }

    /// Encode this event to its canonical block form without storing it.
    pub fn to_block(&self) -> StoreResult<Block> {
        let bytes = serde_ipld_dagcbor::to_vec(self)
            .map_err(|e| merkle_blockstore::BlockStoreError::Serialization(e.to_string()))?;
        let cid = merkle_blockstore::create_cid(&bytes, CidCodec::DagCbor);
        Ok(Block::new(cid, bytes.into()))
    }

    /// Persist this event and return its CID.
    pub async fn store(&self, store: &impl BlockStore) -> StoreResult<Cid> {
        let block = self.to_block()?;
        let cid = block.cid;
        store.put(block).await?;
        Ok(cid)
    }

    /// Load an event by CID.
    pub async fn load(store: &impl BlockStore, cid: &Cid) -> StoreResult<Self> {
        store.get_ipld(cid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merkle_blockstore::MemoryBlockStore;

    #[tokio::test]
    async fn test_event_roundtrip() {
        let store = MemoryBlockStore::new();
        let event = Event::new(
            vec![],
            EventData::Put {
                key: "key".into(),
                value: b"v1".to_vec(),
            },
        );

        let cid = event.store(&store).await.unwrap();
        let loaded = Event::load(&store, &cid).await.unwrap();

        assert_eq!(loaded, event);
        assert_eq!(loaded.data.key(), "key");
    }

    #[test]
    fn test_event_cid_is_deterministic() {
        let event = Event::new(
            vec![],
            EventData::Del {
                key: "x".into(),
            },
        );
        let block1 = event.to_block().unwrap();
        let block2 = event.to_block().unwrap();
        assert_eq!(block1.cid, block2.cid);
    }
}
