//! The prolly tree: an immutable, balanced, content-defined map.
//!
//! Trees are built bottom-up from the *sorted* key set, never from
//! insertion order, so equal key sets always produce an equal root CID
//! (see `test_permutation_invariance` below and the property test in
//! `crdt.rs`).

use super::{BoundaryHasher, BranchEntry, Entry, Node, DEFAULT_BUCKET_FACTOR};
use crate::error::{CoreError, Result};
use cid::Cid;
use merkle_blockstore::{Block, BlockStore, CidCodec};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::instrument;

/// A single change to apply in a `bulk` call.
#[derive(Clone, Debug)]
pub enum TreeEntry<K, V> {
    Put(K, V),
    Del(K),
}

/// A read/write handle onto a prolly tree rooted at a specific CID (or
/// `None` for the empty tree that hasn't been flushed yet).
pub struct ProllyTree<K, V, S: BlockStore> {
    root_cid: Option<Cid>,
    store: Arc<S>,
    bucket_factor: u32,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V, S> ProllyTree<K, V, S>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug,
    S: BlockStore,
{
    /// A fresh, empty tree with no persisted root yet.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            root_cid: None,
            store,
            bucket_factor: DEFAULT_BUCKET_FACTOR,
            _marker: std::marker::PhantomData,
        }
    }

    /// Open an existing tree by its root CID.
    pub fn load(store: Arc<S>, root_cid: Cid) -> Self {
        Self {
            root_cid: Some(root_cid),
            store,
            bucket_factor: DEFAULT_BUCKET_FACTOR,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn root_cid(&self) -> Option<Cid> {
        self.root_cid
    }

    /// Build a fresh tree from a batch, equivalent to `new(store).bulk(entries)`.
    pub async fn create(store: Arc<S>, entries: Vec<TreeEntry<K, V>>) -> Result<(Cid, Vec<Block>)> {
        Self::new(store).bulk(entries).await
    }

    #[instrument(skip(self, key))]
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        match self.root_cid {
            None => Ok(None),
            Some(cid) => self.get_in(cid, key).await,
        }
    }

    /// Looks up each key in order, skipping ones that are absent.
    pub async fn get_many(&self, keys: &[K]) -> Result<Vec<V>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(v) = self.get(key).await? {
                out.push(v);
            }
        }
        Ok(out)
    }

    /// Inclusive-inclusive range scan, ordered by `K`'s own ordering
    /// (for composite keys this is "by key then id" as long as `K`'s
    /// `Ord` impl orders that way, which this crate's `IndexKey` does).
    #[instrument(skip(self, lo, hi))]
    pub async fn range(&self, lo: &K, hi: &K) -> Result<Vec<(K, V)>> {
        let mut out = Vec::new();
        if let Some(cid) = self.root_cid {
            self.range_in(cid, lo, hi, &mut out).await?;
        }
        Ok(out)
    }

    /// All entries in ascending key order.
    pub async fn iter(&self) -> Result<Vec<(K, V)>> {
        let mut out = Vec::new();
        if let Some(cid) = self.root_cid {
            self.collect_in(cid, &mut out).await?;
        }
        Ok(out)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.iter().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Apply a batch of puts/deletes against this tree's current
    /// contents, returning the new root and every block the rebuild
    /// produced. Does not persist the blocks or mutate `self` — the
    /// caller (the CRDT engine) owns that decision.
    #[instrument(skip(self, entries))]
    pub async fn bulk(&self, entries: Vec<TreeEntry<K, V>>) -> Result<(Cid, Vec<Block>)> {
        let mut map: BTreeMap<K, V> = self.iter().await?.into_iter().collect();
        for entry in entries {
            match entry {
                TreeEntry::Put(k, v) => {
                    map.insert(k, v);
                }
                TreeEntry::Del(k) => {
                    map.remove(&k);
                }
            }
        }
        build_from_sorted(map.into_iter().collect(), self.bucket_factor)
    }

    fn get_in<'a>(
        &'a self,
        cid: Cid,
        key: &'a K,
    ) -> Pin<Box<dyn Future<Output = Result<Option<V>>> + Send + 'a>> {
        Box::pin(async move {
            let node: Node<K, V> = self.load_node(cid).await?;
            match node {
                Node::Leaf(entries) => {
                    Ok(entries.into_iter().find(|e| &e.key == key).map(|e| e.value))
                }
                Node::Branch(children) => match child_for_key(&children, key) {
                    Some(child_cid) => self.get_in(child_cid, key).await,
                    None => Ok(None),
                },
            }
        })
    }

    fn range_in<'a>(
        &'a self,
        cid: Cid,
        lo: &'a K,
        hi: &'a K,
        out: &'a mut Vec<(K, V)>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let node: Node<K, V> = self.load_node(cid).await?;
            match node {
                Node::Leaf(entries) => {
                    for e in entries {
                        if &e.key >= lo && &e.key <= hi {
                            out.push((e.key, e.value));
                        }
                    }
                }
                Node::Branch(children) => {
                    for (i, c) in children.iter().enumerate() {
                        let next_min = children.get(i + 1).map(|n| &n.min_key);
                        let overlaps_hi = &c.min_key <= hi;
                        let overlaps_lo = next_min.map_or(true, |nm| nm > lo);
                        if overlaps_hi && overlaps_lo {
                            self.range_in(c.child, lo, hi, out).await?;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    fn collect_in<'a>(
        &'a self,
        cid: Cid,
        out: &'a mut Vec<(K, V)>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let node: Node<K, V> = self.load_node(cid).await?;
            match node {
                Node::Leaf(entries) => {
                    for e in entries {
                        out.push((e.key, e.value));
                    }
                }
                Node::Branch(children) => {
                    for c in children {
                        self.collect_in(c.child, out).await?;
                    }
                }
            }
            Ok(())
        })
    }

    async fn load_node(&self, cid: Cid) -> Result<Node<K, V>> {
        self.store
            .get_ipld(&cid)
            .await
            .map_err(|_| CoreError::DecodeError {
                cid,
                reason: "failed to decode prolly tree node".to_string(),
            })
    }
}

fn child_for_key<K: Ord>(children: &[BranchEntry<K>], key: &K) -> Option<Cid> {
    let idx = children.partition_point(|c| &c.min_key <= key);
    if idx == 0 {
        None
    } else {
        Some(children[idx - 1].child)
    }
}

/// Build a tree bottom-up from a key-sorted, deduplicated entry list.
/// Always produces a root block, even for an empty batch (an empty leaf).
fn build_from_sorted<K, V>(entries: Vec<(K, V)>, bucket_factor: u32) -> Result<(Cid, Vec<Block>)>
where
    K: Clone + Ord + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    let hasher = BoundaryHasher::new(bucket_factor);
    let mut blocks = Vec::new();

    if entries.is_empty() {
        let node: Node<K, V> = Node::Leaf(vec![]);
        let block = encode_node(&node)?;
        let cid = block.cid;
        blocks.push(block);
        return Ok((cid, blocks));
    }

    let n = entries.len();
    let mut level: Vec<(K, Cid)> = Vec::new();
    let mut chunk: Vec<Entry<K, V>> = Vec::new();
    for (i, (key, value)) in entries.into_iter().enumerate() {
        let boundary_bytes = encode_pair(&key, &value)?;
        chunk.push(Entry { key, value });
        if hasher.is_boundary(&boundary_bytes) || i == n - 1 {
            let min_key = chunk[0].key.clone();
            let node: Node<K, V> = Node::Leaf(std::mem::take(&mut chunk));
            let block = encode_node(&node)?;
            level.push((min_key, block.cid));
            blocks.push(block);
        }
    }

    while level.len() > 1 {
        level = build_branch_level(level, &hasher, &mut blocks)?;
    }

    let root_cid = level.into_iter().next().map(|(_, cid)| cid).expect("non-empty entries always yield a root");
    Ok((root_cid, blocks))
}

fn build_branch_level<K>(
    level: Vec<(K, Cid)>,
    hasher: &BoundaryHasher,
    blocks: &mut Vec<Block>,
) -> Result<Vec<(K, Cid)>>
where
    K: Clone + Ord + Serialize + DeserializeOwned,
{
    let n = level.len();
    let mut next_level = Vec::new();
    let mut chunk: Vec<BranchEntry<K>> = Vec::new();
    for (i, (min_key, child)) in level.into_iter().enumerate() {
        let boundary_bytes = encode_branch_boundary(&min_key, &child)?;
        chunk.push(BranchEntry { min_key, child });
        if hasher.is_boundary(&boundary_bytes) || i == n - 1 {
            let level_min_key = chunk[0].min_key.clone();
            let node: Node<K, ()> = Node::Branch(std::mem::take(&mut chunk));
            let block = encode_node(&node)?;
            next_level.push((level_min_key, block.cid));
            blocks.push(block);
        }
    }
    Ok(next_level)
}

fn encode_node<K, V>(node: &Node<K, V>) -> Result<Block>
where
    K: Serialize,
    V: Serialize,
{
    let bytes = serde_ipld_dagcbor::to_vec(node)
        .map_err(|e| merkle_blockstore::BlockStoreError::Serialization(e.to_string()))?;
    let cid = merkle_blockstore::create_cid(&bytes, CidCodec::DagCbor);
    Ok(Block::new(cid, bytes.into()))
}

fn encode_pair<K: Serialize, V: Serialize>(key: &K, value: &V) -> Result<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(&(key, value))
        .map_err(|e| merkle_blockstore::BlockStoreError::Serialization(e.to_string()).into())
}

fn encode_branch_boundary<K: Serialize>(min_key: &K, child: &Cid) -> Result<Vec<u8>> {
    let mut bytes = serde_ipld_dagcbor::to_vec(min_key)
        .map_err(|e| merkle_blockstore::BlockStoreError::Serialization(e.to_string()))?;
    bytes.extend_from_slice(&child.to_bytes());
    Ok(bytes)
}
