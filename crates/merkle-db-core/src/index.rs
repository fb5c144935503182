//! Secondary index engine: a user `mapFn` projects documents onto an
//! orderable key, and range queries are served from a prolly tree kept
//! incrementally in sync with the underlying database.

use crate::clock::Head;
use crate::crdt::Database;
use crate::error::{CoreError, Result};
use crate::prolly::{ProllyTree, TreeEntry};
use merkle_blockstore::BlockStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// A value emitted by `mapFn`. Covers the JSON-ish scalar types a
/// document's indexed field is likely to be.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmittedKey {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

/// The forward index's composite key: ordered by the emitted key, then
/// by document id, matching the spec's "ordered by key then id".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    pub emitted: EmittedKey,
    pub doc_id: String,
}

/// Inclusive-inclusive range over emitted keys.
#[derive(Clone, Debug)]
pub struct Range {
    pub lo: EmittedKey,
    pub hi: EmittedKey,
}

#[derive(Clone, Debug)]
pub struct IndexRow {
    pub id: String,
    pub key: EmittedKey,
    pub value: Vec<u8>,
}

/// `mapFn(docId, docValue, emit)`. Must be deterministic and
/// side-effect-free; returning `Err` aborts the update with no partial
/// state change, surfaced as `IndexBuildError`.
pub trait MapFn: Fn(&str, &[u8], &mut dyn FnMut(EmittedKey, Vec<u8>)) -> std::result::Result<(), String> + Send + Sync {}
impl<F> MapFn for F where
    F: Fn(&str, &[u8], &mut dyn FnMut(EmittedKey, Vec<u8>)) -> std::result::Result<(), String> + Send + Sync
{
}

struct IndexState {
    index_root: Option<cid::Cid>,
    by_id_root: Option<cid::Cid>,
    db_head: Head,
}

/// A lazily-maintained secondary index over a [`Database`]. Holds only
/// a read handle onto the database's block store and `changesSince`
/// operation; it never owns the database upward.
pub struct Index<S: BlockStore> {
    database: Arc<Database<S>>,
    store: Arc<S>,
    map_fn: Arc<dyn MapFn>,
    state: Mutex<IndexState>,
}

impl<S: BlockStore> Index<S> {
    pub fn new(database: Arc<Database<S>>, store: Arc<S>, map_fn: impl MapFn + 'static) -> Self {
        Self {
            database,
            store,
            map_fn: Arc::new(map_fn),
            state: Mutex::new(IndexState {
                index_root: None,
                by_id_root: None,
                db_head: Head::new(),
            }),
        }
    }

    /// Bring the index up to date with every database change since the
    /// last call. Idempotent if there is nothing new to apply.
    #[instrument(skip(self))]
    pub async fn update_index(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let prior_head = state.db_head.clone();
        let since = if prior_head.is_empty() {
            None
        } else {
            Some(&prior_head)
        };
        let changes = self.database.changes_since(since).await?;

        let mut invalidations = Vec::new();
        if !prior_head.is_empty() {
            if let Some(by_id_cid) = state.by_id_root {
                let by_id_tree: ProllyTree<String, Vec<IndexKey>, S> =
                    ProllyTree::load(Arc::clone(&self.store), by_id_cid);
                let changed_ids: Vec<String> = changes.rows.iter().map(|r| r.key.clone()).collect();
                let priors = by_id_tree.get_many(&changed_ids).await?;
                for prior_keys in priors {
                    for key in prior_keys {
                        invalidations.push(TreeEntry::Del(key));
                    }
                }
            }
        }

        let index_tree: ProllyTree<IndexKey, Vec<u8>, S> = match state.index_root {
            Some(cid) => ProllyTree::load(Arc::clone(&self.store), cid),
            None => ProllyTree::new(Arc::clone(&self.store)),
        };
        let (root_after_invalidation, invalidation_blocks) =
            index_tree.bulk(invalidations).await?;
        for block in invalidation_blocks {
            self.store.put(block).await?;
        }

        let mut forward_entries = Vec::new();
        let mut by_id_entries = Vec::new();
        for row in &changes.rows {
            if row.del {
                continue;
            }
            let doc_id = row.key.clone();
            let value = row.value.clone().unwrap_or_default();

            let mut emitted_keys = Vec::new();
            {
                let mut emit = |k: EmittedKey, v: Vec<u8>| {
                    let composite = IndexKey {
                        emitted: k,
                        doc_id: doc_id.clone(),
                    };
                    emitted_keys.push(composite.clone());
                    forward_entries.push(TreeEntry::Put(composite, v));
                };
                (self.map_fn)(&doc_id, &value, &mut emit)
                    .map_err(CoreError::IndexBuildError)?;
            }
            by_id_entries.push(TreeEntry::Put(doc_id, emitted_keys));
        }

        let index_tree2: ProllyTree<IndexKey, Vec<u8>, S> =
            ProllyTree::load(Arc::clone(&self.store), root_after_invalidation);
        let (final_index_root, index_blocks) = index_tree2.bulk(forward_entries).await?;
        for block in index_blocks {
            self.store.put(block).await?;
        }

        let by_id_tree: ProllyTree<String, Vec<IndexKey>, S> = match state.by_id_root {
            Some(cid) => ProllyTree::load(Arc::clone(&self.store), cid),
            None => ProllyTree::new(Arc::clone(&self.store)),
        };
        let (final_by_id_root, by_id_blocks) = by_id_tree.bulk(by_id_entries).await?;
        for block in by_id_blocks {
            self.store.put(block).await?;
        }

        state.index_root = Some(final_index_root);
        state.by_id_root = Some(final_by_id_root);
        state.db_head = changes.head;
        Ok(())
    }

    /// Run a range query, refreshing the index first unless `root` is
    /// supplied to pin a historical snapshot.
    #[instrument(skip(self))]
    pub async fn query(&self, range: Range) -> Result<Vec<IndexRow>> {
        self.update_index().await?;
        self.query_at(range, None).await
    }

    /// Query a specific historical index root without refreshing.
    pub async fn query_at(&self, range: Range, root: Option<cid::Cid>) -> Result<Vec<IndexRow>> {
        let root = match root {
            Some(cid) => Some(cid),
            None => self.state.lock().await.index_root,
        };
        match root {
            None => Ok(vec![]),
            Some(cid) => {
                let tree: ProllyTree<IndexKey, Vec<u8>, S> =
                    ProllyTree::load(Arc::clone(&self.store), cid);
                let lo = IndexKey {
                    emitted: range.lo,
                    doc_id: String::new(),
                };
                let hi = IndexKey {
                    emitted: range.hi,
                    doc_id: MAX_DOC_ID_SENTINEL.to_string(),
                };
                let rows = tree.range(&lo, &hi).await?;
                Ok(rows
                    .into_iter()
                    .map(|(k, v)| IndexRow {
                        id: k.doc_id,
                        key: k.emitted,
                        value: v,
                    })
                    .collect())
            }
        }
    }

    pub async fn index_root(&self) -> Option<cid::Cid> {
        self.state.lock().await.index_root
    }
}

/// High enough in Unicode scalar order to sort after any ordinary
/// document id used as a range query's upper bound.
const MAX_DOC_ID_SENTINEL: &str = "\u{10FFFF}\u{10FFFF}\u{10FFFF}\u{10FFFF}";
