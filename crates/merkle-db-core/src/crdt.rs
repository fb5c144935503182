//! The document database: a key/value store whose state is the
//! materialized prolly tree at the clock's current head, kept
//! convergent across replicas by `Clock::advance` and a deterministic
//! per-key conflict resolver.

use crate::clock::{Clock, ClockHandle, Head};
use crate::error::{CoreError, Result};
use crate::event::{Event, EventData};
use crate::prolly::{ProllyTree, TreeEntry};
use crate::subscribe::SubscriberRegistry;
use cid::Cid;
use merkle_blockstore::{Block, BlockStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Result of a committing mutation (`put`/`del`).
#[derive(Clone, Debug)]
pub struct PutResult {
    pub event: Cid,
    pub head: Head,
    pub root: Cid,
    /// Tree blocks this mutation produced. Already stored locally;
    /// returned so a caller can ship them to another replica.
    pub additions: Vec<Block>,
}

/// A single row of `changesSince`.
#[derive(Clone, Debug)]
pub struct ChangeRow {
    pub key: String,
    pub value: Option<Vec<u8>>,
    pub del: bool,
}

#[derive(Clone, Debug)]
pub struct ChangesSince {
    pub rows: Vec<ChangeRow>,
    pub head: Head,
}

struct DatabaseState {
    head: Head,
    root_cid: Option<Cid>,
}

/// A replica of a document database. Mutating operations are
/// serialized by an internal mutex; once an event block is durably
/// stored, the remaining state update runs to completion without an
/// intermediate await a caller's cancellation could observe.
pub struct Database<S: BlockStore> {
    store: Arc<S>,
    clock: Clock<S>,
    state: Mutex<DatabaseState>,
    subscribers: SubscriberRegistry,
}

impl<S: BlockStore> Database<S> {
    pub fn open(store: Arc<S>) -> Self {
        Self {
            clock: Clock::new(Arc::clone(&store)),
            store,
            state: Mutex::new(DatabaseState {
                head: Head::new(),
                root_cid: None,
            }),
            subscribers: SubscriberRegistry::new(),
        }
    }

    #[instrument(skip(self, value))]
    pub async fn put(&self, key: impl Into<String>, value: Vec<u8>) -> Result<PutResult> {
        self.mutate(EventData::Put {
            key: key.into(),
            value,
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn del(&self, key: impl Into<String>) -> Result<PutResult> {
        self.mutate(EventData::Del { key: key.into() }).await
    }

    async fn mutate(&self, data: EventData) -> Result<PutResult> {
        let mut guard = self.state.lock().await;

        let tree_entry = match &data {
            EventData::Put { key, value } => TreeEntry::Put(key.clone(), value.clone()),
            EventData::Del { key } => TreeEntry::Del(key.clone()),
        };

        let event = self.clock.create_event(&guard.head, data);
        let event_cid = event.store(self.store.as_ref()).await?;

        let tree: ProllyTree<String, Vec<u8>, S> = match guard.root_cid {
            Some(cid) => ProllyTree::load(Arc::clone(&self.store), cid),
            None => ProllyTree::new(Arc::clone(&self.store)),
        };
        let (root, additions) = tree.bulk(vec![tree_entry]).await?;
        for block in &additions {
            self.store.put(block.clone()).await?;
        }

        let new_head = self.clock.advance(&guard.head, event_cid).await?;
        guard.head = new_head.clone();
        guard.root_cid = Some(root);
        drop(guard);

        self.subscribers.notify();

        Ok(PutResult {
            event: event_cid,
            head: new_head,
            root,
            additions,
        })
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let root = self.state.lock().await.root_cid;
        match root {
            None => Err(CoreError::NotFound(key.to_string())),
            Some(cid) => {
                let tree: ProllyTree<String, Vec<u8>, S> =
                    ProllyTree::load(Arc::clone(&self.store), cid);
                tree.get(&key.to_string())
                    .await?
                    .ok_or_else(|| CoreError::NotFound(key.to_string()))
            }
        }
    }

    pub async fn get_all(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let root = self.state.lock().await.root_cid;
        match root {
            None => Ok(vec![]),
            Some(cid) => {
                let tree: ProllyTree<String, Vec<u8>, S> =
                    ProllyTree::load(Arc::clone(&self.store), cid);
                tree.iter().await
            }
        }
    }

    pub async fn head(&self) -> Head {
        self.state.lock().await.head.clone()
    }

    pub async fn get_clock(&self) -> ClockHandle {
        ClockHandle::from_head(&self.state.lock().await.head)
    }

    #[instrument(skip(self, since_head))]
    pub async fn changes_since(&self, since_head: Option<&Head>) -> Result<ChangesSince> {
        let head = self.state.lock().await.head.clone();

        let non_empty_since = since_head.filter(|h| !h.is_empty());
        match non_empty_since {
            None => {
                let rows = self
                    .get_all()
                    .await?
                    .into_iter()
                    .map(|(key, value)| ChangeRow {
                        key,
                        value: Some(value),
                        del: false,
                    })
                    .collect();
                Ok(ChangesSince { rows, head })
            }
            Some(since) => {
                let events = self.clock.since(&head, since).await?;
                let mut seen = HashSet::new();
                let mut rows = Vec::new();
                for (_, event) in events {
                    let key = event.data.key().to_string();
                    if !seen.insert(key.clone()) {
                        continue;
                    }
                    match event.data {
                        EventData::Put { value, .. } => rows.push(ChangeRow {
                            key,
                            value: Some(value),
                            del: false,
                        }),
                        EventData::Del { .. } => rows.push(ChangeRow {
                            key,
                            value: None,
                            del: true,
                        }),
                    }
                }
                Ok(ChangesSince { rows, head })
            }
        }
    }

    /// Fold an externally-learned event into this replica's head and
    /// recompute the tree.
    ///
    /// The delta the new head introduces (`since(new_head, head)`) tells
    /// us which keys may have changed, but the winning event for each of
    /// those keys must be picked from its *entire* causal history reachable
    /// from `new_head`, not just the delta — otherwise a key already
    /// materialized by a concurrent writer gets clobbered unconditionally
    /// instead of compared by the CID tiebreak, breaking convergence (S3).
    #[instrument(skip(self))]
    pub async fn advance(&self, event_cid: Cid) -> Result<Head> {
        let mut guard = self.state.lock().await;
        let new_head = self.clock.advance(&guard.head, event_cid).await?;
        if new_head == guard.head {
            return Ok(new_head);
        }

        let delta = self.clock.since(&new_head, &guard.head).await?;
        let touched_keys: HashSet<String> = delta
            .iter()
            .map(|(_, event)| event.data.key().to_string())
            .collect();

        let history = self.clock.since(&new_head, &Head::new()).await?;
        let candidates: Vec<(Cid, Event)> = history
            .into_iter()
            .filter(|(_, event)| touched_keys.contains(event.data.key()))
            .collect();
        let entries = self.resolve_latest_per_key(candidates).await?;

        let tree: ProllyTree<String, Vec<u8>, S> = match guard.root_cid {
            Some(cid) => ProllyTree::load(Arc::clone(&self.store), cid),
            None => ProllyTree::new(Arc::clone(&self.store)),
        };
        let (root, additions) = tree.bulk(entries).await?;
        for block in additions {
            self.store.put(block).await?;
        }

        guard.head = new_head.clone();
        guard.root_cid = Some(root);
        drop(guard);

        self.subscribers.notify();
        Ok(new_head)
    }

    /// Replace this replica's clock wholesale (e.g. restoring a
    /// previously-exported handle) and rebuild the tree to match.
    #[instrument(skip(self, handle))]
    pub async fn set_clock(&self, handle: ClockHandle) -> Result<()> {
        let new_head = handle.to_head();
        let mut guard = self.state.lock().await;

        if new_head.is_empty() {
            guard.head = new_head;
            guard.root_cid = None;
            return Ok(());
        }

        let events = self.clock.since(&new_head, &Head::new()).await?;
        let entries = self.resolve_latest_per_key(events).await?;

        let tree: ProllyTree<String, Vec<u8>, S> = ProllyTree::new(Arc::clone(&self.store));
        let (root, additions) = tree.bulk(entries).await?;
        for block in additions {
            self.store.put(block).await?;
        }

        guard.head = new_head;
        guard.root_cid = Some(root);
        Ok(())
    }

    /// Register `callback` to run (debounced) after any committing
    /// mutation. See [`SubscriberRegistry`] for the coalescing rule.
    pub fn subscribe(&self, label: impl Into<String>, callback: impl Fn() + Send + Sync + 'static) {
        self.subscribers.register(label, callback);
    }

    pub fn unsubscribe(&self, label: &str) {
        self.subscribers.unsubscribe(label);
    }

    /// Reduce a set of events to one winning `Put`/`Del` per key:
    /// among the events touching a key that are not a causal ancestor
    /// of another event touching that same key, the one with the
    /// highest CID byte order wins.
    async fn resolve_latest_per_key(
        &self,
        events: Vec<(Cid, Event)>,
    ) -> Result<Vec<TreeEntry<String, Vec<u8>>>> {
        let mut by_key: HashMap<String, Vec<(Cid, Event)>> = HashMap::new();
        for (cid, event) in events {
            by_key
                .entry(event.data.key().to_string())
                .or_default()
                .push((cid, event));
        }

        let mut out = Vec::with_capacity(by_key.len());
        for (key, candidates) in by_key {
            let winner = self.pick_winner(&candidates).await?;
            match &winner.1.data {
                EventData::Put { value, .. } => out.push(TreeEntry::Put(key, value.clone())),
                EventData::Del { .. } => out.push(TreeEntry::Del(key)),
            }
        }
        Ok(out)
    }

    async fn pick_winner<'a>(&self, candidates: &'a [(Cid, Event)]) -> Result<&'a (Cid, Event)> {
        if candidates.len() == 1 {
            return Ok(&candidates[0]);
        }

        let mut non_dominated = Vec::new();
        for (i, (cid_i, _)) in candidates.iter().enumerate() {
            let mut dominated = false;
            for (j, (cid_j, _)) in candidates.iter().enumerate() {
                if i != j && self.clock.is_ancestor(cid_i, cid_j).await? {
                    dominated = true;
                    break;
                }
            }
            if !dominated {
                non_dominated.push(i);
            }
        }

        let winner_idx = non_dominated
            .into_iter()
            .max_by_key(|&i| candidates[i].0)
            .expect("candidates is non-empty");
        Ok(&candidates[winner_idx])
    }
}
