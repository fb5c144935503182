//! The Merkle clock: append/advance protocol and causal-DAG traversal.
//!
//! A clock's `head` is the set of event CIDs with no known descendant.
//! `advance` folds a new event into that frontier; `since` walks the DAG
//! to produce the events one head has that another doesn't, in
//! reverse-topological order.

use crate::error::{CoreError, Result};
use crate::event::{Event, EventData};
use cid::Cid;
use lru::LruCache;
use merkle_blockstore::BlockStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;

/// The frontier of a clock: event CIDs with no known descendant among them.
pub type Head = BTreeSet<Cid>;

/// A JSON-equivalent handle for persisting a clock outside this crate.
///
/// The binding layer is expected to serialize this and later round-trip
/// it back through [`Clock::set_clock`]'s caller.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClockHandle {
    #[serde(with = "cid_vec_serde")]
    pub clock: Vec<Cid>,
}

impl ClockHandle {
    pub fn from_head(head: &Head) -> Self {
        Self {
            clock: head.iter().copied().collect(),
        }
    }

    pub fn to_head(&self) -> Head {
        self.clock.iter().copied().collect()
    }
}

mod cid_vec_serde {
    use cid::Cid;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(cids: &[Cid], s: S) -> std::result::Result<S::Ok, S::Error> {
        let strings: Vec<String> = cids.iter().map(|c| c.to_string()).collect();
        strings.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<Cid>, D::Error> {
        let strings = Vec::<String>::deserialize(d)?;
        strings
            .into_iter()
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Owns a parent-lookup cache over a block store and exposes the clock
/// algorithms from the causal-log design.
pub struct Clock<S: BlockStore> {
    store: Arc<S>,
    parent_cache: Mutex<LruCache<Cid, Vec<Cid>>>,
}

impl<S: BlockStore> Clock<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            parent_cache: Mutex::new(LruCache::new(NonZeroUsize::new(4096).unwrap())),
        }
    }

    /// Build (but do not persist) an event on top of the given parents.
    pub fn create_event(&self, parents: &Head, data: EventData) -> Event {
        Event::new(parents.iter().copied().collect(), data)
    }

    async fn parents_of(&self, cid: &Cid) -> Result<Vec<Cid>> {
        if let Some(parents) = self.parent_cache.lock().get(cid) {
            return Ok(parents.clone());
        }
        let event = Event::load(self.store.as_ref(), cid)
            .await
            .map_err(|_| CoreError::MissingEvent(*cid))?;
        self.parent_cache.lock().put(*cid, event.parents.clone());
        Ok(event.parents)
    }

    /// Bounded BFS: is `candidate` a (strict) ancestor of `descendant`?
    pub async fn is_ancestor(&self, candidate: &Cid, descendant: &Cid) -> Result<bool> {
        if candidate == descendant {
            return Ok(false);
        }
        let mut frontier = VecDeque::new();
        let mut visited = HashSet::new();
        frontier.push_back(*descendant);
        visited.insert(*descendant);

        while let Some(cur) = frontier.pop_front() {
            for parent in self.parents_of(&cur).await? {
                if &parent == candidate {
                    return Ok(true);
                }
                if visited.insert(parent) {
                    frontier.push_back(parent);
                }
            }
        }
        Ok(false)
    }

    /// Fold `new_event_cid` into `head` per the four-case rule.
    pub async fn advance(&self, head: &Head, new_event_cid: Cid) -> Result<Head> {
        if head.contains(&new_event_cid) {
            return Ok(head.clone());
        }

        let mut superseded = HashSet::new();
        for h in head {
            if self.is_ancestor(h, &new_event_cid).await? {
                superseded.insert(*h);
            }
        }
        if !superseded.is_empty() {
            let mut new_head: Head = head
                .iter()
                .filter(|h| !superseded.contains(h))
                .copied()
                .collect();
            new_head.insert(new_event_cid);
            return Ok(new_head);
        }

        for h in head {
            if self.is_ancestor(&new_event_cid, h).await? {
                return Ok(head.clone());
            }
        }

        let mut new_head = head.clone();
        new_head.insert(new_event_cid);
        Ok(new_head)
    }

    /// The ancestor-inclusive closure reachable by walking `parents` from `head`.
    async fn closure(&self, head: &Head) -> Result<HashSet<Cid>> {
        let mut visited: HashSet<Cid> = head.iter().copied().collect();
        let mut frontier: VecDeque<Cid> = head.iter().copied().collect();
        while let Some(cur) = frontier.pop_front() {
            for parent in self.parents_of(&cur).await? {
                if visited.insert(parent) {
                    frontier.push_back(parent);
                }
            }
        }
        Ok(visited)
    }

    /// Events reachable from `head` but not from `since_head`, in
    /// reverse-topological order (descendants before ancestors), with a
    /// deterministic CID-byte-order tiebreak among concurrent branches.
    pub async fn since(&self, head: &Head, since_head: &Head) -> Result<Vec<(Cid, Event)>> {
        let excluded = self.closure(since_head).await?;

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut roots: Vec<Cid> = head.iter().copied().filter(|c| !excluded.contains(c)).collect();
        roots.sort();

        for root in roots {
            self.dfs_postorder(root, &excluded, &mut visited, &mut order).await?;
        }

        order.reverse();

        let mut events = Vec::with_capacity(order.len());
        for cid in order {
            let event = Event::load(self.store.as_ref(), &cid)
                .await
                .map_err(|_| CoreError::MissingEvent(cid))?;
            events.push((cid, event));
        }
        Ok(events)
    }

    fn dfs_postorder<'a>(
        &'a self,
        cid: Cid,
        excluded: &'a HashSet<Cid>,
        visited: &'a mut HashSet<Cid>,
        order: &'a mut Vec<Cid>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if excluded.contains(&cid) || !visited.insert(cid) {
                return Ok(());
            }
            let mut parents = self.parents_of(&cid).await?;
            parents.sort();
            for parent in parents {
                self.dfs_postorder(parent, excluded, visited, order).await?;
            }
            order.push(cid);
            Ok(())
        })
    }
}
