//! Prolly tree node types: leaves hold entries inline, branches hold
//! pointers keyed by the minimum key of the subtree they cover.

use cid::Cid;
use serde::{Deserialize, Serialize};

/// A single key-value pair stored in a leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

/// A pointer to a child subtree, tagged with the minimum key it covers.
/// Children are ordered ascending by `min_key`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BranchEntry<K> {
    pub min_key: K,
    #[serde(with = "cid_serde")]
    pub child: Cid,
}

/// A node in the prolly tree. Every node is persisted as its own block;
/// a tree's root is the single node with no incoming pointer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Node<K, V> {
    Leaf(Vec<Entry<K, V>>),
    Branch(Vec<BranchEntry<K>>),
}

impl<K, V> Node<K, V> {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
}

mod cid_serde {
    use cid::Cid;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(cid: &Cid, s: S) -> Result<S::Ok, S::Error> {
        cid.to_string().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Cid, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
