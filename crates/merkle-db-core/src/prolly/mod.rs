//! The prolly tree: an order-independent, content-addressed map used
//! both as the document store's root index and as the backing
//! structure for secondary indexes.
//!
//! Prolly trees (probabilistic B-trees) combine B-tree lookup cost
//! with Merkle-tree structural sharing: node boundaries are declared by
//! a rolling content hash rather than a fixed fan-out, so two trees
//! built from the same key set are byte-identical regardless of the
//! order entries were inserted in.

mod hash;
mod node;
mod tree;

pub use hash::BoundaryHasher;
pub use node::{BranchEntry, Entry, Node};
pub use tree::{ProllyTree, TreeEntry};

/// Default expected run length between chunk boundaries.
pub const DEFAULT_BUCKET_FACTOR: u32 = 3;
