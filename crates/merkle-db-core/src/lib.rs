//! # merkle-db-core
//!
//! Causal log and indexed key-value engine built on top of
//! `merkle-blockstore`.
//!
//! This crate provides:
//! - **Clock**: a Merkle-clock causal DAG of content-addressed events
//! - **Prolly tree**: an order-independent, content-defined map
//! - **Database**: a document store whose state converges across
//!   replicas via `advance`
//! - **Index**: a lazily-maintained secondary index over a database
//! - **Subscribe**: a debounced fan-out notifier for database mutations
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Index   │   Subscribe         │
//! ├─────────────────────────────────────────┤
//! │              Database (CRDT)             │
//! ├─────────────────────────────────────────┤
//! │     Clock (causal DAG)   │  Prolly tree  │
//! ├─────────────────────────────────────────┤
//! │              BlockStore trait            │
//! └─────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod crdt;
pub mod error;
pub mod event;
pub mod index;
pub mod prolly;
pub mod subscribe;

pub use clock::{Clock, ClockHandle, Head};
pub use crdt::{ChangeRow, ChangesSince, Database, PutResult};
pub use error::{CoreError, Result};
pub use event::{Event, EventData};
pub use index::{EmittedKey, Index, IndexKey, IndexRow, Range};
pub use prolly::{BoundaryHasher, BranchEntry, Entry, Node, ProllyTree, TreeEntry};
pub use subscribe::SubscriberRegistry;
