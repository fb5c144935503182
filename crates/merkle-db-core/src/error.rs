//! Error types for the merkle-db-core crate

use cid::Cid;
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in the causal log and index engine
#[derive(Error, Debug)]
pub enum CoreError {
    /// Requested key or CID absent
    #[error("not found: {0}")]
    NotFound(String),

    /// `advance` referenced an event unreachable from any known block
    #[error("missing event: {0}")]
    MissingEvent(Cid),

    /// Block bytes did not decode under the declared codec
    #[error("decode error for {cid}: {reason}")]
    DecodeError { cid: Cid, reason: String },

    /// A user-supplied `mapFn` failed; index state is left unchanged
    #[error("index build error: {0}")]
    IndexBuildError(String),

    /// The underlying block store failed
    #[error("store I/O error: {0}")]
    StoreIOError(#[from] merkle_blockstore::BlockStoreError),
}
