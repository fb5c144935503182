//! Block types

use bytes::Bytes;
use cid::Cid;

/// A block of data together with its content identifier.
///
/// Immutable once produced: `cid` is always `hash(data, codec)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// The content identifier
    pub cid: Cid,
    /// The raw bytes
    pub data: Bytes,
}

impl Block {
    /// Pair a CID with its bytes without re-verifying the hash.
    pub fn new(cid: Cid, data: Bytes) -> Self {
        Self { cid, data }
    }

    /// Build a block from raw bytes, computing its CID under the given codec.
    pub fn from_data(data: impl Into<Bytes>, codec: crate::cid_utils::CidCodec) -> Self {
        let data = data.into();
        let cid = crate::cid_utils::create_cid(&data, codec);
        Self { cid, data }
    }

    /// Size of the block in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A reference to a block without its payload, used when only the
/// address is needed (e.g. parent pointers, head entries).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(pub Cid);

impl From<Cid> for BlockRef {
    fn from(cid: Cid) -> Self {
        Self(cid)
    }
}

impl From<BlockRef> for Cid {
    fn from(r: BlockRef) -> Self {
        r.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid_utils::CidCodec;

    #[test]
    fn test_block_from_data() {
        let data = b"hello".as_slice();
        let block = Block::from_data(data, CidCodec::Raw);
        assert_eq!(block.size(), data.len());
    }

    #[test]
    fn test_block_ref_roundtrip() {
        let block = Block::from_data(b"test".as_slice(), CidCodec::Raw);
        let r: BlockRef = block.cid.into();
        let back: Cid = r.into();
        assert_eq!(back, block.cid);
    }
}
